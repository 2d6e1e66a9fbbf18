//! Request contexts passed to action handlers.
//!
//! A dispatch starts from an unbound [`RequestContext`] that only carries the
//! shared [`ActionsChannel`]. Scoping produces a [`BoundContext`]: an
//! immutable value holding the entity-state handle and, when the arguments
//! name one, the [`EntityInfo`] of the entity being acted on.
//!
//! A bound context is never re-bound. Dispatching with one forks it first
//! (channel copied, binding dropped), so the original binding stays intact:
//!
//! ```ignore
//! let bound: BoundContext = /* received by a handler */;
//! // Nested dispatch scopes a fresh context.
//! dispatcher.dispatch(&bound, Action::DeleteMeasure, vec![json!("m1")]).await;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::action::{EntityType, StateType};
use crate::error::{DispatchError, Result};
use crate::state::EntityStateHandle;

/// Default capacity of the actions channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Message published by a handler through the actions channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Event name chosen by the handler.
    pub event: String,
    /// Event payload.
    pub payload: Value,
}

/// Shared channel handlers use to talk back to the host.
///
/// Cheaply cloneable. A detached channel has no receiver and drops every
/// message (testing mode).
#[derive(Debug, Clone, Default)]
pub struct ActionsChannel {
    tx: Option<mpsc::Sender<ChannelMessage>>,
}

impl ActionsChannel {
    /// Create a channel and the receiver the host reads from.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ChannelMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// Create a channel that drops everything.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    #[inline]
    pub fn is_detached(&self) -> bool {
        self.tx.is_none()
    }

    /// Whether both handles feed the same receiver.
    pub fn same_channel(&self, other: &ActionsChannel) -> bool {
        match (&self.tx, &other.tx) {
            (Some(a), Some(b)) => a.same_channel(b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Publish a message, waiting for capacity.
    pub async fn send(&self, event: impl Into<String>, payload: Value) -> Result<()> {
        let tx = match &self.tx {
            Some(tx) => tx,
            None => return Ok(()),
        };

        let message = ChannelMessage {
            event: event.into(),
            payload,
        };
        tx.send(message)
            .await
            .map_err(|_| DispatchError::ChannelClosed)
    }
}

/// Identity of the entity a call acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityInfo {
    pub id: String,
    pub entity_type: EntityType,
    pub state_type: Option<StateType>,
}

/// Unbound request context.
///
/// Holds only the actions channel. Created once per top-level dispatch.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    channel: ActionsChannel,
}

impl RequestContext {
    /// Create a context around the given channel.
    pub fn new(channel: ActionsChannel) -> Self {
        Self { channel }
    }

    /// Create a context with a detached channel (for testing).
    pub fn detached() -> Self {
        Self::new(ActionsChannel::detached())
    }

    #[inline]
    pub fn channel(&self) -> &ActionsChannel {
        &self.channel
    }

    /// Create a new context sharing only the channel.
    pub fn fork(&self) -> RequestContext {
        RequestContext::new(self.channel.clone())
    }

    /// Bind the context to a state partition.
    pub(crate) fn bind(self, state: EntityStateHandle, entity: Option<EntityInfo>) -> BoundContext {
        BoundContext {
            inner: Arc::new(Binding {
                channel: self.channel,
                state,
                entity,
            }),
        }
    }
}

struct Binding {
    channel: ActionsChannel,
    state: EntityStateHandle,
    entity: Option<EntityInfo>,
}

/// Request context scoped to an entity-state partition.
///
/// Immutable; clones share the same binding.
#[derive(Clone)]
pub struct BoundContext {
    inner: Arc<Binding>,
}

impl BoundContext {
    #[inline]
    pub fn channel(&self) -> &ActionsChannel {
        &self.inner.channel
    }

    /// State partition this call is scoped to.
    #[inline]
    pub fn entity_state(&self) -> &EntityStateHandle {
        &self.inner.state
    }

    /// Entity named by the call arguments, if any.
    #[inline]
    pub fn entity_info(&self) -> Option<&EntityInfo> {
        self.inner.entity.as_ref()
    }

    /// Id of the entity named by the call arguments, if any.
    pub fn entity_id(&self) -> Option<&str> {
        self.inner.entity.as_ref().map(|info| info.id.as_str())
    }

    /// Create a fresh unbound context sharing only the channel.
    pub fn fork(&self) -> RequestContext {
        RequestContext::new(self.inner.channel.clone())
    }

    /// Whether both contexts are the same binding (not merely equal scopes).
    pub fn same_binding(&self, other: &BoundContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Publish a message through the actions channel.
    pub async fn notify(&self, event: impl Into<String>, payload: Value) -> Result<()> {
        self.inner.channel.send(event, payload).await
    }
}

impl std::fmt::Debug for BoundContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundContext")
            .field("state", &self.inner.state)
            .field("entity", &self.inner.entity)
            .finish_non_exhaustive()
    }
}

impl From<&RequestContext> for RequestContext {
    fn from(ctx: &RequestContext) -> Self {
        ctx.clone()
    }
}

impl From<&BoundContext> for RequestContext {
    fn from(ctx: &BoundContext) -> Self {
        ctx.fork()
    }
}

impl From<BoundContext> for RequestContext {
    fn from(ctx: BoundContext) -> Self {
        ctx.fork()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bound(ctx: RequestContext, id: &str) -> BoundContext {
        let state = EntityStateHandle::new(EntityType::Model, StateType::Persistent);
        let info = EntityInfo {
            id: id.to_string(),
            entity_type: EntityType::Model,
            state_type: Some(StateType::Persistent),
        };
        ctx.bind(state, Some(info))
    }

    #[test]
    fn test_fresh_context_is_unbound() {
        let ctx = RequestContext::detached();
        assert!(ctx.channel().is_detached());
    }

    #[tokio::test]
    async fn test_detached_channel_drops_messages() {
        let channel = ActionsChannel::detached();
        assert!(channel.send("progress", json!(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_channel_delivers_messages() {
        let (channel, mut rx) = ActionsChannel::new(8);
        channel.send("progress", json!({"done": 3})).await.unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.event, "progress");
        assert_eq!(message.payload, json!({"done": 3}));
    }

    #[tokio::test]
    async fn test_channel_closed() {
        let (channel, rx) = ActionsChannel::new(1);
        drop(rx);
        let result = channel.send("progress", Value::Null).await;
        assert!(matches!(result, Err(DispatchError::ChannelClosed)));
    }

    #[test]
    fn test_fork_copies_only_channel() {
        let (channel, _rx) = ActionsChannel::new(8);
        let ctx = bound(RequestContext::new(channel.clone()), "m1");

        let forked = ctx.fork();
        assert!(forked.channel().same_channel(&channel));

        // Re-binding the fork does not touch the original.
        let rebound = bound(forked, "m2");
        assert!(!rebound.same_binding(&ctx));
        assert_eq!(ctx.entity_id(), Some("m1"));
        assert_eq!(rebound.entity_id(), Some("m2"));
    }

    #[test]
    fn test_clone_shares_binding() {
        let ctx = bound(RequestContext::detached(), "m1");
        let clone = ctx.clone();
        assert!(ctx.same_binding(&clone));
    }

    #[test]
    fn test_from_bound_forks() {
        let (channel, _rx) = ActionsChannel::new(8);
        let ctx = bound(RequestContext::new(channel), "m1");
        let unbound: RequestContext = (&ctx).into();
        assert!(unbound.channel().same_channel(ctx.channel()));
    }

    #[test]
    fn test_distinct_channels() {
        let (a, _rx_a) = ActionsChannel::new(1);
        let (b, _rx_b) = ActionsChannel::new(1);
        assert!(!a.same_channel(&b));
        assert!(!a.same_channel(&ActionsChannel::detached()));
    }
}
