//! Handler groups: a handler table plus a class-level routing table.
//!
//! A group bundles the actions of one entity family. Handlers are plain
//! async closures registered per [`Action`]; routing metadata comes from a
//! `fn` table shared by every instance of the group.
//!
//! # Example
//!
//! ```ignore
//! use action_dispatch::{Action, ActionGroup};
//!
//! let measures = ActionGroup::with_default_routing("measures")
//!     .handle(Action::DeleteMeasure, |call| async move {
//!         let id = call.args().decode::<String>(0)?;
//!         call.context().entity_state().remove(&id).await;
//!         Ok(None)
//!     });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, OnceLock, Weak};

use serde_json::Value;
use tracing::{debug, warn};

use super::CallArgs;
use crate::action::{Action, RoutingMetadata};
use crate::context::BoundContext;
use crate::dispatcher::{Dispatcher, DISPATCH_TARGET};
use crate::error::ActionDefinitionError;
use crate::queue::WorkQueueHandle;
use crate::response::ActionResponse;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for handler functions.
///
/// `Ok(None)` is a bare success, `Ok(Some(v))` a success carrying `v`.
/// Errors reach the caller unmodified inside the error response.
pub type HandlerResult = anyhow::Result<Option<Value>>;

/// Class-level routing table of a group.
pub type RoutingTable = fn(Action) -> Option<RoutingMetadata>;

/// Trait for action handlers.
pub trait Handler: Send + Sync + 'static {
    /// Handle one scoped call.
    fn call(&self, call: ActionCall) -> BoxFuture<'static, HandlerResult>;
}

/// Adapter turning an async closure into a [`Handler`].
pub struct FnHandler<F, Fut>
where
    F: Fn(ActionCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(ActionCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Handler for FnHandler<F, Fut>
where
    F: Fn(ActionCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, call: ActionCall) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(call))
    }
}

/// Back-references wired into a group when its dispatcher is built.
#[derive(Clone)]
pub struct GroupLinks {
    group: &'static str,
    dispatcher: Weak<Dispatcher>,
    queue: WorkQueueHandle,
}

impl GroupLinks {
    pub(crate) fn new(group: &'static str, dispatcher: Weak<Dispatcher>, queue: WorkQueueHandle) -> Self {
        Self {
            group,
            dispatcher,
            queue,
        }
    }

    /// Owning dispatcher, unless it has been dropped.
    pub fn dispatcher(&self) -> Option<Arc<Dispatcher>> {
        self.dispatcher.upgrade()
    }

    /// Downstream work queue.
    #[inline]
    pub fn queue(&self) -> &WorkQueueHandle {
        &self.queue
    }
}

/// Everything a handler receives for one call.
pub struct ActionCall {
    action: Action,
    context: BoundContext,
    args: CallArgs,
    links: GroupLinks,
}

impl ActionCall {
    pub(crate) fn new(action: Action, context: BoundContext, args: CallArgs, links: GroupLinks) -> Self {
        Self {
            action,
            context,
            args,
            links,
        }
    }

    #[inline]
    pub fn action(&self) -> Action {
        self.action
    }

    /// Context scoped to the call's entity/state.
    #[inline]
    pub fn context(&self) -> &BoundContext {
        &self.context
    }

    /// Positional arguments as passed to `dispatch`.
    #[inline]
    pub fn args(&self) -> &CallArgs {
        &self.args
    }

    #[inline]
    pub fn queue(&self) -> &WorkQueueHandle {
        self.links.queue()
    }

    pub fn dispatcher(&self) -> Option<Arc<Dispatcher>> {
        self.links.dispatcher()
    }

    pub fn into_parts(self) -> (BoundContext, CallArgs) {
        (self.context, self.args)
    }

    /// Dispatch another action from inside this handler.
    ///
    /// The nested call scopes a fork of this call's context; the current
    /// binding is left untouched.
    pub async fn forward(&self, action: Action, args: impl Into<CallArgs>) -> ActionResponse {
        match self.links.dispatcher() {
            Some(dispatcher) => dispatcher.dispatch(&self.context, action, args).await,
            None => ActionResponse::error(ActionDefinitionError::Detached {
                group: self.links.group,
            }),
        }
    }
}

/// A named set of action handlers sharing one routing table.
pub struct ActionGroup {
    name: &'static str,
    routing: RoutingTable,
    handlers: HashMap<Action, Box<dyn Handler>>,
    links: OnceLock<GroupLinks>,
}

impl ActionGroup {
    /// Create an empty group with the given routing table.
    pub fn new(name: &'static str, routing: RoutingTable) -> Self {
        Self {
            name,
            routing,
            handlers: HashMap::new(),
            links: OnceLock::new(),
        }
    }

    /// Create an empty group routed by [`Action::default_routing`].
    pub fn with_default_routing(name: &'static str) -> Self {
        Self::new(name, Action::default_routing)
    }

    /// Register the handler for an action.
    ///
    /// Registering the same action twice in one group replaces the handler.
    pub fn handle<F, Fut>(mut self, action: Action, handler: F) -> Self
    where
        F: Fn(ActionCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let replaced = self
            .handlers
            .insert(action, Box::new(FnHandler::new(handler)))
            .is_some();
        if replaced {
            debug!(target: DISPATCH_TARGET, group = self.name, %action, "handler replaced");
        }
        self
    }

    /// Register a boxed handler.
    pub fn handle_boxed(mut self, action: Action, handler: Box<dyn Handler>) -> Self {
        self.handlers.insert(action, handler);
        self
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared actions, in [`Action::ALL`] order.
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        Action::ALL
            .into_iter()
            .filter(|action| self.handlers.contains_key(action))
    }

    pub fn handles(&self, action: Action) -> bool {
        self.handlers.contains_key(&action)
    }

    pub(crate) fn handler(&self, action: Action) -> Option<&dyn Handler> {
        self.handlers.get(&action).map(|h| h.as_ref())
    }

    /// Routing metadata for an action, from the class-level table.
    pub fn routing(&self, action: Action) -> Option<RoutingMetadata> {
        (self.routing)(action)
    }

    /// Back-references, once the group is registered with a dispatcher.
    pub fn links(&self) -> Option<&GroupLinks> {
        self.links.get()
    }

    pub(crate) fn attach(&self, links: GroupLinks) {
        if self.links.set(links).is_err() {
            warn!(target: DISPATCH_TARGET, group = self.name, "group already attached");
        }
    }
}

impl std::fmt::Debug for ActionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionGroup")
            .field("name", &self.name)
            .field("actions", &self.actions().collect::<Vec<_>>())
            .field("attached", &self.links.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{EntityType, StateType};

    fn measures_only(action: Action) -> Option<RoutingMetadata> {
        match action {
            Action::AddNewMeasure => Some(RoutingMetadata::fixed(
                EntityType::MeasureDefinition,
                StateType::Persistent,
            )),
            _ => None,
        }
    }

    #[test]
    fn test_register_actions() {
        let group = ActionGroup::with_default_routing("measures")
            .handle(Action::UpdateMeasure, |_call| async { Ok(None) })
            .handle(Action::AddNewMeasure, |_call| async { Ok(None) });

        assert_eq!(group.name(), "measures");
        assert!(group.handles(Action::AddNewMeasure));
        assert!(!group.handles(Action::DeleteMeasure));
        assert!(group.handler(Action::UpdateMeasure).is_some());
        assert_eq!(
            group.actions().collect::<Vec<_>>(),
            vec![Action::AddNewMeasure, Action::UpdateMeasure]
        );
    }

    #[test]
    fn test_custom_routing_table() {
        let group = ActionGroup::new("measures", measures_only);

        assert!(group.routing(Action::AddNewMeasure).is_some());
        assert!(group.routing(Action::DeleteMeasure).is_none());
    }

    #[test]
    fn test_empty_group() {
        let group = ActionGroup::with_default_routing("empty");
        assert_eq!(group.actions().count(), 0);
        assert!(group.links().is_none());
    }

    #[test]
    fn test_reregistering_replaces() {
        let group = ActionGroup::with_default_routing("dimensions")
            .handle(Action::AddNewDimension, |_call| async { Ok(None) })
            .handle(Action::AddNewDimension, |_call| async {
                Ok(Some(Value::Bool(true)))
            });

        assert_eq!(group.actions().count(), 1);
    }
}
