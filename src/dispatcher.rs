//! Action dispatcher.
//!
//! [`Dispatcher::dispatch`] resolves the group owning an action, reads the
//! group's routing metadata, scopes a [`BoundContext`] to the entity-state
//! partition the action targets, invokes the handler and normalizes the
//! outcome into an [`ActionResponse`]. It never returns `Err` and never
//! lets a handler panic escape.
//!
//! # Example
//!
//! ```ignore
//! use action_dispatch::{Action, ActionGroup, Dispatcher, EntityStateStore, RequestContext};
//! use serde_json::json;
//!
//! let dispatcher = Dispatcher::builder(EntityStateStore::new())
//!     .group(ActionGroup::with_default_routing("measures").handle(
//!         Action::DeleteMeasure,
//!         |call| async move {
//!             call.context().entity_state().remove(call.args().str(0).unwrap_or_default()).await;
//!             Ok(None)
//!         },
//!     ))
//!     .build()?;
//!
//! let ctx = RequestContext::detached();
//! let response = dispatcher.dispatch(&ctx, Action::DeleteMeasure, vec![json!("m1")]).await;
//! assert!(response.is_success());
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::action::{Action, EntityType, RoutingMetadata, ScopeRule, StateType};
use crate::codec::MsgPackCodec;
use crate::context::{BoundContext, EntityInfo, RequestContext};
use crate::error::{ActionDefinitionError, Result};
use crate::handler::{
    ActionCall, ActionGroup, ActionRegistry, CallArgs, DuplicatePolicy, GroupLinks, Handler,
};
use crate::queue::{spawn_work_queue, WorkQueueConfig, WorkQueueHandle};
use crate::response::{ActionFailure, ActionResponse};
use crate::state::EntityStateLookup;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Builder for configuring and creating a [`Dispatcher`].
pub struct DispatcherBuilder {
    states: Arc<dyn EntityStateLookup>,
    groups: Vec<ActionGroup>,
    duplicate_policy: DuplicatePolicy,
    queue: Option<WorkQueueHandle>,
    queue_config: WorkQueueConfig,
}

impl DispatcherBuilder {
    /// Create a builder around an entity-state lookup.
    pub fn new(states: impl EntityStateLookup) -> Self {
        Self {
            states: Arc::new(states),
            groups: Vec::new(),
            duplicate_policy: DuplicatePolicy::default(),
            queue: None,
            queue_config: WorkQueueConfig::default(),
        }
    }

    /// Register a handler group.
    pub fn group(mut self, group: ActionGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Register several handler groups, in order.
    pub fn groups(mut self, groups: impl IntoIterator<Item = ActionGroup>) -> Self {
        self.groups.extend(groups);
        self
    }

    /// Set how duplicate action declarations are handled.
    ///
    /// Default: [`DuplicatePolicy::Reject`]
    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Share an existing work queue instead of spawning one.
    ///
    /// The queue settings below are ignored when a queue is supplied.
    pub fn work_queue(mut self, queue: WorkQueueHandle) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Set the maximum pending jobs for backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_jobs(mut self, limit: usize) -> Self {
        self.queue_config.max_pending_jobs = limit;
        self
    }

    /// Set the work queue channel capacity.
    ///
    /// Default: 1024
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_config.channel_capacity = capacity;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.queue_config.backpressure_timeout = timeout;
        self
    }

    /// Build the registry, spawn the work queue if needed and wire every
    /// group's back-references.
    ///
    /// Spawning the work queue requires a Tokio runtime.
    pub fn build(self) -> Result<Arc<Dispatcher>> {
        let registry = ActionRegistry::build(self.groups, self.duplicate_policy)?;

        let (queue, queue_task) = match self.queue {
            Some(queue) => (queue, None),
            None => {
                let (queue, task) = spawn_work_queue(self.queue_config);
                (queue, Some(task))
            }
        };

        let states = self.states;
        let dispatcher = Arc::new_cyclic(|weak: &Weak<Dispatcher>| {
            for group in registry.groups() {
                group.attach(GroupLinks::new(group.name(), weak.clone(), queue.clone()));
            }
            Dispatcher {
                registry,
                states,
                queue,
                _queue_task: queue_task,
            }
        });

        debug!(
            target: DISPATCH_TARGET,
            actions = dispatcher.registry.len(),
            groups = dispatcher.registry.groups().len(),
            "dispatcher ready"
        );
        Ok(dispatcher)
    }
}

/// Routes actions to handler groups.
///
/// Built once at wiring time and shared through `Arc`.
pub struct Dispatcher {
    registry: ActionRegistry,
    states: Arc<dyn EntityStateLookup>,
    queue: WorkQueueHandle,
    _queue_task: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Create a dispatcher builder.
    pub fn builder(states: impl EntityStateLookup) -> DispatcherBuilder {
        DispatcherBuilder::new(states)
    }

    /// Dispatch an action.
    ///
    /// `ctx` may be an unbound [`RequestContext`] or a [`BoundContext`]; a
    /// bound context is forked before scoping so its binding is never
    /// touched.
    pub async fn dispatch<C>(&self, ctx: C, action: Action, args: impl Into<CallArgs>) -> ActionResponse
    where
        C: Into<RequestContext>,
    {
        let args = args.into();

        let (group, handler) = match self.resolve(action) {
            Some(found) => found,
            None => {
                debug!(target: DISPATCH_TARGET, %action, "no handler for action");
                return ActionResponse::error(ActionDefinitionError::not_found(action.as_str()));
            }
        };

        let routing = match group.routing(action) {
            Some(routing) => routing,
            None => {
                warn!(
                    target: DISPATCH_TARGET,
                    %action,
                    group = group.name(),
                    "no routing metadata for action"
                );
                return ActionResponse::error(ActionDefinitionError::MissingRouting { action });
            }
        };

        let links = match group.links() {
            Some(links) => links.clone(),
            None => {
                return ActionResponse::error(ActionDefinitionError::Detached {
                    group: group.name(),
                })
            }
        };

        let context = match self.derive_context(ctx.into(), action, routing, &args) {
            Ok(context) => context,
            Err(failure) => {
                debug!(target: DISPATCH_TARGET, %action, error = %failure, "scoping failed");
                return ActionResponse::Error(failure);
            }
        };

        invoke(handler, ActionCall::new(action, context, args, links)).await
    }

    /// Dispatch by camelCase action name.
    ///
    /// Names outside the action universe produce a "`<name>` not found"
    /// error response.
    pub async fn dispatch_named<C>(&self, ctx: C, name: &str, args: impl Into<CallArgs>) -> ActionResponse
    where
        C: Into<RequestContext>,
    {
        match Action::parse(name) {
            Some(action) => self.dispatch(ctx, action, args).await,
            None => {
                debug!(target: DISPATCH_TARGET, action = name, "unknown action name");
                ActionResponse::error(ActionDefinitionError::not_found(name))
            }
        }
    }

    /// Dispatch a MessagePack-encoded argument array and encode the response.
    ///
    /// Decode failures become error responses; the result is always a valid
    /// encoded response.
    pub async fn dispatch_encoded<C>(&self, ctx: C, name: &str, payload: &[u8]) -> Bytes
    where
        C: Into<RequestContext>,
    {
        let response = match MsgPackCodec::decode_args(payload) {
            Ok(args) => self.dispatch_named(ctx, name, args).await,
            Err(error) => {
                debug!(target: DISPATCH_TARGET, action = name, %error, "undecodable arguments");
                ActionResponse::error(error)
            }
        };

        match MsgPackCodec::encode_response(&response) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, action = name, %error, "failed to encode response");
                MsgPackCodec::encode_response(&ActionResponse::error(error)).unwrap_or_default()
            }
        }
    }

    #[inline]
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Downstream work queue shared with every group.
    #[inline]
    pub fn queue(&self) -> &WorkQueueHandle {
        &self.queue
    }

    fn resolve(&self, action: Action) -> Option<(&Arc<ActionGroup>, &dyn Handler)> {
        let group = self.registry.resolve(action)?;
        let handler = group.handler(action)?;
        Some((group, handler))
    }

    /// Bind a context to the partition the action targets.
    fn derive_context(
        &self,
        ctx: RequestContext,
        action: Action,
        routing: RoutingMetadata,
        args: &CallArgs,
    ) -> std::result::Result<BoundContext, ActionFailure> {
        let (entity_type, state_type, entity) = match routing.scope_rule() {
            ScopeRule::Fixed {
                entity_type,
                state_type,
            } => {
                let entity = args.str(0).map(|id| EntityInfo {
                    id: id.to_string(),
                    entity_type,
                    state_type,
                });
                // Without a fixed state type, `args[1]` may name one.
                let lookup_state = state_type.or_else(|| {
                    args.get(1)
                        .and_then(|value| serde_json::from_value(value.clone()).ok())
                });
                (entity_type, lookup_state, entity)
            }
            ScopeRule::EntityFromArgs { state_type } => {
                let entity_type: EntityType = scope_arg(action, args, 0, "entity type")?;
                let id = scope_id(action, args, 1)?;
                let entity = EntityInfo {
                    id,
                    entity_type,
                    state_type: Some(state_type),
                };
                (entity_type, Some(state_type), Some(entity))
            }
            ScopeRule::FromArgs => {
                let entity_type: EntityType = scope_arg(action, args, 0, "entity type")?;
                let state_type: StateType = scope_arg(action, args, 1, "state type")?;
                let id = scope_id(action, args, 2)?;
                let entity = EntityInfo {
                    id,
                    entity_type,
                    state_type: Some(state_type),
                };
                (entity_type, Some(state_type), Some(entity))
            }
        };

        let state = self.states.entity_state(entity_type, state_type)?;

        debug!(
            target: DISPATCH_TARGET,
            %action,
            ?entity_type,
            ?state_type,
            entity_id = entity.as_ref().map(|info| info.id.as_str()),
            "scoped context"
        );
        Ok(ctx.bind(state, entity))
    }
}

/// Invoke a handler and normalize whatever comes out of it.
async fn invoke(handler: &dyn Handler, call: ActionCall) -> ActionResponse {
    let action = call.action();

    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(call))) {
        Ok(future) => future,
        Err(panic) => return panicked(action, panic),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(payload)) => {
            debug!(target: DISPATCH_TARGET, %action, has_payload = payload.is_some(), "action completed");
            ActionResponse::Success(payload)
        }
        Ok(Err(error)) => {
            warn!(target: DISPATCH_TARGET, %action, %error, "action failed");
            ActionResponse::Error(ActionFailure::Handler(error))
        }
        Err(panic) => panicked(action, panic),
    }
}

fn panicked(action: Action, panic: Box<dyn Any + Send>) -> ActionResponse {
    let message = if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };

    error!(target: DISPATCH_TARGET, %action, panic = %message, "action handler panicked");
    ActionResponse::Error(ActionFailure::Panicked(message))
}

fn scope_arg<T: DeserializeOwned>(
    action: Action,
    args: &CallArgs,
    index: usize,
    what: &str,
) -> std::result::Result<T, ActionDefinitionError> {
    let value = args.get(index).ok_or_else(|| {
        ActionDefinitionError::invalid_arguments(action, format!("missing {what} at position {index}"))
    })?;

    serde_json::from_value(value.clone()).map_err(|_| {
        ActionDefinitionError::invalid_arguments(
            action,
            format!("expected {what} at position {index}, got {value}"),
        )
    })
}

fn scope_id(
    action: Action,
    args: &CallArgs,
    index: usize,
) -> std::result::Result<String, ActionDefinitionError> {
    args.str(index).map(str::to_string).ok_or_else(|| {
        ActionDefinitionError::invalid_arguments(
            action,
            format!("expected entity id string at position {index}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::state::EntityStateStore;
    use serde_json::json;

    fn noop_group(name: &'static str, action: Action) -> ActionGroup {
        ActionGroup::with_default_routing(name).handle(action, |_call| async { Ok(None) })
    }

    #[test]
    fn test_builder_defaults() {
        let builder = Dispatcher::builder(EntityStateStore::new());
        assert_eq!(builder.duplicate_policy, DuplicatePolicy::Reject);
        assert!(builder.queue.is_none());
        assert_eq!(builder.queue_config.max_pending_jobs, 1024);
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Dispatcher::builder(EntityStateStore::new())
            .duplicate_policy(DuplicatePolicy::LastWins)
            .max_pending_jobs(16)
            .queue_capacity(8)
            .backpressure_timeout(Duration::from_millis(250))
            .group(noop_group("measures", Action::AddNewMeasure));

        assert_eq!(builder.duplicate_policy, DuplicatePolicy::LastWins);
        assert_eq!(builder.queue_config.max_pending_jobs, 16);
        assert_eq!(builder.queue_config.channel_capacity, 8);
        assert_eq!(
            builder.queue_config.backpressure_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(builder.groups.len(), 1);
    }

    #[test]
    fn test_build_rejects_duplicates_before_spawning() {
        // No runtime here: a rejected build must not try to spawn the queue.
        let result = Dispatcher::builder(EntityStateStore::new())
            .group(noop_group("measures", Action::AddNewMeasure))
            .group(noop_group("legacy", Action::AddNewMeasure))
            .build();

        assert!(matches!(result, Err(DispatchError::DuplicateAction { .. })));
    }

    #[tokio::test]
    async fn test_build_attaches_groups() {
        let dispatcher = Dispatcher::builder(EntityStateStore::new())
            .group(noop_group("measures", Action::AddNewMeasure))
            .build()
            .unwrap();

        let group = dispatcher.registry().resolve(Action::AddNewMeasure).unwrap();
        let links = group.links().unwrap();
        assert!(Arc::ptr_eq(&links.dispatcher().unwrap(), &dispatcher));
    }

    #[test]
    fn test_scope_arg_errors() {
        let args = CallArgs::from([json!("NotAnEntity"), json!(7)]);

        let missing = scope_arg::<EntityType>(Action::DeleteEntity, &args, 4, "entity type");
        assert!(matches!(
            missing,
            Err(ActionDefinitionError::InvalidArguments { .. })
        ));

        let wrong = scope_arg::<EntityType>(Action::DeleteEntity, &args, 0, "entity type");
        let message = wrong.unwrap_err().to_string();
        assert!(message.contains("expected entity type at position 0"));

        assert!(scope_id(Action::DeleteEntity, &args, 1).is_err());
    }

    #[test]
    fn test_panic_message_extraction() {
        let response = panicked(Action::DeleteMeasure, Box::new("static message"));
        assert_eq!(
            response.cause().unwrap().to_string(),
            "handler panicked: static message"
        );

        let response = panicked(Action::DeleteMeasure, Box::new(String::from("owned")));
        assert_eq!(
            response.cause().unwrap().to_string(),
            "handler panicked: owned"
        );

        let response = panicked(Action::DeleteMeasure, Box::new(7_u8));
        assert!(response.cause().unwrap().to_string().contains("unknown"));
    }
}
