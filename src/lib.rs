//! # action-dispatch
//!
//! Action dispatcher for a metrics workspace.
//!
//! Commands arrive as an [`Action`] plus positional JSON arguments. The
//! [`Dispatcher`] finds the [`ActionGroup`] that handles the action, scopes
//! the request context to the entity-state partition the action targets and
//! runs the handler. Every outcome, including unknown actions, handler
//! errors and handler panics, comes back as an [`ActionResponse`].
//!
//! ## Architecture
//!
//! - **Groups**: handler table plus a class-level routing table
//! - **Registry**: flattens groups into `action -> group`
//! - **Context**: unbound [`RequestContext`] scoped into an immutable [`BoundContext`]
//! - **Work queue**: serial FIFO for follow-up jobs, with backpressure
//!
//! ## Example
//!
//! ```ignore
//! use action_dispatch::{Action, ActionGroup, Dispatcher, EntityStateStore, RequestContext};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let dispatcher = Dispatcher::builder(EntityStateStore::new())
//!         .group(ActionGroup::with_default_routing("measures").handle(
//!             Action::AddNewMeasure,
//!             |call| async move {
//!                 let id = call.args().decode::<String>(0)?;
//!                 call.context().entity_state().put(id, json!({})).await;
//!                 Ok(None)
//!             },
//!         ))
//!         .build()?;
//!
//!     let response = dispatcher
//!         .dispatch(&RequestContext::detached(), Action::AddNewMeasure, vec![json!("m1")])
//!         .await;
//!     assert!(response.is_success());
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod codec;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod queue;
pub mod response;
pub mod state;

mod backpressure;

pub use action::{Action, EntityType, RoutingMetadata, ScopeRule, StateType};
pub use context::{ActionsChannel, BoundContext, ChannelMessage, EntityInfo, RequestContext};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{ActionDefinitionError, DispatchError};
pub use handler::{ActionCall, ActionGroup, CallArgs, DuplicatePolicy, HandlerResult};
pub use queue::{JobTicket, WorkQueueConfig, WorkQueueHandle};
pub use response::{ActionFailure, ActionResponse};
pub use state::{EntityStateHandle, EntityStateLookup, EntityStateStore};
