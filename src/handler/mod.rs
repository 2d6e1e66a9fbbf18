//! Handler module - action groups and the registry.
//!
//! Provides:
//! - [`ActionGroup`] - handler table plus class-level routing table
//! - [`ActionRegistry`] - maps actions to the group that owns them
//! - [`ActionCall`] - what a handler receives: scoped context, args, links
//!
//! # Example
//!
//! ```ignore
//! use action_dispatch::handler::{ActionGroup, ActionRegistry, DuplicatePolicy};
//! use action_dispatch::Action;
//!
//! let dimensions = ActionGroup::with_default_routing("dimensions")
//!     .handle(Action::AddNewDimension, |call| async move {
//!         call.context().notify("dimensionAdded", call.args().get(1).cloned().into()).await?;
//!         Ok(None)
//!     });
//!
//! let registry = ActionRegistry::build(vec![dimensions], DuplicatePolicy::Reject)?;
//! ```

mod args;
mod group;
mod registry;

pub use args::CallArgs;
pub use group::{
    ActionCall, ActionGroup, BoxFuture, FnHandler, GroupLinks, Handler, HandlerResult,
    RoutingTable,
};
pub use registry::{ActionRegistry, DuplicatePolicy};
