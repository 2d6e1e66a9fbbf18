//! Handler registry mapping actions to the group that handles them.
//!
//! Built once from a list of groups. Each group's declared actions are
//! flattened into `action -> group`. Two groups declaring the same action
//! either fail the build ([`DuplicatePolicy::Reject`], the default) or the
//! later group replaces the earlier one ([`DuplicatePolicy::LastWins`]).
//! Either way at most one group owns an action.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::ActionGroup;
use crate::action::Action;
use crate::dispatcher::DISPATCH_TARGET;
use crate::error::{DispatchError, Result};

/// What to do when two groups declare the same action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Fail the build with `DuplicateAction`.
    #[default]
    Reject,
    /// The group registered later takes the action.
    LastWins,
}

/// Registry mapping actions to handler groups.
#[derive(Debug)]
pub struct ActionRegistry {
    /// Owning group by action.
    actions: HashMap<Action, Arc<ActionGroup>>,
    /// Groups in registration order.
    groups: Vec<Arc<ActionGroup>>,
}

impl ActionRegistry {
    /// Build a registry from groups.
    pub fn build(groups: Vec<ActionGroup>, policy: DuplicatePolicy) -> Result<Self> {
        let mut actions: HashMap<Action, Arc<ActionGroup>> = HashMap::new();
        let mut registered = Vec::with_capacity(groups.len());

        for group in groups {
            let group = Arc::new(group);

            for action in group.actions() {
                if let Some(existing) = actions.get(&action) {
                    match policy {
                        DuplicatePolicy::Reject => {
                            return Err(DispatchError::DuplicateAction {
                                action,
                                existing: existing.name(),
                                incoming: group.name(),
                            });
                        }
                        DuplicatePolicy::LastWins => {
                            warn!(
                                target: DISPATCH_TARGET,
                                %action,
                                existing = existing.name(),
                                incoming = group.name(),
                                "action claimed by a later group"
                            );
                        }
                    }
                }
                actions.insert(action, group.clone());
            }

            debug!(
                target: DISPATCH_TARGET,
                group = group.name(),
                actions = group.actions().count(),
                "registered action group"
            );
            registered.push(group);
        }

        Ok(Self {
            actions,
            groups: registered,
        })
    }

    /// Group owning an action.
    pub fn resolve(&self, action: Action) -> Option<&Arc<ActionGroup>> {
        self.actions.get(&action)
    }

    /// Name of the group owning an action.
    pub fn owner_of(&self, action: Action) -> Option<&'static str> {
        self.actions.get(&action).map(|group| group.name())
    }

    /// Registered groups, in registration order.
    pub fn groups(&self) -> &[Arc<ActionGroup>] {
        &self.groups
    }

    /// Registered actions, in [`Action::ALL`] order.
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        Action::ALL
            .into_iter()
            .filter(|action| self.actions.contains_key(action))
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &'static str, actions: &[Action]) -> ActionGroup {
        actions.iter().fold(
            ActionGroup::with_default_routing(name),
            |group, &action| group.handle(action, |_call| async { Ok(None) }),
        )
    }

    #[test]
    fn test_build_flattens_groups() {
        let registry = ActionRegistry::build(
            vec![
                group("measures", &[Action::AddNewMeasure, Action::DeleteMeasure]),
                group("dimensions", &[Action::AddNewDimension]),
            ],
            DuplicatePolicy::Reject,
        )
        .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.owner_of(Action::AddNewMeasure), Some("measures"));
        assert_eq!(registry.owner_of(Action::AddNewDimension), Some("dimensions"));
        assert_eq!(registry.groups().len(), 2);
        assert_eq!(
            registry.actions().collect::<Vec<_>>(),
            vec![
                Action::AddNewDimension,
                Action::AddNewMeasure,
                Action::DeleteMeasure
            ]
        );
    }

    #[test]
    fn test_unregistered_action() {
        let registry =
            ActionRegistry::build(vec![group("measures", &[Action::AddNewMeasure])], DuplicatePolicy::Reject)
                .unwrap();

        assert!(registry.resolve(Action::DeleteEntity).is_none());
        assert!(registry.owner_of(Action::DeleteEntity).is_none());
    }

    #[test]
    fn test_reject_duplicates() {
        let result = ActionRegistry::build(
            vec![
                group("measures", &[Action::AddNewMeasure]),
                group("legacy", &[Action::AddNewMeasure]),
            ],
            DuplicatePolicy::Reject,
        );

        match result {
            Err(DispatchError::DuplicateAction {
                action,
                existing,
                incoming,
            }) => {
                assert_eq!(action, Action::AddNewMeasure);
                assert_eq!(existing, "measures");
                assert_eq!(incoming, "legacy");
            }
            other => panic!("expected DuplicateAction, got {other:?}"),
        }
    }

    #[test]
    fn test_last_wins() {
        let registry = ActionRegistry::build(
            vec![
                group("measures", &[Action::AddNewMeasure, Action::UpdateMeasure]),
                group("legacy", &[Action::AddNewMeasure]),
            ],
            DuplicatePolicy::LastWins,
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.owner_of(Action::AddNewMeasure), Some("legacy"));
        assert_eq!(registry.owner_of(Action::UpdateMeasure), Some("measures"));
    }

    #[test]
    fn test_default_policy_rejects() {
        assert_eq!(DuplicatePolicy::default(), DuplicatePolicy::Reject);
    }

    #[test]
    fn test_empty_registry() {
        let registry = ActionRegistry::build(Vec::new(), DuplicatePolicy::Reject).unwrap();
        assert!(registry.is_empty());
    }
}
