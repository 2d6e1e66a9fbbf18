//! Action universe, entity/state tags and routing metadata.
//!
//! [`Action`] is the closed set of commands the dispatcher understands.
//! Each handler group decides, per action, which [`RoutingMetadata`] the
//! action scopes itself to; the metadata selects one of three
//! [`ScopeRule`]s that tell the dispatcher where to read the entity type,
//! state type and entity id from.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Commands known to the dispatcher.
///
/// Names serialize in camelCase (`createMetricsDefinition`), which is also
/// the form accepted by [`Action::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    CreateMetricsDefinition,
    UpdateMetricsDefinitionModel,
    UpdateMetricsDefinitionTimestamp,
    DeleteMetricsDefinition,
    GenerateMeasuresAndDimensions,
    AddNewDimension,
    UpdateDimension,
    DeleteDimension,
    AddNewMeasure,
    UpdateMeasure,
    DeleteMeasure,
    ValidateMeasureExpression,
    /// Generic delete: `[entityType, id]`.
    DeleteEntity,
    /// Generic field update: `[entityType, stateType, id, field, value]`.
    UpdateEntityField,
}

impl Action {
    /// Every action, in declaration order.
    pub const ALL: [Action; 14] = [
        Action::CreateMetricsDefinition,
        Action::UpdateMetricsDefinitionModel,
        Action::UpdateMetricsDefinitionTimestamp,
        Action::DeleteMetricsDefinition,
        Action::GenerateMeasuresAndDimensions,
        Action::AddNewDimension,
        Action::UpdateDimension,
        Action::DeleteDimension,
        Action::AddNewMeasure,
        Action::UpdateMeasure,
        Action::DeleteMeasure,
        Action::ValidateMeasureExpression,
        Action::DeleteEntity,
        Action::UpdateEntityField,
    ];

    /// Parses a camelCase action name.
    ///
    /// Returns `None` for names outside the action universe; callers turn
    /// that into a "not found" response.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == name)
    }

    /// Returns the canonical camelCase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateMetricsDefinition => "createMetricsDefinition",
            Self::UpdateMetricsDefinitionModel => "updateMetricsDefinitionModel",
            Self::UpdateMetricsDefinitionTimestamp => "updateMetricsDefinitionTimestamp",
            Self::DeleteMetricsDefinition => "deleteMetricsDefinition",
            Self::GenerateMeasuresAndDimensions => "generateMeasuresAndDimensions",
            Self::AddNewDimension => "addNewDimension",
            Self::UpdateDimension => "updateDimension",
            Self::DeleteDimension => "deleteDimension",
            Self::AddNewMeasure => "addNewMeasure",
            Self::UpdateMeasure => "updateMeasure",
            Self::DeleteMeasure => "deleteMeasure",
            Self::ValidateMeasureExpression => "validateMeasureExpression",
            Self::DeleteEntity => "deleteEntity",
            Self::UpdateEntityField => "updateEntityField",
        }
    }

    /// Standard routing metadata for every action.
    ///
    /// Exhaustive over the action universe, so a group that uses this as its
    /// routing table can never hit the missing-metadata path.
    pub fn default_routing(self) -> Option<RoutingMetadata> {
        use EntityType::*;

        let metadata = match self {
            Self::CreateMetricsDefinition
            | Self::UpdateMetricsDefinitionModel
            | Self::UpdateMetricsDefinitionTimestamp
            | Self::DeleteMetricsDefinition
            | Self::GenerateMeasuresAndDimensions => {
                RoutingMetadata::fixed(MetricsDefinition, StateType::Persistent)
            }
            Self::AddNewDimension | Self::UpdateDimension | Self::DeleteDimension => {
                RoutingMetadata::fixed(DimensionDefinition, StateType::Persistent)
            }
            Self::AddNewMeasure
            | Self::UpdateMeasure
            | Self::DeleteMeasure
            | Self::ValidateMeasureExpression => {
                RoutingMetadata::fixed(MeasureDefinition, StateType::Persistent)
            }
            Self::DeleteEntity => RoutingMetadata::state_only(StateType::Persistent),
            Self::UpdateEntityField => RoutingMetadata::from_args(),
        };
        Some(metadata)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of domain entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Table,
    Model,
    Application,
    MetricsDefinition,
    MeasureDefinition,
    DimensionDefinition,
    MetricsExplorer,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Table,
        EntityType::Model,
        EntityType::Application,
        EntityType::MetricsDefinition,
        EntityType::MeasureDefinition,
        EntityType::DimensionDefinition,
        EntityType::MetricsExplorer,
    ];
}

/// State partition of an entity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateType {
    Persistent,
    Derived,
}

impl StateType {
    pub const ALL: [StateType; 2] = [StateType::Persistent, StateType::Derived];
}

/// Routing metadata declared by a handler group for one action.
///
/// Either element may be absent; absence means "read it from the call
/// arguments".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoutingMetadata {
    pub entity_type: Option<EntityType>,
    pub state_type: Option<StateType>,
}

impl RoutingMetadata {
    /// Metadata with both elements optional.
    pub const fn new(entity_type: Option<EntityType>, state_type: Option<StateType>) -> Self {
        Self {
            entity_type,
            state_type,
        }
    }

    /// Both entity type and state type fixed.
    pub const fn fixed(entity_type: EntityType, state_type: StateType) -> Self {
        Self::new(Some(entity_type), Some(state_type))
    }

    /// Entity type fixed, state type left to the lookup.
    pub const fn entity_only(entity_type: EntityType) -> Self {
        Self::new(Some(entity_type), None)
    }

    /// State type fixed, entity type taken from `args[0]`.
    pub const fn state_only(state_type: StateType) -> Self {
        Self::new(None, Some(state_type))
    }

    /// Entity type and state type both taken from the arguments.
    pub const fn from_args() -> Self {
        Self::new(None, None)
    }

    /// Selects the scoping rule, in fixed priority order.
    ///
    /// A present entity type always wins; "entity type only" folds into
    /// [`ScopeRule::Fixed`] with no state type.
    pub fn scope_rule(&self) -> ScopeRule {
        match (self.entity_type, self.state_type) {
            (Some(entity_type), state_type) => ScopeRule::Fixed {
                entity_type,
                state_type,
            },
            (None, Some(state_type)) => ScopeRule::EntityFromArgs { state_type },
            (None, None) => ScopeRule::FromArgs,
        }
    }
}

/// Where the dispatcher reads the scope of a call from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRule {
    /// `[id?, ...]`: scope from metadata; id recorded when `args[0]` is a string.
    Fixed {
        entity_type: EntityType,
        state_type: Option<StateType>,
    },
    /// `[entityType, id, ...]`.
    EntityFromArgs { state_type: StateType },
    /// `[entityType, stateType, id, ...]`.
    FromArgs,
}
