//! Shared primitive IDs, operation kinds, and lifecycle phases.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Monotonic request identifier, unique within one ledger's lifetime.
pub type RequestId = u64;
/// Timestamp in milliseconds.
pub type TimestampMs = u64;
/// Identity key of an entity inside a collection.
pub type EntityKey = String;

/// Raised when a string names no known operation kind or phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation kind `{0}`, expected one of CREATE_ONE, READ_ONE, UPDATE_ONE, DELETE_ONE, CREATE_MANY, READ_MANY, UPDATE_MANY, DELETE_MANY")]
pub struct UnknownKind(pub String);

/// Raised when a string names no known lifecycle phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lifecycle phase `{0}`, expected one of START, SUCCESS, FAIL")]
pub struct UnknownPhase(pub String);

/// One of the fixed CRUD operations, in singular or plural form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// Create a single entity.
    CreateOne,
    /// Read a single entity.
    ReadOne,
    /// Update a single entity.
    UpdateOne,
    /// Delete a single entity.
    DeleteOne,
    /// Create several entities.
    CreateMany,
    /// Read several entities.
    ReadMany,
    /// Update several entities.
    UpdateMany,
    /// Delete several entities.
    DeleteMany,
}

/// What an operation does to the collection, independent of its arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Adds entities.
    Create,
    /// Loads entities.
    Read,
    /// Modifies entities.
    Update,
    /// Removes entities.
    Delete,
}

impl OperationKind {
    /// Every kind, in the order the view overlays them.
    pub const ALL: [OperationKind; 8] = [
        OperationKind::CreateOne,
        OperationKind::ReadOne,
        OperationKind::UpdateOne,
        OperationKind::DeleteOne,
        OperationKind::CreateMany,
        OperationKind::ReadMany,
        OperationKind::UpdateMany,
        OperationKind::DeleteMany,
    ];

    /// Wire name, e.g. `READ_MANY`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateOne => "CREATE_ONE",
            Self::ReadOne => "READ_ONE",
            Self::UpdateOne => "UPDATE_ONE",
            Self::DeleteOne => "DELETE_ONE",
            Self::CreateMany => "CREATE_MANY",
            Self::ReadMany => "READ_MANY",
            Self::UpdateMany => "UPDATE_MANY",
            Self::DeleteMany => "DELETE_MANY",
        }
    }

    /// The verb shared by the `-one` and `-many` forms.
    pub const fn verb(self) -> Verb {
        match self {
            Self::CreateOne | Self::CreateMany => Verb::Create,
            Self::ReadOne | Self::ReadMany => Verb::Read,
            Self::UpdateOne | Self::UpdateMany => Verb::Update,
            Self::DeleteOne | Self::DeleteMany => Verb::Delete,
        }
    }

    /// True for the `-one` forms, whose payload is a single entity.
    pub const fn is_single(self) -> bool {
        matches!(
            self,
            Self::CreateOne | Self::ReadOne | Self::UpdateOne | Self::DeleteOne
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Lifecycle phase carried by an emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// The request was admitted and is now active.
    Start,
    /// The executor resolved the request.
    Success,
    /// The executor rejected the request.
    Fail,
}

impl Phase {
    /// Every phase.
    pub const ALL: [Phase; 3] = [Phase::Start, Phase::Success, Phase::Fail];

    /// Wire name, e.g. `START`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_parse_back() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>(), Ok(kind));
        }
        assert_eq!(
            "PATCH_ONE".parse::<OperationKind>(),
            Err(UnknownKind("PATCH_ONE".to_string()))
        );
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&OperationKind::UpdateMany).unwrap();
        assert_eq!(json, "\"UPDATE_MANY\"");
        let phase: Phase = serde_json::from_str("\"FAIL\"").unwrap();
        assert_eq!(phase, Phase::Fail);
    }
}
