//! Layout change-trail model.
//!
//! # Invariants
//! - Change entries are immutable once written.
//! - Entries of one layout are ordered by `created_at ASC, sequence ASC`.

use crate::model::layout::{ActorId, Layout, LayoutId, LayoutScope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable change entry identifier.
pub type ChangeId = Uuid;

/// What kind of mutation a change entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
    Restored,
    /// The layout became the environment default.
    DefaultSet,
    /// The layout lost default status to another layout.
    DefaultCleared,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Restored => "restored",
            Self::DefaultSet => "default_set",
            Self::DefaultCleared => "default_cleared",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            "restored" => Some(Self::Restored),
            "default_set" => Some(Self::DefaultSet),
            "default_cleared" => Some(Self::DefaultCleared),
            _ => None,
        }
    }
}

/// Append request for the change log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChange {
    pub layout_id: LayoutId,
    pub scope: LayoutScope,
    pub actor_id: ActorId,
    pub kind: ChangeKind,
    /// Post-change rendering of the layout.
    pub snapshot: serde_json::Value,
}

impl NewChange {
    /// Builds a change request snapshotting `layout` as committed.
    pub fn snapshot_of(layout: &Layout, actor_id: ActorId, kind: ChangeKind) -> Self {
        Self {
            layout_id: layout.id,
            scope: layout.scope,
            actor_id,
            kind,
            snapshot: serde_json::to_value(layout).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Persisted change entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEntry {
    pub id: ChangeId,
    /// Monotonic insertion order, used as tie-break for equal timestamps.
    pub sequence: i64,
    pub layout_id: LayoutId,
    pub scope: LayoutScope,
    pub actor_id: ActorId,
    pub kind: ChangeKind,
    pub snapshot: serde_json::Value,
    /// Epoch ms.
    pub created_at: i64,
}
