//! SQLite usage probe over the externally maintained `layout_references` view.

use crate::model::layout::{LayoutId, LayoutScope};
use crate::repo::layout_store::RepoResult;
use crate::usage::index::UsageProbe;
use rusqlite::{params, Connection};

/// Probe answering for one entity kind from `layout_references`.
pub struct SqliteUsageProbe<'conn> {
    conn: &'conn Connection,
    entity_kind: String,
}

impl<'conn> SqliteUsageProbe<'conn> {
    pub fn new(conn: &'conn Connection, entity_kind: impl Into<String>) -> Self {
        Self {
            conn,
            entity_kind: entity_kind.into(),
        }
    }
}

impl UsageProbe for SqliteUsageProbe<'_> {
    fn entity_kind(&self) -> &str {
        &self.entity_kind
    }

    fn is_used(&self, layout_id: LayoutId, scope: &LayoutScope) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM layout_references
                WHERE entity_kind = ?1
                  AND layout_id = ?2
                  AND environment_id = ?3
            );",
            params![
                self.entity_kind.as_str(),
                layout_id.to_string(),
                scope.environment_id.to_string(),
            ],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}
