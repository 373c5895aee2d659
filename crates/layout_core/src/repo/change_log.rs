//! Layout change-trail contract and SQLite implementation.
//!
//! # Responsibility
//! - Append immutable change entries for committed layout mutations.
//! - List the trail of one layout in commit order.
//!
//! # Invariants
//! - The change log never updates or deletes rows.
//! - It is independent from `LayoutStore`: appending never touches `layouts`.

use crate::model::change::{ChangeEntry, ChangeKind, NewChange};
use crate::model::layout::{LayoutId, LayoutScope};
use crate::repo::layout_store::{parse_uuid, RepoError, RepoResult, NOW_MS_SQL};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Append-only audit trail for layouts.
pub trait ChangeLog {
    fn append(&self, change: &NewChange) -> RepoResult<ChangeEntry>;
    /// Returns entries of one layout ordered by `created_at ASC, sequence ASC`.
    fn list_for_layout(
        &self,
        layout_id: LayoutId,
        scope: &LayoutScope,
    ) -> RepoResult<Vec<ChangeEntry>>;
}

/// SQLite-backed change log over `layout_changes`.
pub struct SqliteChangeLog<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteChangeLog<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ChangeLog for SqliteChangeLog<'_> {
    fn append(&self, change: &NewChange) -> RepoResult<ChangeEntry> {
        let id = Uuid::new_v4();
        self.conn.execute(
            &format!(
                "INSERT INTO layout_changes (
                    id,
                    layout_id,
                    environment_id,
                    organization_id,
                    actor_id,
                    kind,
                    snapshot,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, {NOW_MS_SQL});"
            ),
            params![
                id.to_string(),
                change.layout_id.to_string(),
                change.scope.environment_id.to_string(),
                change.scope.organization_id.to_string(),
                change.actor_id.to_string(),
                change.kind.as_str(),
                serde_json::to_string(&change.snapshot)?,
            ],
        )?;

        let entry = self.conn.query_row(
            "SELECT
                sequence,
                id,
                layout_id,
                environment_id,
                organization_id,
                actor_id,
                kind,
                snapshot,
                created_at
             FROM layout_changes
             WHERE id = ?1;",
            [id.to_string()],
            |row| Ok(parse_change_row(row)),
        )??;
        Ok(entry)
    }

    fn list_for_layout(
        &self,
        layout_id: LayoutId,
        scope: &LayoutScope,
    ) -> RepoResult<Vec<ChangeEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                sequence,
                id,
                layout_id,
                environment_id,
                organization_id,
                actor_id,
                kind,
                snapshot,
                created_at
             FROM layout_changes
             WHERE layout_id = ?1
               AND environment_id = ?2
               AND organization_id = ?3
             ORDER BY created_at ASC, sequence ASC;",
        )?;
        let mut rows = stmt.query(params![
            layout_id.to_string(),
            scope.environment_id.to_string(),
            scope.organization_id.to_string(),
        ])?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_change_row(row)?);
        }
        Ok(entries)
    }
}

fn parse_change_row(row: &Row<'_>) -> RepoResult<ChangeEntry> {
    let id: String = row.get("id")?;
    let layout_id: String = row.get("layout_id")?;
    let environment_id: String = row.get("environment_id")?;
    let organization_id: String = row.get("organization_id")?;
    let actor_id: String = row.get("actor_id")?;

    let kind_text: String = row.get("kind")?;
    let kind = ChangeKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid change kind `{kind_text}` in layout_changes.kind"))
    })?;

    let snapshot_text: String = row.get("snapshot")?;
    let snapshot = serde_json::from_str(&snapshot_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid json in layout_changes.snapshot: {err}"))
    })?;

    Ok(ChangeEntry {
        id: parse_uuid(&id, "id")?,
        sequence: row.get("sequence")?,
        layout_id: parse_uuid(&layout_id, "layout_id")?,
        scope: LayoutScope {
            environment_id: parse_uuid(&environment_id, "environment_id")?,
            organization_id: parse_uuid(&organization_id, "organization_id")?,
        },
        actor_id: parse_uuid(&actor_id, "actor_id")?,
        kind,
        snapshot,
        created_at: row.get("created_at")?,
    })
}
