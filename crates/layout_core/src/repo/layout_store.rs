//! Layout store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide scoped CRUD, filtering and tombstone bookkeeping over `layouts`.
//! - Own every mutation of layout records, including default-flag transitions.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths call `Layout::validate()` before SQL mutations.
//! - Multi-statement writes run in `BEGIN IMMEDIATE` transactions, so
//!   check-then-write sequences are serialized across connections.
//! - At most one active layout per environment has `is_default = 1`; the
//!   `layouts_one_default_per_environment` index backs this up.
//! - Read paths exclude tombstoned rows unless explicitly requested.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::layout::{
    Layout, LayoutContentType, LayoutId, LayoutScope, LayoutValidationError, LayoutVariable,
    MAX_LAYOUT_IDENTIFIER_CHARS,
};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Numbered suffixes tried before a derived identifier falls back to a random one.
const MAX_NUMBERED_IDENTIFIER_SUFFIX: u32 = 50;

/// Page size used when callers do not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
/// Largest page size a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Current time in epoch milliseconds, evaluated by SQLite.
pub(crate) const NOW_MS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

const LAYOUT_COLUMNS_SQL: &str = "
    id,
    environment_id,
    organization_id,
    creator_id,
    name,
    identifier,
    description,
    content,
    content_type,
    variables,
    is_default,
    deleted_at,
    created_at,
    updated_at";

pub type RepoResult<T> = Result<T, RepoError>;

/// Which uniqueness rule a write collided with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutConflict {
    Name(String),
    Identifier(String),
    /// Raised by a unique index when no pre-check caught the collision.
    Constraint(String),
}

impl Display for LayoutConflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(value) => write!(f, "layout name `{value}` is already in use"),
            Self::Identifier(value) => {
                write!(f, "layout identifier `{value}` is already in use")
            }
            Self::Constraint(message) => write!(f, "uniqueness violation: {message}"),
        }
    }
}

/// Repository error for layout persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(LayoutValidationError),
    Db(DbError),
    /// Lock wait exceeded the busy timeout; nothing was written.
    Transient(DbError),
    NotFound(LayoutId),
    Conflict(LayoutConflict),
    /// Target is the environment default and cannot be tombstoned.
    DefaultLayout(LayoutId),
    Serialization(serde_json::Error),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Transient(err) => write!(f, "storage temporarily unavailable: {err}"),
            Self::NotFound(id) => write!(f, "layout not found: {id}"),
            Self::Conflict(conflict) => write!(f, "{conflict}"),
            Self::DefaultLayout(id) => write!(f, "layout {id} is the environment default"),
            Self::Serialization(err) => write!(f, "layout serialization failed: {err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "layout store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted layout data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Transient(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::NotFound(_)
            | Self::Conflict(_)
            | Self::DefaultLayout(_)
            | Self::UninitializedConnection { .. }
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<LayoutValidationError> for RepoError {
    fn from(value: LayoutValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        let (code, extended_code) = match &value {
            rusqlite::Error::SqliteFailure(err, _) => (Some(err.code), err.extended_code),
            _ => (None, 0),
        };
        match code {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                Self::Transient(DbError::Sqlite(value))
            }
            Some(ErrorCode::ConstraintViolation)
                if extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Self::Conflict(LayoutConflict::Constraint(value.to_string()))
            }
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}

/// How an inserted layout relates to the environment default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPromotion {
    /// Insert as a regular layout.
    Never,
    /// Make it the default when the environment has no active default.
    IfVacant,
}

/// How `LayoutStore::insert` treats the layout identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierMode {
    /// Store the identifier as given; a taken identifier is a conflict.
    Exact,
    /// Treat the identifier as a base slug and suffix it (`-2`, `-3`, ...)
    /// until it is free in the environment.
    DeriveUnique,
}

/// Partial update applied by `LayoutStore::update`.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutPatch {
    pub name: Option<String>,
    pub identifier: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub content: Option<String>,
    pub content_type: Option<LayoutContentType>,
    pub variables: Option<Vec<LayoutVariable>>,
}

impl LayoutPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Sort order for filtered listings. `id ASC` is always the final tie-break.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayoutOrder {
    #[default]
    NewestFirst,
    OldestFirst,
    NameAscending,
}

impl LayoutOrder {
    fn order_by_sql(self) -> &'static str {
        match self {
            Self::NewestFirst => " ORDER BY created_at DESC, id ASC",
            Self::OldestFirst => " ORDER BY created_at ASC, id ASC",
            Self::NameAscending => " ORDER BY name_folded ASC, created_at ASC, id ASC",
        }
    }
}

/// Filter criteria for layout listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutFilter {
    /// Case-insensitive substring match on `name`.
    pub name_contains: Option<String>,
    pub include_deleted: bool,
    pub order: LayoutOrder,
}

/// Offset + limit pagination. `limit = None` returns every remaining row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub limit: Option<u32>,
    pub offset: u32,
}

/// One page of a filtered listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPage {
    pub items: Vec<Layout>,
    /// Rows matching the filter, ignoring pagination.
    pub total_count: u64,
}

/// Outcome of a compare-and-swap on the environment default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultSwap {
    /// `next` already was the default; nothing was written.
    Unchanged(Layout),
    /// Default moved from `previous` (if any) to `current`.
    Swapped {
        previous: Option<Layout>,
        current: Layout,
    },
    /// The observed default no longer matches the expected one.
    Stale { current: Option<LayoutId> },
}

/// Outcome of a conditional bootstrap-default insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsuredDefault {
    Existing(Layout),
    Created(Layout),
}

impl EnsuredDefault {
    pub fn layout(&self) -> &Layout {
        match self {
            Self::Existing(layout) | Self::Created(layout) => layout,
        }
    }

    pub fn into_layout(self) -> Layout {
        match self {
            Self::Existing(layout) | Self::Created(layout) => layout,
        }
    }
}

/// Normalizes a requested page size.
pub fn normalize_page_limit(limit: Option<u32>, default_limit: u32, max_limit: u32) -> u32 {
    match limit {
        Some(0) | None => default_limit.min(max_limit),
        Some(value) => value.min(max_limit),
    }
}

/// Persistence contract for layout records.
pub trait LayoutStore {
    /// Inserts a new active layout; the input `is_default` flag is ignored in
    /// favour of `promotion`.
    fn insert(
        &self,
        layout: &Layout,
        promotion: DefaultPromotion,
        identifier: IdentifierMode,
    ) -> RepoResult<Layout>;
    fn get_by_id(
        &self,
        id: LayoutId,
        scope: &LayoutScope,
        include_deleted: bool,
    ) -> RepoResult<Option<Layout>>;
    /// Applies `patch` to an active layout.
    fn update(&self, id: LayoutId, scope: &LayoutScope, patch: &LayoutPatch)
        -> RepoResult<Layout>;
    /// Tombstones an active, non-default layout.
    fn soft_delete(&self, id: LayoutId, scope: &LayoutScope) -> RepoResult<()>;
    /// Clears the tombstone of a deleted layout.
    ///
    /// A taken name is a conflict; a taken identifier is replaced by a free
    /// suffixed one.
    fn restore(&self, id: LayoutId, scope: &LayoutScope) -> RepoResult<Layout>;
    fn filter(
        &self,
        scope: &LayoutScope,
        criteria: &LayoutFilter,
        pagination: &Pagination,
    ) -> RepoResult<LayoutPage>;
    /// Loads a layout only if it is tombstoned.
    fn find_deleted(&self, id: LayoutId, scope: &LayoutScope) -> RepoResult<Option<Layout>>;
    fn current_default(&self, scope: &LayoutScope) -> RepoResult<Option<Layout>>;
    /// Moves the default to `next` iff the current default equals `expected`.
    fn compare_and_swap_default(
        &self,
        scope: &LayoutScope,
        expected: Option<LayoutId>,
        next: LayoutId,
    ) -> RepoResult<DefaultSwap>;
    /// Inserts `layout` as default unless the environment already has one.
    fn insert_default_if_absent(&self, layout: &Layout) -> RepoResult<EnsuredDefault>;
}

/// SQLite-backed layout store.
pub struct SqliteLayoutStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLayoutStore<'conn> {
    /// Creates a store from a fully migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let actual_version: u32 =
            conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    fn begin_immediate(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl LayoutStore for SqliteLayoutStore<'_> {
    fn insert(
        &self,
        layout: &Layout,
        promotion: DefaultPromotion,
        identifier: IdentifierMode,
    ) -> RepoResult<Layout> {
        layout.validate()?;

        let tx = self.begin_immediate()?;
        let mut layout = layout.clone();
        if identifier == IdentifierMode::DeriveUnique {
            layout.identifier = free_identifier_in(&tx, &layout.scope, &layout.identifier)?;
        }
        ensure_unique_in(&tx, &layout.scope, &layout.name, &layout.identifier, None)?;
        let is_default = match promotion {
            DefaultPromotion::Never => false,
            DefaultPromotion::IfVacant => current_default_id_in(&tx, &layout.scope)?.is_none(),
        };
        insert_row(&tx, &layout, is_default)?;
        let stored = load_required(&tx, layout.id, &layout.scope)?;
        tx.commit()?;
        Ok(stored)
    }

    fn get_by_id(
        &self,
        id: LayoutId,
        scope: &LayoutScope,
        include_deleted: bool,
    ) -> RepoResult<Option<Layout>> {
        let visibility = if include_deleted {
            Visibility::Any
        } else {
            Visibility::Active
        };
        load_layout(self.conn, id, scope, visibility)
    }

    fn update(
        &self,
        id: LayoutId,
        scope: &LayoutScope,
        patch: &LayoutPatch,
    ) -> RepoResult<Layout> {
        let tx = self.begin_immediate()?;
        let mut layout = load_required(&tx, id, scope)?;
        if patch.is_empty() {
            return Ok(layout);
        }

        if let Some(name) = patch.name.as_ref() {
            layout.name = name.clone();
        }
        if let Some(identifier) = patch.identifier.as_ref() {
            layout.identifier = identifier.clone();
        }
        if let Some(description) = patch.description.as_ref() {
            layout.description = description.clone();
        }
        if let Some(content) = patch.content.as_ref() {
            layout.content = content.clone();
        }
        if let Some(content_type) = patch.content_type {
            layout.content_type = content_type;
        }
        if let Some(variables) = patch.variables.as_ref() {
            layout.variables = variables.clone();
        }
        layout.validate()?;
        ensure_unique_in(&tx, scope, &layout.name, &layout.identifier, Some(id))?;

        let changed = tx.execute(
            &format!(
                "UPDATE layouts
                 SET
                    name = ?4,
                    name_folded = ?10,
                    identifier = ?5,
                    description = ?6,
                    content = ?7,
                    content_type = ?8,
                    variables = ?9,
                    updated_at = {NOW_MS_SQL}
                 WHERE id = ?1
                   AND environment_id = ?2
                   AND organization_id = ?3
                   AND deleted_at IS NULL;"
            ),
            params![
                id.to_string(),
                scope.environment_id.to_string(),
                scope.organization_id.to_string(),
                layout.name.as_str(),
                layout.identifier.as_str(),
                layout.description.as_deref(),
                layout.content.as_str(),
                layout.content_type.as_str(),
                serde_json::to_string(&layout.variables)?,
                fold_name(&layout.name),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        let stored = load_required(&tx, id, scope)?;
        tx.commit()?;
        Ok(stored)
    }

    fn soft_delete(&self, id: LayoutId, scope: &LayoutScope) -> RepoResult<()> {
        let tx = self.begin_immediate()?;
        let layout = load_required(&tx, id, scope)?;
        if layout.is_default {
            return Err(RepoError::DefaultLayout(id));
        }

        let changed = tx.execute(
            &format!(
                "UPDATE layouts
                 SET
                    deleted_at = {NOW_MS_SQL},
                    updated_at = {NOW_MS_SQL}
                 WHERE id = ?1
                   AND environment_id = ?2
                   AND organization_id = ?3
                   AND deleted_at IS NULL
                   AND is_default = 0;"
            ),
            scope_params(id, scope),
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        tx.commit()?;
        Ok(())
    }

    fn restore(&self, id: LayoutId, scope: &LayoutScope) -> RepoResult<Layout> {
        let tx = self.begin_immediate()?;
        let layout = load_layout(&tx, id, scope, Visibility::Deleted)?
            .ok_or(RepoError::NotFound(id))?;
        // The slug may have been handed out while this layout was deleted.
        let identifier = free_identifier_in(&tx, scope, &layout.identifier)?;
        ensure_unique_in(&tx, scope, &layout.name, &identifier, Some(id))?;
        let promote = current_default_id_in(&tx, scope)?.is_none();

        tx.execute(
            &format!(
                "UPDATE layouts
                 SET
                    deleted_at = NULL,
                    is_default = ?4,
                    identifier = ?5,
                    updated_at = {NOW_MS_SQL}
                 WHERE id = ?1
                   AND environment_id = ?2
                   AND organization_id = ?3
                   AND deleted_at IS NOT NULL;"
            ),
            params![
                id.to_string(),
                scope.environment_id.to_string(),
                scope.organization_id.to_string(),
                bool_to_int(promote),
                identifier.as_str(),
            ],
        )?;

        let stored = load_required(&tx, id, scope)?;
        tx.commit()?;
        Ok(stored)
    }

    fn filter(
        &self,
        scope: &LayoutScope,
        criteria: &LayoutFilter,
        pagination: &Pagination,
    ) -> RepoResult<LayoutPage> {
        let mut where_sql = String::from(" WHERE environment_id = ? AND organization_id = ?");
        let mut bind_values: Vec<Value> = vec![
            Value::Text(scope.environment_id.to_string()),
            Value::Text(scope.organization_id.to_string()),
        ];

        if !criteria.include_deleted {
            where_sql.push_str(" AND deleted_at IS NULL");
        }

        if let Some(needle) = criteria
            .name_contains
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            where_sql.push_str(" AND instr(name_folded, ?) > 0");
            bind_values.push(Value::Text(fold_name(needle)));
        }

        let total_count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM layouts{where_sql};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        let mut sql = format!("SELECT {LAYOUT_COLUMNS_SQL} FROM layouts{where_sql}");
        sql.push_str(criteria.order.order_by_sql());
        if let Some(limit) = pagination.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if pagination.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(pagination.offset)));
            }
        } else if pagination.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(pagination.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_layout_row(row)?);
        }

        Ok(LayoutPage {
            items,
            total_count: u64::try_from(total_count).unwrap_or(0),
        })
    }

    fn find_deleted(&self, id: LayoutId, scope: &LayoutScope) -> RepoResult<Option<Layout>> {
        load_layout(self.conn, id, scope, Visibility::Deleted)
    }

    fn current_default(&self, scope: &LayoutScope) -> RepoResult<Option<Layout>> {
        match current_default_id_in(self.conn, scope)? {
            Some(id) => load_layout(self.conn, id, scope, Visibility::Active),
            None => Ok(None),
        }
    }

    fn compare_and_swap_default(
        &self,
        scope: &LayoutScope,
        expected: Option<LayoutId>,
        next: LayoutId,
    ) -> RepoResult<DefaultSwap> {
        let tx = self.begin_immediate()?;
        let target = load_required(&tx, next, scope)?;
        let current = current_default_id_in(&tx, scope)?;

        if current == Some(next) {
            return Ok(DefaultSwap::Unchanged(target));
        }
        if current != expected {
            return Ok(DefaultSwap::Stale { current });
        }

        if let Some(previous_id) = current {
            tx.execute(
                &format!(
                    "UPDATE layouts
                     SET
                        is_default = 0,
                        updated_at = {NOW_MS_SQL}
                     WHERE id = ?1
                       AND environment_id = ?2
                       AND organization_id = ?3
                       AND is_default = 1;"
                ),
                scope_params(previous_id, scope),
            )?;
        }

        let changed = tx.execute(
            &format!(
                "UPDATE layouts
                 SET
                    is_default = 1,
                    updated_at = {NOW_MS_SQL}
                 WHERE id = ?1
                   AND environment_id = ?2
                   AND organization_id = ?3
                   AND deleted_at IS NULL;"
            ),
            scope_params(next, scope),
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(next));
        }

        let previous = match current {
            Some(previous_id) => Some(load_required(&tx, previous_id, scope)?),
            None => None,
        };
        let current = load_required(&tx, next, scope)?;
        tx.commit()?;

        Ok(DefaultSwap::Swapped { previous, current })
    }

    fn insert_default_if_absent(&self, layout: &Layout) -> RepoResult<EnsuredDefault> {
        layout.validate()?;

        let tx = self.begin_immediate()?;
        if let Some(existing_id) = current_default_id_in(&tx, &layout.scope)? {
            let existing = load_required(&tx, existing_id, &layout.scope)?;
            return Ok(EnsuredDefault::Existing(existing));
        }

        ensure_unique_in(&tx, &layout.scope, &layout.name, &layout.identifier, None)?;
        insert_row(&tx, layout, true)?;
        let stored = load_required(&tx, layout.id, &layout.scope)?;
        tx.commit()?;
        Ok(EnsuredDefault::Created(stored))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    Active,
    Deleted,
    Any,
}

fn insert_row(conn: &Connection, layout: &Layout, is_default: bool) -> RepoResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO layouts (
                id,
                environment_id,
                organization_id,
                creator_id,
                name,
                name_folded,
                identifier,
                description,
                content,
                content_type,
                variables,
                is_default,
                deleted_at,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?12, ?6, ?7, ?8, ?9, ?10, ?11, NULL, {NOW_MS_SQL}, {NOW_MS_SQL});"
        ),
        params![
            layout.id.to_string(),
            layout.scope.environment_id.to_string(),
            layout.scope.organization_id.to_string(),
            layout.creator_id.to_string(),
            layout.name.as_str(),
            layout.identifier.as_str(),
            layout.description.as_deref(),
            layout.content.as_str(),
            layout.content_type.as_str(),
            serde_json::to_string(&layout.variables)?,
            bool_to_int(is_default),
            fold_name(&layout.name),
        ],
    )?;
    Ok(())
}

fn load_layout(
    conn: &Connection,
    id: LayoutId,
    scope: &LayoutScope,
    visibility: Visibility,
) -> RepoResult<Option<Layout>> {
    let visibility_sql = match visibility {
        Visibility::Active => " AND deleted_at IS NULL",
        Visibility::Deleted => " AND deleted_at IS NOT NULL",
        Visibility::Any => "",
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {LAYOUT_COLUMNS_SQL}
         FROM layouts
         WHERE id = ?1
           AND environment_id = ?2
           AND organization_id = ?3{visibility_sql};"
    ))?;

    let mut rows = stmt.query(scope_params(id, scope))?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_layout_row(row)?));
    }
    Ok(None)
}

fn load_required(conn: &Connection, id: LayoutId, scope: &LayoutScope) -> RepoResult<Layout> {
    load_layout(conn, id, scope, Visibility::Active)?.ok_or(RepoError::NotFound(id))
}

fn current_default_id_in(conn: &Connection, scope: &LayoutScope) -> RepoResult<Option<LayoutId>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT id
             FROM layouts
             WHERE environment_id = ?1
               AND organization_id = ?2
               AND is_default = 1
               AND deleted_at IS NULL
             LIMIT 1;",
            params![
                scope.environment_id.to_string(),
                scope.organization_id.to_string(),
            ],
            |row| row.get(0),
        )
        .optional()?;
    value.as_deref().map(|text| parse_uuid(text, "id")).transpose()
}

fn ensure_unique_in(
    conn: &Connection,
    scope: &LayoutScope,
    name: &str,
    identifier: &str,
    exclude: Option<LayoutId>,
) -> RepoResult<()> {
    let exclude_text = exclude.map(|id| id.to_string());
    let (name_taken, identifier_taken): (i64, i64) = conn.query_row(
        "SELECT
            EXISTS(
                SELECT 1 FROM layouts
                WHERE environment_id = ?1
                  AND deleted_at IS NULL
                  AND name = ?2
                  AND (?4 IS NULL OR id <> ?4)
            ),
            EXISTS(
                SELECT 1 FROM layouts
                WHERE environment_id = ?1
                  AND deleted_at IS NULL
                  AND identifier = ?3
                  AND (?4 IS NULL OR id <> ?4)
            );",
        params![
            scope.environment_id.to_string(),
            name,
            identifier,
            exclude_text,
        ],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    if name_taken == 1 {
        return Err(RepoError::Conflict(LayoutConflict::Name(name.to_string())));
    }
    if identifier_taken == 1 {
        return Err(RepoError::Conflict(LayoutConflict::Identifier(
            identifier.to_string(),
        )));
    }
    Ok(())
}

/// Returns `base`, or the first `base-N` not used by an active layout.
///
/// Falls back to a suffix from a fresh UUID once the numbered range is used up.
fn free_identifier_in(conn: &Connection, scope: &LayoutScope, base: &str) -> RepoResult<String> {
    let mut stmt = conn.prepare(
        "SELECT EXISTS(
            SELECT 1 FROM layouts
            WHERE environment_id = ?1
              AND deleted_at IS NULL
              AND identifier = ?2
        );",
    )?;
    let environment_id = scope.environment_id.to_string();
    let mut is_taken = |candidate: &str| -> RepoResult<bool> {
        let taken: i64 =
            stmt.query_row(params![environment_id.as_str(), candidate], |row| row.get(0))?;
        Ok(taken == 1)
    };

    if !is_taken(base)? {
        return Ok(base.to_string());
    }
    for n in 2..=MAX_NUMBERED_IDENTIFIER_SUFFIX {
        let candidate = suffixed_identifier(base, &n.to_string());
        if !is_taken(&candidate)? {
            return Ok(candidate);
        }
    }
    let random = Uuid::new_v4().simple().to_string();
    Ok(suffixed_identifier(base, &random[..8]))
}

fn suffixed_identifier(base: &str, suffix: &str) -> String {
    let room = MAX_LAYOUT_IDENTIFIER_CHARS.saturating_sub(suffix.len() + 1);
    let stem: String = base.chars().take(room).collect();
    format!("{}-{suffix}", stem.trim_end_matches('-'))
}

/// Case-folded name used for case-insensitive matching and ordering.
fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

fn parse_layout_row(row: &Row<'_>) -> RepoResult<Layout> {
    let id: String = row.get("id")?;
    let environment_id: String = row.get("environment_id")?;
    let organization_id: String = row.get("organization_id")?;
    let creator_id: String = row.get("creator_id")?;

    let content_type_text: String = row.get("content_type")?;
    let content_type = LayoutContentType::parse(&content_type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid content type `{content_type_text}` in layouts.content_type"
        ))
    })?;

    let variables_text: String = row.get("variables")?;
    let variables: Vec<LayoutVariable> = serde_json::from_str(&variables_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid json in layouts.variables: {err}"))
    })?;

    let is_default = match row.get::<_, i64>("is_default")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_default value `{other}` in layouts.is_default"
            )));
        }
    };

    let layout = Layout {
        id: parse_uuid(&id, "id")?,
        scope: LayoutScope {
            environment_id: parse_uuid(&environment_id, "environment_id")?,
            organization_id: parse_uuid(&organization_id, "organization_id")?,
        },
        creator_id: parse_uuid(&creator_id, "creator_id")?,
        name: row.get("name")?,
        identifier: row.get("identifier")?,
        description: row.get("description")?,
        content: row.get("content")?,
        content_type,
        variables,
        is_default,
        deleted_at: row.get("deleted_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    layout.validate()?;
    Ok(layout)
}

fn scope_params(id: LayoutId, scope: &LayoutScope) -> [String; 3] {
    [
        id.to_string(),
        scope.environment_id.to_string(),
        scope.organization_id.to_string(),
    ]
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{value}` in column {column}"))
    })
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
