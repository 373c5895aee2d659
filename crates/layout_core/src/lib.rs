//! Core domain logic for environment-scoped notification layouts.
//! This crate is the single source of truth for layout business invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod usage;

pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::change::{ChangeEntry, ChangeId, ChangeKind, NewChange};
pub use model::layout::{
    slugify, ActorId, Layout, LayoutContentType, LayoutId, LayoutScope, LayoutValidationError,
    LayoutVariable,
};
pub use repo::change_log::{ChangeLog, SqliteChangeLog};
pub use repo::layout_store::{
    DefaultPromotion, DefaultSwap, EnsuredDefault, IdentifierMode, LayoutConflict, LayoutFilter,
    LayoutOrder, LayoutPage, LayoutPatch, LayoutStore, Pagination, RepoError, RepoResult,
    SqliteLayoutStore,
};
pub use service::default_coordinator::{DefaultChange, DefaultLayoutCoordinator};
pub use service::error::{InvalidOperation, LayoutError, LayoutErrorKind, LayoutResult};
pub use service::layout_service::{
    CreateLayoutCommand, FilterLayoutsQuery, FilterLayoutsResult, LayoutService,
    ServiceSettings, UpdateLayoutCommand,
};
pub use service::template::{
    builtin_layout, derive_layout_variables, BuiltinLayout, ContentValidationError,
    ContentValidator, HandlebarsContentValidator,
};
pub use usage::index::{UsageIndex, UsageProbe, UsageRegistryError, WORKFLOW_STEP_KIND};
pub use usage::sqlite_probe::SqliteUsageProbe;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
