//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Store writes enforce `Layout::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`,
//!   `DefaultLayout`) in addition to DB transport errors.
//! - Busy/locked storage is reported as `RepoError::Transient`.

pub mod change_log;
pub mod layout_store;
