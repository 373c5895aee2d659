//! Layout domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by layout business logic.
//!
//! # Invariants
//! - Every layout is identified by a stable `LayoutId` within a `LayoutScope`.
//! - Deletion is represented by soft-delete tombstones, not hard delete.
//! - Change entries are append-only.

pub mod change;
pub mod layout;
