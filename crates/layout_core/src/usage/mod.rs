//! Layout usage lookups.
//!
//! # Responsibility
//! - Answer "is this layout referenced by any entity" across every entity
//!   kind registered at startup.
//!
//! # Invariants
//! - This module only reads references; referencing entities own them.
//! - No caching: every query goes to the probes.

pub mod index;
pub mod sqlite_probe;
