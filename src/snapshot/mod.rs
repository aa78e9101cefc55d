//! Schema Snapshot Module
//!
//! The heart of SchemaWatch - capturing what the database looks like and
//! detecting what changed. This module provides:
//! - Schema snapshots (point-in-time captures, compressed payloads)
//! - Schema diff engine (comparing a baseline against the current state)
//! - Versioned snapshot storage with baseline promotion

pub mod capture;
pub mod diff;
pub mod store;

#[allow(unused_imports)]
pub use capture::{SchemaSnapshot, SnapshotEngine, SnapshotType};
#[allow(unused_imports)]
pub use diff::DiffEngine;
#[allow(unused_imports)]
pub use store::{SnapshotMetadata, SnapshotStore};
