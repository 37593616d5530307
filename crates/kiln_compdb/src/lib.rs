//! Compile-command database transformation and recovery.
//!
//! The build system generates a `compile_commands.json` listing one compiler
//! invocation per source file. Static-analysis tools read it, but they should
//! not see sources emitted by code generators. This crate backs the database
//! up, swaps in a filtered view for the duration of an analysis run, and
//! restores the original however that run ends.

#![warn(missing_docs)]

pub mod database;
pub mod error;
pub mod filter;
pub mod store;
pub mod transform;

pub use database::{InvocationDatabase, InvocationRecord};
pub use error::CompdbError;
pub use filter::{filter, filter_with_report, generated_files, is_generated, FilterReport};
pub use store::{ArtifactStore, Snapshot, StoreLayout, TransformState};
pub use transform::{ApplyOutcome, BackedGuard, GuardedTransform, RestoreOutcome};
