//! Subproject handles, the per-run subproject cache, and source resolution.
//!
//! A subproject moves through `Unvisited -> InProgress -> {Ready, Disabled,
//! Failed}`. The cache is keyed by subproject name and shared by every
//! project of a run, so a subproject reached through several paths (a direct
//! `subproject()` call and a dependency fallback, or a diamond) is evaluated
//! at most once.

mod types;
pub mod wrap;

pub use types::{Outcome, Subproject, SubprojectCache, SubprojectEntry, SubprojectState};
pub use wrap::{SourceResolver, WrapError, WrapResolver};
