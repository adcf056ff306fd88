//! Build targets and the identifier registry.
//!
//! Every declared target gets a stable identifier derived from the directory
//! it was declared in, its name and its kind. The [`TargetRegistry`] owns the
//! identifier to target mapping for one project and enforces naming rules; a
//! parent project absorbs each subproject's registry when that subproject
//! finishes.

mod registry;
mod types;

pub use registry::{RegistryError, TargetGuids, TargetRegistry, validate_target_name};
pub use types::{BuildTarget, SourceFile, TargetId, TargetKind};
