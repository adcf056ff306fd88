//! Dependencies, their cache identities, and the caches that hold them.
//!
//! A lookup goes through three layers: the per-run override table (explicit
//! overrides from `kiln.override_dependency()` and implicit ones recorded after
//! every successful lookup), the process-wide implicit cache of probe results
//! (persisted in the build directory), and finally the external probe. The
//! resolution algorithm itself lives in `interpreter::dependency`.

mod cache;
mod probe;
mod types;

pub use cache::{CacheLookup, CacheSource, CachedDependency, DependencyOverride, DependencyOverrides, ImplicitCache};
pub use probe::{ChainProbe, DependencyProbe, NullProbe, PkgConfigProbe, ProbeError, StaticProbe};
pub use types::{Dependency, DependencyKey, ExternalDependency, InternalDependency};

/// Lookup keywords that do not take part in the cache identity.
pub const KEY_IGNORED_KWARGS: &[&str] = &[
  "version",
  "native",
  "required",
  "fallback",
  "allow_fallback",
  "default_options",
  "not_found_message",
  "include_type",
  "disabler",
];
