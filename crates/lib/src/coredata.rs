//! Configuration state persisted in the build directory.
//!
//! Stored as `<build>/kiln-private/coredata.json` and reused by the next
//! evaluation of the same build directory: target build identifier tokens
//! keep their values, and system dependency probe results are served from the
//! cache instead of probing again.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "target_guids": { "app@exe": "0F6C1A0E-..." },
//!   "deps": { "host": [ { "key": { "name": "zlib" }, "dep": { "name": "zlib", "version": "1.3" } } ], "build": [] },
//!   "initialized_subprojects": ["zlib"]
//! }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{COREDATA_FILENAME, PRIVATE_DIRNAME};
use crate::dependency::CachedDependency;
use crate::machine::PerMachine;
use crate::target::TargetGuids;

/// Current core data format version.
pub const COREDATA_VERSION: u32 = 1;

/// Errors reading or writing core data.
#[derive(Debug, Error)]
pub enum CoreDataError {
  #[error("failed to read core data: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write core data: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse core data: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize core data: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported core data version {0}, expected {COREDATA_VERSION}")]
  UnsupportedVersion(u32),
}

/// Persisted configuration state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreData {
  pub version: u32,
  #[serde(default)]
  pub target_guids: TargetGuids,
  /// Implicit dependency cache, per machine.
  #[serde(default)]
  pub deps: PerMachine<Vec<CachedDependency>>,
  /// Subprojects that completed at least one successful evaluation.
  #[serde(default)]
  pub initialized_subprojects: BTreeSet<String>,
}

impl Default for CoreData {
  fn default() -> Self {
    Self::new()
  }
}

impl CoreData {
  pub fn new() -> Self {
    Self {
      version: COREDATA_VERSION,
      target_guids: TargetGuids::default(),
      deps: PerMachine::default(),
      initialized_subprojects: BTreeSet::new(),
    }
  }

  /// Location of the core data file for a build directory.
  pub fn path_in(build_root: &Path) -> PathBuf {
    build_root.join(PRIVATE_DIRNAME).join(COREDATA_FILENAME)
  }

  /// Load core data from `path`.
  ///
  /// Returns `Ok(None)` if the file doesn't exist.
  pub fn load(path: &Path) -> Result<Option<Self>, CoreDataError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(CoreDataError::Read(e)),
    };

    let data: CoreData = serde_json::from_str(&content).map_err(CoreDataError::Parse)?;
    if data.version != COREDATA_VERSION {
      return Err(CoreDataError::UnsupportedVersion(data.version));
    }
    Ok(Some(data))
  }

  /// Save core data to `path`, creating the parent directory if needed.
  pub fn save(&self, path: &Path) -> Result<(), CoreDataError> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(CoreDataError::Write)?;
    }
    let content = serde_json::to_string_pretty(self).map_err(CoreDataError::Serialize)?;
    fs::write(path, content).map_err(CoreDataError::Write)?;
    Ok(())
  }
}
