use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use super::types::ExternalDependency;
use crate::consts::UNDEFINED_VERSION;
use crate::machine::MachineChoice;

/// Detects dependencies installed on the system.
pub trait DependencyProbe {
  /// Look for `name`. `options` carries the lookup keywords (`method`,
  /// `static`, `modules`, ...) rendered as strings.
  fn find(&self, name: &str, machine: MachineChoice, options: &BTreeMap<String, String>) -> Option<ExternalDependency>;

  /// Short description used in "not found" messages.
  fn describe(&self) -> String;
}

/// A probe that never finds anything.
#[derive(Debug, Clone, Default)]
pub struct NullProbe;

impl DependencyProbe for NullProbe {
  fn find(&self, _name: &str, _machine: MachineChoice, _options: &BTreeMap<String, String>) -> Option<ExternalDependency> {
    None
  }

  fn describe(&self) -> String {
    "nothing".to_string()
  }
}

/// Errors loading a system dependencies file.
#[derive(Debug, Error)]
pub enum ProbeError {
  #[error("failed to read system dependencies file {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse system dependencies file {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StaticEntry {
  #[serde(default)]
  version: Option<String>,
  #[serde(default)]
  compile_args: Vec<String>,
  #[serde(default)]
  link_args: Vec<String>,
  #[serde(default)]
  variables: BTreeMap<String, String>,
  /// Restrict the entry to one machine; both when absent.
  #[serde(default)]
  machine: Option<MachineChoice>,
}

/// A fixed set of "installed" dependencies, typically loaded from a JSON file.
///
/// ```json
/// {
///   "zlib": { "version": "1.3", "link_args": ["-lz"] },
///   "glib-2.0": { "version": "2.80.0", "machine": "build" }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
  entries: BTreeMap<String, StaticEntry>,
}

impl StaticProbe {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder-style helper adding a dependency with the given version.
  pub fn with(mut self, name: &str, version: &str) -> Self {
    self.entries.insert(
      name.to_string(),
      StaticEntry {
        version: Some(version.to_string()),
        ..Default::default()
      },
    );
    self
  }

  pub fn from_json(content: &str, path: &Path) -> Result<Self, ProbeError> {
    let entries = serde_json::from_str(content).map_err(|source| ProbeError::Parse {
      path: path.display().to_string(),
      source,
    })?;
    Ok(Self { entries })
  }

  pub fn load(path: &Path) -> Result<Self, ProbeError> {
    let content = fs::read_to_string(path).map_err(|source| ProbeError::Read {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_json(&content, path)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl DependencyProbe for StaticProbe {
  fn find(&self, name: &str, machine: MachineChoice, _options: &BTreeMap<String, String>) -> Option<ExternalDependency> {
    let entry = self.entries.get(name)?;
    if entry.machine.is_some_and(|m| m != machine) {
      return None;
    }
    Some(ExternalDependency {
      name: name.to_string(),
      version: entry.version.clone().unwrap_or_else(|| UNDEFINED_VERSION.to_string()),
      method: "system-deps".to_string(),
      compile_args: entry.compile_args.clone(),
      link_args: entry.link_args.clone(),
      variables: entry.variables.clone(),
    })
  }

  fn describe(&self) -> String {
    "system-deps".to_string()
  }
}

/// Looks dependencies up with `pkg-config` (or `$PKG_CONFIG`).
#[derive(Debug, Clone)]
pub struct PkgConfigProbe {
  binary: String,
}

impl Default for PkgConfigProbe {
  fn default() -> Self {
    Self::new()
  }
}

impl PkgConfigProbe {
  pub fn new() -> Self {
    let binary = std::env::var("PKG_CONFIG").unwrap_or_else(|_| "pkg-config".to_string());
    Self { binary }
  }

  fn query(&self, args: &[&str]) -> Option<String> {
    trace!(binary = %self.binary, ?args, "running pkg-config");
    let output = Command::new(&self.binary).args(args).output().ok()?;
    if !output.status.success() {
      return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }
}

impl DependencyProbe for PkgConfigProbe {
  fn find(&self, name: &str, _machine: MachineChoice, options: &BTreeMap<String, String>) -> Option<ExternalDependency> {
    if let Some(method) = options.get("method")
      && method != "auto"
      && method != "pkg-config"
    {
      return None;
    }
    let version = self.query(&["--modversion", name])?;
    let mut libs_args = vec!["--libs"];
    if options.get("static").is_some_and(|s| s == "true") {
      libs_args.push("--static");
    }
    libs_args.push(name);
    let cflags = self.query(&["--cflags", name]).unwrap_or_default();
    let libs = self.query(&libs_args).unwrap_or_default();
    debug!(name, %version, "pkg-config found dependency");
    Some(ExternalDependency {
      name: name.to_string(),
      version,
      method: "pkg-config".to_string(),
      compile_args: cflags.split_whitespace().map(String::from).collect(),
      link_args: libs.split_whitespace().map(String::from).collect(),
      variables: BTreeMap::new(),
    })
  }

  fn describe(&self) -> String {
    "pkg-config".to_string()
  }
}

/// Tries each probe in order; the first hit wins.
#[derive(Default)]
pub struct ChainProbe {
  probes: Vec<Box<dyn DependencyProbe>>,
}

impl ChainProbe {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(mut self, probe: Box<dyn DependencyProbe>) -> Self {
    self.probes.push(probe);
    self
  }
}

impl DependencyProbe for ChainProbe {
  fn find(&self, name: &str, machine: MachineChoice, options: &BTreeMap<String, String>) -> Option<ExternalDependency> {
    self.probes.iter().find_map(|p| p.find(name, machine, options))
  }

  fn describe(&self) -> String {
    if self.probes.is_empty() {
      return NullProbe.describe();
    }
    self.probes.iter().map(|p| p.describe()).collect::<Vec<_>>().join(", ")
  }
}
