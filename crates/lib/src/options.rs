//! Configuration options.
//!
//! Options come from three places, in increasing priority: built-in defaults,
//! `default_options` of `project()` (and of the `subproject()` call that
//! entered a subproject), and `-D key=value` on the command line. A
//! command-line key may be scoped to one subproject as `subproject:key`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Built-in options and their defaults.
pub const BUILTIN_OPTIONS: &[(&str, &str)] = &[
  ("buildtype", "debug"),
  ("default_library", "shared"),
  ("wrap_mode", "default"),
  ("force_fallback_for", ""),
];

/// Errors parsing option values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionError {
  #[error("option '{0}' must be of the form key=value")]
  MissingValue(String),

  #[error("invalid wrap mode '{0}', expected one of: default, nofallback, nodownload, forcefallback, nopromote")]
  InvalidWrapMode(String),

  #[error("invalid value '{value}' for option '{key}'")]
  InvalidValue { key: String, value: String },
}

/// How subproject fallbacks and wrap files are used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapMode {
  #[default]
  Default,
  /// Never fall back to a subproject for a dependency.
  NoFallback,
  /// Never download sources. Sources are never downloaded anyway, so this
  /// behaves like `default`.
  NoDownload,
  /// Always use the fallback subproject, without probing the system.
  ForceFallback,
  /// Do not promote wraps found inside subprojects.
  NoPromote,
}

impl WrapMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Default => "default",
      Self::NoFallback => "nofallback",
      Self::NoDownload => "nodownload",
      Self::ForceFallback => "forcefallback",
      Self::NoPromote => "nopromote",
    }
  }
}

impl FromStr for WrapMode {
  type Err = OptionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "default" => Ok(Self::Default),
      "nofallback" => Ok(Self::NoFallback),
      "nodownload" => Ok(Self::NoDownload),
      "forcefallback" => Ok(Self::ForceFallback),
      "nopromote" => Ok(Self::NoPromote),
      other => Err(OptionError::InvalidWrapMode(other.to_string())),
    }
  }
}

impl fmt::Display for WrapMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Split `key=value`.
pub fn parse_define(s: &str) -> Result<(String, String), OptionError> {
  let (key, value) = s.split_once('=').ok_or_else(|| OptionError::MissingValue(s.to_string()))?;
  let key = key.trim();
  if key.is_empty() {
    return Err(OptionError::MissingValue(s.to_string()));
  }
  Ok((key.to_string(), value.trim().to_string()))
}

/// Split a comma separated list, dropping empty items.
pub fn split_list(s: &str) -> Vec<String> {
  s.split(',')
    .map(|p| p.trim().to_string())
    .filter(|p| !p.is_empty())
    .collect()
}

/// Options for one evaluation run.
#[derive(Debug, Clone)]
pub struct EvalOptions {
  /// `-D` options other than the wrap-related ones below.
  pub user_options: BTreeMap<String, String>,
  pub wrap_mode: WrapMode,
  /// Dependency or subproject names that always use their fallback.
  pub force_fallback_for: Vec<String>,
  /// JSON file describing dependencies installed on the system.
  pub system_deps: Option<PathBuf>,
  /// Whether to query `pkg-config` for dependencies.
  pub use_pkg_config: bool,
}

impl Default for EvalOptions {
  fn default() -> Self {
    Self {
      user_options: BTreeMap::new(),
      wrap_mode: WrapMode::Default,
      force_fallback_for: Vec::new(),
      system_deps: None,
      use_pkg_config: true,
    }
  }
}

impl EvalOptions {
  /// Apply `-D key=value` definitions. `wrap_mode` and `force_fallback_for`
  /// update the dedicated fields.
  pub fn with_defines<S: AsRef<str>>(mut self, defines: &[S]) -> Result<Self, OptionError> {
    for define in defines {
      let (key, value) = parse_define(define.as_ref())?;
      match key.as_str() {
        "wrap_mode" => self.wrap_mode = value.parse()?,
        "force_fallback_for" => self.force_fallback_for = split_list(&value),
        "default_library" if !matches!(value.as_str(), "shared" | "static" | "both") => {
          return Err(OptionError::InvalidValue { key, value });
        }
        _ => {
          self.user_options.insert(key, value);
        }
      }
    }
    Ok(self)
  }

  /// Whether `name` (a dependency or subproject) is forced to its fallback.
  pub fn forces_fallback_for(&self, name: &str) -> bool {
    self.wrap_mode == WrapMode::ForceFallback || self.force_fallback_for.iter().any(|n| n == name)
  }

  /// Command-line value of `key` for `subproject` (empty for the main project).
  pub fn command_line(&self, subproject: &str, key: &str) -> Option<&str> {
    if !subproject.is_empty()
      && let Some(v) = self.user_options.get(&format!("{}:{}", subproject, key))
    {
      return Some(v);
    }
    match key {
      "wrap_mode" => Some(self.wrap_mode.as_str()),
      _ => self.user_options.get(key).map(String::as_str),
    }
  }
}

pub fn builtin_default(key: &str) -> Option<&'static str> {
  BUILTIN_OPTIONS.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}
