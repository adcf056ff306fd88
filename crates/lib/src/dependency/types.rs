use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::KEY_IGNORED_KWARGS;
use crate::consts::UNDEFINED_VERSION;
use crate::target::{SourceFile, TargetId};

/// Cache identity of a dependency lookup: the name plus every option that can
/// change what the lookup returns, sorted by option name.
///
/// The version constraint is not part of the identity; cached entries are
/// re-checked against each request's constraints instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyKey {
  pub name: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<(String, String)>,
}

impl DependencyKey {
  pub fn new(name: &str, options: &BTreeMap<String, String>) -> Self {
    let options = options
      .iter()
      .filter(|(k, _)| !KEY_IGNORED_KWARGS.contains(&k.as_str()))
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    Self {
      name: name.to_string(),
      options,
    }
  }

  pub fn bare(name: &str) -> Self {
    Self {
      name: name.to_string(),
      options: Vec::new(),
    }
  }
}

impl fmt::Display for DependencyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name)?;
    if !self.options.is_empty() {
      let opts: Vec<String> = self.options.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
      write!(f, "({})", opts.join(", "))?;
    }
    Ok(())
  }
}

/// A dependency found on the system by a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalDependency {
  pub name: String,
  #[serde(default = "undefined_version")]
  pub version: String,
  /// How it was found, e.g. `pkg-config` or `system-deps`.
  #[serde(default)]
  pub method: String,
  #[serde(default)]
  pub compile_args: Vec<String>,
  #[serde(default)]
  pub link_args: Vec<String>,
  #[serde(default)]
  pub variables: BTreeMap<String, String>,
}

fn undefined_version() -> String {
  UNDEFINED_VERSION.to_string()
}

/// A dependency declared in a build description with `declare_dependency()`.
#[derive(Debug, Clone, Default)]
pub struct InternalDependency {
  pub version: String,
  pub compile_args: Vec<String>,
  pub link_args: Vec<String>,
  pub link_with: Vec<TargetId>,
  pub sources: Vec<SourceFile>,
  pub include_directories: Vec<String>,
  pub dependencies: Vec<Rc<Dependency>>,
  pub variables: BTreeMap<String, String>,
}

/// A resolved dependency. Handles are shared as `Rc<Dependency>` and compared
/// by identity.
#[derive(Debug, Clone)]
pub enum Dependency {
  NotFound { name: String },
  External(ExternalDependency),
  Internal(InternalDependency),
}

impl Dependency {
  pub fn not_found(name: &str) -> Rc<Self> {
    Rc::new(Self::NotFound { name: name.to_string() })
  }

  pub fn found(&self) -> bool {
    !matches!(self, Self::NotFound { .. })
  }

  pub fn name(&self) -> &str {
    match self {
      Self::NotFound { name } => name,
      Self::External(ext) => &ext.name,
      Self::Internal(_) => "internal",
    }
  }

  pub fn version(&self) -> &str {
    match self {
      Self::NotFound { .. } => UNDEFINED_VERSION,
      Self::External(ext) => &ext.version,
      Self::Internal(int) => &int.version,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Self::NotFound { .. } => "not-found",
      Self::External(_) => "external",
      Self::Internal(_) => "internal",
    }
  }

  /// Compile arguments including those of transitively included dependencies.
  pub fn all_compile_args(&self) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    self.collect_args(&mut out, &mut seen, own_compile_args);
    out
  }

  /// Link arguments including those of transitively included dependencies.
  pub fn all_link_args(&self) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    self.collect_args(&mut out, &mut seen, own_link_args);
    out
  }

  fn collect_args<'a>(
    &'a self,
    out: &mut Vec<String>,
    seen: &mut BTreeSet<&'a str>,
    pick: fn(&Dependency) -> &[String],
  ) {
    for arg in pick(self) {
      if seen.insert(arg.as_str()) {
        out.push(arg.clone());
      }
    }
    if let Self::Internal(int) = self {
      for dep in &int.dependencies {
        dep.collect_args(out, seen, pick);
      }
    }
  }

  /// Targets this dependency asks consumers to link with, transitively.
  pub fn all_link_with(&self) -> Vec<TargetId> {
    let mut out = Vec::new();
    if let Self::Internal(int) = self {
      out.extend(int.link_with.iter().cloned());
      for dep in &int.dependencies {
        for id in dep.all_link_with() {
          if !out.contains(&id) {
            out.push(id);
          }
        }
      }
    }
    out
  }

  pub fn get_variable(&self, name: &str) -> Option<&str> {
    match self {
      Self::NotFound { .. } => None,
      Self::External(ext) => ext.variables.get(name).map(String::as_str),
      Self::Internal(int) => int.variables.get(name).map(String::as_str),
    }
  }
}

fn own_compile_args(dep: &Dependency) -> &[String] {
  match dep {
    Dependency::NotFound { .. } => &[],
    Dependency::External(ext) => &ext.compile_args,
    Dependency::Internal(int) => &int.compile_args,
  }
}

fn own_link_args(dep: &Dependency) -> &[String] {
  match dep {
    Dependency::NotFound { .. } => &[],
    Dependency::External(ext) => &ext.link_args,
    Dependency::Internal(int) => &int.link_args,
  }
}
