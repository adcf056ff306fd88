use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::consts::{TARGET_ID_HASH_LEN, UNDEFINED_VERSION};
use crate::dependency::Dependency;
use crate::machine::MachineChoice;
use crate::util::hash::short_hash;

/// The kind of a build target.
///
/// The kind is the discriminator inside a [`TargetId`]: an executable and a
/// static library may share a display name, two executables may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
  Executable,
  StaticLibrary,
  SharedLibrary,
  SharedModule,
  Jar,
  Custom,
  Run,
  Alias,
}

impl TargetKind {
  /// Identifier suffix for this kind.
  pub fn id_suffix(&self) -> &'static str {
    match self {
      Self::Executable => "exe",
      Self::StaticLibrary => "sta",
      // Shared modules are shared libraries as far as naming goes.
      Self::SharedLibrary | Self::SharedModule => "sha",
      Self::Jar => "jar",
      Self::Custom => "cus",
      Self::Run | Self::Alias => "run",
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Executable => "executable",
      Self::StaticLibrary => "static_library",
      Self::SharedLibrary => "shared_library",
      Self::SharedModule => "shared_module",
      Self::Jar => "jar",
      Self::Custom => "custom",
      Self::Run => "run",
      Self::Alias => "alias",
    }
  }

  /// Parse the `target_type` keyword of `build_target()`.
  pub fn from_target_type(s: &str) -> Option<Self> {
    match s {
      "executable" => Some(Self::Executable),
      "static_library" => Some(Self::StaticLibrary),
      "shared_library" => Some(Self::SharedLibrary),
      "shared_module" => Some(Self::SharedModule),
      "jar" => Some(Self::Jar),
      _ => None,
    }
  }

  /// Whether other targets can link against this one.
  pub fn is_linkable(&self) -> bool {
    matches!(self, Self::StaticLibrary | Self::SharedLibrary | Self::SharedModule)
  }
}

impl fmt::Display for TargetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Registry key of a target.
///
/// Format: `<sha256(subdir)[:7]>@@<name>@<suffix>`, with `/` and `\` in the
/// name replaced by `@`. Targets in the top source directory have no hash
/// prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

impl TargetId {
  pub fn new(subdir: &str, name: &str, kind: TargetKind) -> Self {
    let name_part = name.replace(['/', '\\'], "@");
    let my_id = format!("{}@{}", name_part, kind.id_suffix());
    if subdir.is_empty() {
      Self(my_id)
    } else {
      Self(format!("{}@@{}", short_hash(subdir, TARGET_ID_HASH_LEN), my_id))
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A file reference, relative to the source root (or the build root when built).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceFile {
  pub subdir: String,
  pub fname: String,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub is_built: bool,
}

impl SourceFile {
  pub fn from_source(subdir: &str, fname: &str) -> Self {
    Self {
      subdir: subdir.to_string(),
      fname: fname.to_string(),
      is_built: false,
    }
  }

  pub fn from_built(subdir: &str, fname: &str) -> Self {
    Self {
      subdir: subdir.to_string(),
      fname: fname.to_string(),
      is_built: true,
    }
  }

  /// Path relative to the source (or build) root, with `/` separators.
  pub fn relative_path(&self) -> String {
    if self.subdir.is_empty() {
      self.fname.clone()
    } else {
      format!("{}/{}", self.subdir, self.fname)
    }
  }
}

impl fmt::Display for SourceFile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.relative_path())
  }
}

/// A declared build target.
///
/// Targets are immutable once registered; handles to them are shared as
/// `Rc<BuildTarget>`.
#[derive(Debug, Clone)]
pub struct BuildTarget {
  pub name: String,
  pub id: TargetId,
  pub kind: TargetKind,
  /// Directory the target was declared in, relative to the source root.
  pub subdir: String,
  /// Owning subproject; empty for the root project.
  pub subproject: String,
  pub for_machine: MachineChoice,
  pub sources: Vec<SourceFile>,
  pub dependencies: Vec<Rc<Dependency>>,
  pub link_with: Vec<TargetId>,
  /// Per-language compiler arguments (`c_args`, `rust_args`, ...), keyed by language.
  pub language_args: BTreeMap<String, Vec<String>>,
  pub link_args: Vec<String>,
  pub install: bool,
  pub build_by_default: bool,
  pub project_version: String,
  /// Custom and run targets only.
  pub command: Vec<String>,
  /// Custom targets only.
  pub outputs: Vec<String>,
  pub depends: Vec<TargetId>,
  /// Build identifier token, assigned at registration.
  pub guid: String,
}

impl BuildTarget {
  pub fn new(name: &str, kind: TargetKind, subdir: &str, subproject: &str, for_machine: MachineChoice) -> Self {
    Self {
      name: name.to_string(),
      id: TargetId::new(subdir, name, kind),
      kind,
      subdir: subdir.to_string(),
      subproject: subproject.to_string(),
      for_machine,
      sources: Vec::new(),
      dependencies: Vec::new(),
      link_with: Vec::new(),
      language_args: BTreeMap::new(),
      link_args: Vec::new(),
      install: false,
      build_by_default: true,
      project_version: UNDEFINED_VERSION.to_string(),
      command: Vec::new(),
      outputs: Vec::new(),
      depends: Vec::new(),
      guid: String::new(),
    }
  }

  /// Whether any source is a Rust file.
  pub fn uses_rust(&self) -> bool {
    self.sources.iter().any(|s| s.fname.ends_with(".rs"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  mod target_id {
    use super::*;

    #[test]
    fn top_level_has_no_hash_prefix() {
      assert_eq!(TargetId::new("", "app", TargetKind::Executable).as_str(), "app@exe");
    }

    #[test]
    fn subdir_gets_short_hash_prefix() {
      let id = TargetId::new("src/lib", "util", TargetKind::StaticLibrary);
      let (prefix, rest) = id.as_str().split_once("@@").unwrap();
      assert_eq!(prefix.len(), TARGET_ID_HASH_LEN);
      assert_eq!(rest, "util@sta");
    }

    #[test]
    fn path_separators_in_name_are_replaced() {
      assert_eq!(
        TargetId::new("", "gen/out\\x", TargetKind::Custom).as_str(),
        "gen@out@x@cus"
      );
    }

    #[test]
    fn shared_library_and_module_share_a_suffix() {
      assert_eq!(
        TargetId::new("", "plug", TargetKind::SharedLibrary),
        TargetId::new("", "plug", TargetKind::SharedModule)
      );
    }
  }

  #[test]
  fn uses_rust_checks_source_extensions() {
    let mut t = BuildTarget::new("x", TargetKind::Executable, "", "", MachineChoice::Host);
    t.sources.push(SourceFile::from_source("", "main.c"));
    assert!(!t.uses_rust());
    t.sources.push(SourceFile::from_source("", "lib.rs"));
    assert!(t.uses_rust());
  }
}
