//! Build graph fragments and the finished build graph.
//!
//! Each project evaluation produces a [`BuildFragment`]. A subproject's
//! fragment is merged into its parent's with [`BuildFragment::absorb`] once
//! the subproject finishes; the main project's fragment becomes the
//! [`BuildGraph`] handed to the backend and written to
//! `<build>/kiln-info/graph.json`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{GRAPH_FILENAME, INFO_DIRNAME};
use crate::dependency::{Dependency, DependencyOverrides};
use crate::machine::{MachineChoice, PerMachine};
use crate::program::ExternalProgram;
use crate::subproject::Subproject;
use crate::target::{BuildTarget, RegistryError, TargetKind, TargetRegistry};

/// Arguments per language.
pub type ArgTable = BTreeMap<String, Vec<String>>;

/// A `test()` or `benchmark()` definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDef {
  pub name: String,
  /// Owning (sub)project name.
  pub project: String,
  pub suite: Vec<String>,
  /// Target identifier or program path of the executable under test.
  pub exe: String,
  pub args: Vec<String>,
  pub protocol: String,
  pub should_fail: bool,
  pub timeout: i64,
  pub workdir: Option<String>,
  pub priority: i64,
  pub is_parallel: bool,
  pub depends: Vec<String>,
  #[serde(default)]
  pub env: BTreeMap<String, String>,
}

/// `project()` metadata recorded for every (sub)project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
  pub version: String,
  pub license: Vec<String>,
}

/// A rendered summary value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
  pub values: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub list_sep: Option<String>,
}

impl SummaryEntry {
  pub fn render(&self) -> String {
    match &self.list_sep {
      Some(sep) => self.values.join(sep),
      None => self.values.join(" "),
    }
  }
}

/// Summary sections of one (sub)project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
  pub project: String,
  pub version: String,
  pub sections: IndexMap<String, IndexMap<String, SummaryEntry>>,
}

impl Summary {
  pub fn new(project: &str, version: &str) -> Self {
    Self {
      project: project.to_string(),
      version: version.to_string(),
      sections: IndexMap::new(),
    }
  }

  /// Add `key` to `section`. Duplicate keys within a section are rejected.
  pub fn add(&mut self, section: &str, key: &str, entry: SummaryEntry) -> Result<(), String> {
    let section_map = self.sections.entry(section.to_string()).or_default();
    if section_map.contains_key(key) {
      return Err(format!("Summary section '{}' already have key '{}'", section, key));
    }
    section_map.insert(key.to_string(), entry);
    Ok(())
  }
}

/// A warning recorded during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
  /// Subproject that emitted it; empty for the main project.
  pub subproject: String,
  pub message: String,
}

/// Everything one project evaluation contributes to the build.
#[derive(Debug, Clone, Default)]
pub struct BuildFragment {
  pub registry: TargetRegistry,
  pub tests: Vec<TestDef>,
  pub benchmarks: Vec<TestDef>,
  pub dependency_overrides: DependencyOverrides,
  pub program_overrides: BTreeMap<String, Rc<ExternalProgram>>,
  pub searched_programs: BTreeSet<String>,
  pub global_args: PerMachine<ArgTable>,
  pub global_link_args: PerMachine<ArgTable>,
  /// Keyed by subproject name, then language.
  pub project_args: PerMachine<BTreeMap<String, ArgTable>>,
  pub project_link_args: PerMachine<BTreeMap<String, ArgTable>>,
  pub dep_manifest: BTreeMap<String, ManifestEntry>,
  /// Keyed by subproject name (empty for the main project).
  pub summaries: IndexMap<String, Summary>,
  pub build_def_files: IndexSet<String>,
  /// Declared versions of finished subprojects.
  pub subproject_versions: BTreeMap<String, String>,
}

impl BuildFragment {
  /// A fresh fragment for a subproject. It starts from this fragment's
  /// override tables and argument lists so the subproject sees what was
  /// declared before it was entered; targets and file lists start empty.
  pub fn inherit(&self) -> Self {
    Self {
      dependency_overrides: self.dependency_overrides.clone(),
      program_overrides: self.program_overrides.clone(),
      searched_programs: self.searched_programs.clone(),
      global_args: self.global_args.clone(),
      global_link_args: self.global_link_args.clone(),
      project_args: self.project_args.clone(),
      project_link_args: self.project_link_args.clone(),
      ..Self::default()
    }
  }

  /// Merge a finished subproject's fragment into this one.
  ///
  /// Target identifiers must not collide; on collision nothing is merged.
  pub fn absorb(&mut self, child: BuildFragment) -> Result<(), RegistryError> {
    self.registry.absorb(child.registry)?;
    self.tests.extend(child.tests);
    self.benchmarks.extend(child.benchmarks);
    self.dependency_overrides.union(child.dependency_overrides);
    for (name, prog) in child.program_overrides {
      self.program_overrides.entry(name).or_insert(prog);
    }
    self.searched_programs.extend(child.searched_programs);
    // The child's argument tables started as copies of ours, so they are a
    // superset of what we hold.
    self.global_args = child.global_args;
    self.global_link_args = child.global_link_args;
    self.project_args = child.project_args;
    self.project_link_args = child.project_link_args;
    self.dep_manifest.extend(child.dep_manifest);
    for (name, summary) in child.summaries {
      self.summaries.entry(name).or_insert(summary);
    }
    self.build_def_files.extend(child.build_def_files);
    self.subproject_versions.extend(child.subproject_versions);
    Ok(())
  }

  pub fn add_build_def_file(&mut self, path: &str) {
    self.build_def_files.insert(path.to_string());
  }
}

/// Serializable view of a resolved dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyInfo {
  pub name: String,
  pub kind: String,
  pub version: String,
  pub compile_args: Vec<String>,
  pub link_args: Vec<String>,
}

impl From<&Dependency> for DependencyInfo {
  fn from(dep: &Dependency) -> Self {
    Self {
      name: dep.name().to_string(),
      kind: dep.kind().to_string(),
      version: dep.version().to_string(),
      compile_args: dep.all_compile_args(),
      link_args: dep.all_link_args(),
    }
  }
}

/// Serializable view of a registered target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetInfo {
  pub id: String,
  pub name: String,
  pub kind: TargetKind,
  pub subdir: String,
  pub subproject: String,
  pub machine: MachineChoice,
  pub guid: String,
  pub sources: Vec<String>,
  pub dependencies: Vec<DependencyInfo>,
  pub link_with: Vec<String>,
  pub language_args: ArgTable,
  pub link_args: Vec<String>,
  pub install: bool,
  pub build_by_default: bool,
  pub project_version: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub command: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub outputs: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub depends: Vec<String>,
}

impl From<&BuildTarget> for TargetInfo {
  fn from(t: &BuildTarget) -> Self {
    let mut link_with: Vec<String> = t.link_with.iter().map(|id| id.to_string()).collect();
    for dep in &t.dependencies {
      for id in dep.all_link_with() {
        if !link_with.contains(&id.0) {
          link_with.push(id.0);
        }
      }
    }
    Self {
      id: t.id.to_string(),
      name: t.name.clone(),
      kind: t.kind,
      subdir: t.subdir.clone(),
      subproject: t.subproject.clone(),
      machine: t.for_machine,
      guid: t.guid.clone(),
      sources: t.sources.iter().map(|s| s.relative_path()).collect(),
      dependencies: t.dependencies.iter().map(|d| DependencyInfo::from(d.as_ref())).collect(),
      link_with,
      language_args: t.language_args.clone(),
      link_args: t.link_args.clone(),
      install: t.install,
      build_by_default: t.build_by_default,
      project_version: t.project_version.clone(),
      command: t.command.clone(),
      outputs: t.outputs.clone(),
      depends: t.depends.iter().map(|id| id.to_string()).collect(),
    }
  }
}

/// Serializable view of a subproject handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubprojectInfo {
  pub name: String,
  pub subdir: String,
  pub found: bool,
  pub version: String,
  pub warnings: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub disabled_reason: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub exception: Option<String>,
}

impl From<&Subproject> for SubprojectInfo {
  fn from(s: &Subproject) -> Self {
    Self {
      name: s.name.clone(),
      subdir: s.subdir.clone(),
      found: s.found(),
      version: s.version().to_string(),
      warnings: s.warnings,
      disabled_reason: s.disabled_reason().map(String::from),
      exception: s.exception().map(|e| e.to_string()),
    }
  }
}

/// Errors reading or writing the build graph file.
#[derive(Debug, Error)]
pub enum GraphError {
  #[error("failed to read build graph {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to write build graph {path}: {source}")]
  Write {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse build graph: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize build graph: {0}")]
  Serialize(#[source] serde_json::Error),
}

/// The finished, composed build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildGraph {
  pub project_name: String,
  pub project_version: String,
  pub targets: Vec<TargetInfo>,
  pub tests: Vec<TestDef>,
  pub benchmarks: Vec<TestDef>,
  pub global_args: PerMachine<ArgTable>,
  pub global_link_args: PerMachine<ArgTable>,
  pub project_args: PerMachine<BTreeMap<String, ArgTable>>,
  pub project_link_args: PerMachine<BTreeMap<String, ArgTable>>,
  pub dep_manifest: BTreeMap<String, ManifestEntry>,
  pub subprojects: Vec<SubprojectInfo>,
  pub build_def_files: Vec<String>,
  pub summaries: Vec<Summary>,
  pub diagnostics: Vec<Diagnostic>,
  pub warnings: usize,
}

impl BuildGraph {
  /// Location of the graph file for a build directory.
  pub fn path_in(build_root: &Path) -> PathBuf {
    build_root.join(INFO_DIRNAME).join(GRAPH_FILENAME)
  }

  pub fn load(path: &Path) -> Result<Self, GraphError> {
    let content = fs::read_to_string(path).map_err(|source| GraphError::Read {
      path: path.display().to_string(),
      source,
    })?;
    serde_json::from_str(&content).map_err(GraphError::Parse)
  }

  pub fn save(&self, path: &Path) -> Result<(), GraphError> {
    let write_err = |source| GraphError::Write {
      path: path.display().to_string(),
      source,
    };
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(write_err)?;
    }
    let content = serde_json::to_string_pretty(self).map_err(GraphError::Serialize)?;
    fs::write(path, content).map_err(write_err)
  }

  pub fn target(&self, id: &str) -> Option<&TargetInfo> {
    self.targets.iter().find(|t| t.id == id)
  }

  pub fn targets_named(&self, name: &str) -> impl Iterator<Item = &TargetInfo> {
    self.targets.iter().filter(move |t| t.name == name)
  }

  pub fn subproject(&self, name: &str) -> Option<&SubprojectInfo> {
    self.subprojects.iter().find(|s| s.name == name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::target::TargetGuids;

  fn target(name: &str, subdir: &str) -> BuildTarget {
    BuildTarget::new(name, TargetKind::Executable, subdir, "", MachineChoice::Host)
  }

  mod fragment {
    use super::*;

    #[test]
    fn absorb_unions_files_and_targets() {
      let mut guids = TargetGuids::default();
      let mut parent = BuildFragment::default();
      parent.add_build_def_file("kiln.lua");
      parent.registry.register(target("app", ""), &mut guids).unwrap();

      let mut child = parent.inherit();
      assert!(child.registry.is_empty());
      assert!(child.build_def_files.is_empty());
      child.add_build_def_file("subprojects/z/kiln.lua");
      child.add_build_def_file("kiln.lua");
      child.registry.register(target("z", "subprojects/z"), &mut guids).unwrap();
      child.dep_manifest.insert(
        "z".to_string(),
        ManifestEntry {
          version: "1.0".to_string(),
          license: vec!["MIT".to_string()],
        },
      );

      parent.absorb(child).unwrap();
      assert_eq!(parent.registry.len(), 2);
      assert_eq!(
        parent.build_def_files.iter().collect::<Vec<_>>(),
        vec!["kiln.lua", "subprojects/z/kiln.lua"]
      );
      assert!(parent.dep_manifest.contains_key("z"));
    }

    #[test]
    fn inherit_copies_arguments() {
      let mut parent = BuildFragment::default();
      parent
        .global_args
        .host
        .insert("c".to_string(), vec!["-DGLOBAL".to_string()]);
      let child = parent.inherit();
      assert_eq!(child.global_args.host["c"], vec!["-DGLOBAL"]);
    }
  }

  #[test]
  fn summary_rejects_duplicate_keys() {
    let mut s = Summary::new("demo", "1.0");
    let entry = SummaryEntry {
      values: vec!["YES".to_string()],
      list_sep: None,
    };
    s.add("Features", "zlib", entry.clone()).unwrap();
    assert!(s.add("Features", "zlib", entry.clone()).is_err());
    assert!(s.add("Other", "zlib", entry).is_ok());
  }

  #[test]
  fn summary_entry_rendering() {
    let entry = SummaryEntry {
      values: vec!["a".to_string(), "b".to_string()],
      list_sep: Some(", ".to_string()),
    };
    assert_eq!(entry.render(), "a, b");
  }
}
