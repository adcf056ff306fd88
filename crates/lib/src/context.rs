//! Per-project mutable evaluation state.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::consts::{DEFAULT_SUBPROJECT_DIR, UNDEFINED_VERSION};
use crate::error::InterpError;
use crate::sandbox::ProjectBounds;
use crate::value::Value;

/// What `project()` declared.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectInfo {
  pub name: String,
  pub version: String,
  pub license: Vec<String>,
}

/// State of one project (main project or subproject) while its build files run.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
  /// Subproject name; empty for the main project.
  pub subproject: String,
  /// Names of the subprojects currently being evaluated, outermost first,
  /// ending with this one.
  pub subproject_stack: Vec<String>,
  /// Project root relative to the source root.
  pub root_subdir: String,
  /// Directory of the build file being evaluated, relative to the source root.
  pub subdir: String,
  /// The main project's subproject directory name.
  pub subproject_dir: String,
  pub project: Option<ProjectInfo>,
  /// Options passed by the `subproject()` call that entered this project.
  pub default_options: BTreeMap<String, String>,
  /// `default_options` of this project's `project()` call.
  pub project_default_options: BTreeMap<String, String>,
  /// Set once the first target is declared.
  pub project_args_frozen: bool,
  /// Set once a subproject has been entered.
  pub global_args_frozen: bool,
  pub variables: BTreeMap<String, Value>,
  /// Build files already evaluated, relative to the source root.
  pub processed_buildfiles: HashSet<String>,
  pub warnings: usize,
}

impl EvaluationContext {
  pub fn root() -> Self {
    Self {
      subproject: String::new(),
      subproject_stack: Vec::new(),
      root_subdir: String::new(),
      subdir: String::new(),
      subproject_dir: DEFAULT_SUBPROJECT_DIR.to_string(),
      project: None,
      default_options: BTreeMap::new(),
      project_default_options: BTreeMap::new(),
      project_args_frozen: false,
      global_args_frozen: false,
      variables: BTreeMap::new(),
      processed_buildfiles: HashSet::new(),
      warnings: 0,
    }
  }

  /// Context for subproject `name` rooted at `subdir`, entered from `parent`.
  pub fn child(parent: &Self, name: &str, subdir: &str, default_options: BTreeMap<String, String>) -> Self {
    let mut stack = parent.subproject_stack.clone();
    stack.push(name.to_string());
    Self {
      subproject: name.to_string(),
      subproject_stack: stack,
      root_subdir: subdir.to_string(),
      subdir: subdir.to_string(),
      subproject_dir: parent.subproject_dir.clone(),
      default_options,
      ..Self::root()
    }
  }

  pub fn is_subproject(&self) -> bool {
    !self.subproject.is_empty()
  }

  pub fn project_name(&self) -> Option<&str> {
    self.project.as_ref().map(|p| p.name.as_str())
  }

  pub fn project_version(&self) -> &str {
    self.project.as_ref().map(|p| p.version.as_str()).unwrap_or(UNDEFINED_VERSION)
  }

  /// Name used to label this project in suites, summaries and diagnostics.
  pub fn display_name(&self) -> &str {
    if self.is_subproject() {
      &self.subproject
    } else {
      self.project_name().unwrap_or("")
    }
  }

  pub fn bounds<'a>(&'a self, source_root: &'a Path) -> ProjectBounds<'a> {
    ProjectBounds {
      source_root,
      root_subdir: &self.root_subdir,
      subproject_dir: &self.subproject_dir,
    }
  }

  pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), InterpError> {
    validate_variable_name(name)?;
    self.variables.insert(name.to_string(), value);
    Ok(())
  }

  pub fn get_variable(&self, name: &str) -> Option<&Value> {
    self.variables.get(name)
  }
}

/// Variable names follow identifier rules: `[_a-zA-Z][_0-9a-zA-Z]*`.
pub fn validate_variable_name(name: &str) -> Result<(), InterpError> {
  let mut chars = name.chars();
  let valid = chars.next().is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
    && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());
  if !valid {
    return Err(InterpError::invalid_code(format!("Invalid variable name: {}", name)));
  }
  Ok(())
}
