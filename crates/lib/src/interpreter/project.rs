use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use super::{Interpreter, join_subdir};
use crate::consts::{DEFAULT_SUBPROJECT_DIR, KILN_VERSION, UNDEFINED_VERSION};
use crate::context::ProjectInfo;
use crate::error::InterpError;
use crate::graph::{ArgTable, ManifestEntry};
use crate::machine::MachineChoice;
use crate::options::WrapMode;
use crate::subproject::wrap::LoadMode;
use crate::version::version_compare_many;

/// Where `project(version: ...)` comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectVersion {
  Str(String),
  /// A file, relative to the current directory, holding exactly one line.
  File(String),
}

/// Arguments of `project()`.
#[derive(Debug, Clone, Default)]
pub struct ProjectRequest {
  pub name: String,
  pub languages: Vec<String>,
  pub version: Option<ProjectVersion>,
  pub license: Vec<String>,
  pub default_options: BTreeMap<String, String>,
  pub subproject_dir: Option<String>,
  /// Constraints on the running tool's version.
  pub kiln_version: Vec<String>,
}

impl ProjectRequest {
  pub fn named(name: &str) -> Self {
    Self {
      name: name.to_string(),
      ..Self::default()
    }
  }
}

/// Compile or link arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
  Compile,
  Link,
}

impl ArgKind {
  fn global_func(&self) -> &'static str {
    match self {
      Self::Compile => "add_global_arguments",
      Self::Link => "add_global_link_arguments",
    }
  }

  fn project_func(&self) -> &'static str {
    match self {
      Self::Compile => "add_project_arguments",
      Self::Link => "add_project_link_arguments",
    }
  }
}

impl Interpreter {
  /// `project()`: declare the project. Must be the first call of the
  /// project's root build file.
  pub fn project(&mut self, req: ProjectRequest) -> Result<(), InterpError> {
    if self.ctx.project.is_some() {
      return Err(InterpError::invalid_code("Second call to project()."));
    }
    if req.name.is_empty() {
      return Err(InterpError::invalid_args("Project name must not be empty."));
    }
    if req.name.contains(':') {
      return Err(InterpError::invalid_args(format!(
        "Project name {:?} must not contain ':'",
        req.name
      )));
    }

    if !req.kiln_version.is_empty() {
      let check = version_compare_many(KILN_VERSION, &req.kiln_version);
      if !check.ok() {
        return Err(InterpError::invalid_code(format!(
          "Kiln version is {} but project requires {}",
          KILN_VERSION,
          check.not_found.join(", ")
        )));
      }
    }

    let version = match &req.version {
      None => UNDEFINED_VERSION.to_string(),
      Some(ProjectVersion::Str(v)) => v.clone(),
      Some(ProjectVersion::File(fname)) => self.read_version_file(fname)?,
    };

    let spdirname = req.subproject_dir.clone().unwrap_or_else(|| DEFAULT_SUBPROJECT_DIR.to_string());
    validate_subproject_dir(&spdirname)?;
    if !self.ctx.is_subproject() {
      self.ctx.subproject_dir = spdirname.clone();
    }

    // Subprojects' wraps are promoted into the main project's set unless
    // promotion is disabled.
    let wrap_dir = join_subdir(&self.ctx.root_subdir, &spdirname);
    if !self.ctx.is_subproject() {
      self.session_mut().resolver.load_wraps(&wrap_dir, LoadMode::Install)?;
    } else if self.session().options.wrap_mode != WrapMode::NoPromote {
      self.session_mut().resolver.load_wraps(&wrap_dir, LoadMode::Merge)?;
    }

    let license = if req.license.is_empty() {
      vec!["unknown".to_string()]
    } else {
      req.license
    };
    self.fragment.dep_manifest.insert(
      req.name.clone(),
      ManifestEntry {
        version: version.clone(),
        license: license.clone(),
      },
    );
    self.ctx.project_default_options = req.default_options;

    if self.ctx.is_subproject() {
      info!(subproject = %self.ctx.subproject, project = %req.name, version = %version, "project declared");
    } else {
      info!(project = %req.name, version = %version, "project declared");
    }
    debug!(languages = ?req.languages, "project languages");

    self.ctx.project = Some(ProjectInfo {
      name: req.name,
      version,
      license,
    });
    Ok(())
  }

  fn read_version_file(&mut self, fname: &str) -> Result<String, InterpError> {
    let source_root = self.source_root();
    self.ctx.bounds(&source_root).validate(&self.ctx.subdir, fname)?;
    let rel = join_subdir(&self.ctx.subdir, fname);
    let content = fs::read_to_string(source_root.join(&rel))
      .map_err(|e| InterpError::Io(format!("Could not read version file {}: {}", rel, e)))?;
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() != 1 {
      return Err(InterpError::invalid_code("Version file must contain exactly one line of text."));
    }
    self.fragment.add_build_def_file(&rel);
    Ok(lines[0].trim().to_string())
  }

  /// `add_global_arguments()` / `add_global_link_arguments()`.
  pub fn add_global_arguments(
    &mut self,
    kind: ArgKind,
    languages: &[String],
    args: &[String],
    native: bool,
  ) -> Result<(), InterpError> {
    let func = kind.global_func();
    self.require_project(func)?;
    if self.ctx.is_subproject() {
      return Err(InterpError::invalid_code(format!(
        "Function '{}' cannot be used in subprojects because there is no way to make that reliable.\n\
         Please only call this if is_subproject() returns false. Alternatively, define a variable that\n\
         contains your language-specific arguments and add it to the appropriate *_args kwarg\n\
         in each target.",
        func
      )));
    }
    let frozen = self.ctx.project_args_frozen || self.ctx.global_args_frozen;
    self.check_arguments(func, frozen, languages, args)?;
    let machine = MachineChoice::from_native(native);
    let table = match kind {
      ArgKind::Compile => self.fragment.global_args.get_mut(machine),
      ArgKind::Link => self.fragment.global_link_args.get_mut(machine),
    };
    append_args(table, languages, args);
    Ok(())
  }

  /// `add_project_arguments()` / `add_project_link_arguments()`.
  pub fn add_project_arguments(
    &mut self,
    kind: ArgKind,
    languages: &[String],
    args: &[String],
    native: bool,
  ) -> Result<(), InterpError> {
    let func = kind.project_func();
    self.require_project(func)?;
    let frozen = self.ctx.project_args_frozen;
    self.check_arguments(func, frozen, languages, args)?;
    let machine = MachineChoice::from_native(native);
    let per_project = match kind {
      ArgKind::Compile => self.fragment.project_args.get_mut(machine),
      ArgKind::Link => self.fragment.project_link_args.get_mut(machine),
    };
    append_args(per_project.entry(self.ctx.subproject.clone()).or_default(), languages, args);
    Ok(())
  }

  fn check_arguments(&mut self, func: &str, frozen: bool, languages: &[String], args: &[String]) -> Result<(), InterpError> {
    if frozen {
      return Err(InterpError::invalid_code(format!(
        "Tried to use '{}' after a build target has been declared.\n\
         This is not permitted. Please declare all arguments before your targets.",
        func
      )));
    }
    if languages.is_empty() {
      return Err(InterpError::invalid_code(format!("Missing language definition in {}", func)));
    }
    for arg in args {
      if let Some(option) = builtin_equivalent(arg) {
        self.warning(&format!("Consider using the built-in {} instead of using \"{}\".", option, arg));
      }
    }
    Ok(())
  }
}

fn append_args(table: &mut ArgTable, languages: &[String], args: &[String]) {
  for lang in languages {
    table.entry(lang.to_lowercase()).or_default().extend(args.iter().cloned());
  }
}

/// The built-in option that should be used instead of a raw flag.
fn builtin_equivalent(arg: &str) -> Option<&'static str> {
  match arg {
    "/W1" | "/W2" | "/W3" | "/W4" | "/Wall" | "-Wall" | "-Wextra" => Some("warning_level option"),
    "-O0" | "-O2" | "-O3" | "-Os" | "/O1" | "/O2" | "/Os" => Some("optimization level"),
    "-Werror" => Some("werror option"),
    "-g" => Some("debug option"),
    _ if arg.starts_with("-fsanitize") => Some("option for sanitizers"),
    _ if arg.starts_with("-std=") || arg.starts_with("/std:") => Some("option for language standard version"),
    _ => None,
  }
}

fn validate_subproject_dir(spdirname: &str) -> Result<(), InterpError> {
  if Path::new(spdirname).is_absolute() {
    return Err(InterpError::invalid_args("Subproject_dir must not be an absolute path."));
  }
  if spdirname.starts_with('.') {
    return Err(InterpError::invalid_args("Subproject_dir must not begin with a period."));
  }
  if spdirname.contains("..") {
    return Err(InterpError::invalid_args("Subproject_dir must not contain a \"..\" segment."));
  }
  Ok(())
}
