use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use tracing::{debug, info};

use super::{Interpreter, SubprojectRequest, join_subdir};
use crate::error::InterpError;
use crate::options::WrapMode;
use crate::program::ExternalProgram;
use crate::target::{BuildTarget, TargetKind};
use crate::version::{search_version, version_satisfies};

/// Arguments of `find_program()`.
#[derive(Debug, Clone)]
pub struct ProgramRequest {
  pub names: Vec<String>,
  pub required: bool,
  pub native: bool,
  pub version: Vec<String>,
  /// Extra directories to search, relative to the current directory.
  pub dirs: Vec<String>,
}

impl ProgramRequest {
  pub fn named(name: &str) -> Self {
    Self {
      names: vec![name.to_string()],
      required: true,
      native: false,
      version: Vec::new(),
      dirs: Vec::new(),
    }
  }
}

impl Interpreter {
  /// `find_program()`.
  ///
  /// Search order: overrides, a forced provider subproject, the current
  /// source directory and `dirs`, `PATH`, and finally the provider subproject
  /// of a required program that was not found.
  pub fn find_program(&mut self, req: ProgramRequest) -> Result<Rc<ExternalProgram>, InterpError> {
    self.require_project("find_program")?;
    if req.names.is_empty() || req.names.iter().any(String::is_empty) {
      return Err(InterpError::invalid_args("No program name specified."));
    }
    if let Some(prog) = self.program_from_overrides(&req) {
      return self.check_program(prog, &req);
    }

    let provider = self.session().resolver.find_program_provider(&req.names);
    let (forced, nofallback) = {
      let session = self.session();
      let options = &session.options;
      let forced = options.wrap_mode == WrapMode::ForceFallback
        || provider.as_ref().is_some_and(|p| options.forces_fallback_for(p));
      (forced, options.wrap_mode == WrapMode::NoFallback)
    };
    if forced && let Some(provider) = &provider {
      if let Some(prog) = self.program_fallback(provider, &req)? {
        return self.check_program(prog, &req);
      }
    }

    if let Some(prog) = self.search_program(&req) {
      for name in &req.names {
        self.fragment.searched_programs.insert(name.clone());
      }
      let prog = Rc::new(prog);
      if let Some(prog) = self.version_ok(prog, &req)? {
        return Ok(prog);
      }
    } else if let Some(provider) = &provider
      && !nofallback
      && !forced
      && let Some(prog) = self.program_fallback(provider, &req)?
    {
      return self.check_program(prog, &req);
    }

    if req.required {
      return Err(InterpError::ProgramNotFound(req.names[0].clone()));
    }
    info!(program = %req.names.join(" "), "program found: NO");
    Ok(Rc::new(ExternalProgram::not_found(&req.names[0])))
  }

  fn program_from_overrides(&self, req: &ProgramRequest) -> Option<Rc<ExternalProgram>> {
    req.names.iter().find_map(|n| self.fragment.program_overrides.get(n).cloned())
  }

  fn program_fallback(&mut self, provider: &str, req: &ProgramRequest) -> Result<Option<Rc<ExternalProgram>>, InterpError> {
    info!(subproject = provider, program = %req.names.join(" "), "fallback to subproject which provides program");
    let mut sub = SubprojectRequest::new(provider);
    sub.required = req.required;
    self.do_subproject(sub)?;
    Ok(self.program_from_overrides(req))
  }

  /// Apply the version check to an override or fallback result; a failing
  /// required program is fatal.
  fn check_program(&mut self, prog: Rc<ExternalProgram>, req: &ProgramRequest) -> Result<Rc<ExternalProgram>, InterpError> {
    match self.version_ok(prog, req)? {
      Some(prog) => Ok(prog),
      None if req.required => Err(InterpError::ProgramNotFound(req.names[0].clone())),
      None => Ok(Rc::new(ExternalProgram::not_found(&req.names[0]))),
    }
  }

  fn version_ok(&mut self, prog: Rc<ExternalProgram>, req: &ProgramRequest) -> Result<Option<Rc<ExternalProgram>>, InterpError> {
    if req.version.is_empty() || !prog.found() {
      return Ok(Some(prog));
    }
    let version = match &prog.version {
      Some(v) => Some(v.clone()),
      None => program_version(&prog),
    };
    match version {
      Some(v) if version_satisfies(&v, &req.version) => {
        info!(program = %prog.name, version = %v, "program found: YES");
        let mut prog = (*prog).clone();
        prog.version = Some(v);
        Ok(Some(Rc::new(prog)))
      }
      found => {
        let found = found.unwrap_or_else(|| "unknown".to_string());
        if req.required {
          return Err(InterpError::invalid_args(format!(
            "Invalid version of program, need '{}' {:?} found '{}'.",
            prog.name, req.version, found
          )));
        }
        info!(program = %prog.name, %found, wanted = ?req.version, "program found: NO (version mismatch)");
        Ok(None)
      }
    }
  }

  fn search_program(&self, req: &ProgramRequest) -> Option<ExternalProgram> {
    let source_root = self.source_root();
    let mut dirs = vec![source_root.join(&self.ctx.subdir)];
    for d in &req.dirs {
      dirs.push(source_root.join(join_subdir(&self.ctx.subdir, d)));
    }
    for name in &req.names {
      let candidate = Path::new(name);
      if candidate.is_absolute() {
        if candidate.is_file() {
          return Some(ExternalProgram::found_at(name, candidate.to_path_buf()));
        }
        continue;
      }
      if let Some(path) = dirs.iter().find_map(|d| executable_in(d, name)) {
        debug!(program = %name, path = %path.display(), "found in source tree");
        return Some(ExternalProgram::found_at(name, path));
      }
      if let Some(path) = find_in_path(name) {
        info!(program = %name, path = %path.display(), "program found: YES");
        return Some(ExternalProgram::found_at(name, path));
      }
    }
    None
  }

  /// `kiln.override_find_program()`.
  pub fn override_find_program(&mut self, name: &str, program: ProgramOverride) -> Result<(), InterpError> {
    self.require_project("override_find_program")?;
    if self.fragment.searched_programs.contains(name) {
      return Err(InterpError::invalid_code(format!(
        "Tried to override finding of executable \"{}\" which has already been found.",
        name
      )));
    }
    if self.fragment.program_overrides.contains_key(name) {
      return Err(InterpError::invalid_code(format!(
        "Tried to override executable \"{}\" which has already been overridden.",
        name
      )));
    }
    let prog = match program {
      ProgramOverride::Program(p) => p,
      ProgramOverride::Target(t) => {
        if t.kind != TargetKind::Executable {
          return Err(InterpError::invalid_args(format!(
            "override_find_program: target '{}' is not an executable.",
            t.name
          )));
        }
        let path = self.build_root().join(join_subdir(&t.subdir, &t.name));
        let mut prog = ExternalProgram::found_at(name, path);
        prog.version = Some(t.project_version.clone());
        prog.subproject = Some(t.subproject.clone());
        Rc::new(prog)
      }
    };
    self.fragment.program_overrides.insert(name.to_string(), prog);
    Ok(())
  }
}

/// What `override_find_program()` substitutes.
#[derive(Debug, Clone)]
pub enum ProgramOverride {
  Program(Rc<ExternalProgram>),
  Target(Rc<BuildTarget>),
}

fn executable_in(dir: &Path, name: &str) -> Option<PathBuf> {
  let candidate = dir.join(name);
  if is_executable(&candidate) {
    return Some(candidate);
  }
  if cfg!(windows) {
    for ext in ["exe", "bat", "cmd"] {
      let candidate = candidate.with_extension(ext);
      if candidate.is_file() {
        return Some(candidate);
      }
    }
  }
  None
}

fn find_in_path(name: &str) -> Option<PathBuf> {
  let path = env::var_os("PATH")?;
  env::split_paths(&path).find_map(|dir| executable_in(&dir, name))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;
  path
    .metadata()
    .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
  path.is_file()
}

/// Run `<program> --version` and pull a version number out of its output.
fn program_version(prog: &ExternalProgram) -> Option<String> {
  let path = prog.path.as_ref()?;
  let output = Command::new(path).arg("--version").output().ok()?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  let stderr = String::from_utf8_lossy(&output.stderr);
  search_version(&stdout).or_else(|| search_version(&stderr))
}
