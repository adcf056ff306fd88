//! Test utilities for kiln-lib.
//!
//! [`ScriptFrontend`] stands in for the Lua front end: each project is a Rust
//! closure driving the interpreter directly, and every run is counted so tests
//! can assert how often a subproject was evaluated.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::consts::{BUILD_FILENAME, DEFAULT_SUBPROJECT_DIR};
use crate::coredata::CoreData;
use crate::dependency::{DependencyProbe, ExternalDependency, NullProbe, StaticProbe};
use crate::error::InterpError;
use crate::frontend::Frontend;
use crate::interpreter::{Interpreter, ProjectRequest, Session};
use crate::machine::MachineChoice;
use crate::options::EvalOptions;
use crate::subproject::WrapResolver;

type Script = dyn Fn(&mut Interpreter) -> Result<(), InterpError>;

/// A front end whose projects are closures keyed by subproject name (empty
/// for the main project).
#[derive(Clone, Default)]
pub struct ScriptFrontend {
  scripts: Rc<RefCell<BTreeMap<String, Rc<Script>>>>,
  runs: Rc<RefCell<BTreeMap<String, usize>>>,
}

impl ScriptFrontend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn script(self, name: &str, f: impl Fn(&mut Interpreter) -> Result<(), InterpError> + 'static) -> Self {
    self.scripts.borrow_mut().insert(name.to_string(), Rc::new(f));
    self
  }

  /// How many times project `name` was evaluated.
  pub fn runs(&self, name: &str) -> usize {
    self.runs.borrow().get(name).copied().unwrap_or(0)
  }
}

impl Frontend for ScriptFrontend {
  fn run_project(&self, mut interp: Interpreter) -> Result<Interpreter, InterpError> {
    let name = interp.ctx.subproject.clone();
    *self.runs.borrow_mut().entry(name.clone()).or_default() += 1;
    let script = self.scripts.borrow().get(&name).cloned();
    if let Some(script) = script {
      script(&mut interp)?;
    }
    Ok(interp)
  }
}

/// A probe that counts lookups and delegates to a [`StaticProbe`].
#[derive(Clone)]
pub struct CountingProbe {
  inner: Rc<StaticProbe>,
  calls: Rc<Cell<usize>>,
}

impl CountingProbe {
  pub fn new(inner: StaticProbe) -> Self {
    Self {
      inner: Rc::new(inner),
      calls: Rc::new(Cell::new(0)),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.get()
  }
}

impl DependencyProbe for CountingProbe {
  fn find(&self, name: &str, machine: MachineChoice, options: &BTreeMap<String, String>) -> Option<ExternalDependency> {
    self.calls.set(self.calls.get() + 1);
    self.inner.find(name, machine, options)
  }

  fn describe(&self) -> String {
    self.inner.describe()
  }
}

pub fn test_session(dir: &Path, probe: Box<dyn DependencyProbe>) -> Rc<RefCell<Session>> {
  let build = dir.join("build");
  Rc::new(RefCell::new(Session::new(
    dir,
    &build,
    EvalOptions::default(),
    CoreData::new(),
    Box::new(WrapResolver::empty(dir, DEFAULT_SUBPROJECT_DIR)),
    probe,
  )))
}

/// Main-project interpreter that has not called `project()` yet.
pub fn bare_interpreter(dir: &Path) -> Interpreter {
  Interpreter::new(test_session(dir, Box::new(NullProbe)), Rc::new(ScriptFrontend::new()))
}

/// Main-project interpreter after `project('test')`.
pub fn declared_interpreter(dir: &Path) -> Interpreter {
  let mut interp = bare_interpreter(dir);
  interp.project(ProjectRequest::named("test")).unwrap();
  interp
}

/// Main-project interpreter after `project('test')`, running subprojects
/// through `frontend`.
pub fn declared_root(dir: &Path, frontend: &ScriptFrontend) -> Interpreter {
  declared_root_with_probe(dir, frontend, Box::new(NullProbe))
}

pub fn declared_root_with_probe(dir: &Path, frontend: &ScriptFrontend, probe: Box<dyn DependencyProbe>) -> Interpreter {
  let mut interp = Interpreter::new(test_session(dir, probe), Rc::new(frontend.clone()));
  interp.project(ProjectRequest::named("test")).unwrap();
  interp
}

/// Create `subprojects/<name>/` with an (empty) build file.
pub fn write_subproject(dir: &Path, name: &str) -> PathBuf {
  let sub = dir.join(DEFAULT_SUBPROJECT_DIR).join(name);
  fs::create_dir_all(&sub).unwrap();
  fs::write(sub.join(BUILD_FILENAME), "").unwrap();
  sub
}

/// Create `subprojects/<name>.wrap`.
pub fn write_wrap(dir: &Path, name: &str, content: &str) {
  let spdir = dir.join(DEFAULT_SUBPROJECT_DIR);
  fs::create_dir_all(&spdir).unwrap();
  fs::write(spdir.join(format!("{}.wrap", name)), content).unwrap();
}

/// Write an executable that prints `output` for any arguments.
#[cfg(unix)]
pub fn write_program(dir: &Path, name: &str, output: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;
  let path = dir.join(name);
  fs::write(&path, format!("#!/bin/sh\necho \"{}\"\n", output)).unwrap();
  fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  path
}

#[cfg(windows)]
pub fn write_program(dir: &Path, name: &str, output: &str) -> PathBuf {
  let path = dir.join(format!("{}.bat", name));
  fs::write(&path, format!("@echo off\r\necho {}\r\n", output)).unwrap();
  path
}
