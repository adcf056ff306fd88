//! The semantic core: operations behind every builtin.
//!
//! An [`Interpreter`] evaluates one project. It owns that project's
//! [`EvaluationContext`] and [`BuildFragment`] and shares a [`Session`] with
//! every other project of the run. Front ends translate builtin calls into the
//! typed requests accepted by the methods in the submodules.

mod dependency;
mod programs;
mod project;
mod rust;
mod session;
mod subdir;
mod subproject;
mod summary;
mod targets;

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::info;

use crate::consts::BUILD_FILENAME;
use crate::context::EvaluationContext;
use crate::error::InterpError;
use crate::frontend::Frontend;
use crate::graph::BuildFragment;
use crate::options::builtin_default;
use crate::value::Value;

pub use dependency::{DependencyRequest, Fallback, InternalDependencyRequest};
pub use programs::{ProgramOverride, ProgramRequest};
pub use project::{ArgKind, ProjectRequest, ProjectVersion};
pub use rust::RustTestRequest;
pub use session::Session;
pub use subdir::SubdirFrame;
pub use subproject::SubprojectRequest;
pub use summary::SummaryRequest;
pub use targets::{CommandPart, CustomTargetRequest, SourceInput, TargetRequest, TestExe, TestRequest};

/// Evaluates one project against a shared session.
pub struct Interpreter {
  session: Rc<RefCell<Session>>,
  pub ctx: EvaluationContext,
  pub fragment: BuildFragment,
  frontend: Rc<dyn Frontend>,
}

impl fmt::Debug for Interpreter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Interpreter")
      .field("ctx", &self.ctx)
      .field("fragment", &self.fragment)
      .finish_non_exhaustive()
  }
}

impl Interpreter {
  /// Interpreter for the main project.
  pub fn new(session: Rc<RefCell<Session>>, frontend: Rc<dyn Frontend>) -> Self {
    Self {
      session,
      ctx: EvaluationContext::root(),
      fragment: BuildFragment::default(),
      frontend,
    }
  }

  fn child(&self, name: &str, subdir: &str, default_options: BTreeMap<String, String>) -> Self {
    Self {
      session: self.session.clone(),
      ctx: EvaluationContext::child(&self.ctx, name, subdir, default_options),
      fragment: self.fragment.inherit(),
      frontend: self.frontend.clone(),
    }
  }

  pub fn session(&self) -> Ref<'_, Session> {
    self.session.borrow()
  }

  pub fn session_mut(&self) -> RefMut<'_, Session> {
    self.session.borrow_mut()
  }

  pub fn source_root(&self) -> PathBuf {
    self.session().source_root.clone()
  }

  pub fn build_root(&self) -> PathBuf {
    self.session().build_root.clone()
  }

  /// Hand this interpreter to the front end and check the project declared
  /// itself.
  pub fn run(self) -> Result<Self, InterpError> {
    let frontend = self.frontend.clone();
    let interp = frontend.run_project(self)?;
    if interp.ctx.project.is_none() {
      return Err(InterpError::invalid_code(format!(
        "No project() call in {}/{}.",
        display_dir(&interp.ctx.root_subdir),
        BUILD_FILENAME
      )));
    }
    Ok(interp)
  }

  /// Locate this project's root build file and mark it as evaluated.
  ///
  /// Returns the absolute path of the file.
  pub fn enter_project_root(&mut self) -> Result<PathBuf, InterpError> {
    let rel = join_subdir(&self.ctx.root_subdir, BUILD_FILENAME);
    let abs = self.source_root().join(&rel);
    if !abs.is_file() {
      return Err(InterpError::invalid_code(format!("Nonexistent build file '{}'", rel)));
    }
    self.ctx.processed_buildfiles.insert(rel.clone());
    self.fragment.add_build_def_file(&rel);
    Ok(abs)
  }

  /// Fail unless `project()` already ran.
  pub fn require_project(&self, func: &str) -> Result<(), InterpError> {
    if self.ctx.project.is_none() {
      return Err(InterpError::invalid_code(format!(
        "First statement must be a call to project(); found call to {}().",
        func
      )));
    }
    Ok(())
  }

  pub fn message(&self, text: &str) {
    if self.ctx.is_subproject() {
      info!(subproject = %self.ctx.subproject, "{}", text);
    } else {
      info!("{}", text);
    }
  }

  /// Emit a warning attributed to this project.
  pub fn warning(&mut self, text: &str) {
    self.ctx.warnings += 1;
    self.session_mut().record_warning(&self.ctx.subproject, text);
  }

  /// `error()`: abort evaluation.
  pub fn problem(&self, text: &str) -> InterpError {
    InterpError::Problem(text.to_string())
  }

  pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), InterpError> {
    self.ctx.set_variable(name, value)
  }

  /// `get_variable(name[, fallback])`.
  pub fn get_variable(&self, name: &str, fallback: Option<Value>) -> Result<Value, InterpError> {
    match (self.ctx.get_variable(name), fallback) {
      (Some(v), _) => Ok(v.clone()),
      (None, Some(fallback)) => Ok(fallback),
      (None, None) => Err(InterpError::invalid_code(format!("Tried to get unknown variable \"{}\".", name))),
    }
  }

  /// Raw string value of option `key` for this project.
  ///
  /// Precedence, highest first: `-D subproject:key`, `-D key`, the entering
  /// `subproject()` call's `default_options`, this project's own
  /// `default_options`, the built-in default.
  pub fn option_string(&self, key: &str) -> Option<String> {
    {
      let session = self.session();
      if let Some(v) = session.options.command_line(&self.ctx.subproject, key) {
        return Some(v.to_string());
      }
      if key == "force_fallback_for" && !session.options.force_fallback_for.is_empty() {
        return Some(session.options.force_fallback_for.join(","));
      }
    }
    self
      .ctx
      .default_options
      .get(key)
      .or_else(|| self.ctx.project_default_options.get(key))
      .cloned()
      .or_else(|| builtin_default(key).map(str::to_string))
  }

  /// `get_option(name)`.
  pub fn get_option(&self, key: &str) -> Result<Value, InterpError> {
    self.require_project("get_option")?;
    let raw = self
      .option_string(key)
      .ok_or_else(|| InterpError::invalid_args(format!("Tried to access unknown option \"{}\".", key)))?;
    Ok(match (key, raw.as_str()) {
      ("force_fallback_for", _) => Value::List(crate::options::split_list(&raw).into_iter().map(Value::Str).collect()),
      (_, "true") => Value::Bool(true),
      (_, "false") => Value::Bool(false),
      _ => Value::Str(raw),
    })
  }
}

/// Join a subdir and a relative name with `/`.
pub(crate) fn join_subdir(subdir: &str, name: &str) -> String {
  if subdir.is_empty() {
    name.to_string()
  } else {
    format!("{}/{}", subdir, name)
  }
}

fn display_dir(subdir: &str) -> &str {
  if subdir.is_empty() { "." } else { subdir }
}
