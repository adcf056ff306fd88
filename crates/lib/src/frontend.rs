//! The seam between the semantic core and the language front end.
//!
//! A front end parses and executes build files. The core hands it a fresh
//! [`Interpreter`] for each project (the main project and every subproject)
//! and gets the interpreter back once all of that project's build files ran.

use crate::error::InterpError;
use crate::interpreter::Interpreter;

/// Executes the build files of one project against an interpreter.
pub trait Frontend {
  /// Run the project rooted at `interp.ctx.root_subdir`.
  ///
  /// The front end calls [`Interpreter::enter_project_root`] to locate the
  /// root build file and the interpreter's operations for every builtin it
  /// evaluates. Nested `subproject()` calls re-enter this method with a child
  /// interpreter.
  fn run_project(&self, interp: Interpreter) -> Result<Interpreter, InterpError>;
}

/// How evaluation of a single build file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
  /// Every statement ran.
  Completed,
  /// The file returned the `subdir_done()` stop directive.
  Stopped,
}
