//! Project evaluation.
//!
//! [`evaluate_project`] runs the main project's `kiln.lua` (and, through it,
//! every subproject), composes the finished [`BuildGraph`] and persists the
//! configuration state of the build directory:
//!
//! - `<build>/kiln-private/coredata.json`: target build identifier tokens and
//!   cached dependency lookups, reused by the next evaluation
//! - `<build>/kiln-info/graph.json`: the build graph

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info};

use crate::coredata::{CoreData, CoreDataError};
use crate::dependency::ProbeError;
use crate::error::InterpError;
use crate::frontend::Frontend;
use crate::graph::{BuildGraph, GraphError, SubprojectInfo, TargetInfo};
use crate::interpreter::{Interpreter, Session};
use crate::lua::LuaFrontend;
use crate::options::EvalOptions;

/// Errors that can occur during evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  /// The build description is invalid or a required piece is missing.
  #[error(transparent)]
  Interp(#[from] InterpError),

  #[error(transparent)]
  CoreData(#[from] CoreDataError),

  /// The system dependency description could not be loaded.
  #[error(transparent)]
  Probe(#[from] ProbeError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("cannot access {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Evaluate the project in `source_root` for the build directory
/// `build_root` with the Lua front end.
///
/// The build directory is created if needed. Persisted state from an earlier
/// evaluation of the same build directory is loaded first and written back
/// on success.
pub fn evaluate_project(source_root: &Path, build_root: &Path, options: EvalOptions) -> Result<BuildGraph, EvalError> {
  let io_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source| EvalError::Io { path, source }
  };
  let source_root = dunce::canonicalize(source_root).map_err(io_err(source_root))?;
  fs::create_dir_all(build_root).map_err(io_err(build_root))?;
  let build_root = dunce::canonicalize(build_root).map_err(io_err(build_root))?;

  let coredata = CoreData::load(&CoreData::path_in(&build_root))?.unwrap_or_default();
  let session = Session::with_defaults(&source_root, &build_root, options, coredata)?;
  evaluate_with(session, Rc::new(LuaFrontend))
}

/// Evaluate with an explicit session and front end.
pub fn evaluate_with(session: Session, frontend: Rc<dyn Frontend>) -> Result<BuildGraph, EvalError> {
  let build_root = session.build_root.clone();
  info!(source = %session.source_root.display(), build = %build_root.display(), "evaluating project");

  let session = Rc::new(RefCell::new(session));
  let mut interp = Interpreter::new(session.clone(), frontend).run()?;
  interp.summarize_subprojects();
  let graph = compose(&interp);
  drop(interp);

  {
    let mut session = session.borrow_mut();
    session.sync_coredata();
    session.coredata.save(&CoreData::path_in(&build_root))?;
  }
  graph.save(&BuildGraph::path_in(&build_root))?;
  info!(
    project = %graph.project_name,
    targets = graph.targets.len(),
    subprojects = graph.subprojects.len(),
    warnings = graph.warnings,
    "evaluation complete"
  );
  Ok(graph)
}

/// Turn the main project's interpreter into the finished build graph.
fn compose(interp: &Interpreter) -> BuildGraph {
  let session = interp.session();
  let fragment = &interp.fragment;
  let subprojects: Vec<SubprojectInfo> = {
    let mut handles: Vec<_> = session.subprojects.handles().collect();
    handles.sort_by(|a, b| a.name.cmp(&b.name));
    handles.into_iter().map(|h| SubprojectInfo::from(h.as_ref())).collect()
  };
  debug!(targets = fragment.registry.len(), subprojects = subprojects.len(), "composing build graph");

  BuildGraph {
    project_name: interp.ctx.project_name().unwrap_or_default().to_string(),
    project_version: interp.ctx.project_version().to_string(),
    targets: fragment.registry.iter().map(|t| TargetInfo::from(t.as_ref())).collect(),
    tests: fragment.tests.clone(),
    benchmarks: fragment.benchmarks.clone(),
    global_args: fragment.global_args.clone(),
    global_link_args: fragment.global_link_args.clone(),
    project_args: fragment.project_args.clone(),
    project_link_args: fragment.project_link_args.clone(),
    dep_manifest: fragment.dep_manifest.clone(),
    subprojects,
    build_def_files: fragment.build_def_files.iter().cloned().collect(),
    summaries: fragment.summaries.values().cloned().collect(),
    diagnostics: session.diagnostics.clone(),
    warnings: session.diagnostics.len(),
  }
}
