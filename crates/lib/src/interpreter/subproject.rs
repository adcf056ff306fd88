use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use tracing::{info, warn};

use super::Interpreter;
use crate::error::InterpError;
use crate::subproject::wrap::SUBPROJECT_METHOD;
use crate::subproject::{Outcome, Subproject, SubprojectEntry};
use crate::version::version_satisfies;

/// Arguments of `subproject()`.
#[derive(Debug, Clone)]
pub struct SubprojectRequest {
  pub name: String,
  pub required: bool,
  /// Constraints on the subproject's declared version.
  pub version: Vec<String>,
  pub default_options: BTreeMap<String, String>,
}

impl SubprojectRequest {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      required: true,
      version: Vec::new(),
      default_options: BTreeMap::new(),
    }
  }

  pub fn optional(mut self) -> Self {
    self.required = false;
    self
  }
}

impl Interpreter {
  /// `subproject()`.
  pub fn subproject(&mut self, req: SubprojectRequest) -> Result<Rc<Subproject>, InterpError> {
    self.require_project("subproject")?;
    self.do_subproject(req)
  }

  /// Resolve, evaluate and merge subproject `req.name`, at most once per run.
  pub(super) fn do_subproject(&mut self, req: SubprojectRequest) -> Result<Rc<Subproject>, InterpError> {
    let name = req.name.clone();
    self.validate_subproject_name(&name)?;

    if self.ctx.subproject_stack.contains(&name) {
      return Err(self.cycle_error(&name));
    }
    let cached = self.session().subprojects.get(&name).cloned();
    match cached {
      Some(SubprojectEntry::Done(handle)) => return self.reuse_subproject(&req, handle),
      Some(SubprojectEntry::InProgress) => return Err(self.cycle_error(&name)),
      None => {}
    }

    let subdir = match self.resolve_subproject(&req) {
      Outcome::Ready(subdir) => subdir,
      Outcome::Disabled(reason) => {
        info!(subproject = %name, %reason, "subproject is buildable: NO (disabling)");
        return Ok(self.session_mut().subprojects.finish(Subproject::disabled(&name, "", Some(reason), None)));
      }
      Outcome::Failed(err) => return Err(err),
    };

    // Arguments added after this point could not reach the subproject.
    self.ctx.global_args_frozen = true;
    self.session_mut().subprojects.begin(&name);
    info!(subproject = %name, dir = %subdir, "executing subproject");

    let child = self.child(&name, &subdir, req.default_options.clone());
    match child.run() {
      Ok(child) => self.merge_subproject(&req, &subdir, child),
      Err(err) if err.is_cycle() || req.required => {
        self
          .session_mut()
          .subprojects
          .finish(Subproject::failed(&name, &subdir, err.clone()));
        Err(err)
      }
      Err(err) => {
        warn!(subproject = %name, error = %err, "subproject is buildable: NO (disabling)");
        Ok(
          self
            .session_mut()
            .subprojects
            .finish(Subproject::disabled(&name, &subdir, None, Some(err))),
        )
      }
    }
  }

  fn validate_subproject_name(&mut self, name: &str) -> Result<(), InterpError> {
    if name.is_empty() {
      return Err(InterpError::invalid_args("Subproject name must not be empty."));
    }
    if name.starts_with('.') {
      return Err(InterpError::invalid_args("Subproject name must not start with a period."));
    }
    if name.contains("..") {
      return Err(InterpError::invalid_args("Subproject name must not contain a \"..\" path segment."));
    }
    if Path::new(name).is_absolute() {
      return Err(InterpError::invalid_args("Subproject name must not be an absolute path."));
    }
    if name.contains('/') || name.contains('\\') {
      self.warning(&format!(
        "Subproject name {:?} has a path separator. This may cause unexpected behaviour.",
        name
      ));
    }
    Ok(())
  }

  fn cycle_error(&self, name: &str) -> InterpError {
    let mut chain = self.ctx.subproject_stack.clone();
    chain.push(name.to_string());
    InterpError::SubprojectCycle { chain }
  }

  fn reuse_subproject(&self, req: &SubprojectRequest, handle: Rc<Subproject>) -> Result<Rc<Subproject>, InterpError> {
    if req.required && !handle.found() {
      return Err(InterpError::SubprojectRequired { name: req.name.clone() });
    }
    if handle.found() && !req.version.is_empty() && !version_satisfies(handle.version(), &req.version) {
      return Err(InterpError::SubprojectVersion {
        name: req.name.clone(),
        found: handle.version().to_string(),
        wanted: req.version.clone(),
      });
    }
    Ok(handle)
  }

  /// Ask the source resolver where the subproject lives.
  fn resolve_subproject(&mut self, req: &SubprojectRequest) -> Outcome<String> {
    let resolved = self.session_mut().resolver.resolve(&req.name, SUBPROJECT_METHOD);
    match resolved {
      Ok(subdir) => Outcome::Ready(subdir),
      Err(err) if req.required => Outcome::Failed(err.into()),
      Err(err) => Outcome::Disabled(err.to_string()),
    }
  }

  fn merge_subproject(&mut self, req: &SubprojectRequest, subdir: &str, child: Interpreter) -> Result<Rc<Subproject>, InterpError> {
    let name = req.name.as_str();
    let version = child.ctx.project_version().to_string();
    if !req.version.is_empty() && !version_satisfies(&version, &req.version) {
      self.session_mut().subprojects.discard(name);
      return Err(InterpError::SubprojectVersion {
        name: name.to_string(),
        found: version,
        wanted: req.version.clone(),
      });
    }

    let Interpreter { ctx, fragment, .. } = child;
    if let Err(err) = self.fragment.absorb(fragment) {
      let err = InterpError::from(err);
      self
        .session_mut()
        .subprojects
        .finish(Subproject::failed(name, subdir, err.clone()));
      return Err(err);
    }
    self.fragment.subproject_versions.insert(name.to_string(), version.clone());

    let warnings = ctx.warnings;
    let handle = Subproject::ready(name, subdir, version, ctx.variables, warnings);
    let handle = {
      let mut session = self.session_mut();
      session.coredata.initialized_subprojects.insert(name.to_string());
      session.subprojects.finish(handle)
    };
    info!(subproject = name, version = handle.version(), warnings, "subproject is buildable: YES");
    Ok(handle)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::interpreter::{ProjectRequest, ProjectVersion, SourceInput, TargetRequest};
  use crate::target::TargetKind;
  use crate::util::testutil::{ScriptFrontend, declared_root, write_subproject};
  use crate::value::Value;
  use std::fs;
  use tempfile::TempDir;

  fn declare(interp: &mut Interpreter, name: &str, version: &str) -> Result<(), InterpError> {
    let mut req = ProjectRequest::named(name);
    req.version = Some(ProjectVersion::Str(version.to_string()));
    interp.project(req)
  }

  mod caching {
    use super::*;

    #[test]
    fn second_call_returns_same_handle_without_reevaluation() {
      let dir = TempDir::new().unwrap();
      write_subproject(dir.path(), "foo");
      let frontend = ScriptFrontend::new().script("foo", |i| declare(i, "foo", "1.0"));
      let mut root = declared_root(dir.path(), &frontend);

      let first = root.subproject(SubprojectRequest::new("foo")).unwrap();
      let second = root.subproject(SubprojectRequest::new("foo")).unwrap();
      assert!(Rc::ptr_eq(&first, &second));
      assert_eq!(frontend.runs("foo"), 1);
      assert_eq!(root.fragment.subproject_versions["foo"], "1.0");
      assert!(root.ctx.global_args_frozen);
    }

    #[test]
    fn diamond_is_evaluated_once() {
      let dir = TempDir::new().unwrap();
      for name in ["left", "right", "base"] {
        write_subproject(dir.path(), name);
      }
      let frontend = ScriptFrontend::new()
        .script("left", |i| {
          declare(i, "left", "1")?;
          i.subproject(SubprojectRequest::new("base")).map(|_| ())
        })
        .script("right", |i| {
          declare(i, "right", "1")?;
          i.subproject(SubprojectRequest::new("base")).map(|_| ())
        })
        .script("base", |i| declare(i, "base", "1"));
      let mut root = declared_root(dir.path(), &frontend);
      root.subproject(SubprojectRequest::new("left")).unwrap();
      root.subproject(SubprojectRequest::new("right")).unwrap();
      assert_eq!(frontend.runs("base"), 1);
      assert!(root.session().coredata.initialized_subprojects.contains("base"));
    }
  }

  mod failures {
    use super::*;

    #[test]
    fn cycle_names_full_chain() {
      let dir = TempDir::new().unwrap();
      write_subproject(dir.path(), "a");
      write_subproject(dir.path(), "b");
      let frontend = ScriptFrontend::new()
        .script("a", |i| {
          declare(i, "a", "1")?;
          i.subproject(SubprojectRequest::new("b")).map(|_| ())
        })
        .script("b", |i| {
          declare(i, "b", "1")?;
          i.subproject(SubprojectRequest::new("a").optional()).map(|_| ())
        });
      let mut root = declared_root(dir.path(), &frontend);
      let err = root.subproject(SubprojectRequest::new("a").optional()).unwrap_err();
      assert_eq!(err.to_string(), "Recursive include of subprojects: a => b => a.");
    }

    #[test]
    fn optional_missing_sources_disable() {
      let dir = TempDir::new().unwrap();
      let frontend = ScriptFrontend::new();
      let mut root = declared_root(dir.path(), &frontend);
      let handle = root.subproject(SubprojectRequest::new("ghost").optional()).unwrap();
      assert!(!handle.found());
      assert!(handle.disabled_reason().is_some());
      let err = root.subproject(SubprojectRequest::new("ghost")).unwrap_err();
      assert_eq!(err, InterpError::SubprojectRequired { name: "ghost".to_string() });
    }

    #[test]
    fn required_missing_sources_fail() {
      let dir = TempDir::new().unwrap();
      let frontend = ScriptFrontend::new();
      let mut root = declared_root(dir.path(), &frontend);
      assert!(matches!(
        root.subproject(SubprojectRequest::new("ghost")),
        Err(InterpError::Wrap(_))
      ));
    }

    #[test]
    fn optional_evaluation_error_is_downgraded() {
      let dir = TempDir::new().unwrap();
      write_subproject(dir.path(), "broken");
      let frontend = ScriptFrontend::new().script("broken", |i| {
        declare(i, "broken", "1")?;
        Err(i.problem("nope"))
      });
      let mut root = declared_root(dir.path(), &frontend);
      let handle = root.subproject(SubprojectRequest::new("broken").optional()).unwrap();
      assert!(!handle.found());
      assert_eq!(handle.exception(), Some(&InterpError::Problem("nope".to_string())));
    }

    #[test]
    fn required_evaluation_error_propagates() {
      let dir = TempDir::new().unwrap();
      write_subproject(dir.path(), "broken");
      let frontend = ScriptFrontend::new().script("broken", |i| {
        declare(i, "broken", "1")?;
        Err(i.problem("nope"))
      });
      let mut root = declared_root(dir.path(), &frontend);
      let err = root.subproject(SubprojectRequest::new("broken")).unwrap_err();
      assert_eq!(err, InterpError::Problem("nope".to_string()));
    }

    #[test]
    fn missing_project_call_fails() {
      let dir = TempDir::new().unwrap();
      write_subproject(dir.path(), "lazy");
      let frontend = ScriptFrontend::new().script("lazy", |_| Ok(()));
      let mut root = declared_root(dir.path(), &frontend);
      assert!(matches!(
        root.subproject(SubprojectRequest::new("lazy")),
        Err(InterpError::InvalidCode(_))
      ));
    }

    #[test]
    fn version_mismatch_is_fatal_even_when_optional() {
      let dir = TempDir::new().unwrap();
      write_subproject(dir.path(), "old");
      let frontend = ScriptFrontend::new().script("old", |i| declare(i, "old", "1.2.0"));
      let mut root = declared_root(dir.path(), &frontend);
      let mut req = SubprojectRequest::new("old").optional();
      req.version = vec![">=1.3".to_string()];
      let err = root.subproject(req).unwrap_err();
      assert!(matches!(err, InterpError::SubprojectVersion { .. }));
      assert!(root.session().subprojects.get("old").is_none());
    }

    #[test]
    fn invalid_names_rejected() {
      let dir = TempDir::new().unwrap();
      let frontend = ScriptFrontend::new();
      let mut root = declared_root(dir.path(), &frontend);
      for bad in ["", ".hidden", "a/../b", "/abs"] {
        assert!(
          matches!(root.subproject(SubprojectRequest::new(bad)), Err(InterpError::InvalidArguments(_))),
          "{bad:?} accepted"
        );
      }
    }
  }

  mod merging {
    use super::*;

    #[test]
    fn targets_variables_and_files_merged() {
      let dir = TempDir::new().unwrap();
      write_subproject(dir.path(), "zlib");
      fs::write(dir.path().join("subprojects/zlib/zlib.c"), "").unwrap();
      let frontend = ScriptFrontend::new().script("zlib", |i| {
        declare(i, "zlib", "1.3")?;
        let mut req = TargetRequest::new("z", TargetKind::StaticLibrary);
        req.sources = vec![SourceInput::Path("zlib.c".to_string())];
        let lib = i.build_target(req)?;
        i.set_variable("zlib_lib", Value::Target(lib))?;
        i.warning("something odd");
        Ok(())
      });
      let mut root = declared_root(dir.path(), &frontend);
      let handle = root.subproject(SubprojectRequest::new("zlib")).unwrap();

      assert!(root.fragment.registry.find("z", TargetKind::StaticLibrary).is_some());
      assert!(matches!(handle.get_variable("zlib_lib"), Ok(Value::Target(_))));
      assert!(matches!(
        handle.get_variable("missing"),
        Err(InterpError::UnknownVariable { .. })
      ));
      assert_eq!(handle.warnings, 1);
      assert!(root.fragment.dep_manifest.contains_key("zlib"));
      assert_eq!(handle.subdir, "subprojects/zlib");
    }
  }
}
