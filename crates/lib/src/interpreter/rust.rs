//! `rust.test()`: run a Rust target's unit tests.

use std::collections::BTreeMap;
use std::rc::Rc;

use super::{Interpreter, TestExe, TestRequest};
use crate::dependency::Dependency;
use crate::error::InterpError;
use crate::target::{BuildTarget, TargetId, TargetKind, validate_target_name};

/// Arguments of `rust.test()`.
#[derive(Debug, Clone)]
pub struct RustTestRequest {
  pub name: String,
  pub base: Rc<BuildTarget>,
  pub args: Vec<String>,
  pub dependencies: Vec<Rc<Dependency>>,
  pub suite: Vec<String>,
  pub should_fail: bool,
  pub timeout: Option<i64>,
  pub workdir: Option<String>,
  pub priority: i64,
  pub is_parallel: bool,
  pub depends: Vec<Rc<BuildTarget>>,
  pub env: BTreeMap<String, String>,
}

impl RustTestRequest {
  pub fn new(name: &str, base: Rc<BuildTarget>) -> Self {
    Self {
      name: name.to_string(),
      base,
      args: Vec::new(),
      dependencies: Vec::new(),
      suite: Vec::new(),
      should_fail: false,
      timeout: None,
      workdir: None,
      priority: 0,
      is_parallel: true,
      depends: Vec::new(),
      env: BTreeMap::new(),
    }
  }
}

impl Interpreter {
  /// Build `base`'s sources again as a libtest harness and register a test
  /// running it.
  pub fn rust_test(&mut self, req: RustTestRequest) -> Result<Rc<BuildTarget>, InterpError> {
    self.require_project("rust.test")?;
    if !req.base.uses_rust() {
      return Err(InterpError::invalid_args(format!(
        "Second positional argument to rust.test() must be a rust based target, but '{}' has no Rust sources.",
        req.base.name
      )));
    }
    validate_target_name(&req.name)?;

    let mut args = Vec::with_capacity(req.args.len() + 3);
    let mut skip_value = false;
    for arg in req.args {
      if skip_value {
        skip_value = false;
        continue;
      }
      match arg.as_str() {
        "--test" => self.warning("Do not add --test to rust.test() arguments"),
        "--format" => {
          self.warning("Do not add --format to rust.test() arguments");
          skip_value = true;
        }
        a if a.starts_with("--format=") => self.warning("Do not add --format to rust.test() arguments"),
        _ => args.push(arg),
      }
    }
    args.extend(["--test", "--format", "pretty"].map(str::to_string));

    let base = &req.base;
    let mut exe = BuildTarget::clone(base);
    exe.name = req.name.clone();
    exe.kind = TargetKind::Executable;
    exe.id = TargetId::new(&self.ctx.subdir, &req.name, TargetKind::Executable);
    exe.subdir = self.ctx.subdir.clone();
    exe.subproject = self.ctx.subproject.clone();
    exe.install = false;
    exe.language_args.entry("rust".to_string()).or_default().push("--test".to_string());
    for dep in req.dependencies.into_iter().filter(|d| d.found()) {
      for id in dep.all_link_with() {
        if !exe.link_with.contains(&id) {
          exe.link_with.push(id);
        }
      }
      exe.dependencies.push(dep);
    }
    let exe = self.register_target(exe)?;

    let mut test = TestRequest::new(&req.name, TestExe::Target(exe.clone()));
    test.args = args;
    test.protocol = "rust".to_string();
    test.suite = req.suite;
    test.should_fail = req.should_fail;
    if let Some(timeout) = req.timeout {
      test.timeout = timeout;
    }
    test.workdir = req.workdir;
    test.priority = req.priority;
    test.is_parallel = req.is_parallel;
    test.depends = req.depends;
    test.env = req.env;
    self.add_test(test, false)?;
    Ok(exe)
  }
}
