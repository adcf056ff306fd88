use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use super::{Interpreter, join_subdir};
use crate::consts::DEFAULT_TEST_TIMEOUT;
use crate::dependency::Dependency;
use crate::error::InterpError;
use crate::graph::TestDef;
use crate::machine::MachineChoice;
use crate::program::ExternalProgram;
use crate::target::{BuildTarget, SourceFile, TargetKind};

/// One entry of a `sources` or `input` list.
#[derive(Debug, Clone)]
pub enum SourceInput {
  /// A path relative to the current directory.
  Path(String),
  File(SourceFile),
  /// The outputs of a custom target.
  Target(Rc<BuildTarget>),
}

/// Arguments shared by the compiled-target builtins.
#[derive(Debug, Clone)]
pub struct TargetRequest {
  pub name: String,
  pub kind: TargetKind,
  pub sources: Vec<SourceInput>,
  pub dependencies: Vec<Rc<Dependency>>,
  pub link_with: Vec<Rc<BuildTarget>>,
  /// `<lang>_args` keywords, keyed by language.
  pub language_args: BTreeMap<String, Vec<String>>,
  pub link_args: Vec<String>,
  pub install: bool,
  pub build_by_default: bool,
  pub native: bool,
}

impl TargetRequest {
  pub fn new(name: &str, kind: TargetKind) -> Self {
    Self {
      name: name.to_string(),
      kind,
      sources: Vec::new(),
      dependencies: Vec::new(),
      link_with: Vec::new(),
      language_args: BTreeMap::new(),
      link_args: Vec::new(),
      install: false,
      build_by_default: true,
      native: false,
    }
  }
}

/// One element of a `command` list.
#[derive(Debug, Clone)]
pub enum CommandPart {
  Str(String),
  File(SourceFile),
  Target(Rc<BuildTarget>),
  Program(Rc<ExternalProgram>),
}

/// Arguments of `custom_target()`.
#[derive(Debug, Clone, Default)]
pub struct CustomTargetRequest {
  pub name: String,
  pub inputs: Vec<SourceInput>,
  pub outputs: Vec<String>,
  pub command: Vec<CommandPart>,
  pub depends: Vec<Rc<BuildTarget>>,
  pub install: bool,
  pub build_by_default: bool,
}

/// The executable a test runs.
#[derive(Debug, Clone)]
pub enum TestExe {
  Target(Rc<BuildTarget>),
  Program(Rc<ExternalProgram>),
}

/// Arguments of `test()` and `benchmark()`.
#[derive(Debug, Clone)]
pub struct TestRequest {
  pub name: String,
  pub exe: TestExe,
  pub args: Vec<String>,
  pub suite: Vec<String>,
  pub should_fail: bool,
  pub timeout: i64,
  pub workdir: Option<String>,
  pub protocol: String,
  pub priority: i64,
  pub is_parallel: bool,
  pub depends: Vec<Rc<BuildTarget>>,
  pub env: BTreeMap<String, String>,
}

impl TestRequest {
  pub fn new(name: &str, exe: TestExe) -> Self {
    Self {
      name: name.to_string(),
      exe,
      args: Vec::new(),
      suite: Vec::new(),
      should_fail: false,
      timeout: DEFAULT_TEST_TIMEOUT,
      workdir: None,
      protocol: "exitcode".to_string(),
      priority: 0,
      is_parallel: true,
      depends: Vec::new(),
      env: BTreeMap::new(),
    }
  }
}

const TEST_PROTOCOLS: &[&str] = &["exitcode", "tap", "gtest", "rust"];

impl Interpreter {
  /// `files()`: file handles for paths relative to the current directory.
  pub fn files(&self, names: &[String]) -> Result<Vec<SourceFile>, InterpError> {
    self.require_project("files")?;
    names.iter().map(|n| self.source_file(n)).collect()
  }

  pub(super) fn source_file(&self, fname: &str) -> Result<SourceFile, InterpError> {
    let source_root = self.source_root();
    self.ctx.bounds(&source_root).validate(&self.ctx.subdir, fname)?;
    let path = source_root.join(&self.ctx.subdir).join(fname);
    if !path.is_file() {
      return Err(InterpError::invalid_args(format!("File {} does not exist.", fname)));
    }
    Ok(SourceFile::from_source(&self.ctx.subdir, fname))
  }

  pub(super) fn source_files(&self, inputs: Vec<SourceInput>) -> Result<Vec<SourceFile>, InterpError> {
    let mut out = Vec::new();
    for input in inputs {
      match input {
        SourceInput::Path(p) => out.push(self.source_file(&p)?),
        SourceInput::File(f) => out.push(f),
        SourceInput::Target(t) if t.kind == TargetKind::Custom => {
          out.extend(t.outputs.iter().map(|o| SourceFile::from_built(&t.subdir, o)));
        }
        SourceInput::Target(t) => {
          return Err(InterpError::invalid_args(format!(
            "Build target '{}' of type {} cannot be used as a source.",
            t.name, t.kind
          )));
        }
      }
    }
    Ok(out)
  }

  pub(super) fn register_target(&mut self, target: BuildTarget) -> Result<Rc<BuildTarget>, InterpError> {
    self.ctx.project_args_frozen = true;
    let mut session = self.session.borrow_mut();
    Ok(self.fragment.registry.register(target, &mut session.coredata.target_guids)?)
  }

  /// `executable()`, `static_library()`, `shared_library()`,
  /// `shared_module()`, `jar()` and `build_target()`.
  pub fn build_target(&mut self, req: TargetRequest) -> Result<Rc<BuildTarget>, InterpError> {
    self.require_project(req.kind.as_str())?;
    if matches!(req.kind, TargetKind::Custom | TargetKind::Run | TargetKind::Alias) {
      return Err(InterpError::invalid_args(format!(
        "Target type {} cannot be declared with build_target().",
        req.kind
      )));
    }
    crate::target::validate_target_name(&req.name)?;

    let mut target = BuildTarget::new(
      &req.name,
      req.kind,
      &self.ctx.subdir,
      &self.ctx.subproject,
      MachineChoice::from_native(req.native),
    );
    target.sources = self.source_files(req.sources)?;
    for lib in &req.link_with {
      if !lib.kind.is_linkable() {
        return Err(InterpError::invalid_args(format!("Link target '{}' is not linkable.", lib.name)));
      }
      target.link_with.push(lib.id.clone());
    }
    // Not-found dependencies are accepted and ignored.
    target.dependencies = req.dependencies.into_iter().filter(|d| d.found()).collect();
    for dep in &target.dependencies {
      for id in dep.all_link_with() {
        if !target.link_with.contains(&id) {
          target.link_with.push(id);
        }
      }
    }
    target.language_args = req.language_args;
    target.link_args = req.link_args;
    target.install = req.install;
    target.build_by_default = req.build_by_default;
    target.project_version = self.ctx.project_version().to_string();
    self.register_target(target)
  }

  /// `library()`: a shared or static library (or both) depending on the
  /// `default_library` option.
  pub fn library(&mut self, mut req: TargetRequest) -> Result<Rc<BuildTarget>, InterpError> {
    self.require_project("library")?;
    match self.option_string("default_library").as_deref() {
      Some("static") => {
        req.kind = TargetKind::StaticLibrary;
        self.build_target(req)
      }
      Some("both") => self.both_libraries(req),
      _ => {
        req.kind = TargetKind::SharedLibrary;
        self.build_target(req)
      }
    }
  }

  /// `both_libraries()`: declares a shared and a static library from the same
  /// sources and returns the shared one.
  pub fn both_libraries(&mut self, mut req: TargetRequest) -> Result<Rc<BuildTarget>, InterpError> {
    self.require_project("both_libraries")?;
    let mut static_req = req.clone();
    static_req.kind = TargetKind::StaticLibrary;
    req.kind = TargetKind::SharedLibrary;
    let shared = self.build_target(req)?;
    self.build_target(static_req)?;
    Ok(shared)
  }

  /// `custom_target()`.
  pub fn custom_target(&mut self, req: CustomTargetRequest) -> Result<Rc<BuildTarget>, InterpError> {
    self.require_project("custom_target")?;
    crate::target::validate_target_name(&req.name)?;
    if req.outputs.is_empty() {
      return Err(InterpError::invalid_args("custom_target: output must not be empty."));
    }
    for output in &req.outputs {
      if output.is_empty() {
        return Err(InterpError::invalid_args("Output must not be empty."));
      }
      if output.contains('/') || output.contains('\\') {
        return Err(InterpError::invalid_args(format!(
          "Output {:?} must not contain a path segment.",
          output
        )));
      }
    }

    let inputs = self.source_files(req.inputs)?;
    let mut target = BuildTarget::new(&req.name, TargetKind::Custom, &self.ctx.subdir, &self.ctx.subproject, MachineChoice::Host);
    let (command, mut depends) = render_command(req.command)?;
    target.command = substitute_placeholders(command, &inputs, &req.outputs, &self.ctx.subdir);
    target.sources = inputs;
    target.outputs = req.outputs;
    depends.extend(req.depends.iter().map(|t| t.id.clone()));
    depends.dedup();
    target.depends = depends;
    target.install = req.install;
    target.build_by_default = req.build_by_default;
    target.project_version = self.ctx.project_version().to_string();
    self.register_target(target)
  }

  /// `run_target()`: a command run on demand, never by default.
  pub fn run_target(
    &mut self,
    name: &str,
    command: Vec<CommandPart>,
    depends: Vec<Rc<BuildTarget>>,
  ) -> Result<Rc<BuildTarget>, InterpError> {
    self.require_project("run_target")?;
    crate::target::validate_target_name(name)?;
    let mut target = BuildTarget::new(name, TargetKind::Run, &self.ctx.subdir, &self.ctx.subproject, MachineChoice::Build);
    let (command, mut ids) = render_command(command)?;
    ids.extend(depends.iter().map(|t| t.id.clone()));
    target.command = command;
    target.depends = ids;
    target.build_by_default = false;
    self.register_target(target)
  }

  /// `alias_target()`: a named target that only depends on others.
  pub fn alias_target(&mut self, name: &str, depends: Vec<Rc<BuildTarget>>) -> Result<Rc<BuildTarget>, InterpError> {
    self.require_project("alias_target")?;
    if depends.is_empty() {
      return Err(InterpError::invalid_args("alias_target takes at least one dependency."));
    }
    crate::target::validate_target_name(name)?;
    let mut target = BuildTarget::new(name, TargetKind::Alias, &self.ctx.subdir, &self.ctx.subproject, MachineChoice::Build);
    target.depends = depends.iter().map(|t| t.id.clone()).collect();
    target.build_by_default = false;
    self.register_target(target)
  }

  /// `test()` (or `benchmark()` when `benchmark` is set).
  pub fn add_test(&mut self, mut req: TestRequest, benchmark: bool) -> Result<(), InterpError> {
    let func = if benchmark { "benchmark" } else { "test" };
    self.require_project(func)?;
    if req.name.contains(':') {
      let renamed = req.name.replace(':', "_");
      self.warning(&format!(
        "\":\" is not allowed in test name \"{}\", it has been replaced with \"_\"",
        req.name
      ));
      req.name = renamed;
    }
    if !TEST_PROTOCOLS.contains(&req.protocol.as_str()) {
      return Err(InterpError::invalid_args(format!(
        "Protocol must be one of {}, not {:?}.",
        TEST_PROTOCOLS.join(", "),
        req.protocol
      )));
    }
    if let Some(workdir) = &req.workdir
      && !Path::new(workdir).is_absolute()
    {
      return Err(InterpError::invalid_args("workdir must be an absolute path."));
    }

    let exe = match &req.exe {
      TestExe::Target(t) => t.id.0.clone(),
      TestExe::Program(p) if p.found() => p.path_string(),
      TestExe::Program(p) => {
        return Err(InterpError::invalid_args(format!(
          "Tried to use not-found external program {:?} as test executable.",
          p.name
        )));
      }
    };

    let project = self.ctx.display_name().replace([' ', ':'], "_");
    let suite = if req.suite.is_empty() {
      vec![project.clone()]
    } else {
      req
        .suite
        .iter()
        .map(|s| if s.is_empty() { project.clone() } else { format!("{}:{}", project, s) })
        .collect()
    };

    let def = TestDef {
      name: req.name,
      project: self.ctx.display_name().to_string(),
      suite,
      exe,
      args: req.args,
      protocol: req.protocol,
      should_fail: req.should_fail,
      timeout: req.timeout,
      workdir: req.workdir,
      priority: req.priority,
      is_parallel: req.is_parallel && !benchmark,
      depends: req.depends.iter().map(|t| t.id.0.clone()).collect(),
      env: req.env,
    };
    if benchmark {
      self.fragment.benchmarks.push(def);
    } else {
      self.fragment.tests.push(def);
    }
    Ok(())
  }
}

/// Render a command line to strings, collecting the targets it runs.
fn render_command(parts: Vec<CommandPart>) -> Result<(Vec<String>, Vec<crate::target::TargetId>), InterpError> {
  if parts.is_empty() {
    return Err(InterpError::invalid_args("command must not be empty."));
  }
  let mut command = Vec::new();
  let mut depends = Vec::new();
  for part in parts {
    match part {
      CommandPart::Str(s) => command.push(s),
      CommandPart::File(f) => command.push(f.relative_path()),
      CommandPart::Target(t) => {
        command.push(join_subdir(&t.subdir, &t.name));
        depends.push(t.id.clone());
      }
      CommandPart::Program(p) if p.found() => command.push(p.path_string()),
      CommandPart::Program(p) => {
        return Err(InterpError::invalid_args(format!(
          "Tried to use not-found external program {:?} in \"command\"",
          p.name
        )));
      }
    }
  }
  Ok((command, depends))
}

/// Expand `@INPUT@`, `@OUTPUT@`, `@INPUTn@`, `@OUTPUTn@` and `@OUTDIR@`.
fn substitute_placeholders(command: Vec<String>, inputs: &[SourceFile], outputs: &[String], subdir: &str) -> Vec<String> {
  let input_paths: Vec<String> = inputs.iter().map(SourceFile::relative_path).collect();
  let output_paths: Vec<String> = outputs.iter().map(|o| join_subdir(subdir, o)).collect();
  let outdir = if subdir.is_empty() { ".".to_string() } else { subdir.to_string() };
  let mut out = Vec::new();
  for arg in command {
    match arg.as_str() {
      "@INPUT@" => out.extend(input_paths.iter().cloned()),
      "@OUTPUT@" => out.extend(output_paths.iter().cloned()),
      _ => {
        let mut arg = arg.replace("@OUTDIR@", &outdir);
        for (i, p) in input_paths.iter().enumerate() {
          arg = arg.replace(&format!("@INPUT{}@", i), p);
        }
        for (i, p) in output_paths.iter().enumerate() {
          arg = arg.replace(&format!("@OUTPUT{}@", i), p);
        }
        out.push(arg);
      }
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::target::RegistryError;
  use crate::util::testutil::declared_interpreter;
  use std::fs;
  use tempfile::TempDir;

  fn with_sources(dir: &TempDir, names: &[&str]) {
    for n in names {
      let path = dir.path().join(n);
      if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
      }
      fs::write(path, "").unwrap();
    }
  }

  fn exe(name: &str, sources: &[&str]) -> TargetRequest {
    let mut req = TargetRequest::new(name, TargetKind::Executable);
    req.sources = sources.iter().map(|s| SourceInput::Path(s.to_string())).collect();
    req
  }

  mod build_targets {
    use super::*;

    #[test]
    fn executable_registered_with_guid() {
      let dir = TempDir::new().unwrap();
      with_sources(&dir, &["main.c"]);
      let mut interp = declared_interpreter(dir.path());
      let t = interp.build_target(exe("app", &["main.c"])).unwrap();
      assert_eq!(t.id.as_str(), "app@exe");
      assert_eq!(t.guid.len(), 36);
      assert!(interp.ctx.project_args_frozen);
      assert_eq!(interp.fragment.registry.len(), 1);
    }

    #[test]
    fn missing_source_fails() {
      let dir = TempDir::new().unwrap();
      let mut interp = declared_interpreter(dir.path());
      let err = interp.build_target(exe("app", &["nope.c"])).unwrap_err();
      assert_eq!(err, InterpError::invalid_args("File nope.c does not exist."));
    }

    #[test]
    fn duplicate_name_and_kind_fails() {
      let dir = TempDir::new().unwrap();
      with_sources(&dir, &["main.c"]);
      let mut interp = declared_interpreter(dir.path());
      interp.build_target(exe("app", &["main.c"])).unwrap();
      let err = interp.build_target(exe("app", &["main.c"])).unwrap_err();
      assert!(matches!(err, InterpError::Registry(RegistryError::Duplicate { .. })));
    }

    #[test]
    fn reserved_names_fail() {
      let dir = TempDir::new().unwrap();
      let mut interp = declared_interpreter(dir.path());
      assert!(matches!(
        interp.build_target(exe("kiln-internal", &[])),
        Err(InterpError::Registry(RegistryError::ReservedPrefix(_)))
      ));
      assert!(matches!(
        interp.build_target(exe("install", &[])),
        Err(InterpError::Registry(RegistryError::ReservedName(_)))
      ));
    }

    #[test]
    fn link_with_requires_library() {
      let dir = TempDir::new().unwrap();
      with_sources(&dir, &["main.c"]);
      let mut interp = declared_interpreter(dir.path());
      let app = interp.build_target(exe("app", &["main.c"])).unwrap();
      let mut req = exe("other", &["main.c"]);
      req.link_with = vec![app];
      assert!(matches!(interp.build_target(req), Err(InterpError::InvalidArguments(_))));
    }

    #[test]
    fn both_libraries_registers_two() {
      let dir = TempDir::new().unwrap();
      with_sources(&dir, &["lib.c"]);
      let mut interp = declared_interpreter(dir.path());
      let mut req = exe("util", &["lib.c"]);
      req.kind = TargetKind::SharedLibrary;
      let shared = interp.both_libraries(req).unwrap();
      assert_eq!(shared.kind, TargetKind::SharedLibrary);
      assert!(interp.fragment.registry.find("util", TargetKind::StaticLibrary).is_some());
    }

    #[test]
    fn library_follows_default_library_option() {
      let dir = TempDir::new().unwrap();
      with_sources(&dir, &["lib.c"]);
      let mut interp = declared_interpreter(dir.path());
      interp.ctx.project_default_options.insert("default_library".to_string(), "static".to_string());
      let t = interp.library(exe("util", &["lib.c"])).unwrap();
      assert_eq!(t.kind, TargetKind::StaticLibrary);
    }

    #[test]
    fn files_in_nested_subproject_rejected() {
      let dir = TempDir::new().unwrap();
      with_sources(&dir, &["subprojects/foo/x.c"]);
      let interp = declared_interpreter(dir.path());
      let err = interp.files(&["subprojects/foo/x.c".to_string()]).unwrap_err();
      assert!(matches!(err, InterpError::Sandbox(_)));
    }
  }

  mod custom {
    use super::*;

    #[test]
    fn placeholders_expanded() {
      let dir = TempDir::new().unwrap();
      with_sources(&dir, &["in.txt"]);
      let mut interp = declared_interpreter(dir.path());
      let req = CustomTargetRequest {
        name: "gen".to_string(),
        inputs: vec![SourceInput::Path("in.txt".to_string())],
        outputs: vec!["out.h".to_string()],
        command: ["cp", "@INPUT@", "@OUTPUT0@"]
          .iter()
          .map(|s| CommandPart::Str(s.to_string()))
          .collect(),
        build_by_default: true,
        ..Default::default()
      };
      let t = interp.custom_target(req).unwrap();
      assert_eq!(t.command, vec!["cp", "in.txt", "out.h"]);
      assert_eq!(t.id.as_str(), "gen@cus");
    }

    #[test]
    fn output_with_path_segment_fails() {
      let dir = TempDir::new().unwrap();
      let mut interp = declared_interpreter(dir.path());
      let req = CustomTargetRequest {
        name: "gen".to_string(),
        outputs: vec!["sub/out.h".to_string()],
        command: vec![CommandPart::Str("true".to_string())],
        ..Default::default()
      };
      assert!(matches!(interp.custom_target(req), Err(InterpError::InvalidArguments(_))));
    }

    #[test]
    fn custom_target_outputs_usable_as_sources() {
      let dir = TempDir::new().unwrap();
      with_sources(&dir, &["main.c"]);
      let mut interp = declared_interpreter(dir.path());
      let gen_target = interp
        .custom_target(CustomTargetRequest {
          name: "gen".to_string(),
          outputs: vec!["config.h".to_string()],
          command: vec![CommandPart::Str("touch".to_string()), CommandPart::Str("@OUTPUT@".to_string())],
          ..Default::default()
        })
        .unwrap();
      let mut req = exe("app", &["main.c"]);
      req.sources.push(SourceInput::Target(gen_target));
      let app = interp.build_target(req).unwrap();
      assert!(app.sources.iter().any(|s| s.is_built && s.fname == "config.h"));
    }

    #[test]
    fn alias_needs_dependencies() {
      let dir = TempDir::new().unwrap();
      let mut interp = declared_interpreter(dir.path());
      assert!(interp.alias_target("everything", vec![]).is_err());
    }
  }

  mod tests_and_benchmarks {
    use super::*;

    fn program() -> TestExe {
      TestExe::Program(Rc::new(ExternalProgram::found_at("true", "/bin/true".into())))
    }

    #[test]
    fn colon_in_name_replaced_with_warning() {
      let dir = TempDir::new().unwrap();
      let mut interp = declared_interpreter(dir.path());
      interp.add_test(TestRequest::new("a:b", program()), false).unwrap();
      assert_eq!(interp.fragment.tests[0].name, "a_b");
      assert_eq!(interp.ctx.warnings, 1);
    }

    #[test]
    fn suites_prefixed_with_project() {
      let dir = TempDir::new().unwrap();
      let mut interp = declared_interpreter(dir.path());
      let mut req = TestRequest::new("unit", program());
      req.suite = vec!["fast".to_string()];
      interp.add_test(req, false).unwrap();
      interp.add_test(TestRequest::new("plain", program()), false).unwrap();
      assert_eq!(interp.fragment.tests[0].suite, vec!["test:fast"]);
      assert_eq!(interp.fragment.tests[1].suite, vec!["test"]);
      assert_eq!(interp.fragment.tests[1].timeout, DEFAULT_TEST_TIMEOUT);
    }

    #[test]
    fn relative_workdir_rejected() {
      let dir = TempDir::new().unwrap();
      let mut interp = declared_interpreter(dir.path());
      let mut req = TestRequest::new("unit", program());
      req.workdir = Some("rel".to_string());
      assert!(matches!(interp.add_test(req, false), Err(InterpError::InvalidArguments(_))));
    }

    #[test]
    fn unknown_protocol_rejected() {
      let dir = TempDir::new().unwrap();
      let mut interp = declared_interpreter(dir.path());
      let mut req = TestRequest::new("unit", program());
      req.protocol = "junit".to_string();
      assert!(interp.add_test(req, false).is_err());
    }

    #[test]
    fn benchmarks_run_serially() {
      let dir = TempDir::new().unwrap();
      let mut interp = declared_interpreter(dir.path());
      interp.add_test(TestRequest::new("speed", program()), true).unwrap();
      assert!(interp.fragment.tests.is_empty());
      assert!(!interp.fragment.benchmarks[0].is_parallel);
    }
  }
}
