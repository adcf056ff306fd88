//! Target, test and file builtins.

use crate::error::InterpError;
use crate::interpreter::{CommandPart, CustomTargetRequest, Interpreter, SourceInput, TargetRequest, TestExe, TestRequest};
use crate::lua::convert::Args;
use crate::lua::globals::Builtin;
use crate::target::TargetKind;
use crate::value::Value;

const TARGET_KWARGS: &[&str] = &[
  "sources",
  "dependencies",
  "link_with",
  "install",
  "native",
  "*_args",
  "link_args",
  "build_by_default",
];

const BUILD_TARGET_KWARGS: &[&str] = &[
  "target_type",
  "sources",
  "dependencies",
  "link_with",
  "install",
  "native",
  "*_args",
  "link_args",
  "build_by_default",
];

const TEST_KWARGS: &[&str] = &[
  "args",
  "suite",
  "should_fail",
  "timeout",
  "workdir",
  "protocol",
  "priority",
  "is_parallel",
  "depends",
  "env",
];

pub const BUILTINS: &[Builtin] = &[
  Builtin {
    name: "executable",
    kwargs: TARGET_KWARGS,
    run: |i, a| compiled(i, a, TargetKind::Executable),
  },
  Builtin {
    name: "static_library",
    kwargs: TARGET_KWARGS,
    run: |i, a| compiled(i, a, TargetKind::StaticLibrary),
  },
  Builtin {
    name: "shared_library",
    kwargs: TARGET_KWARGS,
    run: |i, a| compiled(i, a, TargetKind::SharedLibrary),
  },
  Builtin {
    name: "shared_module",
    kwargs: TARGET_KWARGS,
    run: |i, a| compiled(i, a, TargetKind::SharedModule),
  },
  Builtin {
    name: "jar",
    kwargs: TARGET_KWARGS,
    run: |i, a| compiled(i, a, TargetKind::Jar),
  },
  Builtin {
    name: "library",
    kwargs: TARGET_KWARGS,
    run: library,
  },
  Builtin {
    name: "both_libraries",
    kwargs: TARGET_KWARGS,
    run: both_libraries,
  },
  Builtin {
    name: "build_target",
    kwargs: BUILD_TARGET_KWARGS,
    run: build_target,
  },
  Builtin {
    name: "custom_target",
    kwargs: &["input", "output", "command", "depends", "install", "build_by_default"],
    run: custom_target,
  },
  Builtin {
    name: "run_target",
    kwargs: &["command", "depends"],
    run: run_target,
  },
  Builtin {
    name: "alias_target",
    kwargs: &[],
    run: alias_target,
  },
  Builtin {
    name: "test",
    kwargs: TEST_KWARGS,
    run: |i, a| test(i, a, false),
  },
  Builtin {
    name: "benchmark",
    kwargs: TEST_KWARGS,
    run: |i, a| test(i, a, true),
  },
  Builtin {
    name: "files",
    kwargs: &[],
    run: files,
  },
];

fn target_request(args: &mut Args, kind: TargetKind) -> Result<TargetRequest, InterpError> {
  let mut req = TargetRequest::new(&args.required_str("name")?, kind);
  let mut sources = args.rest();
  sources.extend(args.kw_list("sources"));
  req.sources = source_inputs(args, "sources", sources)?;
  req.dependencies = args.kw_deps("dependencies")?;
  req.link_with = args.kw_targets("link_with")?;
  req.language_args = args.take_language_args()?;
  req.link_args = args.kw_strings("link_args")?;
  req.install = args.kw_bool("install", false)?;
  req.build_by_default = args.kw_bool("build_by_default", true)?;
  req.native = args.kw_bool("native", false)?;
  Ok(req)
}

pub(crate) fn source_inputs(args: &Args, what: &str, values: Vec<Value>) -> Result<Vec<SourceInput>, InterpError> {
  values
    .into_iter()
    .map(|v| match v {
      Value::Str(s) => Ok(SourceInput::Path(s)),
      Value::File(f) => Ok(SourceInput::File(f)),
      Value::Target(t) => Ok(SourceInput::Target(t)),
      other => Err(args.type_error(what, "str, file or target", &other)),
    })
    .collect()
}

fn compiled(interp: &mut Interpreter, args: &mut Args, kind: TargetKind) -> Result<Option<Value>, InterpError> {
  let req = target_request(args, kind)?;
  interp.build_target(req).map(|t| Some(Value::Target(t)))
}

fn library(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let req = target_request(args, TargetKind::SharedLibrary)?;
  interp.library(req).map(|t| Some(Value::Target(t)))
}

fn both_libraries(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let req = target_request(args, TargetKind::SharedLibrary)?;
  interp.both_libraries(req).map(|t| Some(Value::Target(t)))
}

fn build_target(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let target_type = args
    .kw_str("target_type")?
    .ok_or_else(|| InterpError::invalid_args("Missing target_type keyword argument."))?;
  match target_type.as_str() {
    "library" => library(interp, args),
    "both_libraries" => both_libraries(interp, args),
    other => {
      let kind = TargetKind::from_target_type(other)
        .ok_or_else(|| InterpError::invalid_args(format!("Unknown target_type \"{}\".", other)))?;
      compiled(interp, args, kind)
    }
  }
}

fn command_parts(args: &Args, values: Vec<Value>) -> Result<Vec<CommandPart>, InterpError> {
  values
    .into_iter()
    .map(|v| match v {
      Value::Str(s) => Ok(CommandPart::Str(s)),
      Value::Int(i) => Ok(CommandPart::Str(i.to_string())),
      Value::File(f) => Ok(CommandPart::File(f)),
      Value::Target(t) => Ok(CommandPart::Target(t)),
      Value::Program(p) => Ok(CommandPart::Program(p)),
      other => Err(args.type_error("command", "str, file, target or program", &other)),
    })
    .collect()
}

fn custom_target(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let name = args.required_str("name")?;
  let inputs = args.kw_list("input");
  let command = args.kw_list("command");
  if command.is_empty() {
    return Err(InterpError::invalid_args("custom_target: missing required keyword argument \"command\"."));
  }
  let req = CustomTargetRequest {
    name,
    inputs: source_inputs(args, "input", inputs)?,
    outputs: args.kw_strings("output")?,
    command: command_parts(args, command)?,
    depends: args.kw_targets("depends")?,
    install: args.kw_bool("install", false)?,
    build_by_default: args.kw_bool("build_by_default", true)?,
  };
  interp.custom_target(req).map(|t| Some(Value::Target(t)))
}

fn run_target(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let name = args.required_str("name")?;
  let command = args.kw_list("command");
  if command.is_empty() {
    return Err(InterpError::invalid_args("run_target: missing required keyword argument \"command\"."));
  }
  let command = command_parts(args, command)?;
  let depends = args.kw_targets("depends")?;
  interp.run_target(&name, command, depends).map(|t| Some(Value::Target(t)))
}

fn alias_target(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let name = args.required_str("name")?;
  let depends = args
    .rest()
    .into_iter()
    .map(|v| match v {
      Value::Target(t) => Ok(t),
      other => Err(args.type_error("targets", "build target", &other)),
    })
    .collect::<Result<Vec<_>, _>>()?;
  interp.alias_target(&name, depends).map(|t| Some(Value::Target(t)))
}

/// Test arguments may mix strings with files and targets.
fn argument_strings(args: &Args, values: Vec<Value>) -> Result<Vec<String>, InterpError> {
  values
    .into_iter()
    .map(|v| match v {
      Value::Str(s) => Ok(s),
      Value::Int(i) => Ok(i.to_string()),
      Value::File(f) => Ok(f.relative_path()),
      Value::Target(t) => Ok(t.id.0.clone()),
      other => Err(args.type_error("args", "str, file or target", &other)),
    })
    .collect()
}

fn test_request(args: &mut Args, name: String, exe: TestExe) -> Result<TestRequest, InterpError> {
  let mut req = TestRequest::new(&name, exe);
  let extra = args.kw_list("args");
  req.args = argument_strings(args, extra)?;
  req.suite = args.kw_strings("suite")?;
  req.should_fail = args.kw_bool("should_fail", false)?;
  req.timeout = args.kw_int("timeout", req.timeout)?;
  req.workdir = args.kw_str("workdir")?;
  if let Some(protocol) = args.kw_str("protocol")? {
    req.protocol = protocol;
  }
  req.priority = args.kw_int("priority", 0)?;
  req.is_parallel = args.kw_bool("is_parallel", true)?;
  req.depends = args.kw_targets("depends")?;
  req.env = args.kw_string_map("env")?;
  Ok(req)
}

fn test(interp: &mut Interpreter, args: &mut Args, benchmark: bool) -> Result<Option<Value>, InterpError> {
  let name = args.required_str("name")?;
  let exe = match args.required("executable")? {
    Value::Target(t) => TestExe::Target(t),
    Value::Program(p) => TestExe::Program(p),
    other => return Err(args.type_error("executable", "build target or external program", &other)),
  };
  let req = test_request(args, name, exe)?;
  interp.add_test(req, benchmark)?;
  Ok(None)
}

fn files(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let names = args.rest_strings("files")?;
  let files = interp.files(&names)?;
  Ok(Some(Value::List(files.into_iter().map(Value::File).collect())))
}
