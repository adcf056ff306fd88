//! Dependency, program and subproject builtins.

use std::collections::BTreeMap;

use crate::error::InterpError;
use crate::interpreter::{DependencyRequest, Fallback, InternalDependencyRequest, Interpreter, ProgramRequest, SubprojectRequest};
use crate::lua::convert::Args;
use crate::lua::globals::Builtin;
use crate::lua::targets::source_inputs;
use crate::value::Value;

/// Lookup keywords forwarded to the probes. They take part in the cache key.
const LOOKUP_KWARGS: &[&str] = &[
  "method",
  "static",
  "modules",
  "optional_modules",
  "components",
  "language",
  "include_type",
  "main",
];

pub const BUILTINS: &[Builtin] = &[
  Builtin {
    name: "dependency",
    kwargs: &[
      "version",
      "required",
      "native",
      "fallback",
      "allow_fallback",
      "default_options",
      "not_found_message",
      "disabler",
      "method",
      "static",
      "modules",
      "optional_modules",
      "components",
      "language",
      "include_type",
      "main",
    ],
    run: dependency,
  },
  Builtin {
    name: "declare_dependency",
    kwargs: &[
      "compile_args",
      "link_args",
      "link_with",
      "sources",
      "include_directories",
      "dependencies",
      "variables",
      "version",
    ],
    run: declare_dependency,
  },
  Builtin {
    name: "find_program",
    kwargs: &["required", "native", "version", "dirs", "disabler"],
    run: find_program,
  },
  Builtin {
    name: "subproject",
    kwargs: &["required", "version", "default_options"],
    run: subproject,
  },
];

fn fallback(args: &mut Args) -> Result<Option<Fallback>, InterpError> {
  let parts = args.kw_strings("fallback")?;
  match parts.as_slice() {
    [] => Ok(None),
    [subproject] => Ok(Some(Fallback {
      subproject: subproject.clone(),
      variable: None,
    })),
    [subproject, variable] => Ok(Some(Fallback {
      subproject: subproject.clone(),
      variable: Some(variable.clone()),
    })),
    _ => Err(InterpError::invalid_args(
      "Fallback must be a subproject name or a [subproject, variable] pair.",
    )),
  }
}

/// Render a lookup keyword as the string used in cache keys.
fn lookup_option(value: Value) -> String {
  match value {
    Value::List(items) => items.iter().map(Value::to_string).collect::<Vec<_>>().join(","),
    other => other.to_string(),
  }
}

fn dependency(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let names = args.rest_strings("names")?;
  let mut req = DependencyRequest::named("");
  req.names = names;
  req.version = args.kw_strings("version")?;
  req.required = args.kw_bool("required", true)?;
  req.native = args.kw_bool("native", false)?;
  req.fallback = fallback(args)?;
  req.allow_fallback = match args.kw("allow_fallback") {
    None => None,
    Some(Value::Bool(b)) => Some(b),
    Some(other) => return Err(args.type_error("allow_fallback", "bool", &other)),
  };
  req.default_options = args.kw_string_map("default_options")?;
  req.not_found_message = args.kw_str("not_found_message")?;
  let disabler = args.kw_bool("disabler", false)?;
  let mut options = BTreeMap::new();
  for key in LOOKUP_KWARGS {
    if let Some(value) = args.kw(key) {
      options.insert(key.to_string(), lookup_option(value));
    }
  }
  req.options = options;

  let dep = interp.dependency(req)?;
  if disabler && !dep.found() {
    return Ok(Some(Value::Disabler));
  }
  Ok(Some(Value::Dependency(dep)))
}

fn declare_dependency(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let sources = args.kw_list("sources");
  let sources = source_inputs(args, "sources", sources)?;
  let req = InternalDependencyRequest {
    compile_args: args.kw_strings("compile_args")?,
    link_args: args.kw_strings("link_args")?,
    link_with: args.kw_targets("link_with")?,
    sources,
    include_directories: args.kw_strings("include_directories")?,
    dependencies: args.kw_deps("dependencies")?,
    variables: args.kw_string_map("variables")?,
    version: args.kw_str("version")?,
  };
  interp.declare_dependency(req).map(|d| Some(Value::Dependency(d)))
}

fn find_program(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let req = ProgramRequest {
    names: args.rest_strings("names")?,
    required: args.kw_bool("required", true)?,
    native: args.kw_bool("native", false)?,
    version: args.kw_strings("version")?,
    dirs: args.kw_strings("dirs")?,
  };
  let disabler = args.kw_bool("disabler", false)?;
  let prog = interp.find_program(req)?;
  if disabler && !prog.found() {
    return Ok(Some(Value::Disabler));
  }
  Ok(Some(Value::Program(prog)))
}

fn subproject(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let mut req = SubprojectRequest::new(&args.required_str("name")?);
  req.required = args.kw_bool("required", true)?;
  req.version = args.kw_strings("version")?;
  req.default_options = args.kw_string_map("default_options")?;
  interp.subproject(req).map(|s| Some(Value::Subproject(s)))
}
