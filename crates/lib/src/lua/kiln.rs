//! The `kiln` table: information about the running evaluation and the
//! override hooks.

use std::collections::BTreeMap;
use std::path::Path;

use mlua::prelude::*;

use crate::consts::KILN_VERSION;
use crate::error::InterpError;
use crate::interpreter::{Interpreter, ProgramOverride};
use crate::lua::convert::Args;
use crate::lua::globals::{Builtin, register_builtins};
use crate::lua::runtime::SharedInterp;
use crate::value::Value;

const KILN: &[Builtin] = &[
  Builtin {
    name: "project_name",
    kwargs: &[],
    run: project_name,
  },
  Builtin {
    name: "project_version",
    kwargs: &[],
    run: project_version,
  },
  Builtin {
    name: "is_subproject",
    kwargs: &[],
    run: |i, _| Ok(Some(Value::Bool(i.ctx.is_subproject()))),
  },
  Builtin {
    name: "current_source_dir",
    kwargs: &[],
    run: |i, _| Ok(Some(dir_value(&i.source_root(), &i.ctx.subdir))),
  },
  Builtin {
    name: "current_build_dir",
    kwargs: &[],
    run: |i, _| Ok(Some(dir_value(&i.build_root(), &i.ctx.subdir))),
  },
  Builtin {
    name: "source_root",
    kwargs: &[],
    run: |i, _| Ok(Some(dir_value(&i.source_root(), ""))),
  },
  Builtin {
    name: "build_root",
    kwargs: &[],
    run: |i, _| Ok(Some(dir_value(&i.build_root(), ""))),
  },
  Builtin {
    name: "override_dependency",
    kwargs: &["native", "static"],
    run: override_dependency,
  },
  Builtin {
    name: "override_find_program",
    kwargs: &[],
    run: override_find_program,
  },
];

pub fn create_kiln_table(lua: &Lua, shared: &SharedInterp) -> LuaResult<LuaTable> {
  let kiln = lua.create_table()?;
  kiln.set("version", KILN_VERSION)?;
  register_builtins(lua, &kiln, shared, KILN)?;
  Ok(kiln)
}

fn dir_value(root: &Path, subdir: &str) -> Value {
  let dir = if subdir.is_empty() { root.to_path_buf() } else { root.join(subdir) };
  Value::Str(dir.to_string_lossy().into_owned())
}

fn project_name(interp: &mut Interpreter, _: &mut Args) -> Result<Option<Value>, InterpError> {
  interp.require_project("kiln.project_name")?;
  Ok(interp.ctx.project_name().map(Value::from))
}

fn project_version(interp: &mut Interpreter, _: &mut Args) -> Result<Option<Value>, InterpError> {
  interp.require_project("kiln.project_version")?;
  Ok(Some(Value::from(interp.ctx.project_version())))
}

/// `kiln.override_dependency(name, dep, {native =, static =})`.
fn override_dependency(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let name = args.required_str("name")?;
  let dep = match args.required("dependency")? {
    Value::Dependency(d) => d,
    other => return Err(args.type_error("dependency", "dependency", &other)),
  };
  let native = args.kw_bool("native", false)?;
  let mut options = BTreeMap::new();
  if let Some(value) = args.kw("static") {
    options.insert("static".to_string(), value.to_string());
  }
  interp.override_dependency(&name, dep, native, &options)?;
  Ok(None)
}

/// `kiln.override_find_program(name, program_or_executable)`.
fn override_find_program(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let name = args.required_str("name")?;
  let program = match args.required("program")? {
    Value::Program(p) => ProgramOverride::Program(p),
    Value::Target(t) => ProgramOverride::Target(t),
    other => return Err(args.type_error("program", "external program or executable", &other)),
  };
  interp.override_find_program(&name, program)?;
  Ok(None)
}
