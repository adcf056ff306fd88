//! The `rust` table.

use mlua::prelude::*;

use crate::error::InterpError;
use crate::interpreter::{Interpreter, RustTestRequest};
use crate::lua::convert::Args;
use crate::lua::globals::{Builtin, register_builtins};
use crate::lua::runtime::SharedInterp;
use crate::value::Value;

const RUST: &[Builtin] = &[Builtin {
  name: "test",
  kwargs: &[
    "args",
    "dependencies",
    "suite",
    "should_fail",
    "timeout",
    "workdir",
    "priority",
    "is_parallel",
    "depends",
    "env",
  ],
  run: test,
}];

pub fn create_rust_table(lua: &Lua, shared: &SharedInterp) -> LuaResult<LuaTable> {
  let rust = lua.create_table()?;
  register_builtins(lua, &rust, shared, RUST)?;
  Ok(rust)
}

/// `rust.test(name, target, {...})`.
fn test(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let name = args.required_str("name")?;
  let base = match args.required("target")? {
    Value::Target(t) => t,
    other => return Err(args.type_error("target", "build target", &other)),
  };
  let mut req = RustTestRequest::new(&name, base);
  req.args = args.kw_strings("args")?;
  req.dependencies = args.kw_deps("dependencies")?;
  req.suite = args.kw_strings("suite")?;
  req.should_fail = args.kw_bool("should_fail", false)?;
  req.timeout = match args.kw("timeout") {
    None => None,
    Some(Value::Int(i)) => Some(i),
    Some(other) => return Err(args.type_error("timeout", "int", &other)),
  };
  req.workdir = args.kw_str("workdir")?;
  req.priority = args.kw_int("priority", 0)?;
  req.is_parallel = args.kw_bool("is_parallel", true)?;
  req.depends = args.kw_targets("depends")?;
  req.env = args.kw_string_map("env")?;
  let exe = interp.rust_test(req)?;
  Ok(Some(Value::Target(exe)))
}
