//! Builtin functions of the build description language.
//!
//! Most builtins are plain functions over an [`Args`] bundle registered
//! through [`register_builtins`], which takes care of the disabler rule and
//! keyword validation. Builtins that need the VM itself (`subdir`, the
//! variable accessors) are registered by hand.

use mlua::prelude::*;

use super::convert::{Args, LuaDisabler, LuaStop, lua_to_value, value_to_lua};
use super::runtime::{ENV_REGISTRY_KEY, SharedInterp, exec_file, into_interp_error};
use super::{deps, kiln, rust, targets};
use crate::consts::BUILD_FILENAME;
use crate::error::InterpError;
use crate::frontend::FileOutcome;
use crate::interpreter::{ArgKind, Interpreter, ProjectRequest, ProjectVersion, SummaryRequest, join_subdir};
use crate::value::Value;

pub type BuiltinFn = fn(&mut Interpreter, &mut Args) -> Result<Option<Value>, InterpError>;

/// A builtin and the keyword arguments it accepts.
pub struct Builtin {
  pub name: &'static str,
  pub kwargs: &'static [&'static str],
  pub run: BuiltinFn,
}

const GENERAL: &[Builtin] = &[
  Builtin {
    name: "project",
    kwargs: &["version", "license", "default_options", "subproject_dir", "kiln_version"],
    run: project,
  },
  Builtin {
    name: "get_option",
    kwargs: &[],
    run: get_option,
  },
  Builtin {
    name: "add_global_arguments",
    kwargs: &["language", "native"],
    run: |i, a| add_arguments(i, a, ArgKind::Compile, true),
  },
  Builtin {
    name: "add_global_link_arguments",
    kwargs: &["language", "native"],
    run: |i, a| add_arguments(i, a, ArgKind::Link, true),
  },
  Builtin {
    name: "add_project_arguments",
    kwargs: &["language", "native"],
    run: |i, a| add_arguments(i, a, ArgKind::Compile, false),
  },
  Builtin {
    name: "add_project_link_arguments",
    kwargs: &["language", "native"],
    run: |i, a| add_arguments(i, a, ArgKind::Link, false),
  },
  Builtin {
    name: "message",
    kwargs: &[],
    run: message,
  },
  Builtin {
    name: "warning",
    kwargs: &[],
    run: warning,
  },
  Builtin {
    name: "error",
    kwargs: &[],
    run: error,
  },
  Builtin {
    name: "summary",
    kwargs: &["section", "bool_yn", "list_sep"],
    run: summary,
  },
  Builtin {
    name: "join_paths",
    kwargs: &[],
    run: join_paths,
  },
  Builtin {
    name: "disabler",
    kwargs: &[],
    run: |_, _| Ok(Some(Value::Disabler)),
  },
];

/// Register every builtin and the `kiln` and `rust` tables as globals.
pub fn register_globals(lua: &Lua, shared: SharedInterp) -> LuaResult<()> {
  let globals = lua.globals();
  register_builtins(lua, &globals, &shared, GENERAL)?;
  register_builtins(lua, &globals, &shared, targets::BUILTINS)?;
  register_builtins(lua, &globals, &shared, deps::BUILTINS)?;
  register_subdir(lua, &globals, shared.clone())?;
  register_variables(lua, &globals, shared.clone())?;

  globals.set("kiln", kiln::create_kiln_table(lua, &shared)?)?;
  globals.set("rust", rust::create_rust_table(lua, &shared)?)?;
  Ok(())
}

pub fn register_builtins(lua: &Lua, table: &LuaTable, shared: &SharedInterp, builtins: &[Builtin]) -> LuaResult<()> {
  for builtin in builtins {
    let shared = shared.clone();
    let (name, kwargs, run) = (builtin.name, builtin.kwargs, builtin.run);
    let f = lua.create_function(move |lua, values: LuaMultiValue| {
      let mut args = Args::parse(name, values).map_err(LuaError::external)?;
      // A disabler anywhere in the arguments disables the whole call.
      if args.is_disabled() {
        return lua.create_userdata(LuaDisabler).map(LuaValue::UserData);
      }
      args.check_kwargs(kwargs).map_err(LuaError::external)?;
      let result = shared.with(|interp| {
        if name != "project" {
          interp.require_project(name)?;
        }
        run(interp, &mut args)
      })?;
      match result {
        Some(value) => value_to_lua(lua, value),
        None => Ok(LuaValue::Nil),
      }
    })?;
    table.set(name, f)?;
  }
  Ok(())
}

fn project(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let mut req = ProjectRequest::named(&args.required_str("name")?);
  req.languages = args.rest_strings("languages")?;
  req.version = match args.kw("version").map(Value::flatten).as_deref() {
    None | Some([]) => None,
    Some([Value::Str(s)]) => Some(ProjectVersion::Str(s.clone())),
    Some([Value::File(f)]) => Some(ProjectVersion::File(f.fname.clone())),
    Some(_) => {
      return Err(InterpError::invalid_args(
        "project() version must be a string, a single-element list or a files() object.",
      ));
    }
  };
  req.license = args.kw_strings("license")?;
  req.default_options = args.kw_string_map("default_options")?;
  req.subproject_dir = args.kw_str("subproject_dir")?;
  req.kiln_version = args.kw_strings("kiln_version")?;
  interp.project(req)?;
  Ok(None)
}

fn get_option(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let key = args.required_str("name")?;
  interp.get_option(&key).map(Some)
}

fn add_arguments(
  interp: &mut Interpreter,
  args: &mut Args,
  kind: ArgKind,
  global: bool,
) -> Result<Option<Value>, InterpError> {
  let values = args.rest_strings("args")?;
  let languages = args.kw_strings("language")?;
  let native = args.kw_bool("native", false)?;
  if global {
    interp.add_global_arguments(kind, &languages, &values, native)?;
  } else {
    interp.add_project_arguments(kind, &languages, &values, native)?;
  }
  Ok(None)
}

fn render_message(args: &mut Args) -> String {
  args.rest().iter().map(Value::to_string).collect::<Vec<_>>().join(" ")
}

fn message(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  interp.message(&render_message(args));
  Ok(None)
}

fn warning(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  interp.warning(&render_message(args));
  Ok(None)
}

fn error(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  Err(interp.problem(&render_message(args)))
}

/// `summary(key, value)` or `summary(map)`.
fn summary(interp: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let entries = match (args.next(), args.next()) {
    (Some(Value::Map(map)), None) => map.into_iter().collect(),
    (Some(Value::Str(key)), Some(value)) => vec![(key, value)],
    _ => {
      return Err(InterpError::invalid_args(
        "summary() takes a key and a value, or a single table of entries.",
      ));
    }
  };
  let req = SummaryRequest {
    section: args.kw_str("section")?.unwrap_or_default(),
    entries,
    bool_yn: args.kw_bool("bool_yn", false)?,
    list_sep: args.kw_str("list_sep")?,
  };
  interp.summary(req)?;
  Ok(None)
}

/// `join_paths(...)`: join with `/`; an absolute segment restarts the path.
fn join_paths(_: &mut Interpreter, args: &mut Args) -> Result<Option<Value>, InterpError> {
  let mut joined = String::new();
  for part in args.rest_strings("parts")? {
    if part.starts_with('/') || joined.is_empty() {
      joined = part;
    } else if !part.is_empty() {
      if !joined.ends_with('/') {
        joined.push('/');
      }
      joined.push_str(&part);
    }
  }
  Ok(Some(Value::Str(joined)))
}

/// `subdir(name, {if_found = ...})` and `subdir_done()`.
fn register_subdir(lua: &Lua, globals: &LuaTable, shared: SharedInterp) -> LuaResult<()> {
  let subdir = lua.create_function(move |lua, values: LuaMultiValue| {
    let mut args = Args::parse("subdir", values).map_err(LuaError::external)?;
    if args.is_disabled() {
      return Ok(());
    }
    args.check_kwargs(&["if_found"]).map_err(LuaError::external)?;
    let name = args.required_str("dir_name").map_err(LuaError::external)?;
    let if_found = args.kw_list("if_found");

    let entered = shared.with(|interp| {
      interp.require_project("subdir")?;
      let frame = interp.enter_subdir(&name, &if_found)?;
      Ok(frame.map(|f| (f, join_subdir(&interp.ctx.subdir, BUILD_FILENAME))))
    })?;
    let Some((frame, rel)) = entered else {
      return Ok(());
    };
    let abs = frame.build_file.clone();

    // The file's builtins borrow the interpreter, so none may be held here.
    let outcome = exec_file(lua, &abs).map_err(|e| LuaError::external(into_interp_error(e, &rel)));
    shared.with(|interp| {
      interp.leave_subdir(frame);
      Ok(())
    })?;
    // A file that stopped early still counts as fully processed.
    outcome.map(|_: FileOutcome| ())
  })?;
  globals.set("subdir", subdir)?;

  let subdir_done = lua.create_function(|lua, _: LuaMultiValue| lua.create_userdata(LuaStop))?;
  globals.set("subdir_done", subdir_done)?;
  Ok(())
}

/// `set_variable`, `get_variable`, `is_variable` and `is_disabler`.
///
/// These see disablers as ordinary values.
fn register_variables(lua: &Lua, globals: &LuaTable, shared: SharedInterp) -> LuaResult<()> {
  let set_shared = shared.clone();
  let set_variable = lua.create_function(move |lua, (name, value): (String, LuaValue)| {
    let converted = lua_to_value(value.clone()).map_err(LuaError::external)?;
    set_shared.with(|interp| match converted {
      Some(v) => interp.set_variable(&name, v),
      None => {
        interp.ctx.variables.remove(&name);
        Ok(())
      }
    })?;
    let env: LuaTable = lua.named_registry_value(ENV_REGISTRY_KEY)?;
    env.raw_set(name, value)
  })?;
  globals.set("set_variable", set_variable)?;

  let get_shared = shared.clone();
  let get_variable = lua.create_function(move |lua, (name, fallback): (String, LuaValue)| {
    let env: LuaTable = lua.named_registry_value(ENV_REGISTRY_KEY)?;
    let value: LuaValue = env.raw_get(name.as_str())?;
    if !value.is_nil() {
      return Ok(value);
    }
    if !fallback.is_nil() {
      return Ok(fallback);
    }
    let value = get_shared.with(|interp| interp.get_variable(&name, None))?;
    value_to_lua(lua, value)
  })?;
  globals.set("get_variable", get_variable)?;

  let is_variable = lua.create_function(move |lua, name: String| {
    let env: LuaTable = lua.named_registry_value(ENV_REGISTRY_KEY)?;
    let value: LuaValue = env.raw_get(name.as_str())?;
    if !value.is_nil() {
      return Ok(true);
    }
    shared.with(|interp| Ok(interp.ctx.get_variable(&name).is_some()))
  })?;
  globals.set("is_variable", is_variable)?;

  let is_disabler = lua.create_function(|_, value: LuaValue| {
    Ok(matches!(value, LuaValue::UserData(ud) if ud.is::<LuaDisabler>()))
  })?;
  globals.set("is_disabler", is_disabler)?;
  Ok(())
}
