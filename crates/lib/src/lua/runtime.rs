use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;
use tracing::debug;

use crate::error::InterpError;
use crate::frontend::FileOutcome;
use crate::interpreter::Interpreter;
use crate::lua::convert::{LuaStop, lua_to_value};
use crate::lua::globals;

/// Registry key of the project environment table.
pub const ENV_REGISTRY_KEY: &str = "kiln.env";

/// The interpreter of the project a VM evaluates, shared by every builtin.
///
/// The slot is emptied once the project finished so the interpreter can be
/// handed back to the caller.
#[derive(Clone)]
pub struct SharedInterp(Rc<RefCell<Option<Interpreter>>>);

impl SharedInterp {
  pub fn new(interp: Interpreter) -> Self {
    Self(Rc::new(RefCell::new(Some(interp))))
  }

  /// Run `f` against the interpreter.
  ///
  /// Builtins that execute Lua code must not call this around that code.
  pub fn with<R>(&self, f: impl FnOnce(&mut Interpreter) -> Result<R, InterpError>) -> LuaResult<R> {
    let mut slot = self
      .0
      .try_borrow_mut()
      .map_err(|_| LuaError::external("interpreter is already in use"))?;
    let interp = slot
      .as_mut()
      .ok_or_else(|| LuaError::external("project evaluation has already finished"))?;
    f(interp).map_err(LuaError::external)
  }

  pub fn take(&self) -> Option<Interpreter> {
    self.0.borrow_mut().take()
  }
}

/// Create the VM for one project.
///
/// Builtins live in the globals table. Build files run in a separate
/// environment table falling back to the globals, so the variables a project
/// defines can be told apart from the builtins.
pub fn create_runtime(shared: SharedInterp) -> LuaResult<(Lua, LuaTable)> {
  let lua = Lua::new();
  globals::register_globals(&lua, shared)?;

  let env = lua.create_table()?;
  let meta = lua.create_table()?;
  meta.set("__index", lua.globals())?;
  env.set_metatable(Some(meta))?;
  lua.set_named_registry_value(ENV_REGISTRY_KEY, &env)?;
  Ok((lua, env))
}

/// Execute one build file in the project environment.
pub fn exec_file(lua: &Lua, path: &Path) -> LuaResult<FileOutcome> {
  let content = std::fs::read_to_string(path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", path.display(), e)))?;
  let env: LuaTable = lua.named_registry_value(ENV_REGISTRY_KEY)?;

  let result = lua
    .load(&content)
    .set_name(format!("@{}", path.display()))
    .set_environment(env)
    .eval::<LuaValue>()?;
  Ok(match result {
    LuaValue::UserData(ud) if ud.is::<LuaStop>() => FileOutcome::Stopped,
    _ => FileOutcome::Completed,
  })
}

/// Recover the interpreter error carried by a Lua error, or describe the
/// failure as a script error in `path`.
pub fn into_interp_error(err: LuaError, path: &str) -> InterpError {
  match find_interp_error(&err) {
    Some(e) => e.clone(),
    None => InterpError::Script {
      path: path.to_string(),
      message: err.to_string(),
    },
  }
}

fn find_interp_error(err: &LuaError) -> Option<&InterpError> {
  match err {
    LuaError::ExternalError(e) => e.downcast_ref::<InterpError>(),
    LuaError::CallbackError { cause, .. } => find_interp_error(cause),
    LuaError::WithContext { cause, .. } => find_interp_error(cause),
    _ => None,
  }
}

/// Copy the project's variables into its evaluation context. Values with no
/// interpreter counterpart (functions, coroutines) and keys that are not
/// identifiers are skipped.
pub fn snapshot_variables(env: &LuaTable, interp: &mut Interpreter) -> LuaResult<()> {
  for pair in env.pairs::<LuaValue, LuaValue>() {
    let (key, value) = pair?;
    let LuaValue::String(key) = key else { continue };
    let Ok(Some(value)) = lua_to_value(value) else { continue };
    let name = key.to_string_lossy();
    if let Err(err) = interp.set_variable(&name, value) {
      debug!(variable = %name, error = %err, "variable not captured");
    }
  }
  Ok(())
}
