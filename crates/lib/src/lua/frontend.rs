use mlua::prelude::*;
use tracing::debug;

use crate::consts::BUILD_FILENAME;
use crate::error::InterpError;
use crate::frontend::Frontend;
use crate::interpreter::{Interpreter, join_subdir};
use crate::lua::runtime::{SharedInterp, create_runtime, exec_file, into_interp_error, snapshot_variables};

/// Runs `kiln.lua` build files in an embedded Lua VM, one VM per project.
#[derive(Debug, Clone, Copy, Default)]
pub struct LuaFrontend;

impl Frontend for LuaFrontend {
  fn run_project(&self, mut interp: Interpreter) -> Result<Interpreter, InterpError> {
    let build_file = interp.enter_project_root()?;
    let rel = join_subdir(&interp.ctx.root_subdir, BUILD_FILENAME);
    debug!(file = %rel, subproject = %interp.ctx.subproject, "evaluating project");

    let shared = SharedInterp::new(interp);
    let result = run_vm(&shared, &build_file).map_err(|e| into_interp_error(e, &rel));
    let interp = shared
      .take()
      .ok_or_else(|| InterpError::Io(format!("evaluation of {} lost its interpreter", rel)))?;
    result?;
    Ok(interp)
  }
}

fn run_vm(shared: &SharedInterp, build_file: &std::path::Path) -> LuaResult<()> {
  let (lua, env) = create_runtime(shared.clone())?;
  // Stopping early with subdir_done() is a normal end of the project.
  exec_file(&lua, build_file)?;
  shared.with(|interp| snapshot_variables(&env, interp).map_err(|e| InterpError::Io(e.to_string())))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use std::rc::Rc;

  use tempfile::TempDir;

  use crate::dependency::NullProbe;
  use crate::util::testutil::test_session;
  use crate::value::Value;

  fn run(dir: &TempDir, script: &str) -> Result<Interpreter, InterpError> {
    fs::write(dir.path().join(BUILD_FILENAME), script).unwrap();
    let interp = Interpreter::new(test_session(dir.path(), Box::new(NullProbe)), Rc::new(LuaFrontend));
    interp.run()
  }

  mod project {
    use super::*;

    #[test]
    fn variables_are_captured() {
      let dir = TempDir::new().unwrap();
      let interp = run(&dir, "project('demo', {version = '1.2'})\nanswer = 42\nname = kiln.project_name()").unwrap();
      assert_eq!(interp.ctx.variables["answer"], Value::Int(42));
      assert_eq!(interp.ctx.variables["name"], Value::from("demo"));
      assert_eq!(interp.ctx.project_version(), "1.2");
    }

    #[test]
    fn functions_are_not_captured() {
      let dir = TempDir::new().unwrap();
      let interp = run(&dir, "project 'demo'\nfunction helper() end").unwrap();
      assert!(!interp.ctx.variables.contains_key("helper"));
    }

    #[test]
    fn builtin_before_project_fails() {
      let dir = TempDir::new().unwrap();
      let err = run(&dir, "message('hi')\nproject 'demo'").unwrap_err();
      assert!(err.to_string().contains("First statement must be a call to project()"));
    }

    #[test]
    fn missing_project_call_fails() {
      let dir = TempDir::new().unwrap();
      let err = run(&dir, "x = 1").unwrap_err();
      assert!(matches!(err, InterpError::InvalidCode(_)));
    }

    #[test]
    fn error_builtin_keeps_its_type() {
      let dir = TempDir::new().unwrap();
      let err = run(&dir, "project 'demo'\nerror('nope')").unwrap_err();
      assert_eq!(err, InterpError::Problem("nope".into()));
    }

    #[test]
    fn runtime_errors_name_the_file() {
      let dir = TempDir::new().unwrap();
      let err = run(&dir, "project 'demo'\nlocal x = nil\nx.y = 1").unwrap_err();
      match err {
        InterpError::Script { path, .. } => assert_eq!(path, BUILD_FILENAME),
        other => panic!("unexpected {:?}", other),
      }
    }
  }

  mod subdirs {
    use super::*;

    #[test]
    fn variables_flow_between_files() {
      let dir = TempDir::new().unwrap();
      fs::create_dir(dir.path().join("sub")).unwrap();
      fs::write(dir.path().join("sub").join(BUILD_FILENAME), "from_sub = base .. '!'").unwrap();
      let interp = run(&dir, "project 'demo'\nbase = 'hi'\nsubdir 'sub'").unwrap();
      assert_eq!(interp.ctx.variables["from_sub"], Value::from("hi!"));
      assert_eq!(interp.ctx.subdir, "");
    }

    #[test]
    fn subdir_done_stops_only_that_file() {
      let dir = TempDir::new().unwrap();
      fs::create_dir(dir.path().join("sub")).unwrap();
      fs::write(
        dir.path().join("sub").join(BUILD_FILENAME),
        "early = true\nif early then return subdir_done() end\nlate = true",
      )
      .unwrap();
      let interp = run(&dir, "project 'demo'\nsubdir 'sub'\nafter = true").unwrap();
      assert_eq!(interp.ctx.variables["early"], Value::Bool(true));
      assert!(!interp.ctx.variables.contains_key("late"));
      assert_eq!(interp.ctx.variables["after"], Value::Bool(true));
    }

    #[test]
    fn errors_in_nested_files_name_that_file() {
      let dir = TempDir::new().unwrap();
      fs::create_dir(dir.path().join("sub")).unwrap();
      fs::write(dir.path().join("sub").join(BUILD_FILENAME), "this is not lua").unwrap();
      let err = run(&dir, "project 'demo'\nsubdir 'sub'").unwrap_err();
      match err {
        InterpError::Script { path, .. } => assert_eq!(path, "sub/kiln.lua"),
        other => panic!("unexpected {:?}", other),
      }
    }
  }

  mod disablers {
    use super::*;

    #[test]
    fn disabled_calls_are_skipped() {
      let dir = TempDir::new().unwrap();
      let interp = run(
        &dir,
        r#"
project 'demo'
d = disabler()
exe = executable('app', 'missing.c', { dependencies = { d } })
skipped = is_disabler(exe)
found = d:found()
"#,
      )
      .unwrap();
      assert_eq!(interp.ctx.variables["skipped"], Value::Bool(true));
      assert_eq!(interp.ctx.variables["found"], Value::Bool(false));
      assert!(interp.fragment.registry.is_empty());
    }

    #[test]
    fn set_variable_accepts_disablers() {
      let dir = TempDir::new().unwrap();
      let interp = run(&dir, "project 'demo'\nset_variable('v', disabler())\nok = is_disabler(get_variable('v'))").unwrap();
      assert_eq!(interp.ctx.variables["ok"], Value::Bool(true));
    }
  }
}
