use kiln_lib::eval::EvalError;
use kiln_lib::error::InterpError;
use kiln_lib::target::TargetKind;

use super::common::Fixture;

#[test]
fn targets_and_tests_reach_the_graph() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      r#"
        project('demo', 'c', {version = '0.4.1', license = 'MIT'})
        add_project_arguments('-DDEMO', {language = 'c'})
        lib = static_library('util', 'util.c')
        app = executable('app', 'main.c', {link_with = lib, c_args = {'-O1'}})
        test('smoke', app, {args = {'--quick'}, suite = 'fast'})
      "#,
    )
    .file("util.c", "")
    .file("main.c", "");
  let graph = fixture.evaluate().unwrap();

  assert_eq!(graph.project_name, "demo");
  assert_eq!(graph.project_version, "0.4.1");
  let app = graph.targets_named("app").next().unwrap();
  let util = graph.targets_named("util").next().unwrap();
  assert_eq!(app.kind, TargetKind::Executable);
  assert_eq!(util.kind, TargetKind::StaticLibrary);
  assert_eq!(app.link_with, vec![util.id.clone()]);
  assert_eq!(app.language_args["c"], vec!["-O1"]);
  assert_eq!(app.project_version, "0.4.1");

  assert_eq!(graph.tests.len(), 1);
  assert_eq!(graph.tests[0].exe, app.id);
  assert_eq!(graph.tests[0].args, vec!["--quick"]);
  assert_eq!(graph.tests[0].suite, vec!["demo:fast"]);
  assert!(graph.build_def_files.contains(&"kiln.lua".to_string()));
}

#[test]
fn subdirs_share_variables_and_stop_early() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      r#"
        project('demo')
        subdir('lib')
        subdir('tools')
        executable('app', 'main.c', {link_with = util})
      "#,
    )
    .file("main.c", "")
    .file("lib/kiln.lua", "util = static_library('util', 'util.c')")
    .file("lib/util.c", "")
    .file(
      "tools/kiln.lua",
      r#"
        executable('gen', 'gen.c')
        if true then return subdir_done() end
        executable('never', 'missing.c')
      "#,
    )
    .file("tools/gen.c", "");
  let graph = fixture.evaluate().unwrap();

  assert_eq!(graph.targets_named("util").next().unwrap().subdir, "lib");
  assert_eq!(graph.targets_named("gen").next().unwrap().subdir, "tools");
  assert!(graph.targets_named("never").next().is_none());
  assert!(graph.targets_named("app").next().is_some());
  assert!(graph.build_def_files.contains(&"tools/kiln.lua".to_string()));
}

#[test]
fn disablers_skip_dependent_calls() {
  let fixture = Fixture::new().file(
    "kiln.lua",
    r#"
      project('demo')
      local d = disabler()
      local exe = executable('app', 'main.c', {dependencies = d})
      assert(is_disabler(exe))
      assert(not exe.found())
      test('never', exe)
      subdir(d)
    "#,
  );
  let graph = fixture.evaluate().unwrap();
  assert!(graph.targets.is_empty());
  assert!(graph.tests.is_empty());
}

#[test]
fn target_guids_survive_reevaluation() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      "project('demo')\nexecutable('app', 'main.c')",
    )
    .file("main.c", "");
  let first = fixture.evaluate().unwrap();
  let second = fixture.evaluate().unwrap();
  let guid = |g: &kiln_lib::graph::BuildGraph| g.targets_named("app").next().unwrap().guid.clone();
  assert_eq!(guid(&first), guid(&second));

  let fresh = fixture.evaluate_into(&fixture.source().join("other-build")).unwrap();
  assert_ne!(guid(&first), guid(&fresh));
}

#[test]
fn options_and_summaries() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      r#"
        project('demo', {default_options = {'buildtype=release'}})
        summary('buildtype', get_option('buildtype'))
        summary({shared = get_option('default_library') == 'shared'}, {section = 'Libraries', bool_yn = true})
        warning('careful')
      "#,
    )
    .defines(&["default_library=static"]);
  let graph = fixture.evaluate().unwrap();

  let summary = &graph.summaries[0];
  assert_eq!(summary.project, "demo");
  assert_eq!(summary.sections[""]["buildtype"].render(), "release");
  assert_eq!(summary.sections["Libraries"]["shared"].render(), "NO");
  assert_eq!(graph.warnings, 1);
  assert_eq!(graph.diagnostics[0].message, "careful");
}

#[test]
fn error_builtin_aborts_without_writing_state() {
  let fixture = Fixture::new().file("kiln.lua", "project('demo')\nerror('unsupported', 'platform')");
  let err = fixture.evaluate().unwrap_err();
  assert!(matches!(
    err,
    EvalError::Interp(InterpError::Problem(ref msg)) if msg == "unsupported platform"
  ));
  assert!(!kiln_lib::graph::BuildGraph::path_in(&fixture.build()).exists());
}

#[test]
fn lua_errors_name_the_failing_file() {
  let fixture = Fixture::new()
    .file("kiln.lua", "project('demo')\nsubdir('sub')")
    .file("sub/kiln.lua", "local x = nil\nx.field = 1");
  match fixture.evaluate().unwrap_err() {
    EvalError::Interp(InterpError::Script { path, .. }) => assert_eq!(path, "sub/kiln.lua"),
    other => panic!("unexpected error: {other}"),
  }
}
