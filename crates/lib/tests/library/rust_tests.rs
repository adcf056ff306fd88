use kiln_lib::error::InterpError;
use kiln_lib::eval::EvalError;
use kiln_lib::target::TargetKind;

use super::common::Fixture;

#[test]
fn rust_test_builds_a_test_harness() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      r#"
        project('demo', 'rust')
        local lib = static_library('parser', 'lib.rs')
        local t = rust.test('parser_test', lib, {args = {'--nocapture'}, suite = 'unit'})
        assert(t:kind() == 'executable')
      "#,
    )
    .file("lib.rs", "");
  let graph = fixture.evaluate().unwrap();

  let exe = graph.targets_named("parser_test").next().unwrap();
  assert_eq!(exe.kind, TargetKind::Executable);
  assert!(!exe.install);
  assert!(exe.language_args["rust"].contains(&"--test".to_string()));

  let test = &graph.tests[0];
  assert_eq!(test.name, "parser_test");
  assert_eq!(test.protocol, "rust");
  assert_eq!(test.exe, exe.id);
  assert_eq!(test.args, vec!["--nocapture", "--test", "--format", "pretty"]);
  assert_eq!(test.suite, vec!["demo:unit"]);
}

#[test]
fn rust_test_rejects_other_languages() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      "project('demo')\nrust.test('t', executable('app', 'main.c'))",
    )
    .file("main.c", "");
  let err = fixture.evaluate().unwrap_err();
  assert!(matches!(err, EvalError::Interp(InterpError::InvalidArguments(_))));
}
