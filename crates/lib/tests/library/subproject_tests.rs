use kiln_lib::error::InterpError;
use kiln_lib::eval::EvalError;
use kiln_lib::sandbox::SandboxViolation;

use super::common::Fixture;

fn interp_error(err: EvalError) -> InterpError {
  match err {
    EvalError::Interp(e) => e,
    other => panic!("unexpected error: {other}"),
  }
}

#[test]
fn diamond_shares_one_evaluation() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      r#"
        project('demo')
        local left = subproject('left')
        local right = subproject('right')
        assert(left:get_variable('base_version') == right:get_variable('base_version'))
      "#,
    )
    .file(
      "subprojects/left/kiln.lua",
      "project('left')\nbase_version = subproject('base'):version()",
    )
    .file(
      "subprojects/right/kiln.lua",
      "project('right')\nbase_version = subproject('base'):version()",
    )
    .file(
      "subprojects/base/kiln.lua",
      "project('base', {version = '3.0'})\nstatic_library('base', 'base.c')",
    )
    .file("subprojects/base/base.c", "");
  let graph = fixture.evaluate().unwrap();

  assert_eq!(graph.targets_named("base").count(), 1);
  let names: Vec<&str> = graph.subprojects.iter().map(|s| s.name.as_str()).collect();
  assert_eq!(names, vec!["base", "left", "right"]);
  assert_eq!(graph.dep_manifest["base"].version, "3.0");
}

#[test]
fn cycles_are_fatal_even_when_optional() {
  let fixture = Fixture::new()
    .file("kiln.lua", "project('demo')\nsubproject('a', {required = false})")
    .file("subprojects/a/kiln.lua", "project('a')\nsubproject('b')")
    .file("subprojects/b/kiln.lua", "project('b')\nsubproject('a', {required = false})");
  let err = interp_error(fixture.evaluate().unwrap_err());
  assert_eq!(err.to_string(), "Recursive include of subprojects: a => b => a.");
}

#[test]
fn optional_failures_disable_the_subproject() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      r#"
        project('demo')
        local broken = subproject('broken', {required = false})
        assert(not broken:found())
        local ghost = subproject('ghost', {required = false})
        assert(not ghost:found())
      "#,
    )
    .file("subprojects/broken/kiln.lua", "project('broken')\nerror('no compiler')");
  let graph = fixture.evaluate().unwrap();

  let broken = graph.subproject("broken").unwrap();
  assert!(!broken.found);
  assert_eq!(broken.exception.as_deref(), Some("Problem encountered: no compiler"));
  let ghost = graph.subproject("ghost").unwrap();
  assert!(ghost.disabled_reason.is_some());

  let rendered = graph.summaries[0].sections["Subprojects"]["broken"].render();
  assert!(rendered.starts_with("NO"));
}

#[test]
fn required_failures_propagate() {
  let fixture = Fixture::new()
    .file("kiln.lua", "project('demo')\nsubproject('broken')")
    .file("subprojects/broken/kiln.lua", "project('broken')\nerror('no compiler')");
  let err = interp_error(fixture.evaluate().unwrap_err());
  assert_eq!(err, InterpError::Problem("no compiler".to_string()));
}

#[test]
fn version_mismatch_is_fatal() {
  let fixture = Fixture::new()
    .file("kiln.lua", "project('demo')\nsubproject('foo', {version = '>=2', required = false})")
    .file("subprojects/foo/kiln.lua", "project('foo', {version = '1.4'})");
  let err = interp_error(fixture.evaluate().unwrap_err());
  assert!(matches!(err, InterpError::SubprojectVersion { ref found, .. } if found == "1.4"));
}

#[test]
fn subprojects_cannot_reach_outside() {
  let fixture = Fixture::new()
    .file("kiln.lua", "project('demo')\nsubproject('foo')")
    .file("common.c", "")
    .file("subprojects/foo/kiln.lua", "project('foo')\nfiles('../../common.c')");
  let err = interp_error(fixture.evaluate().unwrap_err());
  assert!(matches!(err, InterpError::Sandbox(SandboxViolation::OutsideProject { .. })));
}

#[test]
fn parents_cannot_grab_subproject_files() {
  let fixture = Fixture::new()
    .file("kiln.lua", "project('demo')\nexecutable('app', 'subprojects/foo/foo.c')")
    .file("subprojects/foo/kiln.lua", "project('foo')")
    .file("subprojects/foo/foo.c", "");
  let err = interp_error(fixture.evaluate().unwrap_err());
  assert!(matches!(err, InterpError::Sandbox(SandboxViolation::NestedSubproject { .. })));
}

#[test]
fn duplicate_target_names_across_subprojects_are_fine() {
  let fixture = Fixture::new()
    .file("kiln.lua", "project('demo')\nsubproject('foo')\nexecutable('tool', 'tool.c')")
    .file("tool.c", "")
    .file("subprojects/foo/kiln.lua", "project('foo')\nexecutable('tool', 'tool.c')")
    .file("subprojects/foo/tool.c", "");
  let graph = fixture.evaluate().unwrap();

  let tools: Vec<_> = graph.targets_named("tool").collect();
  assert_eq!(tools.len(), 2);
  assert_ne!(tools[0].id, tools[1].id);
}
