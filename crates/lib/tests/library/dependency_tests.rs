use kiln_lib::error::InterpError;
use kiln_lib::eval::EvalError;

use super::common::Fixture;

const ZLIB_WRAP: &str = "[wrap-file]\ndirectory = zlib-1.3\n\n[provide]\nzlib = zlib_dep\n";

const ZLIB_PROJECT: &str = r#"
  project('zlib', {version = '1.3'})
  zlib = static_library('z', 'adler32.c')
  zlib_dep = declare_dependency({link_with = zlib, compile_args = {'-DZLIB_CONST'}})
"#;

fn with_zlib_subproject(fixture: Fixture) -> Fixture {
  fixture
    .file("subprojects/zlib.wrap", ZLIB_WRAP)
    .file("subprojects/zlib-1.3/kiln.lua", ZLIB_PROJECT)
    .file("subprojects/zlib-1.3/adler32.c", "")
}

#[test]
fn system_dependency_is_preferred() {
  let fixture = with_zlib_subproject(
    Fixture::new()
      .file(
        "kiln.lua",
        r#"
          project('demo')
          local z = dependency('zlib', {version = '>=1.2'})
          assert(z:found())
          assert(z:type_name() == 'external')
          executable('app', 'main.c', {dependencies = z})
        "#,
      )
      .file("main.c", ""),
  )
  .system_deps(r#"{"zlib": {"version": "1.2.13", "link_args": ["-lz"]}}"#);
  let graph = fixture.evaluate().unwrap();

  assert!(graph.subprojects.is_empty());
  let app = graph.targets_named("app").next().unwrap();
  assert_eq!(app.dependencies[0].version, "1.2.13");
  assert_eq!(app.dependencies[0].link_args, vec!["-lz"]);
}

#[test]
fn wrap_provides_the_fallback() {
  let fixture = with_zlib_subproject(
    Fixture::new()
      .file(
        "kiln.lua",
        r#"
          project('demo')
          local z = dependency('zlib')
          assert(z:found())
          assert(z:version() == '1.3')
          executable('app', 'main.c', {dependencies = z})
        "#,
      )
      .file("main.c", ""),
  );
  let graph = fixture.evaluate().unwrap();

  let zlib = graph.subproject("zlib").unwrap();
  assert!(zlib.found);
  assert_eq!(zlib.subdir, "subprojects/zlib-1.3");
  let z = graph.targets_named("z").next().unwrap();
  assert_eq!(z.subproject, "zlib");
  let app = graph.targets_named("app").next().unwrap();
  assert_eq!(app.link_with, vec![z.id.clone()]);
  assert_eq!(app.dependencies[0].compile_args, vec!["-DZLIB_CONST"]);
}

#[test]
fn force_fallback_skips_the_system() {
  let fixture = with_zlib_subproject(Fixture::new().file(
    "kiln.lua",
    r#"
      project('demo')
      assert(dependency('zlib'):type_name() == 'internal')
    "#,
  ))
  .system_deps(r#"{"zlib": {"version": "1.2.13"}}"#)
  .defines(&["force_fallback_for=zlib"]);
  let graph = fixture.evaluate().unwrap();
  assert!(graph.subproject("zlib").unwrap().found);
}

#[test]
fn nofallback_reports_the_missing_dependency() {
  let fixture = with_zlib_subproject(Fixture::new().file("kiln.lua", "project('demo')\ndependency('zlib')"))
    .defines(&["wrap_mode=nofallback"]);
  let err = fixture.evaluate().unwrap_err();
  assert!(matches!(err, EvalError::Interp(InterpError::Dependency(_))));
  assert!(err.to_string().contains("zlib"));
}

#[test]
fn explicit_fallback_names_the_variable() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      r#"
        project('demo')
        local png = dependency('libpng', {fallback = {'png', 'png_dep'}})
        assert(png:found())
        local again = dependency('libpng')
        assert(again == png)
      "#,
    )
    .file(
      "subprojects/png/kiln.lua",
      "project('png', {version = '1.6.43'})\npng_dep = declare_dependency({compile_args = {'-DPNG'}})",
    );
  let graph = fixture.evaluate().unwrap();
  assert_eq!(graph.subproject("png").unwrap().version, "1.6.43");
}

#[test]
fn overrides_from_subprojects_are_visible() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      r#"
        project('demo')
        subproject('foo')
        local foo = dependency('foo-core', {version = '>=2.0'})
        assert(foo:found())
        assert(foo:get_variable('prefix') == '/opt/foo')
        local tool = find_program('foo-gen')
        assert(tool:found())
      "#,
    )
    .file(
      "subprojects/foo/kiln.lua",
      r#"
        project('foo', {version = '2.1'})
        local dep = declare_dependency({variables = {prefix = '/opt/foo'}})
        kiln.override_dependency('foo-core', dep)
        local gen = executable('foo-gen', 'gen.c')
        kiln.override_find_program('foo-gen', gen)
      "#,
    )
    .file("subprojects/foo/gen.c", "");
  fixture.evaluate().unwrap();
}

#[test]
fn version_constraints_filter_results() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      r#"
        project('demo')
        local old = dependency('zlib', {version = '>=2.0', required = false})
        assert(not old:found())
        local any = dependency('zlib', {version = {'>=1.0', '<2.0'}})
        assert(any:found())
      "#,
    )
    .system_deps(r#"{"zlib": {"version": "1.3.1"}}"#);
  fixture.evaluate().unwrap();

  let required = Fixture::new()
    .file("kiln.lua", "project('demo')\ndependency('zlib', {version = '>=2.0'})")
    .system_deps(r#"{"zlib": {"version": "1.3.1"}}"#);
  let err = required.evaluate().unwrap_err();
  assert!(matches!(err, EvalError::Interp(InterpError::Dependency(_))));
}

#[test]
fn empty_name_is_never_found() {
  let fixture = Fixture::new().file(
    "kiln.lua",
    r#"
      project('demo')
      local none = dependency('', {required = false})
      assert(not none:found())
    "#,
  );
  fixture.evaluate().unwrap();

  let required = Fixture::new().file("kiln.lua", "project('demo')\ndependency('')");
  let err = required.evaluate().unwrap_err();
  assert!(matches!(err, EvalError::Interp(InterpError::InvalidArguments(_))));
}

#[test]
fn disabler_kwarg_replaces_missing_dependencies() {
  let fixture = Fixture::new().file(
    "kiln.lua",
    r#"
      project('demo')
      local d = dependency('nothing-here', {required = false, disabler = true})
      assert(is_disabler(d))
      executable('app', 'missing.c', {dependencies = d})
    "#,
  );
  let graph = fixture.evaluate().unwrap();
  assert!(graph.targets.is_empty());
}

#[test]
fn cached_lookups_are_persisted() {
  let fixture = Fixture::new()
    .file("kiln.lua", "project('demo')\ndependency('zlib')")
    .system_deps(r#"{"zlib": {"version": "1.3"}}"#);
  fixture.evaluate().unwrap();
  let coredata = std::fs::read_to_string(kiln_lib::coredata::CoreData::path_in(&fixture.build())).unwrap();
  assert!(coredata.contains("zlib"));
}

#[test]
fn fallback_variable_must_match_the_override() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      "project('demo')\ndependency('libpng', {fallback = {'png', 'png_dep'}})",
    )
    .file(
      "subprojects/png/kiln.lua",
      r#"
        project('png', {version = '1.6.43'})
        png_dep = declare_dependency({compile_args = {'-DPNG'}})
        local other = declare_dependency({compile_args = {'-DOTHER'}})
        kiln.override_dependency('libpng', other)
      "#,
    );
  match fixture.evaluate().unwrap_err() {
    EvalError::Interp(InterpError::Dependency(msg)) => assert!(msg.starts_with("Inconsistency:")),
    other => panic!("unexpected error: {other}"),
  }
}

#[test]
fn language_is_part_of_the_lookup() {
  let fixture = Fixture::new()
    .file(
      "kiln.lua",
      r#"
        project('demo')
        local c = dependency('zlib', {language = 'c'})
        local cpp = dependency('zlib', {language = 'cpp', optional_modules = {'extra'}})
        assert(c:found() and cpp:found())
        assert(c ~= cpp)
        assert(dependency('zlib', {language = 'c'}) == c)
      "#,
    )
    .system_deps(r#"{"zlib": {"version": "1.3"}}"#);
  fixture.evaluate().unwrap();
}

#[test]
fn allow_fallback_needs_a_provider() {
  let fixture = Fixture::new().file(
    "kiln.lua",
    "project('demo')\ndependency('nothere', {allow_fallback = true, required = false})",
  );
  let err = fixture.evaluate().unwrap_err();
  assert!(matches!(err, EvalError::Interp(InterpError::InvalidArguments(ref msg)) if msg.contains("'nothere'")));
}
