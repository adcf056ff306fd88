use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::{debug, info};

use super::{Interpreter, Session, SourceInput, SubprojectRequest, join_subdir};
use crate::dependency::{CacheLookup, Dependency, DependencyKey, ImplicitCache, InternalDependency};
use crate::error::InterpError;
use crate::machine::MachineChoice;
use crate::options::WrapMode;
use crate::target::BuildTarget;
use crate::value::Value;
use crate::version::version_satisfies;

/// The subproject (and optionally the variable in it) that provides a
/// dependency when the system does not.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback {
  pub subproject: String,
  pub variable: Option<String>,
}

/// Arguments of `dependency()`.
#[derive(Debug, Clone)]
pub struct DependencyRequest {
  /// Candidate names, tried in order. A single empty name means "no
  /// dependency" and only makes sense together with a fallback.
  pub names: Vec<String>,
  pub version: Vec<String>,
  pub required: bool,
  pub native: bool,
  pub fallback: Option<Fallback>,
  pub allow_fallback: Option<bool>,
  /// Passed to the fallback subproject.
  pub default_options: BTreeMap<String, String>,
  pub not_found_message: Option<String>,
  /// Remaining lookup keywords (`method`, `static`, `modules`, ...) rendered
  /// as strings. They take part in the cache identity.
  pub options: BTreeMap<String, String>,
}

impl DependencyRequest {
  pub fn named(name: &str) -> Self {
    Self {
      names: vec![name.to_string()],
      version: Vec::new(),
      required: true,
      native: false,
      fallback: None,
      allow_fallback: None,
      default_options: BTreeMap::new(),
      not_found_message: None,
      options: BTreeMap::new(),
    }
  }

  fn lookup_names(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str).filter(|n| !n.is_empty())
  }

  fn display_name(&self) -> String {
    let names: Vec<&str> = self.lookup_names().collect();
    if names.is_empty() {
      "(anonymous)".to_string()
    } else {
      names.join(", ")
    }
  }
}

/// Arguments of `declare_dependency()`.
#[derive(Debug, Clone, Default)]
pub struct InternalDependencyRequest {
  pub compile_args: Vec<String>,
  pub link_args: Vec<String>,
  pub link_with: Vec<Rc<BuildTarget>>,
  pub sources: Vec<SourceInput>,
  pub include_directories: Vec<String>,
  pub dependencies: Vec<Rc<Dependency>>,
  pub variables: BTreeMap<String, String>,
  pub version: Option<String>,
}

/// A lookup result plus, when not found, why.
type Resolved = (Rc<Dependency>, Option<String>);

enum Cached {
  Hit(Rc<Dependency>),
  /// An override exists but fails the version constraints.
  Rejected(String),
  Miss,
}

impl Interpreter {
  /// `dependency()`.
  ///
  /// Lookup order: the override table and implicit cache, an already
  /// configured fallback subproject, the system probes (unless the fallback
  /// is forced), and finally the fallback subproject.
  pub fn dependency(&mut self, req: DependencyRequest) -> Result<Rc<Dependency>, InterpError> {
    self.require_project("dependency")?;
    validate_names(&req.names)?;
    if req.fallback.is_some() && req.allow_fallback.is_some() {
      return Err(InterpError::invalid_args(
        "\"fallback\" and \"allow_fallback\" arguments are mutually exclusive",
      ));
    }
    let anonymous = req.lookup_names().next().is_none();
    if anonymous && req.required && req.fallback.is_none() {
      return Err(InterpError::invalid_args(
        "Dependency is required but has no name to look up and no fallback.",
      ));
    }

    let machine = MachineChoice::from_native(req.native);
    let display_name = req.display_name();
    let (dep, detail) = self.lookup_dependency(&req, machine, &display_name)?;

    if !dep.found() {
      info!(dependency = %display_name, machine = %machine, "dependency found: NO");
      if let Some(msg) = &req.not_found_message {
        self.message(msg);
      }
      if req.required {
        let detail = detail.unwrap_or_else(|| format!("tried {}", self.session().probe.describe()));
        return Err(InterpError::Dependency(format!(
          "Dependency \"{}\" not found, {}",
          display_name, detail
        )));
      }
      return Ok(dep);
    }

    // Later lookups of any of the names in this run return the same object.
    for name in req.lookup_names() {
      let key = DependencyKey::new(name, &req.options);
      self.fragment.dependency_overrides.record_implicit(machine, key, dep.clone());
    }
    Ok(dep)
  }

  fn lookup_dependency(&mut self, req: &DependencyRequest, machine: MachineChoice, display_name: &str) -> Result<Resolved, InterpError> {
    let (fallback, forced) = self.select_fallback(req)?;
    let skip_implicit = forced && fallback.is_some();

    for name in req.lookup_names() {
      match self.cached_dependency(name, machine, req, skip_implicit) {
        Cached::Hit(dep) => {
          verify_fallback_consistency(&self.session(), &dep, fallback.as_ref())?;
          return Ok((dep, None));
        }
        Cached::Rejected(detail) => return Ok((Dependency::not_found(display_name), Some(detail))),
        Cached::Miss => {}
      }
    }

    let configured = fallback
      .as_ref()
      .is_some_and(|fb| self.session().subprojects.is_found(&fb.subproject));
    if let Some(fb) = &fallback
      && configured
    {
      return self.subproject_dependency(fb, req, machine, display_name);
    }

    let mut detail = None;
    if !skip_implicit {
      for name in req.lookup_names() {
        let probed = self.session().probe.find(name, machine, &req.options);
        let Some(ext) = probed else { continue };
        if !version_satisfies(&ext.version, &req.version) {
          info!(dependency = name, found = %ext.version, wanted = ?req.version, "dependency found: NO (version mismatch)");
          detail = Some(version_detail(&ext.version, &req.version));
          continue;
        }
        let key = DependencyKey::new(name, &req.options);
        let dep = self.session_mut().implicit_deps.insert(machine, key, ext);
        info!(dependency = name, version = dep.version(), machine = %machine, "dependency found: YES");
        return Ok((dep, None));
      }
    }

    let Some(fb) = fallback else {
      return Ok((Dependency::not_found(display_name), detail));
    };
    if self.session().options.wrap_mode == WrapMode::NoFallback && !forced {
      info!(dependency = %display_name, subproject = %fb.subproject, "not looking for a fallback subproject: fallbacks are disabled");
      return Ok((Dependency::not_found(display_name), detail));
    }
    info!(dependency = %display_name, subproject = %fb.subproject, "looking for a fallback subproject");
    let handle = self.do_subproject(SubprojectRequest {
      name: fb.subproject.clone(),
      required: req.required,
      version: Vec::new(),
      default_options: req.default_options.clone(),
    })?;
    if !handle.found() {
      return Ok((
        Dependency::not_found(display_name),
        Some(format!("subproject {} failed to configure", fb.subproject)),
      ));
    }
    self.subproject_dependency(&fb, req, machine, display_name)
  }

  /// Choose the fallback subproject, and whether it is forced.
  ///
  /// `allow_fallback = true` requires some wrap or subproject to provide one
  /// of the names.
  fn select_fallback(&self, req: &DependencyRequest) -> Result<(Option<Fallback>, bool), InterpError> {
    let session = self.session();
    let options = &session.options;
    let mut forced = req.lookup_names().any(|n| options.forces_fallback_for(n));
    if let Some(fb) = &req.fallback {
      forced |= options.forces_fallback_for(&fb.subproject);
      return Ok((Some(fb.clone()), forced));
    }
    if req.allow_fallback == Some(false) {
      return Ok((None, forced));
    }
    for name in req.lookup_names() {
      if let Some((subproject, variable)) = session.resolver.find_dependency_provider(name) {
        forced |= options.forces_fallback_for(&subproject);
        let usable = forced || req.allow_fallback == Some(true) || req.required || session.subprojects.is_found(&subproject);
        if usable {
          debug!(dependency = name, %subproject, "using implicit fallback");
          return Ok((Some(Fallback { subproject, variable }), forced));
        }
        return Ok((None, forced));
      }
    }
    if req.allow_fallback == Some(true)
      && let Some(name) = req.lookup_names().next()
    {
      return Err(InterpError::invalid_args(format!(
        "Fallback wrap or subproject not found for dependency '{}'",
        name
      )));
    }
    Ok((None, forced))
  }

  fn cached_dependency(&self, name: &str, machine: MachineChoice, req: &DependencyRequest, skip_implicit: bool) -> Cached {
    let key = DependencyKey::new(name, &req.options);
    let session = self.session();
    let empty = ImplicitCache::default();
    let implicit = if skip_implicit { &empty } else { &session.implicit_deps };
    match CacheLookup::find(&self.fragment.dependency_overrides, implicit, machine, &key, &req.version) {
      CacheLookup::Hit { dep, source } => {
        info!(dependency = %key, found = dep.found(), version = dep.version(), "dependency lookup ({})", source.label());
        Cached::Hit(dep)
      }
      CacheLookup::VersionMismatch { found, not_found, source } => {
        info!(dependency = %key, %found, "dependency found: NO ({})", source.label());
        Cached::Rejected(version_detail(&found, &not_found))
      }
      CacheLookup::Miss => Cached::Miss,
    }
  }

  /// Dependency provided by an already configured fallback subproject.
  ///
  /// Never falls through to the system: a configured subproject that does not
  /// provide the dependency yields not-found.
  fn subproject_dependency(
    &mut self,
    fb: &Fallback,
    req: &DependencyRequest,
    machine: MachineChoice,
    display_name: &str,
  ) -> Result<Resolved, InterpError> {
    for name in req.lookup_names() {
      match self.cached_dependency(name, machine, req, false) {
        Cached::Hit(dep) => {
          verify_fallback_consistency(&self.session(), &dep, Some(fb))?;
          return Ok((dep, None));
        }
        Cached::Rejected(detail) => return Ok((Dependency::not_found(display_name), Some(detail))),
        Cached::Miss => {}
      }
    }

    let variable = fb.variable.clone().or_else(|| {
      let session = self.session();
      req.lookup_names().find_map(|n| {
        session
          .resolver
          .find_dependency_provider(n)
          .filter(|(s, _)| *s == fb.subproject)
          .and_then(|(_, v)| v)
      })
    });
    let Some(variable) = variable else {
      self.warning(&format!(
        "Subproject '{}' did not override '{}' dependency and no variable name specified",
        fb.subproject, display_name
      ));
      return Ok((
        Dependency::not_found(display_name),
        Some(format!("subproject {} did not provide it", fb.subproject)),
      ));
    };

    let handle = self
      .session()
      .subprojects
      .handle(&fb.subproject)
      .ok_or_else(|| InterpError::SubprojectRequired {
        name: fb.subproject.clone(),
      })?;
    let value = match handle.get_variable(&variable) {
      Ok(value) => value.clone(),
      Err(err @ InterpError::UnknownVariable { .. }) => {
        let hint = format!(
          "{} The fallback for dependency '{}' expects it to hold the dependency object.",
          err, display_name
        );
        if req.required {
          return Err(InterpError::Dependency(hint));
        }
        self.warning(&hint);
        return Ok((Dependency::not_found(display_name), Some(err.to_string())));
      }
      Err(err) => return Err(err),
    };
    let Value::Dependency(dep) = value else {
      return Err(InterpError::invalid_code(format!(
        "Variable '{}' in the subproject '{}' is not a dependency object.",
        variable, fb.subproject
      )));
    };
    if !dep.found() {
      return Ok((dep, None));
    }
    if !version_satisfies(dep.version(), &req.version) {
      info!(dependency = %display_name, subproject = %fb.subproject, found = dep.version(), "dependency found: NO (version mismatch)");
      return Ok((Dependency::not_found(display_name), Some(version_detail(dep.version(), &req.version))));
    }
    info!(dependency = %display_name, subproject = %fb.subproject, version = dep.version(), "dependency found: YES (from subproject)");
    Ok((dep, None))
  }

  /// `kiln.override_dependency()`.
  pub fn override_dependency(
    &mut self,
    name: &str,
    dep: Rc<Dependency>,
    native: bool,
    options: &BTreeMap<String, String>,
  ) -> Result<(), InterpError> {
    self.require_project("override_dependency")?;
    if name.is_empty() {
      return Err(InterpError::invalid_args("Dependency name must not be empty."));
    }
    let machine = MachineChoice::from_native(native);
    let key = DependencyKey::new(name, options);
    debug!(dependency = %key, machine = %machine, "overriding dependency");
    self.fragment.dependency_overrides.set_explicit(machine, key, dep)
  }

  /// `declare_dependency()`.
  pub fn declare_dependency(&mut self, req: InternalDependencyRequest) -> Result<Rc<Dependency>, InterpError> {
    self.require_project("declare_dependency")?;
    let sources = self.source_files(req.sources)?;

    let source_root = self.source_root();
    let mut include_directories = Vec::new();
    for dir in &req.include_directories {
      self.ctx.bounds(&source_root).validate(&self.ctx.subdir, dir)?;
      let rel = join_subdir(&self.ctx.subdir, dir);
      if !source_root.join(&rel).is_dir() {
        return Err(InterpError::invalid_args(format!("Include dir {} does not exist.", dir)));
      }
      include_directories.push(rel);
    }

    let mut link_with = Vec::new();
    for lib in &req.link_with {
      if !lib.kind.is_linkable() {
        return Err(InterpError::invalid_args(format!("Link target '{}' is not linkable.", lib.name)));
      }
      link_with.push(lib.id.clone());
    }

    Ok(Rc::new(Dependency::Internal(InternalDependency {
      version: req.version.unwrap_or_else(|| self.ctx.project_version().to_string()),
      compile_args: req.compile_args,
      link_args: req.link_args,
      link_with,
      sources,
      include_directories,
      dependencies: req.dependencies.into_iter().filter(|d| d.found()).collect(),
      variables: req.variables,
    })))
  }
}

fn validate_names(names: &[String]) -> Result<(), InterpError> {
  if names.is_empty() {
    return Err(InterpError::invalid_args("dependency() requires at least one name."));
  }
  if names.len() > 1 && names.iter().any(String::is_empty) {
    return Err(InterpError::invalid_args(
      "An empty dependency name is only allowed on its own.",
    ));
  }
  if names.iter().any(|n| n.contains(['<', '>', '='])) {
    return Err(InterpError::invalid_args(
      "Characters <, > and = are forbidden in dependency names. To specify version\n\
       requirements use the 'version' keyword argument instead.",
    ));
  }
  Ok(())
}

/// A cached dependency must be the very object held by the fallback variable
/// of an already configured subproject.
fn verify_fallback_consistency(session: &Session, dep: &Rc<Dependency>, fallback: Option<&Fallback>) -> Result<(), InterpError> {
  let Some(Fallback {
    subproject,
    variable: Some(variable),
  }) = fallback
  else {
    return Ok(());
  };
  let Some(handle) = session.subprojects.handle(subproject).filter(|h| h.found()) else {
    return Ok(());
  };
  if let Ok(Value::Dependency(var_dep)) = handle.get_variable(variable)
    && dep.found()
    && !Rc::ptr_eq(var_dep, dep)
  {
    return Err(InterpError::Dependency(format!(
      "Inconsistency: Subproject has overridden the dependency with another variable than '{}'",
      variable
    )));
  }
  Ok(())
}

fn version_detail<S: AsRef<str>>(found: &str, wanted: &[S]) -> String {
  let wanted: Vec<String> = wanted.iter().map(|w| format!("'{}'", w.as_ref())).collect();
  format!("found {} but need: {}", found, wanted.join(", "))
}
