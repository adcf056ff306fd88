use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::consts::DEFAULT_SUBPROJECT_DIR;
use crate::coredata::CoreData;
use crate::dependency::{ChainProbe, DependencyProbe, ImplicitCache, NullProbe, PkgConfigProbe, ProbeError, StaticProbe};
use crate::graph::Diagnostic;
use crate::machine::MachineChoice;
use crate::options::EvalOptions;
use crate::subproject::{SourceResolver, SubprojectCache, WrapResolver};

/// State shared by every project of one evaluation run.
///
/// Owned by the outermost evaluation and shared with nested interpreters as
/// `Rc<RefCell<Session>>`. Borrows are kept short: no borrow may be held while
/// the front end runs a project.
pub struct Session {
  pub source_root: PathBuf,
  pub build_root: PathBuf,
  pub options: EvalOptions,
  pub coredata: CoreData,
  pub implicit_deps: ImplicitCache,
  pub subprojects: SubprojectCache,
  pub resolver: Box<dyn SourceResolver>,
  pub probe: Box<dyn DependencyProbe>,
  pub diagnostics: Vec<Diagnostic>,
}

impl Session {
  pub fn new(
    source_root: &Path,
    build_root: &Path,
    options: EvalOptions,
    coredata: CoreData,
    resolver: Box<dyn SourceResolver>,
    probe: Box<dyn DependencyProbe>,
  ) -> Self {
    let implicit_deps = ImplicitCache::from_persisted(&coredata.deps);
    debug!(
      host = implicit_deps.len(MachineChoice::Host),
      build = implicit_deps.len(MachineChoice::Build),
      "loaded cached dependencies"
    );
    Self {
      source_root: source_root.to_path_buf(),
      build_root: build_root.to_path_buf(),
      options,
      coredata,
      implicit_deps,
      subprojects: SubprojectCache::default(),
      resolver,
      probe,
      diagnostics: Vec::new(),
    }
  }

  /// A session with the default wrap resolver and the probes selected by
  /// `options`.
  pub fn with_defaults(source_root: &Path, build_root: &Path, options: EvalOptions, coredata: CoreData) -> Result<Self, ProbeError> {
    let probe = default_probe(&options)?;
    let resolver = Box::new(WrapResolver::empty(source_root, DEFAULT_SUBPROJECT_DIR));
    Ok(Self::new(source_root, build_root, options, coredata, resolver, probe))
  }

  /// Record a warning emitted by `subproject` (empty for the main project).
  pub fn record_warning(&mut self, subproject: &str, message: &str) {
    if subproject.is_empty() {
      warn!("{}", message);
    } else {
      warn!(subproject, "{}", message);
    }
    self.diagnostics.push(Diagnostic {
      subproject: subproject.to_string(),
      message: message.to_string(),
    });
  }

  /// Copy the implicit dependency cache back into the persisted state.
  pub fn sync_coredata(&mut self) {
    self.coredata.deps = self.implicit_deps.to_persisted();
  }
}

fn default_probe(options: &EvalOptions) -> Result<Box<dyn DependencyProbe>, ProbeError> {
  let mut chain = ChainProbe::new();
  let mut any = false;
  if let Some(path) = &options.system_deps {
    chain = chain.push(Box::new(StaticProbe::load(path)?));
    any = true;
  }
  if options.use_pkg_config {
    chain = chain.push(Box::new(PkgConfigProbe::new()));
    any = true;
  }
  if !any {
    return Ok(Box::new(NullProbe));
  }
  Ok(Box::new(chain))
}
