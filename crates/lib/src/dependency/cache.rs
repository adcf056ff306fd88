use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::types::{Dependency, DependencyKey, ExternalDependency};
use crate::error::InterpError;
use crate::machine::{MachineChoice, PerMachine};
use crate::version::version_satisfies;

/// An entry of the per-run override table.
#[derive(Debug, Clone)]
pub struct DependencyOverride {
  pub dep: Rc<Dependency>,
  /// Set by `kiln.override_dependency()`; implicit entries are recorded
  /// automatically after a successful lookup.
  pub explicit: bool,
}

/// Per-machine override tables.
#[derive(Debug, Clone, Default)]
pub struct DependencyOverrides {
  tables: PerMachine<HashMap<DependencyKey, DependencyOverride>>,
}

impl DependencyOverrides {
  pub fn get(&self, machine: MachineChoice, key: &DependencyKey) -> Option<&DependencyOverride> {
    self.tables.get(machine).get(key)
  }

  /// Install an explicit override. An explicit override can never be replaced.
  pub fn set_explicit(&mut self, machine: MachineChoice, key: DependencyKey, dep: Rc<Dependency>) -> Result<(), InterpError> {
    let table = self.tables.get_mut(machine);
    if table.get(&key).is_some_and(|o| o.explicit) {
      return Err(InterpError::invalid_code(format!(
        "Tried to override dependency '{}' which has already been overridden.",
        key
      )));
    }
    table.insert(key, DependencyOverride { dep, explicit: true });
    Ok(())
  }

  /// Record a lookup result so later lookups return the same object.
  ///
  /// Returns `false` when an entry already exists; existing entries are kept.
  pub fn record_implicit(&mut self, machine: MachineChoice, key: DependencyKey, dep: Rc<Dependency>) -> bool {
    let table = self.tables.get_mut(machine);
    if table.contains_key(&key) {
      return false;
    }
    table.insert(key, DependencyOverride { dep, explicit: false });
    true
  }

  /// Union `other` into this table. Entries missing here are added, and an
  /// explicit entry from `other` replaces an implicit one here.
  pub fn union(&mut self, other: DependencyOverrides) {
    let PerMachine { host, build } = other.tables;
    for (machine, table) in [(MachineChoice::Host, host), (MachineChoice::Build, build)] {
      let ours = self.tables.get_mut(machine);
      for (key, entry) in table {
        match ours.get(&key) {
          Some(existing) if existing.explicit || !entry.explicit => {}
          _ => {
            ours.insert(key, entry);
          }
        }
      }
    }
  }

  pub fn len(&self, machine: MachineChoice) -> usize {
    self.tables.get(machine).len()
  }
}

/// A probe result as persisted in the build directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDependency {
  pub key: DependencyKey,
  pub dep: ExternalDependency,
}

/// Process-wide cache of external probe results.
///
/// Only probe results are stored here; dependencies provided by a fallback
/// subproject never are, so that the subproject is visited on every run.
#[derive(Debug, Clone, Default)]
pub struct ImplicitCache {
  tables: PerMachine<HashMap<DependencyKey, Rc<Dependency>>>,
}

impl ImplicitCache {
  pub fn get(&self, machine: MachineChoice, key: &DependencyKey) -> Option<&Rc<Dependency>> {
    self.tables.get(machine).get(key)
  }

  pub fn insert(&mut self, machine: MachineChoice, key: DependencyKey, dep: ExternalDependency) -> Rc<Dependency> {
    let dep = Rc::new(Dependency::External(dep));
    self.tables.get_mut(machine).insert(key, dep.clone());
    dep
  }

  pub fn from_persisted(persisted: &PerMachine<Vec<CachedDependency>>) -> Self {
    let mut cache = Self::default();
    for (machine, entries) in persisted.iter() {
      for entry in entries {
        cache.insert(machine, entry.key.clone(), entry.dep.clone());
      }
    }
    cache
  }

  pub fn to_persisted(&self) -> PerMachine<Vec<CachedDependency>> {
    let mut out: PerMachine<Vec<CachedDependency>> = PerMachine::default();
    for (machine, table) in self.tables.iter() {
      let entries = out.get_mut(machine);
      for (key, dep) in table {
        if let Dependency::External(ext) = dep.as_ref() {
          entries.push(CachedDependency {
            key: key.clone(),
            dep: ext.clone(),
          });
        }
      }
      entries.sort_by(|a, b| a.key.cmp(&b.key));
    }
    out
  }

  pub fn len(&self, machine: MachineChoice) -> usize {
    self.tables.get(machine).len()
  }
}

/// Where a cache hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  ExplicitOverride,
  ImplicitOverride,
  Implicit,
}

impl CacheSource {
  pub fn label(&self) -> &'static str {
    match self {
      Self::ExplicitOverride => "overridden",
      Self::ImplicitOverride | Self::Implicit => "cached",
    }
  }
}

/// Result of consulting the override table and the implicit cache.
#[derive(Debug, Clone)]
pub enum CacheLookup {
  Hit { dep: Rc<Dependency>, source: CacheSource },
  /// An override exists but fails the requested constraints. The override is
  /// kept; this request resolves to not-found.
  VersionMismatch {
    found: String,
    not_found: Vec<String>,
    source: CacheSource,
  },
  Miss,
}

impl CacheLookup {
  /// Consult the override table, then the implicit cache.
  ///
  /// An override always takes precedence over the implicit cache. An implicit
  /// cache entry that fails the constraints is treated as a miss so the
  /// caller probes again.
  pub fn find<S: AsRef<str>>(
    overrides: &DependencyOverrides,
    implicit: &ImplicitCache,
    machine: MachineChoice,
    key: &DependencyKey,
    constraints: &[S],
  ) -> Self {
    if let Some(entry) = overrides.get(machine, key) {
      let source = if entry.explicit {
        CacheSource::ExplicitOverride
      } else {
        CacheSource::ImplicitOverride
      };
      if !entry.dep.found() || version_satisfies(entry.dep.version(), constraints) {
        return Self::Hit {
          dep: entry.dep.clone(),
          source,
        };
      }
      return Self::VersionMismatch {
        found: entry.dep.version().to_string(),
        not_found: constraints.iter().map(|c| c.as_ref().to_string()).collect(),
        source,
      };
    }
    if let Some(dep) = implicit.get(machine, key)
      && version_satisfies(dep.version(), constraints)
    {
      return Self::Hit {
        dep: dep.clone(),
        source: CacheSource::Implicit,
      };
    }
    Self::Miss
  }
}
