//! Host/build machine selection.
//!
//! Under cross compilation targets and dependencies exist separately for the
//! machine the build runs on (`build`) and the machine the output runs on
//! (`host`). Every per-machine table in the interpreter is a [`PerMachine`].

use serde::{Deserialize, Serialize};

/// Which machine a target or dependency is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineChoice {
  #[default]
  Host,
  Build,
}

impl MachineChoice {
  /// Map the `native:` keyword to a machine.
  pub fn from_native(native: bool) -> Self {
    if native { Self::Build } else { Self::Host }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Host => "host",
      Self::Build => "build",
    }
  }
}

impl std::fmt::Display for MachineChoice {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A value kept once per machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerMachine<T> {
  pub host: T,
  pub build: T,
}

impl<T> PerMachine<T> {
  pub fn new(host: T, build: T) -> Self {
    Self { host, build }
  }

  pub fn get(&self, machine: MachineChoice) -> &T {
    match machine {
      MachineChoice::Host => &self.host,
      MachineChoice::Build => &self.build,
    }
  }

  pub fn get_mut(&mut self, machine: MachineChoice) -> &mut T {
    match machine {
      MachineChoice::Host => &mut self.host,
      MachineChoice::Build => &mut self.build,
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (MachineChoice, &T)> {
    [(MachineChoice::Host, &self.host), (MachineChoice::Build, &self.build)].into_iter()
  }
}
