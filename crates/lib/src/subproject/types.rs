use std::collections::BTreeMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::consts::UNDEFINED_VERSION;
use crate::error::InterpError;
use crate::value::Value;

/// Result of building a nested project.
#[derive(Debug)]
pub enum Outcome<T> {
  Ready(T),
  Disabled(String),
  Failed(InterpError),
}

/// Terminal state of a subproject.
#[derive(Debug, Clone)]
pub enum SubprojectState {
  Ready {
    version: String,
    /// The subproject's variable bindings after its evaluation finished.
    variables: BTreeMap<String, Value>,
  },
  /// An optional subproject that could not be resolved or evaluated.
  Disabled {
    reason: Option<String>,
    exception: Option<InterpError>,
  },
  /// A required subproject whose evaluation failed. The error was propagated
  /// to the requester; the entry only remains visible if some enclosing
  /// optional subproject absorbed that error.
  Failed(InterpError),
}

/// Handle returned by `subproject()`.
#[derive(Debug, Clone)]
pub struct Subproject {
  pub name: String,
  /// Source directory relative to the source root; empty when never resolved.
  pub subdir: String,
  pub state: SubprojectState,
  pub warnings: usize,
}

impl Subproject {
  pub fn ready(name: &str, subdir: &str, version: String, variables: BTreeMap<String, Value>, warnings: usize) -> Self {
    Self {
      name: name.to_string(),
      subdir: subdir.to_string(),
      state: SubprojectState::Ready { version, variables },
      warnings,
    }
  }

  pub fn disabled(name: &str, subdir: &str, reason: Option<String>, exception: Option<InterpError>) -> Self {
    Self {
      name: name.to_string(),
      subdir: subdir.to_string(),
      state: SubprojectState::Disabled { reason, exception },
      warnings: 0,
    }
  }

  pub fn failed(name: &str, subdir: &str, error: InterpError) -> Self {
    Self {
      name: name.to_string(),
      subdir: subdir.to_string(),
      state: SubprojectState::Failed(error),
      warnings: 0,
    }
  }

  pub fn found(&self) -> bool {
    matches!(self.state, SubprojectState::Ready { .. })
  }

  pub fn version(&self) -> &str {
    match &self.state {
      SubprojectState::Ready { version, .. } => version,
      _ => UNDEFINED_VERSION,
    }
  }

  pub fn disabled_reason(&self) -> Option<&str> {
    match &self.state {
      SubprojectState::Disabled { reason, .. } => reason.as_deref(),
      _ => None,
    }
  }

  pub fn exception(&self) -> Option<&InterpError> {
    match &self.state {
      SubprojectState::Disabled { exception, .. } => exception.as_ref(),
      SubprojectState::Failed(err) => Some(err),
      SubprojectState::Ready { .. } => None,
    }
  }

  /// Look up a variable in the subproject's own bindings.
  ///
  /// Fails with [`InterpError::UnknownVariable`] when the variable does not
  /// exist, and with an `InvalidArguments` error when the subproject is not
  /// usable at all.
  pub fn get_variable(&self, name: &str) -> Result<&Value, InterpError> {
    match &self.state {
      SubprojectState::Ready { variables, .. } => variables.get(name).ok_or_else(|| InterpError::UnknownVariable {
        subproject: self.name.clone(),
        name: name.to_string(),
      }),
      _ => Err(InterpError::invalid_args(format!(
        "Subproject \"{}\" disabled can't get_variable on it.",
        self.name
      ))),
    }
  }
}

/// A cache slot.
#[derive(Debug, Clone)]
pub enum SubprojectEntry {
  InProgress,
  Done(Rc<Subproject>),
}

/// Subprojects seen during this run, in first-reference order.
#[derive(Debug, Default)]
pub struct SubprojectCache {
  entries: IndexMap<String, SubprojectEntry>,
}

impl SubprojectCache {
  pub fn get(&self, name: &str) -> Option<&SubprojectEntry> {
    self.entries.get(name)
  }

  pub fn handle(&self, name: &str) -> Option<Rc<Subproject>> {
    match self.entries.get(name) {
      Some(SubprojectEntry::Done(handle)) => Some(handle.clone()),
      _ => None,
    }
  }

  /// Whether `name` finished evaluating successfully.
  pub fn is_found(&self, name: &str) -> bool {
    self.handle(name).is_some_and(|h| h.found())
  }

  pub fn begin(&mut self, name: &str) {
    self.entries.insert(name.to_string(), SubprojectEntry::InProgress);
  }

  pub fn finish(&mut self, handle: Subproject) -> Rc<Subproject> {
    let handle = Rc::new(handle);
    self
      .entries
      .insert(handle.name.clone(), SubprojectEntry::Done(handle.clone()));
    handle
  }

  /// Forget an entry, e.g. one whose result was discarded.
  pub fn discard(&mut self, name: &str) {
    self.entries.shift_remove(name);
  }

  /// All finished handles in first-reference order.
  pub fn handles(&self) -> impl Iterator<Item = &Rc<Subproject>> {
    self.entries.values().filter_map(|e| match e {
      SubprojectEntry::Done(h) => Some(h),
      SubprojectEntry::InProgress => None,
    })
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
