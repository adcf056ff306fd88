use std::collections::BTreeMap;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{BuildTarget, TargetId, TargetKind};
use crate::consts::{RESERVED_TARGET_NAMES, RESERVED_TARGET_PREFIX};

/// Errors raised when a target cannot be registered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
  #[error("Target name must not be empty.")]
  EmptyName,

  #[error("Target name must not consist only of whitespace.")]
  WhitespaceName,

  #[error("Target names starting with '{RESERVED_TARGET_PREFIX}' are reserved for internal use. Please rename target '{0}'.")]
  ReservedPrefix(String),

  #[error("Target name '{0}' is reserved for internal use. Please rename.")]
  ReservedName(String),

  #[error("Tried to create target \"{name}\", but a target of the same name already exists.")]
  Duplicate { name: String, id: TargetId },
}

/// Check the naming rules every target must satisfy.
pub fn validate_target_name(name: &str) -> Result<(), RegistryError> {
  if name.is_empty() {
    return Err(RegistryError::EmptyName);
  }
  if name.trim().is_empty() {
    return Err(RegistryError::WhitespaceName);
  }
  if name.starts_with(RESERVED_TARGET_PREFIX) {
    return Err(RegistryError::ReservedPrefix(name.to_string()));
  }
  if RESERVED_TARGET_NAMES.contains(&name) {
    return Err(RegistryError::ReservedName(name.to_string()));
  }
  Ok(())
}

/// Build identifier tokens keyed by target identifier.
///
/// Tokens are upper-case UUIDv4 strings. They are persisted with the rest of
/// the configuration state so a target keeps its token across re-evaluations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetGuids(BTreeMap<String, String>);

impl TargetGuids {
  /// Return the token for `id`, minting one the first time the id is seen.
  pub fn assign(&mut self, id: &TargetId) -> String {
    self
      .0
      .entry(id.0.clone())
      .or_insert_with(|| uuid::Uuid::new_v4().to_string().to_uppercase())
      .clone()
  }

  pub fn get(&self, id: &TargetId) -> Option<&str> {
    self.0.get(id.as_str()).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// Identifier to target mapping for one (sub)project, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
  targets: IndexMap<TargetId, Rc<BuildTarget>>,
}

impl TargetRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a target, assigning its build identifier token.
  ///
  /// Fails on invalid names and on identifier collisions. The same display
  /// name may be used by targets of different kinds.
  pub fn register(&mut self, mut target: BuildTarget, guids: &mut TargetGuids) -> Result<Rc<BuildTarget>, RegistryError> {
    validate_target_name(&target.name)?;
    if self.targets.contains_key(&target.id) {
      return Err(RegistryError::Duplicate {
        name: target.name,
        id: target.id,
      });
    }
    target.guid = guids.assign(&target.id);
    debug!(id = %target.id, kind = %target.kind, guid = %target.guid, "registered target");
    let target = Rc::new(target);
    self.targets.insert(target.id.clone(), target.clone());
    Ok(target)
  }

  /// Move every target of `other` into this registry.
  ///
  /// Any identifier already present here is a collision; nothing is merged in
  /// that case.
  pub fn absorb(&mut self, other: TargetRegistry) -> Result<(), RegistryError> {
    if let Some((id, target)) = other.targets.iter().find(|(id, _)| self.targets.contains_key(*id)) {
      return Err(RegistryError::Duplicate {
        name: target.name.clone(),
        id: id.clone(),
      });
    }
    self.targets.extend(other.targets);
    Ok(())
  }

  pub fn get(&self, id: &TargetId) -> Option<&Rc<BuildTarget>> {
    self.targets.get(id)
  }

  /// Find a target by display name and kind.
  pub fn find(&self, name: &str, kind: TargetKind) -> Option<&Rc<BuildTarget>> {
    self.targets.values().find(|t| t.name == name && t.kind == kind)
  }

  pub fn contains(&self, id: &TargetId) -> bool {
    self.targets.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Rc<BuildTarget>> {
    self.targets.values()
  }
}
