//! The closed set of values a build description can produce.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::dependency::Dependency;
use crate::program::ExternalProgram;
use crate::subproject::Subproject;
use crate::target::{BuildTarget, SourceFile};

/// An evaluated value.
///
/// Handles (targets, dependencies, programs, subprojects) compare by identity.
#[derive(Debug, Clone)]
pub enum Value {
  Str(String),
  Int(i64),
  Bool(bool),
  List(Vec<Value>),
  Map(BTreeMap<String, Value>),
  File(SourceFile),
  Target(Rc<BuildTarget>),
  Dependency(Rc<Dependency>),
  Program(Rc<ExternalProgram>),
  Subproject(Rc<Subproject>),
  /// Poisons every call it is passed to; see `disabler()`.
  Disabler,
}

impl Value {
  pub fn type_name(&self) -> &'static str {
    match self {
      Self::Str(_) => "str",
      Self::Int(_) => "int",
      Self::Bool(_) => "bool",
      Self::List(_) => "list",
      Self::Map(_) => "dict",
      Self::File(_) => "file",
      Self::Target(_) => "build target",
      Self::Dependency(_) => "dependency",
      Self::Program(_) => "external program",
      Self::Subproject(_) => "subproject",
      Self::Disabler => "disabler",
    }
  }

  pub fn str(s: impl Into<String>) -> Self {
    Self::Str(s.into())
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Self::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_int(&self) -> Option<i64> {
    match self {
      Self::Int(i) => Some(*i),
      _ => None,
    }
  }

  pub fn is_disabler(&self) -> bool {
    matches!(self, Self::Disabler)
  }

  /// Whether a disabler appears anywhere inside this value.
  pub fn contains_disabler(&self) -> bool {
    match self {
      Self::Disabler => true,
      Self::List(items) => items.iter().any(Value::contains_disabler),
      Self::Map(map) => map.values().any(Value::contains_disabler),
      _ => false,
    }
  }

  /// Flatten nested lists into a single sequence; non-lists yield themselves.
  pub fn flatten(self) -> Vec<Value> {
    match self {
      Self::List(items) => items.into_iter().flat_map(Value::flatten).collect(),
      other => vec![other],
    }
  }

  /// Whether a handle reports itself as found. Plain values count as found.
  pub fn found(&self) -> bool {
    match self {
      Self::Dependency(d) => d.found(),
      Self::Program(p) => p.found(),
      Self::Subproject(s) => s.found(),
      Self::Disabler => false,
      _ => true,
    }
  }

  /// Render as JSON for introspection output.
  pub fn to_json(&self) -> serde_json::Value {
    use serde_json::Value as J;
    match self {
      Self::Str(s) => J::String(s.clone()),
      Self::Int(i) => J::from(*i),
      Self::Bool(b) => J::Bool(*b),
      Self::List(items) => J::Array(items.iter().map(Value::to_json).collect()),
      Self::Map(map) => J::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
      other => J::String(other.to_string()),
    }
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Str(a), Self::Str(b)) => a == b,
      (Self::Int(a), Self::Int(b)) => a == b,
      (Self::Bool(a), Self::Bool(b)) => a == b,
      (Self::List(a), Self::List(b)) => a == b,
      (Self::Map(a), Self::Map(b)) => a == b,
      (Self::File(a), Self::File(b)) => a == b,
      (Self::Target(a), Self::Target(b)) => Rc::ptr_eq(a, b),
      (Self::Dependency(a), Self::Dependency(b)) => Rc::ptr_eq(a, b),
      (Self::Program(a), Self::Program(b)) => Rc::ptr_eq(a, b),
      (Self::Subproject(a), Self::Subproject(b)) => Rc::ptr_eq(a, b),
      (Self::Disabler, Self::Disabler) => true,
      _ => false,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Str(s) => f.write_str(s),
      Self::Int(i) => write!(f, "{}", i),
      Self::Bool(b) => write!(f, "{}", b),
      Self::List(items) => {
        let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
      }
      Self::Map(map) => {
        let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
      }
      Self::File(file) => write!(f, "{}", file),
      Self::Target(t) => write!(f, "<{} {}>", t.kind, t.name),
      Self::Dependency(d) => f.write_str(d.name()),
      Self::Program(p) => f.write_str(&p.name),
      Self::Subproject(s) => write!(f, "<subproject {}>", s.name),
      Self::Disabler => f.write_str("<disabler>"),
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Self::Str(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Self::Str(s)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Self::Bool(b)
  }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self {
    Self::Int(i)
  }
}

impl From<Rc<Dependency>> for Value {
  fn from(d: Rc<Dependency>) -> Self {
    Self::Dependency(d)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn flatten_nested_lists() {
    let v = Value::List(vec![
      Value::from("a"),
      Value::List(vec![Value::from("b"), Value::List(vec![Value::from("c")])]),
    ]);
    assert_eq!(
      v.flatten(),
      vec![Value::from("a"), Value::from("b"), Value::from("c")]
    );
  }

  #[test]
  fn disabler_detection_is_recursive() {
    let v = Value::List(vec![Value::from(1), Value::List(vec![Value::Disabler])]);
    assert!(v.contains_disabler());
    assert!(!Value::from("x").contains_disabler());
  }

  #[test]
  fn handles_compare_by_identity() {
    let a = Dependency::not_found("z");
    let b = Dependency::not_found("z");
    assert_eq!(Value::Dependency(a.clone()), Value::Dependency(a.clone()));
    assert_ne!(Value::Dependency(a), Value::Dependency(b));
  }

  #[test]
  fn json_rendering() {
    let mut map = BTreeMap::new();
    map.insert("k".to_string(), Value::List(vec![Value::from(true), Value::from(2)]));
    assert_eq!(Value::Map(map).to_json(), serde_json::json!({ "k": [true, 2] }));
  }
}
