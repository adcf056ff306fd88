//! Moving values between Lua and the interpreter.
//!
//! Handles are wrapped in userdata types so identity survives a round trip
//! through the VM. [`Args`] splits a builtin's Lua arguments into positional
//! and keyword arguments and converts them on demand.

use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use mlua::prelude::*;

use crate::dependency::Dependency;
use crate::error::InterpError;
use crate::program::ExternalProgram;
use crate::subproject::Subproject;
use crate::target::{BuildTarget, SourceFile};
use crate::value::Value;

pub struct LuaTarget(pub Rc<BuildTarget>);
pub struct LuaDependency(pub Rc<Dependency>);
pub struct LuaProgram(pub Rc<ExternalProgram>);
pub struct LuaSubproject(pub Rc<Subproject>);
pub struct LuaFile(pub SourceFile);
pub struct LuaDisabler;

/// Returned by `subdir_done()`; a build file returning it stops early.
pub struct LuaStop;

impl LuaUserData for LuaTarget {
  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_method("found", |_, _, ()| Ok(true));
    methods.add_method("name", |_, this, ()| Ok(this.0.name.clone()));
    methods.add_method("id", |_, this, ()| Ok(this.0.id.0.clone()));
    methods.add_method("kind", |_, this, ()| Ok(this.0.kind.as_str()));
    methods.add_meta_method(LuaMetaMethod::Eq, |_, this, other: LuaAnyUserData| {
      Ok(other.borrow::<LuaTarget>().is_ok_and(|o| Rc::ptr_eq(&this.0, &o.0)))
    });
    methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| {
      Ok(Value::Target(this.0.clone()).to_string())
    });
  }
}

impl LuaUserData for LuaDependency {
  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_method("found", |_, this, ()| Ok(this.0.found()));
    methods.add_method("name", |_, this, ()| Ok(this.0.name().to_string()));
    methods.add_method("version", |_, this, ()| Ok(this.0.version().to_string()));
    methods.add_method("type_name", |_, this, ()| Ok(this.0.kind()));
    methods.add_method("get_variable", |_, this, (name, fallback): (String, Option<String>)| {
      match (this.0.get_variable(&name), fallback) {
        (Some(v), _) => Ok(v.to_string()),
        (None, Some(fallback)) => Ok(fallback),
        (None, None) => Err(LuaError::external(InterpError::invalid_args(format!(
          "Could not get variable \"{}\" from dependency \"{}\".",
          name,
          this.0.name()
        )))),
      }
    });
    methods.add_meta_method(LuaMetaMethod::Eq, |_, this, other: LuaAnyUserData| {
      Ok(other.borrow::<LuaDependency>().is_ok_and(|o| Rc::ptr_eq(&this.0, &o.0)))
    });
    methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| Ok(this.0.name().to_string()));
  }
}

impl LuaUserData for LuaProgram {
  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_method("found", |_, this, ()| Ok(this.0.found()));
    methods.add_method("name", |_, this, ()| Ok(this.0.name.clone()));
    methods.add_method("path", |_, this, ()| Ok(this.0.path_string()));
    methods.add_method("version", |_, this, ()| Ok(this.0.version.clone()));
    methods.add_meta_method(LuaMetaMethod::Eq, |_, this, other: LuaAnyUserData| {
      Ok(other.borrow::<LuaProgram>().is_ok_and(|o| Rc::ptr_eq(&this.0, &o.0)))
    });
    methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| Ok(this.0.name.clone()));
  }
}

impl LuaUserData for LuaSubproject {
  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_method("found", |_, this, ()| Ok(this.0.found()));
    methods.add_method("version", |_, this, ()| Ok(this.0.version().to_string()));
    methods.add_method("get_variable", |lua, this, (name, fallback): (String, LuaValue)| {
      match this.0.get_variable(&name) {
        Ok(value) => value_to_lua(lua, value.clone()),
        Err(InterpError::UnknownVariable { .. }) if !fallback.is_nil() => Ok(fallback),
        Err(e) => Err(LuaError::external(e)),
      }
    });
    methods.add_meta_method(LuaMetaMethod::Eq, |_, this, other: LuaAnyUserData| {
      Ok(other.borrow::<LuaSubproject>().is_ok_and(|o| Rc::ptr_eq(&this.0, &o.0)))
    });
    methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| {
      Ok(Value::Subproject(this.0.clone()).to_string())
    });
  }
}

impl LuaUserData for LuaFile {
  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_method("found", |_, _, ()| Ok(true));
    methods.add_method("path", |_, this, ()| Ok(this.0.relative_path()));
    methods.add_meta_method(LuaMetaMethod::Eq, |_, this, other: LuaAnyUserData| {
      Ok(other.borrow::<LuaFile>().is_ok_and(|o| this.0 == o.0))
    });
    methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| Ok(this.0.relative_path()));
  }
}

impl LuaUserData for LuaDisabler {
  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    // Every method of a disabler returns a disabler, except found().
    methods.add_meta_method(LuaMetaMethod::Index, |lua, _, key: String| {
      if key == "found" {
        lua.create_function(|_, _: LuaMultiValue| Ok(false))
      } else {
        lua.create_function(|lua, _: LuaMultiValue| lua.create_userdata(LuaDisabler))
      }
    });
    methods.add_meta_method(LuaMetaMethod::Eq, |_, _, other: LuaAnyUserData| Ok(other.is::<LuaDisabler>()));
    methods.add_meta_method(LuaMetaMethod::ToString, |_, _, ()| Ok("<disabler>"));
  }
}

impl LuaUserData for LuaStop {}

/// Convert a Lua value. `nil` yields `None`.
pub fn lua_to_value(value: LuaValue) -> Result<Option<Value>, InterpError> {
  Ok(Some(match value {
    LuaValue::Nil => return Ok(None),
    LuaValue::Boolean(b) => Value::Bool(b),
    LuaValue::Integer(i) => Value::Int(i),
    LuaValue::Number(n) if n.fract() == 0.0 && n.is_finite() => Value::Int(n as i64),
    LuaValue::Number(n) => {
      return Err(InterpError::invalid_args(format!("Non-integral number {} is not supported.", n)));
    }
    LuaValue::String(s) => Value::Str(s.to_string_lossy()),
    LuaValue::Table(t) => table_to_value(&t)?,
    LuaValue::UserData(ud) => userdata_to_value(&ud)?,
    other => {
      return Err(InterpError::invalid_args(format!(
        "Lua values of type {} cannot be passed to builtins.",
        other.type_name()
      )));
    }
  }))
}

fn userdata_to_value(ud: &LuaAnyUserData) -> Result<Value, InterpError> {
  if let Ok(t) = ud.borrow::<LuaTarget>() {
    Ok(Value::Target(t.0.clone()))
  } else if let Ok(d) = ud.borrow::<LuaDependency>() {
    Ok(Value::Dependency(d.0.clone()))
  } else if let Ok(p) = ud.borrow::<LuaProgram>() {
    Ok(Value::Program(p.0.clone()))
  } else if let Ok(s) = ud.borrow::<LuaSubproject>() {
    Ok(Value::Subproject(s.0.clone()))
  } else if let Ok(f) = ud.borrow::<LuaFile>() {
    Ok(Value::File(f.0.clone()))
  } else if ud.is::<LuaDisabler>() {
    Ok(Value::Disabler)
  } else {
    Err(InterpError::invalid_args("Unknown userdata cannot be passed to builtins."))
  }
}

/// Tables whose keys are exactly `1..n` become lists, tables with only string
/// keys become maps.
fn table_to_value(t: &LuaTable) -> Result<Value, InterpError> {
  let (items, map) = split_table(t)?;
  match (items.is_empty(), map.is_empty()) {
    (_, true) => Ok(Value::List(items)),
    (true, false) => Ok(Value::Map(map)),
    (false, false) => Err(InterpError::invalid_args("Tables cannot mix list items and named keys.")),
  }
}

pub fn value_to_lua(lua: &Lua, value: Value) -> LuaResult<LuaValue> {
  Ok(match value {
    Value::Str(s) => LuaValue::String(lua.create_string(&s)?),
    Value::Int(i) => LuaValue::Integer(i),
    Value::Bool(b) => LuaValue::Boolean(b),
    Value::List(items) => {
      let t = lua.create_table_with_capacity(items.len(), 0)?;
      for item in items {
        t.raw_push(value_to_lua(lua, item)?)?;
      }
      LuaValue::Table(t)
    }
    Value::Map(map) => {
      let t = lua.create_table_with_capacity(0, map.len())?;
      for (k, v) in map {
        t.raw_set(k, value_to_lua(lua, v)?)?;
      }
      LuaValue::Table(t)
    }
    Value::File(f) => LuaValue::UserData(lua.create_userdata(LuaFile(f))?),
    Value::Target(t) => LuaValue::UserData(lua.create_userdata(LuaTarget(t))?),
    Value::Dependency(d) => LuaValue::UserData(lua.create_userdata(LuaDependency(d))?),
    Value::Program(p) => LuaValue::UserData(lua.create_userdata(LuaProgram(p))?),
    Value::Subproject(s) => LuaValue::UserData(lua.create_userdata(LuaSubproject(s))?),
    Value::Disabler => LuaValue::UserData(lua.create_userdata(LuaDisabler)?),
  })
}

/// Arguments of one builtin call.
#[derive(Debug)]
pub struct Args {
  func: &'static str,
  positional: VecDeque<Value>,
  kwargs: BTreeMap<String, Value>,
}

impl Args {
  /// Split `values` into positional and keyword arguments.
  ///
  /// A lone plain table is unpacked: its list part becomes the positional
  /// arguments and its string keys the keyword arguments. With several
  /// arguments, a trailing table holding only string keys is taken as the
  /// keyword arguments.
  pub fn parse(func: &'static str, values: LuaMultiValue) -> Result<Self, InterpError> {
    let mut values: Vec<LuaValue> = values.into_iter().collect();
    while values.last().is_some_and(LuaValue::is_nil) {
      values.pop();
    }
    let mut args = Self {
      func,
      positional: VecDeque::new(),
      kwargs: BTreeMap::new(),
    };

    let unpack = match values.as_slice() {
      [LuaValue::Table(_)] => true,
      [_, .., LuaValue::Table(t)] => t.raw_len() == 0 && !t.is_empty(),
      _ => false,
    };
    if unpack && let Some(LuaValue::Table(t)) = values.pop() {
      let (items, kwargs) = split_table(&t)?;
      args.positional.extend(items);
      args.kwargs = kwargs;
    }
    for value in values {
      if let Some(v) = lua_to_value(value)? {
        args.positional.push_back(v);
      }
    }
    Ok(args)
  }

  pub fn func(&self) -> &'static str {
    self.func
  }

  /// Whether any argument is (or contains) a disabler.
  pub fn is_disabled(&self) -> bool {
    self.positional.iter().any(Value::contains_disabler) || self.kwargs.values().any(Value::contains_disabler)
  }

  /// Fail on keyword arguments outside `allowed`. An entry `*_args` admits
  /// every per-language argument keyword.
  pub fn check_kwargs(&self, allowed: &[&str]) -> Result<(), InterpError> {
    let lang_args = allowed.contains(&"*_args");
    let unknown: Vec<&str> = self
      .kwargs
      .keys()
      .map(String::as_str)
      .filter(|k| !allowed.contains(k) && !(lang_args && k.ends_with("_args") && *k != "link_args"))
      .collect();
    if unknown.is_empty() {
      Ok(())
    } else {
      Err(InterpError::invalid_args(format!(
        "{}() got unknown keyword arguments \"{}\"",
        self.func,
        unknown.join("\", \"")
      )))
    }
  }

  pub fn positional_len(&self) -> usize {
    self.positional.len()
  }

  pub fn next(&mut self) -> Option<Value> {
    self.positional.pop_front()
  }

  /// The next positional argument, which must be present.
  pub fn required(&mut self, what: &str) -> Result<Value, InterpError> {
    self.next().ok_or_else(|| {
      InterpError::invalid_args(format!("{}() is missing the positional argument '{}'.", self.func, what))
    })
  }

  pub fn required_str(&mut self, what: &str) -> Result<String, InterpError> {
    let value = self.required(what)?;
    self.expect_str(what, value)
  }

  pub fn next_str(&mut self, what: &str) -> Result<Option<String>, InterpError> {
    match self.next() {
      Some(value) => self.expect_str(what, value).map(Some),
      None => Ok(None),
    }
  }

  /// All remaining positional arguments, nested lists flattened.
  pub fn rest(&mut self) -> Vec<Value> {
    self.positional.drain(..).flat_map(Value::flatten).collect()
  }

  pub fn rest_strings(&mut self, what: &str) -> Result<Vec<String>, InterpError> {
    let rest = self.rest();
    rest.into_iter().map(|v| self.expect_str(what, v)).collect()
  }

  pub fn kw(&mut self, key: &str) -> Option<Value> {
    self.kwargs.remove(key)
  }

  pub fn has_kw(&self, key: &str) -> bool {
    self.kwargs.contains_key(key)
  }

  pub fn kw_str(&mut self, key: &str) -> Result<Option<String>, InterpError> {
    match self.kw(key) {
      Some(value) => self.expect_str(key, value).map(Some),
      None => Ok(None),
    }
  }

  pub fn kw_bool(&mut self, key: &str, default: bool) -> Result<bool, InterpError> {
    match self.kw(key) {
      None => Ok(default),
      Some(Value::Bool(b)) => Ok(b),
      Some(other) => Err(self.type_error(key, "bool", &other)),
    }
  }

  pub fn kw_int(&mut self, key: &str, default: i64) -> Result<i64, InterpError> {
    match self.kw(key) {
      None => Ok(default),
      Some(Value::Int(i)) => Ok(i),
      Some(other) => Err(self.type_error(key, "int", &other)),
    }
  }

  /// A string or a (nested) list of strings.
  pub fn kw_strings(&mut self, key: &str) -> Result<Vec<String>, InterpError> {
    self.kw_list(key).into_iter().map(|v| self.expect_str(key, v)).collect()
  }

  /// A single value or a (nested) list, flattened.
  pub fn kw_list(&mut self, key: &str) -> Vec<Value> {
    self.kw(key).map(Value::flatten).unwrap_or_default()
  }

  /// A map of strings, or a list of `key=value` strings.
  pub fn kw_string_map(&mut self, key: &str) -> Result<BTreeMap<String, String>, InterpError> {
    match self.kw(key) {
      None => Ok(BTreeMap::new()),
      Some(Value::Map(map)) => map
        .into_iter()
        .map(|(k, v)| Ok((k, scalar_string(key, v)?)))
        .collect(),
      Some(other) => other
        .flatten()
        .into_iter()
        .map(|v| {
          let s = self.expect_str(key, v)?;
          s.split_once('=')
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .ok_or_else(|| InterpError::invalid_args(format!("{} must be in the form key=value, got \"{}\".", key, s)))
        })
        .collect(),
    }
  }

  pub fn kw_deps(&mut self, key: &str) -> Result<Vec<Rc<Dependency>>, InterpError> {
    self
      .kw_list(key)
      .into_iter()
      .map(|v| match v {
        Value::Dependency(d) => Ok(d),
        other => Err(self.type_error(key, "dependency", &other)),
      })
      .collect()
  }

  pub fn kw_targets(&mut self, key: &str) -> Result<Vec<Rc<BuildTarget>>, InterpError> {
    self
      .kw_list(key)
      .into_iter()
      .map(|v| match v {
        Value::Target(t) => Ok(t),
        other => Err(self.type_error(key, "build target", &other)),
      })
      .collect()
  }

  /// Remove every `<lang>_args` keyword, keyed by language.
  pub fn take_language_args(&mut self) -> Result<BTreeMap<String, Vec<String>>, InterpError> {
    let keys: Vec<String> = self
      .kwargs
      .keys()
      .filter(|k| k.ends_with("_args") && k.as_str() != "link_args")
      .cloned()
      .collect();
    let mut out = BTreeMap::new();
    for key in keys {
      let lang = key.trim_end_matches("_args").to_lowercase();
      out.insert(lang, self.kw_strings(&key)?);
    }
    Ok(out)
  }

  fn expect_str(&self, what: &str, value: Value) -> Result<String, InterpError> {
    match value {
      Value::Str(s) => Ok(s),
      other => Err(self.type_error(what, "str", &other)),
    }
  }

  pub fn type_error(&self, what: &str, expected: &str, got: &Value) -> InterpError {
    InterpError::invalid_args(format!(
      "{}() argument '{}' must be {}, not {}.",
      self.func,
      what,
      expected,
      got.type_name()
    ))
  }
}

/// Split a table into its list part and its string-keyed part.
fn split_table(t: &LuaTable) -> Result<(Vec<Value>, BTreeMap<String, Value>), InterpError> {
  let len = t.raw_len();
  let mut kwargs = BTreeMap::new();
  for pair in t.pairs::<LuaValue, LuaValue>() {
    let (key, value) = pair.map_err(lua_error)?;
    match key {
      LuaValue::Integer(i) if i >= 1 && (i as usize) <= len => {}
      LuaValue::String(s) => {
        if let Some(v) = lua_to_value(value)? {
          kwargs.insert(s.to_string_lossy(), v);
        }
      }
      other => {
        return Err(InterpError::invalid_args(format!(
          "Unsupported table key of type {}.",
          other.type_name()
        )));
      }
    }
  }
  let mut items = Vec::with_capacity(len);
  for i in 1..=len {
    let value: LuaValue = t.raw_get(i).map_err(lua_error)?;
    if let Some(v) = lua_to_value(value)? {
      items.push(v);
    }
  }
  Ok((items, kwargs))
}

fn lua_error(e: LuaError) -> InterpError {
  InterpError::invalid_args(e.to_string())
}

fn scalar_string(key: &str, value: Value) -> Result<String, InterpError> {
  match value {
    Value::Str(s) => Ok(s),
    Value::Int(i) => Ok(i.to_string()),
    Value::Bool(b) => Ok(b.to_string()),
    other => Err(InterpError::invalid_args(format!(
      "{} values must be strings, not {}.",
      key,
      other.type_name()
    ))),
  }
}
