//! Locating subproject sources.
//!
//! A project's subproject directory (`subprojects/` by default) may contain
//! plain directories and `.wrap` files. A wrap file is an INI document whose
//! first section (`[wrap-file]`, `[wrap-git]`, ...) describes where sources
//! come from and whose optional `[provide]` section maps dependency and
//! program names to the subproject:
//!
//! ```ini
//! [wrap-file]
//! directory = zlib-1.3
//!
//! [provide]
//! zlib = zlib_dep
//! dependency_names = zlib-ng
//! program_names = minigzip
//! ```
//!
//! Every package provides a dependency named after itself. Sources described
//! by a wrap are expected inside the main project's subproject directory;
//! sources are never downloaded, so a wrap whose directory is missing fails
//! to resolve.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::consts::{BUILD_FILENAME, WRAP_EXTENSION};

/// The only subproject method this interpreter evaluates.
pub const SUBPROJECT_METHOD: &str = "kiln";

const KNOWN_WRAP_TYPES: &[&str] = &["file", "git", "hg", "svn"];
const IGNORED_DIRS: &[&str] = &["packagecache", "packagefiles"];

/// Errors from wrap parsing and subproject resolution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WrapError {
  #[error("Neither a subproject directory nor a {0}.wrap file was found.")]
  NotFound(String),

  #[error("Subproject exists but has no {BUILD_FILENAME} file: {dir}")]
  MissingBuildFile { dir: String },

  #[error("Path already exists but is not a directory: {dir}")]
  NotADirectory { dir: String },

  #[error("Subproject '{name}' (wrap-{wrap_type}) is not present at {dir} and downloading sources is not supported")]
  Unavailable {
    name: String,
    wrap_type: String,
    dir: String,
  },

  #[error("Only the \"{SUBPROJECT_METHOD}\" method is supported for subprojects, got \"{0}\"")]
  UnsupportedMethod(String),

  #[error("Unknown wrap type 'wrap-{wrap_type}' in {file}")]
  UnknownType { wrap_type: String, file: String },

  #[error("'{section}' is not a valid first section in {file}")]
  InvalidFirstSection { section: String, file: String },

  #[error("{file}:{line}: {message}")]
  Parse { file: String, line: usize, message: String },

  #[error("failed to read {path}: {message}")]
  Read { path: String, message: String },

  #[error("Multiple wrap files provide '{name}' dependency: {first} and {second}")]
  DuplicateDependencyProvider { name: String, first: String, second: String },

  #[error("Multiple wrap files provide '{name}' program: {first} and {second}")]
  DuplicateProgramProvider { name: String, first: String, second: String },

  #[error(
    "Empty dependency variable name for '{name}' in {file}. If the subproject uses kiln.override_dependency() it can be added in the \"dependency_names\" special key."
  )]
  EmptyVariable { name: String, file: String },
}

/// How newly loaded wraps combine with the ones already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
  /// Replace everything (the root project's wraps).
  Install,
  /// Add entries not already known (a subproject's wraps).
  Merge,
}

/// Source-resolution collaborator used by the subproject engine.
pub trait SourceResolver {
  /// Produce the on-disk directory of subproject `name`, relative to the
  /// source root.
  fn resolve(&mut self, name: &str, method: &str) -> Result<String, WrapError>;

  /// Which subproject provides dependency `name`, and through which variable
  /// (`None` means the subproject overrides the dependency itself).
  fn find_dependency_provider(&self, name: &str) -> Option<(String, Option<String>)>;

  /// Which subproject provides any of the programs in `names`.
  fn find_program_provider(&self, names: &[String]) -> Option<String>;

  /// Load the wraps of the subproject directory `subdir` (relative to the source root).
  fn load_wraps(&mut self, subdir: &str, mode: LoadMode) -> Result<(), WrapError>;
}

/// A subproject known through a wrap file or a bare directory.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDefinition {
  pub name: String,
  /// The wrap file, or the directory itself for bare directories.
  pub filename: PathBuf,
  /// `None` for bare directories.
  pub wrap_type: Option<String>,
  pub directory: String,
  pub provided_deps: BTreeMap<String, Option<String>>,
  pub provided_programs: Vec<String>,
}

impl PackageDefinition {
  fn from_directory(path: &Path) -> Self {
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let mut provided_deps = BTreeMap::new();
    provided_deps.insert(name.to_lowercase(), None);
    Self {
      directory: name.clone(),
      name,
      filename: path.to_path_buf(),
      wrap_type: None,
      provided_deps,
      provided_programs: Vec::new(),
    }
  }

  /// Parse a `.wrap` file.
  pub fn from_wrap_file(path: &Path) -> Result<Self, WrapError> {
    let file = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| WrapError::Read {
      path: file.clone(),
      message: e.to_string(),
    })?;
    let name = path
      .file_stem()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    Self::parse(&name, path, &content)
  }

  fn parse(name: &str, path: &Path, content: &str) -> Result<Self, WrapError> {
    let file = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let sections = parse_ini(content).map_err(|(line, message)| WrapError::Parse {
      file: file.clone(),
      line,
      message,
    })?;

    let Some((first, values)) = sections.first() else {
      return Err(WrapError::InvalidFirstSection {
        section: String::new(),
        file,
      });
    };
    let Some(wrap_type) = first.strip_prefix("wrap-") else {
      return Err(WrapError::InvalidFirstSection {
        section: first.clone(),
        file,
      });
    };
    if !KNOWN_WRAP_TYPES.contains(&wrap_type) {
      return Err(WrapError::UnknownType {
        wrap_type: wrap_type.to_string(),
        file,
      });
    }

    let directory = values.get("directory").cloned().unwrap_or_else(|| name.to_string());
    let mut def = Self {
      name: name.to_string(),
      filename: path.to_path_buf(),
      wrap_type: Some(wrap_type.to_string()),
      directory,
      provided_deps: BTreeMap::new(),
      provided_programs: Vec::new(),
    };
    def.provided_deps.insert(name.to_lowercase(), None);

    if let Some(provide) = sections.get("provide") {
      for (key, value) in provide {
        match key.as_str() {
          "dependency_names" => {
            for n in split_names(value) {
              def.provided_deps.insert(n.to_lowercase(), None);
            }
          }
          "program_names" => def.provided_programs.extend(split_names(value)),
          _ if value.is_empty() => {
            return Err(WrapError::EmptyVariable {
              name: key.clone(),
              file,
            });
          }
          _ => {
            def.provided_deps.insert(key.clone(), Some(value.clone()));
          }
        }
      }
    }
    Ok(def)
  }

  fn has_wrap(&self) -> bool {
    self.wrap_type.is_some()
  }

  fn basename(&self) -> String {
    self
      .filename
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default()
  }
}

fn split_names(value: &str) -> Vec<String> {
  value
    .split(',')
    .map(|n| n.trim().to_string())
    .filter(|n| !n.is_empty())
    .collect()
}

type IniSections = IndexMap<String, IndexMap<String, String>>;

/// Minimal INI reader: `[section]` headers, `key = value` (or `key: value`)
/// pairs, `#`/`;` comments, and indented continuation lines. Keys are
/// lower-cased.
fn parse_ini(content: &str) -> Result<IniSections, (usize, String)> {
  let mut sections: IniSections = IndexMap::new();
  let mut current: Option<String> = None;
  let mut last_key: Option<String> = None;

  for (idx, raw) in content.lines().enumerate() {
    let lineno = idx + 1;
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
      continue;
    }
    if raw.starts_with([' ', '\t'])
      && let (Some(section), Some(key)) = (&current, &last_key)
    {
      if let Some(value) = sections.get_mut(section).and_then(|s| s.get_mut(key)) {
        if !value.is_empty() {
          value.push('\n');
        }
        value.push_str(trimmed);
      }
      continue;
    }
    if let Some(header) = trimmed.strip_prefix('[') {
      let Some(name) = header.strip_suffix(']') else {
        return Err((lineno, format!("malformed section header: {}", trimmed)));
      };
      let name = name.trim().to_string();
      sections.entry(name.clone()).or_default();
      current = Some(name);
      last_key = None;
      continue;
    }
    let Some(section) = &current else {
      return Err((lineno, "key outside of any section".to_string()));
    };
    let Some(split) = trimmed.find(['=', ':']) else {
      return Err((lineno, format!("expected 'key = value', got: {}", trimmed)));
    };
    let key = trimmed[..split].trim().to_lowercase();
    let value = trimmed[split + 1..].trim().to_string();
    if let Some(entries) = sections.get_mut(section) {
      entries.insert(key.clone(), value);
    }
    last_key = Some(key);
  }
  Ok(sections)
}

/// Resolver backed by wrap files and directories under subproject directories.
#[derive(Debug, Clone)]
pub struct WrapResolver {
  source_root: PathBuf,
  /// Main project's subproject directory, relative to the source root.
  subdir_root: String,
  wraps: IndexMap<String, PackageDefinition>,
  /// Dependency name to providing wrap name.
  provided_deps: BTreeMap<String, String>,
  /// Program name to providing wrap name.
  provided_programs: BTreeMap<String, String>,
}

impl WrapResolver {
  /// A resolver that knows no wraps yet.
  pub fn empty(source_root: &Path, subdir_root: &str) -> Self {
    Self {
      source_root: source_root.to_path_buf(),
      subdir_root: subdir_root.to_string(),
      wraps: IndexMap::new(),
      provided_deps: BTreeMap::new(),
      provided_programs: BTreeMap::new(),
    }
  }

  /// Load every wrap and bare directory found in `subdir_root`.
  pub fn new(source_root: &Path, subdir_root: &str) -> Result<Self, WrapError> {
    let mut resolver = Self::empty(source_root, subdir_root);
    let dir = source_root.join(subdir_root);
    if !dir.is_dir() {
      return Ok(resolver);
    }

    let read_err = |e: std::io::Error| WrapError::Read {
      path: dir.display().to_string(),
      message: e.to_string(),
    };
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for entry in fs::read_dir(&dir).map_err(read_err)? {
      let entry = entry.map_err(read_err)?;
      let path = entry.path();
      if path.is_dir() {
        dirs.push(path);
      } else if path.extension().is_some_and(|e| e == WRAP_EXTENSION) {
        files.push(path);
      }
    }
    files.sort();
    dirs.sort();

    for file in files {
      let wrap = PackageDefinition::from_wrap_file(&file)?;
      dirs.retain(|d| d.file_name().is_none_or(|n| n.to_string_lossy() != wrap.directory));
      resolver.wraps.insert(wrap.name.clone(), wrap);
    }
    for d in dirs {
      let wrap = PackageDefinition::from_directory(&d);
      if IGNORED_DIRS.contains(&wrap.name.as_str()) || resolver.wraps.contains_key(&wrap.name) {
        continue;
      }
      resolver.wraps.insert(wrap.name.clone(), wrap);
    }

    for wrap in resolver.wraps.values() {
      for dep in wrap.provided_deps.keys() {
        if let Some(prev) = resolver.provided_deps.get(dep) {
          return Err(WrapError::DuplicateDependencyProvider {
            name: dep.clone(),
            first: resolver.wraps[prev].basename(),
            second: wrap.basename(),
          });
        }
        resolver.provided_deps.insert(dep.clone(), wrap.name.clone());
      }
      for prog in &wrap.provided_programs {
        if let Some(prev) = resolver.provided_programs.get(prog) {
          return Err(WrapError::DuplicateProgramProvider {
            name: prog.clone(),
            first: resolver.wraps[prev].basename(),
            second: wrap.basename(),
          });
        }
        resolver.provided_programs.insert(prog.clone(), wrap.name.clone());
      }
    }
    debug!(subdir = subdir_root, wraps = resolver.wraps.len(), "loaded wraps");
    Ok(resolver)
  }

  /// Add entries of `other` that are not known yet. First definition wins.
  pub fn merge(&mut self, other: WrapResolver) {
    for (k, v) in other.wraps {
      self.wraps.entry(k).or_insert(v);
    }
    for (k, v) in other.provided_deps {
      self.provided_deps.entry(k).or_insert(v);
    }
    for (k, v) in other.provided_programs {
      self.provided_programs.entry(k).or_insert(v);
    }
  }

  pub fn wrap(&self, name: &str) -> Option<&PackageDefinition> {
    self.wraps.get(name)
  }

  fn relative(&self, path: &Path) -> String {
    let rel = path.strip_prefix(&self.source_root).unwrap_or(path);
    rel
      .components()
      .map(|c| c.as_os_str().to_string_lossy().into_owned())
      .collect::<Vec<_>>()
      .join("/")
  }
}

impl SourceResolver for WrapResolver {
  fn resolve(&mut self, name: &str, method: &str) -> Result<String, WrapError> {
    if method != SUBPROJECT_METHOD {
      return Err(WrapError::UnsupportedMethod(method.to_string()));
    }
    let wrap = self.wraps.get(name).ok_or_else(|| WrapError::NotFound(name.to_string()))?;

    let dirname = if wrap.has_wrap() {
      self.source_root.join(&self.subdir_root).join(&wrap.directory)
    } else {
      wrap.filename.clone()
    };
    let rel_path = self.relative(&dirname);

    if dirname.join(BUILD_FILENAME).is_file() {
      return Ok(rel_path);
    }
    if dirname.exists() {
      if !dirname.is_dir() {
        return Err(WrapError::NotADirectory { dir: rel_path });
      }
      return Err(WrapError::MissingBuildFile { dir: rel_path });
    }
    match &wrap.wrap_type {
      Some(wrap_type) => {
        info!(subproject = name, dir = %rel_path, "subproject sources are not present");
        Err(WrapError::Unavailable {
          name: name.to_string(),
          wrap_type: wrap_type.clone(),
          dir: rel_path,
        })
      }
      None => Err(WrapError::NotFound(name.to_string())),
    }
  }

  fn find_dependency_provider(&self, name: &str) -> Option<(String, Option<String>)> {
    let name = name.to_lowercase();
    let wrap = self.wraps.get(self.provided_deps.get(&name)?)?;
    let var = wrap.provided_deps.get(&name).cloned().flatten();
    Some((wrap.name.clone(), var))
  }

  fn find_program_provider(&self, names: &[String]) -> Option<String> {
    names.iter().find_map(|n| self.provided_programs.get(n).cloned())
  }

  fn load_wraps(&mut self, subdir: &str, mode: LoadMode) -> Result<(), WrapError> {
    let loaded = WrapResolver::new(&self.source_root, subdir)?;
    match mode {
      LoadMode::Install => *self = loaded,
      LoadMode::Merge => self.merge(loaded),
    }
    Ok(())
  }
}
