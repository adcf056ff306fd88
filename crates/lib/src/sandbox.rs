//! File references must stay inside the (sub)project that makes them.
//!
//! A path is resolved against the current subdirectory. Paths that leave the
//! source tree entirely are allowed (system or vendor locations). Paths inside
//! the source tree must fall inside the current project's root directory and
//! outside that project's own subproject directory.

use std::path::{Component, Path, PathBuf};

/// A file reference crossing a project boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SandboxViolation {
  #[error("Sandbox violation: Tried to grab {kind} {name} outside current (sub)project.")]
  OutsideProject { kind: &'static str, name: String },

  #[error("Sandbox violation: Tried to grab {kind} {name} from a nested subproject.")]
  NestedSubproject { kind: &'static str, name: String },
}

/// Normalize a path lexically: drop `.` components and fold `..` into the
/// preceding component. Symlinks are not resolved.
pub fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for comp in path.components() {
    match comp {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          out.push("..");
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

/// Where the current project lives inside the source tree.
#[derive(Debug, Clone, Copy)]
pub struct ProjectBounds<'a> {
  pub source_root: &'a Path,
  /// Project root relative to the source root (empty for the main project).
  pub root_subdir: &'a str,
  /// Subproject directory name relative to the project root.
  pub subproject_dir: &'a str,
}

impl ProjectBounds<'_> {
  /// Check that `fname`, referenced from `subdir`, stays inside the project.
  pub fn validate(&self, subdir: &str, fname: &str) -> Result<(), SandboxViolation> {
    let norm = normalize(&self.source_root.join(subdir).join(fname));
    let kind = if norm.is_dir() { "directory" } else { "file" };
    let name = norm
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| fname.to_string());

    let srcdir = normalize(self.source_root);
    if !norm.starts_with(&srcdir) || norm == srcdir {
      return Ok(());
    }
    let project_root = normalize(&srcdir.join(self.root_subdir));
    if norm == project_root {
      return Ok(());
    }
    if !norm.starts_with(&project_root) {
      return Err(SandboxViolation::OutsideProject { kind, name });
    }
    let subproject_dir = project_root.join(self.subproject_dir);
    if norm != subproject_dir && norm.starts_with(&subproject_dir) {
      return Err(SandboxViolation::NestedSubproject { kind, name });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn root() -> PathBuf {
    PathBuf::from("/src/proj")
  }

  #[test]
  fn normalize_folds_parent_components() {
    assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
    assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
  }

  mod subproject_scope {
    use super::*;

    fn bounds(root: &Path) -> ProjectBounds<'_> {
      ProjectBounds {
        source_root: root,
        root_subdir: "subprojects/a",
        subproject_dir: "subprojects",
      }
    }

    #[test]
    fn own_files_are_allowed() {
      let root = root();
      assert!(bounds(&root).validate("subprojects/a/src", "main.c").is_ok());
      assert!(bounds(&root).validate("subprojects/a", "../a/x.c").is_ok());
    }

    #[test]
    fn sibling_subproject_is_rejected() {
      let root = root();
      let err = bounds(&root)
        .validate("subprojects/a", "../other_subproject/file.c")
        .unwrap_err();
      assert_eq!(
        err,
        SandboxViolation::OutsideProject {
          kind: "file",
          name: "file.c".to_string()
        }
      );
    }

    #[test]
    fn parent_project_is_rejected() {
      let root = root();
      assert!(bounds(&root).validate("subprojects/a", "../../main.c").is_err());
    }

    #[test]
    fn outside_source_root_is_allowed() {
      let root = root();
      assert!(bounds(&root).validate("subprojects/a", "../../../../vendor/file.c").is_ok());
      assert!(bounds(&root).validate("subprojects/a", "/usr/include/zlib.h").is_ok());
    }

    #[test]
    fn nested_subproject_is_rejected() {
      let root = root();
      let err = bounds(&root)
        .validate("subprojects/a", "subprojects/b/b.c")
        .unwrap_err();
      assert!(matches!(err, SandboxViolation::NestedSubproject { .. }));
    }
  }

  mod main_project {
    use super::*;

    #[test]
    fn cannot_reach_into_subprojects() {
      let root = root();
      let bounds = ProjectBounds {
        source_root: &root,
        root_subdir: "",
        subproject_dir: "subprojects",
      };
      assert!(bounds.validate("", "src/main.c").is_ok());
      assert!(bounds.validate("src", "../subprojects/zlib/zlib.c").is_err());
      assert!(bounds.validate("", "../elsewhere/file.c").is_ok());
    }

    #[test]
    fn subproject_directory_itself_is_allowed() {
      let root = root();
      let bounds = ProjectBounds {
        source_root: &root,
        root_subdir: "",
        subproject_dir: "subprojects",
      };
      assert!(bounds.validate("", "subprojects").is_ok());
      assert!(bounds.validate("src", "../subprojects/").is_ok());
      assert!(bounds.validate("", "subprojects/zlib").is_err());
    }
  }
}
