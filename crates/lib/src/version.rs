//! Version strings and constraint lists.
//!
//! Versions are compared component-wise: a version string is split into runs
//! of digits and runs of letters (everything else separates components),
//! numeric runs compare numerically, a letter run sorts before a number run,
//! and when all shared components match the longer version is greater. So
//! `1.2 < 1.2.0 < 1.2.1` and `1.0rc1 < 1.0.1`.
//!
//! A constraint is an optional operator (`>=`, `<=`, `!=`, `==`, `=`, `>`,
//! `<`) followed by a version; a bare version means equality. A constraint
//! list matches only when every constraint matches, and the empty list always
//! matches.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::consts::UNDEFINED_VERSION;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Component {
  // Declared first so that letters sort before numbers.
  Alpha(String),
  Num(u64),
}

/// A parsed version, ordered the way release versions are expected to sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
  raw: String,
  parts: Vec<Component>,
}

impl Version {
  pub fn parse(raw: &str) -> Self {
    let mut parts = Vec::new();
    let mut chars = raw.chars().peekable();
    while let Some(&c) = chars.peek() {
      if c.is_ascii_digit() {
        let mut run = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
          run.push(d);
          chars.next();
        }
        parts.push(Component::Num(run.parse().unwrap_or(u64::MAX)));
      } else if c.is_ascii_alphabetic() {
        let mut run = String::new();
        while let Some(&a) = chars.peek().filter(|a| a.is_ascii_alphabetic()) {
          run.push(a);
          chars.next();
        }
        parts.push(Component::Alpha(run));
      } else {
        chars.next();
      }
    }
    Self {
      raw: raw.to_string(),
      parts,
    }
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }
}

impl Ord for Version {
  fn cmp(&self, other: &Self) -> Ordering {
    self.parts.cmp(&other.parts)
  }
}

impl PartialOrd for Version {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
  Ge,
  Le,
  Ne,
  Eq,
  Gt,
  Lt,
}

fn split_constraint(constraint: &str) -> (Op, &str) {
  let constraint = constraint.trim();
  for (prefix, op) in [(">=", Op::Ge), ("<=", Op::Le), ("!=", Op::Ne), ("==", Op::Eq)] {
    if let Some(rest) = constraint.strip_prefix(prefix) {
      return (op, rest);
    }
  }
  for (prefix, op) in [("=", Op::Eq), (">", Op::Gt), ("<", Op::Lt)] {
    if let Some(rest) = constraint.strip_prefix(prefix) {
      return (op, rest);
    }
  }
  (Op::Eq, constraint)
}

/// Check a single constraint such as `">=1.3"` against `found`.
pub fn version_compare(found: &str, constraint: &str) -> bool {
  let (op, wanted) = split_constraint(constraint);
  let ord = Version::parse(found).cmp(&Version::parse(wanted));
  match op {
    Op::Ge => ord != Ordering::Less,
    Op::Le => ord != Ordering::Greater,
    Op::Ne => ord != Ordering::Equal,
    Op::Eq => ord == Ordering::Equal,
    Op::Gt => ord == Ordering::Greater,
    Op::Lt => ord == Ordering::Less,
  }
}

/// Outcome of checking a version against a list of constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionCheck {
  /// Constraints the version failed.
  pub not_found: Vec<String>,
  /// Constraints the version satisfied.
  pub found: Vec<String>,
}

impl VersionCheck {
  pub fn ok(&self) -> bool {
    self.not_found.is_empty()
  }
}

/// Check `found` against every constraint in `constraints`.
pub fn version_compare_many<S: AsRef<str>>(found: &str, constraints: &[S]) -> VersionCheck {
  let mut check = VersionCheck::default();
  for c in constraints {
    let c = c.as_ref();
    if version_compare(found, c) {
      check.found.push(c.to_string());
    } else {
      check.not_found.push(c.to_string());
    }
  }
  check
}

/// Whether a discovered version satisfies the requested constraint list.
///
/// An empty list always matches; an `"undefined"` version never satisfies a
/// non-empty list.
pub fn version_satisfies<S: AsRef<str>>(found: &str, constraints: &[S]) -> bool {
  if constraints.is_empty() {
    return true;
  }
  if found == UNDEFINED_VERSION {
    return false;
  }
  version_compare_many(found, constraints).ok()
}

static VERSION_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)+").ok());

/// Pull the first dotted number out of arbitrary text, e.g. `--version` output.
pub fn search_version(text: &str) -> Option<String> {
  let re = VERSION_RE.as_ref()?;
  re.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  mod ordering {
    use super::*;

    #[test]
    fn numeric_components_compare_numerically() {
      assert!(Version::parse("1.10") > Version::parse("1.9"));
      assert!(Version::parse("2") > Version::parse("1.99.99"));
    }

    #[test]
    fn longer_version_is_greater_when_prefix_matches() {
      assert!(Version::parse("1.2") < Version::parse("1.2.0"));
      assert_eq!(Version::parse("1.2.0").cmp(&Version::parse("1-2-0")), Ordering::Equal);
    }

    #[test]
    fn letters_sort_before_numbers() {
      assert!(Version::parse("1.0rc1") < Version::parse("1.0.1"));
      assert!(Version::parse("1.0a") < Version::parse("1.0b"));
    }
  }

  mod constraints {
    use super::*;

    #[test]
    fn operators() {
      assert!(version_compare("1.2.0", ">=1.0"));
      assert!(!version_compare("1.2.0", ">=1.3"));
      assert!(version_compare("1.2.0", "<1.3"));
      assert!(version_compare("1.2.0", "<=1.2.0"));
      assert!(version_compare("1.2.0", "!=1.2.1"));
      assert!(version_compare("1.2.0", "==1.2.0"));
      assert!(version_compare("1.2.0", "=1.2.0"));
      assert!(version_compare("1.2.1", "> 1.2.0"));
    }

    #[test]
    fn bare_version_means_equality() {
      assert!(version_compare("2.0", "2.0"));
      assert!(!version_compare("2.0.1", "2.0"));
    }

    #[test]
    fn compare_many_reports_failures() {
      let check = version_compare_many("1.2.0", &[">=1.0", ">=1.3", "<2"]);
      assert!(!check.ok());
      assert_eq!(check.not_found, vec![">=1.3"]);
      assert_eq!(check.found, vec![">=1.0", "<2"]);
    }

    #[test]
    fn empty_list_always_matches() {
      let empty: [&str; 0] = [];
      assert!(version_satisfies("1.0", &empty));
      assert!(version_satisfies(UNDEFINED_VERSION, &empty));
    }

    #[test]
    fn undefined_never_satisfies_constraints() {
      assert!(!version_satisfies(UNDEFINED_VERSION, &[">=0"]));
    }
  }

  #[test]
  fn search_version_finds_first_dotted_number() {
    assert_eq!(search_version("pkg-config 0.29.2\n"), Some("0.29.2".to_string()));
    assert_eq!(search_version("tool v1.4. built 2024"), Some("1.4".to_string()));
    assert_eq!(search_version("no version here 42"), None);
    assert_eq!(search_version("gcc (GCC) 13.2.1 20230801"), Some("13.2.1".to_string()));
  }
}
