use std::rc::Rc;

use super::Interpreter;
use crate::error::InterpError;
use crate::graph::{Summary, SummaryEntry};
use crate::subproject::Subproject;
use crate::value::Value;

/// Arguments of `summary()`.
#[derive(Debug, Clone, Default)]
pub struct SummaryRequest {
  pub section: String,
  pub entries: Vec<(String, Value)>,
  /// Render booleans as `YES`/`NO`.
  pub bool_yn: bool,
  pub list_sep: Option<String>,
}

impl Interpreter {
  /// `summary()`: add entries to this project's summary.
  pub fn summary(&mut self, req: SummaryRequest) -> Result<(), InterpError> {
    self.require_project("summary")?;
    let mut rendered = Vec::with_capacity(req.entries.len());
    for (key, value) in &req.entries {
      let values = render_value(value, req.bool_yn)?;
      rendered.push((
        key.clone(),
        SummaryEntry {
          values,
          list_sep: req.list_sep.clone(),
        },
      ));
    }
    let summary = self.project_summary();
    for (key, entry) in rendered {
      summary.add(&req.section, &key, entry).map_err(InterpError::InvalidArguments)?;
    }
    Ok(())
  }

  fn project_summary(&mut self) -> &mut Summary {
    let name = self.ctx.display_name().to_string();
    let version = self.ctx.project_version().to_string();
    self
      .fragment
      .summaries
      .entry(self.ctx.subproject.clone())
      .or_insert_with(|| Summary::new(&name, &version))
  }

  /// Add the "Subprojects" section listing every subproject seen in this run
  /// and whether it was usable.
  pub fn summarize_subprojects(&mut self) {
    let mut handles: Vec<Rc<Subproject>> = self.session().subprojects.handles().cloned().collect();
    if handles.is_empty() {
      return;
    }
    handles.sort_by(|a, b| a.name.cmp(&b.name));
    let summary = self.project_summary();
    for handle in handles {
      let mut values = vec![yes_no(handle.found())];
      if let Some(reason) = handle.disabled_reason() {
        values.push(reason.to_string());
      } else if let Some(err) = handle.exception() {
        values.push(err.to_string());
      } else if handle.warnings > 0 {
        values.push(format!("{} warnings", handle.warnings));
      }
      let entry = SummaryEntry {
        values,
        list_sep: Some(" ".to_string()),
      };
      // Keys are unique: the cache holds one handle per name.
      let _ = summary.add("Subprojects", &handle.name, entry);
    }
  }
}

fn yes_no(b: bool) -> String {
  if b { "YES" } else { "NO" }.to_string()
}

fn render_value(value: &Value, bool_yn: bool) -> Result<Vec<String>, InterpError> {
  Ok(match value {
    Value::Str(s) => vec![s.clone()],
    Value::Int(i) => vec![i.to_string()],
    Value::Bool(b) if bool_yn => vec![yes_no(*b)],
    Value::Bool(b) => vec![b.to_string()],
    Value::File(f) => vec![f.relative_path()],
    Value::Dependency(d) if d.found() => vec![format!("YES {}", d.version())],
    Value::Program(p) if p.found() => vec![p.path_string()],
    Value::Dependency(_) | Value::Program(_) => vec![yes_no(false)],
    Value::List(items) => {
      let mut out = Vec::new();
      for item in items {
        out.extend(render_value(item, bool_yn)?);
      }
      out
    }
    other => {
      return Err(InterpError::invalid_args(format!(
        "Summary value types are string, int, bool, file, dependency, external program or lists of those, not {}.",
        other.type_name()
      )));
    }
  })
}
