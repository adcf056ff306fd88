use std::path::Path;

use anyhow::{Context, Result};

use kiln_lib::graph::BuildGraph;

use crate::output::{OutputFormat, print_info, print_json, symbols, truncate_id};

/// List the targets recorded by the last `kiln setup` of `builddir`.
pub fn cmd_targets(builddir: &Path, output: OutputFormat) -> Result<()> {
  let path = BuildGraph::path_in(builddir);
  if !path.is_file() {
    anyhow::bail!(
      "No build graph in {}. Run 'kiln setup' first.",
      builddir.display()
    );
  }
  let graph = BuildGraph::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;

  if output.is_json() {
    return print_json(&graph.targets);
  }
  if graph.targets.is_empty() {
    print_info("No targets defined.");
    return Ok(());
  }
  for target in &graph.targets {
    let origin = if target.subproject.is_empty() {
      String::new()
    } else {
      format!(" [{}]", target.subproject)
    };
    println!(
      "  {} {} ({}){} {}",
      symbols::INFO,
      target.name,
      target.kind.as_str(),
      origin,
      truncate_id(&target.guid)
    );
  }
  Ok(())
}
