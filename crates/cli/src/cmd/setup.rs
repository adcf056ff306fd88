//! Implementation of the `kiln setup` command.
//!
//! Evaluates the `kiln.lua` files of a source tree into a build directory and
//! prints the project summary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::debug;

use kiln_lib::eval::evaluate_project;
use kiln_lib::graph::{BuildGraph, SubprojectInfo};
use kiln_lib::options::{EvalOptions, WrapMode};

use crate::output::{OutputFormat, print_json, print_stat, print_success, print_warning, symbols};

#[derive(Args, Debug)]
pub struct SetupArgs {
  /// Source directory holding the top-level kiln.lua
  #[arg(default_value = ".")]
  pub source: PathBuf,

  /// Build directory, created if missing
  #[arg(default_value = "build")]
  pub builddir: PathBuf,

  /// Set an option (`key=value`, or `subproject:key=value`)
  #[arg(short = 'D', value_name = "KEY=VALUE")]
  pub defines: Vec<String>,

  /// How subproject fallbacks are used
  #[arg(long, value_name = "MODE")]
  pub wrap_mode: Option<WrapMode>,

  /// Dependencies or subprojects that always use their fallback
  #[arg(long, value_delimiter = ',', value_name = "NAMES")]
  pub force_fallback_for: Vec<String>,

  /// JSON file describing dependencies installed on the system
  #[arg(long, value_name = "FILE")]
  pub system_deps: Option<PathBuf>,

  /// Do not query pkg-config for dependencies
  #[arg(long)]
  pub no_pkg_config: bool,

  /// Output format
  #[arg(short = 'o', long = "format", value_enum, default_value = "text")]
  pub output: OutputFormat,
}

impl SetupArgs {
  /// Command line flags win over the same settings given with `-D`.
  fn eval_options(&self) -> Result<EvalOptions> {
    let mut options = EvalOptions::default()
      .with_defines(&self.defines)
      .context("Invalid -D option")?;
    if let Some(mode) = self.wrap_mode {
      options.wrap_mode = mode;
    }
    if !self.force_fallback_for.is_empty() {
      options.force_fallback_for = self.force_fallback_for.clone();
    }
    options.system_deps = self.system_deps.clone();
    options.use_pkg_config = !self.no_pkg_config;
    Ok(options)
  }
}

#[derive(Serialize)]
struct SetupReport<'a> {
  project: &'a str,
  version: &'a str,
  build_dir: String,
  targets: usize,
  tests: usize,
  benchmarks: usize,
  subprojects: &'a [SubprojectInfo],
  warnings: usize,
}

pub fn cmd_setup(args: SetupArgs, verbose: bool) -> Result<()> {
  let options = args.eval_options()?;
  debug!(?options, "setup options");

  let graph = evaluate_project(&args.source, &args.builddir, options)
    .with_context(|| format!("Failed to configure {}", args.source.display()))?;
  let build_dir = dunce::canonicalize(&args.builddir).unwrap_or_else(|_| args.builddir.clone());

  if args.output.is_json() {
    let report = SetupReport {
      project: &graph.project_name,
      version: &graph.project_version,
      build_dir: build_dir.display().to_string(),
      targets: graph.targets.len(),
      tests: graph.tests.len(),
      benchmarks: graph.benchmarks.len(),
      subprojects: &graph.subprojects,
      warnings: graph.warnings,
    };
    return print_json(&report);
  }

  print_summaries(&graph);
  println!();
  print_success(&format!("Configured {} {}", graph.project_name, graph.project_version));
  print_stat("Build directory", &build_dir.display().to_string());
  print_stat("Targets", &graph.targets.len().to_string());
  print_stat("Tests", &graph.tests.len().to_string());
  if !graph.benchmarks.is_empty() {
    print_stat("Benchmarks", &graph.benchmarks.len().to_string());
  }
  print_warnings(&graph, verbose);
  Ok(())
}

fn print_summaries(graph: &BuildGraph) {
  for summary in &graph.summaries {
    println!();
    println!("{} {}", summary.project, summary.version);
    for (section, entries) in &summary.sections {
      if !section.is_empty() {
        println!();
        println!("  {}", section);
      }
      for (key, entry) in entries {
        print_stat(key, &entry.render());
      }
    }
  }
}

fn print_warnings(graph: &BuildGraph, verbose: bool) {
  if graph.warnings == 0 {
    return;
  }
  print_warning(&format!("Found {} warning(s)", graph.warnings));
  if !verbose {
    return;
  }
  for diagnostic in &graph.diagnostics {
    let origin = if diagnostic.subproject.is_empty() {
      String::new()
    } else {
      format!("[{}] ", diagnostic.subproject)
    };
    eprintln!("  {} {}{}", symbols::WARNING, origin, diagnostic.message);
  }
}

