//! Staged codemod runner.
//!
//! Reads a project directory into memory, runs the configured stages against
//! scratch copies of it, and writes changed files back.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use codemod::core::histogram::FALLBACK_PARSER;
use codemod::core::plan::{CommandTemplate, ToolVersion};
use codemod::core::recipe::Recipe;
use codemod::error::StageError;
use codemod::exit_codes;
use codemod::io::config::{CodemodConfig, DEFAULT_CONFIG_FILE, StageDef, load_config, write_config};
use codemod::io::executor::ProcessExecutor;
use codemod::io::ingest::{ingest_project, write_back};
use codemod::logging;
use codemod::orchestrator::{PlannedStep, StageRun, plan_steps};
use codemod::pipeline::run_pipeline;
use codemod::stage::{LOGS_DIR_NAME, MODULES_DIR_NAME, REPO_DIR_NAME, StageReport};

#[derive(Parser)]
#[command(name = "codemod", version, about = "Staged codemod runner for Node-based projects")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `codemod.toml` if missing.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Run every configured stage against a project directory.
    Run {
        #[arg(long)]
        project: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Report changes without writing them back.
        #[arg(long)]
        dry_run: bool,
        /// Print stage reports as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the commands a stage would execute.
    Plan {
        #[arg(long, value_enum)]
        recipe: RecipeName,
        #[arg(long)]
        version: Option<String>,
        #[arg(long, default_value = FALLBACK_PARSER)]
        parser: String,
        /// Tool package for the custom recipe.
        #[arg(long)]
        package: Option<String>,
        /// Primary command for the custom recipe.
        #[arg(last = true)]
        command: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RecipeName {
    NgUpdate,
    AngularCli,
    Custom,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_code(&err));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<StageError>()
        .map_or(exit_codes::INVALID, StageError::exit_code)
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Run {
            project,
            config,
            dry_run,
            json,
        } => cmd_run(&project, &config, dry_run, json),
        Command::Plan {
            recipe,
            version,
            parser,
            package,
            command,
        } => {
            let recipe = build_recipe(recipe, version, package, command)?;
            cmd_plan(&recipe, &parser)
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if !force && path.exists() {
        return Ok(());
    }
    let cfg = CodemodConfig {
        stages: vec![StageDef::NgUpdate { version: None }],
        ..CodemodConfig::default()
    };
    write_config(path, &cfg)
}

fn cmd_run(project: &Path, config_path: &Path, dry_run: bool, json: bool) -> Result<()> {
    let cfg = load_config(config_path)?;
    if cfg.stages.is_empty() {
        bail!("no stages configured in {}", config_path.display());
    }
    let scratch = cfg.scratch_root();
    fs::create_dir_all(&scratch)
        .with_context(|| format!("create scratch root {}", scratch.display()))?;

    let original = ingest_project(project)?;
    let outcome = run_pipeline(&cfg, original.clone(), &ProcessExecutor)?;

    let written = if dry_run {
        Vec::new()
    } else {
        write_back(project, &original, &outcome.entries)?
    };

    if json {
        let summary = RunSummary {
            stages: &outcome.reports,
            changed: outcome
                .changed(&original)
                .map(|entry| entry.path.clone())
                .collect(),
            written,
            dry_run,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("serialize run summary")?
        );
    } else {
        for report in &outcome.reports {
            println!("{}", report_line(report));
        }
        for path in outcome.changed(&original).map(|entry| &entry.path) {
            println!("changed {}", path.display());
        }
    }
    Ok(())
}

fn cmd_plan(recipe: &Recipe, parser: &str) -> Result<()> {
    println!("{}", plan_header(recipe));
    for step in planned_steps(recipe, parser) {
        println!("{}: {}", step.label, step.argv.join(" "));
    }
    Ok(())
}

fn plan_header(recipe: &Recipe) -> String {
    format!("# {}: {}", recipe.display_name(), recipe.description())
}

/// Steps for `recipe` against placeholder stage directories.
fn planned_steps(recipe: &Recipe, parser: &str) -> Vec<PlannedStep> {
    let cfg = CodemodConfig::default();
    let stage = PathBuf::from("<stage>");
    let stage_dir = stage.join(REPO_DIR_NAME);
    let modules_dir = stage.join(MODULES_DIR_NAME);
    let logs_dir = stage.join(LOGS_DIR_NAME);
    let primary = recipe.primary_command();
    let tool_package = recipe.tool_package();
    let run = StageRun {
        stage_dir: &stage_dir,
        modules_dir: &modules_dir,
        logs_dir: &logs_dir,
        primary: &primary,
        tool_package: &tool_package,
        use_legacy_shim: recipe.use_legacy_shim(cfg.node.legacy_threshold),
        parser,
    };
    plan_steps(&run, &cfg)
}

fn build_recipe(
    name: RecipeName,
    version: Option<String>,
    package: Option<String>,
    command: Vec<String>,
) -> Result<Recipe> {
    let version = ToolVersion::new(version);
    Ok(match name {
        RecipeName::NgUpdate => Recipe::NgUpdate { version },
        RecipeName::AngularCli => Recipe::AngularCli { version },
        RecipeName::Custom => {
            let Some(package) = package else {
                bail!("--package is required for the custom recipe");
            };
            Recipe::Custom {
                version,
                command: CommandTemplate::new(command),
                package,
            }
        }
    })
}

fn report_line(report: &StageReport) -> String {
    format!(
        "stage {} {}: parser={} modified={} created={}{}",
        report.position,
        report.recipe,
        report.parser,
        report.modified.len(),
        report.created.len(),
        if report.output.is_none() { " (no-op)" } else { "" }
    )
}

#[derive(Serialize)]
struct RunSummary<'a> {
    stages: &'a [StageReport],
    changed: Vec<PathBuf>,
    written: Vec<PathBuf>,
    dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_flags() {
        let cli = Cli::parse_from(["codemod", "run", "--project", "app", "--dry-run", "--json"]);
        match cli.command {
            Command::Run {
                project,
                config,
                dry_run,
                json,
            } => {
                assert_eq!(project, PathBuf::from("app"));
                assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_FILE));
                assert!(dry_run);
                assert!(json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_plan_defaults_parser() {
        let cli = Cli::parse_from(["codemod", "plan", "--recipe", "ng-update"]);
        assert!(matches!(
            cli.command,
            Command::Plan {
                recipe: RecipeName::NgUpdate,
                version: None,
                ref parser,
                ..
            } if parser == FALLBACK_PARSER
        ));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["codemod", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, .. }));
    }

    #[test]
    fn custom_recipe_requires_package() {
        let err = build_recipe(RecipeName::Custom, None, None, vec!["tool".into()]).unwrap_err();
        assert!(err.to_string().contains("--package"));
    }

    #[test]
    fn plan_uses_shim_for_old_versions() {
        let recipe = build_recipe(RecipeName::NgUpdate, Some("14".into()), None, Vec::new())
            .expect("recipe");
        let steps = planned_steps(&recipe, "ts");
        assert_eq!(steps.len(), 4);
        assert_eq!(
            steps[3].argv,
            ["nvm-exec", "ng", "update", "@angular/cli@14", "@angular/core@14"]
        );
    }

    #[test]
    fn plan_header_describes_recipe() {
        let recipe = build_recipe(RecipeName::AngularCli, None, None, Vec::new()).expect("recipe");
        assert_eq!(
            plan_header(&recipe),
            "# Apply Angular CLI: Run `npx @angular/cli update` for Angular CLI and Angular Core."
        );
    }

    #[test]
    fn stage_errors_map_to_exit_codes() {
        let err = anyhow::Error::new(StageError::MissingProjectMarker {
            marker: "angular.json".into(),
            dir: PathBuf::from("/tmp/repo"),
        });
        assert_eq!(exit_code(&err), exit_codes::MISSING_MARKER);
        assert_eq!(exit_code(&anyhow::anyhow!("bad config")), exit_codes::INVALID);
    }
}
