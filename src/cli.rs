//! Command-line interface
//!
//! Two ways to exercise the engine without a real host: a canned two-scene
//! `demo`, and `play`, which loads a stage plan from disk and runs arbitrary
//! `load_scene` command lines against it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::application::{Application, InitBuilder};
use crate::config::Config;
use crate::registry::RunnerRegistry;
use crate::scene::SceneEvents;
use crate::stage::{Stage, StagePlan};

#[derive(Parser)]
#[command(name = "greenroom")]
#[command(about = "Scene-persistent shared variable state for dialogue runtimes", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Dump the canonical store after every rebind pass
    #[arg(long, global = true)]
    pub verbose_variables: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a built-in two-scene walkthrough
    Demo,

    /// Load a stage plan and run command lines against it
    Play {
        /// Stage plan file (TOML)
        #[arg(long)]
        plan: String,

        /// Command lines to dispatch, in order (e.g. "load_scene Chapter1 Intro")
        commands: Vec<String>,
    },
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments (for hosts that need to filter args)
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Apply CLI overrides to the environment before any config loading
    if let Some(config_path) = &cli.config {
        std::env::set_var("GREENROOM_CONFIG_PATH", config_path);
    }

    // Load once, up front; config errors surface before any command output
    let config = Config::load()?;

    match cli.command {
        Commands::Demo => run_demo(config, cli.verbose_variables).await,
        Commands::Play { plan, commands } => {
            run_play(config, &plan, commands, cli.verbose_variables).await
        }
    }
}

const DEMO_PLAN: &str = r#"
[scenes.Chapter1]
load_delay_ms = 20

[[scenes.Chapter1.runners]]
name = "narrator"
auto_start = true
start_node = "Intro"

# State the runner accumulated on its own store before the synchronizer
# reached it; the first rebind pass merges it into the canonical store.
[scenes.Chapter1.runners.seed]
numbers = { "$affinity" = 2.0 }
bools = { "$met_guide" = true }

[scenes.Chapter2]
load_delay_ms = 20

[[scenes.Chapter2.runners]]
name = "narrator"
"#;

fn stage_app(
    config: Config,
    plan: StagePlan,
    verbose_variables: bool,
) -> Result<(Application, Arc<Stage>)> {
    let registry = RunnerRegistry::new();
    let events = SceneEvents::new(config.event_capacity);
    let stage = Stage::new(plan, registry.clone(), events.clone());

    let mut builder = InitBuilder::new(stage.clone())
        .config(config)
        .registry(registry)
        .events(events);
    if verbose_variables {
        builder = builder.verbose_variables(true);
    }

    Ok((builder.init()?, stage))
}

async fn run_demo(config: Config, verbose_variables: bool) -> Result<()> {
    let plan = StagePlan::from_toml(DEMO_PLAN).context("Failed to parse built-in demo plan")?;
    let (app, stage) = stage_app(config, plan, verbose_variables)?;

    println!("Loading Chapter1 (runner auto-starts at Intro)...");
    app.dispatch("load_scene Chapter1").await?;

    let runner = stage.runner("narrator").context("Chapter1 runner missing")?;
    println!(
        "  narrator running={} node={}",
        runner.is_running(),
        runner.current_node().unwrap_or_default()
    );
    println!(
        "  store after merge: {}",
        serde_json::to_string(&app.snapshot())?
    );

    // The script writes some progress through the canonical store
    app.store().set_num("$affinity", 3.0);
    app.store().set_str("$last_scene", "Chapter1");

    println!("\nSwitching to Chapter2 at Chapter2Start...");
    app.dispatch("load_scene Chapter2 Chapter2Start").await?;

    let runner = stage.runner("narrator").context("Chapter2 runner missing")?;
    println!(
        "  narrator running={} node={}",
        runner.is_running(),
        runner.current_node().unwrap_or_default()
    );

    println!("\nRequesting the unknown scene Backstage (reported, non-fatal)...");
    if let Err(err) = app.dispatch("load_scene Backstage").await {
        println!("  {}", err);
    }

    println!("\nTransition history:");
    for record in app.director().history() {
        println!(
            "  {} -> {:?} ({:?})",
            record.scene, record.outcome, record.start_node
        );
    }

    println!(
        "\nFinal store:\n{}",
        serde_json::to_string_pretty(&app.snapshot())?
    );

    Ok(())
}

async fn run_play(
    config: Config,
    plan: &str,
    commands: Vec<String>,
    verbose_variables: bool,
) -> Result<()> {
    let plan = StagePlan::from_path(plan)?;
    let (app, _stage) = stage_app(config, plan, verbose_variables)?;

    for line in &commands {
        // Script-level failures are reported and the run continues, the same
        // way a dialogue session tolerates a command that fails to advance.
        if let Err(err) = app.dispatch(line).await {
            eprintln!("command '{}' failed: {}", line, err);
        }
    }

    println!("{}", serde_json::to_string_pretty(&app.snapshot())?);
    Ok(())
}
