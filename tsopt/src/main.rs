//! Transition-state search step advancer.
//!
//! Advances one reaction instance through its constrained optimization
//! procedure: `advance` performs a single step, `drive` keeps stepping until
//! the procedure is finished.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use tsopt::advance::{AdvanceSettings, StepAdvancer};
use tsopt::core::state::StepState;
use tsopt::drive::{DriveStop, drive};
use tsopt::exit_codes;
use tsopt::io::backend::QueueBackend;
use tsopt::io::config::{CONFIG_FILE, TsoptConfig, load_config, write_config};
use tsopt::io::modifier::CartesianModifier;
use tsopt::io::reaction_file::load_reaction;
use tsopt::io::template::{JinjaRenderer, install_templates};
use tsopt::logging;

const TEMPLATE_DIR: &str = "templates";

#[derive(Parser)]
#[command(
    name = "tsopt",
    version,
    about = "Transition-state search step advancer"
)]
struct Cli {
    /// Config file, relative to the working directory.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,
    /// Directory job scripts, results and the geometry log live in.
    #[arg(long, global = true, default_value = ".")]
    workdir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config and the bundled job-script templates.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Advance a reaction by one step and print the next step.
    Advance {
        /// Reaction input file (TOML).
        #[arg(long)]
        reaction: PathBuf,
        #[arg(long)]
        step: u32,
        /// Program execution command written into search scripts.
        #[arg(long = "command")]
        qc_command: String,
    },
    /// Advance a reaction repeatedly until it finishes.
    Drive {
        #[arg(long)]
        reaction: PathBuf,
        #[arg(long, default_value_t = 0)]
        step: u32,
        #[arg(long = "command")]
        qc_command: String,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config_path = cli.workdir.join(&cli.config);
    match cli.command {
        Command::Init { force } => cmd_init(&cli.workdir, &config_path, force),
        Command::Advance {
            reaction,
            step,
            qc_command,
        } => cmd_advance(&cli.workdir, &config_path, &reaction, step, &qc_command),
        Command::Drive {
            reaction,
            step,
            qc_command,
        } => cmd_drive(&cli.workdir, &config_path, &reaction, step, &qc_command),
    }
}

fn cmd_init(workdir: &Path, config_path: &Path, force: bool) -> Result<i32> {
    if force || !config_path.exists() {
        let mut cfg = TsoptConfig::default();
        cfg.paths.template_dir = Some(PathBuf::from(TEMPLATE_DIR));
        write_config(config_path, &cfg)?;
        info!(path = %config_path.display(), "config written");
    }
    let written = install_templates(&workdir.join(TEMPLATE_DIR), force)?;
    info!(count = written.len(), "templates installed");
    Ok(exit_codes::OK)
}

fn cmd_advance(
    workdir: &Path,
    config_path: &Path,
    reaction_path: &Path,
    step: u32,
    qc_command: &str,
) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let loaded = load_reaction(reaction_path)?;
    let backend = QueueBackend::from_config(&cfg, workdir);
    let renderer = renderer(&cfg, workdir)?;
    let advancer = StepAdvancer::new(
        &backend,
        &loaded.solver,
        &CartesianModifier,
        &renderer,
        AdvanceSettings::from_config(&cfg, workdir),
    );

    let state = advancer.advance(&loaded.reaction, step, qc_command)?;
    println!("{}", state.step());
    Ok(exit_code(state, loaded.reaction.max_step))
}

fn cmd_drive(
    workdir: &Path,
    config_path: &Path,
    reaction_path: &Path,
    step: u32,
    qc_command: &str,
) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let loaded = load_reaction(reaction_path)?;
    let backend = QueueBackend::from_config(&cfg, workdir);
    let renderer = renderer(&cfg, workdir)?;
    let advancer = StepAdvancer::new(
        &backend,
        &loaded.solver,
        &CartesianModifier,
        &renderer,
        AdvanceSettings::from_config(&cfg, workdir),
    );

    let outcome = drive(
        &advancer,
        &loaded.reaction,
        step,
        qc_command,
        &cfg.drive,
        |state| info!(next = state.step(), ?state, "tick"),
    )
    .with_context(|| format!("drive {}", loaded.reaction.instance_name))?;
    println!("{}", outcome.final_step);
    Ok(match outcome.stop {
        DriveStop::Finished => exit_codes::DONE,
        DriveStop::TickLimit { .. } => exit_codes::PENDING,
    })
}

fn renderer(cfg: &TsoptConfig, workdir: &Path) -> Result<JinjaRenderer> {
    let template_dir = cfg.paths.template_dir.as_ref().map(|dir| workdir.join(dir));
    JinjaRenderer::new(template_dir)
}

fn exit_code(state: StepState, max_step: u32) -> i32 {
    if state.is_done(max_step) {
        return exit_codes::DONE;
    }
    match state {
        StepState::Polling(_)
        | StepState::Finished {
            submitted: false,
            ..
        } => exit_codes::PENDING,
        _ => exit_codes::OK,
    }
}
