//! shelver
//!
//! # What this program is
//! A command-line tool that takes freshly ripped or downloaded `.mp3` files,
//! checks that each one decodes and carries a full set of ID3 tags, tidies
//! the tag, and files it into a music library:
//!
//! `{music_root}/{Artist | comp_dir}/{Album}[/Disc N]/{NN} - {Title}[ ({Artist})].mp3`
//!
//! Files that fail a check are parked in the staging directory (`music_stage`)
//! next to a `.txt` log saying what is wrong.
//!
//! # Concurrency model
//! None. Files are handled one after another, each to completion, and two runs
//! must not share a library root at the same time.

mod config;
mod core;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};

use crate::config::{Config, DEFAULT_CONFIG_DIR, Overrides};
use crate::core::Tally;
use crate::core::decode::{CommandCheck, DecodeCheck, SymphoniaCheck};
use crate::core::pipeline::{Outcome, Shelver};

/// Validate MP3 tags and file tracks into the music library
#[derive(Parser, Debug)]
#[command(name = "shelver")]
#[command(version)]
struct Args {
    /// Read music.conf from FOLDER
    #[arg(short = 'C', long = "configdir", value_name = "FOLDER", env = "SHELVER_CONFIG_DIR", default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    /// Top level music FOLDER
    #[arg(short = 'R', long = "rootdir", value_name = "FOLDER", env = "SHELVER_MUSIC_ROOT")]
    root_dir: Option<PathBuf>,

    /// Compilation sub-folder NAME
    #[arg(short = 'M', long = "compsubdir", value_name = "NAME", env = "SHELVER_COMP_DIR")]
    comp_dir: Option<String>,

    /// Staging FOLDER for files being processed or rejected
    #[arg(short = 'S', long = "stagedir", value_name = "FOLDER", env = "SHELVER_MUSIC_STAGE")]
    stage_dir: Option<PathBuf>,

    /// External decoder command for the corruption check (e.g. "mpg123 -t -q")
    #[arg(short = 'D', long = "decode-cmd", value_name = "COMMAND", env = "SHELVER_DECODE_CMD")]
    decode_cmd: Option<String>,

    /// Log every pipeline step
    #[arg(short, long)]
    verbose: bool,

    /// MP3 files (or folders of them) to process
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "shelver=debug" } else { "shelver=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let overrides = Overrides {
        music_root: args.root_dir,
        comp_dir: args.comp_dir,
        music_stage: args.stage_dir,
        decode_cmd: args.decode_cmd,
    };
    let config = Config::load(&args.config_dir, overrides).context("Failed to load configuration")?;
    let inputs = crate::core::collect_inputs(&args.files).context("Failed to collect input files")?;
    config.prepare_dirs().context("Failed to prepare directories")?;

    info!(
        root = %config.music_root.display(),
        comp_dir = %config.comp_dir,
        stage = %config.music_stage.display(),
        "configuration loaded"
    );
    info!("{} file(s) to process", inputs.len());

    let command_check = config
        .decode_cmd
        .as_deref()
        .and_then(CommandCheck::from_command_line);
    let decoder: &dyn DecodeCheck = match &command_check {
        Some(check) => check,
        None => &SymphoniaCheck,
    };

    let mut shelver = Shelver::new(&config, decoder);
    let mut tally = Tally::default();

    for path in &inputs {
        match shelver.process_file(path) {
            Ok(outcome) => {
                report(&outcome);
                tally.record(&outcome);
            }
            Err(e) => {
                error!(path = %path.display(), "{e}");
                return Err(e).with_context(|| format!("Failed while processing {}", path.display()));
            }
        }
    }

    info!(
        placed = tally.placed,
        rejected = tally.rejected,
        unplaced = tally.unplaced,
        "run complete"
    );

    Ok(())
}

/// One line per file that still needs a human.
fn report(outcome: &Outcome) {
    match outcome {
        Outcome::Placed { log: Some(log), .. } => info!(log = %log.display(), "notes kept"),
        Outcome::Placed { path, log: None } => debug!(path = %path.display(), "clean"),
        Outcome::Rejected {
            staged,
            log,
            defects,
        } => info!(
            staged = %staged.display(),
            log = %log.display(),
            "{} defect(s)",
            defects.len()
        ),
        Outcome::Unplaced {
            staged,
            log,
            reason,
        } => info!(staged = %staged.display(), log = %log.display(), "{reason}"),
    }
}
