#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line session controller for Carillon.

mod config;
mod controller;
mod dispatcher;
mod layout_transfer;
mod logging;
mod scatter;

use std::{
    fs, io,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use carillon_core::Tempo;
use carillon_rendering::TextBackend;
use carillon_system_recorder::{self as recorder, Document, Recording, DEFAULT_PLAYBACK_FPS};
use carillon_system_tone_dispatch::{BackgroundDispatcher, ToneRouter};
use carillon_world::query;
use clap::{Parser, Subcommand};

use crate::{
    config::{load_config, DEFAULT_GRID_EDGE},
    controller::{Conductor, Replay},
    dispatcher::LoggingDispatcher,
    scatter::ScatterOptions,
};

/// Grid automaton that turns robot landings into tones.
#[derive(Debug, Parser)]
#[command(name = "carillon", version, about)]
struct Cli {
    /// Raise log verbosity; repeat for more detail. `RUST_LOG` overrides it.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Run a session file, optionally recording it.
    Run {
        /// Session file in TOML.
        session: PathBuf,
        /// Number of ticks to run.
        #[arg(long, default_value_t = 64)]
        ticks: u64,
        /// Override the tempo from the session file.
        #[arg(long)]
        tempo: Option<u32>,
        /// Record the run under this name.
        #[arg(long)]
        record: Option<String>,
        /// Directory recordings are written to.
        #[arg(long, default_value = "recordings")]
        output_dir: PathBuf,
        /// Sleep between ticks instead of running as fast as possible.
        #[arg(long)]
        realtime: bool,
        /// Do not draw the grids.
        #[arg(long)]
        quiet: bool,
    },
    /// Play back a recording or draw a saved grid.
    Play {
        /// Session or grid document in JSON.
        recording: PathBuf,
        /// Frames per second.
        #[arg(long, default_value_t = DEFAULT_PLAYBACK_FPS)]
        fps: u32,
        /// Sleep between frames instead of playing as fast as possible.
        #[arg(long)]
        realtime: bool,
        /// Do not draw the grids.
        #[arg(long)]
        quiet: bool,
    },
    /// Print a session file with robots at seeded random cells.
    Scatter {
        #[arg(long, default_value_t = DEFAULT_GRID_EDGE)]
        rows: u32,
        #[arg(long, default_value_t = DEFAULT_GRID_EDGE)]
        columns: u32,
        /// Number of robots to draw.
        #[arg(long, default_value_t = 50)]
        robots: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Write the session here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print one grid of a session file as a single-line layout string.
    Export {
        /// Session file in TOML.
        session: PathBuf,
        /// Index of the grid to export.
        #[arg(long, default_value_t = 0)]
        grid: usize,
    },
    /// Print the grid encoded in a layout string as a grid document for `play`.
    Import {
        /// Layout string produced by `export`.
        layout: String,
        /// Write the document here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Entry point for the Carillon command-line interface.
fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(command: CliCommand) -> Result<()> {
    match command {
        CliCommand::Run {
            session,
            ticks,
            tempo,
            record,
            output_dir,
            realtime,
            quiet,
        } => run(RunOptions {
            session,
            ticks,
            tempo,
            record,
            output_dir,
            realtime,
            quiet,
        }),
        CliCommand::Play {
            recording,
            fps,
            realtime,
            quiet,
        } => play(&recording, fps, realtime, quiet),
        CliCommand::Scatter {
            rows,
            columns,
            robots,
            seed,
            output,
        } => {
            let config = scatter::scatter(ScatterOptions {
                rows,
                columns,
                robots,
                seed,
            })?;
            write_output(&config.to_toml()?, output.as_deref())
        }
        CliCommand::Export { session, grid } => {
            let config = load_config(&session)?;
            let built = config.build_session().context("session file was rejected")?;
            let grids = recorder::capture_grids(&built);
            let selected = grids.get(grid).with_context(|| {
                format!(
                    "{} holds {} grids, there is no grid {grid}",
                    session.display(),
                    grids.len()
                )
            })?;
            println!("{}", layout_transfer::encode(selected)?);
            Ok(())
        }
        CliCommand::Import { layout, output } => {
            let grid = layout_transfer::decode(&layout).context("invalid layout string")?;
            let mut text = serde_json::to_string_pretty(&Document::Grid(grid))?;
            text.push('\n');
            write_output(&text, output.as_deref())
        }
    }
}

struct RunOptions {
    session: PathBuf,
    ticks: u64,
    tempo: Option<u32>,
    record: Option<String>,
    output_dir: PathBuf,
    realtime: bool,
    quiet: bool,
}

fn run(options: RunOptions) -> Result<()> {
    let config = load_config(&options.session)?;
    let session = config.build_session().context("session file was rejected")?;
    let dispatcher = BackgroundDispatcher::spawn(LoggingDispatcher::default())
        .context("failed to start the tone dispatcher")?;
    let mut conductor = Conductor::new(
        session,
        ToneRouter::with_pan(config.pan()),
        recorder::Recorder::new(&options.output_dir),
        dispatcher,
    );
    if !options.quiet {
        conductor = conductor.with_renderer(Box::new(TextBackend::new(io::stdout())));
    }
    if let Some(bpm) = options.tempo {
        let tempo = Tempo::new(bpm).with_context(|| format!("tempo {bpm} is out of range"))?;
        conductor.set_tempo(tempo);
    }

    match &options.record {
        Some(name) => {
            let saved = conductor.record(name, options.ticks, options.realtime)?;
            eprintln!(
                "saved {} frames to {}",
                saved.recording.frames.len(),
                saved.path.display()
            );
        }
        None => conductor.run(options.ticks, options.realtime)?,
    }
    eprintln!(
        "ran {} ticks, {} tones",
        query::tick_index(conductor.session()),
        conductor.tones_dispatched()
    );
    Ok(())
}

fn play(path: &Path, fps: u32, realtime: bool, quiet: bool) -> Result<()> {
    let document = recorder::read_document(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let recording = match document {
        Document::Session(recording) => recording,
        Document::Grid(grid) => Recording {
            grids: vec![grid],
            ..Recording::default()
        },
    };

    let mut replay = Replay::new(&recording, fps)?;
    if !quiet {
        replay = replay.with_renderer(Box::new(TextBackend::new(io::stdout())));
    }
    let frames = replay.run(realtime)?;
    eprintln!("played {frames} frames from {}", path.display());
    Ok(())
}

fn write_output(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("write {}", path.display()))
        }
        None => {
            print!("{text}");
            Ok(())
        }
    }
}
