//! The scheduled file-ingestion engine binary.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use ingest::{
    config,
    lake::Devnull,
    pipeline::Pipeline,
    scheduler::Scheduler,
    store::{Memory, Seed},
};
use log::{info, Level};
use stable_eyre::{eyre::Context, Result};
use stderrlog::ColorChoice;

#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cmd {
    /// The run mode for the engine.
    #[clap(subcommand)]
    mode: Mode,
}

impl Cmd {
    fn validate(self) -> Result<Self> {
        Ok(Cmd {
            mode: match self.mode {
                Mode::Daemon(opts) => Mode::Daemon(CmdDaemon {
                    engine: opts.engine.validate()?,
                }),
                Mode::Once(opts) => Mode::Once(CmdOnce {
                    engine: opts.engine.validate()?,
                }),
            },
        })
    }
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the scheduler until interrupted.
    ///
    /// Fires the ingestion pipeline every tick and the housekeeping sweep
    /// daily at midnight, dropping ticks that would overlap a running pass.
    Daemon(CmdDaemon),

    /// Run exactly one ingestion tick, then exit.
    Once(CmdOnce),
}

#[derive(Parser, Debug)]
#[clap(version, about)]
struct CmdDaemon {
    #[clap(flatten)]
    engine: config::Engine,
}

#[derive(Parser, Debug)]
#[clap(version, about)]
struct CmdOnce {
    #[clap(flatten)]
    engine: config::Engine,
}

#[tokio::main]
async fn main() -> Result<()> {
    stable_eyre::install()?;

    let cmd = Cmd::parse().validate()?;
    match cmd.mode {
        Mode::Daemon(opts) => main_daemon(opts.engine).await,
        Mode::Once(opts) => main_once(opts.engine).await,
    }
}

async fn main_daemon(engine: config::Engine) -> Result<()> {
    init_logging(&engine)?;
    info!("running in daemon mode");

    let scheduler = build(&engine)?;
    scheduler.run().await
}

async fn main_once(engine: config::Engine) -> Result<()> {
    init_logging(&engine)?;
    info!("running a single ingestion tick");

    let scheduler = build(&engine)?;
    scheduler.ingestion_tick().await;
    Ok(())
}

fn build(engine: &config::Engine) -> Result<Scheduler<Memory, Devnull>> {
    let seed = Seed::load(engine.sources()).context("load sources seed")?;
    let store = Arc::new(Memory::seeded(seed));
    let lake = Arc::new(Devnull::new());

    let pipeline = Arc::new(
        Pipeline::builder()
            .store(Arc::clone(&store))
            .lake(lake)
            .processing_root(engine.processing_root().clone())
            .upload(engine.upload())
            .build(),
    );

    Ok(Scheduler::new(
        pipeline,
        store,
        engine.processing_root().clone(),
        engine.retention(),
        Duration::from_secs(engine.tick_seconds()),
    ))
}

/// Configures the global logger for the application based on self.
fn init_logging(engine: &config::Engine) -> Result<()> {
    stderrlog::new()
        .module(module_path!())
        .module("ingest")
        .module("archive")
        .color(ColorChoice::Never)
        .verbosity(if engine.debug() {
            Level::Debug
        } else {
            Level::Info
        })
        .init()?;
    Ok(())
}
