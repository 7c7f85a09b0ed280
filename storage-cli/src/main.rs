// SPDX-License-Identifier: GPL-3.0-only

//! storagectl - inspect and monitor the storaged daemon

mod render;

use std::process::ExitCode;

use anyhow::{Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use storage_contracts::client::{BusKind, ObjectsClient};
use tracing_subscriber::{EnvFilter, fmt};

const BLOCK_INTERFACE: &str = "org.storaged.Storaged.Block";

#[derive(Debug, Parser)]
#[command(name = "storagectl")]
#[command(about = "Command-line tool for the storaged daemon")]
struct Cli {
    /// Talk to a daemon on the session bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the interfaces and properties of one object
    Info(InfoArgs),
    /// Show every object, sorted by path
    Dump,
    /// Print object and property changes as they happen
    Monitor,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct InfoArgs {
    /// Object path, absolute or relative to /org/storaged/Storaged
    #[arg(short = 'p', long)]
    object: Option<String>,

    /// Block device file or one of its symlinks
    #[arg(short = 'b', long)]
    device: Option<String>,
}

async fn info(bus: BusKind, args: InfoArgs) -> Result<()> {
    let objects = ObjectsClient::new(bus).await?.managed_objects().await?;
    let object = match (&args.object, &args.device) {
        (Some(path), _) => render::find_by_path(&objects, path)
            .ok_or_else(|| anyhow!("No object for path {path}"))?,
        (None, Some(file)) => render::find_by_device(&objects, file)
            .ok_or_else(|| anyhow!("No object for device {file}"))?,
        (None, None) => bail!("One of --object or --device is required"),
    };
    print!("{}", render::render_object(object));
    Ok(())
}

async fn dump(bus: BusKind) -> Result<()> {
    let objects = ObjectsClient::new(bus).await?.managed_objects().await?;
    for object in &objects {
        println!("{}", render::render_object(object));
    }
    Ok(())
}

async fn monitor(bus: BusKind) -> Result<()> {
    let client = ObjectsClient::new(bus).await?;
    let mut signals = Box::pin(client.signals().await?);
    println!("Monitoring the storaged daemon. Press Ctrl+C to exit.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            signal = signals.next() => match signal {
                Some(signal) => print!("{}", render::render_signal(&signal, chrono::Local::now())),
                None => bail!("Lost connection to the daemon"),
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // Help and version output are not failures
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let bus = if cli.session {
        BusKind::Session
    } else {
        BusKind::System
    };
    let result = match cli.command {
        Command::Info(args) => info(bus, args).await,
        Command::Dump => dump(bus).await,
        Command::Monitor => monitor(bus).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("storagectl failed: {e:?}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
