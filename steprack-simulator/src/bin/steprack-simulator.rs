// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Standalone simulator: serve an emulated StepRack controller on a TCP
//! port for manual testing and demos.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use steprack_simulator::{load_axes, reference_axes, Simulator};

#[derive(Parser)]
#[command(name = "steprack-simulator", about = "Emulated StepRack controller")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:5000")]
    bind: String,

    /// JSON axis configuration file; the built-in reference axis set is
    /// used when omitted.
    #[arg(long)]
    axes: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let axes = match &args.axes {
        Some(path) => load_axes(path).with_context(|| format!("loading {}", path.display()))?,
        None => reference_axes(),
    };
    let sim = Simulator::bind(&args.bind, axes)
        .with_context(|| format!("binding {}", args.bind))?;
    println!("steprack-simulator listening on {}", sim.local_addr());
    sim.run()?;
    Ok(())
}
