// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! `steprack`: operator command line for StepRack controllers.
//!
//! The first argument is the controller URL (`[tcp://]host[:port]`, port
//! 5000 by default); subcommands cover motion, status tables, raw
//! commands, configuration backups and firmware updates. Exit code is 0
//! on success and 1 on any command or I/O failure.

mod output;
mod selector;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use output::{print_table, MotionReadout};
use selector::AxisSelector;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use steprack_client::{backup, ensure_power, firmware, Controller, Group, RateLimiter};
use steprack_protocol::PositionRegister;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

#[cfg(unix)]
fn install_sigint_flag() {
    use nix::sys::signal::{self, SigHandler, Signal};
    extern "C" fn on_sigint(_: i32) {
        INTERRUPTED.store(true, Ordering::Relaxed);
    }
    // Replace the default handler so a motion in progress can be stopped
    // and drained before the process exits.
    unsafe {
        let _ = signal::signal(Signal::SIGINT, SigHandler::Handler(on_sigint));
    }
}

#[cfg(not(unix))]
fn install_sigint_flag() {}

#[derive(Parser)]
#[command(name = "steprack", about = "StepRack controller command line", version)]
struct Cli {
    /// Controller URL: [tcp://]host[:port], port defaults to 5000.
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Move axes to absolute positions, given as <axis> <position> pairs.
    #[command(allow_negative_numbers = true)]
    Move {
        /// <axis> <position> pairs, e.g. `1 100 5 200`.
        #[arg(required = true)]
        pairs: Vec<String>,
    },
    /// Move axes relative to their current positions.
    #[command(allow_negative_numbers = true)]
    Rmove {
        /// <axis> <delta> pairs.
        #[arg(required = true)]
        pairs: Vec<String>,
        /// Repeat the relative move this many times.
        #[arg(short, long, default_value_t = 1)]
        multiple: u32,
    },
    /// Stop the given axes and wait until they stand still.
    Stop {
        #[arg(long, default_value = "all")]
        axes: String,
    },
    /// Summary of each axis state (mode, power, motion, stop code).
    State {
        #[arg(long, default_value = "all")]
        axes: String,
    },
    /// Summary of each axis settings (position, velocity, acc. time).
    Status {
        #[arg(long, default_value = "all")]
        axes: String,
    },
    /// Detailed position registers per axis.
    Pos {
        #[arg(long, default_value = "all")]
        axes: String,
    },
    /// Print the firmware version tree.
    Ver,
    /// Print the system operation mode.
    Mode,
    /// Reset a rack, or the whole system.
    Reset {
        #[arg(long)]
        rack: Option<u8>,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
    /// Reboot the controller.
    Reboot {
        #[arg(short, long)]
        yes: bool,
    },
    /// Rack information (id, temperature).
    Rinfo {
        /// Comma separated rack numbers.
        #[arg(long, required = true)]
        racks: String,
    },
    /// Send a raw protocol command and print the reply.
    Send {
        #[arg(required = true)]
        command: Vec<String>,
    },
    /// Save a configuration backup.
    Save {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "alive")]
        axes: String,
    },
    /// Check a configuration backup against the live system.
    Check {
        #[arg(long)]
        file: PathBuf,
        /// Restrict the comparison to these axes.
        #[arg(long, default_value = "")]
        axes: String,
    },
    /// Install a firmware image on the whole system.
    Update {
        #[arg(long)]
        file: PathBuf,
        #[arg(short, long)]
        yes: bool,
    },
}

fn confirm(prompt: &str, skip: bool) -> anyhow::Result<bool> {
    if skip {
        return Ok(true);
    }
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn parse_pairs(ctrl: &Controller, pairs: &[String]) -> anyhow::Result<(Vec<u16>, Vec<i64>)> {
    if pairs.len() % 2 != 0 {
        bail!("expected <axis> <position> pairs, got {} arguments", pairs.len());
    }
    let mut addrs = Vec::new();
    let mut values = Vec::new();
    for pair in pairs.chunks(2) {
        addrs.push(ctrl.resolve(&pair[0])?);
        values.push(
            pair[1]
                .parse::<i64>()
                .with_context(|| format!("bad position {:?}", pair[1]))?,
        );
    }
    Ok((addrs, values))
}

fn group_for(ctrl: &Controller, addrs: &[u16]) -> anyhow::Result<Group> {
    let axes = addrs
        .iter()
        .map(|addr| ctrl.axis(*addr))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Group::new(axes)?)
}

/// Drive one motion to completion with a live readout. On interruption
/// the group is stopped and a second loop drains until every axis stands
/// still.
fn run_motion(group: &Group, targets: &[i64], relative: bool) -> anyhow::Result<()> {
    let start = group.get_pos();
    let finals: Vec<i64> = if relative {
        start.iter().zip(targets).map(|(p, d)| p + d).collect()
    } else {
        targets.to_vec()
    };
    let mut readout = MotionReadout::new(&group.names(), &start, &finals);

    let power = ensure_power(group)?;
    if relative {
        group.start_rmove(targets)?;
    } else {
        group.start_move(targets)?;
    }

    let mut limiter = RateLimiter::new(Duration::from_millis(100));
    let mut stopped_early = false;
    for (states, positions) in group.motion() {
        readout.update(&states, &positions);
        if interrupted() {
            stopped_early = true;
            break;
        }
        limiter.pace();
    }
    if stopped_early {
        eprintln!("\nstopping...");
        group.start_stop()?;
        let mut limiter = RateLimiter::new(Duration::from_millis(100));
        for (states, positions) in group.motion() {
            readout.update(&states, &positions);
            limiter.pace();
        }
        readout.finish();
        power.restore()?;
        bail!("motion interrupted");
    }
    readout.finish();
    power.restore()?;
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let ctrl = Controller::from_url(&cli.url)?;
    match cli.command {
        Command::Move { pairs } => {
            let (addrs, positions) = parse_pairs(&ctrl, &pairs)?;
            let group = group_for(&ctrl, &addrs)?;
            run_motion(&group, &positions, false)?;
        }
        Command::Rmove { pairs, multiple } => {
            let (addrs, deltas) = parse_pairs(&ctrl, &pairs)?;
            let group = group_for(&ctrl, &addrs)?;
            for _ in 0..multiple.max(1) {
                run_motion(&group, &deltas, true)?;
                if interrupted() {
                    break;
                }
            }
        }
        Command::Stop { axes } => {
            let addrs = AxisSelector::parse(&axes)?.resolve(&ctrl)?;
            let group = group_for(&ctrl, &addrs)?;
            eprint!("stopping... ");
            group.start_stop()?;
            group.wait_stopped(Some(Duration::from_secs(30)), Duration::from_millis(10));
            eprintln!("done");
        }
        Command::State { axes } => {
            let addrs = AxisSelector::parse(&axes)?.resolve(&ctrl)?;
            let group = group_for(&ctrl, &addrs)?;
            let names = group.names();
            let states = group.get_states();
            let positions = group.get_pos();
            let rows: Vec<Vec<String>> = addrs
                .iter()
                .zip(&names)
                .zip(states.iter().zip(&positions))
                .map(|((addr, name), (state, pos))| {
                    vec![
                        addr.to_string(),
                        name.clone(),
                        pos.to_string(),
                        state.mode().to_string(),
                        if state.is_poweron() { "ON" } else { "OFF" }.to_string(),
                        if state.is_moving() { "yes" } else { "no" }.to_string(),
                        state.disable().to_string(),
                        state.stop_code().to_string(),
                    ]
                })
                .collect();
            print_table(
                &["Axis", "Name", "Pos", "Mode", "Power", "Moving", "Disable", "Stop code"],
                &rows,
            );
        }
        Command::Status { axes } => {
            let addrs = AxisSelector::parse(&axes)?.resolve(&ctrl)?;
            let group = group_for(&ctrl, &addrs)?;
            let names = group.names();
            let positions = group.get_pos();
            let velocities = group.get_velocity();
            let acctimes = group.get_acctime();
            let power = group.get_power();
            let rows: Vec<Vec<String>> = (0..addrs.len())
                .map(|i| {
                    vec![
                        addrs[i].to_string(),
                        names[i].clone(),
                        positions[i].to_string(),
                        velocities[i].to_string(),
                        acctimes[i].to_string(),
                        if power[i] { "ON" } else { "OFF" }.to_string(),
                    ]
                })
                .collect();
            print_table(&["Axis", "Name", "Pos", "Velocity", "Acc. time", "Power"], &rows);
        }
        Command::Pos { axes } => {
            let addrs = AxisSelector::parse(&axes)?.resolve(&ctrl)?;
            let registers = [
                PositionRegister::Axis,
                PositionRegister::Measure,
                PositionRegister::EncIn,
                PositionRegister::InPos,
                PositionRegister::AbsEnc,
            ];
            let mut rows = Vec::new();
            for addr in &addrs {
                let axis = ctrl.axis(*addr)?;
                let mut row = vec![addr.to_string()];
                for register in registers {
                    row.push(
                        axis.get_pos(register)
                            .map(|v| v.to_string())
                            .unwrap_or_else(|_| "-".into()),
                    );
                }
                rows.push(row);
            }
            print_table(&["Axis", "AXIS", "MEASURE", "ENCIN", "INPOS", "ABSENC"], &rows);
        }
        Command::Ver => {
            print!("{}", ctrl.version()?);
        }
        Command::Mode => {
            println!("{}", ctrl.mode()?);
        }
        Command::Reset { rack, yes } => {
            let what = rack
                .map(|nr| format!("rack {nr}"))
                .unwrap_or_else(|| "the whole system".into());
            if confirm(&format!("Reset {what}?"), yes)? {
                ctrl.reset(rack)?;
            }
        }
        Command::Reboot { yes } => {
            if confirm("Reboot the controller?", yes)? {
                ctrl.reboot()?;
            }
        }
        Command::Rinfo { racks } => {
            let racks: Vec<u8> = racks
                .split(',')
                .map(|r| r.trim().parse::<u8>().with_context(|| format!("bad rack {r:?}")))
                .collect::<anyhow::Result<_>>()?;
            let rids = ctrl.get_rid(&racks)?;
            let temps = ctrl.get_rtemp(&racks)?;
            let rows: Vec<Vec<String>> = racks
                .iter()
                .zip(rids.iter().zip(&temps))
                .map(|(rack, (rid, temp))| {
                    vec![rack.to_string(), rid.clone(), temp.to_string()]
                })
                .collect();
            print_table(&["Rack", "RID", "Temp."], &rows);
        }
        Command::Send { command } => {
            let reply = ctrl.send_cmd(&command.join(" "))?;
            match reply {
                steprack_client::Reply::None => println!("OK"),
                steprack_client::Reply::Tokens(tokens) => println!("{}", tokens.join(" ")),
                steprack_client::Reply::Lines(lines) => {
                    for line in lines {
                        println!("{line}");
                    }
                }
            }
        }
        Command::Save { file, axes } => {
            let addrs = AxisSelector::parse(&axes)?.resolve(&ctrl)?;
            backup::save(&ctrl, &file, &addrs)?;
            println!("backup saved to {}", file.display());
        }
        Command::Check { file, axes } => {
            let addrs = if axes.is_empty() {
                Vec::new()
            } else {
                AxisSelector::parse(&axes)?.resolve(&ctrl)?
            };
            let diffs = backup::check(&ctrl, &file, &addrs)?;
            if diffs.is_empty() {
                println!("no differences found");
            } else {
                for (section, entries) in &diffs {
                    println!("[{section}]");
                    for diff in entries {
                        println!("  {diff}");
                    }
                }
                bail!("{} section(s) differ", diffs.len());
            }
        }
        Command::Update { file, yes } => {
            let image = std::fs::read(&file)
                .with_context(|| format!("cannot read firmware image {}", file.display()))?;
            if !confirm("Install this firmware on ALL components?", yes)? {
                return Ok(());
            }
            let config = firmware::UpdateConfig::default();
            let mut progress = |pct: f64| {
                output::progress_bar(pct, 100.0, "updating firmware");
            };
            firmware::firmware_update(&ctrl, &image, &config, &mut progress)?;
            println!("\nfirmware update done");
        }
    }
    Ok(())
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
    install_sigint_flag();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
