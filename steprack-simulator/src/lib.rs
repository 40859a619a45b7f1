// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! In-process StepRack controller simulator.
//!
//! Listens on a TCP port and implements the controller's wire protocol:
//! acknowledge framing (`#…` → `OK`/`ERROR`), queries with single- and
//! multi-line (`$…$`) replies, multi-axis fan-out, and binary block
//! reception for table and firmware uploads. Axes follow a linear motion
//! model, so MOVE/STOP and the status MOVING bit behave like the real
//! thing on a test's time scale.
//!
//! ```no_run
//! use steprack_simulator::{AxisConfig, Simulator};
//!
//! let sim = Simulator::bind(
//!     "127.0.0.1:0",
//!     vec![AxisConfig::new(1).with_name("th"), AxisConfig::new(5)],
//! )
//! .unwrap();
//! let port = sim.port();
//! sim.spawn();
//! // connect a client to 127.0.0.1:{port}
//! ```

mod device;

use device::Device;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use steprack_protocol::block;
use tracing::{debug, info, warn};

/// Configuration of one emulated axis.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    /// Axis address (`rack*10 + index`).
    pub address: u16,
    pub name: String,
    pub pos: i64,
    pub velocity: f64,
    pub acctime: f64,
    pub power: bool,
    /// A present-but-dead board: counted in the rack presence mask but
    /// not in the alive mask.
    pub alive: bool,
}

impl Default for AxisConfig {
    fn default() -> AxisConfig {
        AxisConfig {
            address: 1,
            name: String::new(),
            pos: 0,
            velocity: 1000.0,
            acctime: 0.25,
            power: true,
            alive: true,
        }
    }
}

impl AxisConfig {
    pub fn new(address: u16) -> AxisConfig {
        AxisConfig {
            address,
            ..AxisConfig::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> AxisConfig {
        self.name = name.to_string();
        self
    }

    pub fn with_pos(mut self, pos: i64) -> AxisConfig {
        self.pos = pos;
        self
    }

    pub fn with_velocity(mut self, velocity: f64) -> AxisConfig {
        self.velocity = velocity;
        self
    }

    pub fn with_acctime(mut self, acctime: f64) -> AxisConfig {
        self.acctime = acctime;
        self
    }

    pub fn powered(mut self, on: bool) -> AxisConfig {
        self.power = on;
        self
    }

    pub fn dead(mut self) -> AxisConfig {
        self.alive = false;
        self
    }
}

/// Load axis configurations from a JSON file: `[{"address": 1, "name":
/// "th", "pos": 55}, …]`.
pub fn load_axes(path: &Path) -> anyhow::Result<Vec<AxisConfig>> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// A bound but not yet serving simulator.
pub struct Simulator {
    listener: TcpListener,
    device: Arc<Mutex<Device>>,
}

impl Simulator {
    /// Bind the listener. Use port 0 to pick a free port, then read it
    /// back with [`Simulator::port`].
    pub fn bind(addr: &str, axes: Vec<AxisConfig>) -> std::io::Result<Simulator> {
        let listener = TcpListener::bind(addr)?;
        Ok(Simulator {
            listener,
            device: Arc::new(Mutex::new(Device::new(&axes))),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        #[allow(clippy::unwrap_used)]
        self.listener.local_addr().unwrap()
    }

    pub fn port(&self) -> u16 {
        self.local_addr().port()
    }

    /// Serve connections on a background thread, one thread per client.
    pub fn spawn(self) {
        let device = self.device;
        let listener = self.listener;
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let device = Arc::clone(&device);
                        thread::spawn(move || {
                            if let Err(e) = serve_connection(stream, device) {
                                debug!("connection ended: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                        break;
                    }
                }
            }
        });
    }

    /// Serve connections on the calling thread, forever.
    pub fn run(self) -> std::io::Result<()> {
        info!(addr = %self.local_addr(), "simulator listening");
        for stream in self.listener.incoming() {
            let stream = stream?;
            let device = Arc::clone(&self.device);
            thread::spawn(move || {
                if let Err(e) = serve_connection(stream, device) {
                    debug!("connection ended: {e}");
                }
            });
        }
        Ok(())
    }
}

/// Read commands terminated by `\r`, dispatch them and write replies.
/// After a binary header command, read the announced block frame before
/// returning to line mode.
fn serve_connection(stream: TcpStream, device: Arc<Mutex<Device>>) -> std::io::Result<()> {
    let peer = stream.peer_addr()?;
    debug!(%peer, "client connected");
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    loop {
        let mut raw = Vec::new();
        if reader.read_until(b'\r', &mut raw)? == 0 {
            debug!(%peer, "client disconnected");
            return Ok(());
        }
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_matches(['\r', '\n']);
        let (reply, binary) = {
            #[allow(clippy::unwrap_used)]
            let mut device = device.lock().unwrap();
            device.handle_line(line)
        };
        if let Some(reply) = reply {
            writer.write_all(reply.as_bytes())?;
            writer.flush()?;
        }
        if let Some(target) = binary {
            let words = read_block(&mut reader)?;
            #[allow(clippy::unwrap_used)]
            device.lock().unwrap().load_binary(&target, &words);
        }
    }
}

/// Read one binary block frame: 12-byte header, payload words, trailing
/// `\r`.
fn read_block<R: Read>(reader: &mut R) -> std::io::Result<Vec<u16>> {
    let mut header = [0u8; block::HEADER_LEN];
    reader.read_exact(&mut header)?;
    let header = block::decode_header(&header)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let mut payload = vec![0u8; header.word_count as usize * 2];
    reader.read_exact(&mut payload)?;
    let words = block::decode_payload(&header, &payload)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let mut trailer = [0u8; 1];
    reader.read_exact(&mut trailer)?;
    Ok(words)
}

/// The axis set used by examples and most integration tests: two alive
/// axes on rack 0, one powered-off and one dead axis on rack 15.
pub fn reference_axes() -> Vec<AxisConfig> {
    vec![
        AxisConfig::new(1).with_name("th").with_pos(55).with_velocity(100.0),
        AxisConfig::new(5).with_name("tth").with_pos(-3).with_velocity(100.0),
        AxisConfig::new(151)
            .with_name("chi")
            .with_pos(-1000)
            .with_velocity(1002.0)
            .powered(false),
        AxisConfig::new(152).with_name("phi").with_pos(1000).dead(),
    ]
}
