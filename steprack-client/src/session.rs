// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Request/response protocol session.
//!
//! One [`Session`] owns one controller connection and enforces the
//! single-request-in-flight contract: a mutex is held across the whole
//! `(write, read reply)` critical section for queries and acknowledged
//! commands, and across the write alone for silent commands and binary
//! blocks.
//!
//! Command classes:
//! 1. queries (contain `?`) are sent bare and always expect a reply;
//! 2. writes beginning with `PROG`, `*PROG`, `RESET`, `:` and the
//!    large-payload headers `*ECAMDAT`, `*LISTDAT`, `*PARDAT` are sent bare
//!    and return nothing;
//! 3. every other write is acknowledged: prefixed with `#`, answered with
//!    `OK` or `ERROR <reason>`.

use crate::error::{Error, Result};
use crate::tcp::Tcp;
use crate::MutexExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use steprack_protocol::encode_block;
use tracing::debug;

/// Grace period for the newline trailing a multi-line reply's closing `$`.
const TRAILER_TIMEOUT: Duration = Duration::from_millis(20);

/// Writes sent without acknowledge framing and without any reply.
const SILENT_PREFIXES: &[&str] = &["PROG", "*PROG", "RESET", ":"];
/// Large-payload headers are silent wherever they appear; with an axis
/// prefix they read `n:*ECAMDAT …`.
const SILENT_ANYWHERE: &[&str] = &["*ECAMDAT", "*LISTDAT", "*PARDAT"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandClass {
    Query,
    Silent,
    Ack,
}

fn classify(cmd: &str) -> CommandClass {
    if cmd.contains('?') {
        CommandClass::Query
    } else if SILENT_PREFIXES.iter().any(|p| cmd.starts_with(p))
        || SILENT_ANYWHERE.iter().any(|p| cmd.contains(p))
    {
        CommandClass::Silent
    } else {
        CommandClass::Ack
    }
}

/// A parsed controller reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Acknowledged or silent command: no payload.
    None,
    /// Single-line reply, split on whitespace, command echo stripped.
    Tokens(Vec<String>),
    /// Multi-line `$…$` reply: payload lines in order, `\r` trimmed.
    Lines(Vec<String>),
}

impl Reply {
    /// Unwrap a single-line reply.
    pub fn into_tokens(self) -> Result<Vec<String>> {
        match self {
            Reply::Tokens(tokens) => Ok(tokens),
            Reply::Lines(_) => Err(Error::Protocol(
                "expected a single-line reply, got a multi-line one".into(),
            )),
            Reply::None => Err(Error::Protocol("expected a reply, got none".into())),
        }
    }

    /// Unwrap a multi-line reply.
    pub fn into_lines(self) -> Result<Vec<String>> {
        match self {
            Reply::Lines(lines) => Ok(lines),
            Reply::Tokens(_) => Err(Error::Protocol(
                "expected a multi-line reply, got a single-line one".into(),
            )),
            Reply::None => Err(Error::Protocol("expected a reply, got none".into())),
        }
    }

    /// Accept either shape as lines: a single-line reply becomes its
    /// joined remainder. `?CFG <param>` style queries answer one line where
    /// the unparameterised form answers many.
    pub fn into_any_lines(self) -> Result<Vec<String>> {
        match self {
            Reply::Lines(lines) => Ok(lines),
            Reply::Tokens(tokens) => Ok(vec![tokens.join(" ")]),
            Reply::None => Err(Error::Protocol("expected a reply, got none".into())),
        }
    }
}

/// Blocking request/response session with a controller.
pub struct Session {
    tcp: Mutex<Tcp>,
    multiline: AtomicBool,
}

impl Session {
    /// Connect to a controller. The connection is established eagerly so
    /// that an unreachable host fails here rather than at the first
    /// command.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Session> {
        let mut tcp = Tcp::new(host, port, timeout);
        tcp.ensure_connected()?;
        Ok(Session {
            tcp: Mutex::new(tcp),
            multiline: AtomicBool::new(false),
        })
    }

    pub fn host(&self) -> String {
        self.tcp.lock_or_panic().host().to_string()
    }

    pub fn port(&self) -> u16 {
        self.tcp.lock_or_panic().port()
    }

    pub fn timeout(&self) -> Duration {
        self.tcp.lock_or_panic().timeout()
    }

    pub fn is_connected(&self) -> bool {
        self.tcp.lock_or_panic().connected()
    }

    /// Close the connection. The next command reconnects lazily.
    pub fn disconnect(&self) {
        self.tcp.lock_or_panic().close()
    }

    /// Whether the last collected reply used multi-line framing.
    pub fn last_reply_multiline(&self) -> bool {
        self.multiline.load(Ordering::Relaxed)
    }

    /// Run `op` under the session lock with the reconnect-once policy: a
    /// connection-level failure on an established connection closes it,
    /// reconnects and retries the whole operation exactly once. Timeouts
    /// and command errors propagate untouched.
    fn with_session<T>(&self, op: impl Fn(&mut Tcp) -> Result<T>) -> Result<T> {
        let mut tcp = self.tcp.lock_or_panic();
        let fresh = tcp.ensure_connected()?;
        match op(&mut tcp) {
            Err(Error::Connection(msg)) if !fresh => {
                debug!("connection error ({msg}), reconnecting once");
                tcp.close();
                tcp.ensure_connected()?;
                op(&mut tcp)
            }
            other => other,
        }
    }

    /// Send one command and collect its reply according to the framing
    /// rules above. The command is sent verbatim; classification and
    /// reply matching work on its uppercased form, which is also what the
    /// controller echoes.
    pub fn send_cmd(&self, cmd: &str) -> Result<Reply> {
        let cmd = cmd.trim().to_string();
        if cmd.is_empty() {
            return Err(Error::Usage("empty command".into()));
        }
        let upper = cmd.to_uppercase();
        let class = classify(&upper);
        let wire = match class {
            CommandClass::Ack => format!("#{cmd}\r"),
            _ => format!("{cmd}\r"),
        };
        self.with_session(|tcp| {
            tcp.write(wire.as_bytes())?;
            if class == CommandClass::Silent {
                self.multiline.store(false, Ordering::Relaxed);
                return Ok(Reply::None);
            }
            let timeout = tcp.timeout();
            let mut text =
                String::from_utf8_lossy(&tcp.read_line(timeout)?).into_owned();
            if text.contains('$') {
                while text.matches('$').count() < 2 {
                    let rest = tcp.read_until(b'$', timeout)?;
                    text.push_str(&String::from_utf8_lossy(&rest));
                }
                // Trailing newline after the closing '$': best effort.
                let _ = tcp.read_line(TRAILER_TIMEOUT);
                self.multiline.store(true, Ordering::Relaxed);
                parse_multiline(&upper, &text)
            } else {
                self.multiline.store(false, Ordering::Relaxed);
                parse_line(&upper, text.trim_end_matches(['\r', '\n']), class)
            }
        })
    }

    /// Send a raw binary block (table or firmware payload). No textual
    /// reply follows; the lock is held for the write only.
    pub fn send_binary(&self, words: &[u16]) -> Result<()> {
        let frame = encode_block(words);
        debug!(words = words.len(), "-> binary block");
        self.with_session(|tcp| tcp.write(&frame))
    }
}

fn first_word(cmd: &str) -> &str {
    cmd.split_whitespace().next().unwrap_or(cmd)
}

/// Apply the reply-to-command matching contract to a single-line reply.
fn parse_line(cmd: &str, line: &str, class: CommandClass) -> Result<Reply> {
    let w0 = first_word(cmd);
    let line = line.trim();
    let remainder = if let Some(rest) = line.strip_prefix(cmd) {
        rest
    } else {
        // Multi-axis fan-out replies echo the first word only.
        match line.strip_prefix(w0) {
            Some(rest) if !line.contains("ERROR") => rest,
            _ => return Err(Error::Command(line.to_string())),
        }
    };
    let remainder = remainder.trim();
    if remainder == "ERROR" || remainder.starts_with("ERROR ") {
        return Err(Error::Command(line.to_string()));
    }
    match class {
        CommandClass::Ack => {
            if remainder == "OK" {
                Ok(Reply::None)
            } else {
                Err(Error::Command(line.to_string()))
            }
        }
        _ => Ok(Reply::Tokens(
            remainder.split_whitespace().map(str::to_string).collect(),
        )),
    }
}

/// Extract the payload lines of a `$…$` reply.
fn parse_multiline(cmd: &str, text: &str) -> Result<Reply> {
    let w0 = first_word(cmd);
    let mut parts = text.splitn(3, '$');
    let echo = parts.next().unwrap_or("").trim();
    let body = parts
        .next()
        .ok_or_else(|| Error::Protocol("multi-line reply with no opening $".into()))?;
    if parts.next().is_none() {
        return Err(Error::Protocol("multi-line reply missing closing $".into()));
    }
    if !echo.starts_with(w0) {
        return Err(Error::Command(text.trim().to_string()));
    }
    let segments: Vec<&str> = body.split('\n').collect();
    let lines = if segments.len() >= 2 {
        segments[1..segments.len() - 1]
            .iter()
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect()
    } else {
        Vec::new()
    };
    Ok(Reply::Lines(lines))
}
