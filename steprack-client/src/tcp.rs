// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Blocking TCP transport to one controller.
//!
//! [`RawTcp`] is a single-shot connection with the options the controller
//! requires (`TCP_NODELAY`, `SO_LINGER=(1,0)`), a residual read buffer and
//! per-operation deadlines. [`Tcp`] wraps it with lazy reconnection: every
//! operation first ensures a connection exists; the session layer above
//! decides when a failed operation is retried.

use crate::error::{Error, Result};
use bytes::BytesMut;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Sockets are written and drained in blocks of this size.
pub(crate) const BLOCK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Open,
    Closed,
}

fn io_error(context: &str, err: std::io::Error) -> Error {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            Error::Timeout(format!("{context} timed out"))
        }
        _ => Error::Connection(format!("{context}: {err}")),
    }
}

#[cfg(unix)]
fn set_linger(stream: &TcpStream) -> Result<()> {
    use nix::sys::socket::{setsockopt, sockopt};
    // Linger(1, 0): close drops the connection immediately with a RST, so a
    // wedged controller never keeps the port in TIME_WAIT across retries.
    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 0,
    };
    setsockopt(stream, sockopt::Linger, &linger)
        .map_err(|e| Error::Connection(format!("cannot set SO_LINGER: {e}")))
}

#[cfg(not(unix))]
fn set_linger(_stream: &TcpStream) -> Result<()> {
    Ok(())
}

/// One live connection. Any I/O error moves it to CLOSED; callers open a
/// fresh one through [`Tcp`].
#[derive(Debug)]
pub(crate) struct RawTcp {
    stream: TcpStream,
    buf: BytesMut,
    state: ConnState,
}

impl RawTcp {
    pub(crate) fn connect(host: &str, port: u16, timeout: Duration) -> Result<RawTcp> {
        let mut addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::Connection(format!("cannot resolve {host}: {e}")))?;
        let addr = addrs
            .next()
            .ok_or_else(|| Error::Connection(format!("cannot resolve {host}: no addresses")))?;
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                Error::Timeout(format!("timeout trying to connect to {host}:{port}"))
            }
            _ => Error::Connection(format!("fail to connect {host}:{port}: {e}")),
        })?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::Connection(format!("cannot set TCP_NODELAY: {e}")))?;
        set_linger(&stream)?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(|e| Error::Connection(format!("cannot set write timeout: {e}")))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|e| Error::Connection(format!("cannot set read timeout: {e}")))?;
        Ok(RawTcp {
            stream,
            buf: BytesMut::with_capacity(BLOCK_SIZE),
            state: ConnState::Open,
        })
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state == ConnState::Open
    }

    fn check_open(&self) -> Result<()> {
        if self.state == ConnState::Closed {
            return Err(Error::Connection("bad descriptor: socket is closed".into()));
        }
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        self.state = ConnState::Closed;
        self.buf.clear();
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    /// Write `data`, chunked by [`BLOCK_SIZE`]; each chunk is bounded by
    /// the write timeout. Closes the connection on any failure.
    pub(crate) fn write(&mut self, data: &[u8]) -> Result<()> {
        self.check_open()?;
        for chunk in data.chunks(BLOCK_SIZE) {
            if let Err(e) = self.stream.write_all(chunk) {
                let err = io_error("write", e);
                self.close();
                return Err(err);
            }
        }
        Ok(())
    }

    fn fill(&mut self, timeout: Duration) -> Result<()> {
        self.stream
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))
            .map_err(|e| Error::Connection(format!("cannot set read timeout: {e}")))?;
        let mut chunk = [0u8; BLOCK_SIZE];
        match self.stream.read(&mut chunk) {
            Ok(0) => {
                self.close();
                Err(Error::Connection("remote end closed".into()))
            }
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(())
            }
            Err(e) => {
                let err = io_error("read", e);
                self.close();
                Err(err)
            }
        }
    }

    /// Read until `delim` (inclusive). The timeout re-applies to every
    /// socket read, so a slowly trickling reply keeps making progress.
    pub(crate) fn read_until(&mut self, delim: u8, timeout: Duration) -> Result<Vec<u8>> {
        self.check_open()?;
        loop {
            if let Some(i) = self.buf.iter().position(|b| *b == delim) {
                return Ok(self.buf.split_to(i + 1).to_vec());
            }
            self.fill(timeout)?;
        }
    }

    pub(crate) fn read_line(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.read_until(b'\n', timeout)
    }
}

impl Drop for RawTcp {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reconnecting wrapper: owns the address and lazily (re)opens
/// [`RawTcp`] connections.
pub(crate) struct Tcp {
    host: String,
    port: u16,
    timeout: Duration,
    sock: Option<RawTcp>,
    connection_counter: u64,
}

impl Tcp {
    pub(crate) fn new(host: &str, port: u16, timeout: Duration) -> Tcp {
        Tcp {
            host: host.to_string(),
            port,
            timeout,
            sock: None,
            connection_counter: 0,
        }
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn connected(&self) -> bool {
        self.sock.as_ref().is_some_and(|s| s.is_open())
    }

    /// Open a connection if there is none. Returns true when a fresh
    /// connection was made by this call.
    pub(crate) fn ensure_connected(&mut self) -> Result<bool> {
        if self.connected() {
            return Ok(false);
        }
        self.sock = Some(RawTcp::connect(&self.host, self.port, self.timeout)?);
        self.connection_counter += 1;
        debug!(host = %self.host, port = self.port, count = self.connection_counter, "connected");
        Ok(true)
    }

    pub(crate) fn close(&mut self) {
        if let Some(mut sock) = self.sock.take() {
            sock.close();
        }
    }

    fn sock(&mut self) -> Result<&mut RawTcp> {
        self.sock
            .as_mut()
            .ok_or_else(|| Error::Connection("not connected".into()))
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> Result<()> {
        debug!(bytes = data.len(), "write -> {:?}", String::from_utf8_lossy(&data[..data.len().min(96)]));
        self.sock()?.write(data)
    }

    pub(crate) fn read_line(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let reply = self.sock()?.read_line(timeout)?;
        debug!(bytes = reply.len(), "read <- {:?}", String::from_utf8_lossy(&reply));
        Ok(reply)
    }

    pub(crate) fn read_until(&mut self, delim: u8, timeout: Duration) -> Result<Vec<u8>> {
        let reply = self.sock()?.read_until(delim, timeout)?;
        debug!(bytes = reply.len(), "read <- {:?}", String::from_utf8_lossy(&reply[..reply.len().min(96)]));
        Ok(reply)
    }
}
