// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Controller endpoint addressing: `[tcp://]host[:port]`.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use steprack_protocol::DEFAULT_PORT;

/// Network location of one controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Endpoint {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    /// Parse `[tcp://]host[:port]`; the port defaults to 5000 and `tcp` is
    /// the only accepted scheme.
    pub fn parse(url: &str) -> Result<Endpoint> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::Usage("empty controller URL".into()));
        }
        let with_scheme = if url.contains("://") {
            url.to_string()
        } else {
            format!("tcp://{url}")
        };
        let uri: http::Uri = with_scheme
            .parse()
            .map_err(|e| Error::Usage(format!("invalid controller URL {url:?}: {e}")))?;
        match uri.scheme_str() {
            Some("tcp") => {}
            Some(other) => {
                return Err(Error::Usage(format!(
                    "unsupported scheme {other:?} in {url:?} (expected tcp)"
                )))
            }
            None => return Err(Error::Usage(format!("invalid controller URL {url:?}"))),
        }
        let host = uri
            .host()
            .ok_or_else(|| Error::Usage(format!("missing host in {url:?}")))?;
        Ok(Endpoint {
            host: host.to_string(),
            port: uri.port_u16().unwrap_or(DEFAULT_PORT),
        })
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Endpoint> {
        Endpoint::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}
