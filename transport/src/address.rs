// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Remote address
//!

use crate::Error;

use serde::{Deserialize, Serialize};

use std::{fmt, str::FromStr};

/// Network endpoint of a broker, `host:port`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteAddress {
    host: String,
    port: u16,
}

impl RemoteAddress {
    pub fn new(host: &str, port: u16) -> Self {
        RemoteAddress {
            host: host.to_owned(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for RemoteAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| {
            Error::Decode(format!("Missing port in address '{}'.", s))
        })?;
        if host.is_empty() {
            return Err(Error::Decode(format!(
                "Missing host in address '{}'.",
                s
            )));
        }
        let port = port.parse::<u16>().map_err(|e| {
            Error::Decode(format!("Invalid port in address '{}': {}", s, e))
        })?;
        Ok(RemoteAddress::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let address: RemoteAddress = "broker-1:51015".parse().unwrap();
        assert_eq!(address.host(), "broker-1");
        assert_eq!(address.port(), 51015);
        assert_eq!(address.to_string(), "broker-1:51015");
    }

    #[test]
    fn test_parse_errors() {
        assert!("broker-1".parse::<RemoteAddress>().is_err());
        assert!(":80".parse::<RemoteAddress>().is_err());
        assert!("broker:http".parse::<RemoteAddress>().is_err());
    }
}
