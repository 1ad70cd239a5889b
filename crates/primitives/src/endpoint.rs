use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port used when a server entry does not name one.
pub const DEFAULT_RPC_PORT: u16 = 8038;

/// One candidate server address.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum EndpointError {
    #[error("no server endpoints configured")]
    Empty,
    #[error("endpoint `{entry}` has no host")]
    MissingHost { entry: String },
    #[error("endpoint `{entry}` has an invalid port")]
    InvalidPort { entry: String },
}

impl Endpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host`, `host:port`, `[v6]` or `[v6]:port`, falling back to
    /// `default_port` when no port is given. A bare IPv6 literal is accepted
    /// as a host without port.
    pub fn parse(entry: &str, default_port: u16) -> Result<Self, EndpointError> {
        let entry = entry.trim();

        let invalid_port = || EndpointError::InvalidPort {
            entry: entry.to_owned(),
        };

        let (host, port) = if let Some(rest) = entry.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| EndpointError::MissingHost {
                entry: entry.to_owned(),
            })?;

            let port = match tail.strip_prefix(':') {
                Some(port) => port.parse().map_err(|_| invalid_port())?,
                None if tail.is_empty() => default_port,
                None => return Err(invalid_port()),
            };

            (host, port)
        } else {
            match entry.split_once(':') {
                Some((host, port)) if !port.contains(':') => {
                    (host, port.parse().map_err(|_| invalid_port())?)
                }
                _ => (entry, default_port),
            }
        };

        if host.is_empty() {
            return Err(EndpointError::MissingHost {
                entry: entry.to_owned(),
            });
        }

        if port == 0 {
            return Err(invalid_port());
        }

        Ok(Self::new(host, port))
    }

    /// Parses a comma-separated server list. Blank entries are skipped.
    pub fn parse_list(list: &str, default_port: u16) -> Result<Vec<Self>, EndpointError> {
        let endpoints = list
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| Self::parse(entry, default_port))
            .collect::<Result<Vec<_>, _>>()?;

        if endpoints.is_empty() {
            return Err(EndpointError::Empty);
        }

        Ok(endpoints)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, DEFAULT_RPC_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use claims::{assert_err_eq, assert_ok_eq};

    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_ok_eq!(Endpoint::parse("db-1", 8038), Endpoint::new("db-1", 8038));
        assert_ok_eq!(Endpoint::parse(" db-1:9000 ", 8038), Endpoint::new("db-1", 9000));
        assert_ok_eq!(Endpoint::parse("[::1]:9000", 8038), Endpoint::new("::1", 9000));
        assert_ok_eq!(Endpoint::parse("[::1]", 8038), Endpoint::new("::1", 8038));
        assert_ok_eq!(Endpoint::parse("fe80::1", 8038), Endpoint::new("fe80::1", 8038));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_err_eq!(
            Endpoint::parse("db-1:http", 8038),
            EndpointError::InvalidPort {
                entry: "db-1:http".to_owned()
            }
        );
        assert_err_eq!(
            Endpoint::parse(":9000", 8038),
            EndpointError::MissingHost {
                entry: ":9000".to_owned()
            }
        );
        assert_err_eq!(
            Endpoint::parse("db-1:0", 8038),
            EndpointError::InvalidPort {
                entry: "db-1:0".to_owned()
            }
        );
    }

    #[test]
    fn test_parse_list() {
        let endpoints = Endpoint::parse_list("a:1, b ,,c:3", 7).unwrap();
        assert_eq!(
            endpoints,
            [Endpoint::new("a", 1), Endpoint::new("b", 7), Endpoint::new("c", 3)]
        );

        assert_err_eq!(Endpoint::parse_list(" , ", 7), EndpointError::Empty);
    }

    #[test]
    fn test_display_brackets_ipv6() {
        assert_eq!(Endpoint::new("::1", 8038).to_string(), "[::1]:8038");
        assert_eq!(Endpoint::new("db-1", 8038).to_string(), "db-1:8038");
    }
}
