//! Endpoint string parsing
//!
//! Endpoints are written as `<protocol>:<host>[:<port>]`, e.g.
//! `https:cn-bj.ufileos.com`. Only `http` and `https` reach US3.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Http { host: String, port: u16 },
    Https { host: String, port: u16 },
    Tcp { host: String, port: u16 },
    File(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
    Tcp,
    File,
}

impl Endpoint {
    pub fn parse(value: &str) -> Result<Self> {
        let (protocol, rest) = value.split_once(':').ok_or_else(|| {
            Error::EndpointInvalid(format!("missing protocol in endpoint {:?}", value))
        })?;

        match protocol {
            "http" => {
                let (host, port) = parse_host_port(rest, Some(80))?;
                Ok(Endpoint::Http { host, port })
            }
            "https" => {
                let (host, port) = parse_host_port(rest, Some(443))?;
                Ok(Endpoint::Https { host, port })
            }
            "tcp" => {
                let (host, port) = parse_host_port(rest, None)?;
                Ok(Endpoint::Tcp { host, port })
            }
            "file" => Ok(Endpoint::File(rest.to_string())),
            _ => Err(Error::EndpointInvalid(format!(
                "unrecognized endpoint protocol {:?}",
                protocol
            ))),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Endpoint::Http { .. } => Protocol::Http,
            Endpoint::Https { .. } => Protocol::Https,
            Endpoint::Tcp { .. } => Protocol::Tcp,
            Endpoint::File(_) => Protocol::File,
        }
    }

    /// Scheme, host and port for HTTP(S) endpoints
    pub fn http_parts(&self) -> Option<(&'static str, &str, u16)> {
        match self {
            Endpoint::Http { host, port } => Some(("http", host, *port)),
            Endpoint::Https { host, port } => Some(("https", host, *port)),
            _ => None,
        }
    }

    /// Base URL for HTTP(S) endpoints; default ports are omitted
    pub fn url(&self) -> Option<String> {
        self.http_parts().map(|(scheme, host, port)| match (scheme, port) {
            ("http", 80) | ("https", 443) => format!("{}://{}", scheme, host),
            _ => format!("{}://{}:{}", scheme, host, port),
        })
    }
}

fn parse_host_port(value: &str, default_port: Option<u16>) -> Result<(String, u16)> {
    let (host, port) = match value.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                Error::EndpointInvalid(format!("invalid port {:?} in endpoint", port))
            })?;
            (host, port)
        }
        None => {
            let port = default_port.ok_or_else(|| {
                Error::EndpointInvalid(format!("endpoint {:?} needs a port", value))
            })?;
            (value, port)
        }
    };

    if host.is_empty() {
        return Err(Error::EndpointInvalid("endpoint host cannot be empty".to_string()));
    }

    Ok((host.to_string(), port))
}
