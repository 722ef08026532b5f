//! Credential string parsing
//!
//! Credentials are written as `<protocol>:<value>...`, e.g.
//! `hmac:<access_key>:<secret_key>`. US3 only accepts HMAC key pairs, the
//! other protocols are recognized so they can be rejected with a clear error.

use std::fmt;

use crate::error::{Error, Result};

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Hmac { access_key: String, secret_key: String },
    ApiKey(String),
    Basic { user: String, password: String },
    File(String),
    Env,
    Base64(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Hmac,
    ApiKey,
    Basic,
    File,
    Env,
    Base64,
}

impl Credential {
    pub fn parse(value: &str) -> Result<Self> {
        let (protocol, rest) = match value.split_once(':') {
            Some((protocol, rest)) => (protocol, Some(rest)),
            None => (value, None),
        };

        match (protocol, rest) {
            ("hmac", Some(rest)) => {
                let (access_key, secret_key) = rest.split_once(':').ok_or_else(|| {
                    Error::CredentialInvalid("hmac credential needs access and secret key".to_string())
                })?;
                if access_key.is_empty() || secret_key.is_empty() {
                    return Err(Error::CredentialInvalid(
                        "hmac access and secret key cannot be empty".to_string(),
                    ));
                }
                Ok(Credential::Hmac {
                    access_key: access_key.to_string(),
                    secret_key: secret_key.to_string(),
                })
            }
            ("apikey", Some(key)) => Ok(Credential::ApiKey(key.to_string())),
            ("basic", Some(rest)) => {
                let (user, password) = rest.split_once(':').ok_or_else(|| {
                    Error::CredentialInvalid("basic credential needs user and password".to_string())
                })?;
                Ok(Credential::Basic {
                    user: user.to_string(),
                    password: password.to_string(),
                })
            }
            ("file", Some(path)) => Ok(Credential::File(path.to_string())),
            ("env", None) => Ok(Credential::Env),
            ("base64", Some(content)) => Ok(Credential::Base64(content.to_string())),
            _ => Err(Error::CredentialInvalid(format!(
                "unrecognized credential protocol {:?}",
                protocol
            ))),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Credential::Hmac { .. } => Protocol::Hmac,
            Credential::ApiKey(_) => Protocol::ApiKey,
            Credential::Basic { .. } => Protocol::Basic,
            Credential::File(_) => Protocol::File,
            Credential::Env => Protocol::Env,
            Credential::Base64(_) => Protocol::Base64,
        }
    }

    /// Access and secret key, for HMAC credentials
    pub fn hmac(&self) -> Option<(&str, &str)> {
        match self {
            Credential::Hmac {
                access_key,
                secret_key,
            } => Some((access_key, secret_key)),
            _ => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({:?})", self.protocol())
    }
}
