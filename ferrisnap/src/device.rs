//! Device targets: who to back up and how to log in.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::platform::Dialect;
use crate::transport::{AuthMethod, SshConfig, TransportSettings};

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Login credentials for one device.
#[derive(Debug)]
pub enum Credentials {
    /// Username and password.
    Password {
        username: String,
        password: SecretString,
    },

    /// Username and private key file.
    PrivateKey {
        username: String,
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
}

impl Credentials {
    /// Login name.
    pub fn username(&self) -> &str {
        match self {
            Credentials::Password { username, .. } => username,
            Credentials::PrivateKey { username, .. } => username,
        }
    }

    fn auth_method(&self) -> AuthMethod {
        match self {
            Credentials::Password { password, .. } => {
                AuthMethod::Password(SecretString::from(password.expose_secret()))
            }
            Credentials::PrivateKey {
                path, passphrase, ..
            } => AuthMethod::PrivateKey {
                path: path.clone(),
                passphrase: passphrase
                    .as_ref()
                    .map(|p| SecretString::from(p.expose_secret())),
            },
        }
    }
}

/// A device to back up. Identity key is `host`.
#[derive(Debug)]
pub struct DeviceTarget {
    /// Hostname or IP address.
    pub host: String,

    /// SSH port.
    pub port: u16,

    /// Login credentials.
    pub credentials: Credentials,

    /// Command dialect spoken by the device.
    pub dialect: Arc<Dialect>,
}

impl DeviceTarget {
    /// Create a password-authenticated target on the default port.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        dialect: Arc<Dialect>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            credentials: Credentials::Password {
                username: username.into(),
                password: SecretString::from(password.into()),
            },
            dialect,
        }
    }

    /// Set the SSH port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Build the SSH connection config for this target.
    pub fn ssh_config(&self, settings: &TransportSettings) -> SshConfig {
        SshConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.credentials.username().to_string(),
            auth: self.credentials.auth_method(),
            settings: settings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::vendors::routeros;

    #[test]
    fn test_new_uses_default_port() {
        let target = DeviceTarget::new("r1", "admin", "pw", Arc::new(routeros::dialect()));
        assert_eq!(target.port, 22);
        assert_eq!(target.credentials.username(), "admin");
        assert_eq!(target.with_port(2222).port, 2222);
    }

    #[test]
    fn test_ssh_config_carries_password() {
        let target = DeviceTarget::new("r1", "admin", "pw", Arc::new(routeros::dialect()));
        let config = target.ssh_config(&TransportSettings::default());
        assert_eq!(config.socket_addr(), "r1:22");
        match config.auth {
            AuthMethod::Password(secret) => assert_eq!(secret.expose_secret(), "pw"),
            other => panic!("unexpected auth method {other:?}"),
        }
    }

    #[test]
    fn test_debug_does_not_leak_password() {
        let target = DeviceTarget::new("r1", "admin", "hunter2", Arc::new(routeros::dialect()));
        assert!(!format!("{target:?}").contains("hunter2"));
    }
}
