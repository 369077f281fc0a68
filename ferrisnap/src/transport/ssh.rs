//! SSH transport implementation using russh and russh-sftp.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use russh::client::{self, Handle};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh_sftp::client::SftpSession;
use secrecy::ExposeSecret;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::config::{AuthMethod, HostKeyVerification, SshConfig, TransportSettings};
use super::exec::{self, ExecOutput};
use super::{Connector, RemoteSession};
use crate::device::DeviceTarget;
use crate::error::TransportError;

/// Opens [`SshTransport`] sessions with shared settings.
#[derive(Debug, Clone)]
pub struct SshConnector {
    settings: TransportSettings,
}

impl SshConnector {
    /// Create a connector with the given settings.
    pub fn new(settings: TransportSettings) -> Self {
        if settings.host_key_verification == HostKeyVerification::Disabled {
            warn!("Host key verification is disabled; device identities will not be checked");
        }
        Self { settings }
    }

    /// Settings used for every connection.
    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(TransportSettings::default())
    }
}

impl Connector for SshConnector {
    type Session = SshTransport;

    async fn open(&self, target: &DeviceTarget) -> Result<SshTransport, TransportError> {
        SshTransport::connect(target.ssh_config(&self.settings)).await
    }
}

/// SSH transport wrapping a russh client session and a lazily opened
/// SFTP sub-channel.
pub struct SshTransport {
    /// The russh session handle (None once closed).
    session: Option<Handle<SshHandler>>,

    /// SFTP sub-channel, opened on first use and reused afterwards.
    sftp: Option<SftpSession>,

    /// Configuration used for this connection.
    config: SshConfig,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    pub async fn connect(config: SshConfig) -> Result<Self, TransportError> {
        let timeout = config.settings.connect_timeout;
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(config.settings.command_timeout.max(timeout)),
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.settings.host_key_verification.clone(),
            known_hosts_path: config.settings.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("Connecting to {}", config.socket_addr());

        // Connect to the server
        let mut session = tokio::time::timeout(
            timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
        .map_err(|e| {
            // If check_server_key stored a detailed error, use that instead
            // of the generic russh::Error::UnknownKey
            match host_key_error.lock().ok().and_then(|mut slot| slot.take()) {
                Some(hk_err) => hk_err,
                None => TransportError::Ssh(e),
            }
        })?;

        // Authenticate, and never leave a half-open connection behind
        let authenticated =
            tokio::time::timeout(timeout, Self::authenticate(&mut session, &config))
                .await
                .map_err(|_| TransportError::Timeout(timeout))
                .and_then(|result| result);

        if let Err(e) = authenticated {
            if let Err(disconnect_err) = session
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
            {
                debug!(
                    "Disconnect after failed login to {} failed: {}",
                    config.host, disconnect_err
                );
            }
            return Err(e);
        }

        debug!("Authenticated to {} as {}", config.host, config.username);

        Ok(Self {
            session: Some(session),
            sftp: None,
            config,
        })
    }

    /// Host this transport is connected to.
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Authenticate with the server.
    async fn authenticate(
        session: &mut Handle<SshHandler>,
        config: &SshConfig,
    ) -> Result<(), TransportError> {
        let success = match &config.auth {
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                // Get the best RSA hash algorithm supported by the server
                let hash_alg = session.best_supported_rsa_hash().await?.flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            });
        }

        Ok(())
    }

    /// SFTP sub-channel, opened on first use.
    async fn sftp(&mut self) -> Result<&SftpSession, TransportError> {
        if self.sftp.is_none() {
            let session = self.session.as_ref().ok_or(TransportError::NotConnected)?;
            let channel = session.channel_open_session().await?;
            channel.request_subsystem(true, "sftp").await?;
            let sftp = SftpSession::new(channel.into_stream()).await?;
            debug!("Opened SFTP sub-channel to {}", self.config.host);
            self.sftp = Some(sftp);
        }
        self.sftp.as_ref().ok_or(TransportError::NotConnected)
    }
}

impl RemoteSession for SshTransport {
    async fn execute(&mut self, command: &str) -> Result<ExecOutput, TransportError> {
        let session = self.session.as_ref().ok_or(TransportError::NotConnected)?;
        let timeout = self.config.settings.command_timeout;

        debug!("{}: executing '{}'", self.config.host, command);
        tokio::time::timeout(timeout, exec::run(session, command))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn remote_size(&mut self, file: &str) -> Result<Option<u64>, TransportError> {
        let timeout = self.config.settings.command_timeout;

        tokio::time::timeout(timeout, async {
            let sftp = self.sftp().await?;
            if !sftp.try_exists(file).await? {
                return Ok(None);
            }
            let metadata = sftp.metadata(file).await?;
            Ok::<_, TransportError>(Some(metadata.size.unwrap_or(0)))
        })
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn download<W>(&mut self, file: &str, sink: &mut W) -> Result<u64, TransportError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let timeout = self.config.settings.transfer_timeout;

        tokio::time::timeout(timeout, async {
            let sftp = self.sftp().await?;
            let mut remote = sftp.open(file).await?;
            let copied = tokio::io::copy(&mut remote, sink).await?;
            sink.flush().await?;
            Ok::<_, TransportError>(copied)
        })
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(sftp) = self.sftp.take() {
            if let Err(e) = sftp.close().await {
                debug!("Closing SFTP sub-channel to {} failed: {}", self.config.host, e);
            }
        }

        if let Some(session) = self.session.take() {
            session
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await?;
            debug!("Disconnected from {}", self.config.host);
        }
        Ok(())
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(
                "Session to {} dropped without close(); connection torn down implicitly",
                self.config.host
            );
        }
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Stores a detailed host-key error so connect() can surface it
    /// instead of the generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(TransportError::HostKeyChanged)` if key changed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.host_key_verification {
            HostKeyVerification::Disabled => Ok(true),

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    // Trust on first use: accept, remember, and tell the operator
                    warn!(
                        "Accepting unverified host key for {}:{} (trust on first use)",
                        self.host, self.port
                    );
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    Ok(true)
                }
                Err(e) => Ok(self.reject(e)),
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => Ok(self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                })),
                Err(e) => Ok(self.reject(e)),
            },
        }
    }
}
