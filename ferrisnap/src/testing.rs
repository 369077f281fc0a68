//! Scripted in-memory devices for exercising the backup layer without a network.
//!
//! The fake speaks the RouterOS dialect: a successful `/system backup save`
//! or `/export` creates the corresponding file, `/file remove` deletes it.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::device::DeviceTarget;
use crate::error::TransportError;
use crate::platform::vendors::routeros;
use crate::transport::{Connector, ExecOutput, RemoteSession};

/// 2024-01-01 12:00:00 local time.
pub(crate) fn fixed_time() -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
        .single()
        .expect("unambiguous local time")
}

/// Everything a fake session was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Open(String),
    Exec(String, String),
    Stat(String, String),
    Download(String, String),
    Close(String),
}

pub(crate) type Journal = Arc<Mutex<Vec<Call>>>;

/// Behaviour script for one fake device.
#[derive(Debug, Clone)]
pub(crate) struct FakeDevice {
    refuse_connection: bool,
    responses: Vec<(String, ExecOutput)>,
    materialize: bool,
    broken_downloads: bool,
    content: Vec<u8>,
    exec_timeouts: Vec<String>,
    stat_sizes: Vec<Option<u64>>,
    stat_delay: Option<Duration>,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self {
            refuse_connection: false,
            responses: vec![],
            materialize: true,
            broken_downloads: false,
            content: b"artifact-bytes".to_vec(),
            exec_timeouts: vec![],
            stat_sizes: vec![],
            stat_delay: None,
        }
    }
}

impl FakeDevice {
    /// Reject authentication.
    pub(crate) fn refusing() -> Self {
        Self {
            refuse_connection: true,
            ..Self::default()
        }
    }

    /// Commands starting with `prefix` print `stderr` on stderr.
    pub(crate) fn with_stderr(mut self, prefix: &str, stderr: &str) -> Self {
        self.responses
            .push((prefix.to_string(), ExecOutput::stderr(stderr)));
        self
    }

    /// Commands starting with `prefix` print `stdout` on stdout.
    pub(crate) fn with_stdout(mut self, prefix: &str, stdout: &str) -> Self {
        self.responses
            .push((prefix.to_string(), ExecOutput::stdout(stdout)));
        self
    }

    /// Trigger commands succeed but never create a file.
    pub(crate) fn without_materialization(mut self) -> Self {
        self.materialize = false;
        self
    }

    /// Downloads write a few bytes and then fail.
    pub(crate) fn with_broken_downloads(mut self) -> Self {
        self.broken_downloads = true;
        self
    }

    /// Commands starting with `prefix` take effect on the device, then the
    /// session reports a timeout.
    pub(crate) fn with_exec_timeout(mut self, prefix: &str) -> Self {
        self.exec_timeouts.push(prefix.to_string());
        self
    }

    /// Successive stats report these sizes; the last one repeats.
    pub(crate) fn with_stat_sizes(mut self, sizes: &[Option<u64>]) -> Self {
        self.stat_sizes = sizes.to_vec();
        self
    }

    /// Every stat sleeps for `delay` before answering.
    pub(crate) fn with_stat_delay(mut self, delay: Duration) -> Self {
        self.stat_delay = Some(delay);
        self
    }

    fn respond(&self, command: &str) -> ExecOutput {
        self.responses
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default()
    }
}

/// Session to one fake device.
pub(crate) struct FakeSession {
    host: String,
    device: FakeDevice,
    files: HashMap<String, Vec<u8>>,
    journal: Journal,
    open: bool,
    stats: usize,
}

impl FakeSession {
    pub(crate) fn new(host: &str, device: FakeDevice) -> Self {
        Self::with_journal(host, device, Journal::default())
    }

    fn with_journal(host: &str, device: FakeDevice, journal: Journal) -> Self {
        Self {
            host: host.to_string(),
            device,
            files: HashMap::new(),
            journal,
            open: true,
            stats: 0,
        }
    }

    /// Snapshot of the calls made so far.
    pub(crate) fn journal(&self) -> Vec<Call> {
        self.journal.lock().unwrap().clone()
    }

    /// Files currently present on the fake device.
    pub(crate) fn remote_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.files.keys().cloned().collect();
        files.sort();
        files
    }

    fn record(&self, call: Call) {
        self.journal.lock().unwrap().push(call);
    }

    fn apply(&mut self, command: &str) {
        if let Some(name) = command.strip_prefix("/system backup save name=") {
            self.files
                .insert(format!("{name}.backup"), self.device.content.clone());
        } else if let Some(name) = command.strip_prefix("/export file=") {
            self.files
                .insert(format!("{name}.rsc"), self.device.content.clone());
        } else if let Some(file) = command.strip_prefix("/file remove ") {
            self.files.remove(file);
        }
    }
}

impl RemoteSession for FakeSession {
    async fn execute(&mut self, command: &str) -> Result<ExecOutput, TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        self.record(Call::Exec(self.host.clone(), command.to_string()));

        if self
            .device
            .exec_timeouts
            .iter()
            .any(|prefix| command.starts_with(prefix.as_str()))
        {
            if self.device.materialize {
                self.apply(command);
            }
            return Err(TransportError::Timeout(Duration::from_secs(60)));
        }

        let output = self.device.respond(command);
        let failed = output
            .failure(&routeros::dialect().failed_when_contains)
            .is_some();
        let is_trigger = !command.starts_with("/file remove");
        if !failed && (self.device.materialize || !is_trigger) {
            self.apply(command);
        }
        Ok(output)
    }

    async fn remote_size(&mut self, file: &str) -> Result<Option<u64>, TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        self.record(Call::Stat(self.host.clone(), file.to_string()));
        if let Some(delay) = self.device.stat_delay {
            tokio::time::sleep(delay).await;
        }

        let call = self.stats;
        self.stats += 1;
        if let Some(last) = self.device.stat_sizes.last() {
            return Ok(*self.device.stat_sizes.get(call).unwrap_or(last));
        }
        Ok(self.files.get(file).map(|content| content.len() as u64))
    }

    async fn download<W>(&mut self, file: &str, sink: &mut W) -> Result<u64, TransportError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        self.record(Call::Download(self.host.clone(), file.to_string()));

        let content = self.files.get(file).cloned().ok_or_else(|| {
            TransportError::Io(io::Error::new(io::ErrorKind::NotFound, "no such file"))
        })?;

        if self.device.broken_downloads {
            sink.write_all(&content[..content.len() / 2]).await?;
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "transfer interrupted",
            )));
        }

        sink.write_all(&content).await?;
        sink.flush().await?;
        Ok(content.len() as u64)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.open {
            self.open = false;
            self.record(Call::Close(self.host.clone()));
        }
        Ok(())
    }
}

/// Connector handing out [`FakeSession`]s that share one journal.
#[derive(Default)]
pub(crate) struct FakeConnector {
    devices: HashMap<String, FakeDevice>,
    journal: Journal,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_device(mut self, host: &str, device: FakeDevice) -> Self {
        self.devices.insert(host.to_string(), device);
        self
    }

    pub(crate) fn journal(&self) -> Vec<Call> {
        self.journal.lock().unwrap().clone()
    }

    /// Calls made against `host`.
    pub(crate) fn calls_for(&self, host: &str) -> Vec<Call> {
        self.journal()
            .into_iter()
            .filter(|call| match call {
                Call::Open(h) | Call::Close(h) => h == host,
                Call::Exec(h, _) | Call::Stat(h, _) | Call::Download(h, _) => h == host,
            })
            .collect()
    }
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn open(&self, target: &DeviceTarget) -> Result<FakeSession, TransportError> {
        self.journal
            .lock()
            .unwrap()
            .push(Call::Open(target.host.clone()));

        let device = self.devices.get(&target.host).cloned().ok_or_else(|| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "host unreachable",
            ))
        })?;

        if device.refuse_connection {
            return Err(TransportError::AuthenticationFailed {
                user: target.credentials.username().to_string(),
            });
        }

        Ok(FakeSession::with_journal(
            &target.host,
            device,
            self.journal.clone(),
        ))
    }
}
