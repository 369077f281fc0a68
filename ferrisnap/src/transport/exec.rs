//! Remote command execution over an SSH exec channel.

use log::trace;
use russh::ChannelMsg;
use russh::client::{Handle, Handler};

use crate::error::TransportError;

/// Extended data stream number the SSH protocol uses for stderr.
const STDERR_STREAM: u32 = 1;

/// Output of a single remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Everything the command wrote to stdout.
    pub stdout: String,

    /// Everything the command wrote to stderr.
    pub stderr: String,

    /// Exit status, when the device reports one.
    pub exit_status: Option<u32>,
}

impl ExecOutput {
    /// Output with the given stdout and nothing on stderr.
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    /// Output with the given stderr and nothing on stdout.
    pub fn stderr(stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// Failure message for this output.
    ///
    /// Exit codes are not reliable on network device shells, so a
    /// non-blank stderr is the failure signal. `failed_when_contains`
    /// additionally catches devices that report errors on stdout.
    pub fn failure(&self, failed_when_contains: &[String]) -> Option<String> {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return Some(stderr.to_string());
        }

        failed_when_contains
            .iter()
            .find(|pattern| self.stdout.contains(pattern.as_str()))
            .map(|pattern| {
                self.stdout
                    .lines()
                    .find(|line| line.contains(pattern.as_str()))
                    .unwrap_or(pattern.as_str())
                    .trim()
                    .to_string()
            })
    }
}

/// Run `command` on a fresh exec channel and drain it until the device closes it.
pub(crate) async fn run<H: Handler>(
    session: &Handle<H>,
    command: &str,
) -> Result<ExecOutput, TransportError> {
    let mut channel = session.channel_open_session().await?;
    channel.exec(true, command).await?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_status = None;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, ext } if ext == STDERR_STREAM => {
                stderr.extend_from_slice(data)
            }
            ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
            ChannelMsg::Close => break,
            other => trace!("Ignoring channel message {:?}", other),
        }
    }

    Ok(ExecOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_status,
    })
}
