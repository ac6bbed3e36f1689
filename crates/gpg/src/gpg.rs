//! `CryptoBackend` running the GnuPG command-line tools.
//!
//! Signatures are checked with `gpgv --status-fd 1`, whose status records are
//! parsed into a [`StatusReport`]. The cleartext is extracted with
//! `gpg --decrypt` against the same keyring.

use anyhow::{Context, Result, anyhow, bail};
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::backend::CryptoBackend;
use crate::keyring::Keyring;
use crate::status::StatusReport;

/// Default limit for a single gpg invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs `gpgv` and `gpg` as child processes.
#[derive(Debug, Clone)]
pub struct GpgBackend {
    gpgv: PathBuf,
    gpg: PathBuf,
    timeout: Option<Duration>,
}

impl Default for GpgBackend {
    fn default() -> Self {
        Self {
            gpgv: PathBuf::from("gpgv"),
            gpg: PathBuf::from("gpg"),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl GpgBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gpgv(mut self, program: impl Into<PathBuf>) -> Self {
        self.gpgv = program.into();
        self
    }

    pub fn with_gpg(mut self, program: impl Into<PathBuf>) -> Self {
        self.gpg = program.into();
        self
    }

    /// `None` waits for the child indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl CryptoBackend for GpgBackend {
    #[tracing::instrument(
        skip(self, document, keyring),
        fields(doc_len = document.len(), keyring = %keyring.name)
    )]
    fn evaluate(&self, document: &[u8], keyring: &Keyring) -> Result<StatusReport> {
        let mut command = Command::new(&self.gpgv);
        command
            .arg("--status-fd")
            .arg("1")
            .arg("--keyring")
            .arg(keyring_arg(&keyring.path)?);
        let output = run_with_input(&mut command, document, self.timeout)?;

        // gpgv exits non-zero for signatures it does not accept; the status
        // records carry the verdict.
        tracing::debug!(status = %output.status, "gpgv finished");
        Ok(StatusReport::parse(
            &String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        ))
    }

    #[tracing::instrument(
        skip(self, document, keyring),
        fields(doc_len = document.len(), keyring = %keyring.name)
    )]
    fn decrypt(&self, document: &[u8], keyring: &Keyring) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.gpg);
        command
            .arg("--batch")
            .arg("--no-default-keyring")
            .arg("--keyring")
            .arg(keyring_arg(&keyring.path)?)
            .arg("--decrypt");
        let output = run_with_input(&mut command, document, self.timeout)?;
        if !output.status.success() {
            bail!(
                "{} --decrypt failed ({}): {}",
                self.gpg.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        tracing::debug!(cleartext_len = output.stdout.len(), "Extracted cleartext");
        Ok(output.stdout)
    }
}

/// gpg resolves bare keyring names against its home directory, so pass an
/// absolute path.
fn keyring_arg(path: &Path) -> Result<OsString> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("Invalid keyring path {}", path.display()))?;
    Ok(absolute.into_os_string())
}

struct ProcessOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Run `command` with `input` on stdin, collecting stdout and stderr.
///
/// The pipes are serviced on scoped threads so neither side can block the
/// other. On timeout the child is killed.
fn run_with_input(
    command: &mut Command,
    input: &[u8],
    timeout: Option<Duration>,
) -> Result<ProcessOutput> {
    let program = command.get_program().to_string_lossy().into_owned();
    tracing::debug!(program = %program, "Spawning");
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to run {program}"))?;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    std::thread::scope(|scope| {
        let writer = scope.spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input)?;
            }
            Ok(())
        });
        let out_reader = scope.spawn(move || read_pipe(stdout));
        let err_reader = scope.spawn(move || read_pipe(stderr));

        let status = match timeout {
            Some(limit) => match child.wait_timeout(limit) {
                Ok(Some(status)) => status,
                Ok(None) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    bail!("{program} timed out after {limit:?}");
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e).with_context(|| format!("Failed waiting for {program}"));
                }
            },
            None => child
                .wait()
                .with_context(|| format!("Failed waiting for {program}"))?,
        };

        // A child may legitimately exit before reading all of its input.
        if let Ok(Err(e)) = writer.join() {
            tracing::debug!(error = %e, "Child did not consume all input");
        }
        let stdout = out_reader
            .join()
            .map_err(|_| anyhow!("stdout reader panicked"))?
            .with_context(|| format!("Failed reading output of {program}"))?;
        let stderr = err_reader
            .join()
            .map_err(|_| anyhow!("stderr reader panicked"))?
            .with_context(|| format!("Failed reading diagnostics of {program}"))?;

        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
        })
    })
}

fn read_pipe<R: Read>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

/// Extension trait to add `wait_timeout` to `Child`.
trait ChildExt {
    fn wait_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<ExitStatus>>;
}

impl ChildExt for Child {
    fn wait_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
        let start = Instant::now();
        let poll_interval = Duration::from_millis(20);

        loop {
            match self.try_wait()? {
                Some(status) => return Ok(Some(status)),
                None => {
                    if start.elapsed() >= timeout {
                        return Ok(None);
                    }
                    std::thread::sleep(poll_interval);
                }
            }
        }
    }
}
