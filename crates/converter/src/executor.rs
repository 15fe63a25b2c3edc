use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use crate::error::ConvertError;

/// Output of a successful encoder run
#[derive(Debug, Clone, Default)]
pub struct EncodeOutput {
    /// stdout and stderr lines merged in the order they arrived
    pub combined: String,
}

/// Runs the external encoder with a prepared argument list
///
/// The batch runner only talks to the encoder through this trait, so tests
/// can substitute a runner that never spawns a process.
#[async_trait]
pub trait EncoderRunner: Send + Sync {
    async fn run(&self, args: &[OsString]) -> Result<EncodeOutput, ConvertError>;
}

/// Render a command line for logging
pub fn command_line(program: &Path, args: &[OsString]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        let arg = arg.to_string_lossy();
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push_str(&format!("{:?}", arg));
        } else {
            line.push_str(&arg);
        }
    }
    line
}

/// Encoder runner that spawns an ffmpeg-compatible binary
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    pub program: PathBuf,
    pub timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        // Drain to EOF so the child never sees a closed pipe
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    let _ = tx.send(line.to_string());
                }
            }
        }
    })
}

#[async_trait]
impl EncoderRunner for FfmpegRunner {
    async fn run(&self, args: &[OsString]) -> Result<EncodeOutput, ConvertError> {
        let cmd_str = command_line(&self.program, args);
        info!("Executing: {}", cmd_str);

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConvertError::Encode {
                detail: format!("failed to launch {}: {}", self.program.display(), e),
                output: String::new(),
            })?;

        // Both pipes feed one channel so the captured text keeps arrival order
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let collector = tokio::spawn(async move {
            let mut lines = Vec::new();
            while let Some(line) = rx.recv().await {
                lines.push(line);
            }
            lines.join("\n")
        });

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(result) => Some(result),
                Err(_) => {
                    let _ = child.kill().await;
                    None
                }
            },
            None => Some(child.wait().await),
        };

        for reader in readers {
            let _ = reader.await;
        }
        let combined = collector.await.unwrap_or_default();

        let status = match waited {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                return Err(ConvertError::Encode {
                    detail: format!("failed to wait for {}: {}", self.program.display(), e),
                    output: combined,
                });
            }
            None => {
                return Err(ConvertError::Encode {
                    detail: format!(
                        "timed out after {:?}, process killed",
                        self.timeout.unwrap_or_default()
                    ),
                    output: combined,
                });
            }
        };

        debug!("Encoder exit status: {}, captured {} bytes", status, combined.len());

        if !status.success() {
            let detail = match status.code() {
                Some(code) => format!("exit code {}", code),
                None => format!("terminated by signal ({})", status),
            };
            return Err(ConvertError::Encode {
                detail,
                output: combined,
            });
        }

        Ok(EncodeOutput { combined })
    }
}
