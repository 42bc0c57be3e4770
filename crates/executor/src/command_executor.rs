use crate::limits::ResourceLimits;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info};

const DEFAULT_MAX_OUTPUT: usize = 16 * 1024 * 1024; // 16MB per stream

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Executable not found: {0}")]
    NotFound(String),
    #[error("Failed to spawn process: {0}")]
    Spawn(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured result of one external invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs the external tool with the given arguments (program excluded).
///
/// Implementations perform exactly one invocation per call. Bounding the
/// wait is the caller's job.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, args: Vec<String>) -> Result<ExecOutput, ExecutorError>;
}

pub struct ProcessExecutor {
    program: PathBuf,
    global_args: Vec<String>,
    env: Vec<(String, String)>,
    limits: ResourceLimits,
    max_output_bytes: usize,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
            env: Vec::new(),
            limits: ResourceLimits::default(),
            max_output_bytes: DEFAULT_MAX_OUTPUT,
        }
    }

    /// Arguments placed before every caller-supplied argument list.
    pub fn with_global_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.global_args.extend(args);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    fn build(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.global_args)
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            let limits = self.limits;
            unsafe {
                cmd.pre_exec(move || {
                    // Own session so terminal signals aimed at the gateway don't reach the CLI
                    libc::setsid();
                    limits.apply()
                });
            }
        }

        cmd
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, args: Vec<String>) -> Result<ExecOutput, ExecutorError> {
        debug!(
            "Executing {} with {} global and {} call args",
            self.program.display(),
            self.global_args.len(),
            args.len()
        );

        let mut child = self.build(&args).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExecutorError::NotFound(self.program.display().to_string())
            } else {
                ExecutorError::Spawn(e.to_string())
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutorError::Spawn("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutorError::Spawn("stderr not captured".into()))?;

        let cap = self.max_output_bytes;
        let ((out, out_truncated), (err, err_truncated), status) = tokio::try_join!(
            read_capped(stdout, cap),
            read_capped(stderr, cap),
            child.wait()
        )?;

        let output = ExecOutput {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&out).into_owned(),
            stderr: String::from_utf8_lossy(&err).into_owned(),
            truncated: out_truncated || err_truncated,
        };

        info!(
            "{} exited with {:?} ({} bytes stdout, {} bytes stderr)",
            self.program.display(),
            output.exit_code,
            output.stdout.len(),
            output.stderr.len()
        );

        Ok(output)
    }
}

/// Reads up to `cap` bytes, then drains the rest so the child never blocks on a full pipe.
async fn read_capped<R>(mut reader: R, cap: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    (&mut reader).take(cap as u64).read_to_end(&mut buf).await?;
    let rest = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok((buf, rest > 0))
}
