//! `tofu` CLI wrapper
//!
//! Every invocation streams the tool's output line by line into the log and
//! keeps a transcript so failures can be reported with context.

use crate::env::ExecEnv;
use crate::error::{Result, TofuError};
use regex::Regex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// Environment variable selecting the binary.
pub const TOFU_BINARY_ENV: &str = "NEBARI_TOFU_BINARY";

pub const DEFAULT_TOFU_BINARY: &str = "tofu";

/// `import` is bounded; a hanging import usually waits on credentials.
pub const IMPORT_TIMEOUT: Duration = Duration::from_secs(30);

const OUTPUT_TAIL_LINES: usize = 40;

const LINE_PREFIX: &str = "[tofu]";

/// Red foreground escape the tool emits around error text.
const ANSI_RED: &str = "\x1b[31m";

#[derive(Debug, Clone, Copy, Default)]
struct RunOptions {
    strip_errors: bool,
    timeout: Option<Duration>,
    capture_stdout: bool,
}

struct RunOutput {
    status: ExitStatus,
    stdout: String,
    transcript: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Tofu {
    binary: PathBuf,
    import_timeout: Duration,
}

impl Tofu {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            import_timeout: IMPORT_TIMEOUT,
        }
    }

    pub fn with_import_timeout(mut self, timeout: Duration) -> Self {
        self.import_timeout = timeout;
        self
    }

    /// Uses `NEBARI_TOFU_BINARY`, falling back to `tofu` on `PATH`.
    pub fn from_env() -> Self {
        let binary = std::env::var(TOFU_BINARY_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_TOFU_BINARY));
        Self::new(binary)
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Returns the `major.minor.patch` version reported by the tool.
    pub async fn version(&self) -> Result<String> {
        let args = vec!["--version".to_string()];
        let cwd = std::env::current_dir()?;
        let output = self
            .execute(
                &cwd,
                &args,
                &ExecEnv::new(),
                RunOptions {
                    capture_stdout: true,
                    ..Default::default()
                },
            )
            .await?;

        let pattern = Regex::new(r"(\d+)\.(\d+)\.(\d+)").map_err(|e| TofuError::InvalidOutput {
            command: self.describe(&args),
            reason: e.to_string(),
        })?;
        pattern
            .find(&output)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| TofuError::InvalidOutput {
                command: self.describe(&args),
                reason: "no version number found".to_string(),
            })
    }

    pub async fn init(&self, directory: &Path, env: &ExecEnv) -> Result<()> {
        tracing::info!(directory = %directory.display(), "tofu init");
        let args = vec!["init".to_string(), "-upgrade".to_string()];
        self.execute(directory, &args, env, RunOptions::default())
            .await?;
        Ok(())
    }

    pub async fn apply(
        &self,
        directory: &Path,
        targets: &[String],
        var_files: &[PathBuf],
        env: &ExecEnv,
    ) -> Result<()> {
        tracing::info!(directory = %directory.display(), ?targets, "tofu apply");
        let args = mutate_args("apply", targets, var_files);
        self.execute(directory, &args, env, RunOptions::default())
            .await?;
        Ok(())
    }

    pub async fn destroy(
        &self,
        directory: &Path,
        targets: &[String],
        var_files: &[PathBuf],
        env: &ExecEnv,
    ) -> Result<()> {
        tracing::info!(directory = %directory.display(), ?targets, "tofu destroy");
        let args = mutate_args("destroy", targets, var_files);
        self.execute(directory, &args, env, RunOptions::default())
            .await?;
        Ok(())
    }

    /// Parses `output -json`. Entries keep the `{"value", "type", "sensitive"}` shape.
    pub async fn output(&self, directory: &Path, env: &ExecEnv) -> Result<Map<String, Value>> {
        tracing::info!(directory = %directory.display(), "tofu output");
        let args = vec!["output".to_string(), "-json".to_string()];
        let stdout = self
            .execute(
                directory,
                &args,
                env,
                RunOptions {
                    capture_stdout: true,
                    ..Default::default()
                },
            )
            .await?;

        parse_outputs(&stdout).map_err(|reason| TofuError::InvalidOutput {
            command: self.describe(&args),
            reason,
        })
    }

    /// Adopts an existing resource into state.
    ///
    /// With `exist_ok` a non-zero exit (the resource is usually already
    /// managed) is only logged. Timeouts and spawn errors always propagate.
    pub async fn import(
        &self,
        directory: &Path,
        address: &str,
        id: &str,
        var_files: &[PathBuf],
        exist_ok: bool,
        env: &ExecEnv,
    ) -> Result<()> {
        tracing::info!(directory = %directory.display(), address, id, "tofu import");
        let mut args = vec!["import".to_string()];
        args.extend(var_files.iter().map(|f| format!("-var-file={}", f.display())));
        args.push(address.to_string());
        args.push(id.to_string());

        let result = self
            .execute(
                directory,
                &args,
                env,
                RunOptions {
                    strip_errors: true,
                    timeout: Some(self.import_timeout),
                    capture_stdout: false,
                },
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e @ TofuError::CommandFailed { .. }) if exist_ok => {
                tracing::warn!(address, "import skipped: {}", first_line(&e.to_string()));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn describe(&self, args: &[String]) -> String {
        format!("{} {}", self.binary.display(), args.join(" "))
    }

    async fn execute(
        &self,
        directory: &Path,
        args: &[String],
        env: &ExecEnv,
        options: RunOptions,
    ) -> Result<String> {
        let command = self.describe(args);
        tracing::debug!(cwd = %directory.display(), env = ?env, "running: {}", command);

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(directory)
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TofuError::NotFound(self.binary.display().to_string())
            } else {
                TofuError::Io(e)
            }
        })?;

        let started = Instant::now();
        let output = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, pump(&mut child, options)).await {
                Ok(output) => output?,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!("failed to kill timed out process: {}", e);
                    }
                    return Err(TofuError::Timeout {
                        command,
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => pump(&mut child, options).await?,
        };
        tracing::debug!(elapsed = ?started.elapsed(), "finished: {}", command);

        if !output.status.success() {
            let tail_start = output.transcript.len().saturating_sub(OUTPUT_TAIL_LINES);
            return Err(TofuError::CommandFailed {
                command,
                code: output.status.code().unwrap_or(-1),
                output: output.transcript[tail_start..].join("\n"),
            });
        }

        Ok(output.stdout)
    }
}

impl Default for Tofu {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Drains stdout and stderr concurrently until the child exits.
async fn pump(child: &mut Child, options: RunOptions) -> Result<RunOutput> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr was not captured"))?;

    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();
    let mut out_done = false;
    let mut err_done = false;
    let mut captured = String::new();
    let mut transcript = Vec::new();

    while !(out_done && err_done) {
        tokio::select! {
            line = out_lines.next_line(), if !out_done => match line? {
                Some(line) if options.capture_stdout => {
                    captured.push_str(&line);
                    captured.push('\n');
                }
                Some(line) => transcript.push(log_line(line, options.strip_errors)),
                None => out_done = true,
            },
            line = err_lines.next_line(), if !err_done => match line? {
                Some(line) => transcript.push(log_line(line, options.strip_errors)),
                None => err_done = true,
            },
        }
    }

    let status = child.wait().await?;
    Ok(RunOutput {
        status,
        stdout: captured,
        transcript,
    })
}

fn log_line(line: String, strip_errors: bool) -> String {
    let line = if strip_errors {
        line.replace(ANSI_RED, "")
    } else {
        line
    };
    tracing::info!("{} {}", LINE_PREFIX, line);
    line
}

fn mutate_args(verb: &str, targets: &[String], var_files: &[PathBuf]) -> Vec<String> {
    let mut args = vec![verb.to_string(), "-auto-approve".to_string()];
    args.extend(targets.iter().map(|t| format!("-target={}", t)));
    args.extend(var_files.iter().map(|f| format!("-var-file={}", f.display())));
    args
}

fn parse_outputs(stdout: &str) -> std::result::Result<Map<String, Value>, String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", other)),
        Err(e) => Err(e.to_string()),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}
