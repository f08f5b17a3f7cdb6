//! Subprocess execution for fenced code blocks and user script tools.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub output: String,
}

fn code_block_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").expect("static pattern")
    })
}

pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    code_block_pattern()
        .captures_iter(text)
        .map(|caps| CodeBlock {
            language: caps
                .get(1)
                .map(|m| m.as_str().to_ascii_lowercase())
                .unwrap_or_default(),
            code: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
        .collect()
}

/// Python interpreter, preferring the virtual environment when one is configured.
pub fn python_interpreter(venv: Option<&Path>) -> PathBuf {
    if let Some(venv) = venv {
        let candidate = if cfg!(windows) {
            venv.join("Scripts").join("python.exe")
        } else {
            venv.join("bin").join("python")
        };
        if candidate.exists() {
            return candidate;
        }
        warn!("No interpreter under {}, falling back to PATH", venv.display());
    }
    which::which("python3")
        .or_else(|_| which::which("python"))
        .unwrap_or_else(|_| PathBuf::from("python3"))
}

/// Runs `program` in `cwd`, feeding `stdin`, and returns combined stdout/stderr.
pub async fn run_process(
    program: &Path,
    args: &[String],
    stdin: Option<&str>,
    cwd: &Path,
    venv: Option<&Path>,
    timeout: Duration,
) -> Result<ProcessOutput, ApiError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(venv) = venv {
        let bin = if cfg!(windows) {
            venv.join("Scripts")
        } else {
            venv.join("bin")
        };
        let path = std::env::var_os("PATH").unwrap_or_default();
        let joined = std::env::join_paths(
            std::iter::once(bin).chain(std::env::split_paths(&path)),
        )
        .map_err(ApiError::internal)?;
        command.env("VIRTUAL_ENV", venv).env("PATH", joined);
    }

    debug!("Spawning {} in {}", program.display(), cwd.display());
    let mut child = command
        .spawn()
        .map_err(|e| ApiError::Upstream(format!("failed to start {}: {}", program.display(), e)))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .map_err(ApiError::internal)?;
    }

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(ApiError::internal)?,
        Err(_) => {
            return Ok(ProcessOutput {
                exit_code: 124,
                output: format!("Timed out after {}s", timeout.as_secs()),
            })
        }
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }

    Ok(ProcessOutput {
        exit_code: output.status.code().unwrap_or(-1),
        output: text,
    })
}

/// Runs code blocks one after another in a working directory, stopping at the first
/// failure.
#[derive(Debug, Clone)]
pub struct CodeExecutor {
    work_dir: PathBuf,
    venv: Option<PathBuf>,
    timeout: Duration,
}

impl CodeExecutor {
    pub fn new(work_dir: PathBuf, venv: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            work_dir,
            venv,
            timeout,
        }
    }

    pub async fn execute(&self, blocks: &[CodeBlock]) -> Result<ProcessOutput, ApiError> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(ApiError::internal)?;

        let mut combined = String::new();
        for block in blocks {
            let (program, extension) = match block.language.as_str() {
                "python" | "py" | "python3" => (python_interpreter(self.venv.as_deref()), "py"),
                "sh" | "bash" | "shell" | "" => (PathBuf::from("sh"), "sh"),
                other => {
                    return Ok(ProcessOutput {
                        exit_code: 1,
                        output: format!("{}unknown language {}", combined, other),
                    })
                }
            };

            let file_name = format!("tmp_code_{}.{}", Uuid::new_v4().simple(), extension);
            let script = self.work_dir.join(&file_name);
            tokio::fs::write(&script, &block.code)
                .await
                .map_err(ApiError::internal)?;

            let result = run_process(
                &program,
                &[file_name],
                None,
                &self.work_dir,
                self.venv.as_deref(),
                self.timeout,
            )
            .await;
            let _ = tokio::fs::remove_file(&script).await;

            let result = result?;
            combined.push_str(&result.output);
            if result.exit_code != 0 {
                return Ok(ProcessOutput {
                    exit_code: result.exit_code,
                    output: combined,
                });
            }
        }

        Ok(ProcessOutput {
            exit_code: 0,
            output: combined,
        })
    }
}
