//! Shared subprocess utilities for helper scripts and the external converter.
//!
//! Stdout is parsed as JSON progress lines (anything else is logged at debug
//! level); stderr is drained concurrently so a chatty child cannot block on a
//! full pipe, and kept for failure detail.

use std::process::{ExitStatus, Stdio};

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{ConvertError, Result};

/// JSON progress line emitted by the embedded helper scripts on stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptProgressLine {
    pub stage: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Exit status and captured stderr of a finished child.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub status: ExitStatus,
    pub stderr: String,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stderr if non-empty, else a generic exit-status description.
    pub fn failure_detail(&self, program: &str) -> String {
        if self.stderr.trim().is_empty() {
            format!(
                "{program} exited with status: {}",
                self.status.code().unwrap_or(-1)
            )
        } else {
            self.stderr.clone()
        }
    }
}

/// Spawn `cmd`, feed each JSON stdout line to `on_line`, and wait for exit.
///
/// Spawn failures are errors; a non-zero exit is not, so callers can choose
/// which failure class it belongs to.
pub async fn run_streaming<F>(
    mut cmd: Command,
    program: &str,
    mut on_line: F,
) -> Result<ProcessOutcome>
where
    F: FnMut(ScriptProgressLine),
{
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ConvertError::SpawnFailed {
            program: program.to_string(),
            message: e.to_string(),
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ConvertError::Other(format!("{program}: stdout was not piped")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ConvertError::Other(format!("{program}: stderr was not piped")))?;

    let read_stdout = async {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = next_lossy_line(&mut reader, &mut buf, program, "stdout").await {
            match serde_json::from_str::<ScriptProgressLine>(&line) {
                Ok(progress) => on_line(progress),
                Err(_) => debug!("[{}] {}", program, line),
            }
        }
    };

    let read_stderr = async {
        let mut captured = String::new();
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        while let Some(line) = next_lossy_line(&mut reader, &mut buf, program, "stderr").await {
            debug!("[{}] stderr: {}", program, line);
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    };

    let ((), stderr) = tokio::join!(read_stdout, read_stderr);

    let status = child.wait().await.map_err(|e| ConvertError::SpawnFailed {
        program: program.to_string(),
        message: format!("process error: {e}"),
    })?;

    Ok(ProcessOutcome { status, stderr })
}

/// Read one line, decoding invalid UTF-8 lossily. Returns `None` at EOF or
/// on a read error.
async fn next_lossy_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    program: &str,
    pipe: &str,
) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => None,
        Ok(_) => {
            let line = String::from_utf8_lossy(buf);
            Some(line.trim_end_matches(['\n', '\r']).to_string())
        }
        Err(e) => {
            warn!("Error reading {} {}: {}", program, pipe, e);
            None
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn test_json_lines_are_parsed_and_noise_ignored() {
        let mut stages = Vec::new();
        let outcome = run_streaming(
            sh(r#"echo '{"stage":"loaded","device":"cpu"}'; echo 'plain log line'; echo '{"stage":"saved"}'"#),
            "sh",
            |line| stages.push(line.stage),
        )
        .await
        .unwrap();

        assert!(outcome.success());
        assert_eq!(stages, vec!["loaded".to_string(), "saved".to_string()]);
    }

    #[tokio::test]
    async fn test_stderr_is_captured_on_failure() {
        let outcome = run_streaming(sh("echo 'boom' >&2; exit 3"), "sh", |_| {})
            .await
            .unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome.status.code(), Some(3));
        assert_eq!(outcome.failure_detail("sh"), "boom\n");
    }

    #[tokio::test]
    async fn test_failure_detail_without_stderr() {
        let outcome = run_streaming(sh("exit 2"), "converter", |_| {}).await.unwrap();
        assert_eq!(
            outcome.failure_detail("converter"),
            "converter exited with status: 2"
        );
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let err = run_streaming(Command::new("/nonexistent/tool"), "tool", |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_reading() {
        let mut stages = Vec::new();
        let outcome = run_streaming(
            sh(r#"printf '\377 tok\n'; printf '\376 warn\n' >&2; sleep 0.2; echo '{"stage":"saving"}'; echo done >&2; exit 0"#),
            "sh",
            |line| stages.push(line.stage),
        )
        .await
        .unwrap();

        assert!(outcome.success());
        assert_eq!(stages, vec!["saving".to_string()]);
        assert_eq!(outcome.stderr, "\u{FFFD} warn\ndone\n");
    }

    #[tokio::test]
    async fn test_stderr_after_invalid_utf8_is_kept_verbatim() {
        let outcome = run_streaming(
            sh(r#"printf '\377\n' >&2; i=0; while [ $i -lt 2000 ]; do echo "INFO:hf-to-gguf:tensor $i" >&2; i=$((i+1)); done; echo 'fatal' >&2; exit 1"#),
            "converter",
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(outcome.status.code(), Some(1));
        assert!(outcome.stderr.starts_with("\u{FFFD}\nINFO:hf-to-gguf:tensor 0\n"));
        assert!(outcome.stderr.ends_with("tensor 1999\nfatal\n"));
    }
}
