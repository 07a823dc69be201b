//! Running the cloud CLI and decoding what it prints.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::process::{Command, ExitStatus};

use color_eyre::eyre::{eyre, Context, Result};

/// Trailing stderr bytes kept in a failure report.
const MAX_STDERR_BYTES: u64 = 1024;

/// Helpers intended for [`std::process::Command`].
pub trait CommandRun {
    /// Execute the child with stdout spooled to an anonymous temporary file,
    /// returning that file rewound to the start. Fails if the child cannot be
    /// spawned or exits unsuccessfully.
    fn run_get_output(&mut self) -> Result<File>;

    /// Execute the child and parse its stdout as JSON.
    fn run_and_parse_json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T>;
}

impl CommandRun for Command {
    fn run_get_output(&mut self) -> Result<File> {
        let program = self.get_program().to_string_lossy().into_owned();
        let mut stdout = tempfile::tempfile().context("creating stdout spool")?;
        let stderr = tempfile::tempfile().context("creating stderr spool")?;
        self.stdout(stdout.try_clone()?).stderr(stderr.try_clone()?);

        tracing::trace!("exec: {self:?}");
        let status = self
            .status()
            .with_context(|| format!("Failed to execute {program}"))?;
        check_status(status, stderr).with_context(|| format!("{program} failed"))?;

        stdout.seek(SeekFrom::Start(0)).context("seek")?;
        Ok(stdout)
    }

    fn run_and_parse_json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        let output = self.run_get_output()?;
        serde_json::from_reader(BufReader::new(output))
            .with_context(|| format!("Parsing JSON output of {:?}", self.get_program()))
    }
}

/// Turn an unsuccessful exit into an error carrying the tail of stderr.
fn check_status(status: ExitStatus, stderr: File) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    let tail = stderr_tail(stderr);
    Err(eyre!("Subprocess failed: {status}\n{tail}"))
}

fn stderr_tail(mut f: File) -> String {
    let len = f
        .metadata()
        .map(|m| m.len())
        .unwrap_or_else(|e| {
            tracing::warn!("failed to fstat: {e}");
            0
        });
    let keep = len.min(MAX_STDERR_BYTES);
    let mut buf = Vec::with_capacity(keep as usize);
    match f
        .seek(SeekFrom::Start(len - keep))
        .and_then(|_| f.read_to_end(&mut buf))
    {
        Ok(_) => String::from_utf8_lossy(&buf).trim_end().to_owned(),
        Err(e) => {
            tracing::warn!("failed seek+read: {e}");
            "<failed to read stderr>".into()
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_stdout() {
        let v: Vec<u32> = Command::new("sh")
            .args(["-c", "echo '[1, 2, 3]'"])
            .run_and_parse_json()
            .unwrap();
        assert_eq!(v, vec![1, 2, 3]);
    }

    #[test]
    fn test_failure_reports_stderr() {
        let err = Command::new("sh")
            .args(["-c", "echo 'quota service unavailable' >&2; exit 3"])
            .run_get_output()
            .unwrap_err();
        let msg = format!("{err:?}");
        assert!(msg.contains("quota service unavailable"), "{msg}");
    }

    #[test]
    fn test_stderr_is_truncated() {
        let err = Command::new("sh")
            .args(["-c", "printf 'A%.0s' $(seq 1 3000) >&2; echo END >&2; exit 1"])
            .run_get_output()
            .unwrap_err();
        let msg = format!("{err:?}");
        assert!(msg.contains("END"));
        assert!(!msg.contains(&"A".repeat(1100)));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let r: Result<serde_json::Value> = Command::new("sh")
            .args(["-c", "echo 'not json'"])
            .run_and_parse_json();
        assert!(r.is_err());
    }

    #[test]
    fn test_missing_program() {
        let r = Command::new("/nonexistent/findsku-az").run_get_output();
        assert!(r.is_err());
    }
}
