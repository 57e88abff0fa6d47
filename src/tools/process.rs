use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run a command to completion, killing it once `timeout` elapses.
///
/// Output pipes are drained on helper threads so a chatty tool cannot block
/// on a full pipe while we wait.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration, tool: &str) -> Result<Output> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to start {}", tool))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = std::thread::spawn(move || drain(stdout));
    let stderr_reader = std::thread::spawn(move || drain(stderr));

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().with_context(|| format!("Failed to wait for {}", tool))? {
            break status;
        }
        if started.elapsed() >= timeout {
            // Ignore kill errors: the process may have exited in between
            let _ = child.kill();
            let _ = child.wait();
            anyhow::bail!("{} timed out after {}s", tool, timeout.as_secs());
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(Output { status, stdout, stderr })
}

/// Like `run_with_timeout`, but a non-zero exit is an error carrying stderr
pub fn run_checked(cmd: &mut Command, timeout: Duration, tool: &str) -> Result<Output> {
    let output = run_with_timeout(cmd, timeout, tool)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "{} exited with {}: {}",
            tool,
            output.status,
            stderr.trim()
        );
    }
    Ok(output)
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buffer);
    }
    buffer
}
