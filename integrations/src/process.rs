use async_trait::async_trait;
use std::process::Stdio;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error};
use xtrasnap_core::process::{CommandRunner, CommandSpec, ERROR_TAIL_LINES, last_lines};
use xtrasnap_core::{Error, Result};

/// Runs commands on the local machine.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> Result<String> {
        let command_line = command.to_string();
        debug!(command = %command_line, "Running command");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match &command.stdin_file {
            Some(path) => {
                let file = File::open(path).await?.into_std().await;
                cmd.stdin(Stdio::from(file));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        match &command.stdout_file {
            Some(path) => {
                let file = File::create(path).await?.into_std().await;
                cmd.stdout(Stdio::from(file));
            }
            None => {
                cmd.stdout(Stdio::piped());
            }
        }

        let mut child = cmd.spawn().map_err(|e| Error::Command {
            command: command_line.clone(),
            status: "not started".to_string(),
            stderr_tail: e.to_string(),
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let read_stdout = async move {
            let mut buffer = Vec::new();
            if let Some(mut stdout) = stdout {
                stdout.read_to_end(&mut buffer).await?;
            }
            Ok::<_, std::io::Error>(String::from_utf8_lossy(&buffer).into_owned())
        };

        let read_stderr = async move {
            let mut lines = Vec::new();
            if let Some(stderr) = stderr {
                let mut reader = BufReader::new(stderr).lines();
                while let Some(line) = reader.next_line().await? {
                    debug!(target: "xtrasnap::command", "{}", line);
                    lines.push(line);
                }
            }
            Ok::<_, std::io::Error>(lines)
        };

        let (status, stdout, stderr_lines) = tokio::try_join!(child.wait(), read_stdout, read_stderr)?;

        if status.success() {
            return Ok(stdout);
        }

        let refs: Vec<&str> = stderr_lines.iter().map(String::as_str).collect();
        let stderr_tail = last_lines(&refs, ERROR_TAIL_LINES);
        error!(command = %command_line, status = %status, "Command failed:\n{}", stderr_tail);

        Err(Error::Command {
            command: command_line,
            status: status.to_string(),
            stderr_tail,
        })
    }
}
