/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use log::*;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::process::*;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use wait_timeout::ChildExt;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("could not start `{0}`: {1}")]
    Spawn(String, #[source] io::Error),
    #[error("`{0}` failed with status code {1:?}: {2}")]
    Failed(String, Option<i32>, String),
    #[error("`{0}` did not finish within {1:?}")]
    TimedOut(String, Duration),
    #[error("`{0}`: {1}")]
    Io(String, #[source] io::Error),
}

fn describe(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(err) = pipe.read_to_end(&mut buf) {
                debug!("Could not read child output: {err}");
            }
            // The caller may have given up waiting already.
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
    }
    rx
}

/// Wait for a drained pipe until `deadline`. A process the child left behind
/// can hold the pipe open long after the child itself exited.
fn collect(
    reader: &mpsc::Receiver<String>,
    deadline: Instant,
    cmd_str: &str,
    timeout: Duration,
) -> Result<String, CommandError> {
    match reader.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(out) => Ok(out),
        Err(RecvTimeoutError::Disconnected) => Ok(String::new()),
        Err(RecvTimeoutError::Timeout) => {
            warn!("Output of `{cmd_str}` still open after {timeout:?}");
            Err(CommandError::TimedOut(cmd_str.to_owned(), timeout))
        }
    }
}

/// Run a command to completion, killing it after `timeout`, and return its
/// stdout.
///
/// `input`, when given, is written to the child's stdin from a separate
/// thread so a child that never reads cannot wedge the caller.
pub fn run_with_timeout(
    program: &str,
    args: &[&str],
    input: Option<&str>,
    timeout: Duration,
) -> Result<String, CommandError> {
    let cmd_str = describe(program, args);
    debug!("Running: {cmd_str}");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CommandError::Spawn(cmd_str.clone(), e))?;
    let deadline = Instant::now() + timeout;

    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        let input = input.to_owned();
        thread::spawn(move || {
            if let Err(err) = stdin.write_all(input.as_bytes()) {
                warn!("Failed to write to stdin: {err}");
            }
        });
    }

    // Read both pipes concurrently so a chatty child cannot fill one and block.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            debug!("Killing the process: {cmd_str}");
            if let Err(err) = child.kill() {
                warn!("Could not kill `{cmd_str}`: {err}");
            }
            let _ = child.wait();
            return Err(CommandError::TimedOut(cmd_str, timeout));
        }
        Err(err) => return Err(CommandError::Io(cmd_str, err)),
    };

    let cmd_response = collect(&stdout, deadline, &cmd_str, timeout)?;
    let cmd_stderr = collect(&stderr, deadline, &cmd_str, timeout)?;

    if status.success() {
        trace!("Cmd: {cmd_str} is successful, response: {cmd_response}");
        Ok(cmd_response)
    } else {
        error!(
            "Cmd: {cmd_str} failed with status code: {:?}, response: {cmd_response}{cmd_stderr}",
            status.code()
        );
        let detail = if cmd_stderr.trim().is_empty() {
            cmd_response
        } else {
            cmd_stderr
        };
        Err(CommandError::Failed(
            cmd_str,
            status.code(),
            detail.trim().to_owned(),
        ))
    }
}

/// Start a command without waiting for it. A detached thread reaps the child
/// so it does not linger as a zombie.
pub fn spawn_detached(program: &str, args: &[&str]) {
    let cmd_str = describe(program, args);
    debug!("Spawning: {cmd_str}");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match child {
        Ok(mut child) => {
            thread::spawn(move || match child.wait() {
                Ok(status) if !status.success() => {
                    error!("Cmd: {cmd_str} failed with status code: {:?}", status.code())
                }
                Ok(_) => debug!("Cmd: {cmd_str} is successful"),
                Err(err) => error!("Cmd: {cmd_str} could not be awaited: {err}"),
            });
        }
        Err(err) => error!("Could not start `{cmd_str}`: {err}"),
    }
}

/// Whether a TCP connection to `host` (`name:port`) can be opened.
pub fn is_reachable(host: &str, timeout: Duration) -> bool {
    let addrs = match host.to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(err) => {
            debug!("Could not resolve {host}: {err}");
            return false;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return true,
            Err(err) => debug!("Could not reach {addr}: {err}"),
        }
    }

    false
}
