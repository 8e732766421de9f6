//! Subprocess execution with streamed, line-tagged logging.
//!
//! Every operation in this crate funnels through [`run_logged`]: the child
//! runs with stdin closed and stdout/stderr on separate pipes, two drain
//! threads log each line as it arrives, stdout is teed into the caller's
//! sink and stderr into a [`BoundedCapture`]. The call returns only after
//! the process has exited *and* both drains have seen end-of-stream, so the
//! caller always observes a complete stdout and no log lines are lost.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Command, Stdio};
use std::thread;

use crate::capture::BoundedCapture;
use crate::error::{Error, Result};

/// Budget for the stderr diagnostic: first 32 KiB plus last 32 KiB.
pub const STDERR_CAPTURE_BUDGET: usize = 32 * 1024;

/// Run `cmd` to completion, streaming output to the log and teeing stdout
/// into `stdout_sink`.
///
/// On a non-zero exit the returned error embeds the bounded stderr
/// diagnostic rather than the raw stream.
pub fn run_logged<W: Write + Send>(mut cmd: Command, stdout_sink: &mut W) -> Result<()> {
    let rendered = render_command(&cmd);
    log::debug!("running {rendered}");

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| Error::Spawn {
        command: rendered.clone(),
        source,
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

    let mut recorder = BoundedCapture::new(STDERR_CAPTURE_BUDGET);

    let status = thread::scope(|scope| -> Result<std::process::ExitStatus> {
        let out_drain = scope.spawn(|| drain_lines(stdout, "stdout", stdout_sink));
        let err_drain = scope.spawn(|| drain_lines(stderr, "stderr", &mut recorder));

        let status = child.wait();

        // Both drains must reach EOF before we return, otherwise the caller
        // could race ahead of a still-flushing pipe.
        join_drain(out_drain, "stdout")?;
        join_drain(err_drain, "stderr")?;

        Ok(status?)
    })?;

    if !status.success() {
        return Err(Error::CommandFailed {
            command: rendered,
            diagnostic: String::from_utf8_lossy(&recorder.bytes()).into_owned(),
        });
    }
    Ok(())
}

/// Run `cmd` and return its stdout as a string, with the same streamed
/// logging as [`run_logged`]. The caller is responsible for trimming.
pub fn run_capture(cmd: Command) -> Result<String> {
    let mut buf = Vec::new();
    run_logged(cmd, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn join_drain(
    handle: thread::ScopedJoinHandle<'_, io::Result<()>>,
    label: &str,
) -> Result<()> {
    match handle.join() {
        Ok(result) => Ok(result?),
        Err(_) => Err(io::Error::other(format!("{label} drain thread panicked")).into()),
    }
}

/// Read `source` line by line until EOF, logging each line tagged with its
/// stream name and teeing the raw bytes into `tee`.
fn drain_lines<R: Read>(source: R, label: &str, tee: &mut dyn Write) -> io::Result<()> {
    let mut reader = BufReader::new(source);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                tee.write_all(&line)?;
                let text = String::from_utf8_lossy(&line);
                log::info!("[{label}] {}", text.trim_end_matches(['\r', '\n']));
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            // A torn-down pipe means the child is gone; stop draining.
            Err(_) => break,
        }
    }
    Ok(())
}

/// Render a command line for log and error messages.
fn render_command(cmd: &Command) -> String {
    let mut rendered = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}
