//! Remote reachability probing.
//!
//! Before any remote operation runs, the target is probed in three steps:
//! resolve the effective endpoint through the ssh client's own config
//! resolution (`ssh -G`), poll a raw TCP connection against a deadline,
//! then confirm with a short-timeout `true` over ssh. The resolve step can
//! report a different host and port than the nominal destination when the
//! user's ssh configuration aliases it.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::process::Command;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::runner;

/// Timeout for a single TCP dial attempt.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between failed dial attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Effective connection endpoint reported by `ssh -G`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// Resolve the effective endpoint for `user@host` without connecting.
///
/// A failure here is fatal and not retried: it means the ssh client itself
/// rejects the destination or options.
pub fn resolve_endpoint(user: &str, host: &str, ssh_opts: &str) -> Result<Endpoint> {
    let destination = format!("{user}@{host}");
    let output = Command::new("sh")
        .arg("-c")
        .arg(format!("exec ssh {ssh_opts} {destination} -G"))
        .output()
        .map_err(|source| Error::Spawn {
            command: format!("ssh {destination} -G"),
            source,
        })?;

    if !output.status.success() {
        return Err(Error::EndpointResolve {
            destination,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_resolved_config(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
        Error::EndpointResolve {
            destination,
            message: "no hostname/port in ssh -G output".to_string(),
        }
    })
}

/// Extract the first `hostname` and `port` directives from `ssh -G` output.
pub(crate) fn parse_resolved_config(text: &str) -> Option<Endpoint> {
    let mut host = None;
    let mut port = None;
    for line in text.lines() {
        let line = line.trim();
        if host.is_none()
            && let Some(rest) = line.strip_prefix("hostname ")
        {
            host = Some(rest.to_string());
        }
        if port.is_none()
            && let Some(rest) = line.strip_prefix("port ")
        {
            port = rest.parse::<u16>().ok();
        }
    }
    Some(Endpoint {
        host: host?,
        port: port?,
    })
}

/// Poll a raw TCP connection to `endpoint` until it succeeds or `timeout`
/// elapses. A successful connection is closed immediately; this only
/// establishes reachability.
pub fn wait_for_port(endpoint: &Endpoint, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if Instant::now() > deadline {
            return Err(Error::RemoteUnresponsive {
                host: endpoint.host.clone(),
            });
        }
        match dial(endpoint) {
            Ok(()) => return Ok(()),
            Err(err) => {
                log::debug!("dial {}:{} failed: {err}", endpoint.host, endpoint.port);
            }
        }
        std::thread::sleep(RETRY_INTERVAL);
    }
}

fn dial(endpoint: &Endpoint) -> io::Result<()> {
    let addrs = (endpoint.host.as_str(), endpoint.port).to_socket_addrs()?;
    let mut last = io::Error::other("no addresses resolved");
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, DIAL_TIMEOUT) {
            Ok(stream) => {
                drop(stream);
                return Ok(());
            }
            Err(err) => last = err,
        }
    }
    Err(last)
}

/// Wait until `user@host` is reachable and accepts commands.
///
/// Resolves the endpoint, polls TCP reachability against `timeout`, then
/// runs a short-timeout `true` over ssh as the final liveness check.
pub fn wait_for_ssh(user: &str, host: &str, ssh_opts: &str, timeout: Duration) -> Result<()> {
    let endpoint = resolve_endpoint(user, host, ssh_opts)?;
    wait_for_port(&endpoint, timeout)?;

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(format!("exec timeout 10s ssh {ssh_opts} {user}@{host} -- true"));
    runner::run_logged(cmd, &mut io::sink())
}
