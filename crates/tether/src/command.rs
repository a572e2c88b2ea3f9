use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

use crate::error::{Error, Result};
use crate::logs::UnitLog;

// Version managers (nvm, rbenv, ...) are usually set up in these.
const PROFILE_PREAMBLE: &str =
	"test -f ~/.bashrc && source ~/.bashrc; test -f ~/.bash_profile && source ~/.bash_profile; exec ";

pub const DOCKER_HOST_IP: &str = "DOCKER_HOST_IP";
const DEFAULT_HOST_IP: &str = "127.0.0.1";

/// Host part of a `scheme://host:port` address, loopback otherwise.
pub fn docker_host_ip(docker_host: Option<&str>) -> String {
	docker_host
		.and_then(parse_host)
		.unwrap_or(DEFAULT_HOST_IP)
		.to_string()
}

fn parse_host(addr: &str) -> Option<&str> {
	let (_, rest) = addr.split_once("://")?;
	let (host, port) = rest.rsplit_once(':')?;
	let port = port.trim_end_matches('/');
	if host.is_empty() || port.parse::<u16>().is_err() {
		return None;
	}
	Some(host)
}

pub fn shell_line(command: &str) -> String {
	format!("{}{}", PROFILE_PREAMBLE, command)
}

/// Spawns `command` through bash in its own process group, with both output
/// streams appended to `log`.
pub fn spawn(command: &str, cwd: &Path, log: &UnitLog) -> Result<Child> {
	let spawn_err = |source| Error::Spawn {
		command: command.to_string(),
		cwd: cwd.to_path_buf(),
		source,
	};

	let host = std::env::var("DOCKER_HOST").ok();
	let mut cmd = Command::new("/bin/bash");
	cmd.args(["-c", &shell_line(command)])
		.current_dir(cwd)
		.env(DOCKER_HOST_IP, docker_host_ip(host.as_deref()))
		.stdin(Stdio::null())
		.stdout(log.stdio().map_err(spawn_err)?)
		.stderr(log.stdio().map_err(spawn_err)?)
		.process_group(0);

	cmd.spawn().map_err(spawn_err)
}
