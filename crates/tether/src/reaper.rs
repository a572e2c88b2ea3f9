//! Startup cleanup of children left behind by a supervisor that died hard
//! (SIGKILL, power loss) while units were running.

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{getpgid, Pid};

use crate::error::Result;
use crate::pidstore::{PidRecord, PidStore};

/// Kills every still-alive process referenced by a pid record and deletes
/// all records. Returns how many processes were terminated.
pub fn reap(store: &PidStore) -> Result<usize> {
	let records = store.list()?;
	if records.is_empty() {
		return Ok(0);
	}
	tracing::debug!(count = records.len(), dir = %store.dir().display(), "found leftover pid records");

	let mut killed = 0;
	for record in &records {
		if reap_one(record) {
			killed += 1;
		}
		store.remove(record.pid);
	}
	tracing::info!(killed, scanned = records.len(), "reaped leftover processes");
	Ok(killed)
}

fn reap_one(record: &PidRecord) -> bool {
	let Some(pid) = to_pid(record.pid) else {
		tracing::warn!(pid = record.pid, "ignoring pid record with invalid pid");
		return false;
	};
	if record.pid == std::process::id() {
		return false;
	}
	if !is_alive(record.pid) {
		tracing::debug!(pid = record.pid, unit = %record.unit_id, "stale record, process already gone");
		return false;
	}

	// Children run in their own process group; take the whole group when
	// the pid still leads one.
	let result = match getpgid(Some(pid)) {
		Ok(pgid) if pgid == pid => killpg(pgid, Signal::SIGKILL),
		_ => kill(pid, Signal::SIGKILL),
	};
	match result {
		Ok(()) => {
			tracing::info!(pid = record.pid, unit = %record.unit_id, "killed rogue process");
			true
		}
		Err(e) => {
			tracing::error!(pid = record.pid, unit = %record.unit_id, "failed to kill rogue process: {}", e);
			false
		}
	}
}

/// Process-table lookup via signal 0. A process we may not signal still exists.
pub fn is_alive(pid: u32) -> bool {
	let Some(pid) = to_pid(pid) else {
		return false;
	};
	match kill(pid, None::<Signal>) {
		Ok(()) => true,
		Err(Errno::EPERM) => true,
		Err(_) => false,
	}
}

fn to_pid(pid: u32) -> Option<Pid> {
	match i32::try_from(pid) {
		Ok(raw) if raw > 0 => Some(Pid::from_raw(raw)),
		_ => None,
	}
}
