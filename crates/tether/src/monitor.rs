//! One supervised child slot.
//!
//! A monitor task owns the child, the watcher and the pid record, and moves
//! through `Starting → Running → Restarting → Starting …` until it is
//! stopped. Kill-then-respawn is strictly sequential: the previous child is
//! waited on and its record removed before the next spawn.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tracing::Instrument;

use crate::command;
use crate::error::{Error, Result};
use crate::logs::UnitLog;
use crate::pidstore::PidStore;
use crate::types::MonitorState;
use crate::watcher::{ChangeWatcher, IgnoreSet};

/// A child alive this long after spawn counts as started.
pub const SETTLE_WINDOW: Duration = Duration::from_millis(200);
/// Delay before respawning a child that exited on its own.
pub const RESPAWN_BACKOFF: Duration = Duration::from_millis(500);

/// Everything a monitor needs to run one unit.
#[derive(Debug, Clone)]
pub struct MonitorSpec {
	pub unit_id: String,
	pub definition_id: String,
	pub command: String,
	pub cwd: PathBuf,
	pub watch: Vec<PathBuf>,
	pub ignore: IgnoreSet,
	pub log_file: PathBuf,
	/// Changes are not acted on for this long after each start.
	pub quiet_period: Duration,
}

/// Resolves once with the outcome of the first start.
pub type Startup = oneshot::Receiver<Result<()>>;

pub struct Monitor {
	unit_id: String,
	log_file: PathBuf,
	cancel: watch::Sender<bool>,
	state: watch::Receiver<MonitorState>,
}

impl Monitor {
	pub fn spawn(spec: MonitorSpec, pids: PidStore) -> Result<(Self, Startup)> {
		let log = UnitLog::open(&spec.log_file)?;
		let watcher = ChangeWatcher::watch(&spec.watch, spec.ignore.clone())?;

		let (cancel_tx, cancel_rx) = watch::channel(false);
		let (state_tx, state_rx) = watch::channel(MonitorState::Idle);
		let (startup_tx, startup_rx) = oneshot::channel();

		let span = tracing::info_span!(
			"unit",
			id = %spec.unit_id,
			cmd = %spec.command,
			cwd = %spec.cwd.display()
		);
		let monitor = Self {
			unit_id: spec.unit_id.clone(),
			log_file: spec.log_file.clone(),
			cancel: cancel_tx,
			state: state_rx,
		};
		let task = MonitorTask {
			spec,
			pids,
			log,
			watcher,
			cancel: cancel_rx,
			state: state_tx,
			startup: Some(startup_tx),
			has_run: false,
		};
		tokio::spawn(task.run().instrument(span));

		Ok((monitor, startup_rx))
	}

	pub fn unit_id(&self) -> &str {
		&self.unit_id
	}

	pub fn log_file(&self) -> &Path {
		&self.log_file
	}

	pub fn state(&self) -> MonitorState {
		self.state.borrow().clone()
	}

	pub fn pid(&self) -> Option<u32> {
		self.state.borrow().pid()
	}

	pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
		self.state.clone()
	}

	/// Permanently retires the monitor. Resolves once the child has exited
	/// and its pid record is gone.
	pub async fn stop(&self) {
		self.cancel.send_replace(true);
		let mut state = self.state.clone();
		// Err means the task is already gone.
		let _ = state.wait_for(|s| *s == MonitorState::Stopped).await;
	}
}

enum Next {
	Respawn,
	Backoff,
	Stop,
}

struct MonitorTask {
	spec: MonitorSpec,
	pids: PidStore,
	log: UnitLog,
	watcher: ChangeWatcher,
	cancel: watch::Receiver<bool>,
	state: watch::Sender<MonitorState>,
	startup: Option<oneshot::Sender<Result<()>>>,
	/// Set once a child has proven it can start.
	has_run: bool,
}

impl MonitorTask {
	async fn run(mut self) {
		loop {
			if self.stopping() {
				break;
			}
			self.state.send_replace(MonitorState::Starting);
			tracing::info!("starting");
			self.log.note(&format!("starting `{}`", self.spec.command));

			let child = match command::spawn(&self.spec.command, &self.spec.cwd, &self.log) {
				Ok(child) => child,
				Err(err) => {
					tracing::error!("{}", err);
					self.log.note(&err.to_string());
					self.settle_startup(Err(err));
					break;
				}
			};

			match self.supervise(child).await {
				Next::Respawn => {}
				Next::Backoff => {
					if !self.pause(RESPAWN_BACKOFF).await {
						break;
					}
				}
				Next::Stop => break,
			}
		}

		self.watcher.disarm();
		if self.startup.is_some() {
			self.settle_startup(Err(Error::Interrupted(self.spec.unit_id.clone())));
		}
		self.state.send_replace(MonitorState::Stopped);
		tracing::info!("stopped");
	}

	async fn supervise(&mut self, mut child: Child) -> Next {
		let pid = child.id().unwrap_or(0);

		tokio::select! {
			status = child.wait() => return self.exited_early(pid, status),
			_ = stopped(&mut self.cancel) => {
				self.terminate(&mut child).await;
				return Next::Stop;
			}
			_ = tokio::time::sleep(SETTLE_WINDOW) => {}
		}

		if let Err(e) = self.pids.record(pid, &self.spec.unit_id, &self.spec.definition_id) {
			tracing::warn!(child_pid = pid, "failed to write pid record: {}", e);
		}
		self.has_run = true;
		self.state.send_replace(MonitorState::Running { pid });
		tracing::info!(child_pid = pid, "running");
		self.settle_startup(Ok(()));
		self.watcher.arm(self.spec.quiet_period);

		let next = tokio::select! {
			status = child.wait() => {
				self.pids.remove(pid);
				self.report_exit(pid, status);
				Next::Backoff
			}
			_ = stopped(&mut self.cancel) => {
				self.terminate(&mut child).await;
				self.pids.remove(pid);
				Next::Stop
			}
			Some(path) = self.watcher.changed() => {
				tracing::info!(child_pid = pid, path = %path.display(), "change detected, restarting");
				self.watcher.disarm();
				self.terminate(&mut child).await;
				self.pids.remove(pid);
				Next::Respawn
			}
		};

		self.watcher.disarm();
		if !matches!(next, Next::Stop) {
			self.state.send_replace(MonitorState::Restarting);
		}
		next
	}

	/// Exit inside the settle window.
	fn exited_early(&mut self, pid: u32, status: std::io::Result<ExitStatus>) -> Next {
		let status = match status {
			Ok(status) => status,
			Err(e) => {
				tracing::error!(child_pid = pid, "failed to wait on child: {}", e);
				self.settle_startup(Err(e.into()));
				return Next::Stop;
			}
		};
		tracing::info!(child_pid = pid, code = ?status.code(), "dead");
		self.log.note(&format!("exited during startup ({})", describe(&status)));

		if self.has_run {
			self.state.send_replace(MonitorState::Restarting);
			return Next::Backoff;
		}
		if !status.success() {
			let err = Error::StartFailed {
				command: self.spec.command.clone(),
				cwd: self.spec.cwd.clone(),
				code: status.code(),
			};
			tracing::error!("{}", err);
			self.settle_startup(Err(err));
			return Next::Stop;
		}

		// A clean exit is not a failed start; the keep-running policy applies.
		self.has_run = true;
		self.settle_startup(Ok(()));
		self.state.send_replace(MonitorState::Restarting);
		Next::Backoff
	}

	fn report_exit(&self, pid: u32, status: std::io::Result<ExitStatus>) {
		match status {
			Ok(status) => {
				tracing::info!(child_pid = pid, code = ?status.code(), "dead, respawning");
				self.log.note(&format!("exited ({}), respawning", describe(&status)));
			}
			Err(e) => tracing::warn!(child_pid = pid, "failed to wait on child: {}", e),
		}
	}

	/// SIGKILL the child's process group and wait for it to be reaped.
	async fn terminate(&self, child: &mut Child) {
		if let Some(pid) = child.id() {
			tracing::info!(child_pid = pid, "killing");
			self.log.note("killed by supervisor");
			let killed = i32::try_from(pid)
				.map(|raw| killpg(Pid::from_raw(raw), Signal::SIGKILL).is_ok())
				.unwrap_or(false);
			if !killed {
				let _ = child.start_kill();
			}
		}
		if let Err(e) = child.wait().await {
			tracing::warn!("failed to wait on killed child: {}", e);
		}
	}

	/// Sleeps unless stopped first. Returns false when stopped.
	async fn pause(&mut self, delay: Duration) -> bool {
		tokio::select! {
			_ = tokio::time::sleep(delay) => !self.stopping(),
			_ = stopped(&mut self.cancel) => false,
		}
	}

	fn stopping(&self) -> bool {
		*self.cancel.borrow() || self.cancel.has_changed().is_err()
	}

	fn settle_startup(&mut self, result: Result<()>) {
		if let Some(tx) = self.startup.take() {
			let _ = tx.send(result);
		}
	}
}

/// Resolves when a stop was requested or the handle was dropped.
async fn stopped(cancel: &mut watch::Receiver<bool>) {
	let _ = cancel.wait_for(|stop| *stop).await;
}

fn describe(status: &ExitStatus) -> String {
	match status.code() {
		Some(code) => format!("exit {}", code),
		None => "killed by signal".to_string(),
	}
}
