use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::HostConfig;
use crate::error::{Error, Result};
use crate::logs;
use crate::monitor::{Monitor, MonitorSpec};
use crate::pidstore::PidStore;
use crate::reaper;
use crate::types::{Unit, UnitDefinition};
use crate::watcher::IgnoreSet;

/// A running unit together with the descriptors it was started from.
#[derive(Clone)]
pub struct Deployed {
	pub unit: Arc<Unit>,
	pub definition: Arc<UnitDefinition>,
	pub monitor: Arc<Monitor>,
}

/// group id → unit id → deployed unit.
pub struct Registry {
	pids: PidStore,
	log_dir: PathBuf,
	quiet_period: Duration,
	groups: Mutex<HashMap<String, HashMap<String, Deployed>>>,
}

impl Registry {
	/// Reaps leftovers from a previous session before handing out a registry,
	/// so nothing can be started ahead of the cleanup.
	pub async fn open(config: &HostConfig) -> Result<Self> {
		let pids = PidStore::new(config.data_dir());
		let killed = reaper::reap(&pids)?;
		if killed > 0 {
			tracing::info!(killed, "cleaned up processes from a previous session");
		}
		Ok(Self {
			pids,
			log_dir: config.log_dir(),
			quiet_period: Duration::from_millis(config.quiet_period_ms),
			groups: Mutex::new(HashMap::new()),
		})
	}

	pub fn pid_store(&self) -> &PidStore {
		&self.pids
	}

	/// Starts `unit`, replacing (and first waiting out) any monitor already
	/// holding the same key. Resolves with the unit's log file once the
	/// child has settled, or with the first-start failure.
	pub async fn start(&self, group: &str, unit: Unit, definition: UnitDefinition) -> Result<PathBuf> {
		let spec = self.monitor_spec(&unit, &definition)?;

		// The map lock spans the old monitor's kill-and-wait and the new spawn,
		// so a key never has two live children. Other registry calls queue
		// behind it until the old child is gone.
		let (monitor, startup) = {
			let mut groups = self.groups.lock().await;
			if let Some(old) = groups.get_mut(group).and_then(|g| g.remove(&unit.id)) {
				tracing::info!(group, unit = %unit.id, "unit already running, killing it");
				old.monitor.stop().await;
			}

			tracing::info!(group, unit = %unit.id, cmd = %spec.command, "spawning");
			let (monitor, startup) = Monitor::spawn(spec, self.pids.clone())?;
			let monitor = Arc::new(monitor);
			groups.entry(group.to_string()).or_default().insert(
				unit.id.clone(),
				Deployed {
					unit: Arc::new(unit),
					definition: Arc::new(definition),
					monitor: Arc::clone(&monitor),
				},
			);
			(monitor, startup)
		};

		let outcome = match startup.await {
			Ok(outcome) => outcome,
			Err(_) => Err(Error::Interrupted(monitor.unit_id().to_string())),
		};
		if let Err(err) = outcome {
			self.forget(group, &monitor).await;
			return Err(err);
		}
		Ok(monitor.log_file().to_path_buf())
	}

	/// Stops and removes a unit. Returns whether one was deployed.
	pub async fn stop(&self, group: &str, unit_id: &str) -> bool {
		let removed = {
			let mut groups = self.groups.lock().await;
			groups.get_mut(group).and_then(|g| g.remove(unit_id))
		};
		match removed {
			Some(deployed) => {
				tracing::info!(group, unit = unit_id, "stopping");
				deployed.monitor.stop().await;
				true
			}
			None => false,
		}
	}

	pub async fn get_monitor(&self, group: &str, unit_id: &str) -> Option<Arc<Monitor>> {
		let groups = self.groups.lock().await;
		groups
			.get(group)
			.and_then(|g| g.get(unit_id))
			.map(|d| Arc::clone(&d.monitor))
	}

	pub async fn deployed(&self, group: &str) -> Vec<Deployed> {
		let groups = self.groups.lock().await;
		let mut deployed: Vec<Deployed> = groups
			.get(group)
			.map(|g| g.values().cloned().collect())
			.unwrap_or_default();
		deployed.sort_by(|a, b| a.unit.id.cmp(&b.unit.id));
		deployed
	}

	pub async fn deployed_units(&self, group: &str) -> Vec<Arc<Unit>> {
		self.deployed(group).await.into_iter().map(|d| d.unit).collect()
	}

	pub async fn deployed_definitions(&self, group: &str) -> Vec<Arc<UnitDefinition>> {
		self.deployed(group).await.into_iter().map(|d| d.definition).collect()
	}

	/// Stops every unit in every group and waits for all children to exit.
	pub async fn close(&self) {
		let drained: Vec<(String, String, Deployed)> = {
			let mut groups = self.groups.lock().await;
			groups
				.drain()
				.flat_map(|(group, units)| {
					units.into_iter().map(move |(id, d)| (group.clone(), id, d))
				})
				.collect()
		};

		let mut stops = tokio::task::JoinSet::new();
		for (group, id, deployed) in drained {
			tracing::info!(group = %group, unit = %id, "killing");
			stops.spawn(async move { deployed.monitor.stop().await });
		}
		while let Some(res) = stops.join_next().await {
			if let Err(e) = res {
				tracing::error!("stop task failed: {}", e);
			}
		}
	}

	fn monitor_spec(&self, unit: &Unit, definition: &UnitDefinition) -> Result<MonitorSpec> {
		if definition.command.trim().is_empty() {
			return Err(Error::MissingCommand(definition.id.clone()));
		}
		let cwd = definition.effective_dir();
		let ignored: Vec<String> = definition.ignored.iter().chain(&unit.ignored).cloned().collect();
		Ok(MonitorSpec {
			unit_id: unit.id.clone(),
			definition_id: definition.id.clone(),
			command: definition.command.clone(),
			watch: definition.resolved_watch(),
			ignore: IgnoreSet::new(cwd.clone(), &ignored)?,
			log_file: logs::unit_log_path(&self.log_dir, &unit.id),
			quiet_period: self.quiet_period,
			cwd,
		})
	}

	/// Drops the entry for a monitor whose first start failed, unless it has
	/// already been replaced.
	async fn forget(&self, group: &str, monitor: &Arc<Monitor>) {
		let mut groups = self.groups.lock().await;
		if let Some(units) = groups.get_mut(group) {
			let same = units
				.get(monitor.unit_id())
				.is_some_and(|d| Arc::ptr_eq(&d.monitor, monitor));
			if same {
				units.remove(monitor.unit_id());
			}
		}
	}
}
