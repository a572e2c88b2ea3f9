use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A deployed item: one long-running process managed by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
	pub id: String,
	pub name: String,
	pub definition_id: String,
	/// Extra ignore patterns on top of the definition's.
	#[serde(default)]
	pub ignored: Vec<String>,
}

/// How to run a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDefinition {
	pub id: String,
	pub command: String,
	pub working_dir: PathBuf,
	/// Subdirectory of `working_dir` to run in.
	#[serde(default)]
	pub cwd: Option<PathBuf>,
	#[serde(default)]
	pub watch: Vec<PathBuf>,
	#[serde(default)]
	pub ignored: Vec<String>,
}

impl UnitDefinition {
	pub fn effective_dir(&self) -> PathBuf {
		match &self.cwd {
			Some(sub) => self.working_dir.join(sub),
			None => self.working_dir.clone(),
		}
	}

	/// Watch paths resolved against the effective directory; nothing configured means `.`.
	pub fn resolved_watch(&self) -> Vec<PathBuf> {
		let dir = self.effective_dir();
		if self.watch.is_empty() {
			return vec![dir];
		}
		self.watch.iter().map(|p| dir.join(p)).collect()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
	Idle,
	Starting,
	Running { pid: u32 },
	Restarting,
	Stopped,
}

impl MonitorState {
	pub fn is_running(&self) -> bool {
		matches!(self, MonitorState::Running { .. })
	}

	pub fn pid(&self) -> Option<u32> {
		match self {
			MonitorState::Running { pid } => Some(*pid),
			_ => None,
		}
	}
}
