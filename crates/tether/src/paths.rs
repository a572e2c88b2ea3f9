use std::path::PathBuf;

/// Per-host directories used by the supervisor.
#[derive(Debug, Clone)]
pub struct StatePaths {
	pub app_name: String,
}

impl StatePaths {
	pub fn new(app_name: impl Into<String>) -> Self {
		Self {
			app_name: app_name.into(),
		}
	}

	pub fn state_dir(&self) -> PathBuf {
		self.xdg("XDG_STATE_HOME", &[".local", "state"])
	}

	pub fn config_dir(&self) -> PathBuf {
		self.xdg("XDG_CONFIG_HOME", &[".config"])
	}

	/// `$var/<app>`, else `~/<under>/<app>`, else `<tmp>/<app>`.
	fn xdg(&self, var: &str, under: &[&str]) -> PathBuf {
		let base = match (std::env::var_os(var), home_dir()) {
			(Some(dir), _) => PathBuf::from(dir),
			(None, Some(home)) => under.iter().fold(home, |acc, part| acc.join(part)),
			(None, None) => std::env::temp_dir(),
		};
		base.join(&self.app_name)
	}

	/// Where pid records live.
	pub fn data_dir(&self) -> PathBuf {
		self.state_dir().join("data")
	}

	pub fn log_dir(&self) -> PathBuf {
		self.state_dir().join("log")
	}

	pub fn config_path(&self) -> PathBuf {
		self.config_dir().join("config.toml")
	}
}

pub fn expand_tilde(path: &str) -> PathBuf {
	if let Some(rest) = path.strip_prefix("~/") {
		if let Some(home) = home_dir() {
			return home.join(rest);
		}
	}
	PathBuf::from(path)
}

fn home_dir() -> Option<PathBuf> {
	std::env::var_os("HOME").filter(|h| !h.is_empty()).map(PathBuf::from)
}
