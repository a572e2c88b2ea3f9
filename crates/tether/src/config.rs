use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::paths::{expand_tilde, StatePaths};
use crate::types::{Unit, UnitDefinition};

pub const APP_NAME: &str = "tether";

// ── Host config (~/.config/tether/config.toml) ──────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
	/// Pid record directory; defaults to `<state>/data`.
	pub data_dir: Option<PathBuf>,
	pub log_dir: Option<PathBuf>,
	#[serde(default = "default_quiet_period_ms")]
	pub quiet_period_ms: u64,
}

impl Default for HostConfig {
	fn default() -> Self {
		Self {
			data_dir: None,
			log_dir: None,
			quiet_period_ms: default_quiet_period_ms(),
		}
	}
}

fn default_quiet_period_ms() -> u64 { 1000 }

impl HostConfig {
	pub fn data_dir(&self) -> PathBuf {
		self.data_dir.clone().unwrap_or_else(|| StatePaths::new(APP_NAME).data_dir())
	}

	pub fn log_dir(&self) -> PathBuf {
		self.log_dir.clone().unwrap_or_else(|| StatePaths::new(APP_NAME).log_dir())
	}
}

/// Loads the host config, falling back to defaults when the file is absent.
pub fn load_host_config(path: Option<&Path>) -> Result<HostConfig> {
	let path = path
		.map(Path::to_path_buf)
		.unwrap_or_else(|| StatePaths::new(APP_NAME).config_path());
	let content = match std::fs::read_to_string(&path) {
		Ok(c) => c,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HostConfig::default()),
		Err(e) => return Err(e.into()),
	};
	toml::from_str(&content).map_err(|source| Error::Config { path, source })
}

// ── units.toml format ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct UnitsFile {
	#[serde(default = "default_group")]
	pub group: String,
	#[serde(default, rename = "unit")]
	pub units: Vec<UnitEntry>,
}

fn default_group() -> String { "default".to_string() }

/// Watch paths may be given as one string or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WatchDef {
	One(String),
	Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitEntry {
	pub id: String,
	pub name: Option<String>,
	pub definition: Option<String>,
	pub command: String,
	pub dir: String,
	pub cwd: Option<PathBuf>,
	#[serde(default)]
	watch: Option<WatchDef>,
	#[serde(default)]
	pub ignored: Vec<String>,
}

impl UnitEntry {
	/// `base` resolves a relative `dir`, usually the units file's directory.
	pub fn into_unit(self, base: &Path) -> (Unit, UnitDefinition) {
		let dir = expand_tilde(&self.dir);
		let working_dir = if dir.is_absolute() { dir } else { base.join(dir) };
		let watch = match self.watch {
			None => Vec::new(),
			Some(WatchDef::One(p)) => vec![PathBuf::from(p)],
			Some(WatchDef::Many(ps)) => ps.into_iter().map(PathBuf::from).collect(),
		};
		let definition_id = self.definition.unwrap_or_else(|| self.id.clone());
		let unit = Unit {
			name: self.name.unwrap_or_else(|| self.id.clone()),
			id: self.id,
			definition_id: definition_id.clone(),
			ignored: Vec::new(),
		};
		let definition = UnitDefinition {
			id: definition_id,
			command: self.command,
			working_dir,
			cwd: self.cwd,
			watch,
			ignored: self.ignored,
		};
		(unit, definition)
	}
}

pub fn parse_units(content: &str, path: &Path) -> Result<UnitsFile> {
	toml::from_str(content).map_err(|source| Error::Config {
		path: path.to_path_buf(),
		source,
	})
}

/// Reads a units file and resolves every entry against its directory.
pub fn load_units(path: &Path) -> Result<(String, Vec<(Unit, UnitDefinition)>)> {
	let content = std::fs::read_to_string(path)?;
	let file = parse_units(&content, path)?;
	let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
	let units = file.units.into_iter().map(|e| e.into_unit(&base)).collect();
	Ok((file.group, units))
}
