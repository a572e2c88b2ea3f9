use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("missing command in unit definition {0}")]
	MissingCommand(String),

	#[error("failed to spawn `{command}` in {}: {source}", cwd.display())]
	Spawn {
		command: String,
		cwd: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("unable to start {command} in folder {}", cwd.display())]
	StartFailed {
		command: String,
		cwd: PathBuf,
		code: Option<i32>,
	},

	#[error("unit {0} was stopped before it finished starting")]
	Interrupted(String),

	#[error("invalid ignore pattern `{pattern}`: {source}")]
	Pattern {
		pattern: String,
		#[source]
		source: regex::Error,
	},

	#[error("watch error: {0}")]
	Watch(#[from] notify::Error),

	#[error("bad pid record {}: {source}", path.display())]
	Record {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("failed to parse {}: {source}", path.display())]
	Config {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
