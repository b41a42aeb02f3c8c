use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure of an external program invocation.
#[derive(Debug, Error)]
pub enum CommandFailure {
	#[error("`{command}` exited with status {code:?}")]
	Status {
		command: String,
		code: Option<i32>
	},

	#[error("failed to spawn `{command}`: {source}")]
	Spawn {
		command: String,
		#[source]
		source: std::io::Error
	}
}

impl CommandFailure {
	pub fn command(&self) -> &str {
		match self {
			Self::Status { command, .. } => command,
			Self::Spawn { command, .. } => command
		}
	}
}

#[derive(Debug, Error)]
pub enum FetchError {
	#[error("download of {url} failed: {failure}")]
	Download {
		url: String,
		failure: CommandFailure
	},

	#[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
	ChecksumMismatch {
		path: PathBuf,
		expected: String,
		actual: String
	},

	#[error("checkout of {url} failed: {failure}")]
	Checkout {
		url: String,
		failure: CommandFailure
	},

	#[error("failed to extract {}: {reason}", archive.display())]
	Extract {
		archive: PathBuf,
		reason: String
	},

	#[error("patch {} does not exist", path.display())]
	MissingPatch {
		path: PathBuf
	},

	#[error("failed to apply patch {name}: {failure}")]
	Patch {
		name: String,
		failure: CommandFailure
	},

	#[error("io error: {0}")]
	Io(#[from] std::io::Error)
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("failed to prepare source of {target}: {source}")]
	Fetch {
		target: String,
		#[source]
		source: FetchError
	},

	#[error("configure failed for {target}: {failure}")]
	Configure {
		target: String,
		failure: CommandFailure
	},

	#[error("build failed for {target}: {failure}")]
	Build {
		target: String,
		failure: CommandFailure
	},

	#[error("smoke check failed for {target}: {failure}")]
	Check {
		target: String,
		failure: CommandFailure
	},

	#[error("post-build of {target} failed on {}: {reason}", path.display())]
	PostProcess {
		target: String,
		path: PathBuf,
		reason: String
	},

	#[error("unknown target {0}")]
	UnknownTarget(String),

	#[error("recipe {recipe} uses undefined template {template}")]
	UnknownTemplate {
		recipe: String,
		template: String
	},

	#[error("target {0} is defined more than once")]
	DuplicateTarget(String),

	#[error("dependency cycle involving {0}")]
	DependencyCycle(String),

	#[error("invalid catalog {name}: {reason}")]
	Catalog {
		name: String,
		reason: String
	},

	#[error("invalid config {}: {reason}", path.display())]
	Config {
		path: PathBuf,
		reason: String
	},

	#[error("placeholder expansion failed: {0}")]
	Placeholder(String),

	#[error("failed to find {tool} in PATH")]
	ToolNotFound {
		tool: String
	},

	#[error("io error: {0}")]
	Io(#[from] std::io::Error)
}

impl Error {
	pub fn post_process(target: &str, path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
		Self::PostProcess {
			target: target.to_string(),
			path: path.into(),
			reason: reason.to_string()
		}
	}

	pub fn catalog(name: &str, reason: impl std::fmt::Display) -> Self {
		Self::Catalog {
			name: name.to_string(),
			reason: reason.to_string()
		}
	}
}
