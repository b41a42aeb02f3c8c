use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error};
use crate::config::ToolsConfig;
use crate::error::CommandFailure;

/// Environment passed to child processes. Nothing is inherited beyond it.
pub type Environment = BTreeMap<String, String>;

const OUTPUT_TAIL_LINES: usize = 40;

#[derive(Debug, Clone)]
pub struct ToolCommand {
	program: PathBuf,
	args: Vec<String>,
	cwd: Option<PathBuf>,
	env: Environment
}

impl ToolCommand {
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
			args: Vec::new(),
			cwd: None,
			env: Environment::new()
		}
	}

	pub fn arg(mut self, arg: impl Into<String>) -> Self {
		self.args.push(arg.into());
		self
	}

	pub fn args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>
	{
		self.args.extend(args.into_iter().map(Into::into));
		self
	}

	pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
		self.cwd = Some(dir.as_ref().to_path_buf());
		self
	}

	pub fn envs(mut self, env: &Environment) -> Self {
		self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
		self
	}

	pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.env.insert(key.into(), value.into());
		self
	}

	pub fn program(&self) -> &Path {
		&self.program
	}

	pub fn get_args(&self) -> &[String] {
		&self.args
	}

	/// Command line as it would be typed into a shell.
	pub fn display(&self) -> String {
		std::iter::once(self.program.to_string_lossy().into_owned())
			.chain(self.args.iter().cloned())
			.map(|part| {
				if part.is_empty() || part.contains(char::is_whitespace) {
					format!("'{}'", part)
				} else {
					part
				}
			})
			.collect::<Vec<_>>()
			.join(" ")
	}

	fn command(&self) -> Command {
		let mut cmd = Command::new(&self.program);
		cmd.args(&self.args)
			.env_clear()
			.envs(&self.env)
			.stdin(Stdio::null());
		if let Some(cwd) = &self.cwd {
			cmd.current_dir(cwd);
		}
		cmd
	}

	/// Runs to completion. Output is streamed when `verbose`, otherwise it is
	/// captured and only logged if the command fails.
	pub fn run(&self, verbose: bool) -> Result<(), CommandFailure> {
		let line = self.display();
		debug!(cwd = ?self.cwd, "running {}", line);

		let mut cmd = self.command();

		let status = if verbose {
			cmd.status()
		} else {
			cmd.output().map(|output| {
				if !output.status.success() {
					log_tail("stdout", &output.stdout);
					log_tail("stderr", &output.stderr);
				}
				output.status
			})
		};

		let status = status.map_err(|e| CommandFailure::Spawn {
			command: line.clone(),
			source: e
		})?;

		if !status.success() {
			return Err(CommandFailure::Status {
				command: line,
				code: status.code()
			});
		}

		Ok(())
	}

	/// Runs to completion and returns trimmed stdout.
	pub fn output(&self) -> Result<String, CommandFailure> {
		let line = self.display();
		debug!(cwd = ?self.cwd, "running {}", line);

		let output = self.command().output().map_err(|e| CommandFailure::Spawn {
			command: line.clone(),
			source: e
		})?;

		if !output.status.success() {
			log_tail("stderr", &output.stderr);
			return Err(CommandFailure::Status {
				command: line,
				code: output.status.code()
			});
		}

		Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
	}
}

fn log_tail(stream: &str, data: &[u8]) {
	let text = String::from_utf8_lossy(data);
	let lines: Vec<_> = text.lines().collect();
	if lines.is_empty() {
		return;
	}

	let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
	error!("{}:\n{}", stream, lines[start..].join("\n"));
}

/// External programs, resolved once against `PATH`.
#[derive(Debug, Clone)]
pub struct Tools {
	pub cmake: PathBuf,
	pub meson: PathBuf,
	pub make: PathBuf,
	pub pkg_config: PathBuf,
	pub git: PathBuf,
	pub curl: PathBuf,
	pub tar: PathBuf,
	pub patch: PathBuf,
	pub lipo: PathBuf
}

impl Tools {
	pub fn resolve(config: &ToolsConfig) -> Self {
		Self {
			cmake: lookup(&config.cmake),
			meson: lookup(&config.meson),
			make: lookup(&config.make),
			pkg_config: lookup(&config.pkg_config),
			git: lookup(&config.git),
			curl: lookup(&config.curl),
			tar: lookup(&config.tar),
			patch: lookup(&config.patch),
			lipo: lookup(&config.lipo)
		}
	}
}

impl Default for Tools {
	fn default() -> Self {
		Self::resolve(&ToolsConfig::default())
	}
}

/// Absolute path of `name` if it is in `PATH`, otherwise `name` unchanged so
/// that a missing tool surfaces as a spawn failure of the step needing it.
pub fn lookup(name: &str) -> PathBuf {
	match which::which(name) {
		Ok(path) => path,
		Err(_) => {
			debug!("{} not found in PATH", name);
			PathBuf::from(name)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_quotes_spaces() {
		let cmd = ToolCommand::new("cmake")
			.arg("-DCMAKE_EXE_LINKER_FLAGS=-lA -lB")
			.arg("")
			.arg("..");

		assert_eq!(cmd.display(), "cmake '-DCMAKE_EXE_LINKER_FLAGS=-lA -lB' '' ..");
	}

	#[test]
	fn environment_is_not_inherited() {
		let output = ToolCommand::new("/bin/sh")
			.args(["-c", "echo ${HOME:-clean} $GREETING"])
			.env("GREETING", "hi")
			.output()
			.unwrap();

		assert_eq!(output, "clean hi");
	}

	#[test]
	fn nonzero_exit_carries_command_and_code() {
		let err = ToolCommand::new("/bin/sh")
			.args(["-c", "exit 3"])
			.run(false)
			.unwrap_err();

		assert!(matches!(&err, CommandFailure::Status { code: Some(3), .. }));
		assert_eq!(err.command(), "/bin/sh -c 'exit 3'");
	}

	#[test]
	fn missing_program_fails_to_spawn() {
		let err = ToolCommand::new("/nonexistent/depsmith-tool").run(false).unwrap_err();
		assert!(matches!(err, CommandFailure::Spawn { .. }));
	}
}
