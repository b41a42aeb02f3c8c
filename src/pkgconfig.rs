use std::fmt::Write as _;
use std::fs::{create_dir_all, write};
use std::io;
use std::path::{Path, PathBuf};
use crate::command::ToolCommand;
use crate::error::{Error, Result};
use crate::recipe::PcSpec;
use crate::state::BuildState;

/// Runs `pkg-config --static <args> <packages>` restricted to the shared prefix.
pub fn query(state: &BuildState, args: &[&str], packages: &[String]) -> Result<String> {
	ToolCommand::new(&state.tools.pkg_config)
		.arg("--static")
		.args(args.iter().copied())
		.args(packages.iter().cloned())
		.envs(&state.environment)
		.output()
		.map_err(|failure| Error::Configure {
			target: state.target.clone(),
			failure
		})
}

/// Generated pkg-config description with relocatable paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcFile {
	pub name: String,
	pub description: String,
	pub version: String,
	pub requires: String,
	pub libs: String,
	pub libs_private: String,
	pub cflags: String
}

impl PcFile {
	pub fn from_spec(spec: &PcSpec, target: &str, version: Option<&str>) -> Self {
		Self {
			name: spec.name.clone().unwrap_or_else(|| target.to_string()),
			description: spec.description.clone(),
			version: spec.version.clone()
				.or_else(|| version.map(str::to_string))
				.unwrap_or_default(),
			requires: spec.requires.clone(),
			libs: spec.libs.clone().unwrap_or_else(|| format!("-l{}", target)),
			libs_private: spec.libs_private.clone(),
			cflags: spec.cflags.clone().unwrap_or_else(|| "-I${includedir}".to_string())
		}
	}

	pub fn render(&self) -> String {
		let mut out = String::from("\
prefix=${pcfiledir}/../..
exec_prefix=${prefix}
libdir=${exec_prefix}/lib
includedir=${prefix}/include

");

		// writing into a String cannot fail
		let _ = writeln!(out, "Name: {}", self.name);
		let _ = writeln!(out, "Description: {}", self.description);
		let _ = writeln!(out, "Version: {}", self.version);
		if !self.requires.is_empty() {
			let _ = writeln!(out, "Requires: {}", self.requires);
		}
		let _ = writeln!(out, "Libs: -L${{libdir}} {}", self.libs);
		if !self.libs_private.is_empty() {
			let _ = writeln!(out, "Libs.private: {}", self.libs_private);
		}
		let _ = writeln!(out, "Cflags: {}", self.cflags);

		out
	}
}

/// Writes `pc` as `<install>/lib/pkgconfig/<filename>`.
pub fn write_pc(install_path: &Path, filename: &str, pc: &PcFile) -> io::Result<PathBuf> {
	let dir = install_path.join("lib/pkgconfig");
	create_dir_all(&dir)?;

	let path = dir.join(filename);
	write(&path, pc.render())?;
	Ok(path)
}
