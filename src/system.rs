use std::fs::write;
use std::path::PathBuf;
use tracing::debug;
use crate::command::ToolCommand;
use crate::error::{CommandFailure, Error, Result};
use crate::fsutil::copy_tree;
use crate::options::FlagStyle;
use crate::state::BuildState;
use crate::target::Target;
use crate::template::BuildSystem;

const MESON_CROSS_FILE: &str = "depsmith-cross.ini";

fn configure_error(state: &BuildState) -> impl FnOnce(CommandFailure) -> Error + '_ {
	move |failure| Error::Configure { target: state.target.clone(), failure }
}

fn build_error(state: &BuildState) -> impl FnOnce(CommandFailure) -> Error + '_ {
	move |failure| Error::Build { target: state.target.clone(), failure }
}

fn make_program(target: &Target, state: &BuildState) -> PathBuf {
	match &target.tool {
		Some(tool) => crate::command::lookup(tool),
		None => state.tools.make.clone()
	}
}

/// Fails early when the program driving `target` is not installed.
pub fn ensure_tools(target: &Target, state: &BuildState) -> Result<()> {
	let program = match target.system {
		BuildSystem::CMake => state.tools.cmake.clone(),
		BuildSystem::Meson => state.tools.meson.clone(),
		BuildSystem::ConfigureMake | BuildSystem::Make => make_program(target, state),
		BuildSystem::SingleExe | BuildSystem::Custom => return Ok(())
	};

	if program.is_absolute() {
		Ok(())
	} else {
		Err(Error::ToolNotFound { tool: program.display().to_string() })
	}
}

fn jobs(state: &BuildState) -> String {
	format!("-j{}", state.jobs())
}

/// Copies the source tree into the build directory for systems without
/// out-of-tree builds.
fn mirror_source(state: &BuildState) -> Result<()> {
	debug!("mirroring {} into {}", state.source.display(), state.build_path.display());
	copy_tree(&state.source, &state.build_path)?;
	Ok(())
}

/// Readies the build directory before recipe commands of the configure stage run.
pub fn prepare(target: &Target, state: &BuildState) -> Result<()> {
	match target.system {
		BuildSystem::ConfigureMake | BuildSystem::Make => mirror_source(state),
		_ => Ok(())
	}
}

pub fn configure(target: &Target, state: &BuildState) -> Result<()> {
	let style = target.system.flag_style();

	match target.system {
		BuildSystem::CMake => {
			let mut cmd = ToolCommand::new(&state.tools.cmake);
			if state.xcode {
				cmd = cmd.args(["-G", "Xcode"]);
			}

			cmd.args(state.options.render(style))
				.arg(state.source_root().to_string_lossy())
				.current_dir(&state.build_path)
				.envs(&state.environment)
				.run(state.verbose)
				.map_err(configure_error(state))
		}
		BuildSystem::Meson => {
			let mut options = state.options.clone();
			if !target.configure_prefix {
				options.set("prefix", "/");
			}

			let mut cmd = ToolCommand::new(&state.tools.meson)
				.arg("setup")
				.args(options.render(style));

			if state.is_cross() {
				let cross_file = state.build_path.join(MESON_CROSS_FILE);
				write(&cross_file, meson_cross_file(state))?;
				cmd = cmd.arg("--cross-file").arg(cross_file.to_string_lossy());
			}

			cmd.arg(state.build_path.to_string_lossy())
				.arg(state.source_root().to_string_lossy())
				.current_dir(&state.build_path)
				.envs(&state.environment)
				.run(state.verbose)
				.map_err(configure_error(state))
		}
		BuildSystem::ConfigureMake => {
			let work = state.work_path();
			let mut cmd = ToolCommand::new(work.join("configure"))
				.args(state.options.render(style));
			if state.is_cross() {
				cmd = cmd.arg(format!("--host={}-apple-darwin", state.architecture().cpu_family()));
			}

			cmd.current_dir(&work)
				.envs(&state.environment)
				.run(state.verbose)
				.map_err(configure_error(state))
		}
		BuildSystem::Make | BuildSystem::SingleExe | BuildSystem::Custom => Ok(())
	}
}

pub fn build(target: &Target, state: &BuildState) -> Result<()> {
	match target.system {
		BuildSystem::CMake => {
			let mut cmd = ToolCommand::new(&state.tools.cmake)
				.args(["--build", ".", "--config", "Release", "--parallel"])
				.arg(state.jobs().to_string());
			if state.verbose {
				cmd = cmd.arg("--verbose");
			}

			cmd.current_dir(&state.build_path)
				.envs(&state.environment)
				.run(state.verbose)
				.map_err(build_error(state))
		}
		BuildSystem::Meson => {
			let mut cmd = ToolCommand::new(&state.tools.meson)
				.args(["compile", "-C"])
				.arg(state.build_path.to_string_lossy())
				.arg(jobs(state));
			if state.verbose {
				cmd = cmd.arg("--verbose");
			}

			cmd.current_dir(&state.build_path)
				.envs(&state.environment)
				.run(state.verbose)
				.map_err(build_error(state))
		}
		BuildSystem::ConfigureMake => {
			let mut cmd = ToolCommand::new(make_program(target, state)).arg(jobs(state));
			if state.verbose {
				cmd = cmd.arg("V=1");
			}

			cmd.current_dir(state.work_path())
				.envs(&state.environment)
				.run(state.verbose)
				.map_err(build_error(state))
		}
		BuildSystem::Make => {
			ToolCommand::new(make_program(target, state))
				.arg(jobs(state))
				.args(state.options.render(FlagStyle::Make))
				.current_dir(state.work_path())
				.envs(&state.environment)
				.run(state.verbose)
				.map_err(build_error(state))
		}
		BuildSystem::SingleExe => {
			let env = &state.environment;
			let cc = env.get("CC").cloned().unwrap_or_else(|| state.config.build.cc.clone());
			let flags = |name: &str| env.get(name)
				.map(|value| value.split_whitespace().map(str::to_string).collect::<Vec<_>>())
				.unwrap_or_default();

			ToolCommand::new(cc)
				.args(flags("CFLAGS"))
				.args(flags("LDFLAGS"))
				.args(state.options.render(FlagStyle::Make))
				.arg("-o")
				.arg(state.build_path.join(&target.name).to_string_lossy())
				.current_dir(state.source_root())
				.envs(env)
				.run(state.verbose)
				.map_err(build_error(state))
		}
		BuildSystem::Custom => Ok(())
	}
}

pub fn install(target: &Target, state: &BuildState) -> Result<()> {
	let cmd = match target.system {
		BuildSystem::CMake => ToolCommand::new(&state.tools.cmake)
			.args(["--install", "."])
			.current_dir(&state.build_path),
		BuildSystem::Meson => {
			let mut cmd = ToolCommand::new(&state.tools.meson)
				.args(["install", "-C"])
				.arg(state.build_path.to_string_lossy());
			if !target.configure_prefix {
				cmd = cmd.arg("--destdir").arg(state.install_path.to_string_lossy());
			}
			cmd.current_dir(&state.build_path)
		}
		BuildSystem::ConfigureMake => ToolCommand::new(make_program(target, state))
			.arg("install")
			.current_dir(state.work_path()),
		BuildSystem::Make => ToolCommand::new(make_program(target, state))
			.arg("install")
			.args(state.options.render(FlagStyle::Make))
			.current_dir(state.work_path()),
		BuildSystem::SingleExe | BuildSystem::Custom => return Ok(())
	};

	cmd.envs(&state.environment)
		.run(state.verbose)
		.map_err(build_error(state))
}

fn meson_list(value: Option<&String>) -> String {
	let items: Vec<_> = value
		.map(|value| value.split_whitespace()
			.map(|item| format!("'{}'", item.replace('\'', "\\'")))
			.collect())
		.unwrap_or_default();
	format!("[{}]", items.join(", "))
}

/// Machine file describing the non-native architecture of the pass.
pub fn meson_cross_file(state: &BuildState) -> String {
	let env = &state.environment;
	let arch = state.architecture();
	let cc = env.get("CC").cloned().unwrap_or_else(|| state.config.build.cc.clone());
	let cxx = env.get("CXX").cloned().unwrap_or_else(|| state.config.build.cxx.clone());

	format!("\
[binaries]
c = '{cc}'
cpp = '{cxx}'
objc = '{cc}'
objcpp = '{cxx}'
ar = 'ar'
strip = 'strip'
pkg-config = '{pkg_config}'

[built-in options]
c_args = {cflags}
cpp_args = {cxxflags}
objc_args = {cflags}
c_link_args = {ldflags}
cpp_link_args = {ldflags}
objc_link_args = {ldflags}

[host_machine]
system = 'darwin'
cpu_family = '{family}'
cpu = '{cpu}'
endian = 'little'
",
		pkg_config = state.tools.pkg_config.display(),
		cflags = meson_list(env.get("CFLAGS")),
		cxxflags = meson_list(env.get("CXXFLAGS")),
		ldflags = meson_list(env.get("LDFLAGS")),
		family = arch.cpu_family(),
		cpu = arch.as_str())
}
