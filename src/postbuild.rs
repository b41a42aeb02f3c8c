use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use crate::error::{Error, Result};
use crate::fsutil::{copy_file, copy_tree, remove_path};
use crate::pkgconfig::{write_pc, PcFile};
use crate::placeholder::Expander;
use crate::recipe::PostAction;
use crate::state::BuildState;
use crate::target::Target;
use crate::textpatch::{
	chain, compile_rules, config_script_editor, keep_cmake_target_editor,
	pkg_config_editor, update_text_file, LineEditor
};

const PKG_CONFIG_DIRS: &[&str] = &["lib/pkgconfig", "share/pkgconfig"];

/// Expands placeholders; relative results are taken from the install directory.
/// A trailing `/` is kept so callers can tell "into this directory" apart.
fn resolve(state: &BuildState, expander: &Expander, path: &str) -> PathBuf {
	let expanded = expander.expand(path);
	let path = Path::new(&expanded);
	if path.is_absolute() {
		path.to_path_buf()
	} else {
		state.install_path.join(path)
	}
}

fn into_dir(dest: PathBuf, original: &str, from: &Path) -> PathBuf {
	match (original.ends_with('/'), from.file_name()) {
		(true, Some(name)) => dest.join(name),
		_ => dest
	}
}

fn patch_file(state: &BuildState, path: &Path, editor: &LineEditor) -> Result<()> {
	if !path.is_file() {
		return Err(Error::post_process(&state.target, path, "file does not exist"));
	}

	let changed = update_text_file(path, editor)
		.map_err(|e| Error::post_process(&state.target, path, e))?;
	debug!(changed, "patched {}", path.display());
	Ok(())
}

pub fn run_action(state: &BuildState, expander: &Expander, action: &PostAction) -> Result<()> {
	let target = state.target.as_str();

	match action {
		PostAction::Patch { file, rules } => {
			let path = resolve(state, expander, file);
			patch_file(state, &path, &*compile_rules(rules, expander))
		}
		PostAction::ConfigScript { file, rules } => {
			let path = resolve(state, expander, file);
			let editor = chain(vec![
				compile_rules(rules, expander),
				config_script_editor(&state.install_path)
			]);
			patch_file(state, &path, &*editor)
		}
		PostAction::WritePc(spec) => {
			let pc = PcFile::from_spec(spec, target, state.version.as_deref());
			let filename = spec.filename.clone().unwrap_or_else(|| format!("{}.pc", target));
			let path = write_pc(&state.install_path, &filename, &pc)
				.map_err(|e| Error::post_process(target, state.install_path.join(&filename), e))?;
			debug!("wrote {}", path.display());
			Ok(())
		}
		PostAction::KeepCmakeTarget { target: cmake_target } => {
			let files = cmake_target_files(&state.install_path);
			if files.is_empty() {
				return Err(Error::post_process(
					target,
					state.install_path.join("lib/cmake"),
					"no exported CMake targets found"));
			}

			let editor = keep_cmake_target_editor(cmake_target);
			for file in files {
				patch_file(state, &file, &*editor)?;
			}
			Ok(())
		}
		PostAction::Copy { from, to } => {
			let source = resolve(state, expander, from);
			let dest = into_dir(resolve(state, expander, to), to, &source);
			copy_any(target, &source, &dest)
		}
		PostAction::CopyTree { from, to } => {
			let source = resolve(state, expander, from);
			let dest = resolve(state, expander, to);
			if !source.is_dir() {
				return Err(Error::post_process(target, &source, "directory does not exist"));
			}
			copy_tree(&source, &dest).map_err(|e| Error::post_process(target, &dest, e))
		}
		PostAction::Move { from, to } => {
			let source = resolve(state, expander, from);
			let dest = into_dir(resolve(state, expander, to), to, &source);
			if let Some(parent) = dest.parent() {
				create_dir_all(parent).map_err(|e| Error::post_process(target, parent, e))?;
			}
			fs::rename(&source, &dest).map_err(|e| Error::post_process(target, &source, e))
		}
		PostAction::Remove { path } => {
			let path = resolve(state, expander, path);
			if path.symlink_metadata().is_err() {
				return Err(Error::post_process(target, &path, "file does not exist"));
			}
			remove_path(&path).map_err(|e| Error::post_process(target, &path, e))
		}
		PostAction::Mkdir { path } => {
			let path = resolve(state, expander, path);
			create_dir_all(&path).map_err(|e| Error::post_process(target, &path, e))
		}
	}
}

fn copy_any(target: &str, source: &Path, dest: &Path) -> Result<()> {
	let meta = source.metadata()
		.map_err(|e| Error::post_process(target, source, e))?;

	let result = if meta.is_dir() {
		copy_tree(source, dest)
	} else {
		dest.parent()
			.map(create_dir_all)
			.unwrap_or(Ok(()))
			.and_then(|_| copy_file(source, dest).map(|_| ()))
	};

	result.map_err(|e| Error::post_process(target, dest, e))
}

/// Exported target files (`*Targets.cmake`, `*-targets.cmake`) below `lib/cmake`.
fn cmake_target_files(install_path: &Path) -> Vec<PathBuf> {
	let mut files: Vec<_> = WalkDir::new(install_path.join("lib/cmake"))
		.into_iter()
		.filter_map(|entry| entry.ok())
		.filter(|entry| entry.file_type().is_file())
		.filter(|entry| {
			let name = entry.file_name().to_string_lossy().to_lowercase();
			name.ends_with("targets.cmake")
		})
		.map(|entry| entry.into_path())
		.collect();
	files.sort();
	files
}

/// Copies declared outputs from the build directory into `<install>/bin`.
pub fn copy_outputs(target: &Target, state: &BuildState, expander: &Expander) -> Result<()> {
	let bin = state.install_path.join("bin");

	let outputs: Vec<(String, String)> = if target.outputs.is_empty() {
		vec![(target.name.clone(), target.name.clone())]
	} else {
		target.outputs.iter()
			.map(|output| (expander.expand(output.path()), expander.expand(output.file_name())))
			.collect()
	};

	for (path, name) in outputs {
		let source = state.build_path.join(&path);
		let dest = bin.join(&name);
		info!("copying {} to bin/{}", path, name);
		copy_any(&target.name, &source, &dest)?;
	}

	Ok(())
}

/// Rewrites every installed `.pc` file with the target's rules, then makes it relocatable.
pub fn fix_pkg_config(target: &Target, state: &BuildState, expander: &Expander) -> Result<()> {
	let mut editors = vec![compile_rules(&target.pkg_config_rules, expander)];
	if let Some(editor) = &target.pkg_config_hook {
		let editor = editor.clone();
		editors.push(Box::new(move |path: &Path, line: &str| editor(path, line)));
	}
	editors.push(pkg_config_editor(&state.install_path));
	let editor = chain(editors);

	let mut patched = 0;
	for dir in PKG_CONFIG_DIRS {
		let dir = state.install_path.join(dir);
		if !dir.is_dir() {
			continue;
		}

		for entry in WalkDir::new(&dir).max_depth(1).sort_by_file_name() {
			let entry = entry.map_err(|e| Error::post_process(&target.name, &dir, e))?;
			if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "pc") {
				patch_file(state, entry.path(), &*editor)?;
				patched += 1;
			}
		}
	}

	let has_edits = !target.pkg_config_rules.is_empty() || target.pkg_config_hook.is_some();
	if has_edits && patched == 0 {
		return Err(Error::post_process(
			&target.name,
			state.install_path.join(PKG_CONFIG_DIRS[0]),
			"no pkg-config file to patch"));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::arch::Arch;
	use crate::command::Tools;
	use crate::config::Config;
	use crate::recipe::{LineEdit, PatchRule, PcSpec};
	use crate::state::BuildFlags;
	use crate::template::Template;

	fn state(root: &Path, target: &Target) -> BuildState {
		let mut config = Config::default();
		config.general.build_root = root.to_path_buf();
		let mut state = BuildState::new(config, Tools::default(), BuildFlags::default());
		state.repoint(target, Arch::host());
		state.ensure_paths().unwrap();
		state
	}

	fn actions(data: &str) -> Vec<PostAction> {
		#[derive(serde::Deserialize)]
		struct Wrapper {
			post_build: Vec<PostAction>
		}

		toml::from_str::<Wrapper>(data).unwrap().post_build
	}

	#[test]
	fn moves_into_directory_and_removes() {
		let dir = tempfile::tempdir().unwrap();
		let target = Target::new("instpatch", Template::custom());
		let state = state(dir.path(), &target);
		let expander = state.placeholders().compile().unwrap();

		let nested = state.install_path.join("include/libinstpatch-2/libinstpatch");
		create_dir_all(&nested).unwrap();
		fs::write(nested.join("version.h"), "#define IPATCH_VERSION_MAJOR 1\n").unwrap();
		fs::write(state.install_path.join("junk.static"), "").unwrap();

		for action in actions(r#"
			[[post_build]]
			action = "move"
			from = "include/libinstpatch-2/libinstpatch"
			to = "include/"

			[[post_build]]
			action = "remove"
			path = "junk.static"
		"#) {
			run_action(&state, &expander, &action).unwrap();
		}

		assert!(state.install_path.join("include/libinstpatch/version.h").is_file());
		assert!(!state.install_path.join("junk.static").exists());
	}

	#[test]
	fn patching_missing_file_fails() {
		let dir = tempfile::tempdir().unwrap();
		let target = Target::new("glew", Template::custom());
		let state = state(dir.path(), &target);
		let expander = state.placeholders().compile().unwrap();

		let action = &actions(r#"
			[[post_build]]
			action = "patch"
			file = "lib/cmake/glew/glew-targets.cmake"
			rules = [{ prefix = "  INTERFACE_LINK_LIBRARIES ", replace = "  INTERFACE_LINK_LIBRARIES \"-framework OpenGL\"" }]
		"#)[0];

		assert!(matches!(
			run_action(&state, &expander, action),
			Err(Error::PostProcess { .. })));
	}

	#[test]
	fn pkg_config_rules_need_a_pc_file() {
		let dir = tempfile::tempdir().unwrap();
		let plain = Target::new("dumb", Template::custom()).with_fix_pkg_config(true);
		let target = Target::new("dumb", Template::custom())
			.with_fix_pkg_config(true)
			.with_pkg_config_rules(vec![PatchRule {
				prefix: "Libs:".to_string(),
				edit: LineEdit::Replace {
					replace: "Libs: -L${libdir} -ldumb".to_string()
				}
			}]);
		let state = state(dir.path(), &target);
		let expander = state.placeholders().compile().unwrap();

		assert!(matches!(
			fix_pkg_config(&target, &state, &expander),
			Err(Error::PostProcess { .. })));
		fix_pkg_config(&plain, &state, &expander).unwrap();

		let pc_dir = state.install_path.join("lib/pkgconfig");
		create_dir_all(&pc_dir).unwrap();
		fs::write(pc_dir.join("dumb.pc"), "Libs: -ldumb\n").unwrap();
		fix_pkg_config(&target, &state, &expander).unwrap();

		let content = fs::read_to_string(pc_dir.join("dumb.pc")).unwrap();
		assert_eq!(content.lines().collect::<Vec<_>>(), vec!["Libs: -L${libdir} -ldumb"]);
	}

	#[test]
	fn copies_from_source_tree() {
		let dir = tempfile::tempdir().unwrap();
		let target = Target::new("portmidi", Template::custom());
		let state = state(dir.path(), &target);
		let expander = state.placeholders().compile().unwrap();

		create_dir_all(state.source.join("pm_common")).unwrap();
		fs::write(state.source.join("pm_common/portmidi.h"), "int Pm_Initialize(void);\n").unwrap();

		let action = &actions(r#"
			[[post_build]]
			action = "copy"
			from = "@SOURCE@/pm_common/portmidi.h"
			to = "include/"
		"#)[0];
		run_action(&state, &expander, action).unwrap();

		assert!(state.install_path.join("include/portmidi.h").is_file());
	}

	#[test]
	fn write_pc_defaults_to_target_name() {
		let dir = tempfile::tempdir().unwrap();
		let target = Target::new("mad", Template::custom()).with_version("0.15.1b");
		let state = state(dir.path(), &target);
		let expander = state.placeholders().compile().unwrap();

		let action = PostAction::WritePc(PcSpec {
			description: "MPEG Audio Decoder".to_string(),
			..PcSpec::default()
		});
		run_action(&state, &expander, &action).unwrap();

		let content = fs::read_to_string(state.install_path.join("lib/pkgconfig/mad.pc")).unwrap();
		assert!(content.contains("Version: 0.15.1b\n"));
		assert!(content.contains("Libs: -L${libdir} -lmad\n"));
	}

	#[test]
	fn copies_default_output() {
		let dir = tempfile::tempdir().unwrap();
		let target = Target::new("qpakman", Template::custom());
		let state = state(dir.path(), &target);
		let expander = state.placeholders().compile().unwrap();

		fs::write(state.build_path.join("qpakman"), "binary").unwrap();
		copy_outputs(&target, &state, &expander).unwrap();

		assert_eq!(fs::read_to_string(state.install_path.join("bin/qpakman")).unwrap(), "binary");
	}
}
