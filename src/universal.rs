use std::fs::{self, create_dir_all, write};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use crate::arch::Arch;
use crate::command::ToolCommand;
use crate::error::{Error, Result};
use crate::fsutil::{copy_file, copy_tree, recreate_dir, replace_with_symlink};
use crate::state::BuildState;

const MACH_O_MAGIC: &[[u8; 4]] = &[
	[0xfe, 0xed, 0xfa, 0xce],
	[0xfe, 0xed, 0xfa, 0xcf],
	[0xce, 0xfa, 0xed, 0xfe],
	[0xcf, 0xfa, 0xed, 0xfe],
	[0xca, 0xfe, 0xba, 0xbe]
];
const ARCHIVE_MAGIC: &[u8] = b"!<arch>\n";
const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx"];

fn is_binary_object(content: &[u8]) -> bool {
	content.starts_with(ARCHIVE_MAGIC)
		|| MACH_O_MAGIC.iter().any(|magic| content.starts_with(magic))
}

fn is_header(path: &Path) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.is_some_and(|ext| HEADER_EXTENSIONS.contains(&ext))
}

/// Header that includes the copy stored for the compiling architecture.
pub fn dispatch_header(file_name: &str, archs: &[Arch]) -> String {
	let mut content = String::new();

	for (index, arch) in archs.iter().enumerate() {
		let keyword = if index == 0 { "#if" } else { "#elif" };
		content += &format!("{} defined({})\n", keyword, arch.compiler_define());
		content += &format!("#include \"{}/{}\"\n", arch, file_name);
	}

	content += "#else\n#error \"unsupported architecture\"\n#endif\n";
	content
}

/// Combines the install trees of every architecture of `name` into `deps/<name>`.
pub fn merge(state: &BuildState, name: &str, archs: &[Arch]) -> Result<PathBuf> {
	let dest = state.layout.deps(name);
	recreate_dir(&dest)?;

	let trees: Vec<(Arch, PathBuf)> = archs.iter()
		.map(|&arch| (arch, state.layout.install(name, arch)))
		.collect();

	let Some((_, first)) = trees.first() else {
		return Ok(dest);
	};

	if trees.len() == 1 {
		debug!("copying {} into {}", first.display(), dest.display());
		copy_tree(first, &dest)?;
		return Ok(dest);
	}

	info!("merging {} architectures of {}", trees.len(), name);

	for entry in WalkDir::new(first).min_depth(1).sort_by_file_name() {
		let entry = entry.map_err(io::Error::other)?;
		let Ok(relative) = entry.path().strip_prefix(first) else {
			continue;
		};
		let out = dest.join(relative);

		if entry.file_type().is_dir() {
			create_dir_all(&out)?;
		} else if entry.file_type().is_symlink() {
			replace_with_symlink(&fs::read_link(entry.path())?, &out)?;
		} else {
			merge_file(state, name, relative, &trees, &out)?;
		}
	}

	for (arch, tree) in &trees[1..] {
		for entry in WalkDir::new(tree).min_depth(1) {
			let entry = entry.map_err(io::Error::other)?;
			if entry.file_type().is_dir() {
				continue;
			}
			let Ok(relative) = entry.path().strip_prefix(tree) else {
				continue;
			};
			if first.join(relative).symlink_metadata().is_ok() {
				continue;
			}

			warn!("{} only exists for {}", relative.display(), arch);
			let out = dest.join(relative);
			if let Some(parent) = out.parent() {
				create_dir_all(parent)?;
			}
			if entry.file_type().is_symlink() {
				replace_with_symlink(&fs::read_link(entry.path())?, &out)?;
			} else {
				copy_file(entry.path(), &out)?;
			}
		}
	}

	Ok(dest)
}

fn merge_file(
	state: &BuildState,
	name: &str,
	relative: &Path,
	trees: &[(Arch, PathBuf)],
	out: &Path) -> Result<()> {
	let copies: Vec<(Arch, PathBuf)> = trees.iter()
		.map(|(arch, tree)| (*arch, tree.join(relative)))
		.filter(|(_, path)| path.is_file())
		.collect();

	if copies.len() < trees.len() {
		warn!("{} is missing for some architectures", relative.display());
	}

	let first = fs::read(&copies[0].1)?;
	let mut identical = true;
	for (_, path) in &copies[1..] {
		if fs::read(path)? != first {
			identical = false;
			break;
		}
	}

	if identical {
		copy_file(&copies[0].1, out)?;
		return Ok(());
	}

	if is_binary_object(&first) {
		debug!("combining {} with lipo", relative.display());
		return ToolCommand::new(&state.tools.lipo)
			.arg("-create")
			.args(copies.iter().map(|(_, path)| path.to_string_lossy().into_owned()))
			.arg("-output")
			.arg(out.to_string_lossy())
			.envs(&state.environment)
			.run(state.verbose)
			.map_err(|failure| Error::Build { target: name.to_string(), failure });
	}

	let file_name = out.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_default();

	if is_header(relative) {
		let Some(dir) = out.parent() else {
			return Err(Error::post_process(name, out, "header has no parent directory"));
		};

		debug!("splitting {} per architecture", relative.display());
		for (arch, path) in &copies {
			let arch_dir = dir.join(arch.as_str());
			create_dir_all(&arch_dir)?;
			copy_file(path, &arch_dir.join(&file_name))?;
		}

		let archs: Vec<Arch> = copies.iter().map(|(arch, _)| *arch).collect();
		write(out, dispatch_header(&file_name, &archs))?;
		return Ok(());
	}

	warn!("{} differs between architectures, keeping the {} copy", relative.display(), copies[0].0);
	copy_file(&copies[0].1, out)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::os::unix::fs::PermissionsExt;
	use crate::command::Tools;
	use crate::config::Config;
	use crate::state::BuildFlags;

	fn state(root: &Path) -> BuildState {
		let mut config = Config::default();
		config.general.build_root = root.to_path_buf();
		BuildState::new(config, Tools::default(), BuildFlags::default())
	}

	fn put(state: &BuildState, arch: Arch, path: &str, content: &[u8]) {
		let path = state.layout.install("glib", arch).join(path);
		create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(path, content).unwrap();
	}

	#[test]
	fn dispatch_header_covers_each_arch() {
		let header = dispatch_header("glibconfig.h", &[Arch::Arm64, Arch::X86_64]);
		assert_eq!(header, "\
#if defined(__aarch64__)
#include \"arm64/glibconfig.h\"
#elif defined(__x86_64__)
#include \"x86_64/glibconfig.h\"
#else
#error \"unsupported architecture\"
#endif
");
	}

	#[test]
	fn single_arch_is_copied() {
		let dir = tempfile::tempdir().unwrap();
		let state = state(dir.path());
		put(&state, Arch::host(), "lib/libglib-2.0.a", b"!<arch>\nhost");

		let dest = merge(&state, "glib", &[Arch::host()]).unwrap();
		assert_eq!(fs::read(dest.join("lib/libglib-2.0.a")).unwrap(), b"!<arch>\nhost");
	}

	#[test]
	fn differing_files_are_merged() {
		let dir = tempfile::tempdir().unwrap();
		let mut state = state(dir.path());

		let lipo = dir.path().join("lipo");
		fs::write(&lipo, "#!/bin/sh\n\
			while [ $# -gt 0 ]; do\n\
			\tif [ \"$1\" = -output ]; then shift; out=\"$1\"; fi\n\
			\tshift\n\
			done\n\
			printf fat > \"$out\"\n").unwrap();
		fs::set_permissions(&lipo, fs::Permissions::from_mode(0o755)).unwrap();
		state.tools.lipo = lipo;

		for arch in Arch::all() {
			put(&state, arch, "include/glib.h", b"same");
			put(&state, arch, "lib/glib-2.0/include/glibconfig.h", arch.as_str().as_bytes());
			put(&state, arch, "lib/libglib-2.0.a", format!("!<arch>\n{}", arch).as_bytes());
			put(&state, arch, "lib/pkgconfig/glib-2.0.pc", arch.as_str().as_bytes());
		}
		put(&state, Arch::X86_64, "share/extra.txt", b"extra");

		let dest = merge(&state, "glib", &Arch::all()).unwrap();

		assert_eq!(fs::read(dest.join("include/glib.h")).unwrap(), b"same");
		assert_eq!(fs::read(dest.join("lib/libglib-2.0.a")).unwrap(), b"fat");
		assert_eq!(fs::read(dest.join("lib/pkgconfig/glib-2.0.pc")).unwrap(), b"arm64");
		assert_eq!(fs::read(dest.join("share/extra.txt")).unwrap(), b"extra");

		let config = dest.join("lib/glib-2.0/include");
		assert_eq!(fs::read(config.join("x86_64/glibconfig.h")).unwrap(), b"x86_64");
		assert!(fs::read_to_string(config.join("glibconfig.h")).unwrap()
			.contains("#include \"arm64/glibconfig.h\""));
	}
}
