use std::collections::HashSet;
use std::fs::{self, create_dir_all, read_to_string, write};
use std::io;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;
use crate::config::GeneralConfig;
use crate::error::{Error, Result};
use crate::fsutil::{copy_file, replace_with_symlink};
use crate::state::Layout;

const FILES: &str = "FILES";

/// Paths previously synced for `name`, relative to the prefix, in install order.
pub fn installed_files(layout: &Layout, name: &str) -> Result<Vec<String>> {
	let path = layout.meta(name).join(FILES);
	match read_to_string(&path) {
		Ok(content) => Ok(content.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty())
			.map(str::to_string)
			.collect()),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
		Err(e) => Err(e.into())
	}
}

pub fn is_installed(layout: &Layout, name: &str) -> bool {
	layout.meta(name).join(FILES).exists()
}

/// Removes one recorded entry. Directories still holding files of other
/// targets are left alone.
fn remove_entry(path: &Path) -> io::Result<()> {
	match path.symlink_metadata() {
		Ok(meta) if meta.is_dir() => match fs::remove_dir(path) {
			Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => Ok(()),
			other => other
		},
		Ok(_) => fs::remove_file(path),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(e)
	}
}

/// Copies `tree` into the shared prefix and records what was installed.
/// Entries recorded by an earlier sync of `name` that are gone from `tree` are removed.
pub fn sync(layout: &Layout, general: &GeneralConfig, name: &str, tree: &Path) -> Result<Vec<String>> {
	let prefix = layout.prefix();
	let previous = installed_files(layout, name)?;
	let mut files = Vec::new();

	info!("syncing {} into {}", name, prefix.display());

	for entry in WalkDir::new(tree).min_depth(1).sort_by_file_name() {
		let entry = entry.map_err(io::Error::other)?;
		let Ok(path) = entry.path().strip_prefix(tree) else {
			continue;
		};

		if general.strip_la_files && path.extension().is_some_and(|ext| ext == "la") {
			continue;
		}
		if general.strip_docs && path.starts_with(&general.doc_dir) {
			continue;
		}

		let full_path = prefix.join(path);

		if entry.file_type().is_dir() {
			create_dir_all(&full_path)?;
		} else if entry.file_type().is_symlink() {
			replace_with_symlink(&fs::read_link(entry.path())?, &full_path)?;
		} else {
			if let Some(parent) = full_path.parent() {
				create_dir_all(parent)?;
			}
			copy_file(entry.path(), &full_path)?;
		}

		let Some(path) = path.to_str() else {
			return Err(Error::post_process(name, entry.path(), "path is not valid UTF-8"));
		};
		files.push(path.to_string());
	}

	let current: HashSet<&str> = files.iter().map(String::as_str).collect();
	for stale in previous.iter().rev().filter(|path| !current.contains(path.as_str())) {
		debug!("removing stale {}", stale);
		remove_entry(&prefix.join(stale))?;
	}

	let meta = layout.meta(name);
	create_dir_all(&meta)?;

	let mut content = files.join("\n");
	content.push('\n');
	write(meta.join(FILES), content)?;

	Ok(files)
}

/// Undoes a sync. Returns false when `name` was never synced.
pub fn remove(layout: &Layout, name: &str) -> Result<bool> {
	let meta = layout.meta(name);
	if !meta.exists() {
		return Ok(false);
	}

	info!("removing {}", name);
	let prefix = layout.prefix();
	for path in installed_files(layout, name)?.iter().rev() {
		remove_entry(&prefix.join(path))?;
	}

	fs::remove_dir_all(&meta)?;
	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::os::unix::fs::symlink;
	use crate::config::Config;

	fn tree(root: &Path, files: &[(&str, &str)]) {
		for (path, content) in files {
			let path = root.join(path);
			create_dir_all(path.parent().unwrap()).unwrap();
			write(path, content).unwrap();
		}
	}

	#[test]
	fn sync_skips_la_files_and_docs() {
		let dir = tempfile::tempdir().unwrap();
		let layout = Layout::new(dir.path());
		let general = Config::default().general;

		let install = dir.path().join("deps/ogg");
		tree(&install, &[
			("include/ogg/ogg.h", "ogg"),
			("lib/libogg.a", "archive"),
			("lib/libogg.la", "libtool"),
			("share/doc/libogg/index.html", "docs")
		]);
		symlink("libogg.a", install.join("lib/libogg.0.a")).unwrap();

		let files = sync(&layout, &general, "ogg", &install).unwrap();

		let prefix = layout.prefix();
		assert!(prefix.join("include/ogg/ogg.h").is_file());
		assert!(!prefix.join("lib/libogg.la").exists());
		assert!(!prefix.join("share/doc").exists());
		assert_eq!(fs::read_link(prefix.join("lib/libogg.0.a")).unwrap(), Path::new("libogg.a"));
		assert!(files.contains(&"lib/libogg.a".to_string()));
		assert_eq!(installed_files(&layout, "ogg").unwrap(), files);
	}

	#[test]
	fn resync_removes_stale_files() {
		let dir = tempfile::tempdir().unwrap();
		let layout = Layout::new(dir.path());
		let general = Config::default().general;

		let install = dir.path().join("deps/png");
		tree(&install, &[("lib/libpng16.a", "a"), ("bin/png-fix-itxt", "tool")]);
		sync(&layout, &general, "png", &install).unwrap();

		fs::remove_dir_all(install.join("bin")).unwrap();
		sync(&layout, &general, "png", &install).unwrap();

		assert!(layout.prefix().join("lib/libpng16.a").is_file());
		assert!(!layout.prefix().join("bin/png-fix-itxt").exists());
		assert!(!layout.prefix().join("bin").exists());
	}

	#[test]
	fn remove_keeps_shared_directories() {
		let dir = tempfile::tempdir().unwrap();
		let layout = Layout::new(dir.path());
		let general = Config::default().general;

		let ogg = dir.path().join("deps/ogg");
		let vorbis = dir.path().join("deps/vorbis");
		tree(&ogg, &[("lib/libogg.a", "ogg")]);
		tree(&vorbis, &[("lib/libvorbis.a", "vorbis")]);
		sync(&layout, &general, "ogg", &ogg).unwrap();
		sync(&layout, &general, "vorbis", &vorbis).unwrap();

		assert!(remove(&layout, "ogg").unwrap());
		assert!(!remove(&layout, "ogg").unwrap());

		assert!(!layout.prefix().join("lib/libogg.a").exists());
		assert!(layout.prefix().join("lib/libvorbis.a").is_file());
		assert!(!is_installed(&layout, "ogg"));
		assert!(is_installed(&layout, "vorbis"));
	}
}
