use std::fs::{self, create_dir_all};
use std::io;
use std::os::unix::fs::symlink;
use std::path::Path;
use walkdir::WalkDir;

/// Copies the contents of `from` into `to`, recreating symlinks instead of
/// following them. Existing files are overwritten.
pub fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
	create_dir_all(to)?;

	for entry in WalkDir::new(from).min_depth(1) {
		let entry = entry.map_err(io::Error::other)?;
		let Ok(relative) = entry.path().strip_prefix(from) else {
			continue;
		};
		let dest = to.join(relative);

		if entry.file_type().is_dir() {
			create_dir_all(&dest)?;
		} else if entry.file_type().is_symlink() {
			replace_with_symlink(&fs::read_link(entry.path())?, &dest)?;
		} else {
			if let Some(parent) = dest.parent() {
				create_dir_all(parent)?;
			}
			copy_file(entry.path(), &dest)?;
		}
	}

	Ok(())
}

/// Copies a regular file, replacing a symlink or read-only file at `to`.
pub fn copy_file(from: &Path, to: &Path) -> io::Result<u64> {
	if let Ok(meta) = to.symlink_metadata() {
		if meta.is_symlink() || meta.permissions().readonly() {
			fs::remove_file(to)?;
		}
	}
	fs::copy(from, to)
}

pub fn replace_with_symlink(original: &Path, link: &Path) -> io::Result<()> {
	if link.symlink_metadata().is_ok() {
		remove_path(link)?;
	}
	if let Some(parent) = link.parent() {
		create_dir_all(parent)?;
	}
	symlink(original, link)
}

/// Removes a file, symlink or directory tree. Missing paths are not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
	match path.symlink_metadata() {
		Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
		Ok(_) => fs::remove_file(path),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(e)
	}
}

/// Empties `path`, creating it when missing.
pub fn recreate_dir(path: &Path) -> io::Result<()> {
	remove_path(path)?;
	create_dir_all(path)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn copies_tree_with_symlinks() {
		let dir = tempfile::tempdir().unwrap();
		let from = dir.path().join("from");
		create_dir_all(from.join("lib")).unwrap();
		fs::write(from.join("lib/libdemo.1.a"), b"archive").unwrap();
		symlink("libdemo.1.a", from.join("lib/libdemo.a")).unwrap();

		let to = dir.path().join("to");
		copy_tree(&from, &to).unwrap();
		copy_tree(&from, &to).unwrap();

		assert_eq!(fs::read(to.join("lib/libdemo.1.a")).unwrap(), b"archive");
		assert_eq!(fs::read_link(to.join("lib/libdemo.a")).unwrap(), Path::new("libdemo.1.a"));
	}

	#[test]
	fn removing_missing_path_succeeds() {
		let dir = tempfile::tempdir().unwrap();
		remove_path(&dir.path().join("missing")).unwrap();
	}
}
