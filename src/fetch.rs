use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use crate::command::{Environment, ToolCommand, Tools};
use crate::error::FetchError;
use crate::recipe::Source;
use crate::state::BuildState;

pub fn sha256_bytes(data: &[u8]) -> String {
	hex::encode(Sha256::digest(data))
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
	let mut reader = BufReader::new(File::open(path)?);
	let mut hasher = Sha256::new();
	io::copy(&mut reader, &mut hasher)?;
	Ok(hex::encode(hasher.finalize()))
}

pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), FetchError> {
	let actual = sha256_file(path)?;
	if !actual.eq_ignore_ascii_case(expected.trim()) {
		return Err(FetchError::ChecksumMismatch {
			path: path.to_path_buf(),
			expected: expected.to_string(),
			actual
		});
	}
	Ok(())
}

/// Last path component of `url`, safe to use as a file name.
pub fn archive_file_name(url: &str) -> String {
	let path = url.split(['?', '#']).next().unwrap_or(url);
	let name = path.rsplit('/').next().unwrap_or_default();

	let sanitized: String = name.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
				c
			} else {
				'_'
			}
		})
		.collect();

	if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
		format!("download_{}", &sha256_bytes(url.as_bytes())[..16])
	} else {
		sanitized
	}
}

fn local_path(url: &str) -> Option<&Path> {
	if let Some(path) = url.strip_prefix("file://") {
		Some(Path::new(path))
	} else if !url.contains("://") {
		Some(Path::new(url))
	} else {
		None
	}
}

/// Downloads, verifies, extracts and patches sources.
pub struct Fetcher<'a> {
	tools: &'a Tools,
	env: &'a Environment,
	cache_dir: PathBuf,
	patches_dir: &'a Path,
	verbose: bool
}

impl<'a> Fetcher<'a> {
	pub fn new(state: &'a BuildState, name: &str) -> Self {
		Self {
			tools: &state.tools,
			env: &state.environment,
			cache_dir: state.layout.downloads().join(name),
			patches_dir: &state.config.general.patches_dir,
			verbose: state.verbose
		}
	}

	/// Populates `dest`, which must not exist yet. Work happens in a sibling
	/// temporary directory that is renamed into place when complete.
	pub fn prepare(&self, source: &Source, dest: &Path) -> Result<(), FetchError> {
		let parent = dest.parent().unwrap_or(Path::new("."));
		fs::create_dir_all(parent)?;

		let staging = tempfile::Builder::new()
			.prefix(".prepare-")
			.tempdir_in(parent)?;

		let root = match source {
			Source::Archive { url, sha256, .. } => {
				let archive = self.fetch_archive(url, sha256)?;
				let unpacked = staging.path().join("unpacked");
				self.extract(&archive, &unpacked)?;
				single_root(&unpacked)?
			}
			Source::Git { git, branch, .. } => {
				let checkout = staging.path().join("checkout");
				self.checkout(git, branch.as_deref(), &checkout)?;
				checkout
			}
		};

		self.apply_patches(source.patches(), &root)?;

		fs::rename(&root, dest)?;
		Ok(())
	}

	/// Returns the verified archive from the download cache, fetching it when
	/// missing or corrupt.
	pub fn fetch_archive(&self, url: &str, sha256: &str) -> Result<PathBuf, FetchError> {
		fs::create_dir_all(&self.cache_dir)?;
		let path = self.cache_dir.join(archive_file_name(url));

		if path.exists() {
			match verify_checksum(&path, sha256) {
				Ok(()) => {
					debug!("using cached {}", path.display());
					return Ok(path);
				}
				Err(FetchError::ChecksumMismatch { actual, .. }) => {
					warn!("cached {} has checksum {}, fetching again", path.display(), actual);
					fs::remove_file(&path)?;
				}
				Err(e) => return Err(e)
			}
		}

		let mut partial = path.clone().into_os_string();
		partial.push(".part");
		let partial = PathBuf::from(partial);

		info!("fetching {}", url);
		self.download(url, &partial)?;

		if let Err(e) = verify_checksum(&partial, sha256) {
			fs::remove_file(&partial).ok();
			return Err(e);
		}

		fs::rename(&partial, &path)?;
		Ok(path)
	}

	fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
		if let Some(local) = local_path(url) {
			fs::copy(local, dest)?;
			return Ok(());
		}

		ToolCommand::new(&self.tools.curl)
			.args(["-fL", "--retry", "0", "-o"])
			.arg(dest.to_string_lossy())
			.arg(url)
			.arg(if self.verbose { "--progress-bar" } else { "--silent" })
			.envs(self.env)
			.run(self.verbose)
			.map_err(|failure| {
				fs::remove_file(dest).ok();
				FetchError::Download { url: url.to_string(), failure }
			})
	}

	pub fn extract(&self, archive: &Path, dest: &Path) -> Result<(), FetchError> {
		fs::create_dir_all(dest)?;

		let name = archive.file_name()
			.map(|name| name.to_string_lossy().to_lowercase())
			.unwrap_or_default();

		debug!("extracting {}", archive.display());

		let file = File::open(archive)?;
		let reader: Box<dyn Read> = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
			Box::new(GzDecoder::new(BufReader::new(file)))
		} else if name.ends_with(".tar") {
			Box::new(BufReader::new(file))
		} else {
			return ToolCommand::new(&self.tools.tar)
				.arg("-xf")
				.arg(archive.to_string_lossy())
				.current_dir(dest)
				.envs(self.env)
				.run(self.verbose)
				.map_err(|failure| FetchError::Extract {
					archive: archive.to_path_buf(),
					reason: failure.to_string()
				});
		};

		let mut unpacker = tar::Archive::new(reader);
		unpacker.set_preserve_permissions(true);
		unpacker.unpack(dest).map_err(|e| FetchError::Extract {
			archive: archive.to_path_buf(),
			reason: e.to_string()
		})
	}

	fn checkout(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<(), FetchError> {
		info!("cloning {}", url);

		let mut cmd = ToolCommand::new(&self.tools.git)
			.arg("clone")
			.arg("--recurse-submodules");
		if let Some(branch) = branch {
			cmd = cmd.args(["--branch", branch]);
		}

		cmd.arg(url)
			.arg(dest.to_string_lossy())
			.envs(self.env)
			.run(self.verbose)
			.map_err(|failure| FetchError::Checkout { url: url.to_string(), failure })
	}

	pub fn apply_patches(&self, names: &[String], dir: &Path) -> Result<(), FetchError> {
		for name in names {
			let path = ["diff", "patch"].iter()
				.map(|ext| self.patches_dir.join(format!("{}.{}", name, ext)))
				.find(|path| path.exists())
				.ok_or_else(|| FetchError::MissingPatch {
					path: self.patches_dir.join(format!("{}.diff", name))
				})?;

			info!("applying patch {}", name);

			ToolCommand::new(&self.tools.patch)
				.arg("-Np1")
				.arg("-i")
				.arg(path.to_string_lossy())
				.current_dir(dir)
				.envs(self.env)
				.run(self.verbose)
				.map_err(|failure| FetchError::Patch { name: name.clone(), failure })?;
		}

		Ok(())
	}
}

/// Strips a single top-level directory, the usual layout of source tarballs.
fn single_root(dir: &Path) -> Result<PathBuf, FetchError> {
	let entries: Vec<_> = fs::read_dir(dir)?
		.collect::<Result<Vec<_>, _>>()?
		.into_iter()
		.filter(|entry| !entry.file_name().to_string_lossy().starts_with("._"))
		.collect();

	if let [entry] = entries.as_slice() {
		if entry.file_type()?.is_dir() {
			return Ok(entry.path());
		}
	}

	Ok(dir.to_path_buf())
}
