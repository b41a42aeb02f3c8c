use serde::Deserialize;

/// CPU architecture a pass is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
	Arm64,
	#[serde(alias = "x86-64", alias = "x64")]
	X86_64
}

impl Arch {
	pub fn host() -> Self {
		#[cfg(target_arch = "aarch64")]
		{
			Self::Arm64
		}
		#[cfg(not(target_arch = "aarch64"))]
		{
			Self::X86_64
		}
	}

	/// Name used by Apple tools (`-arch`, `lipo`, `CMAKE_OSX_ARCHITECTURES`).
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Arm64 => "arm64",
			Self::X86_64 => "x86_64"
		}
	}

	/// Meson `cpu_family` and GNU triplet prefix.
	pub fn cpu_family(&self) -> &'static str {
		match self {
			Self::Arm64 => "aarch64",
			Self::X86_64 => "x86_64"
		}
	}

	pub fn compiler_define(&self) -> &'static str {
		match self {
			Self::Arm64 => "__aarch64__",
			Self::X86_64 => "__x86_64__"
		}
	}

	pub fn all() -> [Arch; 2] {
		[Self::Arm64, Self::X86_64]
	}
}

impl std::fmt::Display for Arch {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for Arch {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"arm64" | "aarch64" => Ok(Self::Arm64),
			"x86_64" | "x86-64" | "x64" | "amd64" => Ok(Self::X86_64),
			_ => Err(format!("unknown architecture: {s}"))
		}
	}
}
