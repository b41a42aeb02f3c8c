use toml::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
	Value(String),
	/// Flag without an argument.
	Switch
}

/// How a build system expects its flags on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagStyle {
	CMake,
	Meson,
	Configure,
	Make
}

/// Ordered flag table. Rendering follows insertion order; replacing a value keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
	entries: Vec<(String, OptionValue)>
}

impl Options {
	pub fn new() -> Self {
		Self::default()
	}

	fn position(&self, key: &str) -> Option<usize> {
		self.entries.iter().position(|(name, _)| name == key)
	}

	fn put(&mut self, key: String, value: OptionValue) {
		match self.position(&key) {
			Some(index) => self.entries[index].1 = value,
			None => self.entries.push((key, value))
		}
	}

	pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.put(key.into(), OptionValue::Value(value.into()));
	}

	pub fn switch(&mut self, key: impl Into<String>) {
		self.put(key.into(), OptionValue::Switch);
	}

	/// Concatenates onto an existing value, separated by a single space.
	pub fn append(&mut self, key: impl Into<String>, value: &str) {
		let key = key.into();
		let value = value.trim();

		match self.position(&key) {
			Some(index) => {
				let entry = &mut self.entries[index].1;
				match entry {
					OptionValue::Value(current) if !current.is_empty() => {
						if !value.is_empty() {
							current.push(' ');
							current.push_str(value);
						}
					}
					_ => *entry = OptionValue::Value(value.to_string())
				}
			}
			None => self.entries.push((key, OptionValue::Value(value.to_string())))
		}
	}

	pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
		self.position(key).map(|index| self.entries.remove(index).1)
	}

	pub fn get(&self, key: &str) -> Option<&OptionValue> {
		self.entries.iter().find(|(name, _)| name == key).map(|(_, value)| value)
	}

	pub fn value(&self, key: &str) -> Option<&str> {
		match self.get(key) {
			Some(OptionValue::Value(value)) => Some(value),
			_ => None
		}
	}

	pub fn contains(&self, key: &str) -> bool {
		self.position(key).is_some()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
		self.entries.iter().map(|(name, value)| (name.as_str(), value))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Sets every entry of a TOML table in order, passing values through `expand`.
	///
	/// Strings and numbers become values, `true` becomes a switch and `false` removes the flag.
	pub fn apply_table<F>(&mut self, table: &toml::Table, mut expand: F) -> Result<(), String>
	where
		F: FnMut(&str) -> String
	{
		for (key, value) in table {
			let key = expand(key);
			match value {
				Value::String(value) => self.set(key, expand(value)),
				Value::Integer(value) => self.set(key, value.to_string()),
				Value::Float(value) => self.set(key, value.to_string()),
				Value::Boolean(true) => self.switch(key),
				Value::Boolean(false) => {
					self.remove(&key);
				}
				other => return Err(format!("option {key} has unsupported value {other}"))
			}
		}

		Ok(())
	}

	pub fn render(&self, style: FlagStyle) -> Vec<String> {
		self.entries.iter().map(|(key, value)| match (style, value) {
			(FlagStyle::CMake | FlagStyle::Meson, OptionValue::Value(value)) => format!("-D{key}={value}"),
			(FlagStyle::CMake, OptionValue::Switch) => format!("-D{key}="),
			(FlagStyle::Meson, OptionValue::Switch) => format!("-D{key}=true"),
			(FlagStyle::Configure | FlagStyle::Make, OptionValue::Value(value)) => format!("{key}={value}"),
			(FlagStyle::Configure | FlagStyle::Make, OptionValue::Switch) => key.clone()
		}).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn append_concatenates_in_order() {
		let mut options = Options::new();
		options.set("CMAKE_EXE_LINKER_FLAGS", "");
		options.append("CMAKE_EXE_LINKER_FLAGS", "-lA");
		options.append("CMAKE_EXE_LINKER_FLAGS", "-lB");

		assert_eq!(options.value("CMAKE_EXE_LINKER_FLAGS"), Some("-lA -lB"));
	}

	#[test]
	fn append_inserts_missing_key() {
		let mut options = Options::new();
		options.append("BUILD_TESTING", "NO");
		assert_eq!(options.value("BUILD_TESTING"), Some("NO"));
	}

	#[test]
	fn set_replaces_in_place() {
		let mut options = Options::new();
		options.set("A", "1");
		options.set("B", "2");
		options.set("A", "3");

		assert_eq!(options.render(FlagStyle::CMake), vec!["-DA=3", "-DB=2"]);
	}

	#[test]
	fn rendering_is_stable() {
		let build = || {
			let mut options = Options::new();
			options.set("--prefix", "/opt");
			options.switch("--enable-sdl2");
			options.set("--enable-http", "no");
			options
		};

		assert_eq!(build().render(FlagStyle::Configure), build().render(FlagStyle::Configure));
		assert_eq!(
			build().render(FlagStyle::Configure),
			vec!["--prefix=/opt", "--enable-sdl2", "--enable-http=no"]);
	}

	#[test]
	fn switches_per_style() {
		let mut options = Options::new();
		options.switch("LIB_SUFFIX");

		assert_eq!(options.render(FlagStyle::CMake), vec!["-DLIB_SUFFIX="]);
		assert_eq!(options.render(FlagStyle::Meson), vec!["-DLIB_SUFFIX=true"]);
		assert_eq!(options.render(FlagStyle::Make), vec!["LIB_SUFFIX"]);
	}

	#[test]
	fn applies_toml_table() {
		let table: toml::Table = toml::from_str(r#"
			SDL_TEST = "NO"
			"--enable-sdl2" = true
			JOBS = 4
		"#).unwrap();

		let mut options = Options::new();
		options.set("SDL_TEST", "YES");
		options.apply_table(&table, |text| text.to_string()).unwrap();

		assert_eq!(options.value("SDL_TEST"), Some("NO"));
		assert_eq!(options.get("--enable-sdl2"), Some(&OptionValue::Switch));
		assert_eq!(options.value("JOBS"), Some("4"));
	}

	#[test]
	fn false_removes_flag() {
		let table: toml::Table = toml::from_str(r#"prefix = false"#).unwrap();

		let mut options = Options::new();
		options.set("prefix", "/usr");
		options.apply_table(&table, |text| text.to_string()).unwrap();

		assert!(!options.contains("prefix"));
	}
}
