//! Configuration for vaultsync
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (~/.config/vaultsync/config.toml, or .json/.json5)
//! 3. Environment variables (VAULTSYNC_* prefix)
//! 4. CLI flags (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::crypto::{GeneratorOptions, KdfParams};
use crate::error::ConfigError;
use crate::sync::SyncSettings;

/// Log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Full,
	Compact,
}

impl std::str::FromStr for LogFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"full" => Ok(LogFormat::Full),
			"compact" => Ok(LogFormat::Compact),
			_ => Err(format!("Unknown log format: {}", s)),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Directory holding the local vault databases (~/.vaultsync)
	pub data_dir: PathBuf,

	/// Profile name; each profile has its own local database
	pub profile: String,

	/// Directory of the shared file remote (defaults to `<dataDir>/remote`)
	pub remote_dir: Option<PathBuf>,

	/// Default log filter when RUST_LOG is unset
	pub log_level: String,

	pub log_format: LogFormat,

	pub sync: SyncSettings,

	/// Key derivation costs used when a vault is created
	pub kdf: KdfParams,

	pub generator: GeneratorOptions,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			data_dir: std::env::var("HOME")
				.ok()
				.map(|h| PathBuf::from(h).join(".vaultsync"))
				.unwrap_or_else(|| PathBuf::from(".vaultsync")),
			profile: "default".to_string(),
			remote_dir: None,
			log_level: "info".to_string(),
			log_format: LogFormat::default(),
			sync: SyncSettings::default(),
			kdf: KdfParams::default(),
			generator: GeneratorOptions::default(),
		}
	}
}

impl Config {
	/// Default config file location, if it exists
	pub fn default_path() -> Option<PathBuf> {
		let home = std::env::var("HOME").ok()?;
		let dir = PathBuf::from(home).join(".config").join("vaultsync");
		["config.toml", "config.json5", "config.json"]
			.iter()
			.map(|name| dir.join(name))
			.find(|path| path.exists())
	}

	/// Parse a config file; the format follows the extension
	pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
			path: path.display().to_string(),
			source,
		})?;

		let parse_failed =
			|message: String| ConfigError::ParseFailed { path: path.display().to_string(), message };

		match path.extension().and_then(|e| e.to_str()) {
			Some("json") | Some("json5") => {
				json5::from_str(&content).map_err(|e| parse_failed(e.to_string()))
			}
			_ => toml::from_str(&content).map_err(|e| parse_failed(e.to_string())),
		}
	}

	/// Defaults, then the given (or default) config file, then environment
	pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
		let mut config = match path.map(Path::to_path_buf).or_else(Config::default_path) {
			Some(path) => Config::from_file(&path)?,
			None => Config::default(),
		};
		config.apply_env_from(|key| std::env::var(key).ok())?;
		config.validate()?;
		Ok(config)
	}

	/// Override fields from `VAULTSYNC_*` variables supplied by `lookup`
	pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(dir) = lookup("VAULTSYNC_DATA_DIR") {
			self.data_dir = PathBuf::from(dir);
		}
		if let Some(profile) = lookup("VAULTSYNC_PROFILE") {
			self.profile = profile;
		}
		if let Some(dir) = lookup("VAULTSYNC_REMOTE_DIR") {
			self.remote_dir = Some(PathBuf::from(dir));
		}
		if let Some(level) = lookup("VAULTSYNC_LOG_LEVEL") {
			self.log_level = level;
		}
		if let Some(format) = lookup("VAULTSYNC_LOG_FORMAT") {
			self.log_format = format.parse().map_err(|message| ConfigError::Invalid { message })?;
		}
		if let Some(parallel) = lookup("VAULTSYNC_PARALLEL_OPERATIONS") {
			self.sync.parallel_operations = parallel.parse().map_err(|_| ConfigError::Invalid {
				message: format!("VAULTSYNC_PARALLEL_OPERATIONS is not a number: {}", parallel),
			})?;
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.profile.is_empty()
			|| self.profile.contains(|c: char| c == '/' || c == '\\' || c == '.')
		{
			return Err(ConfigError::Invalid {
				message: format!("profile name '{}' is not usable as a file name", self.profile),
			});
		}
		if self.sync.parallel_operations == 0 {
			return Err(ConfigError::Invalid {
				message: "sync.parallelOperations must be at least 1".into(),
			});
		}
		self.kdf
			.validate()
			.map_err(|e| ConfigError::Invalid { message: format!("kdf: {}", e) })?;
		Ok(())
	}

	/// Local database of the active profile
	pub fn db_path(&self) -> PathBuf {
		self.data_dir.join(format!("{}.db", self.profile))
	}

	pub fn remote_path(&self) -> PathBuf {
		self.remote_dir.clone().unwrap_or_else(|| self.data_dir.join("remote"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use tempfile::TempDir;

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert_eq!(config.profile, "default");
		assert_eq!(config.sync.parallel_operations, 8);
		assert!(config.sync.propagate_remote_deletes);
		assert_eq!(config.kdf, KdfParams::V1);
		assert!(config.validate().is_ok());
		assert!(config.db_path().ends_with("default.db"));
	}

	#[test]
	fn test_toml_file_overrides_defaults() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.toml");
		std::fs::write(
			&path,
			r#"
profile = "work"
remoteDir = "/mnt/share/vault"
logFormat = "compact"

[sync]
parallelOperations = 2

[generator]
length = 32
special = false
"#,
		)
		.unwrap();

		let config = Config::from_file(&path).unwrap();
		assert_eq!(config.profile, "work");
		assert_eq!(config.remote_path(), PathBuf::from("/mnt/share/vault"));
		assert_eq!(config.log_format, LogFormat::Compact);
		assert_eq!(config.sync.parallel_operations, 2);
		assert!(config.sync.propagate_remote_deletes);
		assert_eq!(config.generator.length, 32);
		assert!(!config.generator.special);
		assert!(config.generator.digits);
	}

	#[test]
	fn test_json5_file() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json5");
		std::fs::write(&path, "{ profile: 'home', kdf: { memCostKib: 65536, timeCost: 3 } }").unwrap();

		let config = Config::from_file(&path).unwrap();
		assert_eq!(config.profile, "home");
		assert_eq!(config.kdf.mem_cost_kib, 65536);
		assert_eq!(config.kdf.time_cost, 3);
		assert_eq!(config.kdf.parallelism, 1);
	}

	#[test]
	fn test_parse_error_names_file() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("broken.toml");
		std::fs::write(&path, "profile = [").unwrap();
		let err = Config::from_file(&path).unwrap_err();
		assert!(err.to_string().contains("broken.toml"));

		let missing = Config::from_file(&tmp.path().join("absent.toml")).unwrap_err();
		assert!(matches!(missing, ConfigError::ReadFailed { .. }));
	}

	#[test]
	fn test_env_overrides() {
		let vars: HashMap<&str, &str> = [
			("VAULTSYNC_PROFILE", "laptop"),
			("VAULTSYNC_DATA_DIR", "/tmp/vs"),
			("VAULTSYNC_PARALLEL_OPERATIONS", "3"),
		]
		.into_iter()
		.collect();

		let mut config = Config::default();
		config.apply_env_from(|key| vars.get(key).map(|v| v.to_string())).unwrap();
		assert_eq!(config.profile, "laptop");
		assert_eq!(config.db_path(), PathBuf::from("/tmp/vs/laptop.db"));
		assert_eq!(config.remote_path(), PathBuf::from("/tmp/vs/remote"));
		assert_eq!(config.sync.parallel_operations, 3);

		let bad = |key: &str| (key == "VAULTSYNC_PARALLEL_OPERATIONS").then(|| "many".to_string());
		assert!(config.apply_env_from(bad).is_err());
	}

	#[test]
	fn test_validate_rejects_bad_values() {
		let mut config = Config::default();
		config.sync.parallel_operations = 0;
		assert!(config.validate().is_err());

		let mut config = Config::default();
		config.kdf = KdfParams::custom(1024, 1, 1);
		assert!(config.validate().is_err());

		let mut config = Config::default();
		config.profile = "../escape".into();
		assert!(config.validate().is_err());
	}
}

// vim: ts=4
