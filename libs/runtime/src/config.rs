use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Application configuration: strongly-typed global sections plus a
/// per-module configuration bag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application identity, used in document titles.
    pub app: AppSection,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Directory containing per-module YAML files (optional).
    #[serde(default)]
    pub modules_dir: Option<String>,
    /// Per-module configuration bag: module_name → arbitrary JSON/YAML value.
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppSection {
    pub name: String,
    /// Base directory for relative log file paths. Empty means the working directory.
    #[serde(default)]
    pub home_dir: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "HyperSpot".to_string(),
            home_dir: String::new(),
        }
    }
}

impl AppSection {
    pub fn home_path(&self) -> PathBuf {
        if self.home_dir.trim().is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&self.home_dir)
        }
    }
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/openapi.log", empty disables the file sink
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>, // How many files to keep
    #[serde(default)]
    pub max_size_mb: Option<u64>, // Max size of the file in MB
}

/// Create a default logging configuration.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "warn".to_string(),
            file: String::new(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            logging: Some(default_logging_config()),
            modules_dir: None,
            modules: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // Optional sections stay None unless YAML/ENV provide them.
        let base = AppConfig {
            app: AppSection::default(),
            logging: None,
            modules_dir: None,
            modules: HashMap::new(),
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path.as_ref()))
            // Example: APP__APP__NAME=Shop maps to app.name
            .merge(Env::prefixed("APP__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| "Failed to extract config from figment".to_string())?;

        if let Some(dir) = config.modules_dir.clone() {
            merge_module_files(&mut config.modules, dir)?;
        }

        Ok(config)
    }

    /// Load configuration from file or fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => Ok(Self::default()),
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(name) = &args.app_name {
            self.app.name = name.clone();
        }

        // Set logging level based on verbose flags for "default" section.
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(), // keep
                1 => "info".to_string(),
                2 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }

    /// Deserialize the `modules.<name>` section. A missing section yields `T::default()`.
    pub fn module_config<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        match self.modules.get(name) {
            Some(raw) => serde_json::from_value(raw.clone())
                .with_context(|| format!("Invalid configuration for module '{name}'")),
            None => Ok(T::default()),
        }
    }
}

/// Command line arguments relevant to configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub app_name: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
}

fn merge_module_files(
    bag: &mut HashMap<String, serde_json::Value>,
    dir: impl AsRef<Path>,
) -> Result<()> {
    use std::fs;
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if ext != "yml" && ext != "yaml" {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read module config {}", path.display()))?;
        let val: serde_yaml::Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse module config {}", path.display()))?;
        bag.insert(name, serde_json::to_value(val)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Debug, Default, Deserialize)]
    struct SampleModule {
        #[serde(default)]
        setting1: String,
        #[serde(default)]
        setting2: u32,
    }

    #[test]
    fn test_default_config_structure() {
        let config = AppConfig::default();

        assert_eq!(config.app.name, "HyperSpot");
        assert_eq!(config.app.home_dir, "");
        assert_eq!(config.app.home_path(), PathBuf::from("."));

        let logging = config.logging.as_ref().unwrap();
        let default_section = &logging["default"];
        assert_eq!(default_section.console_level, "warn");
        assert!(default_section.file.is_empty());

        assert!(config.modules.is_empty());
    }

    #[test]
    fn test_load_layered_reads_yaml() {
        let tmp = tempdir().unwrap();
        let cfg_path = tmp.path().join("cfg.yaml");

        let yaml = r#"
app:
  name: "Shop"
  home_dir: "/var/lib/shop"

logging:
  default:
    console_level: debug
    file: "logs/default.log"
"#;
        fs::write(&cfg_path, yaml).unwrap();

        let config = AppConfig::load_layered(&cfg_path).unwrap();

        assert_eq!(config.app.name, "Shop");
        assert_eq!(config.app.home_path(), PathBuf::from("/var/lib/shop"));
        let def = &config.logging.as_ref().unwrap()["default"];
        assert_eq!(def.console_level, "debug");
        assert_eq!(def.file, "logs/default.log");
    }

    #[test]
    fn test_minimal_yaml_config() {
        let tmp = tempdir().unwrap();
        let cfg_path = tmp.path().join("cfg.yaml");
        fs::write(&cfg_path, "app:\n  name: \"Minimal\"\n").unwrap();

        let config = AppConfig::load_layered(&cfg_path).unwrap();

        assert_eq!(config.app.name, "Minimal");
        // Optional sections default to None
        assert!(config.logging.is_none());
        assert!(config.modules.is_empty());
    }

    #[test]
    fn test_load_or_default_without_file() {
        let config = AppConfig::load_or_default(None::<&str>).unwrap();
        assert_eq!(config.app.name, "HyperSpot");
        assert!(config.logging.is_some());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            app_name: Some("Inventory".to_string()),
            verbose: 3,
            ..Default::default()
        };

        config.apply_cli_overrides(&args);

        assert_eq!(config.app.name, "Inventory");
        let default_section = &config.logging.as_ref().unwrap()["default"];
        assert_eq!(default_section.console_level, "trace");
    }

    #[test]
    fn test_cli_verbose_levels_matrix() {
        for (verbose, expected) in [(0, "warn"), (1, "info"), (2, "debug"), (3, "trace"), (4, "trace")] {
            let mut config = AppConfig::default();
            config.apply_cli_overrides(&CliArgs {
                verbose,
                ..Default::default()
            });
            let default_section = &config.logging.as_ref().unwrap()["default"];
            assert_eq!(default_section.console_level, expected, "verbose={verbose}");
        }
    }

    #[test]
    fn test_layered_config_loading_with_modules_dir() {
        let tmp = tempdir().unwrap();
        let cfg_path = tmp.path().join("modules_dir.yaml");
        let modules_dir = tmp.path().join("modules");

        fs::create_dir_all(&modules_dir).unwrap();
        fs::write(
            modules_dir.join("test_module.yaml"),
            r#"
setting1: "value1"
setting2: 42
"#,
        )
        .unwrap();
        fs::write(modules_dir.join("notes.txt"), "ignored").unwrap();

        // Convert Windows paths to forward slashes for YAML compatibility
        let modules_dir_str = modules_dir.to_string_lossy().replace('\\', "/");
        let yaml = format!(
            r#"
app:
  name: "Shop"

modules_dir: "{}"

modules:
  existing_module:
    key: "value"
"#,
            modules_dir_str
        );
        fs::write(&cfg_path, yaml).unwrap();

        let config = AppConfig::load_layered(&cfg_path).unwrap();

        assert!(config.modules.contains_key("existing_module"));
        assert!(!config.modules.contains_key("notes"));
        let sample: SampleModule = config.module_config("test_module").unwrap();
        assert_eq!(sample.setting1, "value1");
        assert_eq!(sample.setting2, 42);
    }

    #[test]
    fn test_module_config_missing_section_defaults() {
        let config = AppConfig::default();
        let sample: SampleModule = config.module_config("absent").unwrap();
        assert!(sample.setting1.is_empty());
    }

    #[test]
    fn test_module_config_rejects_wrong_types() {
        let mut config = AppConfig::default();
        config
            .modules
            .insert("broken".to_string(), serde_json::json!({ "setting2": "not a number" }));
        let err = config.module_config::<SampleModule>("broken").unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_to_yaml_roundtrip_basic() {
        let config = AppConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("app:"));
        assert!(yaml.contains("logging:"));

        let roundtrip: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(roundtrip.app.name, config.app.name);
    }

    #[test]
    fn test_invalid_yaml_unknown_field() {
        let invalid_yaml = r#"
app:
  name: "Shop"
  port: 8087
"#;
        let result: Result<AppConfig, _> = serde_yaml::from_str(invalid_yaml);
        assert!(result.is_err());
    }
}
