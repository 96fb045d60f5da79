//! Config manager for loading, saving, and atomic updates.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Section-level updates (only modified section is changed)
//! - Preserves comments and formatting of other sections with toml_edit

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages the peakbatch configuration file.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Create a manager for the given file. Nothing is read until
    /// `load()` or `load_or_create()`.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mutable settings. Changes stay in memory until `save()` or
    /// `update_section()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load config from file. Fails if the file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = toml::from_str(&content)?;
        tracing::debug!(path = %self.config_path.display(), "Loaded config");
        Ok(())
    }

    /// Load config from file, writing defaults first if it doesn't exist.
    ///
    /// Existing files are never rewritten here, so hand-written comments
    /// survive; missing keys simply take their defaults.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            return self.load();
        }

        self.settings = Settings::default();
        self.save()?;
        tracing::info!(path = %self.config_path.display(), "Created default config");
        Ok(())
    }

    /// Create the output, temp and logs folders if missing.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        let paths = &self.settings.paths;
        for dir in [&paths.output_folder, &paths.temp_root, &paths.logs_folder] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn logs_folder(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.logs_folder)
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Update a single section on disk.
    ///
    /// Re-reads the file, replaces only the given table and writes back
    /// atomically. Other tables keep their on-disk content.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let section_doc: DocumentMut = self.section_toml(section)?.parse()?;
        doc[section.table_name()] = Item::Table(section_doc.as_table().clone());

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    fn section_toml(&self, section: ConfigSection) -> ConfigResult<String> {
        let settings = &self.settings;
        let content = match section {
            ConfigSection::Paths => toml::to_string_pretty(&settings.paths)?,
            ConfigSection::Logging => toml::to_string_pretty(&settings.logging)?,
            ConfigSection::Execution => toml::to_string_pretty(&settings.execution)?,
            ConfigSection::Search => toml::to_string_pretty(&settings.search)?,
            ConfigSection::Integrate => toml::to_string_pretty(&settings.integrate)?,
            ConfigSection::Output => toml::to_string_pretty(&settings.output)?,
        };
        Ok(content)
    }

    /// Generate config content with a comment above each section.
    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();
        output.push_str("# peakbatch configuration\n");
        output.push_str(
            "# This file is auto-generated. Comments may be preserved on section updates.\n\n",
        );

        for section in ConfigSection::all() {
            output.push_str(&format!("# {}\n", section_comment(section)));

            output.push_str(&format!("[{}]\n", section.table_name()));
            // Nested tables come back as `[rows]`; qualify them with the
            // section name.
            for line in self.section_toml(section)?.lines() {
                match line.strip_prefix('[') {
                    Some(inner) => {
                        output.push_str(&format!("[{}.{}\n", section.table_name(), inner))
                    }
                    None => {
                        output.push_str(line);
                        output.push('\n');
                    }
                }
            }
            output.push('\n');
        }

        Ok(output)
    }

    /// Write content to the config file via a temp file and rename.
    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn section_comment(section: ConfigSection) -> &'static str {
    match section {
        ConfigSection::Paths => "Input, output and working directories",
        ConfigSection::Logging => "Logging configuration",
        ConfigSection::Execution => "Execution strategy, concurrency and timeouts",
        ConfigSection::Search => "Default peak search parameters",
        ConfigSection::Integrate => "Default integration parameters",
        ConfigSection::Output => "Output artifact settings",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_creates_default() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(".config").join("peakbatch.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[paths]"));
        assert!(content.contains("[execution]"));
    }

    #[test]
    fn generated_file_loads_back() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("peakbatch.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.settings_mut().execution.max_concurrent = 9;
        manager.settings_mut().search.rows.min = 5;
        manager.save().unwrap();

        let mut reloaded = ConfigManager::new(&config_path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.settings().execution.max_concurrent, 9);
        assert_eq!(reloaded.settings().search.rows.min, 5);
        assert_eq!(reloaded.settings().search, manager.settings().search);
    }

    #[test]
    fn load_or_create_preserves_existing() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("peakbatch.toml");
        fs::write(
            &config_path,
            "[output]\nexperiment = \"quartz\"\nappend = true\n",
        )
        .unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert_eq!(manager.settings().output.experiment, "quartz");
        assert!(manager.settings().output.append);
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("absent.toml"));
        assert!(matches!(manager.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn update_section_only_changes_target() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("peakbatch.toml");
        fs::write(
            &config_path,
            "# keep me\n[output]\nexperiment = \"quartz\"\n\n[execution]\nmax_concurrent = 2\n",
        )
        .unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load().unwrap();
        manager.settings_mut().execution.max_concurrent = 0;
        manager.settings_mut().output.experiment = "changed in memory".to_string();
        manager.update_section(ConfigSection::Execution).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("# keep me"));
        assert!(content.contains("max_concurrent = 0"));
        assert!(content.contains("experiment = \"quartz\""));
    }

    #[test]
    fn atomic_write_creates_no_temp_on_success() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("peakbatch.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(!config_path.with_extension("toml.tmp").exists());
    }
}
