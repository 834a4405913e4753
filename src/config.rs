//! Configuration management for the packager
//!
//! Folds command-line arguments into one [`Config`] shared by every stage
//! and validates it before anything touches the file system.

use crate::{
    cli::{Args, Command},
    core::settings::ProfileOverrides,
    error::{PackagerError, Result},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File recording how far the pipeline got, inside the work directory
pub const STATE_FILE_NAME: &str = ".packager-state.json";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Enable debug logging
    pub debug: bool,
    /// Recipe file path
    pub recipe_path: PathBuf,
    /// Source tree to export from; never written to
    pub source_dir: PathBuf,
    /// Staging, build output and pipeline state live here
    pub work_dir: PathBuf,
    /// Settings and options
    pub profile: ProfileConfig,
    /// Build configuration
    pub build: BuildConfig,
    /// Package configuration
    pub package: PackageConfig,
}

/// Where settings and options come from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// TOML profile applied before command-line values
    pub profile_file: Option<PathBuf>,
    /// `key=value` settings from the command line
    pub settings: Vec<String>,
    /// `key=value` options from the command line
    pub options: Vec<String>,
}

/// Build configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Parallel compile jobs
    pub jobs: Option<usize>,
    /// Remove previous build output first
    pub clean: bool,
}

/// Package configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Root of the local package store
    pub output_dir: PathBuf,
    /// Replace an already published package with the same id
    pub force: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            recipe_path: PathBuf::from(crate::core::recipe::RECIPE_FILE_NAME),
            source_dir: PathBuf::from("."),
            work_dir: PathBuf::from(".packager"),
            profile: ProfileConfig::default(),
            build: BuildConfig::default(),
            package: PackageConfig::default(),
        }
    }
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("packages"),
            force: false,
        }
    }
}

impl Config {
    /// Create configuration from command line arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = Self {
            debug: args.debug,
            recipe_path: args.recipe.clone(),
            source_dir: args.source_dir.clone(),
            work_dir: args.work_dir.clone(),
            profile: ProfileConfig {
                profile_file: args.profile.clone(),
                settings: args.settings.clone(),
                options: args.options.clone(),
            },
            ..Self::default()
        };

        // Override with command-specific options
        match &args.command {
            Command::Build { jobs, clean } => {
                config.build.jobs = *jobs;
                config.build.clean = *clean;
            }
            Command::Package { output_dir, force } => {
                config.package.output_dir = output_dir.clone();
                config.package.force = *force;
            }
            Command::Create {
                jobs,
                output_dir,
                force,
            } => {
                config.build.jobs = *jobs;
                config.build.clean = true;
                config.package.output_dir = output_dir.clone();
                config.package.force = *force;
            }
            _ => {}
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.build.jobs == Some(0) {
            return Err(PackagerError::configuration("--jobs must be at least 1"));
        }

        if self.work_dir == self.source_dir {
            return Err(PackagerError::configuration(format!(
                "work directory {} must differ from the source directory",
                self.work_dir.display()
            )));
        }

        if let Some(profile) = &self.profile.profile_file
            && !profile.is_file()
        {
            return Err(PackagerError::configuration(format!(
                "profile file not found: {}",
                profile.display()
            )));
        }

        Ok(())
    }

    /// Staging area root
    pub fn staging_dir(&self) -> PathBuf {
        self.work_dir.join("staging")
    }

    /// Staged implementation files and build descriptor
    pub fn staged_source_dir(&self) -> PathBuf {
        self.staging_dir().join("src")
    }

    /// Out-of-tree native build directory
    pub fn build_dir(&self) -> PathBuf {
        self.work_dir.join("build")
    }

    /// Persisted pipeline state
    pub fn state_file(&self) -> PathBuf {
        self.work_dir.join(STATE_FILE_NAME)
    }

    /// Profile file values with command-line values on top
    pub fn overrides(&self) -> Result<ProfileOverrides> {
        let base = match &self.profile.profile_file {
            Some(path) => ProfileOverrides::from_file(path)?,
            None => ProfileOverrides::default(),
        };
        let cli = ProfileOverrides {
            settings: ProfileOverrides::parse_pairs(&self.profile.settings)?,
            options: ProfileOverrides::parse_pairs(&self.profile.options)?,
        };
        Ok(base.merge(cli))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_from_args_applies_command_options() {
        let args = Args::try_parse_from([
            "packager",
            "-s",
            "build_type=Debug",
            "package",
            "--output-dir",
            "out",
            "--force",
        ])
        .unwrap();
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.package.output_dir, PathBuf::from("out"));
        assert!(config.package.force);
        assert_eq!(config.profile.settings, vec!["build_type=Debug"]);
    }

    #[test]
    fn test_zero_jobs_is_rejected() {
        let mut config = Config::default();
        config.build.jobs = Some(0);
        assert!(matches!(
            config.validate(),
            Err(PackagerError::Configuration { .. })
        ));
    }

    #[test]
    fn test_work_dir_must_differ_from_sources() {
        let mut config = Config::default();
        config.work_dir = config.source_dir.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_merge_profile_file_then_cli() {
        let dir = TempDir::new().unwrap();
        let profile = dir.path().join("linux-debug.toml");
        fs::write(
            &profile,
            "[settings]\nos = \"linux\"\nbuild_type = \"Debug\"\n\n[options]\nshared = true\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.profile.profile_file = Some(profile);
        config.profile.options = vec!["shared=false".to_string()];

        let overrides = config.overrides().unwrap();
        assert_eq!(overrides.settings["build_type"].normalized(), "Debug");
        assert_eq!(overrides.options["shared"].normalized(), "false");
    }

    #[test]
    fn test_work_layout() {
        let config = Config::default();
        assert_eq!(config.staged_source_dir(), PathBuf::from(".packager/staging/src"));
        assert_eq!(config.build_dir(), PathBuf::from(".packager/build"));
        assert_eq!(
            config.state_file(),
            PathBuf::from(".packager/.packager-state.json")
        );
    }
}
