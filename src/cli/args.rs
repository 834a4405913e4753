//! Command-line argument parsing and validation

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Native Packager - Turn a C/C++ source tree into a versioned binary package
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "packager")]
pub struct Args {
    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Recipe describing the package
    #[arg(
        long,
        global = true,
        env = "PACKAGER_RECIPE",
        default_value = "packager.toml"
    )]
    pub recipe: PathBuf,

    /// Source tree to package
    #[arg(
        long = "source-dir",
        global = true,
        env = "PACKAGER_SOURCE_DIR",
        default_value = "."
    )]
    pub source_dir: PathBuf,

    /// Directory for staging, build output and pipeline state
    #[arg(
        long = "work-dir",
        global = true,
        env = "PACKAGER_WORK_DIR",
        default_value = ".packager"
    )]
    pub work_dir: PathBuf,

    /// TOML profile with [settings] and [options] tables
    #[arg(long, global = true, env = "PACKAGER_PROFILE")]
    pub profile: Option<PathBuf>,

    /// Override a setting (os, arch, build_type, compiler)
    #[arg(short = 's', long = "setting", global = true, value_name = "KEY=VALUE")]
    pub settings: Vec<String>,

    /// Override a recipe option (e.g. shared=true)
    #[arg(short = 'o', long = "option", global = true, value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a starter recipe
    Init {
        /// Overwrite an existing recipe
        #[arg(long)]
        force: bool,
    },

    /// Copy sources and headers into the staging area
    Export,

    /// Configure and compile the staged sources
    Build {
        /// Parallel compile jobs
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Remove previous build output before building
        #[arg(long)]
        clean: bool,
    },

    /// Assemble and publish the binary package
    Package {
        /// Root of the local package store
        #[arg(
            short = 'd',
            long = "output-dir",
            env = "PACKAGER_OUTPUT_DIR",
            default_value = "packages"
        )]
        output_dir: PathBuf,

        /// Replace an already published package
        #[arg(long)]
        force: bool,
    },

    /// Show the metadata of the published package
    Info {
        /// Print package-info.json instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Run export, build and package in one go
    Create {
        /// Parallel compile jobs
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Root of the local package store
        #[arg(
            short = 'd',
            long = "output-dir",
            env = "PACKAGER_OUTPUT_DIR",
            default_value = "packages"
        )]
        output_dir: PathBuf,

        /// Replace an already published package
        #[arg(long)]
        force: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_args() {
        let args = Args::try_parse_from(["packager", "export"]).unwrap();
        assert!(!args.debug);
        assert!(matches!(args.command, Command::Export));
        assert_eq!(args.recipe, PathBuf::from("packager.toml"));
    }

    #[test]
    fn test_parse_debug_flag() {
        let args = Args::try_parse_from(["packager", "--debug", "export"]).unwrap();
        assert!(args.debug);
    }

    #[test]
    fn test_settings_and_options_repeat() {
        let args = Args::try_parse_from([
            "packager",
            "build",
            "-s",
            "os=linux",
            "-s",
            "build_type=Release",
            "-o",
            "shared=true",
            "--jobs",
            "8",
        ])
        .unwrap();

        assert_eq!(args.settings, vec!["os=linux", "build_type=Release"]);
        assert_eq!(args.options, vec!["shared=true"]);
        match args.command {
            Command::Build { jobs, clean } => {
                assert_eq!(jobs, Some(8));
                assert!(!clean);
            }
            _ => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_parse_package_with_options() {
        let args =
            Args::try_parse_from(["packager", "package", "-d", "/tmp/store", "--force"]).unwrap();
        match args.command {
            Command::Package { output_dir, force } => {
                assert_eq!(output_dir, PathBuf::from("/tmp/store"));
                assert!(force);
            }
            _ => panic!("Expected Package command"),
        }
    }
}
