//! # Native Packager
//!
//! Turns a C/C++ source tree into a versioned, self-contained binary
//! package. A TOML recipe names the package and lists which files to
//! export and which to package; the pipeline exports sources into a
//! staging area, drives a CMake build and publishes headers, binaries and
//! metadata under `<output>/<name>/<version>/<package_id>/`.
//!
//! ## Features
//!
//! - Glob-driven export of sources and merged public/private headers
//! - Settings and options resolved into a stable package id
//! - Static or shared builds, never both in one package
//! - Atomic publication with metadata and CMake generator files
//! - Pipeline state persisted between invocations
//!
//! ## Example
//!
//! ```no_run
//! use native_packager::{
//!     config::Config,
//!     core::{CMakeToolchain, Pipeline, Profile, RecipeParser},
//! };
//!
//! let config = Config::default();
//! let recipe = RecipeParser::new()?.parse("packager.toml")?;
//! let profile = Profile::resolve(&recipe, &config.overrides()?)?;
//! let mut pipeline = Pipeline::new(&config, recipe, profile, CMakeToolchain::new(false))?;
//! let package = pipeline.run()?;
//! println!("Published {}", package.package_dir.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod utils;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging with appropriate verbosity
pub fn setup_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .compact(),
        )
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
