#![allow(clippy::cargo_common_metadata)]
use anyhow::{Context, Result};
use native_packager::{cli, config::Config, error::PackagerError, setup_logging};
use tracing::error;

fn main() -> Result<()> {
    // Parse command line arguments
    let args = cli::parse_args();

    // Setup logging based on debug flag
    setup_logging(args.debug)?;

    // Initialize configuration
    let config = Config::from_args(&args).context("Invalid configuration")?;

    // Execute the appropriate command
    let result = cli::execute_command(&config, &args.command);
    if let Err(err) = &result
        && let Some(cause) = err.chain().find_map(|e| e.downcast_ref::<PackagerError>())
    {
        error!("Failed with {}", cause.kind());
    }
    result
}
