//! Command implementations for the CLI

use crate::{
    cli::Command,
    config::Config,
    core::{
        CMakeToolchain, Pipeline, Profile, Recipe, RecipeParser, artifacts::PackageArtifact,
        recipe::TEMPLATE,
    },
    utils::fs::FileSystemUtils,
};
use anyhow::{Context, bail};
use tracing::{info, instrument};

/// Execute the appropriate command based on CLI arguments
#[instrument(skip(config))]
pub fn execute_command(config: &Config, command: &Command) -> anyhow::Result<()> {
    match command {
        Command::Init { force } => execute_init_command(config, *force),
        Command::Export => execute_export_command(config),
        Command::Build { .. } => execute_build_command(config),
        Command::Package { .. } => execute_package_command(config),
        Command::Info { json } => execute_info_command(config, *json),
        Command::Create { .. } => execute_create_command(config),
    }
}

/// Parse the recipe and resolve the profile for it
fn load_recipe(config: &Config) -> anyhow::Result<(Recipe, Profile)> {
    let parser = RecipeParser::new()?;
    let recipe = parser
        .parse(&config.recipe_path)
        .context("Failed to load recipe")?;
    let overrides = config.overrides().context("Failed to read profile")?;
    let profile = Profile::resolve(&recipe, &overrides).context("Failed to resolve profile")?;
    Ok((recipe, profile))
}

fn resume_pipeline(config: &Config) -> anyhow::Result<Pipeline<'_, CMakeToolchain>> {
    let (recipe, profile) = load_recipe(config)?;
    let pipeline = Pipeline::resume(config, recipe, profile, CMakeToolchain::new(config.debug))
        .context("Failed to load pipeline state")?;
    Ok(pipeline)
}

fn report_package(package: &PackageArtifact) {
    info!("{}", package.summary());
    info!(
        "Package {}:{} ({}) published to {}",
        package.reference,
        package.package_id,
        package.linkage,
        package.package_dir.display()
    );
}

/// Execute the init command
#[instrument(skip(config))]
fn execute_init_command(config: &Config, force: bool) -> anyhow::Result<()> {
    let path = &config.recipe_path;
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }

    FileSystemUtils::new()
        .write_file(path, TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Wrote recipe template to {}", path.display());
    Ok(())
}

/// Execute the export command
#[instrument(skip(config))]
fn execute_export_command(config: &Config) -> anyhow::Result<()> {
    info!("Exporting sources...");

    let mut pipeline = resume_pipeline(config)?;
    let exported = pipeline
        .export_sources()
        .context("Export stage failed")?;

    info!(
        "Export completed successfully. Staged {} files ({} headers) in {}",
        exported.files.len(),
        exported.headers().count(),
        exported.staging_dir.display()
    );
    Ok(())
}

/// Execute the build command
#[instrument(skip(config))]
fn execute_build_command(config: &Config) -> anyhow::Result<()> {
    info!("Building package...");

    let mut pipeline = resume_pipeline(config)?;
    let build = pipeline.build().context("Build stage failed")?;

    info!(
        "Build completed successfully. Produced {} {} artifact(s)",
        build.artifacts.len(),
        build.linkage()
    );
    Ok(())
}

/// Execute the package command
#[instrument(skip(config))]
fn execute_package_command(config: &Config) -> anyhow::Result<()> {
    info!(
        "Packaging into: {}",
        config.package.output_dir.display()
    );

    let mut pipeline = resume_pipeline(config)?;
    let package = pipeline.package().context("Package stage failed")?;

    report_package(&package);
    Ok(())
}

/// Execute the info command
#[instrument(skip(config))]
fn execute_info_command(config: &Config, json: bool) -> anyhow::Result<()> {
    let pipeline = resume_pipeline(config)?;
    let info = pipeline.describe().context("Describe stage failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let root = match pipeline.state() {
        crate::core::PipelineState::Packaged { package, .. } => package.package_dir.clone(),
        _ => bail!("no published package"),
    };
    println!("{} ({})", info.reference(), info.license);
    println!("  package id:   {}", info.package_id);
    println!("  linkage:      {}", info.linkage);
    for (key, value) in &info.settings {
        println!("  {:<13} {value}", format!("{key}:"));
    }
    println!("  libs:         {}", info.libs.join(" "));
    println!("  include dirs: {}", info.include_dirs.join(" "));
    println!("  lib dirs:     {}", info.lib_dirs.join(" "));
    if !info.bin_dirs.is_empty() {
        println!("  bin dirs:     {}", info.bin_dirs.join(" "));
    }
    println!("  cflags:       {}", info.compile_flags(&root).join(" "));
    println!("  ldflags:      {}", info.link_flags(&root).join(" "));
    Ok(())
}

/// Execute the create command
#[instrument(skip(config))]
fn execute_create_command(config: &Config) -> anyhow::Result<()> {
    info!("Creating package from {}...", config.source_dir.display());

    let (recipe, profile) = load_recipe(config)?;
    let mut pipeline = Pipeline::new(config, recipe, profile, CMakeToolchain::new(config.debug))?;

    pipeline.export_sources().context("Export stage failed")?;
    pipeline.build().context("Build stage failed")?;
    let package = pipeline.package().context("Package stage failed")?;

    report_package(&package);
    Ok(())
}
