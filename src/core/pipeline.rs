//! The four-stage packaging pipeline
//!
//! `Uninitialized → SourcesExported → Built → Packaged`. Each stage needs
//! the previous one to have succeeded; the reached state is written to
//! `<work_dir>/.packager-state.json` so separate CLI invocations can pick
//! up where the last one stopped.

use crate::{
    config::Config,
    core::{
        artifacts::{PackageArtifact, PackageAssembler},
        builder::{BuildOutput, PackageBuilder},
        exporter::{ExportedSources, SourceExporter},
        info::PackageInfo,
        recipe::Recipe,
        settings::Profile,
        toolchain::Toolchain,
    },
    error::{PackagerError, Result},
    utils::fs::FileSystemUtils,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Pipeline stage reached so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Uninitialized,
    SourcesExported,
    Built,
    Packaged,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::SourcesExported => "sources exported",
            Self::Built => "built",
            Self::Packaged => "packaged",
        };
        f.write_str(name)
    }
}

/// Stage plus everything the stage produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Uninitialized,
    SourcesExported {
        exported: ExportedSources,
    },
    Built {
        exported: ExportedSources,
        build: BuildOutput,
    },
    Packaged {
        exported: ExportedSources,
        build: BuildOutput,
        package: PackageArtifact,
    },
}

impl PipelineState {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Uninitialized => Stage::Uninitialized,
            Self::SourcesExported { .. } => Stage::SourcesExported,
            Self::Built { .. } => Stage::Built,
            Self::Packaged { .. } => Stage::Packaged,
        }
    }

    fn exported(&self) -> Option<&ExportedSources> {
        match self {
            Self::Uninitialized => None,
            Self::SourcesExported { exported }
            | Self::Built { exported, .. }
            | Self::Packaged { exported, .. } => Some(exported),
        }
    }

    fn built(&self) -> Option<(&ExportedSources, &BuildOutput)> {
        match self {
            Self::Built { exported, build } | Self::Packaged { exported, build, .. } => {
                Some((exported, build))
            }
            _ => None,
        }
    }
}

/// On-disk form of the pipeline state
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    /// `name/version` the state was produced for
    reference: String,
    /// Profile the sources were exported with
    profile: Profile,
    package_id: String,
    state: PipelineState,
}

/// Runs the stages for one recipe and profile
pub struct Pipeline<'a, T: Toolchain> {
    config: &'a Config,
    recipe: Recipe,
    profile: Profile,
    package_id: String,
    toolchain: T,
    state: PipelineState,
    /// Reference and profile the persisted state belongs to
    recorded: (String, Profile),
    fs_utils: FileSystemUtils,
}

impl<'a, T: Toolchain> Pipeline<'a, T> {
    /// Start a fresh pipeline, ignoring any persisted state
    pub fn new(config: &'a Config, recipe: Recipe, profile: Profile, toolchain: T) -> Result<Self> {
        let package_id = profile.package_id(&recipe)?;
        info!("{} resolves to package id {}", recipe, package_id);
        Ok(Self {
            config,
            recorded: (recipe.reference(), profile.clone()),
            recipe,
            profile,
            package_id,
            toolchain,
            state: PipelineState::Uninitialized,
            fs_utils: FileSystemUtils::new(),
        })
    }

    /// Continue from the state persisted in the work directory, if any
    #[instrument(skip_all)]
    pub fn resume(
        config: &'a Config,
        recipe: Recipe,
        profile: Profile,
        toolchain: T,
    ) -> Result<Self> {
        let mut pipeline = Self::new(config, recipe, profile, toolchain)?;
        let path = config.state_file();
        if !path.is_file() {
            debug!("No pipeline state at {}", path.display());
            return Ok(pipeline);
        }

        let content = pipeline
            .fs_utils
            .read_file_to_string(&path)
            .map_err(|e| PackagerError::file_system("read state", &path, e))?;
        let saved: StateFile = serde_json::from_str(&content).map_err(|e| {
            PackagerError::configuration(format!(
                "pipeline state {} is unreadable; run export again",
                path.display()
            ))
            .with_source(e)
        })?;

        info!(
            "Resuming {} at stage '{}'",
            saved.reference,
            saved.state.stage()
        );
        pipeline.recorded = (saved.reference, saved.profile);
        pipeline.state = saved.state;
        Ok(pipeline)
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Whether the persisted state was produced for the current recipe and profile
    fn is_current(&self) -> bool {
        self.recorded.0 == self.recipe.reference() && self.recorded.1 == self.profile
    }

    /// Copy sources and headers into a fresh staging area.
    ///
    /// Always allowed; discards whatever later stages produced.
    #[instrument(skip(self))]
    pub fn export_sources(&mut self) -> Result<ExportedSources> {
        self.recorded = (self.recipe.reference(), self.profile.clone());
        match SourceExporter::new(self.config, &self.recipe).export() {
            Ok(exported) => {
                self.transition(PipelineState::SourcesExported {
                    exported: exported.clone(),
                })?;
                Ok(exported)
            }
            Err(e) => {
                let staging = self.config.staging_dir();
                if let Err(cleanup) = self.fs_utils.remove_dir_all_if_exists(&staging) {
                    warn!("Could not clean {}: {}", staging.display(), cleanup);
                }
                self.transition(PipelineState::Uninitialized)?;
                Err(e)
            }
        }
    }

    /// Configure and compile the exported sources
    #[instrument(skip(self))]
    pub fn build(&mut self) -> Result<BuildOutput> {
        let Some(exported) = self.state.exported().cloned() else {
            return Err(PackagerError::source_not_found(
                "sources have not been exported; run export first",
                self.config.staged_source_dir(),
            ));
        };
        if !self.is_current() {
            return Err(PackagerError::configuration(format!(
                "sources were exported for {} with a different profile; run export again",
                self.recorded.0
            )));
        }

        let builder = PackageBuilder::new(self.config, &self.toolchain);
        match builder.build(&exported, &self.profile) {
            Ok(build) => {
                self.transition(PipelineState::Built {
                    exported,
                    build: build.clone(),
                })?;
                Ok(build)
            }
            Err(e) => {
                self.transition(PipelineState::SourcesExported { exported })?;
                Err(e)
            }
        }
    }

    /// Assemble and publish the package from the last successful build
    #[instrument(skip(self))]
    pub fn package(&mut self) -> Result<PackageArtifact> {
        let Some((exported, build)) = self
            .state
            .built()
            .map(|(exported, build)| (exported.clone(), build.clone()))
        else {
            return Err(PackagerError::packaging(
                format!(
                    "nothing has been built (pipeline is {}); run build first",
                    self.stage()
                ),
                self.config.build_dir(),
            ));
        };
        if build.profile != self.profile || !self.is_current() {
            return Err(PackagerError::packaging(
                "the last build used a different profile; run build again",
                &build.build_dir,
            ));
        }

        let assembler = PackageAssembler::new(self.config, &self.recipe);
        let package = assembler.assemble(&exported, &build, &self.package_id)?;
        self.transition(PipelineState::Packaged {
            exported,
            build,
            package: package.clone(),
        })?;
        Ok(package)
    }

    /// Metadata of the package published for the current profile
    #[instrument(skip(self))]
    pub fn describe(&self) -> Result<PackageInfo> {
        match &self.state {
            PipelineState::Packaged { package, .. } if package.package_id == self.package_id => {
                PackageInfo::load(&package.package_dir)
            }
            PipelineState::Packaged { package, .. } => Err(PackagerError::packaging(
                format!(
                    "the last published package {} belongs to a different profile than {}; \
                     run package with this profile first",
                    package.package_id, self.package_id
                ),
                &package.package_dir,
            )),
            other => Err(PackagerError::packaging(
                format!("no package has been published (pipeline is {})", other.stage()),
                &self.config.package.output_dir,
            )),
        }
    }

    /// Run every stage in order
    pub fn run(&mut self) -> Result<PackageArtifact> {
        self.export_sources()?;
        self.build()?;
        self.package()
    }

    fn transition(&mut self, state: PipelineState) -> Result<()> {
        if state.stage() != self.state.stage() {
            info!("Pipeline: {} -> {}", self.state.stage(), state.stage());
        }
        self.state = state;
        self.save()
    }

    /// Persist the current state into the work directory
    fn save(&self) -> Result<()> {
        let path = self.config.state_file();
        let saved = StateFile {
            reference: self.recorded.0.clone(),
            profile: self.recorded.1.clone(),
            package_id: self.package_id.clone(),
            state: self.state.clone(),
        };
        let json = serde_json::to_string_pretty(&saved).map_err(|e| {
            PackagerError::configuration("failed to serialize pipeline state").with_source(e)
        })?;
        self.fs_utils
            .write_file(&path, json)
            .map_err(|e| PackagerError::file_system("write state", &path, e))?;
        debug!("Saved pipeline state to {}", path.display());
        Ok(())
    }
}
