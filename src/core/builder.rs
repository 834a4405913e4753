//! Native build stage
//!
//! Configures and compiles the staged sources through a [`Toolchain`] and
//! records which binaries of the selected flavor were produced.

use crate::{
    config::Config,
    core::{
        exporter::ExportedSources,
        settings::{ArtifactKind, Linkage, Profile},
        toolchain::{BuildRequest, Toolchain},
    },
    error::{PackagerError, Result},
    utils::fs::FileSystemUtils,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// A binary found in the build directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltArtifact {
    /// Path relative to the build directory
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

/// Outcome of a successful native build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    pub build_dir: PathBuf,
    /// Profile the binaries were built with
    pub profile: Profile,
    pub artifacts: Vec<BuiltArtifact>,
}

impl BuildOutput {
    pub fn linkage(&self) -> Linkage {
        self.profile.linkage()
    }
}

/// Drives the native toolchain for one package
pub struct PackageBuilder<'a, T: Toolchain> {
    config: &'a Config,
    toolchain: &'a T,
    fs_utils: FileSystemUtils,
}

impl<'a, T: Toolchain> PackageBuilder<'a, T> {
    /// Create a new package builder with the given configuration
    #[must_use]
    pub fn new(config: &'a Config, toolchain: &'a T) -> Self {
        Self {
            config,
            toolchain,
            fs_utils: FileSystemUtils::new(),
        }
    }

    /// Remove previous build output
    #[instrument(skip(self))]
    pub fn clean(&self) -> Result<()> {
        let build_dir = self.config.build_dir();
        info!("Cleaning previous build in {}", build_dir.display());
        self.fs_utils
            .remove_dir_all_if_exists(&build_dir)
            .map_err(|e| PackagerError::file_system("clean build", &build_dir, e))?;
        Ok(())
    }

    /// Configure and compile the exported sources
    #[instrument(skip(self, exported, profile))]
    pub fn build(&self, exported: &ExportedSources, profile: &Profile) -> Result<BuildOutput> {
        if self.config.build.clean {
            self.clean()?;
        }

        if !exported.source_dir.is_dir() {
            return Err(PackagerError::source_not_found(
                "staged sources are missing; export them again",
                &exported.source_dir,
            ));
        }

        let build_dir = self.config.build_dir();
        self.fs_utils
            .create_dir_all(&build_dir)
            .map_err(|e| PackagerError::file_system("create build dir", &build_dir, e))?;

        let linkage = profile.linkage();
        info!(
            "Building with {} ({} {} {} {}, {})",
            self.toolchain.name(),
            profile.settings.os,
            profile.settings.arch,
            profile.settings.compiler,
            profile.settings.build_type,
            linkage
        );

        let request = BuildRequest {
            source_dir: &exported.source_dir,
            build_dir: &build_dir,
            profile,
            jobs: self.config.build.jobs,
        };
        self.toolchain.configure(&request)?;
        self.toolchain.compile(&request)?;

        let artifacts = self.find_artifacts(&build_dir, profile)?;
        if artifacts.is_empty() {
            return Err(PackagerError::compilation(format!(
                "No {linkage} library was produced in {}.\n\n\
                This usually means:\n\
                • The build descriptor ignores BUILD_SHARED_LIBS\n\
                • The library target is excluded from the default build\n\
                • The build failed silently (check logs above)",
                build_dir.display()
            )));
        }

        info!(
            "Build completed successfully. Produced {} artifact(s)",
            artifacts.len()
        );
        for artifact in &artifacts {
            info!("  {:?}: {}", artifact.kind, artifact.path.display());
        }

        Ok(BuildOutput {
            build_dir,
            profile: profile.clone(),
            artifacts,
        })
    }

    /// Binaries of the selected flavor below the build directory
    fn find_artifacts(&self, build_dir: &Path, profile: &Profile) -> Result<Vec<BuiltArtifact>> {
        let os = profile.settings.os;
        let linkage = profile.linkage();
        let other = match linkage {
            Linkage::Static => Linkage::Shared,
            Linkage::Shared => Linkage::Static,
        };

        let files = self
            .fs_utils
            .list_files(build_dir, &[])
            .map_err(|e| PackagerError::file_system("scan build dir", build_dir, e))?;

        let mut artifacts = Vec::new();
        for path in files {
            if let Some(kind) = os.classify(&path, linkage) {
                debug!("Found {:?}: {}", kind, path.display());
                artifacts.push(BuiltArtifact { path, kind });
            } else if os.classify(&path, other).is_some() {
                warn!(
                    "Ignoring {} artifact {} for a {} build",
                    other,
                    path.display(),
                    linkage
                );
            }
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{recipe::Recipe, settings::ProfileOverrides};
    use std::{cell::RefCell, fs};
    use tempfile::TempDir;

    /// Writes fixed files into the build directory instead of compiling
    struct ScriptedToolchain {
        outputs: Vec<&'static str>,
        calls: RefCell<Vec<&'static str>>,
        fail_compile: bool,
    }

    impl Toolchain for ScriptedToolchain {
        fn name(&self) -> &str {
            "scripted"
        }

        fn configure(&self, _request: &BuildRequest<'_>) -> Result<()> {
            self.calls.borrow_mut().push("configure");
            Ok(())
        }

        fn compile(&self, request: &BuildRequest<'_>) -> Result<()> {
            self.calls.borrow_mut().push("compile");
            if self.fail_compile {
                return Err(PackagerError::compilation("error: expected ';'"));
            }
            for output in &self.outputs {
                let path = request.build_dir.join(output);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, output.as_bytes()).unwrap();
            }
            Ok(())
        }
    }

    fn setup(options: &[&str]) -> (TempDir, Config, ExportedSources, Profile) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.work_dir = dir.path().join("work");
        let source_dir = config.staged_source_dir();
        fs::create_dir_all(&source_dir).unwrap();

        let recipe = Recipe::from_template().unwrap();
        let pairs: Vec<String> = options.iter().map(|s| s.to_string()).collect();
        let overrides = ProfileOverrides {
            settings: ProfileOverrides::parse_pairs(&["os=linux".to_string()]).unwrap(),
            options: ProfileOverrides::parse_pairs(&pairs).unwrap(),
        };
        let profile = Profile::resolve(&recipe, &overrides).unwrap();
        let exported = ExportedSources {
            staging_dir: config.staging_dir(),
            source_dir,
            files: vec![],
        };
        (dir, config, exported, profile)
    }

    #[test]
    fn test_build_collects_only_selected_flavor() {
        let (_dir, config, exported, profile) = setup(&["shared=false"]);
        let toolchain = ScriptedToolchain {
            outputs: vec!["lib/libSpline.a", "lib/libSpline.so"],
            calls: RefCell::new(vec![]),
            fail_compile: false,
        };

        let output = PackageBuilder::new(&config, &toolchain)
            .build(&exported, &profile)
            .unwrap();

        assert_eq!(*toolchain.calls.borrow(), vec!["configure", "compile"]);
        assert_eq!(output.artifacts.len(), 1);
        assert_eq!(output.artifacts[0].path, PathBuf::from("lib/libSpline.a"));
        assert_eq!(output.artifacts[0].kind, ArtifactKind::StaticArchive);
    }

    #[test]
    fn test_shared_build_without_shared_object_fails() {
        let (_dir, config, exported, profile) = setup(&["shared=true"]);
        let toolchain = ScriptedToolchain {
            outputs: vec!["libSpline.a"],
            calls: RefCell::new(vec![]),
            fail_compile: false,
        };

        let err = PackageBuilder::new(&config, &toolchain)
            .build(&exported, &profile)
            .unwrap_err();
        assert!(matches!(err, PackagerError::Compilation { .. }));
    }

    #[test]
    fn test_compiler_failure_propagates() {
        let (_dir, config, exported, profile) = setup(&[]);
        let toolchain = ScriptedToolchain {
            outputs: vec![],
            calls: RefCell::new(vec![]),
            fail_compile: true,
        };

        let err = PackageBuilder::new(&config, &toolchain)
            .build(&exported, &profile)
            .unwrap_err();
        assert!(err.to_string().contains("expected ';'"));
    }

    #[test]
    fn test_clean_removes_build_dir() {
        let (_dir, config, _exported, _profile) = setup(&[]);
        fs::create_dir_all(config.build_dir().join("CMakeFiles")).unwrap();
        let toolchain = ScriptedToolchain {
            outputs: vec![],
            calls: RefCell::new(vec![]),
            fail_compile: false,
        };

        PackageBuilder::new(&config, &toolchain).clean().unwrap();
        assert!(!config.build_dir().exists());
    }
}
