//! Package assembly
//!
//! Copies headers from the staging area and binaries from the build
//! directory into the package layout, checks the result, writes metadata
//! and publishes the package under `<output>/<name>/<version>/<package_id>`.

use crate::{
    config::Config,
    core::{
        builder::BuildOutput,
        copier::{CopiedFile, RuleCopier},
        exporter::ExportedSources,
        info::{PackageInfo, PackagedFile, portable},
        recipe::{Recipe, RuleRoot},
        settings::{ArtifactKind, Linkage, Os},
    },
    error::{PackagerError, Result},
    utils::fs::FileSystemUtils,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// A published binary package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageArtifact {
    /// `name/version`
    pub reference: String,
    pub package_id: String,
    pub package_dir: PathBuf,
    pub linkage: Linkage,
    pub info: PackageInfo,
}

impl PackageArtifact {
    /// Count packaged files by type
    pub fn summary(&self) -> PackageSummary {
        let mut summary = PackageSummary::default();
        for file in &self.info.files {
            match file.kind {
                Some(ArtifactKind::StaticArchive) => summary.static_archives += 1,
                Some(ArtifactKind::SharedObject | ArtifactKind::DynamicLibrary) => {
                    summary.shared_libraries += 1;
                }
                Some(ArtifactKind::ImportLibrary) => summary.import_libraries += 1,
                None if file.is_header() => summary.headers += 1,
                None => summary.others += 1,
            }
        }
        summary.total = self.info.files.len();
        summary
    }
}

/// Summary of a package's contents
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PackageSummary {
    pub total: usize,
    pub headers: usize,
    pub static_archives: usize,
    pub shared_libraries: usize,
    pub import_libraries: usize,
    pub others: usize,
}

impl fmt::Display for PackageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packaged {} files: {} headers, {} static archives, {} shared libraries, {} import libraries, {} others",
            self.total,
            self.headers,
            self.static_archives,
            self.shared_libraries,
            self.import_libraries,
            self.others
        )
    }
}

fn packaging_conflict(message: String, path: PathBuf) -> PackagerError {
    PackagerError::packaging(message, path)
}

/// Assembles and publishes binary packages
pub struct PackageAssembler<'a> {
    config: &'a Config,
    recipe: &'a Recipe,
    fs_utils: FileSystemUtils,
}

impl<'a> PackageAssembler<'a> {
    pub fn new(config: &'a Config, recipe: &'a Recipe) -> Self {
        Self {
            config,
            recipe,
            fs_utils: FileSystemUtils::new(),
        }
    }

    /// Final location of the package with the given id
    pub fn package_dir(&self, package_id: &str) -> PathBuf {
        self.config
            .package
            .output_dir
            .join(&self.recipe.package.name)
            .join(&self.recipe.package.version)
            .join(package_id)
    }

    /// Assemble the package in a temporary directory and publish it.
    ///
    /// Nothing is written to the final location unless every check passes.
    #[instrument(skip(self, exported, build))]
    pub fn assemble(
        &self,
        exported: &ExportedSources,
        build: &BuildOutput,
        package_id: &str,
    ) -> Result<PackageArtifact> {
        let destination = self.package_dir(package_id);
        if destination.exists() && !self.config.package.force {
            return Err(PackagerError::packaging(
                format!(
                    "package {}:{package_id} is already published; use --force to replace it",
                    self.recipe.reference()
                ),
                destination,
            ));
        }

        let parent = destination
            .parent()
            .unwrap_or(self.config.package.output_dir.as_path());
        self.fs_utils
            .create_dir_all(parent)
            .map_err(|e| PackagerError::file_system("create package parent", parent, e))?;
        let assembly = tempfile::Builder::new()
            .prefix(".assembling-")
            .tempdir_in(parent)
            .map_err(|e| PackagerError::file_system("create assembly dir", parent, e))?;
        debug!("Assembling in {}", assembly.path().display());

        let files = self.copy_contents(assembly.path(), exported, build)?;

        let linkage = build.linkage();
        self.verify_flavor(&files, linkage, &destination)?;
        self.verify_libs(&files, build.profile.settings.os, linkage, &destination)?;

        let info = PackageInfo::describe(self.recipe, &build.profile, package_id, files);
        info.write(assembly.path(), self.recipe)?;

        self.publish(assembly.path(), &destination)?;

        let artifact = PackageArtifact {
            reference: self.recipe.reference(),
            package_id: package_id.to_string(),
            package_dir: destination,
            linkage,
            info,
        };
        info!("{}", artifact.summary());
        info!("Published {}", artifact.package_dir.display());
        Ok(artifact)
    }

    /// Apply every package rule into `root`
    fn copy_contents(
        &self,
        root: &Path,
        exported: &ExportedSources,
        build: &BuildOutput,
    ) -> Result<Vec<PackagedFile>> {
        let os = build.profile.settings.os;
        let linkage = build.linkage();
        let other = match linkage {
            Linkage::Static => Linkage::Shared,
            Linkage::Shared => Linkage::Static,
        };

        let mut copier = RuleCopier::new(root, packaging_conflict);
        let mut copied: Vec<(CopiedFile, RuleRoot)> = Vec::new();

        for rule in &self.recipe.artifacts {
            let tree = match rule.from {
                RuleRoot::Staging => &exported.staging_dir,
                RuleRoot::Build => &build.build_dir,
            };
            if !self.fs_utils.is_dir(&tree.join(&rule.src)) {
                warn!(
                    "Package rule '{}' skipped: {} does not exist",
                    rule.pattern,
                    tree.join(&rule.src).display()
                );
                continue;
            }

            let files = match rule.from {
                RuleRoot::Staging => copier.apply(tree, rule)?,
                // Binaries of the other flavor never enter the package
                RuleRoot::Build => copier.apply_filtered(tree, rule, |path| {
                    os.classify(path, linkage).is_some() || os.classify(path, other).is_none()
                })?,
            };
            copied.extend(files.into_iter().map(|f| (f, rule.from)));
        }

        let mut packaged = Vec::with_capacity(copied.len());
        for (file, from) in copied {
            let absolute = root.join(&file.relative);
            let sha256 = self
                .fs_utils
                .sha256_file(&absolute)
                .map_err(|e| PackagerError::file_system("hash", &absolute, e))?;
            let kind = match from {
                RuleRoot::Build => os.classify(&file.relative, linkage),
                RuleRoot::Staging => None,
            };
            packaged.push(PackagedFile {
                path: portable(&file.relative),
                sha256,
                kind,
            });
        }
        packaged.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(packaged)
    }

    /// Exactly one binary flavor must be present
    fn verify_flavor(&self, files: &[PackagedFile], linkage: Linkage, package: &Path) -> Result<()> {
        let count = |pred: fn(ArtifactKind) -> bool| {
            files.iter().filter(|f| f.kind.is_some_and(pred)).count()
        };
        let static_archives = count(|k| k == ArtifactKind::StaticArchive);
        let shared = count(|k| matches!(k, ArtifactKind::SharedObject | ArtifactKind::DynamicLibrary));

        let problem = match linkage {
            Linkage::Shared if shared == 0 => Some("a shared build produced no shared library"),
            Linkage::Static if static_archives == 0 => {
                Some("a static build produced no static archive")
            }
            Linkage::Static if shared > 0 => Some("a static build packaged shared libraries"),
            _ => None,
        };
        match problem {
            Some(message) => Err(PackagerError::packaging(message, package)),
            None => Ok(()),
        }
    }

    /// Every library consumers are told to link must be in the package
    fn verify_libs(
        &self,
        files: &[PackagedFile],
        os: Os,
        linkage: Linkage,
        package: &Path,
    ) -> Result<()> {
        for lib in &self.recipe.info.libs {
            let candidates = os.library_file_names(lib, linkage);
            let found = files.iter().filter(|f| f.is_linkable()).any(|f| {
                Path::new(&f.path)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| candidates.iter().any(|c| c == name))
            });
            if !found {
                return Err(PackagerError::packaging(
                    format!(
                        "library '{lib}' is not in the package (expected one of: {})",
                        candidates.join(", ")
                    ),
                    package,
                ));
            }
        }
        Ok(())
    }

    /// Move the assembled tree into its final location
    fn publish(&self, assembled: &Path, destination: &Path) -> Result<()> {
        if destination.exists() {
            warn!("Replacing published package {}", destination.display());
            self.fs_utils
                .remove_dir_all_if_exists(destination)
                .map_err(|e| PackagerError::file_system("replace package", destination, e))?;
        }
        std::fs::rename(assembled, destination)
            .map_err(|e| PackagerError::file_system("publish package", destination, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        builder::BuiltArtifact,
        settings::{Profile, ProfileOverrides},
    };
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        config: Config,
        recipe: Recipe,
        exported: ExportedSources,
        build: BuildOutput,
    }

    fn fixture(shared: bool, binaries: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.work_dir = dir.path().join("work");
        config.package.output_dir = dir.path().join("packages");

        let staging = config.staging_dir();
        fs::create_dir_all(staging.join("include/Applications/MSW")).unwrap();
        fs::create_dir_all(staging.join("src")).unwrap();
        fs::write(staging.join("include/BSplineCurveFitterWindow3.h"), "#pragma once\n").unwrap();
        fs::write(staging.join("include/Applications/MSW/WICFileIO.h"), "// wic\n").unwrap();

        let build_dir = config.build_dir();
        fs::create_dir_all(&build_dir).unwrap();
        for binary in binaries {
            let path = build_dir.join(binary);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, binary.as_bytes()).unwrap();
        }

        let recipe = Recipe::from_template().unwrap();
        let overrides = ProfileOverrides {
            settings: ProfileOverrides::parse_pairs(&["os=linux".to_string()]).unwrap(),
            options: ProfileOverrides::parse_pairs(&[format!("shared={shared}")]).unwrap(),
        };
        let profile = Profile::resolve(&recipe, &overrides).unwrap();
        let exported = ExportedSources {
            staging_dir: staging.clone(),
            source_dir: staging.join("src"),
            files: vec![],
        };
        let build = BuildOutput {
            build_dir,
            profile,
            artifacts: binaries
                .iter()
                .map(|b| BuiltArtifact {
                    path: PathBuf::from(b),
                    kind: ArtifactKind::StaticArchive,
                })
                .collect(),
        };
        Fixture {
            _dir: dir,
            config,
            recipe,
            exported,
            build,
        }
    }

    #[test]
    fn test_static_package_layout() {
        let fx = fixture(false, &["libSpline.a", "CMakeFiles/leftover.so"]);
        let assembler = PackageAssembler::new(&fx.config, &fx.recipe);

        let artifact = assembler.assemble(&fx.exported, &fx.build, "id1").unwrap();

        let root = &artifact.package_dir;
        assert_eq!(*root, fx.config.package.output_dir.join("Spline/0.0.1/id1"));
        assert!(root.join("lib/libSpline.a").is_file());
        assert!(!root.join("lib/leftover.so").exists());
        assert!(root.join("include/Applications/MSW/WICFileIO.h").is_file());
        assert!(root.join("package-info.json").is_file());
        assert!(root.join("FindSpline.cmake").is_file());

        let summary = artifact.summary();
        assert_eq!(summary.static_archives, 1);
        assert_eq!(summary.shared_libraries, 0);
        assert_eq!(summary.headers, 2);
    }

    #[test]
    fn test_shared_build_without_shared_library_is_rejected() {
        let fx = fixture(true, &["libSpline.a"]);
        let assembler = PackageAssembler::new(&fx.config, &fx.recipe);

        let err = assembler.assemble(&fx.exported, &fx.build, "id2").unwrap_err();
        assert!(matches!(err, PackagerError::Packaging { .. }));
        assert!(!assembler.package_dir("id2").exists());
    }

    #[test]
    fn test_declared_library_must_be_packaged() {
        let fx = fixture(false, &["libOther.a"]);
        let assembler = PackageAssembler::new(&fx.config, &fx.recipe);

        let err = assembler.assemble(&fx.exported, &fx.build, "id3").unwrap_err();
        assert!(err.to_string().contains("Spline"));
    }

    #[test]
    fn test_published_package_is_immutable_without_force() {
        let mut fx = fixture(false, &["libSpline.a"]);
        PackageAssembler::new(&fx.config, &fx.recipe)
            .assemble(&fx.exported, &fx.build, "id4")
            .unwrap();

        let err = PackageAssembler::new(&fx.config, &fx.recipe)
            .assemble(&fx.exported, &fx.build, "id4")
            .unwrap_err();
        assert!(err.to_string().contains("--force"));

        fx.config.package.force = true;
        let artifact = PackageAssembler::new(&fx.config, &fx.recipe)
            .assemble(&fx.exported, &fx.build, "id4")
            .unwrap();
        assert!(artifact.package_dir.join("lib/libSpline.a").is_file());
    }

    #[test]
    fn test_failed_assembly_leaves_no_temporary_directory() {
        let fx = fixture(true, &[]);
        let assembler = PackageAssembler::new(&fx.config, &fx.recipe);
        assert!(assembler.assemble(&fx.exported, &fx.build, "id5").is_err());

        let parent = fx.config.package.output_dir.join("Spline/0.0.1");
        assert_eq!(fs::read_dir(parent).unwrap().count(), 0);
    }
}
