//! Source export stage
//!
//! Copies implementation files, the native build descriptor and headers
//! from the source tree into the staging area. The source tree itself is
//! only read.

use crate::{
    config::Config,
    core::{
        copier::{CopiedFile, RuleCopier},
        recipe::Recipe,
    },
    error::{PackagerError, Result},
    utils::fs::FileSystemUtils,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};
use tracing::{debug, info, instrument, warn};

/// Result of a successful export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedSources {
    /// Root of the staging area
    pub staging_dir: PathBuf,
    /// Directory holding the native build descriptor
    pub source_dir: PathBuf,
    /// Every staged file, relative to `staging_dir`
    pub files: Vec<CopiedFile>,
}

impl ExportedSources {
    /// Staged files below `include/`
    pub fn headers(&self) -> impl Iterator<Item = &CopiedFile> {
        self.files
            .iter()
            .filter(|f| f.relative.starts_with("include"))
    }
}

/// Exports sources and headers into the staging area
pub struct SourceExporter<'a> {
    config: &'a Config,
    recipe: &'a Recipe,
    fs_utils: FileSystemUtils,
}

/// Per source directory bookkeeping for the "required" check
#[derive(Default)]
struct RootUsage {
    required: bool,
    matched: usize,
}

impl<'a> SourceExporter<'a> {
    pub fn new(config: &'a Config, recipe: &'a Recipe) -> Self {
        Self {
            config,
            recipe,
            fs_utils: FileSystemUtils::new(),
        }
    }

    /// Run every export rule against a fresh staging area
    #[instrument(skip(self))]
    pub fn export(&self) -> Result<ExportedSources> {
        let source_root = &self.config.source_dir;
        if !self.fs_utils.is_dir(source_root) {
            return Err(PackagerError::source_not_found(
                "source directory does not exist",
                source_root,
            ));
        }

        let staging_dir = self.config.staging_dir();
        info!(
            "Exporting sources of {} from {} to {}",
            self.recipe,
            source_root.display(),
            staging_dir.display()
        );

        self.fs_utils
            .remove_dir_all_if_exists(&staging_dir)
            .map_err(|e| PackagerError::file_system("clean staging", &staging_dir, e))?;
        self.fs_utils
            .create_dir_all(&staging_dir)
            .map_err(|e| PackagerError::file_system("create staging", &staging_dir, e))?;

        let mut copier = RuleCopier::new(&staging_dir, |message, path| {
            PackagerError::configuration(format!(
                "conflicting files while staging {}: {message}",
                path.display()
            ))
        })
        .skipping(vec![
            self.config.work_dir.clone(),
            self.config.package.output_dir.clone(),
        ]);

        let mut usage: BTreeMap<PathBuf, RootUsage> = BTreeMap::new();
        let mut files = Vec::new();

        for rule in &self.recipe.exports {
            let base = source_root.join(&rule.src);
            let entry = usage.entry(rule.src.clone()).or_default();
            entry.required |= rule.required;

            if !self.fs_utils.is_dir(&base) {
                if rule.required {
                    return Err(PackagerError::source_not_found(
                        format!("directory required by export rule '{}' is missing", rule.pattern),
                        base,
                    ));
                }
                warn!("Optional export directory {} is missing", base.display());
                continue;
            }

            entry.matched += copier.matching_files(source_root, rule)?.len();
            files.extend(copier.apply(source_root, rule)?);
        }

        for (src, root) in &usage {
            if root.required && root.matched == 0 {
                return Err(PackagerError::source_not_found(
                    "required directory contains no files matching its export rules",
                    source_root.join(src),
                ));
            }
        }

        let exported_src = self.config.staged_source_dir();
        let descriptor = exported_src.join(&self.recipe.build.descriptor);
        if !descriptor.is_file() {
            return Err(PackagerError::source_not_found(
                format!(
                    "native build descriptor '{}' was not exported",
                    self.recipe.build.descriptor
                ),
                descriptor,
            ));
        }

        debug!("Staged files: {:?}", files);
        let exported = ExportedSources {
            staging_dir,
            source_dir: exported_src,
            files,
        };
        info!(
            "Exported {} files ({} headers)",
            exported.files.len(),
            exported.headers().count()
        );
        Ok(exported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn spline_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("include/Applications/MSW")).unwrap();
        fs::create_dir_all(root.join("include_")).unwrap();
        fs::write(root.join("src/BSplineCurveFitterWindow3.cpp"), "// impl").unwrap();
        fs::write(root.join("src/CMakeLists.txt"), "project(Spline)").unwrap();
        fs::write(root.join("include/Applications/MSW/WICFileIO.h"), "#pragma once").unwrap();
        fs::write(root.join("include_/BSplineCurveFitterWindow3.h"), "#pragma once").unwrap();
        dir
    }

    fn config_for(tree: &TempDir) -> Config {
        let mut config = Config::default();
        config.source_dir = tree.path().to_path_buf();
        config.work_dir = tree.path().join(".packager");
        config.package.output_dir = tree.path().join("packages");
        config
    }

    #[test]
    fn test_export_merges_header_roots() {
        let tree = spline_tree();
        let config = config_for(&tree);
        let recipe = Recipe::from_template().unwrap();

        let exported = SourceExporter::new(&config, &recipe).export().unwrap();

        let staging = config.staging_dir();
        assert!(staging.join("src/CMakeLists.txt").is_file());
        assert!(staging.join("src/BSplineCurveFitterWindow3.cpp").is_file());
        assert!(staging.join("include/Applications/MSW/WICFileIO.h").is_file());
        assert!(staging.join("include/BSplineCurveFitterWindow3.h").is_file());
        assert_eq!(exported.headers().count(), 2);
        assert_eq!(exported.source_dir, config.staged_source_dir());
    }

    #[test]
    fn test_export_leaves_source_tree_untouched() {
        let tree = spline_tree();
        let config = config_for(&tree);
        let recipe = Recipe::from_template().unwrap();
        let before = FileSystemUtils::new()
            .list_files(tree.path(), &[config.work_dir.clone()])
            .unwrap();

        SourceExporter::new(&config, &recipe).export().unwrap();

        let after = FileSystemUtils::new()
            .list_files(tree.path(), &[config.work_dir.clone()])
            .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_empty_private_header_root_is_source_not_found() {
        let tree = spline_tree();
        fs::remove_file(tree.path().join("include_/BSplineCurveFitterWindow3.h")).unwrap();
        let config = config_for(&tree);
        let recipe = Recipe::from_template().unwrap();

        let err = SourceExporter::new(&config, &recipe).export().unwrap_err();
        assert!(matches!(err, PackagerError::SourceNotFound { .. }));
    }

    #[test]
    fn test_absent_header_root_is_source_not_found() {
        let tree = spline_tree();
        fs::remove_dir_all(tree.path().join("include")).unwrap();
        let config = config_for(&tree);
        let recipe = Recipe::from_template().unwrap();

        let err = SourceExporter::new(&config, &recipe).export().unwrap_err();
        assert!(matches!(err, PackagerError::SourceNotFound { .. }));
    }

    #[test]
    fn test_missing_descriptor_is_source_not_found() {
        let tree = spline_tree();
        fs::remove_file(tree.path().join("src/CMakeLists.txt")).unwrap();
        let config = config_for(&tree);
        let recipe = Recipe::from_template().unwrap();

        let err = SourceExporter::new(&config, &recipe).export().unwrap_err();
        assert!(err.to_string().contains("CMakeLists.txt"));
    }

    #[test]
    fn test_conflicting_headers_are_rejected() {
        let tree = spline_tree();
        fs::write(tree.path().join("include/BSplineCurveFitterWindow3.h"), "different").unwrap();
        let config = config_for(&tree);
        let recipe = Recipe::from_template().unwrap();

        let err = SourceExporter::new(&config, &recipe).export().unwrap_err();
        assert!(matches!(err, PackagerError::Configuration { .. }));
    }
}
