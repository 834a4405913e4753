//! Glob-driven file copying shared by the export and package stages
//!
//! A [`CopyRule`] selects files below a source directory and copies them
//! into a destination root, either keeping their relative path or
//! flattening them into the destination directory. Destinations claimed
//! by an earlier rule are tracked so two different files never land on
//! the same path.

use crate::{
    core::{info::portable, recipe::CopyRule},
    error::{PackagerError, Result},
    utils::fs::FileSystemUtils,
};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Builds the error reported when two different files claim one destination
pub type ConflictError = fn(String, PathBuf) -> PackagerError;

/// A file copied by a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopiedFile {
    /// Source file path
    pub source: PathBuf,
    /// Path relative to the destination root
    pub relative: PathBuf,
}

/// Applies copy rules into one destination root
pub struct RuleCopier {
    dst_root: PathBuf,
    skip: Vec<PathBuf>,
    conflict: ConflictError,
    /// Destination to (absolute source, source relative to the rule root)
    claimed: BTreeMap<PathBuf, (PathBuf, PathBuf)>,
    fs_utils: FileSystemUtils,
}

impl RuleCopier {
    /// Create a copier writing below `dst_root`
    pub fn new(dst_root: impl Into<PathBuf>, conflict: ConflictError) -> Self {
        Self {
            dst_root: dst_root.into(),
            skip: Vec::new(),
            conflict,
            claimed: BTreeMap::new(),
            fs_utils: FileSystemUtils::new(),
        }
    }

    /// Directories never descended into while matching
    #[must_use]
    pub fn skipping(mut self, dirs: Vec<PathBuf>) -> Self {
        self.skip = dirs;
        self
    }

    /// Files below `src_root.join(rule.src)` selected by the rule, sorted
    pub fn matching_files(&self, src_root: &Path, rule: &CopyRule) -> Result<Vec<PathBuf>> {
        let base = src_root.join(&rule.src);
        let pattern = Pattern::new(&rule.pattern).map_err(|e| {
            PackagerError::configuration(format!("invalid pattern '{}'", rule.pattern))
                .with_source(e)
        })?;
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        let files = self
            .fs_utils
            .list_files(&base, &self.skip)
            .map_err(|e| PackagerError::file_system("scan", &base, e))?;

        Ok(files
            .into_iter()
            .filter(|relative| {
                pattern.matches_path_with(relative, options)
                    || relative
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|name| pattern.matches_with(name, options))
            })
            .collect())
    }

    /// Copy everything the rule selects; returns the files copied
    #[instrument(skip(self, rule), fields(pattern = %rule.pattern))]
    pub fn apply(&mut self, src_root: &Path, rule: &CopyRule) -> Result<Vec<CopiedFile>> {
        self.apply_filtered(src_root, rule, |_| true)
    }

    /// Like [`apply`](Self::apply), copying only files accepted by `filter`
    pub fn apply_filtered(
        &mut self,
        src_root: &Path,
        rule: &CopyRule,
        filter: impl Fn(&Path) -> bool,
    ) -> Result<Vec<CopiedFile>> {
        let base = src_root.join(&rule.src);
        let mut copied = Vec::new();

        for relative in self.matching_files(src_root, rule)? {
            if !filter(&relative) {
                debug!("  filtered out {}", relative.display());
                continue;
            }
            let source = base.join(&relative);
            let target = if rule.keep_path {
                rule.dst.join(&relative)
            } else {
                match relative.file_name() {
                    Some(name) => rule.dst.join(name),
                    None => continue,
                }
            };

            let origin = rule.src.join(&relative);
            if self.claim(&source, &origin, &target)? {
                let destination = self.dst_root.join(&target);
                self.fs_utils
                    .copy_file(&source, &destination)
                    .map_err(|e| PackagerError::file_system("copy", &source, e))?;
                debug!("  {} -> {}", source.display(), destination.display());
                copied.push(CopiedFile {
                    source,
                    relative: target,
                });
            }
        }

        debug!(
            "Rule '{}' from {} copied {} files",
            rule.pattern,
            base.display(),
            copied.len()
        );
        Ok(copied)
    }

    /// Reserve a destination. `Ok(false)` means an identical file is
    /// already there and nothing needs copying.
    fn claim(&mut self, source: &Path, origin: &Path, target: &Path) -> Result<bool> {
        match self.claimed.get(target) {
            None => {
                self.claimed.insert(
                    target.to_path_buf(),
                    (source.to_path_buf(), origin.to_path_buf()),
                );
                Ok(true)
            }
            Some((previous, _)) if previous == source => Ok(false),
            Some((previous, previous_origin)) => {
                let identical = self
                    .fs_utils
                    .files_identical(previous, source)
                    .map_err(|e| PackagerError::file_system("compare", source, e))?;
                if identical {
                    warn!(
                        "{} duplicates {}; keeping the first copy",
                        origin.display(),
                        previous_origin.display()
                    );
                    Ok(false)
                } else {
                    Err((self.conflict)(
                        format!(
                            "'{}' and '{}' both map to '{}' with different contents; \
                             rename one of them or narrow the rule patterns",
                            portable(previous_origin),
                            portable(origin),
                            portable(target)
                        ),
                        self.dst_root.join(target),
                    ))
                }
            }
        }
    }
}
