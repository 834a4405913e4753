//! Package metadata published alongside the binaries
//!
//! [`PackageInfo`] is everything a downstream build needs to consume the
//! package: include directories, library directories and the libraries to
//! link. It is stored as `package-info.json` in the package root and
//! rendered into the generator files the recipe asks for.

use crate::{
    core::{
        generators,
        recipe::Recipe,
        settings::{ArtifactKind, Linkage, Profile},
    },
    error::{PackagerError, Result},
    utils::fs::FileSystemUtils,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Metadata file written into every package
pub const PACKAGE_INFO_FILE: &str = "package-info.json";

const HEADER_EXTENSIONS: [&str; 6] = ["h", "hpp", "hh", "hxx", "inl", "ipp"];

/// A file inside a published package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagedFile {
    /// Path relative to the package root, `/`-separated
    pub path: String,
    /// Hex SHA-256 of the contents
    pub sha256: String,
    /// Set for binaries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ArtifactKind>,
}

impl PackagedFile {
    pub fn is_header(&self) -> bool {
        Path::new(&self.path)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| HEADER_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
    }

    /// Whether consumers pass this file to the linker
    pub fn is_linkable(&self) -> bool {
        matches!(
            self.kind,
            Some(ArtifactKind::StaticArchive | ArtifactKind::SharedObject | ArtifactKind::ImportLibrary)
        )
    }

    fn parent_dir(&self) -> Option<String> {
        let parent = Path::new(&self.path).parent()?;
        if parent.as_os_str().is_empty() {
            return None;
        }
        Some(portable(parent))
    }

    fn top_dir(&self) -> Option<String> {
        let path = Path::new(&self.path);
        let first = path.components().next()?;
        (path.components().count() > 1).then(|| portable(Path::new(first.as_os_str())))
    }
}

/// Metadata record describing one published binary package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub license: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub package_id: String,
    pub settings: BTreeMap<String, String>,
    pub options: BTreeMap<String, String>,
    pub linkage: Linkage,
    /// Libraries consumers link against
    pub libs: Vec<String>,
    #[serde(default)]
    pub system_libs: Vec<String>,
    #[serde(default)]
    pub defines: Vec<String>,
    /// Directories relative to the package root
    pub include_dirs: Vec<String>,
    pub lib_dirs: Vec<String>,
    pub bin_dirs: Vec<String>,
    pub files: Vec<PackagedFile>,
    pub created_at: DateTime<Utc>,
}

impl PackageInfo {
    /// Build the metadata for a package made of `files`
    pub fn describe(
        recipe: &Recipe,
        profile: &Profile,
        package_id: &str,
        files: Vec<PackagedFile>,
    ) -> Self {
        let include_dirs: BTreeSet<String> = files
            .iter()
            .filter(|f| f.is_header())
            .filter_map(PackagedFile::top_dir)
            .collect();
        let lib_dirs: BTreeSet<String> = files
            .iter()
            .filter(|f| f.is_linkable())
            .filter_map(PackagedFile::parent_dir)
            .collect();
        let bin_dirs: BTreeSet<String> = files
            .iter()
            .filter(|f| f.kind == Some(ArtifactKind::DynamicLibrary))
            .filter_map(PackagedFile::parent_dir)
            .collect();

        Self {
            name: recipe.package.name.clone(),
            version: recipe.package.version.clone(),
            license: recipe.package.license.clone(),
            description: recipe.package.description.clone(),
            package_id: package_id.to_string(),
            settings: profile.declared_settings(recipe),
            options: profile.options.clone(),
            linkage: profile.linkage(),
            libs: recipe.info.libs.clone(),
            system_libs: recipe.info.system_libs.clone(),
            defines: recipe.info.defines.clone(),
            include_dirs: include_dirs.into_iter().collect(),
            lib_dirs: lib_dirs.into_iter().collect(),
            bin_dirs: bin_dirs.into_iter().collect(),
            files,
            created_at: Utc::now(),
        }
    }

    /// `name/version` reference
    pub fn reference(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    /// Compiler flags for a package located at `root`
    pub fn compile_flags(&self, root: &Path) -> Vec<String> {
        self.include_dirs
            .iter()
            .map(|dir| format!("-I{}", portable(&root.join(dir))))
            .chain(self.defines.iter().map(|define| format!("-D{define}")))
            .collect()
    }

    /// Linker flags for a package located at `root`
    pub fn link_flags(&self, root: &Path) -> Vec<String> {
        self.lib_dirs
            .iter()
            .map(|dir| format!("-L{}", portable(&root.join(dir))))
            .chain(
                self.libs
                    .iter()
                    .chain(&self.system_libs)
                    .map(|lib| format!("-l{lib}")),
            )
            .collect()
    }

    /// Write `package-info.json` and the requested generator files
    #[instrument(skip(self, recipe))]
    pub fn write(&self, package_dir: &Path, recipe: &Recipe) -> Result<Vec<PathBuf>> {
        let fs_utils = FileSystemUtils::new();
        let mut written = Vec::new();

        let json_path = package_dir.join(PACKAGE_INFO_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            PackagerError::packaging(format!("failed to serialize package info: {e}"), &json_path)
        })?;
        fs_utils
            .write_file(&json_path, json)
            .map_err(|e| PackagerError::file_system("write", &json_path, e))?;
        written.push(json_path);

        for generator in &recipe.package.generators {
            let path = package_dir.join(generators::file_name(*generator, self));
            fs_utils
                .write_file(&path, generators::render(*generator, self))
                .map_err(|e| PackagerError::file_system("write", &path, e))?;
            debug!("Generator {:?} wrote {}", generator, path.display());
            written.push(path);
        }

        info!(
            "Described {} ({} libs, {} generator files)",
            self.reference(),
            self.libs.len(),
            written.len() - 1
        );
        Ok(written)
    }

    /// Read `package-info.json` from a package directory
    #[instrument]
    pub fn load(package_dir: &Path) -> Result<Self> {
        let path = package_dir.join(PACKAGE_INFO_FILE);
        let content = FileSystemUtils::new().read_file_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PackagerError::packaging("package metadata is missing", &path)
            } else {
                PackagerError::file_system("read", &path, e)
            }
        })?;
        serde_json::from_str(&content).map_err(|e| {
            PackagerError::packaging(format!("package metadata is corrupt: {e}"), &path)
        })
    }
}

/// Path with `/` separators regardless of host
pub(crate) fn portable(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
