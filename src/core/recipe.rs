//! Recipe (package descriptor) parsing
//!
//! A recipe is a TOML file naming the package, declaring its settings and
//! options, and listing the copy rules used to export sources and to
//! assemble the final package.

use crate::{
    core::settings::KNOWN_SETTINGS,
    error::{PackagerError, Result},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, instrument};

/// Default recipe file name
pub const RECIPE_FILE_NAME: &str = "packager.toml";

/// Recipe written by `packager init`, matching the Spline source layout
pub const TEMPLATE: &str = r#"[package]
name = "Spline"
version = "0.0.1"
license = "MIT"
description = "Spline curve fitter"
settings = ["os", "compiler", "build_type", "arch"]
generators = ["cmake", "cmake_find_package"]

[options]
shared = [true, false]
compiler = ["gcc", "clang"]

[default_options]
shared = false
compiler = "gcc"

[build]
descriptor = "CMakeLists.txt"

# Implementation files and the native build descriptor
[[exports]]
pattern = "*.cpp"
src = "src"
dst = "src"

[[exports]]
pattern = "CMakeLists.txt"
src = "src"
dst = "src"

# Public headers
[[exports]]
pattern = "*.hpp"
src = "include"
dst = "include"

[[exports]]
pattern = "*.h"
src = "include"
dst = "include"

# Private headers
[[exports]]
pattern = "*.h"
src = "include_"
dst = "include"

[[artifacts]]
from = "staging"
pattern = "*.h"
src = "include"
dst = "include"

[[artifacts]]
from = "staging"
pattern = "*.hpp"
src = "include"
dst = "include"

[[artifacts]]
pattern = "*.lib"
dst = "lib"
keep_path = false

[[artifacts]]
pattern = "*.dll"
dst = "bin"
keep_path = false

[[artifacts]]
pattern = "*.dylib"
dst = "lib"
keep_path = false

[[artifacts]]
pattern = "*.so"
dst = "lib"
keep_path = false

[[artifacts]]
pattern = "*.a"
dst = "lib"
keep_path = false

[info]
libs = ["Spline"]
"#;

/// An option value as written in TOML: `true`, `false` or a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Text(String),
}

impl OptionValue {
    /// Canonical string form; booleans are lowercased whatever their spelling
    pub fn normalized(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Text(s) if s.eq_ignore_ascii_case("true") => "true".to_string(),
            Self::Text(s) if s.eq_ignore_ascii_case("false") => "false".to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

/// Output generators that describe the package to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
    /// `packagerbuildinfo.cmake` with include/lib variables
    Cmake,
    /// `Find<Name>.cmake` module with an imported target
    CmakeFindPackage,
    /// `package.env` key/value file
    Env,
}

/// Tree a package rule copies from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleRoot {
    /// Exported sources and headers
    Staging,
    /// Native build output
    #[default]
    Build,
}

/// A single glob copy instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRule {
    /// Glob matched against paths relative to `src`; `*` crosses directories
    pub pattern: String,
    /// Directory the pattern is evaluated in
    #[serde(default)]
    pub src: PathBuf,
    /// Destination directory
    #[serde(default)]
    pub dst: PathBuf,
    /// Preserve the relative directory structure below `src`
    #[serde(default = "default_true")]
    pub keep_path: bool,
    /// Fail the export when `src` yields nothing (export rules only)
    #[serde(default = "default_true")]
    pub required: bool,
    /// Tree the rule reads from (package rules only)
    #[serde(default)]
    pub from: RuleRoot,
}

const fn default_true() -> bool {
    true
}

/// `[package]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSection {
    pub name: String,
    pub version: String,
    pub license: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub settings: Vec<String>,
    #[serde(default)]
    pub generators: Vec<Generator>,
}

/// `[build]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSection {
    /// Native build descriptor expected at the root of the staged sources
    pub descriptor: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            descriptor: "CMakeLists.txt".to_string(),
        }
    }
}

/// `[info]` table: what consumers need to link
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InfoSection {
    /// Libraries produced by this package
    pub libs: Vec<String>,
    /// System libraries consumers must also link
    #[serde(default)]
    pub system_libs: Vec<String>,
    /// Preprocessor definitions consumers must set
    #[serde(default)]
    pub defines: Vec<String>,
}

/// A parsed and validated recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub package: PackageSection,
    #[serde(default)]
    pub options: BTreeMap<String, Vec<OptionValue>>,
    #[serde(default)]
    pub default_options: BTreeMap<String, OptionValue>,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub exports: Vec<CopyRule>,
    #[serde(default)]
    pub artifacts: Vec<CopyRule>,
    pub info: InfoSection,
}

impl Recipe {
    /// Parse the built-in template recipe
    pub fn from_template() -> Result<Self> {
        RecipeParser::new()?.parse_str(TEMPLATE, Path::new(RECIPE_FILE_NAME))
    }

    /// `name/version` reference of the package
    pub fn reference(&self) -> String {
        format!("{}/{}", self.package.name, self.package.version)
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference())
    }
}

/// Recipe parser with validation of names, versions and rules
pub struct RecipeParser {
    /// Package names as accepted by common registries
    re_name: Regex,
    /// Semantic version `MAJOR.MINOR.PATCH[-pre][+build]`
    re_version: Regex,
}

impl RecipeParser {
    /// Create a new recipe parser
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_name: Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_+.-]{1,50}$").map_err(|e| {
                PackagerError::configuration("failed to compile name regex").with_source(e)
            })?,
            re_version: Regex::new(
                r"^(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$",
            )
            .map_err(|e| {
                PackagerError::configuration("failed to compile version regex").with_source(e)
            })?,
        })
    }

    /// Read and validate a recipe file
    #[instrument(skip(self))]
    pub fn parse<P: AsRef<Path> + fmt::Debug>(&self, path: P) -> Result<Recipe> {
        let path = path.as_ref();
        debug!("Parsing recipe: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PackagerError::recipe("recipe file not found", path)
            } else {
                PackagerError::file_system("read", path, e)
            }
        })?;

        self.parse_str(&content, path)
    }

    /// Validate recipe text; `path` is only used in diagnostics
    pub fn parse_str(&self, content: &str, path: &Path) -> Result<Recipe> {
        let recipe: Recipe = toml::from_str(content)
            .map_err(|e| PackagerError::recipe("invalid recipe syntax", path).with_source(e))?;

        self.validate(&recipe, path)?;
        debug!(
            "Parsed recipe {} with {} export rules and {} package rules",
            recipe.reference(),
            recipe.exports.len(),
            recipe.artifacts.len()
        );
        Ok(recipe)
    }

    fn validate(&self, recipe: &Recipe, path: &Path) -> Result<()> {
        let package = &recipe.package;

        if !self.re_name.is_match(&package.name) {
            return Err(PackagerError::recipe(
                format!("invalid package name '{}'", package.name),
                path,
            ));
        }
        if !self.re_version.is_match(&package.version) {
            return Err(PackagerError::recipe(
                format!(
                    "invalid version '{}' (expected MAJOR.MINOR.PATCH)",
                    package.version
                ),
                path,
            ));
        }
        if package.license.trim().is_empty() {
            return Err(PackagerError::recipe("license must not be empty", path));
        }
        if let Some(unknown) = package
            .settings
            .iter()
            .find(|s| !KNOWN_SETTINGS.contains(&s.as_str()))
        {
            return Err(PackagerError::recipe(
                format!(
                    "unknown setting '{unknown}' (known: {})",
                    KNOWN_SETTINGS.join(", ")
                ),
                path,
            ));
        }

        self.validate_options(recipe, path)?;

        if recipe.info.libs.is_empty() || recipe.info.libs.iter().any(|l| l.trim().is_empty()) {
            return Err(PackagerError::recipe(
                "info.libs must list at least one library name",
                path,
            ));
        }
        if recipe.exports.is_empty() {
            return Err(PackagerError::recipe("no export rules declared", path));
        }
        if recipe.artifacts.is_empty() {
            return Err(PackagerError::recipe("no package rules declared", path));
        }
        if !is_relative_inside(Path::new(&recipe.build.descriptor)) {
            return Err(PackagerError::recipe(
                format!("build descriptor '{}' must be a relative path", recipe.build.descriptor),
                path,
            ));
        }

        for rule in recipe.exports.iter().chain(&recipe.artifacts) {
            if rule.pattern.trim().is_empty() {
                return Err(PackagerError::recipe("copy rule with empty pattern", path));
            }
            glob::Pattern::new(&rule.pattern).map_err(|e| {
                PackagerError::recipe(format!("invalid pattern '{}'", rule.pattern), path)
                    .with_source(e)
            })?;
            for dir in [&rule.src, &rule.dst] {
                if !is_relative_inside(dir) {
                    return Err(PackagerError::recipe(
                        format!(
                            "rule '{}' uses path '{}' outside its root",
                            rule.pattern,
                            dir.display()
                        ),
                        path,
                    ));
                }
            }
        }

        Ok(())
    }

    fn validate_options(&self, recipe: &Recipe, path: &Path) -> Result<()> {
        for (key, values) in &recipe.options {
            if values.is_empty() {
                return Err(PackagerError::recipe(
                    format!("option '{key}' declares no values"),
                    path,
                ));
            }
        }

        if let Some(shared) = recipe.options.get("shared") {
            let mut values: Vec<String> = shared.iter().map(OptionValue::normalized).collect();
            values.sort();
            if values != ["false", "true"] {
                return Err(PackagerError::recipe(
                    "option 'shared' must declare exactly true and false",
                    path,
                ));
            }
        }

        for (key, default) in &recipe.default_options {
            let declared = recipe.options.get(key).ok_or_else(|| {
                PackagerError::recipe(format!("default for undeclared option '{key}'"), path)
            })?;
            let value = default.normalized();
            if !declared.iter().any(|v| v.normalized() == value) {
                return Err(PackagerError::recipe(
                    format!("default '{value}' for option '{key}' is not a declared value"),
                    path,
                ));
            }
        }
        Ok(())
    }
}

/// A path that stays below whatever root it is joined to
fn is_relative_inside(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
