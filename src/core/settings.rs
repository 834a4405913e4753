//! Build settings, recipe options and the resolved build profile
//!
//! Settings describe the target platform (`os`, `arch`, `build_type`,
//! `compiler`); options are declared by the recipe (`shared`, `compiler`).
//! Both are resolved into a [`Profile`] that drives the native build and
//! determines the package id.

use crate::{
    core::recipe::{OptionValue, Recipe},
    error::{PackagerError, Result},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, fmt, path::Path, str::FromStr};
use tracing::debug;

/// Setting keys the packager understands
pub const KNOWN_SETTINGS: [&str; 4] = ["os", "compiler", "build_type", "arch"];

/// Number of hex characters kept from the package id digest
const PACKAGE_ID_LEN: usize = 40;

/// Target operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

/// Target CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86_64,
    X86,
    Armv8,
    Armv7,
}

/// CMake-style build type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildType {
    Debug,
    Release,
    RelWithDebInfo,
    MinSizeRel,
}

/// Compiler family used for the native build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compiler {
    Gcc,
    Clang,
}

/// Library linkage selected by the `shared` option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    Static,
    Shared,
}

/// Classification of a binary file produced by a native build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// `.a` archive, or `.lib` when building statically with MSVC
    StaticArchive,
    /// `.so` or `.dylib`
    SharedObject,
    /// Windows `.dll`
    DynamicLibrary,
    /// Windows `.lib` or MinGW `.dll.a` accompanying a `.dll`
    ImportLibrary,
}

impl Os {
    /// Detect the host operating system
    pub fn current() -> Option<Self> {
        match std::env::consts::OS {
            "linux" => Some(Self::Linux),
            "macos" => Some(Self::Macos),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        }
    }

    /// Classify a file from the build tree for the given linkage.
    ///
    /// Returns `None` for files that are not binaries of this platform or
    /// that belong to the other linkage flavor.
    pub fn classify(&self, path: &Path, linkage: Linkage) -> Option<ArtifactKind> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        if *self == Self::Windows && extension == "a" {
            let file_name = path.file_name()?.to_str()?.to_ascii_lowercase();
            return match (file_name.ends_with(".dll.a"), linkage) {
                (true, Linkage::Shared) => Some(ArtifactKind::ImportLibrary),
                (false, Linkage::Static) => Some(ArtifactKind::StaticArchive),
                _ => None,
            };
        }
        match (self, extension.as_str(), linkage) {
            (Self::Linux | Self::Macos, "a", Linkage::Static) => Some(ArtifactKind::StaticArchive),
            (Self::Linux, "so", Linkage::Shared) | (Self::Macos, "dylib", Linkage::Shared) => {
                Some(ArtifactKind::SharedObject)
            }
            (Self::Windows, "lib", Linkage::Static) => Some(ArtifactKind::StaticArchive),
            (Self::Windows, "lib", Linkage::Shared) => Some(ArtifactKind::ImportLibrary),
            (Self::Windows, "dll", Linkage::Shared) => Some(ArtifactKind::DynamicLibrary),
            _ => None,
        }
    }

    /// File names a consumer would link against for library `name`
    pub fn library_file_names(&self, name: &str, linkage: Linkage) -> Vec<String> {
        match (self, linkage) {
            (Self::Linux, Linkage::Static) | (Self::Macos, Linkage::Static) => {
                vec![format!("lib{name}.a"), format!("{name}.a")]
            }
            (Self::Linux, Linkage::Shared) => vec![format!("lib{name}.so"), format!("{name}.so")],
            (Self::Macos, Linkage::Shared) => {
                vec![format!("lib{name}.dylib"), format!("{name}.dylib")]
            }
            (Self::Windows, Linkage::Static) => vec![
                format!("{name}.lib"),
                format!("lib{name}.lib"),
                format!("lib{name}.a"),
            ],
            (Self::Windows, Linkage::Shared) => vec![
                format!("{name}.lib"),
                format!("lib{name}.lib"),
                format!("lib{name}.dll.a"),
            ],
        }
    }
}

impl Arch {
    /// Detect the host architecture
    pub fn current() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86_64" => Some(Self::X86_64),
            "x86" => Some(Self::X86),
            "aarch64" => Some(Self::Armv8),
            "arm" => Some(Self::Armv7),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::X86 => "x86",
            Self::Armv8 => "armv8",
            Self::Armv7 => "armv7",
        }
    }
}

impl BuildType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "Debug",
            Self::Release => "Release",
            Self::RelWithDebInfo => "RelWithDebInfo",
            Self::MinSizeRel => "MinSizeRel",
        }
    }
}

impl Compiler {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gcc => "gcc",
            Self::Clang => "clang",
        }
    }

    /// C compiler executable
    pub const fn c_compiler(&self) -> &'static str {
        match self {
            Self::Gcc => "gcc",
            Self::Clang => "clang",
        }
    }

    /// C++ compiler executable
    pub const fn cxx_compiler(&self) -> &'static str {
        match self {
            Self::Gcc => "g++",
            Self::Clang => "clang++",
        }
    }
}

impl Linkage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Shared => "shared",
        }
    }
}

fn unsupported(key: &str, value: &str, expected: &[&str]) -> PackagerError {
    PackagerError::configuration(format!(
        "unsupported {key} '{value}' (expected one of: {})",
        expected.join(", ")
    ))
}

impl FromStr for Os {
    type Err = PackagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" => Ok(Self::Macos),
            "windows" => Ok(Self::Windows),
            _ => Err(unsupported("os", s, &["linux", "macos", "windows"])),
        }
    }
}

impl FromStr for Arch {
    type Err = PackagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Ok(Self::X86_64),
            "x86" | "i686" => Ok(Self::X86),
            "armv8" | "aarch64" | "arm64" => Ok(Self::Armv8),
            "armv7" => Ok(Self::Armv7),
            _ => Err(unsupported("arch", s, &["x86_64", "x86", "armv8", "armv7"])),
        }
    }
}

impl FromStr for BuildType {
    type Err = PackagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Debug" => Ok(Self::Debug),
            "Release" => Ok(Self::Release),
            "RelWithDebInfo" => Ok(Self::RelWithDebInfo),
            "MinSizeRel" => Ok(Self::MinSizeRel),
            _ => Err(unsupported(
                "build_type",
                s,
                &["Debug", "Release", "RelWithDebInfo", "MinSizeRel"],
            )),
        }
    }
}

impl FromStr for Compiler {
    type Err = PackagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gcc" => Ok(Self::Gcc),
            "clang" => Ok(Self::Clang),
            _ => Err(unsupported("compiler", s, &["gcc", "clang"])),
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(Os, Arch, BuildType, Compiler, Linkage);

/// Fully resolved platform settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub os: Os,
    pub arch: Arch,
    pub build_type: BuildType,
    pub compiler: Compiler,
}

/// Raw `key=value` settings and options before validation.
///
/// Later sources override earlier ones: a profile file is merged first,
/// command-line values on top.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(default)]
    pub settings: BTreeMap<String, OptionValue>,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
}

impl ProfileOverrides {
    /// Load overrides from a TOML profile file with `[settings]` and `[options]`
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PackagerError::file_system("read profile", path, e))?;
        toml::from_str(&content).map_err(|e| {
            PackagerError::configuration(format!("invalid profile {}", path.display()))
                .with_source(e)
        })
    }

    /// Parse `key=value` pairs as given on the command line
    pub fn parse_pairs(pairs: &[String]) -> Result<BTreeMap<String, OptionValue>> {
        pairs
            .iter()
            .map(|pair| {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    PackagerError::configuration(format!(
                        "expected key=value, got '{pair}'"
                    ))
                })?;
                let key = key.trim();
                if key.is_empty() {
                    return Err(PackagerError::configuration(format!(
                        "empty key in '{pair}'"
                    )));
                }
                Ok((key.to_string(), OptionValue::Text(value.trim().to_string())))
            })
            .collect()
    }

    /// Overlay `other` on top of `self`
    pub fn merge(mut self, other: Self) -> Self {
        self.settings.extend(other.settings);
        self.options.extend(other.options);
        self
    }
}

/// Settings and options resolved against a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub settings: Settings,
    /// Every declared option with its effective value
    pub options: BTreeMap<String, String>,
}

impl Profile {
    /// Resolve overrides against the recipe declarations and host defaults
    pub fn resolve(recipe: &Recipe, overrides: &ProfileOverrides) -> Result<Self> {
        for key in overrides.settings.keys() {
            if !recipe.package.settings.iter().any(|s| s == key) {
                return Err(PackagerError::configuration(format!(
                    "setting '{key}' is not declared by recipe {}",
                    recipe.reference()
                )));
            }
        }

        let options = Self::resolve_options(recipe, &overrides.options)?;
        let setting = |key: &str| overrides.settings.get(key).map(OptionValue::normalized);

        let os = match setting("os") {
            Some(value) => value.parse()?,
            None => Os::current().ok_or_else(|| {
                PackagerError::configuration(format!(
                    "host os '{}' is not supported; set os explicitly",
                    std::env::consts::OS
                ))
            })?,
        };
        let arch = match setting("arch") {
            Some(value) => value.parse()?,
            None => Arch::current().ok_or_else(|| {
                PackagerError::configuration(format!(
                    "host arch '{}' is not supported; set arch explicitly",
                    std::env::consts::ARCH
                ))
            })?,
        };
        let build_type = match setting("build_type") {
            Some(value) => value.parse()?,
            None => BuildType::Release,
        };

        let option_compiler = options.get("compiler").map(|c| c.parse::<Compiler>()).transpose()?;
        let compiler = match (setting("compiler"), option_compiler) {
            (Some(value), Some(from_option)) => {
                let from_setting: Compiler = value.parse()?;
                if overrides.options.contains_key("compiler") && from_setting != from_option {
                    return Err(PackagerError::configuration(format!(
                        "compiler setting '{from_setting}' conflicts with compiler option '{from_option}'"
                    )));
                }
                from_setting
            }
            (Some(value), None) => value.parse()?,
            (None, Some(from_option)) => from_option,
            (None, None) => Compiler::Gcc,
        };

        let mut options = options;
        if let Some(declared) = recipe.options.get("compiler") {
            let value = compiler.as_str().to_string();
            if !declared.iter().any(|v| v.normalized() == value) {
                return Err(PackagerError::configuration(format!(
                    "compiler '{value}' is not allowed by recipe {}",
                    recipe.reference()
                )));
            }
            options.insert("compiler".to_string(), value);
        }

        let profile = Self {
            settings: Settings {
                os,
                arch,
                build_type,
                compiler,
            },
            options,
        };
        debug!("Resolved profile: {:?}", profile);
        Ok(profile)
    }

    fn resolve_options(
        recipe: &Recipe,
        overrides: &BTreeMap<String, OptionValue>,
    ) -> Result<BTreeMap<String, String>> {
        for key in overrides.keys() {
            if !recipe.options.contains_key(key) {
                return Err(PackagerError::configuration(format!(
                    "option '{key}' is not declared by recipe {}",
                    recipe.reference()
                )));
            }
        }

        let mut resolved = BTreeMap::new();
        for (key, allowed) in &recipe.options {
            let value = match overrides.get(key).or_else(|| recipe.default_options.get(key)) {
                Some(value) => value.normalized(),
                None => {
                    return Err(PackagerError::configuration(format!(
                        "option '{key}' has no value and no default"
                    )));
                }
            };
            if !allowed.iter().any(|candidate| candidate.normalized() == value) {
                let expected: Vec<String> = allowed.iter().map(OptionValue::normalized).collect();
                return Err(PackagerError::configuration(format!(
                    "invalid value '{value}' for option '{key}' (expected one of: {})",
                    expected.join(", ")
                )));
            }
            resolved.insert(key.clone(), value);
        }
        Ok(resolved)
    }

    /// Linkage selected by the `shared` option, static when undeclared
    pub fn linkage(&self) -> Linkage {
        match self.options.get("shared").map(String::as_str) {
            Some("true") => Linkage::Shared,
            _ => Linkage::Static,
        }
    }

    /// Settings restricted to those the recipe declares, as strings
    pub fn declared_settings(&self, recipe: &Recipe) -> BTreeMap<String, String> {
        let all = [
            ("os", self.settings.os.to_string()),
            ("arch", self.settings.arch.to_string()),
            ("build_type", self.settings.build_type.to_string()),
            ("compiler", self.settings.compiler.to_string()),
        ];
        all.into_iter()
            .filter(|(key, _)| recipe.package.settings.iter().any(|s| s == key))
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    /// Identifier of the binary package this profile produces.
    ///
    /// Truncated SHA-256 over the JSON form of name, version, declared
    /// settings and options. Maps are ordered, so the digest is stable.
    pub fn package_id(&self, recipe: &Recipe) -> Result<String> {
        #[derive(Serialize)]
        struct Identity<'a> {
            name: &'a str,
            version: &'a str,
            settings: BTreeMap<String, String>,
            options: &'a BTreeMap<String, String>,
        }

        let identity = Identity {
            name: &recipe.package.name,
            version: &recipe.package.version,
            settings: self.declared_settings(recipe),
            options: &self.options,
        };
        let serialized = serde_json::to_string(&identity).map_err(|e| {
            PackagerError::configuration("failed to serialize package identity").with_source(e)
        })?;

        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        let full = format!("{:x}", hasher.finalize());
        Ok(full[..PACKAGE_ID_LEN].to_string())
    }
}
