//! Core functionality for native packaging
//!
//! Contains recipe parsing, profile resolution and the export, build and
//! package stages tied together by [`Pipeline`].

pub mod artifacts;
pub mod builder;
pub mod copier;
pub mod exporter;
pub mod generators;
pub mod info;
pub mod pipeline;
pub mod recipe;
pub mod settings;
pub mod toolchain;

pub use artifacts::{PackageArtifact, PackageAssembler};
pub use builder::PackageBuilder;
pub use exporter::SourceExporter;
pub use info::PackageInfo;
pub use pipeline::{Pipeline, PipelineState, Stage};
pub use recipe::{Recipe, RecipeParser};
pub use settings::{Profile, ProfileOverrides};
pub use toolchain::{CMakeToolchain, Toolchain};
