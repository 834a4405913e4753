//! Error types for the packager
//!
//! Every pipeline stage reports failures through [`PackagerError`]. The
//! variants mirror the stage that failed so callers can tell a bad profile
//! apart from a broken compiler or an incomplete package.

use std::path::PathBuf;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the packager
#[derive(Error, Debug)]
pub enum PackagerError {
    /// Settings or options are invalid or unsupported by the toolchain
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Expected files are absent from the source tree or staging area
    #[error("Source not found: {message} ({path})")]
    SourceNotFound { message: String, path: PathBuf },

    /// The native toolchain reported a failure while compiling
    #[error("Compilation error: {message}")]
    Compilation {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The package could not be assembled or published
    #[error("Packaging error: {message} ({path})")]
    Packaging { message: String, path: PathBuf },

    /// The recipe file could not be read, parsed or validated
    #[error("Recipe error: {message} ({path})")]
    Recipe {
        message: String,
        path: PathBuf,
        #[source]
        source: Option<BoxedSource>,
    },

    /// File system operation errors
    #[error("File system error: {operation} failed on {path}")]
    FileSystem {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Process execution errors
    #[error("Process error: {command} failed")]
    Process {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl PackagerError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new source-not-found error
    pub fn source_not_found<P: Into<PathBuf>>(message: impl Into<String>, path: P) -> Self {
        Self::SourceNotFound {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Create a new compilation error
    pub fn compilation(message: impl Into<String>) -> Self {
        Self::Compilation {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new packaging error
    pub fn packaging<P: Into<PathBuf>>(message: impl Into<String>, path: P) -> Self {
        Self::Packaging {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Create a new recipe error
    pub fn recipe<P: Into<PathBuf>>(message: impl Into<String>, path: P) -> Self {
        Self::Recipe {
            message: message.into(),
            path: path.into(),
            source: None,
        }
    }

    /// Create a new file system error
    pub fn file_system<P: Into<PathBuf>>(
        operation: impl Into<String>,
        path: P,
        source: std::io::Error,
    ) -> Self {
        Self::FileSystem {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a new process error
    pub fn process(
        command: impl Into<String>,
        exit_code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::Process {
            command: command.into(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Attach an underlying cause to errors that carry one.
    ///
    /// Variants without a `source` slot are returned unchanged.
    #[must_use]
    pub fn with_source(mut self, cause: impl Into<BoxedSource>) -> Self {
        match &mut self {
            Self::Configuration { source, .. }
            | Self::Compilation { source, .. }
            | Self::Recipe { source, .. } => *source = Some(cause.into()),
            _ => {}
        }
        self
    }

    /// Last `lines` lines written by a failed process, stderr first.
    ///
    /// `None` for other variants or when the process printed nothing.
    pub fn output_tail(&self, lines: usize) -> Option<String> {
        let Self::Process { stdout, stderr, .. } = self else {
            return None;
        };
        let text = if stderr.trim().is_empty() { stdout } else { stderr };
        let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if all.is_empty() {
            return None;
        }
        Some(all[all.len().saturating_sub(lines)..].join("\n"))
    }

    /// Short name of the error category, used in CLI diagnostics
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "ConfigurationError",
            Self::SourceNotFound { .. } => "SourceNotFoundError",
            Self::Compilation { .. } => "CompilationError",
            Self::Packaging { .. } => "PackagingError",
            Self::Recipe { .. } => "RecipeError",
            Self::FileSystem { .. } => "FileSystemError",
            Self::Process { .. } => "ProcessError",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PackagerError>;
