//! Native toolchain invocation
//!
//! The build stage talks to the compiler through the [`Toolchain`] trait.
//! [`CMakeToolchain`] drives a CMake project; tests substitute their own
//! implementation.

use crate::{
    core::settings::{Arch, Linkage, Os, Profile},
    error::{PackagerError, Result},
    utils::process::ProcessRunner,
};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Everything a toolchain needs for one build
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    /// Staged sources holding the native build descriptor
    pub source_dir: &'a Path,
    /// Out-of-tree build directory
    pub build_dir: &'a Path,
    pub profile: &'a Profile,
    /// Parallel compile jobs, toolchain default when `None`
    pub jobs: Option<usize>,
}

/// A native build system able to configure and compile staged sources
pub trait Toolchain {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Prepare the build directory.
    ///
    /// Fails with [`PackagerError::Configuration`] when the profile is not
    /// supported or the native configure step rejects it.
    fn configure(&self, request: &BuildRequest<'_>) -> Result<()>;

    /// Compile the configured project.
    ///
    /// Fails with [`PackagerError::Compilation`] when the compiler reports
    /// errors.
    fn compile(&self, request: &BuildRequest<'_>) -> Result<()>;
}

/// Lines of tool output carried into configure and compile errors
const TOOL_OUTPUT_LINES: usize = 20;

/// CMake driven build using gcc or clang
#[derive(Debug)]
pub struct CMakeToolchain {
    cmake: String,
    process_runner: ProcessRunner,
}

impl CMakeToolchain {
    /// Create a toolchain that runs `cmake` from `PATH`
    #[must_use]
    pub fn new(debug: bool) -> Self {
        Self {
            cmake: "cmake".to_string(),
            process_runner: ProcessRunner::new(debug),
        }
    }

    /// Use a specific cmake executable
    #[must_use]
    pub fn with_cmake(mut self, cmake: impl Into<String>) -> Self {
        self.cmake = cmake.into();
        self
    }

    /// Reject profiles this host cannot build
    fn check_host(&self, profile: &Profile) -> Result<()> {
        let settings = &profile.settings;
        if Os::current() != Some(settings.os) {
            return Err(PackagerError::configuration(format!(
                "cannot build for os '{}' on a {} host; cross-building is not supported",
                settings.os,
                std::env::consts::OS
            )));
        }
        if Arch::current() != Some(settings.arch) {
            return Err(PackagerError::configuration(format!(
                "cannot build for arch '{}' on a {} host; cross-building is not supported",
                settings.arch,
                std::env::consts::ARCH
            )));
        }

        for tool in [
            self.cmake.as_str(),
            settings.compiler.c_compiler(),
            settings.compiler.cxx_compiler(),
        ] {
            if !self.process_runner.command_exists(tool) {
                return Err(PackagerError::configuration(format!(
                    "required tool '{tool}' was not found on PATH"
                )));
            }
        }
        Ok(())
    }

    /// Arguments for `cmake -S … -B …`
    pub fn configure_args(request: &BuildRequest<'_>) -> Vec<String> {
        let settings = &request.profile.settings;
        let shared = match request.profile.linkage() {
            Linkage::Shared => "ON",
            Linkage::Static => "OFF",
        };
        vec![
            "-S".to_string(),
            request.source_dir.to_string_lossy().to_string(),
            "-B".to_string(),
            request.build_dir.to_string_lossy().to_string(),
            format!("-DCMAKE_BUILD_TYPE={}", settings.build_type),
            format!("-DBUILD_SHARED_LIBS={shared}"),
            format!("-DCMAKE_C_COMPILER={}", settings.compiler.c_compiler()),
            format!("-DCMAKE_CXX_COMPILER={}", settings.compiler.cxx_compiler()),
            "-DCMAKE_POSITION_INDEPENDENT_CODE=ON".to_string(),
        ]
    }

    /// Arguments for `cmake --build …`
    pub fn build_args(request: &BuildRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "--build".to_string(),
            request.build_dir.to_string_lossy().to_string(),
            "--config".to_string(),
            request.profile.settings.build_type.to_string(),
        ];
        if let Some(jobs) = request.jobs {
            args.push("--parallel".to_string());
            args.push(jobs.to_string());
        }
        args
    }
}

impl Toolchain for CMakeToolchain {
    fn name(&self) -> &str {
        "cmake"
    }

    #[instrument(skip(self, request))]
    fn configure(&self, request: &BuildRequest<'_>) -> Result<()> {
        self.check_host(request.profile)?;

        let args = Self::configure_args(request);
        let args_str: Vec<&str> = args.iter().map(String::as_str).collect();
        info!("Configuring native build in {}", request.build_dir.display());

        self.process_runner
            .run(&self.cmake, &args_str)
            .map_err(|e| {
                PackagerError::configuration(with_tool_output(
                    "native build configuration was rejected",
                    &e,
                ))
                .with_source(e)
            })?;
        Ok(())
    }

    #[instrument(skip(self, request))]
    fn compile(&self, request: &BuildRequest<'_>) -> Result<()> {
        let args = Self::build_args(request);
        let args_str: Vec<&str> = args.iter().map(String::as_str).collect();
        info!("Compiling {}", request.source_dir.display());

        let output = self
            .process_runner
            .run(&self.cmake, &args_str)
            .map_err(|e| {
                PackagerError::compilation(with_tool_output("native compiler reported errors", &e))
                    .with_source(e)
            })?;
        debug!("cmake --build wrote {} bytes", output.stdout.len());
        Ok(())
    }
}

/// Append the tail of a failed tool's output to `message`
fn with_tool_output(message: &str, err: &PackagerError) -> String {
    match err.output_tail(TOOL_OUTPUT_LINES) {
        Some(tail) => format!("{message}:\n{tail}"),
        None => message.to_string(),
    }
}
