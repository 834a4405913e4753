//! CLI tests for the packager binary.
//!
//! Stage ordering and argument errors run everywhere. The end-to-end
//! build needs cmake and a C++ compiler and is skipped without them.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use native_packager::utils::ProcessRunner;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn packager(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("packager");
    cmd.current_dir(dir)
        .env_remove("PACKAGER_RECIPE")
        .env_remove("PACKAGER_SOURCE_DIR")
        .env_remove("PACKAGER_WORK_DIR")
        .env_remove("PACKAGER_PROFILE")
        .env_remove("PACKAGER_OUTPUT_DIR");
    cmd
}

/// Spline-shaped source tree with the template recipe
fn spline_project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("include/Applications/MSW")).unwrap();
    fs::create_dir_all(root.join("include_")).unwrap();
    fs::write(
        root.join("src/CMakeLists.txt"),
        "cmake_minimum_required(VERSION 3.10)\n\
         project(Spline CXX)\n\
         add_library(Spline BSplineCurveFitterWindow3.cpp)\n\
         target_include_directories(Spline PUBLIC ${CMAKE_CURRENT_SOURCE_DIR}/../include)\n",
    )
    .unwrap();
    fs::write(
        root.join("src/BSplineCurveFitterWindow3.cpp"),
        "#include \"BSplineCurveFitterWindow3.h\"\nint spline_degree() { return 3; }\n",
    )
    .unwrap();
    fs::write(
        root.join("include/Applications/MSW/WICFileIO.h"),
        "#pragma once\n",
    )
    .unwrap();
    fs::write(
        root.join("include_/BSplineCurveFitterWindow3.h"),
        "#pragma once\nint spline_degree();\n",
    )
    .unwrap();
    packager(root).arg("init").assert().success();
    temp
}

#[test]
fn help_flag_works() {
    let temp = TempDir::new().unwrap();
    packager(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn subcommand_help_works() {
    let temp = TempDir::new().unwrap();
    for cmd in ["init", "export", "build", "package", "info", "create"] {
        packager(temp.path())
            .args([cmd, "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Usage"));
    }
}

#[test]
fn init_writes_recipe_once() {
    let temp = TempDir::new().unwrap();
    packager(temp.path()).arg("init").assert().success();
    let recipe = fs::read_to_string(temp.path().join("packager.toml")).unwrap();
    assert!(recipe.contains("name = \"Spline\""));

    packager(temp.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    packager(temp.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn export_stages_sources_and_headers() {
    let project = spline_project();
    packager(project.path()).arg("export").assert().success();

    let staging = project.path().join(".packager/staging");
    assert!(staging.join("src/CMakeLists.txt").is_file());
    assert!(staging.join("include/BSplineCurveFitterWindow3.h").is_file());
    assert!(staging.join("include/Applications/MSW/WICFileIO.h").is_file());
    assert!(project.path().join(".packager/.packager-state.json").is_file());
}

#[test]
fn export_without_headers_fails() {
    let project = spline_project();
    fs::remove_dir_all(project.path().join("include_")).unwrap();

    packager(project.path())
        .arg("export")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Export stage failed"))
        .stderr(predicate::str::contains("Source not found"));
}

#[test]
fn build_before_export_fails() {
    let project = spline_project();
    packager(project.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Build stage failed"))
        .stderr(predicate::str::contains("Source not found"));
}

#[test]
fn package_before_build_fails() {
    let project = spline_project();
    packager(project.path()).arg("export").assert().success();

    packager(project.path())
        .arg("package")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Packaging error"))
        .stderr(predicate::str::contains("PackagingError"));
    assert!(!project.path().join("packages").exists());
}

#[test]
fn info_before_package_fails() {
    let project = spline_project();
    packager(project.path())
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no package has been published"));
}

#[test]
fn invalid_option_value_is_rejected() {
    let project = spline_project();
    packager(project.path())
        .args(["export", "-o", "shared=maybe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn zero_jobs_is_rejected() {
    let project = spline_project();
    packager(project.path())
        .args(["build", "--jobs", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn missing_recipe_is_reported() {
    let temp = TempDir::new().unwrap();
    packager(temp.path())
        .arg("export")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load recipe"));
}

fn native_tools_available() -> bool {
    let runner = ProcessRunner::new(false);
    cfg!(target_os = "linux") && runner.command_exists("cmake") && runner.command_exists("g++")
}

#[test]
fn create_builds_a_static_package_with_cmake() {
    if !native_tools_available() {
        eprintln!("skipping: cmake or g++ not available");
        return;
    }
    let project = spline_project();

    packager(project.path())
        .args(["create", "-s", "build_type=Release", "-o", "shared=false"])
        .assert()
        .success();

    let store = project.path().join("packages/Spline/0.0.1");
    let packages: Vec<_> = fs::read_dir(&store).unwrap().flatten().collect();
    assert_eq!(packages.len(), 1);
    let root = packages[0].path();
    assert!(root.join("lib/libSpline.a").is_file());
    assert!(root.join("include/BSplineCurveFitterWindow3.h").is_file());
    assert!(root.join("packagerbuildinfo.cmake").is_file());

    packager(project.path())
        .args(["info", "-s", "build_type=Release", "-o", "shared=false"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-lSpline"));

    packager(project.path())
        .args(["info", "-s", "build_type=Release", "-o", "shared=true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("different profile"));
}
