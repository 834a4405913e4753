//! Consumer build files rendered from [`PackageInfo`]

use crate::core::{info::PackageInfo, recipe::Generator};

/// File written by the `cmake` generator
pub const BUILD_INFO_CMAKE: &str = "packagerbuildinfo.cmake";

/// File written by the `env` generator
pub const ENV_FILE: &str = "package.env";

const LIST_DIR: &str = "${CMAKE_CURRENT_LIST_DIR}";

/// Name of the file a generator writes into the package root
pub fn file_name(generator: Generator, info: &PackageInfo) -> String {
    match generator {
        Generator::Cmake => BUILD_INFO_CMAKE.to_string(),
        Generator::CmakeFindPackage => format!("Find{}.cmake", info.name),
        Generator::Env => ENV_FILE.to_string(),
    }
}

/// Render the contents of a generator file
pub fn render(generator: Generator, info: &PackageInfo) -> String {
    match generator {
        Generator::Cmake => render_cmake(info),
        Generator::CmakeFindPackage => render_find_package(info),
        Generator::Env => render_env(info),
    }
}

/// Upper-case identifier usable in CMake variable names
fn variable_prefix(name: &str) -> String {
    let ident: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("PACKAGER_{ident}")
}

fn quoted_dirs(dirs: &[String]) -> String {
    dirs.iter()
        .map(|dir| format!("\"{LIST_DIR}/{dir}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_cmake(info: &PackageInfo) -> String {
    let prefix = variable_prefix(&info.name);
    let mut out = format!(
        "# {} package {}\n\n",
        info.reference(),
        info.package_id
    );
    let lines = [
        ("ROOT", format!("\"{LIST_DIR}\"")),
        ("INCLUDE_DIRS", quoted_dirs(&info.include_dirs)),
        ("LIB_DIRS", quoted_dirs(&info.lib_dirs)),
        ("BIN_DIRS", quoted_dirs(&info.bin_dirs)),
        ("LIBS", info.libs.join(" ")),
        ("SYSTEM_LIBS", info.system_libs.join(" ")),
        ("DEFINITIONS", info.defines.join(" ")),
    ];
    for (suffix, value) in lines {
        out.push_str(&format!("set({prefix}_{suffix} {value})\n"));
    }
    out.push_str(&format!(
        "\nlist(APPEND PACKAGER_INCLUDE_DIRS ${{{prefix}_INCLUDE_DIRS}})\n\
         list(APPEND PACKAGER_LIB_DIRS ${{{prefix}_LIB_DIRS}})\n\
         list(APPEND PACKAGER_LIBS ${{{prefix}_LIBS}} ${{{prefix}_SYSTEM_LIBS}})\n"
    ));
    out
}

fn render_find_package(info: &PackageInfo) -> String {
    let name = &info.name;
    let libraries: Vec<String> = info
        .files
        .iter()
        .filter(|f| f.is_linkable())
        .map(|f| format!("\"{LIST_DIR}/{}\"", f.path))
        .chain(info.system_libs.iter().cloned())
        .collect();

    let mut out = format!("# Find module for {} ({})\n\n", info.reference(), info.linkage);
    out.push_str(&format!(
        "set({name}_INCLUDE_DIRS {})\n",
        quoted_dirs(&info.include_dirs)
    ));
    out.push_str(&format!("set({name}_LIBRARIES {})\n", libraries.join(" ")));
    out.push_str(&format!(
        "set({name}_DEFINITIONS {})\n",
        info.defines.join(" ")
    ));
    out.push_str(&format!("set({name}_VERSION \"{}\")\n", info.version));
    out.push_str(&format!("set({name}_FOUND TRUE)\n\n"));
    out.push_str(&format!(
        "if(NOT TARGET {name}::{name})\n\
         \x20   add_library({name}::{name} INTERFACE IMPORTED)\n\
         \x20   set_target_properties({name}::{name} PROPERTIES\n\
         \x20       INTERFACE_INCLUDE_DIRECTORIES \"${{{name}_INCLUDE_DIRS}}\"\n\
         \x20       INTERFACE_LINK_LIBRARIES \"${{{name}_LIBRARIES}}\"\n\
         \x20       INTERFACE_COMPILE_DEFINITIONS \"${{{name}_DEFINITIONS}}\")\n\
         endif()\n"
    ));
    out
}

fn render_env(info: &PackageInfo) -> String {
    let mut out = String::new();
    out.push_str(&format!("PACKAGE_NAME={}\n", info.name));
    out.push_str(&format!("VERSION={}\n", info.version));
    out.push_str(&format!("PACKAGE_ID={}\n", info.package_id));
    out.push_str(&format!("LINKAGE={}\n", info.linkage));
    out.push_str(&format!("LIBS=\"{}\"\n", info.libs.join(" ")));
    out.push_str(&format!("SYSTEM_LIBS=\"{}\"\n", info.system_libs.join(" ")));
    out.push_str(&format!("INCLUDE_DIRS=\"{}\"\n", info.include_dirs.join(" ")));
    out.push_str(&format!("LIB_DIRS=\"{}\"\n", info.lib_dirs.join(" ")));
    out.push_str(&format!("BUILD_DATE={}\n", info.created_at.to_rfc3339()));
    out
}
