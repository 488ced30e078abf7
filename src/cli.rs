// This file is a part of Audit-Inspector
// Copyright (C) 2024 Kiersten Gross

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{
    env::current_dir,
    fs,
    path::{Path, PathBuf},
};
use anyhow::{Result, Context, anyhow};
use dirs::home_dir;
use serde_yaml::Value;
use tracing::{debug, info};

fn expand_home(path: &str) -> Result<PathBuf> {
    // Allow ~ to be an alias for HOME.
    if path.starts_with('~') {
        match home_dir() {
            Some(v) => {
                let home = path.replacen("~", v.to_str().with_context(|| "Could not convert the home directory into a string slice.")?, 1);
                Ok(PathBuf::from(home))
            }
            None => Err(anyhow!("The HOME environment variable could not be found.")),
        }
    } else {
        Ok(PathBuf::from(path))
    }
}

pub fn parse_input_path(path: &str) -> Result<PathBuf> {
    let provided_path = expand_home(path)?;
    if provided_path.exists() {
        Ok(provided_path)
    } else {
        Err(anyhow!("The path {} could not be found.", provided_path.display()))
    }
}

/// Output files are never overwritten. `pwd` or `cwd` stand for
/// `default_name` in the current working directory.
pub fn parse_output_path(path: &str, default_name: &str) -> Result<PathBuf> {
    // Allow pwd or cwd to be an alias for the current working directory
    let output_path = if (path.to_lowercase() == "pwd") || (path.to_lowercase() == "cwd") {
        current_dir()?.join(default_name)
    } else {
        expand_home(path)?
    };
    if output_path.exists() {
        Err(anyhow!("The output file {} already exists.", output_path.display()))
    } else {
        Ok(output_path)
    }
}

/// Finds the bundle directory when none was given: `checks/` next to the
/// executable first, then `checks/` in the current directory.
pub fn find_checks_dir() -> Result<PathBuf> {
    let current_checks_path = current_dir()?.join("checks");
    let exe_buf = std::env::current_exe()?;
    let exe_parent_buf = exe_buf.parent().ok_or(anyhow!("No parent directory could be determined for the current executable path."))?;
    let exe_checks_path = exe_parent_buf.join("checks");

    debug!("Checks search: executable directory {} exists: {}, current directory {} exists: {}", exe_checks_path.display(), exe_checks_path.exists(), current_checks_path.display(), current_checks_path.exists());

    if exe_checks_path.exists() {
        Ok(exe_checks_path)
    } else if current_checks_path.exists() {
        Ok(current_checks_path)
    } else {
        Err(anyhow!("The checks directory could not be found."))
    }
}

/// Loads a bundle file, or every `*.yaml`/`*.yml` bundle of a directory in
/// file name order, as one list of rules.
pub fn load_checks(path: &Path) -> Result<Vec<Value>> {
    if !path.is_dir() {
        return load_bundle(path);
    }

    let mut bundle_paths: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(path)? {
        let bundle_path = entry?.path();
        let is_yaml = bundle_path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false);
        if is_yaml {
            bundle_paths.push(bundle_path);
        }
    }
    bundle_paths.sort();

    let mut checks = Vec::new();
    for bundle_path in bundle_paths {
        checks.extend(load_bundle(&bundle_path)?);
    }
    Ok(checks)
}

fn load_bundle(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path).with_context(|| format!("Could not read the check bundle {}.", path.display()))?;
    let document: Value = serde_yaml::from_str(&content).with_context(|| format!("Could not parse the check bundle {}.", path.display()))?;

    match document {
        Value::Sequence(checks) => {
            info!("Loaded {} checks from {}", checks.len(), path.display());
            Ok(checks)
        }
        Value::Null => Ok(Vec::new()),
        _ => Err(anyhow!("The check bundle {} must contain a list of checks.", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fgt-insight-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_load_checks_directory() {
        let dir = gen_dir("bundles");
        fs::write(dir.join("b.yml"), "- {type: exist, scope: global, path: /system/global, checks: {hostname: true}}\n").unwrap();
        fs::write(dir.join("a.yaml"), "- {name: first, type: value, scope: global, path: /system/global, checks: {hostname: x}}\n- {name: second, type: value, scope: vdom, path: /system/settings, checks: {opmode: nat}}\n").unwrap();
        fs::write(dir.join("notes.txt"), "not a bundle").unwrap();
        fs::write(dir.join("empty.yaml"), "").unwrap();

        let checks = load_checks(&dir).unwrap();
        assert_eq!(checks.len(), 3);
        assert_eq!(checks[0]["name"], Value::from("first"));
        assert_eq!(checks[2]["type"], Value::from("exist"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_checks_rejects_mapping() {
        let dir = gen_dir("mapping");
        let bundle = dir.join("bad.yaml");
        fs::write(&bundle, "type: value\n").unwrap();

        assert!(load_checks(&bundle).is_err());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_output_path_must_not_exist() {
        let dir = gen_dir("output");
        let existing = dir.join("results.txt");
        fs::write(&existing, "").unwrap();

        assert!(parse_output_path(existing.to_str().unwrap(), "results.txt").is_err());
        assert!(parse_output_path(dir.join("new.txt").to_str().unwrap(), "results.txt").is_ok());
        assert!(parse_input_path(dir.join("missing.conf").to_str().unwrap()).is_err());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_output_path_cwd_alias() {
        let cwd = current_dir().unwrap();
        let name = format!("fgt-insight-alias-{}.txt", std::process::id());

        assert_eq!(parse_output_path("pwd", &name).unwrap(), cwd.join(&name));
        assert_eq!(parse_output_path("CWD", &name).unwrap(), cwd.join(&name));
        assert_ne!(parse_output_path("pwd", &name).unwrap(), PathBuf::from("pwd"));
    }
}
