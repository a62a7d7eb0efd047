//! # Config Overlays
//!
//! Per-test configuration derived from the suite's shared base config.
//!
//! Concurrent test cases must not see each other's resolved variables, so the
//! base file is never amended in place: [`amend_config`] reads the base,
//! merges the overlay into its mapping, and writes the result to a fresh
//! per-test path derived from the test name.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_yaml::Value;

use crate::error::{Error, Result};

/// Mapping content of a configuration document.
///
/// A `BTreeMap` keeps key order deterministic, so amending the same base with
/// the same overlay always produces byte-identical output.
pub type ConfigValues = BTreeMap<String, Value>;

/// Derive the per-test output path for a base config.
///
/// `/tmp/e2e/config.yaml` + `quick-start` becomes
/// `/tmp/e2e/config-quick-start.yaml`.
pub fn test_config_path(base: &Path, test_name: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("config");
    base.with_file_name(format!("{stem}-{test_name}.yaml"))
}

/// Read and parse a config file into its value mapping.
pub fn read_config(path: &Path) -> Result<ConfigValues> {
    parse_config(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize the mapping and persist it with owner-only permissions.
pub fn write_config(path: &Path, values: &ConfigValues) -> Result<()> {
    persist_config(path, values).map_err(|source| Error::ConfigWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy the base config to `output` with `overlay` merged into its mapping.
///
/// Overlay values win on key collision. The base file is left untouched.
pub fn amend_config(
    base: &Path,
    output: &Path,
    overlay: &BTreeMap<String, String>,
) -> Result<()> {
    let mut values = read_config(base)?;
    for (key, value) in overlay {
        values.insert(key.clone(), Value::String(value.clone()));
    }
    write_config(output, &values)
}

fn parse_config(path: &Path) -> anyhow::Result<ConfigValues> {
    let raw = fs::read_to_string(path).context("reading config file")?;
    serde_yaml::from_str(&raw).context("parsing config file")
}

fn persist_config(path: &Path, values: &ConfigValues) -> anyhow::Result<()> {
    let data = serde_yaml::to_string(values).context("serializing config")?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).context("opening config for writing")?;
    file.write_all(data.as_bytes()).context("writing config")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn overlay(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn amend_merges_overlay_into_base() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path().join("config.yaml");
        fs::write(&base, "A: \"1\"\n").expect("write base");

        let output = test_config_path(&base, "quick-start");
        amend_config(&base, &output, &overlay(&[("B", "2")])).expect("amend");

        let values = read_config(&output).expect("read output");
        assert_eq!(values.get("A"), Some(&Value::String("1".to_string())));
        assert_eq!(values.get("B"), Some(&Value::String("2".to_string())));
    }

    #[test]
    fn overlay_wins_on_key_collision() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path().join("config.yaml");
        fs::write(&base, "A: \"1\"\n").expect("write base");

        let output = test_config_path(&base, "override");
        amend_config(&base, &output, &overlay(&[("A", "9")])).expect("amend");

        let values = read_config(&output).expect("read output");
        assert_eq!(values.get("A"), Some(&Value::String("9".to_string())));
    }

    #[test]
    fn amend_never_mutates_the_base_file() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path().join("config.yaml");
        fs::write(&base, "A: \"1\"\n").expect("write base");
        let before = fs::read(&base).expect("read base");

        let output = test_config_path(&base, "isolated");
        amend_config(&base, &output, &overlay(&[("A", "9"), ("B", "2")])).expect("amend");

        assert_eq!(fs::read(&base).expect("re-read base"), before);
    }

    #[test]
    fn amending_twice_is_byte_identical() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path().join("config.yaml");
        fs::write(&base, "ZULU: \"26\"\nALPHA: \"1\"\n").expect("write base");

        let overlay = overlay(&[("MIKE", "13"), ("ALPHA", "one")]);
        let first = dir.path().join("first.yaml");
        let second = dir.path().join("second.yaml");
        amend_config(&base, &first, &overlay).expect("first amend");
        amend_config(&base, &second, &overlay).expect("second amend");

        assert_eq!(
            fs::read(&first).expect("read first"),
            fs::read(&second).expect("read second")
        );
    }

    #[test]
    fn read_fails_on_missing_file() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("nope.yaml");
        let err = read_config(&missing).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
        assert!(err.to_string().contains("nope.yaml"));
    }

    #[test]
    fn read_fails_on_malformed_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "- not\n- a\n- mapping\n").expect("write");
        assert!(matches!(
            read_config(&path),
            Err(Error::ConfigRead { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn written_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        write_config(&path, &ConfigValues::new()).expect("write");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn output_path_appends_test_name_to_the_stem() {
        assert_eq!(
            test_config_path(Path::new("/tmp/e2e/clusterctl-config.yaml"), "md-rollout"),
            PathBuf::from("/tmp/e2e/clusterctl-config-md-rollout.yaml")
        );
    }
}
