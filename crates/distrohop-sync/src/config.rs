// Copyright 2025 DistroHop Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Repository configuration: defaults <- TOML file <- environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SyncError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker threads per shard search.
    pub search_threads: usize,
    /// Root directory for shard databases. Defaults to the XDG data dir.
    pub data_dir: Option<PathBuf>,
    #[serde(rename = "repo")]
    pub repos: Vec<RepoConfig>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            search_threads: 4,
            data_dir: None,
            repos: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Display name; also the first path component of the repo's shards.
    pub name: String,
    /// Importer type: `apt`, `dnf`, `zypper` or `pacman`.
    #[serde(rename = "type")]
    pub kind: String,
    pub base_url: String,
    pub version: String,
    /// Sub-repositories (e.g. `main`, `contrib`); empty means one unnamed
    /// sub-repository.
    pub repos: Vec<String>,
    /// Architectures; empty means one unnamed architecture.
    pub arch: Vec<String>,
    /// Crontab expression consumed by an external scheduler; carried here
    /// as plain data.
    pub refresh_schedule: String,
}

/// Loads the configuration. An explicit path wins; otherwise the first of
/// `/etc/distrohop.toml` and `$XDG_CONFIG_HOME/distrohop.toml` that
/// exists is used, and with no file at all the defaults apply.
pub fn load(path: Option<&Path>) -> Result<Config, SyncError> {
    let mut cfg = match config_file(path) {
        Some(file) => {
            let raw = fs::read_to_string(&file)?;
            toml::from_str(&raw)
                .map_err(|err| SyncError::Config(format!("{}: {err}", file.display())))?
        }
        None => Config::default(),
    };

    if let Ok(threads) = env::var("DISTROHOP_SEARCH_THREADS") {
        cfg.search_threads = threads
            .parse()
            .map_err(|_| SyncError::Config(format!("bad DISTROHOP_SEARCH_THREADS: {threads:?}")))?;
    }
    if let Ok(dir) = env::var("DISTROHOP_DATA_DIR") {
        cfg.data_dir = Some(PathBuf::from(dir));
    }

    for repo in &mut cfg.repos {
        if repo.repos.is_empty() {
            repo.repos = vec![String::new()];
        }
        if repo.arch.is_empty() {
            repo.arch = vec![String::new()];
        }
        if repo.refresh_schedule.is_empty() {
            repo.refresh_schedule = "0 0 * * *".to_owned();
        }
    }

    Ok(cfg)
}

fn config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let mut candidates = vec![PathBuf::from("/etc/distrohop.toml")];
    if let Some(config_home) = env::var_os("XDG_CONFIG_HOME") {
        candidates.push(PathBuf::from(config_home).join("distrohop.toml"));
    } else if let Some(home) = env::var_os("HOME") {
        candidates.push(PathBuf::from(home).join(".config/distrohop.toml"));
    }
    candidates.into_iter().find(|p| p.exists())
}

/// Root directory for shard databases: configured value, or
/// `$XDG_DATA_HOME/distrohop`, or `~/.local/share/distrohop`.
pub fn data_dir(cfg: &Config) -> Result<PathBuf, SyncError> {
    if let Some(dir) = &cfg.data_dir {
        return Ok(dir.clone());
    }
    if let Some(data_home) = env::var_os("XDG_DATA_HOME") {
        return Ok(PathBuf::from(data_home).join("distrohop"));
    }
    match env::var_os("HOME") {
        Some(home) => Ok(PathBuf::from(home).join(".local/share/distrohop")),
        None => Err(SyncError::Config(
            "cannot determine data directory: set data_dir or HOME".to_owned(),
        )),
    }
}

/// Directory of the shard backing one `(repo, version, sub-repo, arch)`
/// coordinate. Empty segments (unnamed sub-repo or architecture) are
/// skipped.
pub fn shard_dir(
    data_root: &Path,
    name: &str,
    version: &str,
    sub_repo: &str,
    arch: &str,
) -> PathBuf {
    let mut dir = data_root.to_path_buf();
    for segment in [name, version, sub_repo, arch] {
        if !segment.is_empty() {
            dir.push(segment);
        }
    }
    dir.join("db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
search_threads = 8

[[repo]]
name = "debian"
type = "apt"
base_url = "https://deb.debian.org/debian"
version = "trixie"
repos = ["main", "contrib"]
arch = ["amd64"]
refresh_schedule = "0 3 * * *"

[[repo]]
name = "arch"
type = "pacman"
base_url = "https://geo.mirror.pkgbuild.com/$repo/os/$arch"
version = ""
repos = ["core", "extra"]
arch = ["x86_64"]
"#;

    #[test]
    fn parses_sample_and_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let cfg = load(Some(file.path())).unwrap();
        assert_eq!(cfg.search_threads, 8);
        assert_eq!(cfg.repos.len(), 2);

        let debian = &cfg.repos[0];
        assert_eq!(debian.kind, "apt");
        assert_eq!(debian.refresh_schedule, "0 3 * * *");

        let arch = &cfg.repos[1];
        assert_eq!(arch.repos, vec!["core", "extra"]);
        // Unset schedule gets the nightly default.
        assert_eq!(arch.refresh_schedule, "0 0 * * *");
    }

    #[test]
    fn empty_repo_and_arch_lists_become_single_unnamed_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"[[repo]]\nname = \"x\"\ntype = \"dnf\"\nbase_url = \"http://mirror\"\nversion = \"41\"\n",
        )
        .unwrap();

        let cfg = load(Some(file.path())).unwrap();
        assert_eq!(cfg.repos[0].repos, vec![""]);
        assert_eq!(cfg.repos[0].arch, vec![""]);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"search_threads = \"many\"").unwrap();
        assert!(matches!(
            load(Some(file.path())),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn shard_dir_skips_empty_segments() {
        let dir = shard_dir(Path::new("/data"), "arch", "", "core", "x86_64");
        assert_eq!(dir, PathBuf::from("/data/arch/core/x86_64/db"));
    }
}
