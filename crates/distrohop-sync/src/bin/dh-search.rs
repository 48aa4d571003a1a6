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

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use distrohop_index::{Cached, Combined, ReadOnly, Store};
use distrohop_sync::config::{self, Config};

#[derive(Parser, Debug)]
#[command(
    name = "dh-search",
    about = "Find equivalent packages across distributions by tag overlap"
)]
struct Args {
    /// Repository to search in
    #[arg(long = "in")]
    in_repo: String,
    /// Tags to search for directly (kind=value)
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// Repository to take a source package from
    #[arg(long, requires = "pkg")]
    from: Option<String>,
    /// Source package whose tags to search with
    #[arg(long, requires = "from")]
    pkg: Option<String>,
    /// Maximum number of results to print
    #[arg(long, default_value_t = 20)]
    limit: usize,
    /// Path to the configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let cfg = config::load(args.config.as_deref())?;
    let data_root = config::data_dir(&cfg)?;

    let tags = match (&args.from, &args.pkg) {
        (Some(from), Some(pkg)) => {
            let source = open_repo(&cfg, &data_root, from)?;
            let found = source
                .get_pkg(pkg)
                .with_context(|| format!("package {pkg:?} in repository {from:?}"))?;
            found.tags
        }
        _ => {
            if args.tags.is_empty() {
                bail!("nothing to search for: pass --tag, or --from and --pkg");
            }
            args.tags.clone()
        }
    };

    let target = open_repo(&cfg, &data_root, &args.in_repo)?;
    let (results, latency) = target
        .search(&tags)
        .with_context(|| format!("searching repository {:?}", args.in_repo))?;

    if results.is_empty() {
        println!("no matches");
        return Ok(());
    }
    for result in results.iter().take(args.limit) {
        println!(
            "{:>5.1}%  {:30}  {}",
            result.confidence * 100.0,
            result.package.name,
            result.overlap.join(", ")
        );
    }
    println!(
        "{} result(s) in {:?}",
        results.len().min(args.limit),
        latency
    );
    Ok(())
}

/// Opens every shard of the named repository and stacks the combined and
/// cached views over them.
fn open_repo(cfg: &Config, data_root: &std::path::Path, name: &str) -> Result<Arc<dyn ReadOnly>> {
    let repo = cfg
        .repos
        .iter()
        .find(|r| r.name == name)
        .with_context(|| format!("no repository named {name:?} in the configuration"))?;

    let mut combined = Combined::new();
    for sub_repo in &repo.repos {
        for arch in &repo.arch {
            let dir = config::shard_dir(data_root, &repo.name, &repo.version, sub_repo, arch);
            let mut store = Store::open(&dir)
                .with_context(|| format!("opening shard at {}", dir.display()))?;
            store.search_threads = cfg.search_threads;
            combined.add(Arc::new(store));
        }
    }
    if combined.is_empty() {
        bail!("repository {name:?} has no shards");
    }
    Ok(Arc::new(Cached::with_defaults(Arc::new(combined))))
}
