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
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use distrohop_index::Store;
use distrohop_sync::config;
use distrohop_sync::{importer_by_name, pull, PullOptions, Pulled};

#[derive(Parser, Debug)]
#[command(
    name = "dh-pull",
    about = "Refresh the local package index shards from their upstream repositories"
)]
struct Args {
    /// Path to the configuration file (defaults to /etc/distrohop.toml,
    /// then $XDG_CONFIG_HOME/distrohop.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Only refresh the repository with this name
    #[arg(long)]
    repo: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = config::load(args.config.as_deref())?;
    let data_root = config::data_dir(&cfg)?;

    let mut selected = 0usize;
    let mut failed = 0usize;
    for repo in &cfg.repos {
        if let Some(only) = &args.repo {
            if &repo.name != only {
                continue;
            }
        }
        selected += 1;

        let importer = importer_by_name(&repo.kind)
            .with_context(|| format!("repository {:?}", repo.name))?;

        for sub_repo in &repo.repos {
            for arch in &repo.arch {
                let dir = config::shard_dir(&data_root, &repo.name, &repo.version, sub_repo, arch);
                let store = Store::open(&dir)
                    .with_context(|| format!("opening shard at {}", dir.display()))?;

                let bar = ProgressBar::new(0).with_style(
                    ProgressStyle::with_template("{msg:20} {bytes}/{total_bytes} {wide_bar}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                let progress_bar = bar.clone();
                let opts = PullOptions {
                    base_url: repo.base_url.clone(),
                    version: repo.version.clone(),
                    repo: sub_repo.clone(),
                    architecture: arch.clone(),
                    progress: Some(Arc::new(move |title: &str, received, total| {
                        if let Some(total) = total {
                            progress_bar.set_length(total);
                        }
                        progress_bar.set_message(title.to_string());
                        progress_bar.set_position(received);
                    })),
                };

                tracing::info!(
                    name = %repo.name,
                    version = %repo.version,
                    repo = %sub_repo,
                    arch = %arch,
                    "pulling repository index"
                );
                let outcome = pull(&opts, &store, importer);
                bar.finish_and_clear();

                match outcome {
                    Ok(Pulled::Updated) => {
                        tracing::info!(name = %repo.name, repo = %sub_repo, arch = %arch, "updated")
                    }
                    Ok(Pulled::UpToDate) => {
                        tracing::info!(name = %repo.name, repo = %sub_repo, arch = %arch, "up to date")
                    }
                    Err(err) => {
                        tracing::warn!(
                            name = %repo.name,
                            repo = %sub_repo,
                            arch = %arch,
                            error = %err,
                            "pull failed"
                        );
                        failed += 1;
                    }
                }
            }
        }
    }

    if selected == 0 {
        bail!("no repositories matched");
    }
    if failed > 0 {
        bail!("{failed} pull(s) failed");
    }
    Ok(())
}
