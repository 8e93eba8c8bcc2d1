// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for the promptfs mount tool.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for the promptfs mount tool.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use promptfs::config::{self, GatewayConfig};
use promptfs::driver::PromptFs;
use promptfs::gateway::HttpGateway;
use promptfs::mount;

#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "Completion-service session filesystem")]
struct Cli {
    /// Directory to mount the session filesystem on.
    #[arg(value_name = "DIR")]
    mountpoint: PathBuf,

    /// Path to a TOML gateway config.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the chat-completions endpoint URL.
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Override the model identifier.
    #[arg(long, value_name = "NAME")]
    model: Option<String>,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    if !cli.mountpoint.is_dir() {
        return Err(anyhow!("{} is not a directory", cli.mountpoint.display()));
    }
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }
    let gateway = HttpGateway::from_config(&config);
    if !gateway.has_credential() {
        warn!(
            "{} is not set; completion calls will fail until it is exported",
            config.key_env
        );
    }
    info!(
        "mounting promptfs at {} (model {})",
        cli.mountpoint.display(),
        config.model
    );
    mount::mount(PromptFs::new(gateway), &cli.mountpoint)
}

fn init_logging() {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}
