/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

mod config;
mod run;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const BIN_NAME: &str = "sctp-mux-cli";

#[derive(Debug, Parser)]
#[command(name = BIN_NAME)]
#[command(about = "Push messages through sctpenc/sctpdec pairs and report delivery")]
struct Cli {
    /// json5 file with the registry settings and the association pairs to run
    #[arg(short, long, default_value = "DEFAULT_CONFIG.json5")]
    config: PathBuf,

    /// Print the summary as JSON instead of text
    #[arg(long)]
    json: bool,
}

async fn run_cli(cli: &Cli) -> anyhow::Result<bool> {
    let config = config::load(&cli.config)?;
    let summary = run::run(&config).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    Ok(summary.is_complete())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run_cli(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("{BIN_NAME} failed: {err:#}");
            ExitCode::from(2)
        }
    }
}
