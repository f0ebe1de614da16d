// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::instances::ports::{PortPool, PortRange, allocate_ports};
use crate::instances::{Lifecycle, LifecycleConfig};
use crate::platform::{CtfdClient, Visibility};
use crate::repo::challenges::discovery::discover;
use crate::selection::Selection;
use crate::utils::split_command_line;

mod commands;
mod instances;
mod platform;
mod repo;
mod selection;
mod utils;

/// Builds, tests and publishes a repository of CTF challenges
#[derive(Parser)]
#[command(name = "plfanzen-checker", version)]
struct Cli {
    /// Directory containing the challenge tree
    #[arg(long, env = "CHALLENGE_ROOT", default_value = ".", global = true)]
    root: PathBuf,

    /// Print every configuration defect found during discovery
    #[arg(long, global = true)]
    strict: bool,

    /// Only log warnings and hide the output of deployment scripts
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Interface deployments bind to
    #[arg(long, env = "TARGET_INTERFACE", default_value = "0.0.0.0", global = true)]
    interface: String,

    /// Ports handed out to hosted challenges, as START-END
    #[arg(long, default_value = "4000-4999", global = true)]
    ports: PortRange,

    /// Command the test harness is run with
    #[arg(long, env = "TEST_RUNNER", default_value = "python3", global = true)]
    test_runner: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the challenge tree
    Challenges,
    /// Show all categories
    Categories,
    /// Print the flag of every challenge
    Flags,
    /// List the handout files of every challenge
    Handouts,
    /// Start the selected challenges
    Run {
        /// Comma separated name filters, or * for all challenges
        selection: Selection,
    },
    /// Stop the selected challenges
    Stop { selection: Selection },
    /// Start, test and stop the selected challenges
    Test {
        selection: Selection,
        /// Ask the harness to check that the deployment can be reused
        #[arg(long)]
        force_reusability: bool,
    },
    /// Publish the selected challenges to the scoring platform
    Upload {
        selection: Selection,
        #[command(flatten)]
        target: UploadArgs,
    },
    /// Validate the whole repository
    Check,
}

#[derive(Args)]
struct UploadArgs {
    /// Base URL of the scoring platform
    #[arg(long, env = "PLATFORM_URL")]
    url: String,

    /// API token of the scoring platform
    #[arg(long, env = "PLATFORM_TOKEN", hide_env_values = true)]
    token: String,

    /// Host name players connect to, used in connection hints
    #[arg(long, env = "PUBLIC_HOST")]
    public_host: String,

    /// Make the uploaded challenges visible right away
    #[arg(long)]
    visible: bool,
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let level = if cli.quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to set AWS-LC-RS as default TLS provider"))?;

    let strict = cli.strict || matches!(cli.command, Commands::Check);
    let discovery = discover(&cli.root, strict)
        .with_context(|| format!("Failed to discover challenges in {}", cli.root.display()))?;
    let mut tree = discovery.tree;
    let mut pool = PortPool::new(cli.ports.0);
    allocate_ports(&mut tree, &mut pool).context("Failed to allocate ports")?;

    let lifecycle = |force_reusability: bool| {
        Lifecycle::new(LifecycleConfig {
            interface: cli.interface.clone(),
            quiet: cli.quiet,
            test_runner: split_command_line(&cli.test_runner),
            force_reusability,
        })
    };

    let success = match &cli.command {
        Commands::Challenges => {
            commands::list_challenges(&tree);
            true
        }
        Commands::Categories => {
            commands::list_categories(&tree);
            true
        }
        Commands::Flags => {
            commands::dump_flags(&tree);
            true
        }
        Commands::Handouts => {
            commands::list_handouts(&tree);
            true
        }
        Commands::Run { selection } => {
            commands::run(
                &mut tree,
                &mut pool,
                &lifecycle(false),
                selection,
                &cli.interface,
            )
            .await?;
            true
        }
        Commands::Stop { selection } => {
            commands::stop(&tree, &lifecycle(false), selection).await;
            true
        }
        Commands::Test {
            selection,
            force_reusability,
        } => {
            commands::test(&mut tree, &mut pool, &lifecycle(*force_reusability), selection)
                .await?
        }
        Commands::Upload { selection, target } => {
            let client = CtfdClient::new(&target.url, &target.token)
                .context("Failed to create platform client")?;
            let visibility = if target.visible {
                Visibility::Visible
            } else {
                Visibility::Hidden
            };
            commands::upload(&tree, &client, selection, &target.public_host, visibility).await
        }
        Commands::Check => commands::check(&tree, &discovery.defects),
    };
    Ok(exit_code(success))
}
