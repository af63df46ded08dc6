//! CLI commands for slackernetes using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::cluster::{ClusterGateway, KubeClient};
use crate::config::{load_settings, Settings};
use crate::core::lease::{Lease, LeaseStatus, PickResult, ReleaseResult};
use crate::core::{default_registry, dispatch, LabelLeaseRepository, LeaseManager, Registry};

/// slackernetes - drive a Kubernetes cluster from Slack.
#[derive(Parser)]
#[command(name = "slackernetes")]
#[command(version)]
#[command(about = "Slack bot for Kubernetes and dev namespace leases", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the Slack bot
    Run,

    /// List the chat commands the bot understands
    Commands,

    /// Show which chat command a message would trigger
    Dispatch {
        /// Message text, without the bot mention
        text: String,
    },

    /// Show who holds a dev environment
    Status {
        /// Part of the namespace name
        fragment: String,
    },

    /// List dev environments and their holders
    ListEnvs,

    /// Lease a dev environment
    Pick {
        /// Part of the namespace name
        fragment: String,

        /// Identity recorded as holder (usually a Slack user ID)
        #[arg(long = "as")]
        user: String,
    },

    /// Release a dev environment
    Release {
        /// Part of the namespace name
        fragment: String,

        /// Identity that holds the lease
        #[arg(long = "as")]
        user: String,
    },
}

impl Commands {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Run => cmd_run().await,
            Command::Commands => cmd_commands(),
            Command::Dispatch { text } => cmd_dispatch(text),
            Command::Status { fragment } => cmd_status(fragment).await,
            Command::ListEnvs => cmd_list_envs().await,
            Command::Pick { fragment, user } => cmd_pick(fragment, user).await,
            Command::Release { fragment, user } => cmd_release(fragment, user).await,
        }
    }
}

fn lease_manager(settings: &Settings) -> Result<LeaseManager> {
    let gateway: Arc<dyn ClusterGateway> =
        Arc::new(KubeClient::new(&settings.cluster.endpoint()?)?);
    Ok(LeaseManager::new(LabelLeaseRepository::new(
        gateway,
        &settings.lease,
    )))
}

fn describe_dispatch(registry: &Registry, text: &str) -> String {
    let outcome = dispatch(registry, text);
    match outcome.matched_pattern {
        Some(pattern) => format!(
            "{} (pattern: {}, captures: {:?})",
            outcome.handler.name(),
            pattern,
            outcome.captures
        ),
        None => format!("{} (no pattern matched)", outcome.handler.name()),
    }
}

async fn cmd_run() -> Result<()> {
    let settings = load_settings()?;
    crate::slack::run_slack_bot(settings).await?;
    Ok(())
}

fn cmd_commands() -> Result<()> {
    let registry = default_registry()?;
    for line in registry.help_lines() {
        println!("{}", line);
    }
    Ok(())
}

fn cmd_dispatch(text: &str) -> Result<()> {
    let registry = default_registry()?;
    println!("{}", describe_dispatch(&registry, text));
    Ok(())
}

async fn cmd_status(fragment: &str) -> Result<()> {
    let leases = lease_manager(&load_settings()?)?;
    match leases.status(fragment).await? {
        LeaseStatus::NotFound => println!("No dev environment matches '{}'", fragment),
        LeaseStatus::Free { namespace } => println!("{}: free", namespace),
        LeaseStatus::HeldBy { namespace, holder } => {
            println!("{}: held by {}", namespace, holder)
        }
    }
    Ok(())
}

async fn cmd_list_envs() -> Result<()> {
    let leases = lease_manager(&load_settings()?)?;
    for (namespace, lease) in leases.list().await? {
        match lease {
            Lease::Free => println!("{}\tfree", namespace),
            Lease::HeldBy(holder) => println!("{}\t{}", namespace, holder),
        }
    }
    Ok(())
}

async fn cmd_pick(fragment: &str, user: &str) -> Result<()> {
    let leases = lease_manager(&load_settings()?)?;
    match leases.pick(fragment, user).await? {
        PickResult::NotFound => println!("No dev environment matches '{}'", fragment),
        PickResult::AlreadyHeld { namespace, holder } => {
            println!("{} is already held by {}", namespace, holder)
        }
        PickResult::Assigned { namespace, holder } => {
            println!("{} assigned to {}", namespace, holder)
        }
    }
    Ok(())
}

async fn cmd_release(fragment: &str, user: &str) -> Result<()> {
    let leases = lease_manager(&load_settings()?)?;
    match leases.release(fragment, user).await? {
        ReleaseResult::NotFound => println!("No dev environment matches '{}'", fragment),
        ReleaseResult::AlreadyFree { namespace } => println!("{} is already free", namespace),
        ReleaseResult::HeldByOther { namespace, holder } => {
            println!("{} is held by {}, not {}", namespace, holder, user)
        }
        ReleaseResult::Released { namespace } => println!("{} released", namespace),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pick_with_identity() {
        let args =
            Commands::try_parse_from(["slackernetes", "pick", "dev-1", "--as", "U999"]).unwrap();
        match args.command {
            Command::Pick { fragment, user } => {
                assert_eq!(fragment, "dev-1");
                assert_eq!(user, "U999");
            }
            _ => panic!("expected pick"),
        }
    }

    #[test]
    fn pick_requires_identity() {
        assert!(Commands::try_parse_from(["slackernetes", "pick", "dev-1"]).is_err());
    }

    #[test]
    fn describe_dispatch_reports_pattern_and_captures() {
        let registry = default_registry().unwrap();
        assert_eq!(
            describe_dispatch(&registry, "release dev-2"),
            r#"release_dev_env (pattern: release (\S+)$, captures: ["dev-2"])"#
        );
        assert_eq!(
            describe_dispatch(&registry, "hello there"),
            "unsupported_command (no pattern matched)"
        );
    }
}
