//! slackernetes library root.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod slack;

pub use cli::Commands;
pub use cluster::{ClusterGateway, KubeClient, Namespace, Pod};
pub use config::{load_settings, Settings};
pub use crate::core::{dispatch, LeaseManager, Registry};
pub use error::{Error, Result};
pub use slack::run_slack_bot;
