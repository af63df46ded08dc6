//! Built-in chat commands.

use async_trait::async_trait;
use std::sync::Arc;

use super::format::Reply;
use super::lease::{Lease, LeaseStatus, PickResult, ReleaseResult};
use super::registry::{Context, Handler, Registry};
use crate::cluster::find_pod;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Help,
    ListImages,
    ListEnvs,
    Pick,
    Release,
    ListPodsIn,
    ListPods,
    PodLogs { previous: bool },
    ListNamespaces,
    DescribePod,
    EnvStatus,
}

/// The bot's command table, in dispatch order.
pub const BUILTINS: &[(&str, Builtin, &str)] = &[
    (r"(help|(list|get) commands?)", Builtin::Help, "List all available commands"),
    (
        r"(?:get|list) images in namespace (\S+)",
        Builtin::ListImages,
        "List images used in a namespace",
    ),
    (r"list-envs", Builtin::ListEnvs, "List dev environments and who is using them"),
    (r"pick (\S+)$", Builtin::Pick, "Pick a specific environment"),
    (r"release (\S+)$", Builtin::Release, "Release an environment you picked"),
    (
        r"(?:get|list) pods? in namespace (\S+)$",
        Builtin::ListPodsIn,
        "List all the Pods in a namespace",
    ),
    (r"(?:get|list) pods?$", Builtin::ListPods, "List all the Pods in a cluster"),
    (
        r"(?:get|list) logs? for pod (\S+)$",
        Builtin::PodLogs { previous: false },
        "Get logs for a given pod",
    ),
    (
        r"(?:get|list) previous logs? for pod (\S+)$",
        Builtin::PodLogs { previous: true },
        "Get logs for a previous instance of a given pod",
    ),
    (r"(get|list) namespaces$", Builtin::ListNamespaces, "List all namespaces in a cluster"),
    (
        r"describe pod (.+)",
        Builtin::DescribePod,
        "Get details about a pod include env vars and other useful info",
    ),
    (r"env status (\S+)$", Builtin::EnvStatus, "Show who is using an environment"),
];

pub fn default_registry() -> Result<Registry> {
    let mut registry = Registry::new();
    for (pattern, builtin, description) in BUILTINS {
        registry.register(pattern, Arc::new(*builtin), *description)?;
    }
    Ok(registry)
}

fn mention(user: &str) -> String {
    format!("<@{}>", user)
}

fn listing(header: String, lines: impl IntoIterator<Item = String>) -> Reply {
    let lines: Vec<String> = lines.into_iter().collect();
    Reply::Text(format!("{}\n{}", header, lines.join("\n")))
}

fn pod_not_found(fragment: &str) -> Reply {
    Reply::Text(format!(
        "Could not find pod named {}. Did you type it correctly?",
        fragment
    ))
}

/// Capture `i`, or empty when the pattern had fewer groups.
fn capture(captures: &[String], i: usize) -> &str {
    captures.get(i).map(String::as_str).unwrap_or_default()
}

#[async_trait]
impl Handler for Builtin {
    fn name(&self) -> &str {
        match self {
            Builtin::Help => "show_help",
            Builtin::ListImages => "list_images",
            Builtin::ListEnvs => "list_dev_env",
            Builtin::Pick => "pick_dev_env",
            Builtin::Release => "release_dev_env",
            Builtin::ListPodsIn => "list_pods",
            Builtin::ListPods => "list_all_pods",
            Builtin::PodLogs { previous: false } => "pod_logs",
            Builtin::PodLogs { previous: true } => "previous_pod_logs",
            Builtin::ListNamespaces => "list_namespaces",
            Builtin::DescribePod => "describe_pod",
            Builtin::EnvStatus => "dev_env_status",
        }
    }

    async fn handle(&self, ctx: &Context<'_>, captures: &[String]) -> Result<Reply> {
        match *self {
            Builtin::Help => Ok(listing(
                "Here are all the supported commands:".to_string(),
                ctx.registry.help_lines(),
            )),
            Builtin::ListImages => list_images(ctx, capture(captures, 0)).await,
            Builtin::ListEnvs => list_envs(ctx).await,
            Builtin::Pick => pick(ctx, capture(captures, 0)).await,
            Builtin::Release => release(ctx, capture(captures, 0)).await,
            Builtin::ListPodsIn => list_pods(ctx, Some(capture(captures, 0))).await,
            Builtin::ListPods => list_pods(ctx, None).await,
            Builtin::PodLogs { previous } => pod_logs(ctx, capture(captures, 0), previous).await,
            Builtin::ListNamespaces => list_namespaces(ctx).await,
            Builtin::DescribePod => describe_pod(ctx, capture(captures, 0)).await,
            Builtin::EnvStatus => env_status(ctx, capture(captures, 0)).await,
        }
    }
}

async fn list_images(ctx: &Context<'_>, namespace: &str) -> Result<Reply> {
    let pods = ctx.gateway.list_pods(Some(namespace)).await?;
    Ok(listing(
        format!("Here are all the images in `{}` I can find:", namespace),
        pods.into_iter().flat_map(|p| p.images),
    ))
}

async fn list_envs(ctx: &Context<'_>) -> Result<Reply> {
    let envs = ctx.leases.list().await?;
    Ok(listing(
        format!("Hey {}, here are the dev environments:", mention(ctx.requester)),
        envs.into_iter().map(|(name, lease)| match lease {
            Lease::HeldBy(holder) => format!("`{}` is used by {}", name, mention(&holder)),
            Lease::Free => format!("`{}` is free :owl:", name),
        }),
    ))
}

async fn pick(ctx: &Context<'_>, fragment: &str) -> Result<Reply> {
    let me = mention(ctx.requester);
    let text = match ctx.leases.pick(fragment, ctx.requester).await? {
        PickResult::NotFound => {
            format!("Hey {}, I could not find environment `{}`.", me, fragment)
        }
        PickResult::AlreadyHeld { namespace, holder } => format!(
            "Hey {}, environment `{}` is used by {}.",
            me,
            namespace,
            mention(&holder)
        ),
        PickResult::Assigned { namespace, holder } => format!(
            "Hey <!here>, environment `{}` is now assigned to {}.",
            namespace,
            mention(&holder)
        ),
    };
    Ok(Reply::Text(text))
}

async fn release(ctx: &Context<'_>, fragment: &str) -> Result<Reply> {
    let me = mention(ctx.requester);
    let text = match ctx.leases.release(fragment, ctx.requester).await? {
        ReleaseResult::NotFound => {
            format!("Hey {}, I could not find environment `{}`.", me, fragment)
        }
        ReleaseResult::AlreadyFree { namespace } => {
            format!("Hey {}, environment `{}` is already free.", me, namespace)
        }
        ReleaseResult::HeldByOther { namespace, holder } => format!(
            "Hey {}, environment `{}` is used by {}.",
            me,
            namespace,
            mention(&holder)
        ),
        ReleaseResult::Released { namespace } => format!(
            "Hey <!here>, environment `{}` is free again. Thanks {}, see you next time.",
            namespace, me
        ),
    };
    Ok(Reply::Text(text))
}

async fn env_status(ctx: &Context<'_>, fragment: &str) -> Result<Reply> {
    let text = match ctx.leases.status(fragment).await? {
        LeaseStatus::NotFound => format!("I could not find environment `{}`.", fragment),
        LeaseStatus::Free { namespace } => format!("`{}` is free :owl:", namespace),
        LeaseStatus::HeldBy { namespace, holder } => {
            format!("`{}` is used by {}", namespace, mention(&holder))
        }
    };
    Ok(Reply::Text(text))
}

async fn list_pods(ctx: &Context<'_>, namespace: Option<&str>) -> Result<Reply> {
    let pods = ctx.gateway.list_pods(namespace).await?;
    let header = match namespace {
        Some(ns) => format!("Here are all the pods in `{}` I can find:", ns),
        None => "Here are all the pods I can find:".to_string(),
    };
    Ok(listing(header, pods.into_iter().map(|p| p.name)))
}

async fn pod_logs(ctx: &Context<'_>, fragment: &str, previous: bool) -> Result<Reply> {
    let Some(pod) = find_pod(ctx.gateway, fragment).await? else {
        return Ok(pod_not_found(fragment));
    };
    let content = ctx
        .gateway
        .read_pod_log(&pod.name, &pod.namespace, previous)
        .await?;
    Ok(Reply::Attachment {
        comment: format!("Here are the logs from `{}`", pod.name),
        content,
    })
}

async fn list_namespaces(ctx: &Context<'_>) -> Result<Reply> {
    let namespaces = ctx.gateway.list_namespaces(None).await?;
    Ok(listing(
        "Here are all the namespaces I can find:".to_string(),
        namespaces.into_iter().map(|ns| ns.name),
    ))
}

async fn describe_pod(ctx: &Context<'_>, fragment: &str) -> Result<Reply> {
    let fragment = fragment.trim();
    let Some(pod) = find_pod(ctx.gateway, fragment).await? else {
        return Ok(pod_not_found(fragment));
    };
    let content = ctx
        .gateway
        .read_pod_description(&pod.name, &pod.namespace)
        .await?;
    Ok(Reply::Attachment {
        comment: format!("Here is the description for pod {}", pod.name),
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::MemoryCluster;
    use crate::cluster::{ClusterGateway, Namespace, Pod};
    use crate::config::LeaseConfig;
    use crate::core::lease::{LabelLeaseRepository, LeaseManager};
    use crate::core::router::dispatch;

    struct Fixture {
        cluster: Arc<MemoryCluster>,
        registry: Registry,
        leases: LeaseManager,
    }

    impl Fixture {
        fn new() -> Self {
            let cluster = Arc::new(
                MemoryCluster::new()
                    .with_namespaces(vec![
                        Namespace::new("default"),
                        Namespace::new("dev-1").with_label("env", "dev"),
                        Namespace::new("dev-2")
                            .with_label("env", "dev")
                            .with_label("developer", "U123"),
                    ])
                    .with_pods(vec![
                        Pod {
                            name: "api-7d9f".to_string(),
                            namespace: "dev-1".to_string(),
                            images: vec!["api:1.0".to_string(), "envoy:1.30".to_string()],
                        },
                        Pod {
                            name: "worker-55c".to_string(),
                            namespace: "dev-2".to_string(),
                            images: vec!["worker:2.1".to_string()],
                        },
                    ])
                    .with_log("api-7d9f", false, "started\nlistening on :8080")
                    .with_log("api-7d9f", true, "panic: boom"),
            );
            let repo = LabelLeaseRepository::new(cluster.clone(), &LeaseConfig::default());
            Self {
                cluster,
                registry: default_registry().unwrap(),
                leases: LeaseManager::new(repo),
            }
        }

        async fn run(&self, text: &str, requester: &str) -> Result<Reply> {
            let outcome = dispatch(&self.registry, text);
            let gateway: &dyn ClusterGateway = &*self.cluster;
            let ctx = Context {
                text,
                requester,
                registry: &self.registry,
                gateway,
                leases: &self.leases,
            };
            outcome.handler.handle(&ctx, &outcome.captures).await
        }

        async fn text(&self, text: &str, requester: &str) -> String {
            match self.run(text, requester).await.unwrap() {
                Reply::Text(t) => t,
                other => panic!("expected text reply, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_default_registry_order() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.len(), BUILTINS.len());
        assert_eq!(registry.commands()[0].handler.name(), "show_help");
        assert_eq!(registry.commands()[3].handler.name(), "pick_dev_env");
    }

    #[tokio::test]
    async fn test_help_lists_every_command() {
        let fx = Fixture::new();
        let text = fx.text("help", "U1").await;
        assert!(text.starts_with("Here are all the supported commands:"));
        assert_eq!(text.lines().count(), BUILTINS.len() + 1);
        assert!(text.contains("pick (\\S+)$    Pick a specific environment"));
    }

    #[tokio::test]
    async fn test_pick_and_release_messages() {
        let fx = Fixture::new();

        let text = fx.text("pick dev-1", "U999").await;
        assert_eq!(text, "Hey <!here>, environment `dev-1` is now assigned to <@U999>.");

        let text = fx.text("pick dev-1", "U555").await;
        assert_eq!(text, "Hey <@U555>, environment `dev-1` is used by <@U999>.");

        let text = fx.text("release dev-1", "U555").await;
        assert_eq!(text, "Hey <@U555>, environment `dev-1` is used by <@U999>.");

        let text = fx.text("release dev-1", "U999").await;
        assert!(text.starts_with("Hey <!here>, environment `dev-1` is free again."));

        let text = fx.text("release dev-1", "U999").await;
        assert_eq!(text, "Hey <@U999>, environment `dev-1` is already free.");

        let text = fx.text("pick dev-9", "U999").await;
        assert_eq!(text, "Hey <@U999>, I could not find environment `dev-9`.");
    }

    #[tokio::test]
    async fn test_list_envs_and_status() {
        let fx = Fixture::new();
        let text = fx.text("list-envs", "U1").await;
        assert!(text.contains("`dev-1` is free :owl:"));
        assert!(text.contains("`dev-2` is used by <@U123>"));
        assert!(!text.contains("default"));

        assert_eq!(fx.text("env status dev-2", "U1").await, "`dev-2` is used by <@U123>");
        assert_eq!(fx.text("env status dev-1", "U1").await, "`dev-1` is free :owl:");
    }

    #[tokio::test]
    async fn test_pod_listings() {
        let fx = Fixture::new();
        let text = fx.text("get pods", "U1").await;
        assert_eq!(text, "Here are all the pods I can find:\napi-7d9f\nworker-55c");

        let text = fx.text("list pods in namespace dev-2", "U1").await;
        assert_eq!(text, "Here are all the pods in `dev-2` I can find:\nworker-55c");

        let text = fx.text("get images in namespace dev-1", "U1").await;
        assert!(text.ends_with("api:1.0\nenvoy:1.30"));

        let text = fx.text("list namespaces", "U1").await;
        assert_eq!(text, "Here are all the namespaces I can find:\ndefault\ndev-1\ndev-2");
    }

    #[tokio::test]
    async fn test_logs_are_attachments_for_resolved_pod() {
        let fx = Fixture::new();
        let reply = fx.run("get logs for pod api", "U1").await.unwrap();
        assert_eq!(
            reply,
            Reply::Attachment {
                comment: "Here are the logs from `api-7d9f`".to_string(),
                content: "started\nlistening on :8080".to_string(),
            }
        );

        let reply = fx.run("get previous logs for pod api", "U1").await.unwrap();
        assert!(matches!(reply, Reply::Attachment { content, .. } if content == "panic: boom"));

        let text = fx.text("get logs for pod ghost", "U1").await;
        assert_eq!(text, "Could not find pod named ghost. Did you type it correctly?");
    }

    #[tokio::test]
    async fn test_describe_pod() {
        let fx = Fixture::new();
        let reply = fx.run("describe pod worker", "U1").await.unwrap();
        match reply {
            Reply::Attachment { comment, content } => {
                assert_eq!(comment, "Here is the description for pod worker-55c");
                assert!(content.contains("worker:2.1"));
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unrecognized_text_is_echoed() {
        let fx = Fixture::new();
        let text = fx.text("reboot the cluster", "U1").await;
        assert_eq!(text, "Sorry, I don't understand: reboot the cluster");
    }

    #[tokio::test]
    async fn test_gateway_failure_surfaces_as_error() {
        let fx = Fixture::new();
        fx.cluster.fail_calls();
        assert!(fx.run("pick dev-1", "U1").await.is_err());
        assert!(fx.run("get pods", "U1").await.is_err());
    }
}
