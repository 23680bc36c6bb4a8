use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use k8s_openapi::serde_json;
use podmirror::k8s::cache::config::{
    DEFAULT_NAMESPACE, MAX_WATCH_RESTARTS, READY_CONDITION, WATCH_TIMEOUT_SECONDS,
};
use podmirror::k8s::cache::{
    ChangeRecord, DeletedObject, EventHandler, PodInformer, ReflectorConfig, ResourceObject,
};
use podmirror::k8s::pods::KubePodSource;
use podmirror::k8s::{USER_AGENT, client};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Namespace to mirror
    #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Print the synced snapshot and exit instead of following changes
    #[arg(long)]
    snapshot: bool,

    /// Snapshot output format
    #[arg(short, long, value_enum, default_value_t = Output::Table)]
    output: Output,

    /// Consecutive failed watch attempts tolerated before giving up
    #[arg(long, default_value_t = MAX_WATCH_RESTARTS)]
    max_watch_failures: u32,

    /// Server-side timeout for each watch request, in seconds
    #[arg(long, default_value_t = WATCH_TIMEOUT_SECONDS)]
    watch_timeout: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Table,
    Json,
}

fn init_tracing() {
    let env = std::env::var("PODMIRROR_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Prints every notification to stdout
struct ConsoleSink;

impl EventHandler for ConsoleSink {
    fn on_add(&self, obj: &ResourceObject) {
        println!("New pod: [{}] ({})", obj.name, obj.phase);
    }

    fn on_update(&self, old: &ResourceObject, new: &ResourceObject, changes: &[ChangeRecord]) {
        println!(
            "Pod [{}] updated (resourceVersion: {} -> {})",
            new.name, old.resource_version, new.resource_version
        );
        for change in changes {
            println!("  - {change}");
        }
    }

    fn on_delete(&self, deleted: &DeletedObject) {
        match deleted {
            DeletedObject::Known(obj) => println!("Pod [{}] deleted ({})", obj.name, obj.phase),
            DeletedObject::KeyOnly(key) => println!("Pod [{key}] deleted (last state unknown)"),
        }
    }

    fn on_resync(&self, obj: &ResourceObject) {
        println!("Pod [{}] resync", obj.name);
    }
}

fn print_snapshot(pods: &[ResourceObject], output: Output) -> Result<()> {
    match output {
        Output::Json => {
            let json = serde_json::to_string_pretty(pods).context("serializing snapshot")?;
            println!("{json}");
        }
        Output::Table => {
            println!("{:<48} {:<10} {:<16} READY", "NAME", "PHASE", "IP");
            for pod in pods {
                let ready = pod
                    .condition_status(READY_CONDITION)
                    .map_or("-", |s| s.as_str());
                println!("{:<48} {:<10} {:<16} {}", pod.name, pod.phase, pod.pod_ip, ready);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    let kube_client = client::new(Some(USER_AGENT))
        .await
        .context("creating kubernetes client")?;
    let source = KubePodSource::new(kube_client).with_watch_timeout(args.watch_timeout);
    let config = ReflectorConfig::new(args.namespace.clone())
        .with_max_consecutive_failures(args.max_watch_failures);

    let mut informer = PodInformer::new(source, config);
    if !args.snapshot {
        informer.subscribe(ConsoleSink)?;
    }

    let cancel = CancellationToken::new();
    let handle = informer.start(cancel.clone())?;

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
            }
            cancel.cancel();
        });
    }

    info!("Waiting for cache sync...");
    if !informer.wait_for_sync(&cancel).await {
        cancel.cancel();
        // surface the reflector's own error when it has one
        handle.join().await.context("pod cache failed to sync")?;
        bail!("pod cache failed to sync");
    }
    info!(
        "Cache synced with {} pods in {}, watching for changes",
        informer.snapshot().len(),
        informer.namespace()
    );

    if args.snapshot {
        print_snapshot(&informer.snapshot(), args.output)?;
        cancel.cancel();
    }

    handle.join().await?;
    let stats = informer.stats();
    info!(
        "Stopped after {} lists, {} relists, {} watch restarts, {} events",
        stats.lists, stats.relists, stats.watch_restarts, stats.events_applied
    );
    Ok(())
}
