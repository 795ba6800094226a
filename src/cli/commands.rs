//! CLI command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{self, ConfigLoader, paths};
use crate::kube::{KubeconfigConnector, contexts_from_kubeconfig, load_kubeconfig};
use crate::manager::{ContextConnector, ContextsManager};
use crate::models::{ContextResourcePermission, KubeContext, ResourceClass};
use crate::permissions::{ContextPermissionsChecker, default_resource_factories};
use crate::state::{ContextsStatesDispatcher, ContextsStatesRegistry, StateSender};

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Get configuration value
    Get {
        /// Configuration key (e.g., "namespace", "reconnectIntervalSecs")
        key: Option<String>,
    },
    /// Show configuration file path
    Path,
    /// Validate configuration
    Validate,
}

/// Effective settings after merging config file and command-line flags
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: config::Config,
    pub kubeconfig: Option<PathBuf>,
    pub namespace: Option<String>,
}

impl Settings {
    /// Flags win over the config file
    pub fn new(config: config::Config, kubeconfig: Option<PathBuf>, namespace: Option<String>) -> Self {
        let kubeconfig = kubeconfig.or_else(|| config.kubeconfig.clone());
        let namespace = namespace.or_else(|| config.namespace.clone());
        Self {
            config,
            kubeconfig,
            namespace,
        }
    }

    fn contexts(&self) -> Result<(kube::config::Kubeconfig, Vec<KubeContext>)> {
        let kubeconfig = load_kubeconfig(self.kubeconfig.as_deref())?;
        let contexts = contexts_from_kubeconfig(&kubeconfig);
        Ok((kubeconfig, contexts))
    }
}

/// Writes each pushed payload as one JSON line on stdout
pub struct StdoutStateSender;

impl StateSender for StdoutStateSender {
    fn send(&self, channel: &str, payload: serde_json::Value) {
        let line = serde_json::json!({ "channel": channel, "payload": payload });
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
            tracing::error!("Failed to write {} payload: {}", channel, e);
        }
    }
}

/// Handle configuration subcommands
pub async fn handle_config_command(cmd: ConfigSubcommand) -> Result<()> {
    match cmd {
        ConfigSubcommand::Get { key } => {
            let config = ConfigLoader::load().context("Failed to load configuration")?;

            if let Some(key) = key {
                let value = config::get_config_value(&config, &key)?;
                println!("{}", value);
            } else {
                let yaml =
                    serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
                print!("{}", yaml);
            }
        }
        ConfigSubcommand::Path => {
            println!("{}", paths::root_config_path().display());
        }
        ConfigSubcommand::Validate => match ConfigLoader::validate() {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => {
                eprintln!("Configuration validation failed: {:#}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

/// List kubeconfig contexts, current one marked with `*`
pub async fn handle_contexts_command(settings: &Settings) -> Result<()> {
    let (_, contexts) = settings.contexts()?;

    println!(
        "{:<8} {:<30} {:<30} {:<20} NAMESPACE",
        "CURRENT", "NAME", "CLUSTER", "USER"
    );
    for context in &contexts {
        println!(
            "{:<8} {:<30} {:<30} {:<20} {}",
            if context.current { "*" } else { "" },
            context.name,
            context.cluster,
            context.user,
            context.namespace.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Evaluate the permission tree for one context and print the result as YAML
///
/// Defaults to the kubeconfig's current context. Output is grouped by
/// resource class.
pub async fn handle_permissions_command(settings: &Settings, context: Option<String>) -> Result<()> {
    let (kubeconfig, contexts) = settings.contexts()?;
    let target = match &context {
        Some(name) => contexts.iter().find(|c| &c.name == name),
        None => contexts.iter().find(|c| c.current),
    }
    .with_context(|| match &context {
        Some(name) => format!("Cannot find context {}", name),
        None => "No current context set in kubeconfig".to_string(),
    })?;

    let factories = default_resource_factories()?;
    let namespace = target.effective_namespace(settings.namespace.as_deref());
    let requests = factories.get_permissions_requests(&namespace)?;

    let connector = KubeconfigConnector::new(kubeconfig);
    let client = connector.connect(target).await?;
    let reviewer = client.access_reviewer();

    let (tx, mut rx) = mpsc::unbounded_channel();
    // class -> resource -> permission
    let mut permissions: BTreeMap<&str, BTreeMap<String, ContextResourcePermission>> = ResourceClass::all()
        .iter()
        .map(|class| (class.as_str(), BTreeMap::new()))
        .collect();
    for request in requests {
        let mut checker = ContextPermissionsChecker::new(&target.name, reviewer.clone(), request, tx.clone());
        checker.start().await;
        for (resource, permission) in checker.get_permissions() {
            permissions
                .entry(ResourceClass::of(&resource).as_str())
                .or_default()
                .insert(resource, permission);
        }
        checker.dispose();
    }
    drop(tx);
    while let Some(result) = rx.recv().await {
        tracing::debug!("{:?} -> {}", result.resources, result.permitted);
    }

    let yaml = serde_yaml::to_string(&permissions).context("Failed to serialize permissions")?;
    print!("{}", yaml);
    Ok(())
}

/// Track every context and stream state payloads until Ctrl-C
pub async fn handle_watch_command(settings: &Settings) -> Result<()> {
    let (kubeconfig, contexts) = settings.contexts()?;

    let factories = Arc::new(default_resource_factories()?);
    let registry = ContextsStatesRegistry::new(factories.get_resources_names());
    let connector = Arc::new(KubeconfigConnector::new(kubeconfig));

    let manager = ContextsManager::new(
        factories,
        registry.clone(),
        connector.clone(),
        settings.config.event_buffer,
    )
    .with_namespace(settings.namespace.clone());

    let mut dispatcher =
        ContextsStatesDispatcher::new(registry, manager.event_sender(), Arc::new(StdoutStateSender));
    dispatcher.init();

    let interval = settings.config.reconnect_interval();
    let (updates_tx, updates_rx) = mpsc::channel(4);
    updates_tx
        .send(contexts.clone())
        .await
        .context("Manager stopped before start")?;

    let poller = tokio::spawn(poll_kubeconfig(
        settings.kubeconfig.clone(),
        connector,
        contexts,
        updates_tx,
        interval,
    ));

    let result = tokio::select! {
        result = manager.run(updates_rx, interval) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            Ok(())
        }
    };

    poller.abort();
    dispatcher.stop();
    result
}

/// Re-read the kubeconfig on every tick and forward changed context lists
async fn poll_kubeconfig(
    path: Option<PathBuf>,
    connector: Arc<KubeconfigConnector>,
    mut known: Vec<KubeContext>,
    updates: mpsc::Sender<Vec<KubeContext>>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let kubeconfig = match load_kubeconfig(path.as_deref()) {
            Ok(kubeconfig) => kubeconfig,
            Err(e) => {
                tracing::warn!("Keeping previous kubeconfig: {:#}", e);
                continue;
            }
        };
        let contexts = contexts_from_kubeconfig(&kubeconfig);
        if contexts == known {
            continue;
        }

        tracing::info!("Kubeconfig changed, {} context(s)", contexts.len());
        connector.replace(kubeconfig);
        known = contexts.clone();
        if updates.send(contexts).await.is_err() {
            break;
        }
    }
}
