use crate::config_file::DeskConfig;
use crate::script::Step;
use crate::script::StoredItem;
use crate::script::apply_step;
use crate::script::read_json;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use monitor_coordinator::InMemoryQueryService;
use monitor_coordinator::MonitorRegistry;
use monitor_coordinator::SharedUserContext;
use monitor_criteria::CriteriaCompiler;
use monitor_protocol::FacetFilters;
use monitor_protocol::GroupDescriptor;
use owo_colors::OwoColorize;
use serde_json::Map;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Parser)]
#[command(
    name = "desk-monitor",
    version,
    about = "Compile and replay live monitoring groups"
)]
pub struct MonitorCli {
    #[command(subcommand)]
    pub command: MonitorCommand,
}

#[derive(Debug, Subcommand)]
pub enum MonitorCommand {
    /// List the groups defined in a desk config
    Groups(GroupsArgs),

    /// Print the query criteria compiled for configured groups
    Compile(CompileArgs),

    /// Replay a change script against an in-memory store and print window events as JSON lines
    Replay(ReplayArgs),
}

#[derive(Debug, Parser)]
pub struct GroupsArgs {
    /// Desk config (TOML)
    #[arg(short, long, value_name = "PATH")]
    pub config: PathBuf,
}

#[derive(Debug, Parser)]
pub struct CompileArgs {
    /// Desk config (TOML)
    #[arg(short, long, value_name = "PATH")]
    pub config: PathBuf,

    /// Compile only this group
    #[arg(short, long, value_name = "ID")]
    pub group: Option<String>,

    /// Free-text query layered on top of the group criteria
    #[arg(short, long, value_name = "TEXT")]
    pub query: Option<String>,

    /// Facet filter, repeatable
    #[arg(long = "facet", value_name = "NAME=V1,V2", value_parser = parse_facet)]
    pub facets: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Parser)]
pub struct ReplayArgs {
    /// Desk config (TOML)
    #[arg(short, long, value_name = "PATH")]
    pub config: PathBuf,

    /// JSON array of `{ "repo", "item" }` entries seeding the store
    #[arg(long, value_name = "PATH")]
    pub store: PathBuf,

    /// JSON array of replay steps
    #[arg(long, value_name = "PATH")]
    pub script: PathBuf,

    /// Quiet period after activation and after the last step
    #[arg(long, value_name = "MS", default_value_t = 200)]
    pub settle_ms: u64,
}

impl MonitorCli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            MonitorCommand::Groups(args) => run_groups(args),
            MonitorCommand::Compile(args) => run_compile(args),
            MonitorCommand::Replay(args) => run_replay(args).await,
        }
    }
}

fn parse_facet(raw: &str) -> std::result::Result<(String, Vec<String>), String> {
    let (name, values) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=V1,V2, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("facet name is empty in `{raw}`"));
    }
    let values: Vec<String> = values
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect();
    Ok((name.to_string(), values))
}

fn run_groups(args: GroupsArgs) -> Result<()> {
    let config = DeskConfig::load(&args.config)?;
    if config.groups.is_empty() {
        println!("{} No groups configured", "✗".bright_red());
        return Ok(());
    }
    for group in &config.groups {
        let scope = group
            .kind()
            .stage()
            .map(ToString::to_string)
            .or_else(|| group.kind().desk().map(ToString::to_string))
            .unwrap_or_default();
        println!(
            "{}  {}  {}",
            group.id().bright_cyan(),
            group.kind().name(),
            scope.dimmed()
        );
    }
    Ok(())
}

fn run_compile(args: CompileArgs) -> Result<()> {
    let config = DeskConfig::load(&args.config)?;
    let compiler = CriteriaCompiler::new(config.monitor.compiler.clone(), config.user.identity.clone())
        .with_default_window_size(config.monitor.default_window_size);
    let mut facets = FacetFilters::new();
    for (name, values) in args.facets {
        facets.insert(name, values);
    }

    let selected: Vec<&GroupDescriptor> = match args.group.as_deref() {
        Some(id) => vec![
            config
                .group(id)
                .with_context(|| format!("group {id} is not configured"))?,
        ],
        None => config.groups.iter().collect(),
    };

    let mut compiled = Map::new();
    for group in selected {
        let criteria = compiler
            .compile(group, args.query.as_deref(), &facets)
            .with_context(|| format!("failed to compile group {}", group.id()))?;
        compiled.insert(group.id().to_string(), serde_json::to_value(criteria)?);
    }

    let output = if args.group.is_some() {
        compiled.into_iter().next().map(|(_, value)| value).unwrap_or(Value::Null)
    } else {
        Value::Object(compiled)
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_replay(args: ReplayArgs) -> Result<()> {
    let config = DeskConfig::load(&args.config)?;
    let store: Vec<StoredItem> = read_json(&args.store)?;
    let script: Vec<Step> = read_json(&args.script)?;

    let service = Arc::new(InMemoryQueryService::new());
    for stored in store {
        service.upsert(stored.repo, stored.item);
    }
    let context = Arc::new(SharedUserContext::new(config.user.identity.clone()));
    let (registry, mut events) =
        MonitorRegistry::new(config.monitor.clone(), service.clone(), context.clone())
            .context("failed to start monitor")?;

    let printer = tokio::spawn(async move {
        let mut printed = 0usize;
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => {
                    println!("{line}");
                    printed += 1;
                }
                Err(err) => warn!(error = %err, "failed to serialize event"),
            }
        }
        printed
    });

    for group in &config.groups {
        registry
            .activate(group.clone())
            .await
            .with_context(|| format!("failed to activate group {}", group.id()))?;
    }
    let settle = Duration::from_millis(args.settle_ms);
    tokio::time::sleep(settle).await;

    let steps = script.len();
    for (index, step) in script.into_iter().enumerate() {
        if let Err(err) = apply_step(step, &registry, &service, &context).await {
            eprintln!("{} step {}: {err:#}", "✗".bright_red(), index + 1);
        }
    }
    tokio::time::sleep(config.monitor.debounce() + settle).await;

    registry.deactivate_all().await;
    drop(registry);
    let printed = match tokio::time::timeout(Duration::from_secs(5), printer).await {
        Ok(joined) => joined.context("event printer panicked")?,
        Err(_) => {
            warn!("event stream did not close after shutdown");
            0
        }
    };

    eprintln!(
        "{} Replayed {} steps: {} queries, {} events",
        "✓".bright_green(),
        steps.bright_cyan(),
        service.calls().bright_cyan(),
        printed.bright_cyan()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn facet_arguments_split_on_commas() {
        assert_eq!(
            parse_facet("urgency=1, 2").expect("facet"),
            ("urgency".to_string(), vec!["1".to_string(), "2".to_string()])
        );
        assert!(parse_facet("urgency").is_err());
        assert!(parse_facet("=1").is_err());
    }
}
