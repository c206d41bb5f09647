//! `graft` CLI entry-point.
//!
//! Available sub-commands:
//! - `list`  : show the nodes of the demo graphs.
//! - `levels`: print the execution levels of a demo graph.
//! - `run`   : register a demo graph process-wide and run it.

mod demo;

use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use engine::{execute, Engine, RunOptions};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use demo::Graph;

#[derive(Parser)]
#[command(
    name = "graft",
    about = "Run dependency graphs of typed nodes, level by level",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show each demo graph's nodes and their dependencies.
    List {
        /// Only this graph.
        graph: Option<Graph>,
    },
    /// Print the levels a graph would run in.
    Levels {
        graph: Graph,
        /// Emit the levels as a JSON array of arrays.
        #[arg(long)]
        json: bool,
    },
    /// Run a demo graph.
    Run {
        graph: Graph,
        /// Run this many times against the same cache.
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Re-execute this cacheable node even on a warm cache (repeatable).
        #[arg(long = "bypass", value_name = "ID")]
        bypass: Vec<String>,
        /// Run without any cache.
        #[arg(long)]
        no_cache: bool,
        /// Cancel the run after this many milliseconds; checked between levels.
        #[arg(long, value_name = "MS")]
        cancel_after: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::List { graph } => {
            let graphs = graph.map_or_else(|| Graph::ALL.to_vec(), |graph| vec![graph]);
            for graph in graphs {
                let catalog = graph.catalog()?;
                println!("{}:", graph.name());
                for id in catalog.ids() {
                    let Some(node) = catalog.get(id.as_str()) else {
                        continue;
                    };
                    let deps: Vec<&str> = node.depends_on.iter().map(|dep| dep.as_str()).collect();
                    let cached = if node.cacheable { " [cacheable]" } else { "" };
                    println!("  {id} <- [{}]{cached}", deps.join(", "));
                }
            }
        }

        Command::Levels { graph, json } => {
            let levels = Engine::new(graph.catalog()?).levels()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&levels)?);
            } else {
                for (index, level) in levels.iter().enumerate() {
                    let ids: Vec<&str> = level.iter().map(|id| id.as_str()).collect();
                    println!("level {index}: {}", ids.join(", "));
                }
            }
        }

        Command::Run {
            graph,
            repeat,
            bypass,
            no_cache,
            cancel_after,
        } => {
            graph.register()?;

            let cancel = CancellationToken::new();
            if let Some(millis) = cancel_after {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(millis)).await;
                    warn!(after_ms = millis, "cancelling run");
                    cancel.cancel();
                });
            }

            let mut options = RunOptions::default()
                .bypass_cache_for(bypass)
                .with_cancellation(cancel);
            if no_cache {
                options = options.disable_cache();
            }

            for round in 1..=repeat {
                let started = Instant::now();
                let results = execute(options.clone())
                    .await
                    .with_context(|| format!("run {round} of the {} graph", graph.name()))?;
                info!(
                    round,
                    nodes = results.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "graph finished"
                );
                println!("{}", serde_json::to_string_pretty(&graph.report(&results)?)?);
            }
        }
    }

    Ok(())
}
