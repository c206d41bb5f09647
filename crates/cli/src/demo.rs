//! Demonstration graphs wired into the `graft` binary.
//!
//! - `chain`  : config → db → app
//! - `diamond`: config → {db, cache} → api
//! - `fanout` : config → five services → aggregator

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use engine::{try_register, Catalog, EngineError, Results};
use nodes::{Node, NodeDescriptor, NodeError, Scope};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Graph {
    Chain,
    Diamond,
    Fanout,
}

impl Graph {
    pub const ALL: [Graph; 3] = [Graph::Chain, Graph::Diamond, Graph::Fanout];

    pub fn name(self) -> &'static str {
        match self {
            Graph::Chain => "chain",
            Graph::Diamond => "diamond",
            Graph::Fanout => "fanout",
        }
    }

    pub fn catalog(self) -> Result<Catalog, EngineError> {
        let nodes: Vec<NodeDescriptor> = match self {
            Graph::Chain => vec![config().into(), db().into(), app().into()],
            Graph::Diamond => vec![config().into(), db().into(), cache().into(), api().into()],
            Graph::Fanout => vec![
                config().into(),
                service::<1>(200).into(),
                service::<2>(220).into(),
                service::<3>(150).into(),
                service::<4>(170).into(),
                service::<5>(180).into(),
                aggregator().into(),
            ],
        };
        Catalog::from_nodes(nodes)
    }

    /// Add this graph's nodes to the process-wide catalog.
    pub fn register(self) -> anyhow::Result<()> {
        for node in self.catalog()?.nodes() {
            try_register(node.clone())
                .with_context(|| format!("registering the {} graph", self.name()))?;
        }
        Ok(())
    }

    /// The output of the graph's final node, as JSON.
    pub fn report(self, results: &Results) -> anyhow::Result<serde_json::Value> {
        let value = match self {
            Graph::Chain => serde_json::to_value(&*results.get::<App>()?)?,
            Graph::Diamond => serde_json::to_value(&*results.get::<Api>()?)?,
            Graph::Fanout => serde_json::to_value(&*results.get::<Aggregate>()?)?,
        };
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Node outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub db_host: String,
    pub db_port: u16,
    pub redis_host: String,
    pub redis_port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct Db {
    pub connected: bool,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cache {
    pub connected: bool,
    pub max_keys: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct App {
    pub name: String,
    pub version: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Api {
    pub ready: bool,
    pub version: String,
}

/// Output of the `N`th fan-out service.
#[derive(Debug, Clone, Serialize)]
pub struct Service<const N: usize> {
    pub name: String,
    pub result: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Aggregate {
    pub total_services: usize,
    pub total_result: u32,
    pub services: Vec<String>,
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

async fn work(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

fn config() -> Node<Config> {
    Node::new("config", |_scope: Scope| async {
        info!("loading configuration");
        work(100).await;
        Ok(Config {
            db_host: "localhost".into(),
            db_port: 5432,
            redis_host: "localhost".into(),
            redis_port: 6379,
        })
    })
}

fn db() -> Node<Db> {
    Node::new("db", |scope: Scope| async move {
        let cfg = scope.dep::<Config>()?;
        info!(host = %cfg.db_host, port = cfg.db_port, "connecting to database");
        work(150).await;
        Ok(Db {
            connected: true,
            pool_size: 10,
        })
    })
    .depends_on(["config"])
    .cacheable()
}

fn cache() -> Node<Cache> {
    Node::new("cache", |scope: Scope| async move {
        let cfg = scope.dep::<Config>()?;
        info!(host = %cfg.redis_host, port = cfg.redis_port, "connecting to cache");
        work(150).await;
        Ok(Cache {
            connected: true,
            max_keys: 10_000,
        })
    })
    .depends_on(["config"])
    .cacheable()
}

fn app() -> Node<App> {
    Node::new("app", |scope: Scope| async move {
        let db = scope.dep::<Db>()?;
        if !db.connected {
            return Err(NodeError::failed("database not connected"));
        }
        info!(pool_size = db.pool_size, "starting application");
        work(100).await;
        Ok(App {
            name: "demo-app".into(),
            version: "1.0.0".into(),
            pool_size: db.pool_size,
        })
    })
    .depends_on(["db"])
}

fn api() -> Node<Api> {
    Node::new("api", |scope: Scope| async move {
        let db = scope.dep::<Db>()?;
        let cache = scope.dep::<Cache>()?;
        info!(pool_size = db.pool_size, max_keys = cache.max_keys, "initializing api");
        work(100).await;
        Ok(Api {
            ready: db.connected && cache.connected,
            version: "2.0.0".into(),
        })
    })
    .depends_on(["db", "cache"])
}

fn service<const N: usize>(millis: u64) -> Node<Service<N>> {
    Node::new(format!("svc{N}"), move |scope: Scope| async move {
        scope.dep::<Config>()?;
        info!(service = N, "processing");
        work(millis).await;
        Ok(Service {
            name: format!("service-{N}"),
            result: 100 * N as u32,
        })
    })
    .depends_on(["config"])
}

fn aggregator() -> Node<Aggregate> {
    Node::new("aggregator", |scope: Scope| async move {
        let services = [
            summary(&*scope.dep::<Service<1>>()?),
            summary(&*scope.dep::<Service<2>>()?),
            summary(&*scope.dep::<Service<3>>()?),
            summary(&*scope.dep::<Service<4>>()?),
            summary(&*scope.dep::<Service<5>>()?),
        ];
        info!(count = services.len(), "aggregating service results");
        work(50).await;
        Ok(Aggregate {
            total_services: services.len(),
            total_result: services.iter().map(|(_, result)| result).sum(),
            services: services.into_iter().map(|(name, _)| name).collect(),
        })
    })
    .depends_on(["svc1", "svc2", "svc3", "svc4", "svc5"])
}

fn summary<const N: usize>(service: &Service<N>) -> (String, u32) {
    (service.name.clone(), service.result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::Engine;
    use nodes::NodeId;

    #[test]
    fn every_graph_schedules() {
        let widths: Vec<Vec<usize>> = Graph::ALL
            .iter()
            .map(|graph| {
                let levels = Engine::new(graph.catalog().unwrap()).levels().unwrap();
                levels.iter().map(Vec::len).collect()
            })
            .collect();

        assert_eq!(widths, vec![vec![1, 1, 1], vec![1, 2, 1], vec![1, 5, 1]]);
    }

    #[test]
    fn fanout_services_have_distinct_types() {
        let catalog = Graph::Fanout.catalog().unwrap();
        assert_eq!(catalog.types().len(), 7);
        assert_eq!(catalog.types().id_of::<Service<3>>(), Some(&NodeId::from("svc3")));
    }

    #[tokio::test]
    async fn diamond_reports_ready_api() {
        let results = Engine::new(Graph::Diamond.catalog().unwrap()).run().await.unwrap();
        let report = Graph::Diamond.report(&results).unwrap();
        assert_eq!(report["ready"], true);
        assert_eq!(report["version"], "2.0.0");
    }

    #[tokio::test]
    async fn fanout_aggregates_every_service() {
        let results = Engine::new(Graph::Fanout.catalog().unwrap()).run().await.unwrap();
        let aggregate = results.get::<Aggregate>().unwrap();
        assert_eq!(aggregate.total_services, 5);
        assert_eq!(aggregate.total_result, 1500);
        assert_eq!(aggregate.services[0], "service-1");
    }
}
