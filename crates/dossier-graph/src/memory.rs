//! In-memory store driver for testing and development.
//!
//! Behaves like the real store where provisioning cares: creating an object
//! that already exists is a conflict, not a no-op. Failures can be injected
//! per operation and every call can be slowed down to reproduce races.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::value::RawValue;

use crate::context::OpContext;
use crate::driver::{
    BindVars, CollectionHandle, CreateDatabaseOptions, CreateGraphOptions, Cursor, Database,
    EdgeCollectionOptions, Graph, StoreClient, VertexCollectionOptions, VertexConstraints,
};
use crate::error::{GraphError, SchemaKind};

/// Which operation an injected fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    Exists(SchemaKind),
    Create(SchemaKind),
    Query,
}

/// What an injected fault does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Report a conflict without creating anything.
    Conflict,
    /// Create the object as another process would, then report a conflict.
    ConcurrentCreate,
    Unauthorized,
    Api { status: u16, message: String },
}

/// A query received by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub database: String,
    pub aql: String,
    pub bind_vars: BindVars,
}

#[derive(Default)]
struct GraphState {
    vertex: BTreeSet<String>,
    edge: BTreeMap<String, VertexConstraints>,
}

#[derive(Default)]
struct State {
    databases: HashMap<String, HashMap<String, GraphState>>,
    faults: HashMap<FaultOp, (Fault, u32)>,
    create_calls: HashMap<(SchemaKind, String), u32>,
    results: VecDeque<Vec<Box<RawValue>>>,
    queries: Vec<RecordedQuery>,
    latency: Duration,
}

/// Shared in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Fail the next `times` calls of `op` with `fault`.
    pub fn inject(&self, op: FaultOp, fault: Fault, times: u32) {
        self.lock().faults.insert(op, (fault, times));
    }

    /// How many create calls reached the store for `name`, failed ones included.
    pub fn create_calls(&self, kind: SchemaKind, name: &str) -> u32 {
        self.lock()
            .create_calls
            .get(&(kind, name.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Queue the rows returned by the next query.
    pub fn push_result(&self, rows: Vec<serde_json::Value>) -> Result<(), GraphError> {
        let raw = rows
            .iter()
            .map(serde_json::value::to_raw_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.lock().results.push_back(raw);
        Ok(())
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.lock().queries.clone()
    }

    pub fn edge_constraints(
        &self,
        db: &str,
        graph: &str,
        name: &str,
    ) -> Option<VertexConstraints> {
        self.lock()
            .databases
            .get(db)?
            .get(graph)?
            .edge
            .get(name)
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Simulated round-trip: latency, then the injected fault if one is armed.
    async fn round_trip(&self, ctx: &OpContext, op: FaultOp) -> Result<Option<Fault>, GraphError> {
        let latency = self.lock().latency;
        ctx.run(async {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Ok(())
        })
        .await?;

        let mut state = self.lock();
        let fault = match state.faults.get_mut(&op) {
            Some((fault, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Some(fault.clone())
            }
            _ => None,
        };
        Ok(fault)
    }

    fn record_create(&self, kind: SchemaKind, name: &str) {
        *self
            .lock()
            .create_calls
            .entry((kind, name.to_string()))
            .or_default() += 1;
    }

    /// Run a create with fault handling. `insert` returns false if the object
    /// already exists.
    async fn create<F>(
        &self,
        ctx: &OpContext,
        kind: SchemaKind,
        name: &str,
        insert: F,
    ) -> Result<(), GraphError>
    where
        F: FnOnce(&mut State) -> Result<bool, GraphError>,
    {
        let fault = self.round_trip(ctx, FaultOp::Create(kind)).await?;
        self.record_create(kind, name);

        let conflict = GraphError::Conflict {
            kind,
            name: name.to_string(),
        };
        match fault {
            None => {}
            Some(Fault::ConcurrentCreate) => {
                insert(&mut self.lock())?;
                return Err(conflict);
            }
            Some(other) => return Err(fault_error(other, kind, name)),
        }

        if insert(&mut self.lock())? {
            Ok(())
        } else {
            Err(conflict)
        }
    }

    async fn exists<F>(
        &self,
        ctx: &OpContext,
        kind: SchemaKind,
        name: &str,
        check: F,
    ) -> Result<bool, GraphError>
    where
        F: FnOnce(&State) -> bool,
    {
        if let Some(fault) = self.round_trip(ctx, FaultOp::Exists(kind)).await? {
            return Err(fault_error(fault, kind, name));
        }
        Ok(check(&self.lock()))
    }
}

fn fault_error(fault: Fault, kind: SchemaKind, name: &str) -> GraphError {
    let what = format!("{kind} {name:?}");
    match fault {
        Fault::Conflict | Fault::ConcurrentCreate => GraphError::Conflict {
            kind,
            name: name.to_string(),
        },
        Fault::Unauthorized => GraphError::Unauthorized {
            what,
            status: 401,
            message: "not authorized".to_string(),
        },
        Fault::Api { status, message } => GraphError::Api {
            what,
            status,
            error_num: 0,
            message,
        },
    }
}

fn not_found(kind: SchemaKind, name: &str) -> GraphError {
    GraphError::NotFound {
        kind,
        name: name.to_string(),
    }
}

fn graph_state<'a>(
    state: &'a mut State,
    db: &str,
    graph: &str,
) -> Result<&'a mut GraphState, GraphError> {
    state
        .databases
        .get_mut(db)
        .ok_or_else(|| not_found(SchemaKind::Database, db))?
        .get_mut(graph)
        .ok_or_else(|| not_found(SchemaKind::Graph, graph))
}

// ── Driver impls ─────────────────────────────────────────────────

#[async_trait]
impl StoreClient for MemoryStore {
    type Database = MemoryDatabase;

    async fn database_exists(&self, ctx: &OpContext, name: &str) -> Result<bool, GraphError> {
        self.exists(ctx, SchemaKind::Database, name, |s| {
            s.databases.contains_key(name)
        })
        .await
    }

    async fn database(&self, ctx: &OpContext, name: &str) -> Result<MemoryDatabase, GraphError> {
        if self.database_exists(ctx, name).await? {
            Ok(MemoryDatabase {
                store: self.clone(),
                name: name.to_string(),
            })
        } else {
            Err(not_found(SchemaKind::Database, name))
        }
    }

    async fn create_database(
        &self,
        ctx: &OpContext,
        name: &str,
        _options: &CreateDatabaseOptions,
    ) -> Result<MemoryDatabase, GraphError> {
        self.create(ctx, SchemaKind::Database, name, |s| {
            if s.databases.contains_key(name) {
                return Ok(false);
            }
            s.databases.insert(name.to_string(), HashMap::new());
            Ok(true)
        })
        .await?;
        Ok(MemoryDatabase {
            store: self.clone(),
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    store: MemoryStore,
    name: String,
}

#[async_trait]
impl Database for MemoryDatabase {
    type Graph = MemoryGraph;
    type Cursor = MemoryCursor;

    fn name(&self) -> &str {
        &self.name
    }

    async fn graph_exists(&self, ctx: &OpContext, name: &str) -> Result<bool, GraphError> {
        self.store
            .exists(ctx, SchemaKind::Graph, name, |s| {
                s.databases
                    .get(&self.name)
                    .is_some_and(|graphs| graphs.contains_key(name))
            })
            .await
    }

    async fn graph(&self, ctx: &OpContext, name: &str) -> Result<MemoryGraph, GraphError> {
        if self.graph_exists(ctx, name).await? {
            Ok(self.graph_handle(name))
        } else {
            Err(not_found(SchemaKind::Graph, name))
        }
    }

    async fn create_graph(
        &self,
        ctx: &OpContext,
        name: &str,
        options: &CreateGraphOptions,
    ) -> Result<MemoryGraph, GraphError> {
        self.store
            .create(ctx, SchemaKind::Graph, name, |s| {
                let graphs = s
                    .databases
                    .get_mut(&self.name)
                    .ok_or_else(|| not_found(SchemaKind::Database, &self.name))?;
                if graphs.contains_key(name) {
                    return Ok(false);
                }
                let mut graph = GraphState::default();
                graph
                    .vertex
                    .extend(options.orphan_vertex_collections.iter().cloned());
                for def in &options.edge_definitions {
                    graph.vertex.extend(def.from.iter().cloned());
                    graph.vertex.extend(def.to.iter().cloned());
                    graph.edge.insert(
                        def.collection.clone(),
                        VertexConstraints {
                            from: def.from.clone(),
                            to: def.to.clone(),
                        },
                    );
                }
                graphs.insert(name.to_string(), graph);
                Ok(true)
            })
            .await?;
        Ok(self.graph_handle(name))
    }

    async fn query(
        &self,
        ctx: &OpContext,
        aql: &str,
        bind_vars: BindVars,
    ) -> Result<MemoryCursor, GraphError> {
        if let Some(fault) = self.store.round_trip(ctx, FaultOp::Query).await? {
            return Err(fault_error(fault, SchemaKind::Database, &self.name));
        }
        let mut state = self.store.lock();
        state.queries.push(RecordedQuery {
            database: self.name.clone(),
            aql: aql.to_string(),
            bind_vars,
        });
        let rows = state.results.pop_front().unwrap_or_default();
        Ok(MemoryCursor { rows: rows.into() })
    }
}

impl MemoryDatabase {
    fn graph_handle(&self, name: &str) -> MemoryGraph {
        MemoryGraph {
            store: self.store.clone(),
            db: self.name.clone(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryGraph {
    store: MemoryStore,
    db: String,
    name: String,
}

#[async_trait]
impl Graph for MemoryGraph {
    fn name(&self) -> &str {
        &self.name
    }

    async fn vertex_collection_exists(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<bool, GraphError> {
        self.store
            .exists(ctx, SchemaKind::VertexCollection, name, |s| {
                s.databases
                    .get(&self.db)
                    .and_then(|graphs| graphs.get(&self.name))
                    .is_some_and(|g| g.vertex.contains(name))
            })
            .await
    }

    async fn vertex_collection(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<CollectionHandle, GraphError> {
        if self.vertex_collection_exists(ctx, name).await? {
            Ok(CollectionHandle::vertex(&self.name, name))
        } else {
            Err(not_found(SchemaKind::VertexCollection, name))
        }
    }

    async fn create_vertex_collection(
        &self,
        ctx: &OpContext,
        name: &str,
        _options: &VertexCollectionOptions,
    ) -> Result<CollectionHandle, GraphError> {
        self.store
            .create(ctx, SchemaKind::VertexCollection, name, |s| {
                let graph = graph_state(s, &self.db, &self.name)?;
                Ok(graph.vertex.insert(name.to_string()))
            })
            .await?;
        Ok(CollectionHandle::vertex(&self.name, name))
    }

    async fn edge_collection_exists(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<bool, GraphError> {
        self.store
            .exists(ctx, SchemaKind::EdgeCollection, name, |s| {
                s.databases
                    .get(&self.db)
                    .and_then(|graphs| graphs.get(&self.name))
                    .is_some_and(|g| g.edge.contains_key(name))
            })
            .await
    }

    async fn edge_collection(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<CollectionHandle, GraphError> {
        if self.edge_collection_exists(ctx, name).await? {
            Ok(CollectionHandle::edge(&self.name, name))
        } else {
            Err(not_found(SchemaKind::EdgeCollection, name))
        }
    }

    async fn create_edge_collection(
        &self,
        ctx: &OpContext,
        name: &str,
        constraints: &VertexConstraints,
        _options: &EdgeCollectionOptions,
    ) -> Result<CollectionHandle, GraphError> {
        self.store
            .create(ctx, SchemaKind::EdgeCollection, name, |s| {
                let graph = graph_state(s, &self.db, &self.name)?;
                if graph.edge.contains_key(name) {
                    return Ok(false);
                }
                graph.vertex.extend(constraints.from.iter().cloned());
                graph.vertex.extend(constraints.to.iter().cloned());
                graph.edge.insert(name.to_string(), constraints.clone());
                Ok(true)
            })
            .await?;
        Ok(CollectionHandle::edge(&self.name, name))
    }
}

/// Serves a queued result set one row at a time.
#[derive(Debug)]
pub struct MemoryCursor {
    rows: VecDeque<Box<RawValue>>,
}

impl MemoryCursor {
    pub fn from_rows(rows: Vec<serde_json::Value>) -> Result<Self, GraphError> {
        let rows = rows
            .iter()
            .map(serde_json::value::to_raw_value)
            .collect::<Result<VecDeque<_>, _>>()?;
        Ok(Self { rows })
    }
}

#[async_trait]
impl Cursor for MemoryCursor {
    async fn read_document(&mut self, ctx: &OpContext) -> Result<Box<RawValue>, GraphError> {
        ctx.check()?;
        self.rows.pop_front().ok_or(GraphError::NoMoreDocuments)
    }

    async fn close(&mut self, _ctx: &OpContext) -> Result<(), GraphError> {
        self.rows.clear();
        Ok(())
    }
}
