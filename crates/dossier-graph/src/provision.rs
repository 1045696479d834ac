//! Schema provisioning: databases, graphs, and collections that must exist
//! exactly once even when many callers race to create them.
//!
//! Every create-if-absent step is double-checked: an unlocked existence
//! check first, then the process-wide schema lock, a second check, and only
//! then the create call. Databases and graphs can also be created by other
//! processes, so their provisioning additionally retries conflict failures
//! with a fixed backoff.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::sync::Mutex;

use dossier_core::config::{GraphSettings, ProvisionSettings};

use crate::context::OpContext;
use crate::driver::{
    CollectionHandle, CreateDatabaseOptions, CreateGraphOptions, Database, EdgeCollectionOptions,
    Graph, StoreClient, VertexCollectionOptions, VertexConstraints,
};
use crate::error::{GraphError, SchemaKind};

/// Bounded retry for conflict failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(2),
        }
    }
}

impl From<&ProvisionSettings> for RetryPolicy {
    fn from(settings: &ProvisionSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            backoff: settings.backoff(),
        }
    }
}

/// The lock guarding every create-if-absent critical section in the process.
///
/// Coarse-grained: provisioning of unrelated names is serialized too.
pub fn schema_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

// ── Databases & Graphs ───────────────────────────────────────────

/// Return the named database, creating it if absent.
pub async fn ensure_database<C>(
    client: &C,
    ctx: &OpContext,
    name: &str,
    options: &CreateDatabaseOptions,
    policy: &RetryPolicy,
) -> Result<C::Database, GraphError>
where
    C: StoreClient + ?Sized,
{
    retry_on_conflict(ctx, policy, SchemaKind::Database, name, move || {
        double_checked(
            ctx,
            SchemaKind::Database,
            name,
            move || client.database_exists(ctx, name),
            move || client.database(ctx, name),
            move || client.create_database(ctx, name, options),
        )
    })
    .await
}

/// Return the named graph inside `db`, creating it if absent.
pub async fn ensure_graph<D>(
    db: &D,
    ctx: &OpContext,
    name: &str,
    options: &CreateGraphOptions,
    policy: &RetryPolicy,
) -> Result<D::Graph, GraphError>
where
    D: Database,
{
    retry_on_conflict(ctx, policy, SchemaKind::Graph, name, move || {
        double_checked(
            ctx,
            SchemaKind::Graph,
            name,
            move || db.graph_exists(ctx, name),
            move || db.graph(ctx, name),
            move || db.create_graph(ctx, name, options),
        )
    })
    .await
}

// ── Collections ──────────────────────────────────────────────────

/// Return the named vertex collection of `graph`, creating it if absent.
///
/// Failures, including a conflict caused by another process, are returned
/// unchanged.
pub async fn get_or_create_vertex_collection<G>(
    graph: &G,
    ctx: &OpContext,
    name: &str,
    options: &VertexCollectionOptions,
) -> Result<CollectionHandle, GraphError>
where
    G: Graph,
{
    double_checked(
        ctx,
        SchemaKind::VertexCollection,
        name,
        || graph.vertex_collection_exists(ctx, name),
        || graph.vertex_collection(ctx, name),
        || graph.create_vertex_collection(ctx, name, options),
    )
    .await
}

/// Return the named edge collection of `graph`, creating it if absent.
pub async fn get_or_create_edge_collection<G>(
    graph: &G,
    ctx: &OpContext,
    name: &str,
    constraints: &VertexConstraints,
    options: &EdgeCollectionOptions,
) -> Result<CollectionHandle, GraphError>
where
    G: Graph,
{
    double_checked(
        ctx,
        SchemaKind::EdgeCollection,
        name,
        || graph.edge_collection_exists(ctx, name),
        || graph.edge_collection(ctx, name),
        || graph.create_edge_collection(ctx, name, constraints, options),
    )
    .await
}

/// Handles for every collection named in a `GraphSettings`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvisionedSchema {
    pub vertex_collections: Vec<CollectionHandle>,
    pub edge_collections: Vec<CollectionHandle>,
}

/// Provision all configured vertex collections, then all edge collections.
pub async fn ensure_schema<G>(
    graph: &G,
    ctx: &OpContext,
    settings: &GraphSettings,
) -> Result<ProvisionedSchema, GraphError>
where
    G: Graph,
{
    let mut schema = ProvisionedSchema::default();

    for name in &settings.vertex_collections {
        let handle = get_or_create_vertex_collection(
            graph,
            ctx,
            name,
            &VertexCollectionOptions::default(),
        )
        .await?;
        schema.vertex_collections.push(handle);
    }

    for edge in &settings.edge_collections {
        let constraints = VertexConstraints {
            from: edge.from.clone(),
            to: edge.to.clone(),
        };
        let handle = get_or_create_edge_collection(
            graph,
            ctx,
            &edge.name,
            &constraints,
            &EdgeCollectionOptions::default(),
        )
        .await?;
        schema.edge_collections.push(handle);
    }

    tracing::info!(
        graph = graph.name(),
        vertex = schema.vertex_collections.len(),
        edge = schema.edge_collections.len(),
        "Schema provisioned"
    );
    Ok(schema)
}

// ── Internals ────────────────────────────────────────────────────

/// Check, lock, re-check, create.
async fn double_checked<T, Exists, ExistsFut, Get, GetFut, Create, CreateFut>(
    ctx: &OpContext,
    kind: SchemaKind,
    name: &str,
    exists: Exists,
    get: Get,
    create: Create,
) -> Result<T, GraphError>
where
    Exists: Fn() -> ExistsFut,
    ExistsFut: Future<Output = Result<bool, GraphError>>,
    Get: Fn() -> GetFut,
    GetFut: Future<Output = Result<T, GraphError>>,
    Create: FnOnce() -> CreateFut,
    CreateFut: Future<Output = Result<T, GraphError>>,
{
    if exists().await? {
        tracing::debug!(%kind, name, "Using existing schema object");
        return get().await;
    }

    let _guard = ctx.run(async { Ok(schema_lock().lock().await) }).await?;

    // Another caller may have created it while we waited for the lock.
    if exists().await? {
        tracing::debug!(%kind, name, "Schema object created concurrently, reusing");
        return get().await;
    }

    let created = create().await?;
    tracing::info!(%kind, name, "Created schema object");
    Ok(created)
}

/// Run `attempt` until it succeeds, fails with a non-conflict error, or the
/// policy's attempts are used up.
async fn retry_on_conflict<T, F, Fut>(
    ctx: &OpContext,
    policy: &RetryPolicy,
    kind: SchemaKind,
    name: &str,
    mut attempt: F,
) -> Result<T, GraphError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GraphError>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for n in 1..=max_attempts {
        ctx.check()?;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_conflict() => {
                tracing::warn!(%kind, name, attempt = n, max_attempts, "Creation conflict");
                if n < max_attempts {
                    ctx.sleep(policy.backoff).await?;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(GraphError::ProvisionFailed {
        kind,
        name: name.to_string(),
        attempts: max_attempts,
    })
}
