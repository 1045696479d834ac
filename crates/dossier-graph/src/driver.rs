//! Store driver abstraction.
//!
//! The provisioner and hydrator only talk to these traits. `ArangoClient`
//! implements them over HTTP; `MemoryStore` implements them in-process for
//! tests and development.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::value::RawValue;

use crate::context::OpContext;
use crate::error::GraphError;

/// AQL bind variables.
pub type BindVars = serde_json::Map<String, serde_json::Value>;

/// Entry point of a store: resolves databases.
#[async_trait]
pub trait StoreClient: Send + Sync {
    type Database: Database;

    async fn database_exists(&self, ctx: &OpContext, name: &str) -> Result<bool, GraphError>;

    async fn database(&self, ctx: &OpContext, name: &str) -> Result<Self::Database, GraphError>;

    /// Fails with `GraphError::Conflict` if the database already exists.
    async fn create_database(
        &self,
        ctx: &OpContext,
        name: &str,
        options: &CreateDatabaseOptions,
    ) -> Result<Self::Database, GraphError>;
}

/// A database handle: resolves graphs and runs queries.
#[async_trait]
pub trait Database: Clone + Send + Sync {
    type Graph: Graph;
    type Cursor: Cursor;

    fn name(&self) -> &str;

    async fn graph_exists(&self, ctx: &OpContext, name: &str) -> Result<bool, GraphError>;

    async fn graph(&self, ctx: &OpContext, name: &str) -> Result<Self::Graph, GraphError>;

    /// Fails with `GraphError::Conflict` if the graph already exists.
    async fn create_graph(
        &self,
        ctx: &OpContext,
        name: &str,
        options: &CreateGraphOptions,
    ) -> Result<Self::Graph, GraphError>;

    async fn query(
        &self,
        ctx: &OpContext,
        aql: &str,
        bind_vars: BindVars,
    ) -> Result<Self::Cursor, GraphError>;
}

/// A named graph: resolves its vertex and edge collections.
#[async_trait]
pub trait Graph: Clone + Send + Sync {
    fn name(&self) -> &str;

    async fn vertex_collection_exists(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<bool, GraphError>;

    async fn vertex_collection(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<CollectionHandle, GraphError>;

    /// Not idempotent: creating a name already in the graph is an error.
    async fn create_vertex_collection(
        &self,
        ctx: &OpContext,
        name: &str,
        options: &VertexCollectionOptions,
    ) -> Result<CollectionHandle, GraphError>;

    async fn edge_collection_exists(&self, ctx: &OpContext, name: &str)
        -> Result<bool, GraphError>;

    async fn edge_collection(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<CollectionHandle, GraphError>;

    /// Not idempotent: creating a name already in the graph is an error.
    async fn create_edge_collection(
        &self,
        ctx: &OpContext,
        name: &str,
        constraints: &VertexConstraints,
        options: &EdgeCollectionOptions,
    ) -> Result<CollectionHandle, GraphError>;
}

/// Forward-only query cursor.
#[async_trait]
pub trait Cursor: Send {
    /// Read the next document, or `GraphError::NoMoreDocuments` at the end.
    async fn read_document(&mut self, ctx: &OpContext) -> Result<Box<RawValue>, GraphError>;

    /// Release server-side resources before the cursor is drained.
    ///
    /// Later reads report `NoMoreDocuments`. Closing twice is a no-op.
    async fn close(&mut self, _ctx: &OpContext) -> Result<(), GraphError> {
        Ok(())
    }
}

// ── Handles ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Vertex,
    Edge,
}

/// A vertex or edge collection belonging to a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionHandle {
    pub name: String,
    pub kind: CollectionKind,
    pub graph: String,
}

impl CollectionHandle {
    pub fn vertex(graph: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: CollectionKind::Vertex,
            graph: graph.to_string(),
        }
    }

    pub fn edge(graph: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: CollectionKind::Edge,
            graph: graph.to_string(),
        }
    }
}

// ── Options ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_concern: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharding: Option<String>,
}

/// An edge collection together with the vertex collections it connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeDefinition {
    pub collection: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateGraphOptions {
    pub edge_definitions: Vec<EdgeDefinition>,
    pub orphan_vertex_collections: Vec<String>,
    pub number_of_shards: Option<u32>,
    pub replication_factor: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VertexCollectionOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub satellites: Vec<String>,
}

/// Which vertex collections an edge collection may connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VertexConstraints {
    pub from: Vec<String>,
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EdgeCollectionOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub satellites: Vec<String>,
}
