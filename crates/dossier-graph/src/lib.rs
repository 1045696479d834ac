//! dossier-graph: ArangoDB access for the Dossier knowledge graph.
//!
//! Schema objects (database, graph, vertex and edge collections) are
//! provisioned idempotently with double-checked locking, so concurrent
//! callers in one process issue a single create. Database and graph
//! creation also absorb conflicts from other processes by retrying.
//! Traversal rows are hydrated into typed `RelatedEntity` values.

pub mod arango;
pub mod client;
pub mod context;
pub mod driver;
pub mod error;
pub mod hydrate;
pub mod memory;
pub mod provision;
pub mod queries;

pub use arango::{ArangoClient, ArangoCursor, ArangoDatabase, ArangoGraph};
pub use client::GraphClient;
pub use context::OpContext;
pub use driver::{
    BindVars, CollectionHandle, CollectionKind, CreateDatabaseOptions, CreateGraphOptions,
    Cursor, Database, EdgeCollectionOptions, EdgeDefinition, Graph, StoreClient,
    VertexCollectionOptions, VertexConstraints,
};
pub use error::{GraphError, SchemaKind};
pub use hydrate::{hydrate_row, map_row_to_related_entity, HydrateError, RawRow, RelatedEntities};
pub use memory::MemoryStore;
pub use provision::{
    ensure_database, ensure_graph, ensure_schema, get_or_create_edge_collection,
    get_or_create_vertex_collection, schema_lock, ProvisionedSchema, RetryPolicy,
};
pub use queries::{traversal_aql, Direction};

pub use dossier_core::parse_doc_id;
