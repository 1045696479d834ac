//! ArangoDB driver over the HTTP API.
//!
//! Thin `reqwest` client: every call is one request with basic auth, and
//! HTTP failures are mapped onto `GraphError` so the provisioner can tell a
//! conflict from anything else.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use serde_json::value::RawValue;

use dossier_core::config::ArangoConfig;

use crate::context::OpContext;
use crate::driver::{
    BindVars, CollectionHandle, CreateDatabaseOptions, CreateGraphOptions, Cursor, Database,
    EdgeCollectionOptions, Graph, StoreClient, VertexCollectionOptions, VertexConstraints,
};
use crate::error::{GraphError, SchemaKind};

const SYSTEM_DATABASE: &str = "_system";

/// ArangoDB error numbers that mean "already exists".
const DUPLICATE_NAME: i64 = 1207;
const GRAPH_COLLECTION_MULTI_USE: i64 = 1920;
const GRAPH_DUPLICATE: i64 = 1925;
const GRAPH_COLLECTION_USED_IN_ORPHANS: i64 = 1938;

/// True when a failed response means the object already exists.
pub fn is_conflict_response(status: StatusCode, error_num: i64) -> bool {
    status == StatusCode::CONFLICT
        || matches!(
            error_num,
            DUPLICATE_NAME
                | GRAPH_COLLECTION_MULTI_USE
                | GRAPH_DUPLICATE
                | GRAPH_COLLECTION_USED_IN_ORPHANS
        )
}

struct Conn {
    http: reqwest::Client,
    base: Url,
    username: String,
    password: String,
    batch_size: u32,
}

/// HTTP client for one ArangoDB server. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct ArangoClient {
    conn: Arc<Conn>,
}

impl fmt::Debug for ArangoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArangoClient")
            .field("base", &self.conn.base.as_str())
            .field("username", &self.conn.username)
            .finish_non_exhaustive()
    }
}

impl ArangoClient {
    /// Build a client. No request is made until the first operation.
    pub fn new(config: &ArangoConfig) -> Result<Self, GraphError> {
        let base = Url::parse(&config.url)
            .map_err(|e| GraphError::Connection(format!("invalid URL {:?}: {e}", config.url)))?;
        if base.cannot_be_a_base() {
            return Err(GraphError::Connection(format!(
                "invalid URL {:?}: not a base URL",
                config.url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(url = %base, user = %config.username, "ArangoDB client configured");
        Ok(Self {
            conn: Arc::new(Conn {
                http,
                base,
                username: config.username.clone(),
                password: config.password.clone(),
                batch_size: config.cursor_batch_size.max(1),
            }),
        })
    }

    /// Handle to a database without checking that it exists.
    pub fn database_handle(&self, name: &str) -> ArangoDatabase {
        ArangoDatabase {
            client: self.clone(),
            name: name.to_string(),
        }
    }

    fn endpoint(&self, db: &str, path: &[&str]) -> Result<Url, GraphError> {
        let mut url = self.conn.base.clone();
        url.path_segments_mut()
            .map_err(|()| GraphError::Connection(format!("{} is not a base URL", self.conn.base)))?
            .pop_if_empty()
            .extend(["_db", db, "_api"])
            .extend(path);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.conn
            .http
            .request(method, url)
            .basic_auth(&self.conn.username, Some(&self.conn.password))
    }

    /// Send and map any non-success status onto `GraphError`.
    async fn send(
        &self,
        ctx: &OpContext,
        target: Target<'_>,
        req: RequestBuilder,
    ) -> Result<Response, GraphError> {
        ctx.run(async {
            let resp = req.send().await.map_err(|source| GraphError::Transport {
                what: target.to_string(),
                source,
            })?;
            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }
            // Error bodies are best effort; a proxy may answer with HTML.
            let body = resp.bytes().await.unwrap_or_default();
            let body: ErrorBody = serde_json::from_slice(&body).unwrap_or_default();
            Err(target.error(status, body))
        })
        .await
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &OpContext,
        target: Target<'_>,
        req: RequestBuilder,
    ) -> Result<T, GraphError> {
        ctx.run(async {
            let resp = self.send(ctx, target, req).await?;
            let bytes = resp.bytes().await.map_err(|source| GraphError::Transport {
                what: target.to_string(),
                source,
            })?;
            Ok(serde_json::from_slice(&bytes)?)
        })
        .await
    }

    /// `Ok(false)` when the server answers 404.
    async fn check_exists(
        &self,
        ctx: &OpContext,
        target: Target<'_>,
        req: RequestBuilder,
    ) -> Result<bool, GraphError> {
        match self.send(ctx, target, req).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// The object a request is about, for error mapping and messages.
#[derive(Clone, Copy)]
struct Target<'a> {
    kind: SchemaKind,
    name: &'a str,
}

impl<'a> Target<'a> {
    fn new(kind: SchemaKind, name: &'a str) -> Self {
        Self { kind, name }
    }

    fn error(self, status: StatusCode, body: ErrorBody) -> GraphError {
        let message = if body.error_message.is_empty() {
            status.canonical_reason().unwrap_or("unknown").to_string()
        } else {
            body.error_message
        };

        if is_conflict_response(status, body.error_num) {
            return GraphError::Conflict {
                kind: self.kind,
                name: self.name.to_string(),
            };
        }
        match status {
            StatusCode::NOT_FOUND => GraphError::NotFound {
                kind: self.kind,
                name: self.name.to_string(),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GraphError::Unauthorized {
                what: self.to_string(),
                status: status.as_u16(),
                message,
            },
            _ => GraphError::Api {
                what: self.to_string(),
                status: status.as_u16(),
                error_num: body.error_num,
                message,
            },
        }
    }
}

impl fmt::Display for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.kind, self.name)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ErrorBody {
    error_num: i64,
    error_message: String,
}

#[derive(Deserialize)]
struct CollectionList {
    #[serde(default)]
    collections: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorBatch {
    #[serde(default)]
    result: Vec<Box<RawValue>>,
    #[serde(default)]
    has_more: bool,
    id: Option<String>,
}

#[async_trait]
impl StoreClient for ArangoClient {
    type Database = ArangoDatabase;

    async fn database_exists(&self, ctx: &OpContext, name: &str) -> Result<bool, GraphError> {
        let url = self.endpoint(name, &["database", "current"])?;
        let target = Target::new(SchemaKind::Database, name);
        self.check_exists(ctx, target, self.request(Method::GET, url))
            .await
    }

    async fn database(&self, ctx: &OpContext, name: &str) -> Result<ArangoDatabase, GraphError> {
        let url = self.endpoint(name, &["database", "current"])?;
        self.send(ctx, Target::new(SchemaKind::Database, name), self.request(Method::GET, url))
            .await?;
        Ok(self.database_handle(name))
    }

    async fn create_database(
        &self,
        ctx: &OpContext,
        name: &str,
        options: &CreateDatabaseOptions,
    ) -> Result<ArangoDatabase, GraphError> {
        let url = self.endpoint(SYSTEM_DATABASE, &["database"])?;
        let body = json!({ "name": name, "options": options });
        self.send(
            ctx,
            Target::new(SchemaKind::Database, name),
            self.request(Method::POST, url).json(&body),
        )
        .await?;
        Ok(self.database_handle(name))
    }
}

/// A database on an ArangoDB server.
#[derive(Debug, Clone)]
pub struct ArangoDatabase {
    client: ArangoClient,
    name: String,
}

impl ArangoDatabase {
    fn graph_handle(&self, name: &str) -> ArangoGraph {
        ArangoGraph {
            db: self.clone(),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Database for ArangoDatabase {
    type Graph = ArangoGraph;
    type Cursor = ArangoCursor;

    fn name(&self) -> &str {
        &self.name
    }

    async fn graph_exists(&self, ctx: &OpContext, name: &str) -> Result<bool, GraphError> {
        let url = self.client.endpoint(&self.name, &["gharial", name])?;
        let target = Target::new(SchemaKind::Graph, name);
        self.client
            .check_exists(ctx, target, self.client.request(Method::GET, url))
            .await
    }

    async fn graph(&self, ctx: &OpContext, name: &str) -> Result<ArangoGraph, GraphError> {
        let url = self.client.endpoint(&self.name, &["gharial", name])?;
        self.client
            .send(ctx, Target::new(SchemaKind::Graph, name), self.client.request(Method::GET, url))
            .await?;
        Ok(self.graph_handle(name))
    }

    async fn create_graph(
        &self,
        ctx: &OpContext,
        name: &str,
        options: &CreateGraphOptions,
    ) -> Result<ArangoGraph, GraphError> {
        let url = self.client.endpoint(&self.name, &["gharial"])?;

        let mut graph_options = serde_json::Map::new();
        if let Some(shards) = options.number_of_shards {
            graph_options.insert("numberOfShards".into(), shards.into());
        }
        if let Some(factor) = options.replication_factor {
            graph_options.insert("replicationFactor".into(), factor.into());
        }
        let body = json!({
            "name": name,
            "edgeDefinitions": options.edge_definitions,
            "orphanCollections": options.orphan_vertex_collections,
            "options": graph_options,
        });

        self.client
            .send(
                ctx,
                Target::new(SchemaKind::Graph, name),
                self.client.request(Method::POST, url).json(&body),
            )
            .await?;
        Ok(self.graph_handle(name))
    }

    async fn query(
        &self,
        ctx: &OpContext,
        aql: &str,
        bind_vars: BindVars,
    ) -> Result<ArangoCursor, GraphError> {
        let url = self.client.endpoint(&self.name, &["cursor"])?;
        let body = json!({
            "query": aql,
            "bindVars": bind_vars,
            "batchSize": self.client.conn.batch_size,
        });
        let batch: CursorBatch = self
            .client
            .send_json(
                ctx,
                Target::new(SchemaKind::Database, &self.name),
                self.client.request(Method::POST, url).json(&body),
            )
            .await?;

        tracing::debug!(
            database = %self.name,
            rows = batch.result.len(),
            has_more = batch.has_more,
            "Query cursor opened"
        );
        Ok(ArangoCursor {
            db: self.clone(),
            buffer: batch.result.into(),
            id: batch.id,
            has_more: batch.has_more,
        })
    }
}

/// A named graph in an ArangoDB database.
#[derive(Debug, Clone)]
pub struct ArangoGraph {
    db: ArangoDatabase,
    name: String,
}

impl ArangoGraph {
    async fn list(&self, ctx: &OpContext, segment: &str) -> Result<Vec<String>, GraphError> {
        let client = &self.db.client;
        let url = client.endpoint(&self.db.name, &["gharial", &self.name, segment])?;
        let list: CollectionList = client
            .send_json(
                ctx,
                Target::new(SchemaKind::Graph, &self.name),
                client.request(Method::GET, url),
            )
            .await?;
        Ok(list.collections)
    }
}

#[async_trait]
impl Graph for ArangoGraph {
    fn name(&self) -> &str {
        &self.name
    }

    async fn vertex_collection_exists(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<bool, GraphError> {
        Ok(self.list(ctx, "vertex").await?.iter().any(|c| c == name))
    }

    async fn vertex_collection(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<CollectionHandle, GraphError> {
        if self.vertex_collection_exists(ctx, name).await? {
            Ok(CollectionHandle::vertex(&self.name, name))
        } else {
            Err(GraphError::NotFound {
                kind: SchemaKind::VertexCollection,
                name: name.to_string(),
            })
        }
    }

    async fn create_vertex_collection(
        &self,
        ctx: &OpContext,
        name: &str,
        options: &VertexCollectionOptions,
    ) -> Result<CollectionHandle, GraphError> {
        let client = &self.db.client;
        let url = client.endpoint(&self.db.name, &["gharial", &self.name, "vertex"])?;
        let body = json!({ "collection": name, "options": options });
        client
            .send(
                ctx,
                Target::new(SchemaKind::VertexCollection, name),
                client.request(Method::POST, url).json(&body),
            )
            .await?;
        Ok(CollectionHandle::vertex(&self.name, name))
    }

    async fn edge_collection_exists(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<bool, GraphError> {
        Ok(self.list(ctx, "edge").await?.iter().any(|c| c == name))
    }

    async fn edge_collection(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<CollectionHandle, GraphError> {
        if self.edge_collection_exists(ctx, name).await? {
            Ok(CollectionHandle::edge(&self.name, name))
        } else {
            Err(GraphError::NotFound {
                kind: SchemaKind::EdgeCollection,
                name: name.to_string(),
            })
        }
    }

    async fn create_edge_collection(
        &self,
        ctx: &OpContext,
        name: &str,
        constraints: &VertexConstraints,
        options: &EdgeCollectionOptions,
    ) -> Result<CollectionHandle, GraphError> {
        let client = &self.db.client;
        let url = client.endpoint(&self.db.name, &["gharial", &self.name, "edge"])?;
        let body = json!({
            "collection": name,
            "from": constraints.from,
            "to": constraints.to,
            "options": options,
        });
        client
            .send(
                ctx,
                Target::new(SchemaKind::EdgeCollection, name),
                client.request(Method::POST, url).json(&body),
            )
            .await?;
        Ok(CollectionHandle::edge(&self.name, name))
    }
}

/// Server-side cursor, drained one document at a time.
#[derive(Debug)]
pub struct ArangoCursor {
    db: ArangoDatabase,
    buffer: VecDeque<Box<RawValue>>,
    id: Option<String>,
    has_more: bool,
}

impl ArangoCursor {
    async fn fetch_next_batch(&mut self, ctx: &OpContext) -> Result<(), GraphError> {
        let Some(id) = self.id.clone() else {
            self.has_more = false;
            return Ok(());
        };
        let client = &self.db.client;
        let url = client.endpoint(&self.db.name, &["cursor", &id])?;
        let batch: CursorBatch = client
            .send_json(
                ctx,
                Target::new(SchemaKind::Database, &self.db.name),
                client.request(Method::POST, url),
            )
            .await?;

        tracing::debug!(cursor = %id, rows = batch.result.len(), "Cursor batch fetched");
        self.buffer.extend(batch.result);
        self.has_more = batch.has_more;
        if batch.id.is_some() {
            self.id = batch.id;
        }
        Ok(())
    }
}

#[async_trait]
impl Cursor for ArangoCursor {
    async fn read_document(&mut self, ctx: &OpContext) -> Result<Box<RawValue>, GraphError> {
        loop {
            if let Some(doc) = self.buffer.pop_front() {
                return Ok(doc);
            }
            if !self.has_more {
                return Err(GraphError::NoMoreDocuments);
            }
            self.fetch_next_batch(ctx).await?;
        }
    }

    async fn close(&mut self, ctx: &OpContext) -> Result<(), GraphError> {
        self.buffer.clear();
        if !std::mem::take(&mut self.has_more) {
            // A drained cursor is already gone on the server.
            return Ok(());
        }
        let Some(id) = self.id.take() else {
            return Ok(());
        };

        let client = &self.db.client;
        let url = client.endpoint(&self.db.name, &["cursor", &id])?;
        let target = Target::new(SchemaKind::Database, &self.db.name);
        match client
            .send(ctx, target, client.request(Method::DELETE, url))
            .await
        {
            Ok(_) => {
                tracing::debug!(cursor = %id, "Cursor released");
                Ok(())
            }
            // Expired on the server already.
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
