//! Provisioned graph client.

use dossier_core::config::{DossierConfig, GraphSettings};
use dossier_core::DocumentId;

use crate::arango::ArangoClient;
use crate::context::OpContext;
use crate::driver::{
    BindVars, CollectionHandle, CreateDatabaseOptions, CreateGraphOptions, Database,
    EdgeCollectionOptions, StoreClient, VertexCollectionOptions, VertexConstraints,
};
use crate::error::GraphError;
use crate::provision::{self, ProvisionedSchema, RetryPolicy};

type GraphOf<C> = <<C as StoreClient>::Database as Database>::Graph;
type CursorOf<C> = <<C as StoreClient>::Database as Database>::Cursor;

/// A driver together with the database and graph it provisioned.
///
/// This is the single point of access for knowledge graph operations.
/// Clone is cheap for the ArangoDB driver (inner Arc).
#[derive(Clone)]
pub struct GraphClient<C: StoreClient = ArangoClient> {
    driver: C,
    db: C::Database,
    graph: GraphOf<C>,
    settings: GraphSettings,
    retry: RetryPolicy,
}

impl GraphClient<ArangoClient> {
    /// Connect to ArangoDB and ensure the configured database and graph.
    pub async fn connect(config: &DossierConfig, ctx: &OpContext) -> Result<Self, GraphError> {
        let driver = ArangoClient::new(&config.arango)?;
        let client = Self::bootstrap(driver, config, ctx).await?;
        tracing::info!(
            url = %config.arango.url,
            database = %config.arango.database,
            graph = %config.graph.name,
            "Connected to ArangoDB"
        );
        Ok(client)
    }
}

impl<C: StoreClient> GraphClient<C> {
    /// Ensure the configured database and graph through any driver.
    ///
    /// Collections are not touched; see [`GraphClient::ensure_schema`].
    pub async fn bootstrap(
        driver: C,
        config: &DossierConfig,
        ctx: &OpContext,
    ) -> Result<Self, GraphError> {
        let retry = RetryPolicy::from(&config.provision);
        let db = provision::ensure_database(
            &driver,
            ctx,
            &config.arango.database,
            &CreateDatabaseOptions::default(),
            &retry,
        )
        .await?;
        let graph = provision::ensure_graph(
            &db,
            ctx,
            &config.graph.name,
            &CreateGraphOptions::default(),
            &retry,
        )
        .await?;

        Ok(Self {
            driver,
            db,
            graph,
            settings: config.graph.clone(),
            retry,
        })
    }

    pub fn driver(&self) -> &C {
        &self.driver
    }

    pub fn database(&self) -> &C::Database {
        &self.db
    }

    pub fn graph(&self) -> &GraphOf<C> {
        &self.graph
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Ensure every collection named in the graph settings.
    pub async fn ensure_schema(&self, ctx: &OpContext) -> Result<ProvisionedSchema, GraphError> {
        provision::ensure_schema(&self.graph, ctx, &self.settings).await
    }

    pub async fn get_or_create_vertex_collection(
        &self,
        ctx: &OpContext,
        name: &str,
        options: &VertexCollectionOptions,
    ) -> Result<CollectionHandle, GraphError> {
        provision::get_or_create_vertex_collection(&self.graph, ctx, name, options).await
    }

    pub async fn get_or_create_edge_collection(
        &self,
        ctx: &OpContext,
        name: &str,
        constraints: &VertexConstraints,
        options: &EdgeCollectionOptions,
    ) -> Result<CollectionHandle, GraphError> {
        provision::get_or_create_edge_collection(&self.graph, ctx, name, constraints, options)
            .await
    }

    /// Validate a `collection/key` document id.
    pub fn parse_doc_id(&self, id: &str) -> Result<DocumentId, GraphError> {
        Ok(id.parse::<DocumentId>()?)
    }

    /// Run an AQL query against the provisioned database.
    pub async fn query(
        &self,
        ctx: &OpContext,
        aql: &str,
        bind_vars: BindVars,
    ) -> Result<CursorOf<C>, GraphError> {
        self.db.query(ctx, aql, bind_vars).await
    }
}
