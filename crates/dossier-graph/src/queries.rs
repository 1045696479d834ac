//! Traversal queries that hydrate into typed related entities.

use serde_json::Value;

use dossier_core::{DocumentId, RelatedEntity};

use crate::client::GraphClient;
use crate::context::OpContext;
use crate::driver::{BindVars, Database, StoreClient};
use crate::hydrate::{HydrateError, RelatedEntities};

/// Edge direction followed by a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Outbound,
    Inbound,
    Any,
}

impl Direction {
    fn keyword(self) -> &'static str {
        match self {
            Self::Outbound => "OUTBOUND",
            Self::Inbound => "INBOUND",
            Self::Any => "ANY",
        }
    }
}

/// AQL for a traversal returning `{type, entity, edge}` rows.
///
/// `type` is the vertex's collection name, which doubles as the entity
/// discriminator.
pub fn traversal_aql(direction: Direction) -> String {
    format!(
        "FOR v, e IN 1..@depth {} @start GRAPH @graph\n  \
         RETURN {{ type: PARSE_IDENTIFIER(v._id).collection, entity: v, edge: e }}",
        direction.keyword()
    )
}

impl<C: StoreClient> GraphClient<C> {
    /// Open a traversal from `start` and return a lazy entity reader.
    ///
    /// `depth` is the maximum number of hops; zero is treated as one.
    pub async fn traverse(
        &self,
        ctx: &OpContext,
        start: &DocumentId,
        depth: u32,
        direction: Direction,
    ) -> Result<RelatedEntities<<C::Database as Database>::Cursor>, HydrateError> {
        let mut bind_vars = BindVars::new();
        bind_vars.insert("start".into(), Value::String(start.to_string()));
        bind_vars.insert("depth".into(), Value::from(depth.max(1)));
        bind_vars.insert("graph".into(), Value::String(self.settings().name.clone()));

        let cursor = self
            .query(ctx, &traversal_aql(direction), bind_vars)
            .await
            .map_err(HydrateError::Store)?;
        Ok(RelatedEntities::new(cursor))
    }

    /// Every entity reachable from `start` within `depth` outbound hops.
    pub async fn related_entities(
        &self,
        ctx: &OpContext,
        start: &DocumentId,
        depth: u32,
    ) -> Result<Vec<RelatedEntity>, HydrateError> {
        self.related_entities_directed(ctx, start, depth, Direction::Outbound)
            .await
    }

    pub async fn related_entities_directed(
        &self,
        ctx: &OpContext,
        start: &DocumentId,
        depth: u32,
        direction: Direction,
    ) -> Result<Vec<RelatedEntity>, HydrateError> {
        let related = self
            .traverse(ctx, start, depth, direction)
            .await?
            .collect_all(ctx)
            .await?;
        tracing::debug!(start = %start, depth, count = related.len(), "Traversal hydrated");
        Ok(related)
    }
}
