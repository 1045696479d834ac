//! Typed hydration of traversal rows.
//!
//! A traversal returns rows of `{type, entity, edge}`. The envelope is
//! decoded first with `entity` and `edge` kept as raw JSON, so a malformed
//! entity never hides the discriminator. The edge is then decoded as a
//! `Relation`, and `type` selects the concrete shape for the entity.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;

use dossier_core::{Entity, EntityType, RelatedEntity, Relation, UnknownEntityType};

use crate::context::OpContext;
use crate::driver::Cursor;
use crate::error::GraphError;

/// Errors from turning one cursor row into a `RelatedEntity`.
#[derive(Debug, thiserror::Error)]
pub enum HydrateError {
    /// The cursor has no more rows. Not a failure: iteration is done.
    #[error("no more rows")]
    Exhausted,

    #[error("failed to decode query row: {0}")]
    Row(#[source] serde_json::Error),

    #[error("relation decode failed: {0}")]
    RelationDecode(#[source] serde_json::Error),

    #[error(transparent)]
    UnknownEntityType(#[from] UnknownEntityType),

    #[error("failed to decode {entity_type} entity: {source}")]
    EntityDecode {
        entity_type: EntityType,
        #[source]
        source: serde_json::Error,
    },

    #[error("cursor read failed: {0}")]
    Store(#[source] GraphError),
}

impl HydrateError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

/// One row as returned by the store, payloads still undecoded.
#[derive(Debug, Deserialize)]
pub struct RawRow {
    #[serde(rename = "type")]
    pub kind: String,
    pub entity: Box<RawValue>,
    pub edge: Box<RawValue>,
}

/// Read the next row from `cursor` and hydrate it.
///
/// Returns `HydrateError::Exhausted` once the cursor is drained.
pub async fn map_row_to_related_entity<C>(
    ctx: &OpContext,
    cursor: &mut C,
) -> Result<RelatedEntity, HydrateError>
where
    C: Cursor + ?Sized,
{
    let raw = match cursor.read_document(ctx).await {
        Ok(raw) => raw,
        Err(GraphError::NoMoreDocuments) => return Err(HydrateError::Exhausted),
        Err(e) => return Err(HydrateError::Store(e)),
    };

    let row: RawRow = serde_json::from_str(raw.get()).map_err(HydrateError::Row)?;
    tracing::debug!(entity_type = %row.kind, "Query row read");
    hydrate_row(&row)
}

/// Decode an already-read row.
pub fn hydrate_row(row: &RawRow) -> Result<RelatedEntity, HydrateError> {
    let relation: Relation =
        serde_json::from_str(row.edge.get()).map_err(HydrateError::RelationDecode)?;

    let entity_type: EntityType = row.kind.parse()?;
    let entity = decode_entity(entity_type, &row.entity)?;

    Ok(RelatedEntity { relation, entity })
}

fn decode_entity(entity_type: EntityType, raw: &RawValue) -> Result<Entity, HydrateError> {
    Ok(match entity_type {
        EntityType::Persons => Entity::Person(decode(entity_type, raw)?),
        EntityType::Organizations => Entity::Organization(decode(entity_type, raw)?),
        EntityType::Sources => Entity::Source(decode(entity_type, raw)?),
        EntityType::Websites => Entity::Website(decode(entity_type, raw)?),
        EntityType::Events => Entity::Event(decode(entity_type, raw)?),
    })
}

fn decode<T: DeserializeOwned>(
    entity_type: EntityType,
    raw: &RawValue,
) -> Result<T, HydrateError> {
    serde_json::from_str(raw.get()).map_err(|source| HydrateError::EntityDecode {
        entity_type,
        source,
    })
}

/// Cursor wrapper yielding `Option`s instead of an exhaustion error.
///
/// Owns the cursor, so a single reader drives it.
pub struct RelatedEntities<C> {
    cursor: C,
}

impl<C: Cursor> RelatedEntities<C> {
    pub fn new(cursor: C) -> Self {
        Self { cursor }
    }

    /// The next entity, or `None` once the cursor is drained.
    pub async fn next(
        &mut self,
        ctx: &OpContext,
    ) -> Result<Option<RelatedEntity>, HydrateError> {
        match map_row_to_related_entity(ctx, &mut self.cursor).await {
            Ok(related) => Ok(Some(related)),
            Err(HydrateError::Exhausted) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Drain the cursor, stopping at the first bad row.
    ///
    /// On failure the cursor is closed before the error is returned.
    pub async fn collect_all(
        mut self,
        ctx: &OpContext,
    ) -> Result<Vec<RelatedEntity>, HydrateError> {
        let mut out = Vec::new();
        loop {
            match self.next(ctx).await {
                Ok(Some(related)) => out.push(related),
                Ok(None) => return Ok(out),
                Err(e) => {
                    self.close(ctx).await;
                    return Err(e);
                }
            }
        }
    }

    /// Release the cursor early. Failures are logged, not returned.
    pub async fn close(&mut self, ctx: &OpContext) {
        if let Err(e) = self.cursor.close(ctx).await {
            tracing::warn!(error = %e, "Failed to release query cursor");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use dossier_core::{Organization, Person};

    use super::*;

    use crate::driver::{BindVars, Database, StoreClient};
    use crate::memory::{Fault, FaultOp, MemoryCursor, MemoryStore};

    fn cursor(rows: Vec<serde_json::Value>) -> MemoryCursor {
        MemoryCursor::from_rows(rows).unwrap()
    }

    fn edge() -> serde_json::Value {
        json!({"_from": "persons/1", "_to": "organizations/2", "roles": ["founder"], "confidence": 95})
    }

    #[tokio::test]
    async fn test_organization_row() {
        let ctx = OpContext::new();
        let mut c = cursor(vec![json!({
            "type": "organizations",
            "edge": edge(),
            "entity": {"name": "Acme"},
        })]);

        let related = map_row_to_related_entity(&ctx, &mut c).await.unwrap();

        assert_eq!(related.relation.from, "persons/1");
        assert_eq!(related.relation.to, "organizations/2");
        assert_eq!(related.relation.roles, vec!["founder".to_string()]);
        assert_eq!(related.relation.confidence, 95);
        assert_eq!(
            related.entity,
            Entity::Organization(Organization {
                name: "Acme".into(),
                ..Default::default()
            })
        );
    }

    #[tokio::test]
    async fn test_person_row() {
        let ctx = OpContext::new();
        let mut c = cursor(vec![json!({
            "type": "persons",
            "edge": {"_from": "organizations/2", "_to": "persons/1", "roles": ["ceo", "founder"], "confidence": 80},
            "entity": {"_id": "persons/1", "name": "Alice", "nationality": "US"},
        })]);

        let related = map_row_to_related_entity(&ctx, &mut c).await.unwrap();

        let Entity::Person(Person { name, nationality, .. }) = &related.entity else {
            panic!("expected a person, got {:?}", related.entity);
        };
        assert_eq!(name, "Alice");
        assert_eq!(nationality, "US");
        assert_eq!(related.entity.document_id(), Some("persons/1"));
        assert_eq!(related.relation.roles.len(), 2);
        assert_eq!(related.relation.confidence, 80);
    }

    #[tokio::test]
    async fn test_every_discriminator_maps_to_its_variant() {
        let ctx = OpContext::new();
        let rows = EntityType::ALL
            .iter()
            .map(|t| json!({"type": t.collection_name(), "edge": edge(), "entity": {}}))
            .collect();
        let mut c = cursor(rows);

        for expected in EntityType::ALL {
            let related = map_row_to_related_entity(&ctx, &mut c).await.unwrap();
            assert_eq!(related.entity.entity_type(), expected);
        }
        assert!(map_row_to_related_entity(&ctx, &mut c)
            .await
            .unwrap_err()
            .is_exhausted());
    }

    #[tokio::test]
    async fn test_unknown_type_is_rejected() {
        let ctx = OpContext::new();
        let mut c = cursor(vec![json!({
            "type": "unknown_kind",
            "edge": edge(),
            "entity": {"name": "Acme"},
        })]);

        let err = map_row_to_related_entity(&ctx, &mut c).await.unwrap_err();

        match err {
            HydrateError::UnknownEntityType(UnknownEntityType(t)) => assert_eq!(t, "unknown_kind"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_exhausted_cursor() {
        let ctx = OpContext::new();
        let mut c = cursor(vec![]);

        let err = map_row_to_related_entity(&ctx, &mut c).await.unwrap_err();
        assert!(err.is_exhausted());
        assert!(matches!(err, HydrateError::Exhausted));
    }

    #[tokio::test]
    async fn test_bad_edge_reports_relation_failure() {
        let ctx = OpContext::new();
        let mut c = cursor(vec![json!({
            "type": "persons",
            "edge": {"_from": 1, "_to": "persons/2"},
            "entity": {"name": "Alice"},
        })]);

        let err = map_row_to_related_entity(&ctx, &mut c).await.unwrap_err();
        assert!(matches!(err, HydrateError::RelationDecode(_)));
        assert!(err.to_string().starts_with("relation decode failed"));
    }

    #[tokio::test]
    async fn test_bad_entity_reports_its_type() {
        let ctx = OpContext::new();
        let mut c = cursor(vec![json!({
            "type": "events",
            "edge": edge(),
            "entity": {"title": ["not", "a", "string"]},
        })]);

        let err = map_row_to_related_entity(&ctx, &mut c).await.unwrap_err();
        assert!(matches!(
            err,
            HydrateError::EntityDecode {
                entity_type: EntityType::Events,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_envelope_field() {
        let ctx = OpContext::new();
        let mut c = cursor(vec![json!({"type": "persons", "entity": {}})]);

        let err = map_row_to_related_entity(&ctx, &mut c).await.unwrap_err();
        assert!(matches!(err, HydrateError::Row(_)));
    }

    #[tokio::test]
    async fn test_bad_row_does_not_block_later_rows() {
        let ctx = OpContext::new();
        let mut c = cursor(vec![
            json!({"type": "websites", "edge": edge(), "entity": {"url": 7}}),
            json!({"type": "websites", "edge": edge(), "entity": {"url": "https://acme.test"}}),
        ]);

        assert!(map_row_to_related_entity(&ctx, &mut c).await.is_err());
        let ok = map_row_to_related_entity(&ctx, &mut c).await.unwrap();
        assert_eq!(ok.entity.entity_type(), EntityType::Websites);
    }

    #[tokio::test]
    async fn test_cancelled_read_is_store_error() {
        let ctx = OpContext::new();
        ctx.cancel_token().cancel();
        let mut c = cursor(vec![json!({"type": "persons", "edge": edge(), "entity": {}})]);

        let err = map_row_to_related_entity(&ctx, &mut c).await.unwrap_err();
        assert!(matches!(err, HydrateError::Store(ref e) if e.is_cancellation()));
    }

    #[tokio::test]
    async fn test_related_entities_iterates_to_none() {
        let store = MemoryStore::new();
        let ctx = OpContext::new();
        let db = store
            .create_database(&ctx, "osint", &Default::default())
            .await
            .unwrap();
        store
            .push_result(vec![
                json!({"type": "persons", "edge": edge(), "entity": {"name": "Alice"}}),
                json!({"type": "sources", "edge": edge(), "entity": {"name": "Wire"}}),
            ])
            .unwrap();

        let cursor = db.query(&ctx, "FOR x IN y RETURN x", BindVars::new()).await.unwrap();
        let all = RelatedEntities::new(cursor).collect_all(&ctx).await.unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(all[1].entity.entity_type(), EntityType::Sources);
    }

    #[tokio::test]
    async fn test_query_failure_is_not_exhaustion() {
        let store = MemoryStore::new();
        let ctx = OpContext::new();
        let db = store
            .create_database(&ctx, "osint", &Default::default())
            .await
            .unwrap();
        store.inject(FaultOp::Query, Fault::Unauthorized, 1);

        let err = db
            .query(&ctx, "RETURN 1", BindVars::new())
            .await
            .unwrap_err();
        assert!(!err.is_no_more_documents());
    }

    #[tokio::test]
    async fn test_null_fields_hydrate_as_defaults() {
        let ctx = OpContext::new();
        let mut c = cursor(vec![json!({
            "type": "persons",
            "edge": {"_from": "organizations/2", "_to": "persons/1", "roles": null, "confidence": 70},
            "entity": {"name": "Alice", "nationality": null, "tags": null},
        })]);

        let related = map_row_to_related_entity(&ctx, &mut c).await.unwrap();

        assert!(related.relation.roles.is_empty());
        assert_eq!(related.relation.confidence, 70);
        let Entity::Person(person) = &related.entity else {
            panic!("expected a person, got {:?}", related.entity);
        };
        assert_eq!(person.name, "Alice");
        assert_eq!(person.nationality, "");
        assert!(person.tags.is_empty());
    }

    /// Serves queued rows and counts `close` calls.
    struct CountingCursor {
        inner: MemoryCursor,
        closes: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Cursor for CountingCursor {
        async fn read_document(&mut self, ctx: &OpContext) -> Result<Box<RawValue>, GraphError> {
            self.inner.read_document(ctx).await
        }

        async fn close(&mut self, ctx: &OpContext) -> Result<(), GraphError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close(ctx).await
        }
    }

    fn counting(rows: Vec<serde_json::Value>) -> (CountingCursor, Arc<AtomicU32>) {
        let closes = Arc::new(AtomicU32::new(0));
        let c = CountingCursor {
            inner: cursor(rows),
            closes: closes.clone(),
        };
        (c, closes)
    }

    #[tokio::test]
    async fn test_collect_all_closes_cursor_on_bad_row() {
        let ctx = OpContext::new();
        let (c, closes) = counting(vec![
            json!({"type": "persons", "edge": edge(), "entity": {}}),
            json!({"type": "unknown_kind", "edge": edge(), "entity": {}}),
            json!({"type": "persons", "edge": edge(), "entity": {}}),
        ]);

        let err = RelatedEntities::new(c).collect_all(&ctx).await.unwrap_err();

        assert!(matches!(err, HydrateError::UnknownEntityType(_)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collect_all_leaves_drained_cursor_alone() {
        let ctx = OpContext::new();
        let (c, closes) = counting(vec![json!({"type": "events", "edge": edge(), "entity": {}})]);

        let all = RelatedEntities::new(c).collect_all(&ctx).await.unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_closed_cursor_reads_as_exhausted() {
        let ctx = OpContext::new();
        let mut related = RelatedEntities::new(cursor(vec![json!({
            "type": "events", "edge": edge(), "entity": {}
        })]));

        related.close(&ctx).await;

        assert!(related.next(&ctx).await.unwrap().is_none());
    }
}
