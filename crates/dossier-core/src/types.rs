//! Core domain types for the Dossier knowledge graph.
//!
//! Vertex documents (persons, organizations, sources, websites, events) and
//! the relation edges between them, in the JSON shape they are stored in.
//! All fields are defaulted so partially-populated documents still decode,
//! and an explicit `null` reads the same as a missing key.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Decode an explicit `null` as the field's default, like a missing key.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ── Entity Types ──────────────────────────────────────────────────

/// A natural person.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_key", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub aliases: Vec<String>,
    #[serde(deserialize_with = "null_default")]
    pub role: String,
    #[serde(deserialize_with = "null_default")]
    pub nationality: String,
    /// Unix seconds.
    #[serde(deserialize_with = "null_default")]
    pub birth_date: i64,
    #[serde(deserialize_with = "null_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_default")]
    pub attributes: BTreeMap<String, String>,
}

/// A company, agency, group or any other organized body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Organization {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_key", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub aliases: Vec<String>,
    #[serde(rename = "type")]
    #[serde(deserialize_with = "null_default")]
    pub org_type: String,
    #[serde(deserialize_with = "null_default")]
    pub country: String,
    /// Unix seconds.
    #[serde(deserialize_with = "null_default")]
    pub founded_at: i64,
    #[serde(deserialize_with = "null_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_default")]
    pub attributes: BTreeMap<String, String>,
}

/// Where a piece of information came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_key", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub url: String,
    #[serde(rename = "type")]
    #[serde(deserialize_with = "null_default")]
    pub source_type: String,
    /// 0-100.
    #[serde(deserialize_with = "null_default")]
    pub reliability: i32,
    #[serde(deserialize_with = "null_default")]
    pub tags: Vec<String>,
}

/// A website observed during collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Website {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_key", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub url: String,
    #[serde(deserialize_with = "null_default")]
    pub domain: String,
    #[serde(deserialize_with = "null_default")]
    pub title: String,
    #[serde(deserialize_with = "null_default")]
    pub description: String,
    #[serde(deserialize_with = "null_default")]
    pub tags: Vec<String>,
}

/// Something that happened at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_key", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub title: String,
    #[serde(deserialize_with = "null_default")]
    pub description: String,
    /// Unix seconds.
    #[serde(deserialize_with = "null_default")]
    pub happened_at: i64,
    #[serde(deserialize_with = "null_default")]
    pub location: String,
    #[serde(deserialize_with = "null_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_default")]
    pub attributes: BTreeMap<String, String>,
}

fn epoch_utc(secs: i64) -> Option<DateTime<Utc>> {
    if secs == 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

impl Event {
    /// `happened_at` as a UTC timestamp, if it is set and in range.
    pub fn happened_at_utc(&self) -> Option<DateTime<Utc>> {
        epoch_utc(self.happened_at)
    }
}

impl Person {
    pub fn birth_date_utc(&self) -> Option<DateTime<Utc>> {
        epoch_utc(self.birth_date)
    }
}

impl Organization {
    pub fn founded_at_utc(&self) -> Option<DateTime<Utc>> {
        epoch_utc(self.founded_at)
    }
}

// ── Discriminator ─────────────────────────────────────────────────

/// The closed set of vertex collections an entity can come from.
///
/// The string form is the collection name, which is also the `type`
/// discriminator on traversal rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Persons,
    Organizations,
    Sources,
    Websites,
    Events,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Persons,
        EntityType::Organizations,
        EntityType::Sources,
        EntityType::Websites,
        EntityType::Events,
    ];

    pub fn collection_name(&self) -> &'static str {
        match self {
            Self::Persons => "persons",
            Self::Organizations => "organizations",
            Self::Sources => "sources",
            Self::Websites => "websites",
            Self::Events => "events",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection_name())
    }
}

/// Returned when a discriminator is outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity type: {0:?}")]
pub struct UnknownEntityType(pub String);

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "persons" => Ok(Self::Persons),
            "organizations" => Ok(Self::Organizations),
            "sources" => Ok(Self::Sources),
            "websites" => Ok(Self::Websites),
            "events" => Ok(Self::Events),
            other => Err(UnknownEntityType(other.to_string())),
        }
    }
}

// ── Tagged Union ──────────────────────────────────────────────────

/// Exactly one entity, tagged by the collection it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "entity", rename_all = "lowercase")]
pub enum Entity {
    #[serde(rename = "persons")]
    Person(Person),
    #[serde(rename = "organizations")]
    Organization(Organization),
    #[serde(rename = "sources")]
    Source(Source),
    #[serde(rename = "websites")]
    Website(Website),
    #[serde(rename = "events")]
    Event(Event),
}

impl Entity {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Person(_) => EntityType::Persons,
            Entity::Organization(_) => EntityType::Organizations,
            Entity::Source(_) => EntityType::Sources,
            Entity::Website(_) => EntityType::Websites,
            Entity::Event(_) => EntityType::Events,
        }
    }

    /// The document's `_id`, when the store returned one.
    /// The entity's own point in time: birth, founding or occurrence.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Entity::Person(p) => p.birth_date_utc(),
            Entity::Organization(o) => o.founded_at_utc(),
            Entity::Event(e) => e.happened_at_utc(),
            Entity::Source(_) | Entity::Website(_) => None,
        }
    }

    pub fn document_id(&self) -> Option<&str> {
        match self {
            Entity::Person(e) => e.id.as_deref(),
            Entity::Organization(e) => e.id.as_deref(),
            Entity::Source(e) => e.id.as_deref(),
            Entity::Website(e) => e.id.as_deref(),
            Entity::Event(e) => e.id.as_deref(),
        }
    }
}

// ── Relation ──────────────────────────────────────────────────────

/// An edge between two entity documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Relation {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_key", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "_from")]
    #[serde(deserialize_with = "null_default")]
    pub from: String,
    #[serde(rename = "_to")]
    #[serde(deserialize_with = "null_default")]
    pub to: String,
    #[serde(deserialize_with = "null_default")]
    pub roles: Vec<String>,
    /// 0-100.
    #[serde(deserialize_with = "null_default")]
    pub confidence: i32,
}

/// A traversal result: the edge walked plus the entity it led to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub relation: Relation,
    #[serde(flatten)]
    pub entity: Entity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_decodes_with_store_metadata() {
        let json = r#"{"_id": "persons/123", "_key": "123", "name": "Alice",
            "role": "Engineer", "nationality": "US", "birth_date": 1234567890}"#;
        let p: Person = serde_json::from_str(json).unwrap();
        assert_eq!(p.id.as_deref(), Some("persons/123"));
        assert_eq!(p.key.as_deref(), Some("123"));
        assert_eq!(p.name, "Alice");
        assert_eq!(p.role, "Engineer");
        assert_eq!(p.nationality, "US");
        assert_eq!(p.birth_date, 1234567890);
        assert!(p.aliases.is_empty());
    }

    #[test]
    fn relation_uses_underscore_endpoints() {
        let json = r#"{"_from": "persons/123", "_to": "organizations/456",
            "roles": ["founder"], "confidence": 95}"#;
        let r: Relation = serde_json::from_str(json).unwrap();
        assert_eq!(r.from, "persons/123");
        assert_eq!(r.to, "organizations/456");
        assert_eq!(r.roles, vec!["founder".to_string()]);
        assert_eq!(r.confidence, 95);

        let back = serde_json::to_value(&r).unwrap();
        assert_eq!(back["_from"], "persons/123");
        assert!(back.get("_id").is_none());
    }

    #[test]
    fn event_timestamp_conversion() {
        let e: Event = serde_json::from_str(
            r#"{"title": "Conference", "description": "Tech conference", "happened_at": 1678886400}"#,
        )
        .unwrap();
        assert_eq!(e.title, "Conference");
        assert_eq!(e.happened_at_utc().unwrap().to_rfc3339(), "2023-03-15T13:20:00+00:00");
        assert!(Event::default().happened_at_utc().is_none());
    }

    #[test]
    fn explicit_nulls_read_as_defaults() {
        let p: Person = serde_json::from_str(
            r#"{"name": "Alice", "nationality": null, "tags": null, "birth_date": null,
                "attributes": null, "_key": null}"#,
        )
        .unwrap();
        assert_eq!(p.name, "Alice");
        assert_eq!(p.nationality, "");
        assert!(p.tags.is_empty());
        assert_eq!(p.birth_date, 0);
        assert!(p.key.is_none());

        let r: Relation = serde_json::from_str(
            r#"{"_from": "persons/1", "_to": null, "roles": null, "confidence": null}"#,
        )
        .unwrap();
        assert_eq!(r.from, "persons/1");
        assert!(r.to.is_empty());
        assert!(r.roles.is_empty());
        assert_eq!(r.confidence, 0);

        // Wrong types are still rejected.
        assert!(serde_json::from_str::<Person>(r#"{"tags": "a"}"#).is_err());
    }

    #[test]
    fn entity_timestamp_by_variant() {
        let org = Entity::Organization(Organization {
            founded_at: 1678886400,
            ..Default::default()
        });
        assert_eq!(
            org.timestamp().unwrap().to_rfc3339(),
            "2023-03-15T13:20:00+00:00"
        );
        assert!(Entity::Person(Person::default()).timestamp().is_none());
        assert!(Entity::Website(Website::default()).timestamp().is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let o: Organization =
            serde_json::from_str(r#"{"name": "Acme", "type": "company", "employees": 12}"#)
                .unwrap();
        assert_eq!(o.name, "Acme");
        assert_eq!(o.org_type, "company");
    }

    #[test]
    fn entity_type_parses_closed_set_only() {
        for t in EntityType::ALL {
            assert_eq!(t.collection_name().parse::<EntityType>().unwrap(), t);
        }
        let err = "unknown_kind".parse::<EntityType>().unwrap_err();
        assert_eq!(err, UnknownEntityType("unknown_kind".to_string()));
        assert!("Persons".parse::<EntityType>().is_err());
    }

    #[test]
    fn related_entity_serializes_with_type_tag() {
        let related = RelatedEntity {
            relation: Relation {
                from: "persons/1".into(),
                to: "websites/2".into(),
                ..Default::default()
            },
            entity: Entity::Website(Website {
                url: "https://example.org".into(),
                ..Default::default()
            }),
        };
        let json = serde_json::to_value(&related).unwrap();
        assert_eq!(json["type"], "websites");
        assert_eq!(json["entity"]["url"], "https://example.org");
        assert_eq!(json["relation"]["_to"], "websites/2");
        assert_eq!(related.entity.entity_type(), EntityType::Websites);
    }
}
