//! Session data model: the recent-turn ring, the long-term entity map, and
//! the active view derived from it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::answer::SourceCitation;

/// Kinds of entities the [`crate::query::entity_extractor`] can emit and the
/// session's `EntityMap` tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Destination,
    Budget,
    TravelDates,
    GroupComposition,
    Accommodation,
    Transport,
    Activities,
    /// Free-form preference tokens that don't map to a closed kind.
    Preference,
}

impl EntityKind {
    /// "Sticky" kinds keep their old value as a secondary entry on a
    /// context switch; "singleton" kinds get replaced in the active view.
    pub fn is_sticky(self) -> bool {
        matches!(
            self,
            EntityKind::Budget | EntityKind::GroupComposition | EntityKind::TravelDates
        )
    }

    pub fn is_singleton(self) -> bool {
        matches!(self, EntityKind::Destination)
    }
}

/// One entity newly extracted from a user message, before it is merged into
/// the `EntityMap`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub kind: EntityKind,
    pub value: String,
    pub confidence: f32,
}

/// A long-term entry in the session's `EntityMap`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEntry {
    pub value: String,
    pub confidence: f32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub mention_count: u32,
    pub contributing_message_ids: Vec<String>,
}

impl EntityEntry {
    pub fn new(value: String, confidence: f32, now: DateTime<Utc>, message_id: String) -> Self {
        Self {
            value,
            confidence,
            first_seen: now,
            last_seen: now,
            mention_count: 1,
            contributing_message_ids: vec![message_id],
        }
    }
}

/// The long-term entity map: kind -> ordered entries (most recent last).
/// Multiple entries per kind are possible for sticky kinds after a
/// context switch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMap {
    #[serde(default)]
    pub entries: HashMap<EntityKind, Vec<EntityEntry>>,
}

impl EntityMap {
    pub fn entries_for(&self, kind: EntityKind) -> &[EntityEntry] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The most recently updated entry for `kind`, if any.
    pub fn latest(&self, kind: EntityKind) -> Option<&EntityEntry> {
        self.entries_for(kind).iter().max_by_key(|e| e.last_seen)
    }
}

/// The subset of the `EntityMap` currently "in force" for implicit-filter
/// inheritance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveEntityView {
    #[serde(default)]
    pub active: HashMap<EntityKind, String>,
}

impl ActiveEntityView {
    pub fn get(&self, kind: EntityKind) -> Option<&str> {
        self.active.get(&kind).map(String::as_str)
    }

    pub fn set(&mut self, kind: EntityKind, value: String) {
        self.active.insert(kind, value);
    }

    pub fn remove(&mut self, kind: EntityKind) {
        self.active.remove(&kind);
    }
}

/// One full conversational turn, kept verbatim while it's within the recent
/// ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub message_id: String,
    pub user_utterance: String,
    pub assistant_response: String,
    pub extracted_entities: Vec<ExtractedEntity>,
    pub cited_sources: Vec<SourceCitation>,
    pub timestamp: DateTime<Utc>,
}

/// A conversation session: a bounded ring of recent turns, plus the
/// long-term entity map and its active view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(default)]
    pub recent_turns: Vec<Turn>,
    #[serde(default)]
    pub entity_map: EntityMap,
    #[serde(default)]
    pub active_view: ActiveEntityView,
    pub last_active: DateTime<Utc>,
    /// Additive / forward-compatible bag for fields unknown to this version
    /// of the schema.
    #[serde(default, flatten)]
    pub unknown_fields: serde_json::Map<String, serde_json::Value>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            recent_turns: Vec::new(),
            entity_map: EntityMap::default(),
            active_view: ActiveEntityView::default(),
            last_active: now,
            unknown_fields: serde_json::Map::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl_secs: u64) -> bool {
        let idle = now.signed_duration_since(self.last_active);
        idle.num_seconds() > ttl_secs as i64
    }
}
