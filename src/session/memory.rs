//! In-memory mutation rules for a [`Session`]: merging newly extracted
//! entities into the long-term `EntityMap`, maintaining the recent-turn
//! ring, and resetting state on request.

use chrono::{DateTime, Utc};

use crate::types::session::{ActiveEntityView, EntityEntry, EntityKind, EntityMap, ExtractedEntity, Session, Turn};

fn values_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Merges one freshly extracted entity into `entity_map`/`active_view`.
/// Returns `true` if this merge constitutes a context switch — a singleton
/// kind (destination) receiving a materially different value than the one
/// currently active.
pub fn merge_entity(
    entity_map: &mut EntityMap,
    active_view: &mut ActiveEntityView,
    entity: &ExtractedEntity,
    now: DateTime<Utc>,
    message_id: &str,
) -> bool {
    let entries = entity_map.entries.entry(entity.kind).or_default();

    if let Some(existing) = entries.iter_mut().find(|e| values_match(&e.value, &entity.value)) {
        existing.last_seen = now;
        existing.mention_count += 1;
        existing.confidence = existing.confidence.max(entity.confidence);
        existing.contributing_message_ids.push(message_id.to_string());
        active_view.set(entity.kind, existing.value.clone());
        return false;
    }

    let current_active = active_view.get(entity.kind).map(str::to_string);
    let is_context_switch = entity.kind.is_singleton()
        && current_active
            .as_deref()
            .is_some_and(|active| !values_match(active, &entity.value));

    entries.push(EntityEntry::new(
        entity.value.clone(),
        entity.confidence,
        now,
        message_id.to_string(),
    ));

    // Sticky kinds keep the superseded value active, adding the new one only
    // as a secondary `entries` entry; singleton and free-form kinds replace
    // the active view with the newest mention.
    if !entity.kind.is_sticky() || current_active.is_none() {
        active_view.set(entity.kind, entity.value.clone());
    }

    is_context_switch
}

/// Merges every entity extracted from one utterance, returning `true` if
/// any of them constituted a context switch.
pub fn merge_entities(
    session: &mut Session,
    entities: &[ExtractedEntity],
    now: DateTime<Utc>,
    message_id: &str,
) -> bool {
    let mut switched = false;
    for entity in entities {
        if merge_entity(&mut session.entity_map, &mut session.active_view, entity, now, message_id) {
            switched = true;
        }
    }
    switched
}

/// Appends a completed turn to the recent-turn ring, truncating the oldest
/// entry once `ring_size` is exceeded. Entities were already merged into the
/// long-term map by [`merge_entities`] before this is called, so truncating
/// the ring never loses entity history — only the verbatim utterance text.
pub fn append_turn(session: &mut Session, turn: Turn, ring_size: usize) {
    session.recent_turns.push(turn);
    if session.recent_turns.len() > ring_size {
        let excess = session.recent_turns.len() - ring_size;
        session.recent_turns.drain(0..excess);
    }
}

/// Clears a session's conversational state (recent turns, entity map,
/// active view) while keeping its identity, for an explicit "start over"
/// request.
pub fn reset(session: &mut Session, now: DateTime<Utc>) {
    session.recent_turns.clear();
    session.entity_map = EntityMap::default();
    session.active_view = ActiveEntityView::default();
    session.last_active = now;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(kind: EntityKind, value: &str, confidence: f32) -> ExtractedEntity {
        ExtractedEntity {
            kind,
            value: value.to_string(),
            confidence,
        }
    }

    #[test]
    fn repeated_same_value_increments_mention_count() {
        let mut map = EntityMap::default();
        let mut view = ActiveEntityView::default();
        let now = Utc::now();

        merge_entity(&mut map, &mut view, &entity(EntityKind::Destination, "Rim", 0.9), now, "m1");
        merge_entity(&mut map, &mut view, &entity(EntityKind::Destination, "rim", 0.9), now, "m2");

        let entries = map.entries_for(EntityKind::Destination);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mention_count, 2);
    }

    #[test]
    fn different_destination_triggers_context_switch() {
        let mut map = EntityMap::default();
        let mut view = ActiveEntityView::default();
        let now = Utc::now();

        merge_entity(&mut map, &mut view, &entity(EntityKind::Destination, "Rim", 0.9), now, "m1");
        let switched = merge_entity(
            &mut map,
            &mut view,
            &entity(EntityKind::Destination, "Pariz", 0.9),
            now,
            "m2",
        );

        assert!(switched);
        assert_eq!(view.get(EntityKind::Destination), Some("Pariz"));
        assert_eq!(map.entries_for(EntityKind::Destination).len(), 2);
    }

    #[test]
    fn sticky_kind_retains_old_entry_without_context_switch() {
        let mut map = EntityMap::default();
        let mut view = ActiveEntityView::default();
        let now = Utc::now();

        merge_entity(&mut map, &mut view, &entity(EntityKind::Budget, "budget", 0.8), now, "m1");
        let switched = merge_entity(
            &mut map,
            &mut view,
            &entity(EntityKind::Budget, "luxury", 0.8),
            now,
            "m2",
        );

        assert!(!switched);
        assert_eq!(map.entries_for(EntityKind::Budget).len(), 2);
        assert_eq!(view.get(EntityKind::Budget), Some("budget"));
    }

    #[test]
    fn ring_truncates_to_configured_size() {
        let mut session = Session::new("s1", Utc::now());
        for i in 0..5 {
            append_turn(
                &mut session,
                Turn {
                    message_id: format!("m{i}"),
                    user_utterance: "hi".into(),
                    assistant_response: "hello".into(),
                    extracted_entities: Vec::new(),
                    cited_sources: Vec::new(),
                    timestamp: Utc::now(),
                },
                3,
            );
        }
        assert_eq!(session.recent_turns.len(), 3);
        assert_eq!(session.recent_turns[0].message_id, "m2");
    }

    #[test]
    fn reset_clears_state_but_keeps_identity() {
        let mut session = Session::new("s1", Utc::now());
        merge_entities(
            &mut session,
            &[entity(EntityKind::Destination, "Rim", 0.9)],
            Utc::now(),
            "m1",
        );
        reset(&mut session, Utc::now());
        assert!(session.entity_map.entries_for(EntityKind::Destination).is_empty());
        assert_eq!(session.session_id, "s1");
    }
}
