//! Persisted shape of an effect document.
//!
//! The engine's fields live under a namespaced flag bag. The host's own
//! `duration` and `statuses` fields are written for display and
//! compatibility only; the countdown is always read back from the flags.

use super::{
    EffectChange, EffectDuration, EffectInstance, SpecialDuration, StackMode, StackState, Stacking,
};
use crate::model::{ActorId, CombatId, EffectId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An effect as stored on the actor document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectDocument {
    #[serde(rename = "_id")]
    pub id: EffectId,
    pub name: String,
    pub icon: String,
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub duration: HostDuration,
    #[serde(default)]
    pub flags: Map<String, Value>,
}

/// The host's native duration block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDuration {
    pub turns: Option<u32>,
    pub rounds: Option<u32>,
    pub combat: Option<CombatId>,
    pub start_round: Option<u32>,
    pub start_turn: Option<u32>,
}

/// Engine-owned fields stored under the namespace flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectFlags {
    pub source_definition_id: Option<String>,
    pub stackable: bool,
    pub stack_id: Option<String>,
    pub max_stacks: Option<u32>,
    pub current_stacks: Option<u32>,
    pub stack_mode: StackMode,
    pub remaining_turns: Option<u32>,
    pub remaining_rounds: Option<u32>,
    pub linked_combat_id: Option<CombatId>,
    pub start_round: Option<u32>,
    pub start_turn: Option<u32>,
    pub has_decremented_once: bool,
    pub last_round_tick: Option<u32>,
    pub special_duration: Option<SpecialDuration>,
    pub origin: Option<ActorId>,
    pub changes: Vec<EffectChange>,
}

impl EffectInstance {
    /// Convert to the stored document, flags under `namespace`.
    pub fn to_document(&self, namespace: &str) -> Result<EffectDocument, serde_json::Error> {
        let stack = self.stack();
        let flags = EffectFlags {
            source_definition_id: self.source_definition_id.clone(),
            stackable: stack.is_some(),
            stack_id: stack.map(|s| s.stack_id.clone()),
            max_stacks: stack.and_then(|s| s.max_stacks),
            current_stacks: stack.map(|s| s.current_stacks),
            stack_mode: stack.map(|s| s.stack_mode).unwrap_or_default(),
            remaining_turns: self.remaining_turns,
            remaining_rounds: self.remaining_rounds,
            linked_combat_id: self.linked_combat_id,
            start_round: self.start_round,
            start_turn: self.start_turn,
            has_decremented_once: self.has_decremented_once,
            last_round_tick: self.last_round_tick,
            special_duration: self.special_duration,
            origin: self.origin,
            changes: self.changes.clone(),
        };

        let mut bag = Map::new();
        bag.insert(namespace.to_string(), serde_json::to_value(flags)?);

        Ok(EffectDocument {
            id: self.id,
            name: self.name.clone(),
            icon: self.icon.clone(),
            statuses: self.status_id.iter().cloned().collect(),
            duration: HostDuration {
                turns: self.duration.turns,
                rounds: self.duration.rounds,
                combat: self.linked_combat_id,
                start_round: self.start_round,
                start_turn: self.start_turn,
            },
            flags: bag,
        })
    }

    /// Read back a stored document. Missing flags mean a plain effect.
    pub fn from_document(doc: &EffectDocument, namespace: &str) -> Result<Self, serde_json::Error> {
        let flags: EffectFlags = match doc.flags.get(namespace) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => EffectFlags::default(),
        };

        let stacking = if flags.stackable {
            let stack_id = flags
                .stack_id
                .or_else(|| flags.source_definition_id.clone())
                .unwrap_or_else(|| doc.name.clone());
            Stacking::Stackable(StackState {
                stack_id,
                max_stacks: flags.max_stacks,
                stack_mode: flags.stack_mode,
                current_stacks: flags.current_stacks.unwrap_or(1).max(1),
            })
        } else {
            Stacking::NonStackable
        };

        Ok(EffectInstance {
            id: doc.id,
            name: doc.name.clone(),
            icon: doc.icon.clone(),
            status_id: doc.statuses.first().cloned(),
            source_definition_id: flags.source_definition_id,
            stacking,
            duration: EffectDuration {
                turns: doc.duration.turns,
                rounds: doc.duration.rounds,
            },
            remaining_turns: flags.remaining_turns,
            remaining_rounds: flags.remaining_rounds,
            linked_combat_id: flags.linked_combat_id,
            start_round: flags.start_round,
            start_turn: flags.start_turn,
            has_decremented_once: flags.has_decremented_once,
            last_round_tick: flags.last_round_tick,
            special_duration: flags.special_duration,
            origin: flags.origin,
            changes: flags.changes,
        })
    }
}
