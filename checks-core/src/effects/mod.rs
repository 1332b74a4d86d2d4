//! Status effects: application, stacking and combat-linked durations.
//!
//! - [`EffectProcessor`] applies, toggles and removes effects on an actor.
//! - `stack` merges repeated applications of a stackable effect.
//! - `duration` counts remaining turns/rounds down as combat advances.
//! - `wire` maps instances to the persisted document shape.

mod duration;
mod processor;
mod stack;
mod wire;

pub use duration::DurationReport;
pub use processor::{ActorLocks, EffectHooks, EffectProcessor, EffectStage};
pub use stack::refresh_stack;
pub use wire::{EffectDocument, EffectFlags, HostDuration};

use crate::model::{ActorId, CombatId, EffectId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a stacked effect's changes scale with the stack count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StackMode {
    #[default]
    Add,
    Multiply,
    Max,
    Min,
}

impl StackMode {
    /// Effective value of a per-stack `value` at `stacks` stacks.
    pub fn scale(&self, value: i32, stacks: u32) -> i32 {
        match self {
            StackMode::Add => value.saturating_mul(stacks as i32),
            StackMode::Multiply => value.saturating_pow(stacks),
            StackMode::Max | StackMode::Min => value,
        }
    }
}

/// Stack bookkeeping carried by a stackable effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackState {
    pub stack_id: String,
    pub max_stacks: Option<u32>,
    pub stack_mode: StackMode,
    pub current_stacks: u32,
}

impl StackState {
    pub fn at_capacity(&self) -> bool {
        self.max_stacks.is_some_and(|max| self.current_stacks >= max)
    }
}

/// Whether an effect instance stacks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Stacking {
    #[default]
    NonStackable,
    Stackable(StackState),
}

/// Stacking rule requested by an application.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StackingRule {
    #[default]
    NonStackable,
    Stackable {
        stack_id: String,
        max_stacks: Option<u32>,
        stack_mode: StackMode,
    },
}

/// Nominal duration of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EffectDuration {
    pub turns: Option<u32>,
    pub rounds: Option<u32>,
}

impl EffectDuration {
    pub fn turns(turns: u32) -> Self {
        Self {
            turns: Some(turns),
            rounds: None,
        }
    }

    pub fn rounds(rounds: u32) -> Self {
        Self {
            turns: None,
            rounds: Some(rounds),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecialDuration {
    RemoveOnCombatEnd,
}

/// A keyed numeric change an effect contributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectChange {
    pub key: String,
    pub value: i32,
}

impl EffectChange {
    pub fn new(key: impl Into<String>, value: i32) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// The combat clock, present only while a combat is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatClock {
    pub id: CombatId,
    pub round: u32,
    pub turn: u32,
    /// Actor whose turn it is.
    pub current_actor: Option<ActorId>,
}

impl CombatClock {
    pub fn new(id: CombatId) -> Self {
        Self {
            id,
            round: 1,
            turn: 0,
            current_actor: None,
        }
    }

    pub fn at(mut self, round: u32, turn: u32) -> Self {
        self.round = round;
        self.turn = turn;
        self
    }

    pub fn with_current_actor(mut self, actor: ActorId) -> Self {
        self.current_actor = Some(actor);
        self
    }
}

/// An effect as requested by a caller, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectData {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub status_id: Option<String>,
    pub source_definition_id: Option<String>,
    pub stacking: StackingRule,
    pub duration: EffectDuration,
    pub remaining_turns: Option<u32>,
    pub remaining_rounds: Option<u32>,
    pub special_duration: Option<SpecialDuration>,
    pub changes: Vec<EffectChange>,
}

impl EffectData {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status_id: impl Into<String>) -> Self {
        self.status_id = Some(status_id.into());
        self
    }

    pub fn with_duration(mut self, duration: EffectDuration) -> Self {
        self.duration = duration;
        self
    }

    pub fn stackable(
        mut self,
        stack_id: impl Into<String>,
        max_stacks: Option<u32>,
        stack_mode: StackMode,
    ) -> Self {
        self.stacking = StackingRule::Stackable {
            stack_id: stack_id.into(),
            max_stacks,
            stack_mode,
        };
        self
    }

    pub fn remove_on_combat_end(mut self) -> Self {
        self.special_duration = Some(SpecialDuration::RemoveOnCombatEnd);
        self
    }

    pub fn with_change(mut self, change: EffectChange) -> Self {
        self.changes.push(change);
        self
    }
}

/// An effect attached to an actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectInstance {
    pub id: EffectId,
    pub name: String,
    pub icon: String,
    pub status_id: Option<String>,
    pub source_definition_id: Option<String>,
    pub stacking: Stacking,
    pub duration: EffectDuration,
    /// Authoritative countdown; `duration` is display only.
    pub remaining_turns: Option<u32>,
    pub remaining_rounds: Option<u32>,
    pub linked_combat_id: Option<CombatId>,
    /// Combat moment of the last application, refresh or turn decrement.
    pub start_round: Option<u32>,
    pub start_turn: Option<u32>,
    /// Whether the turn countdown has run since the last application or
    /// refresh. Stored for hosts that show it; repeated notifications are
    /// guarded by the `start_round`/`start_turn` anchor, not by this flag.
    pub has_decremented_once: bool,
    /// Last round that decremented `remaining_rounds`.
    pub last_round_tick: Option<u32>,
    pub special_duration: Option<SpecialDuration>,
    pub origin: Option<ActorId>,
    pub changes: Vec<EffectChange>,
}

impl EffectInstance {
    pub fn stack(&self) -> Option<&StackState> {
        match &self.stacking {
            Stacking::Stackable(state) => Some(state),
            Stacking::NonStackable => None,
        }
    }

    pub fn stack_mut(&mut self) -> Option<&mut StackState> {
        match &mut self.stacking {
            Stacking::Stackable(state) => Some(state),
            Stacking::NonStackable => None,
        }
    }

    pub fn is_stackable(&self) -> bool {
        self.stack().is_some()
    }

    /// Number of stacks; non-stackable effects count as one.
    pub fn stacks(&self) -> u32 {
        self.stack().map_or(1, |s| s.current_stacks)
    }

    /// Changes scaled by the current stack count and stack mode.
    pub fn effective_changes(&self) -> Vec<EffectChange> {
        let (mode, stacks) = self
            .stack()
            .map_or((StackMode::Add, 1), |s| (s.stack_mode, s.current_stacks));
        self.changes
            .iter()
            .map(|c| EffectChange::new(c.key.clone(), mode.scale(c.value, stacks)))
            .collect()
    }

    /// Whether a toggle request for `data` targets this effect.
    pub(crate) fn matches_toggle(&self, data: &EffectData) -> bool {
        match &data.status_id {
            Some(status) => self.status_id.as_deref() == Some(status.as_str()),
            None => data.name.as_deref() == Some(self.name.as_str()),
        }
    }

    /// Tie the countdown to a running combat.
    ///
    /// Counters that are already set are left alone.
    pub(crate) fn link_to_combat(&mut self, clock: &CombatClock) {
        if self.remaining_rounds.is_none() {
            self.remaining_rounds = self.duration.rounds.filter(|&r| r > 0);
        }
        if self.remaining_turns.is_none() {
            self.remaining_turns = self.duration.turns.filter(|&t| t > 0);
        }
        self.linked_combat_id = Some(clock.id);
        self.start_round = Some(clock.round);
        self.start_turn = Some(clock.turn);
        self.last_round_tick = Some(clock.round);
        self.has_decremented_once = false;
    }
}

/// A stackable application was rejected because the stack is full.
///
/// Reported inside [`ApplyOutcome::AtCapacity`]; nothing was mutated and the
/// application can be retried once the count drops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stack_id} is already at its maximum of {max_stacks} stacks")]
pub struct CapacityError {
    pub actor: ActorId,
    pub stack_id: String,
    pub max_stacks: u32,
}

/// Who applies an effect and whether it toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Remove a matching non-stackable effect instead of adding another.
    pub toggle: bool,
    pub origin: Option<ActorId>,
}

impl ApplyOptions {
    pub fn from_origin(origin: ActorId) -> Self {
        Self {
            toggle: false,
            origin: Some(origin),
        }
    }

    pub fn toggled(mut self) -> Self {
        self.toggle = true;
        self
    }
}

/// Result of [`EffectProcessor::apply_effect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created(EffectInstance),
    /// An existing stack was incremented and refreshed.
    Stacked(EffectInstance),
    /// A toggle removed an existing effect.
    Removed(EffectId),
    /// A hook vetoed the application.
    Prevented { stage: EffectStage, hook: String },
    AtCapacity(CapacityError),
}

impl ApplyOutcome {
    pub fn effect(&self) -> Option<&EffectInstance> {
        match self {
            ApplyOutcome::Created(effect) | ApplyOutcome::Stacked(effect) => Some(effect),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stacked(mode: StackMode, stacks: u32) -> EffectInstance {
        EffectInstance {
            id: EffectId::new(),
            name: "Poison".to_string(),
            icon: String::new(),
            status_id: None,
            source_definition_id: None,
            stacking: Stacking::Stackable(StackState {
                stack_id: "poison".to_string(),
                max_stacks: Some(5),
                stack_mode: mode,
                current_stacks: stacks,
            }),
            duration: EffectDuration::default(),
            remaining_turns: None,
            remaining_rounds: None,
            linked_combat_id: None,
            start_round: None,
            start_turn: None,
            has_decremented_once: false,
            last_round_tick: None,
            special_duration: None,
            origin: None,
            changes: vec![EffectChange::new("regen", -2)],
        }
    }

    #[test]
    fn test_stack_mode_scaling() {
        assert_eq!(StackMode::Add.scale(3, 4), 12);
        assert_eq!(StackMode::Multiply.scale(2, 3), 8);
        assert_eq!(StackMode::Max.scale(5, 9), 5);
        assert_eq!(StackMode::Min.scale(-1, 2), -1);
    }

    #[test]
    fn test_effective_changes_follow_stacks() {
        let effect = stacked(StackMode::Add, 3);
        assert_eq!(effect.effective_changes(), vec![EffectChange::new("regen", -6)]);
        assert_eq!(effect.stacks(), 3);
    }

    #[test]
    fn test_link_to_combat_keeps_existing_counter() {
        let mut effect = stacked(StackMode::Add, 1);
        effect.duration = EffectDuration {
            turns: Some(3),
            rounds: Some(2),
        };
        effect.remaining_turns = Some(1);

        let clock = CombatClock::new(CombatId::new()).at(2, 1);
        effect.link_to_combat(&clock);

        assert_eq!(effect.remaining_turns, Some(1));
        assert_eq!(effect.remaining_rounds, Some(2));
        assert_eq!(effect.start_round, Some(2));
        assert_eq!(effect.start_turn, Some(1));
        assert!(!effect.has_decremented_once);
    }

    #[test]
    fn test_toggle_matches_status_before_name() {
        let mut effect = stacked(StackMode::Add, 1);
        effect.status_id = Some("poisoned".to_string());

        assert!(effect.matches_toggle(&EffectData::named("Other").with_status("poisoned")));
        assert!(!effect.matches_toggle(&EffectData::named("Poison").with_status("burning")));
        assert!(effect.matches_toggle(&EffectData::named("Poison")));
    }
}
