//! Combat-linked countdowns.
//!
//! Rounds tick for every holder once per round; turns tick only for the
//! actor whose turn it is. A counter reaching zero expires the effect.

use super::{CombatClock, EffectInstance, SpecialDuration};
use crate::model::EffectId;

/// What a clock notification did to an actor's effects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DurationReport {
    pub decremented: Vec<EffectId>,
    /// Effects deleted because their countdown ran out or combat ended.
    pub expired: Vec<EffectInstance>,
}

impl DurationReport {
    pub fn merge(&mut self, other: DurationReport) {
        self.decremented.extend(other.decremented);
        self.expired.extend(other.expired);
    }

    pub fn is_empty(&self) -> bool {
        self.decremented.is_empty() && self.expired.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    Unchanged,
    Decremented,
    Expired,
}

/// Count one turn off `effect` for the turn boundary `clock` describes.
///
/// Only boundaries strictly after the effect's anchor count, so the turn an
/// effect was applied in and repeated notifications for the same boundary
/// never decrement.
pub(crate) fn tick_turn(effect: &mut EffectInstance, clock: &CombatClock) -> Tick {
    if effect.linked_combat_id != Some(clock.id) {
        return Tick::Unchanged;
    }
    let Some(remaining) = effect.remaining_turns.filter(|&r| r > 0) else {
        return Tick::Unchanged;
    };

    let anchor = (
        effect.start_round.unwrap_or(0),
        effect.start_turn.unwrap_or(0),
    );
    if (clock.round, clock.turn) <= anchor {
        return Tick::Unchanged;
    }

    effect.remaining_turns = Some(remaining - 1);
    effect.has_decremented_once = true;
    effect.start_round = Some(clock.round);
    effect.start_turn = Some(clock.turn);

    if remaining == 1 {
        Tick::Expired
    } else {
        Tick::Decremented
    }
}

/// Count one round off `effect` for a round advance to `clock.round`.
pub(crate) fn tick_round(effect: &mut EffectInstance, clock: &CombatClock) -> Tick {
    if effect.linked_combat_id != Some(clock.id) {
        return Tick::Unchanged;
    }
    let Some(remaining) = effect.remaining_rounds.filter(|&r| r > 0) else {
        return Tick::Unchanged;
    };

    let anchor = effect
        .last_round_tick
        .or(effect.start_round)
        .unwrap_or(0);
    if clock.round <= anchor {
        return Tick::Unchanged;
    }

    effect.remaining_rounds = Some(remaining - 1);
    effect.last_round_tick = Some(clock.round);

    if remaining == 1 {
        Tick::Expired
    } else {
        Tick::Decremented
    }
}

/// Whether `effect` must go when combat ends.
pub(crate) fn ends_with_combat(effect: &EffectInstance) -> bool {
    effect.special_duration == Some(SpecialDuration::RemoveOnCombatEnd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{EffectData, EffectDuration, Stacking};
    use crate::model::{ActorId, CombatId};

    fn linked(duration: EffectDuration, clock: &CombatClock) -> EffectInstance {
        let data = EffectData::named("Haste").with_duration(duration);
        let mut effect = EffectInstance {
            id: EffectId::new(),
            name: data.name.unwrap_or_default(),
            icon: String::new(),
            status_id: None,
            source_definition_id: None,
            stacking: Stacking::NonStackable,
            duration: data.duration,
            remaining_turns: None,
            remaining_rounds: None,
            linked_combat_id: None,
            start_round: None,
            start_turn: None,
            has_decremented_once: false,
            last_round_tick: None,
            special_duration: None,
            origin: None,
            changes: Vec::new(),
        };
        effect.link_to_combat(clock);
        effect
    }

    #[test]
    fn test_turn_not_counted_in_application_turn() {
        let clock = CombatClock::new(CombatId::new()).at(1, 2);
        let mut effect = linked(EffectDuration::turns(2), &clock);

        assert_eq!(tick_turn(&mut effect, &clock), Tick::Unchanged);
        assert_eq!(effect.remaining_turns, Some(2));
        assert!(!effect.has_decremented_once);
    }

    #[test]
    fn test_turn_counts_once_per_boundary() {
        let clock = CombatClock::new(CombatId::new()).at(1, 2);
        let mut effect = linked(EffectDuration::turns(2), &clock);

        let next = clock.at(2, 2);
        assert_eq!(tick_turn(&mut effect, &next), Tick::Decremented);
        assert_eq!(tick_turn(&mut effect, &next), Tick::Unchanged);
        assert_eq!(effect.remaining_turns, Some(1));
        assert!(effect.has_decremented_once);

        assert_eq!(tick_turn(&mut effect, &clock.at(3, 2)), Tick::Expired);
        assert_eq!(effect.remaining_turns, Some(0));
    }

    #[test]
    fn test_anchor_guards_boundary_regardless_of_flag() {
        let clock = CombatClock::new(CombatId::new()).at(1, 2);
        let mut effect = linked(EffectDuration::turns(3), &clock);

        let next = clock.at(2, 2);
        assert_eq!(tick_turn(&mut effect, &next), Tick::Decremented);
        effect.has_decremented_once = false;
        assert_eq!(tick_turn(&mut effect, &next), Tick::Unchanged);
        assert_eq!(effect.remaining_turns, Some(2));
    }

    #[test]
    fn test_round_ticks_once_per_round() {
        let clock = CombatClock::new(CombatId::new()).at(1, 0);
        let mut effect = linked(EffectDuration::rounds(2), &clock);

        assert_eq!(tick_round(&mut effect, &clock), Tick::Unchanged);
        assert_eq!(tick_round(&mut effect, &clock.at(2, 0)), Tick::Decremented);
        assert_eq!(tick_round(&mut effect, &clock.at(2, 3)), Tick::Unchanged);
        assert_eq!(tick_round(&mut effect, &clock.at(3, 0)), Tick::Expired);
    }

    #[test]
    fn test_other_combat_ignored() {
        let clock = CombatClock::new(CombatId::new()).at(1, 0);
        let mut effect = linked(EffectDuration::rounds(2), &clock);
        let other = CombatClock::new(CombatId::new()).at(5, 0);

        assert_eq!(tick_round(&mut effect, &other), Tick::Unchanged);
        assert_eq!(
            tick_turn(&mut effect, &other.with_current_actor(ActorId::new())),
            Tick::Unchanged
        );
    }
}
