//! Stack engine: one instance per `(actor, stack_id)`, counted up to its cap.

use super::{ApplyOutcome, CapacityError, EffectInstance};
use crate::actor::ActorDocument;
use crate::error::EffectError;
use crate::model::ActorId;

/// Merge a repeated application into an existing stack.
///
/// Increments the count, hands the effect to the newest caster, and
/// refreshes the countdown without ever shortening it. Rejects the
/// application untouched when the stack is full.
pub fn refresh_stack(
    existing: &mut EffectInstance,
    incoming: &EffectInstance,
    actor: ActorId,
) -> Result<(), CapacityError> {
    let incoming_max = incoming.stack().and_then(|s| s.max_stacks);
    let Some(state) = existing.stack_mut() else {
        return Ok(());
    };

    let max_stacks = incoming_max.or(state.max_stacks);
    if let Some(max) = max_stacks {
        if state.current_stacks >= max {
            return Err(CapacityError {
                actor,
                stack_id: state.stack_id.clone(),
                max_stacks: max,
            });
        }
    }
    state.max_stacks = max_stacks;
    state.current_stacks += 1;

    if incoming.origin.is_some() {
        existing.origin = incoming.origin;
    }

    existing.remaining_turns = longest(existing.remaining_turns, incoming.remaining_turns);
    existing.remaining_rounds = longest(existing.remaining_rounds, incoming.remaining_rounds);
    existing.duration.turns = longest(existing.duration.turns, incoming.duration.turns);
    existing.duration.rounds = longest(existing.duration.rounds, incoming.duration.rounds);

    if incoming.linked_combat_id.is_some() {
        existing.linked_combat_id = incoming.linked_combat_id;
        existing.start_round = incoming.start_round;
        existing.start_turn = incoming.start_turn;
        existing.last_round_tick = incoming.last_round_tick;
    }
    existing.has_decremented_once = false;
    Ok(())
}

fn longest(current: Option<u32>, new: Option<u32>) -> Option<u32> {
    match (current, new) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Apply a normalized stackable effect to `actor`.
///
/// The caller holds the actor's mutation lock.
pub(crate) async fn apply_stack(
    actor: &dyn ActorDocument,
    incoming: EffectInstance,
) -> Result<ApplyOutcome, EffectError> {
    let Some(stack_id) = incoming.stack().map(|s| s.stack_id.clone()) else {
        let created = actor.create_effect(incoming).await?;
        return Ok(ApplyOutcome::Created(created));
    };

    let existing = actor
        .effects()
        .await?
        .into_iter()
        .find(|e| e.stack().is_some_and(|s| s.stack_id == stack_id));

    let Some(mut existing) = existing else {
        let created = actor.create_effect(incoming).await?;
        tracing::debug!(actor = %actor.id(), stack_id = %stack_id, "started new stack");
        return Ok(ApplyOutcome::Created(created));
    };

    if let Err(capacity) = refresh_stack(&mut existing, &incoming, actor.id()) {
        tracing::info!(
            actor = %actor.id(),
            stack_id = %stack_id,
            max_stacks = capacity.max_stacks,
            "stack at capacity; application rejected"
        );
        return Ok(ApplyOutcome::AtCapacity(capacity));
    }

    actor.update_effect(&existing).await?;
    tracing::debug!(
        actor = %actor.id(),
        stack_id = %stack_id,
        stacks = existing.stacks(),
        "stack refreshed"
    );
    Ok(ApplyOutcome::Stacked(existing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{EffectDuration, StackMode, StackState, Stacking};
    use crate::model::{CombatId, EffectId};

    fn stack_effect(stacks: u32, max: Option<u32>) -> EffectInstance {
        EffectInstance {
            id: EffectId::new(),
            name: "Bleed".to_string(),
            icon: String::new(),
            status_id: None,
            source_definition_id: Some("bleed".to_string()),
            stacking: Stacking::Stackable(StackState {
                stack_id: "bleed".to_string(),
                max_stacks: max,
                stack_mode: StackMode::Add,
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
            changes: Vec::new(),
        }
    }

    #[test]
    fn test_refresh_takes_longest_duration() {
        let mut existing = stack_effect(1, Some(3));
        existing.remaining_turns = Some(1);
        existing.remaining_rounds = Some(4);
        existing.has_decremented_once = true;

        let combat = CombatId::new();
        let mut incoming = stack_effect(1, Some(3));
        incoming.remaining_turns = Some(3);
        incoming.remaining_rounds = Some(2);
        incoming.linked_combat_id = Some(combat);
        incoming.start_round = Some(5);
        incoming.start_turn = Some(2);
        incoming.origin = Some(ActorId::new());

        refresh_stack(&mut existing, &incoming, ActorId::new()).unwrap();

        assert_eq!(existing.stacks(), 2);
        assert_eq!(existing.remaining_turns, Some(3));
        assert_eq!(existing.remaining_rounds, Some(4));
        assert_eq!(existing.origin, incoming.origin);
        assert_eq!(existing.start_round, Some(5));
        assert_eq!(existing.start_turn, Some(2));
        assert_eq!(existing.linked_combat_id, Some(combat));
        assert!(!existing.has_decremented_once);
    }

    #[test]
    fn test_refresh_rejects_at_capacity_without_mutation() {
        let mut existing = stack_effect(3, Some(3));
        existing.remaining_turns = Some(1);
        let before = existing.clone();

        let mut incoming = stack_effect(1, Some(3));
        incoming.remaining_turns = Some(5);

        let err = refresh_stack(&mut existing, &incoming, ActorId::new()).unwrap_err();
        assert_eq!(err.max_stacks, 3);
        assert_eq!(err.stack_id, "bleed");
        assert_eq!(existing, before);
    }

    #[test]
    fn test_unbounded_stack_keeps_growing() {
        let mut existing = stack_effect(1, None);
        let incoming = stack_effect(1, None);
        for _ in 0..10 {
            refresh_stack(&mut existing, &incoming, ActorId::new()).unwrap();
        }
        assert_eq!(existing.stacks(), 11);
    }

    #[test]
    fn test_origin_kept_when_new_caster_unknown() {
        let caster = ActorId::new();
        let mut existing = stack_effect(1, None);
        existing.origin = Some(caster);
        refresh_stack(&mut existing, &stack_effect(1, None), ActorId::new()).unwrap();
        assert_eq!(existing.origin, Some(caster));
    }
}
