//! Effect application and the clock notifications that age effects.

use super::duration::{self, Tick};
use super::stack;
use super::{
    ApplyOptions, ApplyOutcome, CombatClock, DurationReport, EffectData, EffectInstance,
    StackState, Stacking, StackingRule,
};
use crate::actor::ActorDocument;
use crate::config::EngineConfig;
use crate::error::EffectError;
use crate::hooks::{Hook, HookMode, HookRegistry};
use crate::model::{ActorId, CombatId, EffectId};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Points in effect application where hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectStage {
    /// Before normalization. Abortable.
    PreProcess,
    /// Before a non-stackable effect is created. Abortable.
    PreCreate,
    /// After creation. Observational.
    PostCreate,
}

/// Hook templates for effect application.
#[derive(Debug, Clone)]
pub struct EffectHooks {
    data: HookRegistry<EffectStage, EffectData>,
    instance: HookRegistry<EffectStage, EffectInstance>,
}

impl EffectHooks {
    pub fn new(mode: HookMode) -> Self {
        Self {
            data: HookRegistry::new(mode),
            instance: HookRegistry::new(mode),
        }
    }

    pub fn on_pre_process(&mut self, hook: Arc<dyn Hook<EffectData>>, priority: i32) -> &mut Self {
        self.data.register(EffectStage::PreProcess, hook, priority);
        self
    }

    pub fn on_pre_create(
        &mut self,
        hook: Arc<dyn Hook<EffectInstance>>,
        priority: i32,
    ) -> &mut Self {
        self.instance.register(EffectStage::PreCreate, hook, priority);
        self
    }

    pub fn on_post_create(
        &mut self,
        hook: Arc<dyn Hook<EffectInstance>>,
        priority: i32,
    ) -> &mut Self {
        self.instance.register(EffectStage::PostCreate, hook, priority);
        self
    }
}

/// Per-actor mutation queue.
///
/// Every read-modify-write of one actor's effects goes through that actor's
/// lock, so two applications of the same stack never race.
#[derive(Debug, Default)]
pub struct ActorLocks {
    locks: Mutex<HashMap<ActorId, Arc<Mutex<()>>>>,
}

impl ActorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for `actor`'s turn in the queue.
    ///
    /// Entries nobody holds or waits on are dropped here; the map only keeps
    /// actors with work in flight.
    pub async fn lock(&self, actor: ActorId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|id, lock| *id == actor || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(actor).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of actors currently tracked.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Applies, toggles, stacks and expires effects on actors.
#[derive(Debug)]
pub struct EffectProcessor {
    config: Arc<EngineConfig>,
    hooks: EffectHooks,
    locks: ActorLocks,
}

impl EffectProcessor {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        let hooks = EffectHooks::new(config.hook_mode);
        Self {
            config,
            hooks,
            locks: ActorLocks::new(),
        }
    }

    pub fn hooks_mut(&mut self) -> &mut EffectHooks {
        &mut self.hooks
    }

    /// Apply `data` to `actor`.
    ///
    /// `clock` is the running combat, if any; it links the countdown.
    pub async fn apply_effect(
        &self,
        actor: &dyn ActorDocument,
        mut data: EffectData,
        options: ApplyOptions,
        clock: Option<&CombatClock>,
    ) -> Result<ApplyOutcome, EffectError> {
        let mut data_hooks = self.hooks.data.clone();
        let report = data_hooks
            .run_all(EffectStage::PreProcess, &mut data)
            .await?;
        if let Some(hook) = report.prevented_by {
            return Ok(ApplyOutcome::Prevented {
                stage: EffectStage::PreProcess,
                hook,
            });
        }

        let mut effect = self.normalize(data.clone(), options.origin);

        let guard = self.locks.lock(actor.id()).await;

        if options.toggle && !effect.is_stackable() {
            let existing = actor
                .effects()
                .await?
                .into_iter()
                .find(|e| !e.is_stackable() && e.matches_toggle(&data));
            if let Some(existing) = existing {
                actor.delete_effect(existing.id).await?;
                tracing::info!(actor = %actor.id(), effect = %existing.name, "toggled effect off");
                return Ok(ApplyOutcome::Removed(existing.id));
            }
        }

        if let Some(clock) = clock {
            effect.link_to_combat(clock);
        }

        if effect.is_stackable() {
            return stack::apply_stack(actor, effect).await;
        }

        let mut instance_hooks = self.hooks.instance.clone();
        let report = instance_hooks
            .run_all(EffectStage::PreCreate, &mut effect)
            .await?;
        if let Some(hook) = report.prevented_by {
            return Ok(ApplyOutcome::Prevented {
                stage: EffectStage::PreCreate,
                hook,
            });
        }

        let mut created = actor.create_effect(effect).await?;
        tracing::info!(actor = %actor.id(), effect = %created.name, "effect created");
        drop(guard);

        instance_hooks
            .run_all(EffectStage::PostCreate, &mut created)
            .await?;
        Ok(ApplyOutcome::Created(created))
    }

    /// Delete an effect. Returns false if the actor does not have it.
    pub async fn remove_effect(
        &self,
        actor: &dyn ActorDocument,
        id: EffectId,
    ) -> Result<bool, EffectError> {
        let _guard = self.locks.lock(actor.id()).await;
        if !actor.effects().await?.iter().any(|e| e.id == id) {
            return Ok(false);
        }
        actor.delete_effect(id).await?;
        Ok(true)
    }

    /// A new round began: every holder counts one round off.
    pub async fn on_round_advance(
        &self,
        actors: &[&dyn ActorDocument],
        clock: &CombatClock,
    ) -> Result<DurationReport, EffectError> {
        let reports = try_join_all(
            actors
                .iter()
                .map(|actor| self.tick_actor(*actor, |e| duration::tick_round(e, clock))),
        )
        .await?;
        Ok(merge(reports))
    }

    /// A new turn began: only the actor whose turn it is counts one turn off.
    pub async fn on_turn_advance(
        &self,
        actor: &dyn ActorDocument,
        clock: &CombatClock,
    ) -> Result<DurationReport, EffectError> {
        if clock.current_actor != Some(actor.id()) {
            return Ok(DurationReport::default());
        }
        self.tick_actor(actor, |e| duration::tick_turn(e, clock))
            .await
    }

    /// Combat ended: drop every effect that only lasts for the combat.
    pub async fn on_combat_end(
        &self,
        actors: &[&dyn ActorDocument],
        combat: CombatId,
    ) -> Result<DurationReport, EffectError> {
        let mut report = DurationReport::default();
        for actor in actors {
            let _guard = self.locks.lock(actor.id()).await;
            for effect in actor.effects().await? {
                if duration::ends_with_combat(&effect) {
                    actor.delete_effect(effect.id).await?;
                    report.expired.push(effect);
                }
            }
        }
        tracing::info!(combat = %combat, expired = report.expired.len(), "combat ended");
        Ok(report)
    }

    async fn tick_actor<F>(
        &self,
        actor: &dyn ActorDocument,
        mut tick: F,
    ) -> Result<DurationReport, EffectError>
    where
        F: FnMut(&mut EffectInstance) -> Tick,
    {
        let _guard = self.locks.lock(actor.id()).await;
        let mut report = DurationReport::default();

        for mut effect in actor.effects().await? {
            match tick(&mut effect) {
                Tick::Unchanged => {}
                Tick::Decremented => {
                    actor.update_effect(&effect).await?;
                    report.decremented.push(effect.id);
                }
                Tick::Expired => {
                    actor.delete_effect(effect.id).await?;
                    tracing::debug!(actor = %actor.id(), effect = %effect.name, "effect expired");
                    report.expired.push(effect);
                }
            }
        }
        Ok(report)
    }

    fn normalize(&self, data: EffectData, origin: Option<ActorId>) -> EffectInstance {
        let name = data
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| data.source_definition_id.clone())
            .unwrap_or_else(|| self.config.default_effect_name.clone());
        let icon = data
            .icon
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| self.config.default_effect_icon.clone());

        let stacking = match data.stacking {
            StackingRule::NonStackable => Stacking::NonStackable,
            StackingRule::Stackable {
                stack_id,
                max_stacks,
                stack_mode,
            } => Stacking::Stackable(StackState {
                stack_id,
                max_stacks: max_stacks.filter(|&m| m > 0),
                stack_mode,
                current_stacks: 1,
            }),
        };

        EffectInstance {
            id: EffectId::new(),
            name,
            icon,
            status_id: data.status_id,
            source_definition_id: data.source_definition_id,
            stacking,
            duration: data.duration,
            remaining_turns: data.remaining_turns,
            remaining_rounds: data.remaining_rounds,
            linked_combat_id: None,
            start_round: None,
            start_turn: None,
            has_decremented_once: false,
            last_round_tick: None,
            special_duration: data.special_duration,
            origin,
            changes: data.changes,
        }
    }
}

fn merge(reports: Vec<DurationReport>) -> DurationReport {
    let mut merged = DurationReport::default();
    for report in reports {
        merged.merge(report);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{EffectDuration, StackMode};
    use crate::hooks::{hook_fn, HookFlow};
    use crate::testing::MemoryActor;

    fn processor() -> EffectProcessor {
        EffectProcessor::new(Arc::new(EngineConfig::default()))
    }

    #[tokio::test]
    async fn test_actor_locks_drop_idle_entries() {
        let locks = ActorLocks::new();
        let (first, second, third) = (ActorId::new(), ActorId::new(), ActorId::new());

        drop(locks.lock(first).await);
        let held = locks.lock(second).await;
        assert_eq!(locks.tracked().await, 1);

        let _other = locks.lock(third).await;
        assert_eq!(locks.tracked().await, 2);

        drop(held);
        drop(locks.lock(first).await);
        assert_eq!(locks.tracked().await, 2);
    }

    #[tokio::test]
    async fn test_normalize_fills_defaults() {
        let processor = processor();
        let caster = ActorId::new();
        let effect = processor.normalize(EffectData::default(), Some(caster));

        assert_eq!(effect.name, EngineConfig::default().default_effect_name);
        assert_eq!(effect.icon, EngineConfig::default().default_effect_icon);
        assert_eq!(effect.origin, Some(caster));
        assert!(!effect.is_stackable());
    }

    #[tokio::test]
    async fn test_toggle_removes_matching_effect() {
        let processor = processor();
        let actor = MemoryActor::new("Aria");
        let data = EffectData::named("Guarding").with_status("guard");

        let first = processor
            .apply_effect(&actor, data.clone(), ApplyOptions::default().toggled(), None)
            .await
            .unwrap();
        assert!(matches!(first, ApplyOutcome::Created(_)));

        let second = processor
            .apply_effect(&actor, data, ApplyOptions::default().toggled(), None)
            .await
            .unwrap();
        assert!(matches!(second, ApplyOutcome::Removed(_)));
        assert!(actor.effects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stackable_never_toggles() {
        let processor = processor();
        let actor = MemoryActor::new("Aria");
        let data = EffectData::named("Focus").stackable("focus", Some(3), StackMode::Add);

        for _ in 0..2 {
            processor
                .apply_effect(&actor, data.clone(), ApplyOptions::default().toggled(), None)
                .await
                .unwrap();
        }
        assert_eq!(actor.effect_stack_count("focus").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_pre_process_hook_prevents_without_mutation() {
        let mut processor = processor();
        processor.hooks_mut().on_pre_process(
            hook_fn("immune", |data: &mut EffectData| {
                if data.status_id.as_deref() == Some("stun") {
                    Ok(HookFlow::Prevent)
                } else {
                    Ok(HookFlow::Continue)
                }
            }),
            0,
        );
        let actor = MemoryActor::new("Golem");

        let outcome = processor
            .apply_effect(
                &actor,
                EffectData::named("Stunned").with_status("stun"),
                ApplyOptions::default(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::Prevented {
                stage: EffectStage::PreProcess,
                hook: "immune".to_string()
            }
        );
        assert!(actor.effects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pre_create_hook_can_adjust_and_veto() {
        let mut processor = processor();
        processor.hooks_mut().on_pre_create(
            hook_fn("rename", |effect: &mut EffectInstance| {
                effect.name = format!("{} (empowered)", effect.name);
                Ok(HookFlow::Continue)
            }),
            5,
        );
        let actor = MemoryActor::new("Aria");

        let outcome = processor
            .apply_effect(&actor, EffectData::named("Haste"), ApplyOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(outcome.effect().unwrap().name, "Haste (empowered)");
    }

    #[tokio::test]
    async fn test_combat_links_countdown() {
        let processor = processor();
        let actor = MemoryActor::new("Aria");
        let clock = CombatClock::new(CombatId::new()).at(3, 1);

        let outcome = processor
            .apply_effect(
                &actor,
                EffectData::named("Slow").with_duration(EffectDuration::rounds(2)),
                ApplyOptions::default(),
                Some(&clock),
            )
            .await
            .unwrap();
        let effect = outcome.effect().unwrap();
        assert_eq!(effect.remaining_rounds, Some(2));
        assert_eq!(effect.linked_combat_id, Some(clock.id));
        assert_eq!(effect.start_round, Some(3));
        assert_eq!(effect.start_turn, Some(1));
    }

    #[tokio::test]
    async fn test_remove_effect() {
        let processor = processor();
        let actor = MemoryActor::new("Aria");
        let outcome = processor
            .apply_effect(&actor, EffectData::named("Shield"), ApplyOptions::default(), None)
            .await
            .unwrap();
        let id = outcome.effect().unwrap().id;

        assert!(processor.remove_effect(&actor, id).await.unwrap());
        assert!(!processor.remove_effect(&actor, id).await.unwrap());
    }
}
