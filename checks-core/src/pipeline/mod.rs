//! The three-phase check pipeline.
//!
//! Every check runs Prepare → Process → Render strictly in order:
//!
//! - **Prepare** builds a [`Check`] from a [`CheckRequest`], lets the dice
//!   subsystem fill in its dice, runs prepare hooks, applies the request's
//!   configure callback and validates the result.
//! - **Process** rolls, classifies the outcome, runs process hooks and
//!   validates the [`CheckResult`].
//! - **Render** collects display sections from render hooks.
//!
//! Hooks are registered once on [`Checks`] and run one-shot against a fresh
//! copy for every check, so a check never sees hooks drained by another.

mod prepare;
mod process;
mod render;

pub use render::{RenderedCheck, Section, SUMMARY_ORDER};

use crate::actor::{ActorDocument, Item, Skill, Target};
use crate::config::EngineConfig;
use crate::dice::{Advantage, DiceRoll, DieRoller, RandomRoller};
use crate::error::CheckError;
use crate::hooks::{Hook, HookMode, HookRegistry};
use crate::model::{Check, CheckResult, CheckType, Modifier};
use std::fmt;
use std::sync::Arc;

type Configure<'a> = Box<dyn FnOnce(&mut Check) + Send + 'a>;

/// Inputs for one check.
pub struct CheckRequest<'a> {
    actor: &'a dyn ActorDocument,
    primary: Option<String>,
    secondary: Option<String>,
    skill: Option<Skill>,
    item: Option<Item>,
    advantage: Advantage,
    targets: Vec<Target>,
    roll: Option<DiceRoll>,
    modifiers: Vec<Modifier>,
    configure: Option<Configure<'a>>,
}

impl<'a> CheckRequest<'a> {
    pub fn new(actor: &'a dyn ActorDocument) -> Self {
        Self {
            actor,
            primary: None,
            secondary: None,
            skill: None,
            item: None,
            advantage: Advantage::Normal,
            targets: Vec::new(),
            roll: None,
            modifiers: Vec::new(),
            configure: None,
        }
    }

    /// Set the primary attribute.
    pub fn with_primary(mut self, attribute: impl Into<String>) -> Self {
        self.primary = Some(attribute.into());
        self
    }

    /// Set the secondary attribute.
    pub fn with_secondary(mut self, attribute: impl Into<String>) -> Self {
        self.secondary = Some(attribute.into());
        self
    }

    pub fn with_skill(mut self, skill: Skill) -> Self {
        self.skill = Some(skill);
        self
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.item = Some(item);
        self
    }

    /// Combine with the current advantage state.
    pub fn with_advantage(mut self, advantage: Advantage) -> Self {
        self.advantage = self.advantage.combine(advantage);
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    /// Existing roll shown by a display check.
    pub fn with_roll(mut self, roll: DiceRoll) -> Self {
        self.roll = Some(roll);
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Callback run on the check after the prepare hooks.
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut Check) + Send + 'a,
    {
        self.configure = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for CheckRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRequest")
            .field("actor", &self.actor.id())
            .field("primary", &self.primary)
            .field("secondary", &self.secondary)
            .field("skill", &self.skill)
            .field("item", &self.item)
            .field("advantage", &self.advantage)
            .field("targets", &self.targets.len())
            .field("configure", &self.configure.is_some())
            .finish()
    }
}

/// Hook templates for the three phases, keyed by check type.
#[derive(Debug, Clone)]
pub struct CheckHooks {
    prepare: HookRegistry<CheckType, Check>,
    process: HookRegistry<CheckType, CheckResult>,
    render: HookRegistry<CheckType, RenderedCheck>,
}

impl CheckHooks {
    pub fn new(mode: HookMode) -> Self {
        Self {
            prepare: HookRegistry::new(mode),
            process: HookRegistry::new(mode),
            render: HookRegistry::new(mode),
        }
    }

    pub fn on_prepare(
        &mut self,
        check_type: CheckType,
        hook: Arc<dyn Hook<Check>>,
        priority: i32,
    ) -> &mut Self {
        self.prepare.register(check_type, hook, priority);
        self
    }

    pub fn on_process(
        &mut self,
        check_type: CheckType,
        hook: Arc<dyn Hook<CheckResult>>,
        priority: i32,
    ) -> &mut Self {
        self.process.register(check_type, hook, priority);
        self
    }

    pub fn on_render(
        &mut self,
        check_type: CheckType,
        hook: Arc<dyn Hook<RenderedCheck>>,
        priority: i32,
    ) -> &mut Self {
        self.render.register(check_type, hook, priority);
        self
    }
}

/// Entry point for performing checks.
pub struct Checks {
    config: Arc<EngineConfig>,
    roller: Arc<dyn DieRoller>,
    hooks: CheckHooks,
}

impl Checks {
    pub fn new(config: Arc<EngineConfig>, roller: Arc<dyn DieRoller>) -> Self {
        let hooks = CheckHooks::new(config.hook_mode);
        Self {
            config,
            roller,
            hooks,
        }
    }

    /// Pipeline rolling with an entropy-seeded [`RandomRoller`].
    pub fn with_random_roller(config: Arc<EngineConfig>) -> Self {
        Self::new(config, Arc::new(RandomRoller::new()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hooks_mut(&mut self) -> &mut CheckHooks {
        &mut self.hooks
    }

    pub async fn attribute_check(
        &self,
        request: CheckRequest<'_>,
    ) -> Result<RenderedCheck, CheckError> {
        self.perform(CheckType::Attribute, request).await
    }

    pub async fn skill_check(
        &self,
        request: CheckRequest<'_>,
    ) -> Result<RenderedCheck, CheckError> {
        self.perform(CheckType::Skill, request).await
    }

    pub async fn accuracy_check(
        &self,
        request: CheckRequest<'_>,
    ) -> Result<RenderedCheck, CheckError> {
        self.perform(CheckType::Accuracy, request).await
    }

    pub async fn initiative_check(
        &self,
        request: CheckRequest<'_>,
    ) -> Result<RenderedCheck, CheckError> {
        self.perform(CheckType::Initiative, request).await
    }

    /// Show an existing roll (or nothing) through the render phase.
    pub async fn display_check(
        &self,
        request: CheckRequest<'_>,
    ) -> Result<RenderedCheck, CheckError> {
        self.perform(CheckType::Display, request).await
    }

    /// Run all three phases for `check_type`.
    pub async fn perform(
        &self,
        check_type: CheckType,
        request: CheckRequest<'_>,
    ) -> Result<RenderedCheck, CheckError> {
        let mut hooks = self.hooks.clone();

        let check = prepare::prepare(check_type, request, &self.config, &mut hooks.prepare).await?;
        let result = process::process(&check, self.roller.as_ref(), &mut hooks.process, None).await?;
        render::render(check, result, &mut hooks.render).await
    }

    /// Like [`Checks::perform`], with the check type given by name.
    pub async fn perform_named(
        &self,
        type_name: &str,
        request: CheckRequest<'_>,
    ) -> Result<RenderedCheck, CheckError> {
        let check_type: CheckType = type_name.parse()?;
        self.perform(check_type, request).await
    }

    /// Roll a rendered check again.
    ///
    /// The prepared check is reused as is; the new result gets a fresh id and
    /// points back at the result it supersedes.
    pub async fn reroll(&self, previous: &RenderedCheck) -> Result<RenderedCheck, CheckError> {
        let mut hooks = self.hooks.clone();
        let check = previous.check.clone();

        let result = process::process(
            &check,
            self.roller.as_ref(),
            &mut hooks.process,
            Some(previous.result.id),
        )
        .await?;
        tracing::info!(check = %check.id, supersedes = %previous.result.id, "check rerolled");
        render::render(check, result, &mut hooks.render).await
    }

    /// Run only the render phase for an existing result.
    pub async fn render(
        &self,
        check: &Check,
        result: &CheckResult,
    ) -> Result<RenderedCheck, CheckError> {
        let mut hooks = self.hooks.render.clone();
        render::render(check.clone(), result.clone(), &mut hooks).await
    }
}

impl fmt::Debug for Checks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checks")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::hooks::{hook_fn, HookFlow};
    use crate::model::{DiceSystem, Modifier};
    use crate::testing::{MemoryActor, ScriptedRoller};

    fn checks(faces: &[u32]) -> (Checks, Arc<ScriptedRoller>) {
        let roller = Arc::new(ScriptedRoller::new(faces.iter().copied()));
        let checks = Checks::new(Arc::new(EngineConfig::default()), roller.clone());
        (checks, roller)
    }

    fn hero() -> MemoryActor {
        MemoryActor::new("Aria")
            .with_attribute("might", 2)
            .with_attribute("dexterity", 3)
    }

    #[tokio::test]
    async fn test_attribute_check_end_to_end() {
        let (checks, roller) = checks(&[6, 1]);
        let actor = hero();

        let rendered = checks
            .attribute_check(CheckRequest::new(&actor).with_primary("might"))
            .await
            .unwrap();
        assert_eq!(rendered.check.dice_system, DiceSystem::Pool);
        assert_eq!(rendered.result.final_result, 1);
        assert_eq!(roller.formulas(), vec!["2d6".to_string()]);
    }

    #[tokio::test]
    async fn test_configure_runs_after_prepare_hooks() {
        let (mut checks, roller) = checks(&[4, 4, 4, 4]);
        checks.hooks_mut().on_prepare(
            CheckType::Attribute,
            hook_fn("blessing", |check: &mut Check| {
                check.add_modifier(Modifier::new("Blessing", 1));
                Ok(HookFlow::Continue)
            }),
            0,
        );
        let actor = hero();

        let rendered = checks
            .attribute_check(
                CheckRequest::new(&actor)
                    .with_primary("might")
                    .configure(|check| {
                        assert_eq!(check.modifiers().len(), 1);
                        check.add_modifier(Modifier::new("Help", 1));
                    }),
            )
            .await
            .unwrap();
        assert_eq!(rendered.result.modifier_total, 2);
        assert_eq!(roller.formulas(), vec!["4d6".to_string()]);
    }

    #[tokio::test]
    async fn test_hooks_reused_across_checks() {
        let (mut checks, _) = checks(&[3, 3, 3, 3]);
        checks.hooks_mut().on_process(
            CheckType::Initiative,
            hook_fn("observe", |result: &mut CheckResult| {
                result
                    .additional_data
                    .insert("observed".to_string(), serde_json::json!(true));
                Ok(HookFlow::Continue)
            }),
            0,
        );
        let actor = hero();

        for _ in 0..2 {
            let rendered = checks
                .initiative_check(CheckRequest::new(&actor))
                .await
                .unwrap();
            assert_eq!(rendered.result.final_result, 9);
            assert!(rendered.result.additional_data.contains_key("observed"));
        }
    }

    #[tokio::test]
    async fn test_perform_named_unknown_type() {
        let (checks, _) = checks(&[]);
        let actor = hero();

        let err = checks
            .perform_named("damage", CheckRequest::new(&actor))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckError::Validation(ValidationError::UnknownCheckType(name)) if name == "damage"
        ));
    }

    #[tokio::test]
    async fn test_configure_cannot_break_dice_system() {
        let (checks, _) = checks(&[4, 4]);
        let actor = hero();

        let err = checks
            .attribute_check(
                CheckRequest::new(&actor)
                    .with_primary("might")
                    .configure(|check| check.dice_system = DiceSystem::D6),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckError::Validation(ValidationError::InconsistentDiceSystem { .. })
        ));
    }

    #[tokio::test]
    async fn test_accuracy_requires_item() {
        let (checks, _) = checks(&[4, 4]);
        let actor = hero();

        let err = checks
            .accuracy_check(CheckRequest::new(&actor))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckError::Validation(ValidationError::MissingField("item"))
        ));
    }

    #[tokio::test]
    async fn test_display_with_and_without_roll() {
        let (checks, _) = checks(&[]);
        let actor = hero();

        let empty = checks
            .display_check(CheckRequest::new(&actor))
            .await
            .unwrap();
        assert_eq!(empty.result.final_result, 0);
        assert!(empty.result.roll.is_none());

        let roll = crate::dice::DiceExpression::parse("2d6+1")
            .unwrap()
            .evaluate_with(|_| 3);
        let shown = checks
            .display_check(CheckRequest::new(&actor).with_roll(roll.clone()))
            .await
            .unwrap();
        assert_eq!(shown.result.final_result, 7);
        assert_eq!(shown.result.roll, Some(roll));
    }
}
