//! Prepare phase: build and validate a [`Check`] from a request.

use super::CheckRequest;
use crate::config::EngineConfig;
use crate::error::CheckError;
use crate::hooks::HookRegistry;
use crate::model::{Check, CheckType, DiceSystem};
use crate::systems::{d6, pool};

/// Build a check, let the dice subsystem and prepare hooks fill it in, then
/// apply the request's configure callback last.
pub(crate) async fn prepare(
    check_type: CheckType,
    request: CheckRequest<'_>,
    config: &EngineConfig,
    hooks: &mut HookRegistry<CheckType, Check>,
) -> Result<Check, CheckError> {
    let CheckRequest {
        actor,
        primary,
        secondary,
        skill,
        item,
        advantage,
        targets,
        roll,
        modifiers,
        configure,
    } = request;

    let threshold = actor
        .crit_threshold()
        .unwrap_or(config.default_crit_threshold);
    let mut check = Check::new(check_type, actor.id(), threshold);
    check.max_pool_dice = config.max_pool_dice;
    check.primary = primary;
    check.secondary = secondary;
    check.skill = skill;
    check.item = item;
    check.advantage = Some(advantage);
    check.targets = targets;
    check.roll = roll;
    for modifier in modifiers {
        check.add_modifier(modifier);
    }

    match check.dice_system {
        DiceSystem::Pool => pool::prepare(&mut check, actor)?,
        DiceSystem::D6 => d6::prepare(&mut check, actor, &config.initiative_attribute)?,
        DiceSystem::Display => {}
    }

    let report = hooks.run_all(check_type, &mut check).await?;
    if let Some(configure) = configure {
        configure(&mut check);
    }
    if DiceSystem::for_type(check_type) == DiceSystem::D6 {
        d6::sync_base_roll(&mut check);
    }
    check.validate()?;

    tracing::debug!(
        check = %check.id,
        check_type = %check_type,
        hooks = report.ran,
        modifiers = check.modifiers().len(),
        "check prepared"
    );
    Ok(check)
}
