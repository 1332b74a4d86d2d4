//! Process phase: roll and classify a prepared check.

use crate::dice::DieRoller;
use crate::error::CheckError;
use crate::hooks::HookRegistry;
use crate::model::{Check, CheckId, CheckResult, CheckType, DiceSystem};
use crate::systems::{d6, pool};

pub(crate) async fn process(
    check: &Check,
    roller: &dyn DieRoller,
    hooks: &mut HookRegistry<CheckType, CheckResult>,
    supersedes: Option<CheckId>,
) -> Result<CheckResult, CheckError> {
    check.validate()?;
    let mut result = CheckResult::for_check(check);
    if let Some(previous) = supersedes {
        result.id = CheckId::new();
        result.supersedes = Some(previous);
    }

    match check.dice_system {
        DiceSystem::Pool => pool::process(check, &mut result, roller).await?,
        DiceSystem::D6 => d6::process(check, &mut result, roller).await?,
        DiceSystem::Display => {
            if let Some(roll) = &check.roll {
                result.final_result = roll.total;
                result.roll = Some(roll.clone());
            }
        }
    }

    hooks.run_all(check.check_type, &mut result).await?;
    result.validate()?;

    tracing::info!(
        check = %check.id,
        result = %result.id,
        check_type = %check.check_type,
        final_result = result.final_result,
        critical = result.critical,
        fumble = result.fumble,
        "check resolved"
    );
    Ok(result)
}
