//! 2d6 total-based resolution for accuracy and initiative checks.

use super::{count_ones, has_critical_pair};
use crate::actor::{ActorDocument, Item, ItemKind};
use crate::dice::{Advantage, DieRoller};
use crate::error::{CheckError, ValidationError};
use crate::formula::FormulaError;
use crate::model::{
    Check, CheckResult, CheckType, TargetOutcome, TargetResult, AUTO_SUCCESS, INFINITY_KEY,
};
use serde_json::json;

/// Set the base roll and the flat bonus.
///
/// Initiative rolls `initiative_attribute` unless the check names a primary
/// attribute.
pub fn prepare(
    check: &mut Check,
    actor: &dyn ActorDocument,
    initiative_attribute: &str,
) -> Result<(), ValidationError> {
    sync_base_roll(check);

    let flat_bonus = match check.check_type {
        CheckType::Accuracy => {
            let item = check
                .item
                .as_ref()
                .ok_or(ValidationError::MissingField("item"))?;
            accuracy_bonus(item, actor)?
        }
        _ => {
            let attribute = check
                .primary
                .get_or_insert_with(|| initiative_attribute.to_string());
            actor
                .attribute_tick(attribute)
                .ok_or_else(|| ValidationError::UnknownAttribute(attribute.clone()))?
        }
    };

    check.flat_bonus = Some(flat_bonus);
    Ok(())
}

/// Point `base_roll` at the formula for the check's advantage state.
///
/// Runs again after the prepare hooks and the configure callback, which may
/// change `advantage`.
pub fn sync_base_roll(check: &mut Check) {
    let advantage = check.advantage.unwrap_or_default();
    check.base_roll = Some(advantage.base_formula().to_string());
}

fn bonus_overflow() -> ValidationError {
    ValidationError::InvalidResult("accuracy bonus overflows".to_string())
}

fn accuracy_bonus(item: &Item, actor: &dyn ActorDocument) -> Result<i32, ValidationError> {
    let mut bonus = item
        .accuracy_bonus()
        .checked_add(actor.stat_mod(item.kind.accuracy_stat()))
        .ok_or_else(bonus_overflow)?;

    if let Some(formula) = &item.bonus_formula {
        let tick = match item.attribute.as_deref() {
            Some(key) => actor
                .attribute_tick(key)
                .ok_or_else(|| ValidationError::UnknownAttribute(key.to_string()))?,
            None => 0,
        };
        let extra = formula.evaluate(i64::from(tick))?;
        let extra = i32::try_from(extra).map_err(|_| FormulaError::Overflow)?;
        bonus = bonus.checked_add(extra).ok_or_else(bonus_overflow)?;
    }
    Ok(bonus)
}

fn formula_with_bonus(base: &str, bonus: i32) -> String {
    match bonus {
        0 => base.to_string(),
        b if b > 0 => format!("{base}+{b}"),
        b => format!("{base}-{}", b.unsigned_abs()),
    }
}

/// Roll, total and classify the check, then resolve every target.
pub async fn process(
    check: &Check,
    result: &mut CheckResult,
    roller: &dyn DieRoller,
) -> Result<(), CheckError> {
    let base = check
        .base_roll
        .as_deref()
        .ok_or(ValidationError::MissingField("base_roll"))?;
    let flat_bonus = check
        .flat_bonus
        .ok_or(ValidationError::MissingField("flat_bonus"))?;

    let bonus = flat_bonus
        .checked_add(result.modifier_total)
        .ok_or_else(|| ValidationError::InvalidResult("2d6 bonus overflows".to_string()))?;
    let formula = formula_with_bonus(base, bonus);
    let roll = roller.evaluate(&formula).await?;

    // Advantage must not hide a critical by dropping the matching die.
    let crit_faces = match check.advantage.unwrap_or_default() {
        Advantage::Advantage => roll.faces(),
        Advantage::Normal | Advantage::Disadvantage => roll.active_faces(),
    };
    let infinity = check.item.as_ref().is_some_and(|i| i.is_infinity);

    result.critical = has_critical_pair(&crit_faces, check.crit_threshold);
    result.fumble = !infinity && count_ones(&roll.active_faces()) >= 2;
    result.final_result = if infinity { AUTO_SUCCESS } else { roll.total };
    if infinity {
        result
            .additional_data
            .insert(INFINITY_KEY.to_string(), json!(true));
    }
    result
        .additional_data
        .insert("droppedDice".to_string(), json!(roll.dropped_faces()));
    result
        .additional_data
        .insert("flatBonus".to_string(), json!(flat_bonus));

    let kind = check.item.as_ref().map_or(ItemKind::Weapon, |i| i.kind);
    result.targeted_individuals = check
        .targets
        .iter()
        .map(|target| TargetResult {
            actor: target.actor,
            token: target.token,
            result: if result.critical {
                TargetOutcome::Crit
            } else if result.fumble {
                TargetOutcome::Fumble
            } else if result.final_result >= target.defense_against(kind) {
                TargetOutcome::Hit
            } else {
                TargetOutcome::Miss
            },
        })
        .collect();

    tracing::debug!(
        check = %check.id,
        formula = %formula,
        total = roll.total,
        critical = result.critical,
        fumble = result.fumble,
        infinity,
        "2d6 resolved"
    );
    result.roll = Some(roll);
    Ok(())
}
