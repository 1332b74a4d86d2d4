//! Success-counting d6 pool for attribute and skill checks.
//!
//! The pool size grows with the character; the result is the number of dice
//! showing 4, 5 or 6, so outcomes stay comparable across pool sizes.

use super::{count_ones, has_critical_pair};
use crate::actor::ActorDocument;
use crate::dice::DieRoller;
use crate::error::{CheckError, ValidationError};
use crate::model::{Check, CheckResult, CheckType, PoolDice};
use serde_json::json;
use std::ops::RangeInclusive;

/// Faces that count as a success.
pub const SUCCESS_FACES: RangeInclusive<u32> = 4..=6;

/// Number of successes among `faces`.
pub fn count_successes(faces: &[u32]) -> usize {
    faces.iter().filter(|&&f| SUCCESS_FACES.contains(&f)).count()
}

/// No successes and at least two ones.
pub fn is_fumble(faces: &[u32]) -> bool {
    count_successes(faces) == 0 && count_ones(faces) >= 2
}

fn tick(actor: &dyn ActorDocument, key: &str) -> Result<i32, ValidationError> {
    actor
        .attribute_tick(key)
        .ok_or_else(|| ValidationError::UnknownAttribute(key.to_string()))
}

/// Fill in the pool dice from the actor's attributes and the skill.
pub fn prepare(check: &mut Check, actor: &dyn ActorDocument) -> Result<(), ValidationError> {
    let pool = match check.check_type {
        CheckType::Skill => {
            let skill = check
                .skill
                .as_ref()
                .ok_or(ValidationError::MissingField("skill"))?;
            let attribute = check.primary.as_deref().unwrap_or(&skill.attribute);
            PoolDice {
                primary: skill.ticks,
                secondary: tick(actor, attribute)?,
            }
        }
        _ => {
            let primary = check
                .primary
                .as_deref()
                .ok_or(ValidationError::MissingField("primary"))?;
            let secondary = match check.secondary.as_deref() {
                Some(key) => tick(actor, key)?,
                None => 0,
            };
            PoolDice {
                primary: tick(actor, primary)?,
                secondary,
            }
        }
    };

    check.pool = Some(pool);
    Ok(())
}

/// Roll the pool and classify the outcome.
pub async fn process(
    check: &Check,
    result: &mut CheckResult,
    roller: &dyn DieRoller,
) -> Result<(), CheckError> {
    let pool = check.pool.ok_or(ValidationError::MissingField("pool"))?;
    let total_dice = pool
        .base()
        .and_then(|base| base.checked_add(result.modifier_total))
        .ok_or_else(|| ValidationError::InvalidResult("pool size overflows".to_string()))?
        .max(1);
    if total_dice > check.max_pool_dice {
        return Err(ValidationError::PoolTooLarge {
            dice: total_dice,
            max: check.max_pool_dice,
        }
        .into());
    }

    let roll = roller.evaluate(&format!("{total_dice}d6")).await?;
    let faces = roll.faces();
    let successes = count_successes(&faces);

    result.final_result = successes as i32;
    result.critical = has_critical_pair(&faces, check.crit_threshold);
    result.fumble = is_fumble(&faces);
    result
        .additional_data
        .insert("primaryDice".to_string(), json!(pool.primary));
    result
        .additional_data
        .insert("secondaryDice".to_string(), json!(pool.secondary));
    result
        .additional_data
        .insert("totalDice".to_string(), json!(total_dice));

    tracing::debug!(
        check = %check.id,
        dice = total_dice,
        successes,
        critical = result.critical,
        "pool resolved"
    );
    result.roll = Some(roll);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Skill;
    use crate::model::{ActorId, Modifier};
    use crate::testing::{MemoryActor, ScriptedRoller};

    fn actor() -> MemoryActor {
        MemoryActor::new("Aria")
            .with_attribute("might", 3)
            .with_attribute("wits", 2)
    }

    #[test]
    fn test_success_counting() {
        assert_eq!(count_successes(&[1, 2, 3]), 0);
        assert_eq!(count_successes(&[4, 5, 6, 3]), 3);
        assert!(is_fumble(&[1, 1, 3]));
        assert!(!is_fumble(&[1, 1, 4]));
        assert!(!is_fumble(&[1, 2, 3]));
    }

    #[test]
    fn test_prepare_attribute_pool() {
        let actor = actor();
        let mut check = Check::new(CheckType::Attribute, actor.id(), 7);
        check.primary = Some("might".to_string());
        check.secondary = Some("wits".to_string());

        prepare(&mut check, &actor).unwrap();
        assert_eq!(check.pool.unwrap().base(), Some(5));
    }

    #[test]
    fn test_prepare_skill_pool() {
        let actor = actor();
        let mut check = Check::new(CheckType::Skill, actor.id(), 7);
        check.skill = Some(Skill::new("Athletics", 2, "might"));

        prepare(&mut check, &actor).unwrap();
        let pool = check.pool.unwrap();
        assert_eq!(pool.primary, 2);
        assert_eq!(pool.secondary, 3);
    }

    #[test]
    fn test_prepare_unknown_attribute() {
        let actor = actor();
        let mut check = Check::new(CheckType::Attribute, actor.id(), 7);
        check.primary = Some("charm".to_string());

        assert_eq!(
            prepare(&mut check, &actor),
            Err(ValidationError::UnknownAttribute("charm".to_string()))
        );
    }

    #[tokio::test]
    async fn test_modifiers_change_dice_count() {
        let mut check = Check::new(CheckType::Attribute, ActorId::new(), 7);
        check.pool = Some(PoolDice {
            primary: 3,
            secondary: 1,
        });
        check.add_modifier(Modifier::new("Bonus", 2));

        let roller = ScriptedRoller::new([4, 5, 1, 2, 6, 3]);
        let mut result = CheckResult::for_check(&check);
        process(&check, &mut result, &roller).await.unwrap();

        let roll = result.roll.as_ref().unwrap();
        assert_eq!(roll.dice.len(), 6);
        assert_eq!(result.final_result, 3);
        assert!(result.validate().is_ok());
    }

    #[tokio::test]
    async fn test_at_least_one_die() {
        let mut check = Check::new(CheckType::Attribute, ActorId::new(), 7);
        check.pool = Some(PoolDice {
            primary: 1,
            secondary: 0,
        });
        check.add_modifier(Modifier::new("Cursed", -5));

        let roller = ScriptedRoller::new([5]);
        let mut result = CheckResult::for_check(&check);
        process(&check, &mut result, &roller).await.unwrap();

        assert_eq!(result.roll.as_ref().unwrap().dice.len(), 1);
        assert_eq!(result.final_result, 1);
    }

    #[tokio::test]
    async fn test_lowered_threshold_crits() {
        let mut check = Check::new(CheckType::Attribute, ActorId::new(), 5);
        check.pool = Some(PoolDice {
            primary: 3,
            secondary: 0,
        });

        let roller = ScriptedRoller::new([5, 5, 2]);
        let mut result = CheckResult::for_check(&check);
        process(&check, &mut result, &roller).await.unwrap();

        assert!(result.critical);
        assert!(!result.fumble);
    }

    #[tokio::test]
    async fn test_huge_modifier_is_an_error() {
        let mut check = Check::new(CheckType::Attribute, ActorId::new(), 7);
        check.pool = Some(PoolDice {
            primary: 3,
            secondary: 0,
        });
        check.add_modifier(Modifier::new("Overflowing", i32::MAX));

        let roller = ScriptedRoller::new([]);
        let mut result = CheckResult::for_check(&check);
        let err = process(&check, &mut result, &roller).await.unwrap_err();

        assert!(matches!(
            err,
            CheckError::Validation(ValidationError::InvalidResult(_))
        ));
        assert!(roller.formulas().is_empty());
    }

    #[tokio::test]
    async fn test_pool_above_maximum_is_rejected() {
        let mut check = Check::new(CheckType::Attribute, ActorId::new(), 7);
        check.max_pool_dice = 10;
        check.pool = Some(PoolDice {
            primary: 8,
            secondary: 3,
        });

        let roller = ScriptedRoller::new([]);
        let mut result = CheckResult::for_check(&check);
        let err = process(&check, &mut result, &roller).await.unwrap_err();

        assert!(matches!(
            err,
            CheckError::Validation(ValidationError::PoolTooLarge { dice: 11, max: 10 })
        ));
    }
}
