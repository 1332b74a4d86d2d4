//! Check data model: ids, modifiers, checks and their results.

use crate::actor::{Item, Skill, Target};
use crate::dice::{Advantage, DiceRoll};
use crate::error::ValidationError;
use crate::systems;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for checks and check results.
    CheckId
);
uuid_id!(
    /// Unique identifier for actors (characters, NPCs).
    ActorId
);
uuid_id!(
    /// Unique identifier for items.
    ItemId
);
uuid_id!(
    /// Unique identifier for tokens placed on a scene.
    TokenId
);
uuid_id!(
    /// Unique identifier for effect instances.
    EffectId
);
uuid_id!(
    /// Unique identifier for a combat encounter.
    CombatId
);

/// Final result reported by infinity items: beats any target.
pub const AUTO_SUCCESS: i32 = i32::MAX;

/// `additional_data` key marking a result produced by an infinity item.
pub const INFINITY_KEY: &str = "infinity";

/// Largest dice pool rolled unless configured otherwise.
pub const DEFAULT_MAX_POOL_DICE: i32 = 100;

// ============================================================================
// Check Types
// ============================================================================

/// The kind of check being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckType {
    Attribute,
    Skill,
    Accuracy,
    Initiative,
    Display,
}

impl CheckType {
    pub fn all() -> [CheckType; 5] {
        [
            CheckType::Attribute,
            CheckType::Skill,
            CheckType::Accuracy,
            CheckType::Initiative,
            CheckType::Display,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            CheckType::Attribute => "attribute",
            CheckType::Skill => "skill",
            CheckType::Accuracy => "accuracy",
            CheckType::Initiative => "initiative",
            CheckType::Display => "display",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CheckType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        CheckType::all()
            .into_iter()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| ValidationError::UnknownCheckType(s.to_string()))
    }
}

/// Resolution strategy. Always derived from [`CheckType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiceSystem {
    /// Success-counting d6 pool.
    Pool,
    /// 2d6 total, three-keep-two with advantage.
    D6,
    /// No resolution; shows an existing roll.
    Display,
}

impl DiceSystem {
    pub fn for_type(check_type: CheckType) -> DiceSystem {
        match check_type {
            CheckType::Attribute | CheckType::Skill => DiceSystem::Pool,
            CheckType::Accuracy | CheckType::Initiative => DiceSystem::D6,
            CheckType::Display => DiceSystem::Display,
        }
    }
}

impl fmt::Display for DiceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiceSystem::Pool => write!(f, "pool"),
            DiceSystem::D6 => write!(f, "2d6"),
            DiceSystem::Display => write!(f, "display"),
        }
    }
}

fn check_dice_system(check_type: CheckType, found: DiceSystem) -> Result<(), ValidationError> {
    let expected = DiceSystem::for_type(check_type);
    if expected == found {
        Ok(())
    } else {
        Err(ValidationError::InconsistentDiceSystem {
            check_type,
            expected,
            found,
        })
    }
}

// ============================================================================
// Modifiers
// ============================================================================

/// A labelled bonus or penalty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifier {
    pub label: String,
    pub value: i32,
    pub source: Option<String>,
}

impl Modifier {
    pub fn new(label: impl Into<String>, value: i32) -> Self {
        Self {
            label: label.into(),
            value,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

// ============================================================================
// Check
// ============================================================================

/// Dice contributed to a pool check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDice {
    pub primary: i32,
    pub secondary: i32,
}

impl PoolDice {
    /// Dice before modifiers, or `None` on overflow.
    pub fn base(&self) -> Option<i32> {
        self.primary.checked_add(self.secondary)
    }
}

/// A check being prepared. Mutable until the Process phase starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub id: CheckId,
    pub check_type: CheckType,
    pub dice_system: DiceSystem,
    pub actor: ActorId,
    /// Primary attribute key.
    pub primary: Option<String>,
    /// Secondary attribute key.
    pub secondary: Option<String>,
    pub pool: Option<PoolDice>,
    pub flat_bonus: Option<i32>,
    /// Dice formula for 2d6 checks. Derived from `advantage` once the
    /// prepare hooks and the configure callback have run.
    pub base_roll: Option<String>,
    pub advantage: Option<Advantage>,
    pub crit_threshold: u32,
    /// Pools larger than this are rejected instead of rolled.
    pub max_pool_dice: i32,
    pub item: Option<Item>,
    pub skill: Option<Skill>,
    pub targets: Vec<Target>,
    /// Pre-existing roll shown by Display checks.
    pub roll: Option<DiceRoll>,
    modifiers: Vec<Modifier>,
    pub additional_data: Map<String, Value>,
}

impl Check {
    pub fn new(check_type: CheckType, actor: ActorId, crit_threshold: u32) -> Self {
        Self {
            id: CheckId::new(),
            check_type,
            dice_system: DiceSystem::for_type(check_type),
            actor,
            primary: None,
            secondary: None,
            pool: None,
            flat_bonus: None,
            base_roll: None,
            advantage: None,
            crit_threshold,
            max_pool_dice: DEFAULT_MAX_POOL_DICE,
            item: None,
            skill: None,
            targets: Vec::new(),
            roll: None,
            modifiers: Vec::new(),
            additional_data: Map::new(),
        }
    }

    /// Append a modifier. Modifiers cannot be edited or removed once added.
    pub fn add_modifier(&mut self, modifier: Modifier) -> &mut Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// Sum of all modifiers, saturating at the `i32` bounds.
    ///
    /// [`Check::validate`] rejects checks whose exact sum does not fit.
    pub fn modifier_total(&self) -> i32 {
        self.modifiers
            .iter()
            .fold(0i32, |acc, m| acc.saturating_add(m.value))
    }

    fn checked_modifier_total(&self) -> Option<i32> {
        self.modifiers
            .iter()
            .try_fold(0i32, |acc, m| acc.checked_add(m.value))
    }

    /// Check the invariants the Process phase relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_dice_system(self.check_type, self.dice_system)?;

        match self.dice_system {
            DiceSystem::Pool => {
                if self.pool.is_none() {
                    return Err(ValidationError::MissingField("pool"));
                }
                if self.check_type == CheckType::Skill && self.skill.is_none() {
                    return Err(ValidationError::MissingField("skill"));
                }
            }
            DiceSystem::D6 => {
                let base_roll = self
                    .base_roll
                    .as_deref()
                    .ok_or(ValidationError::MissingField("base_roll"))?;
                let advantage = self.advantage.unwrap_or_default();
                if base_roll != advantage.base_formula() {
                    return Err(ValidationError::BaseRollMismatch {
                        base_roll: base_roll.to_string(),
                        advantage,
                    });
                }
                if self.flat_bonus.is_none() {
                    return Err(ValidationError::MissingField("flat_bonus"));
                }
                if self.check_type == CheckType::Accuracy && self.item.is_none() {
                    return Err(ValidationError::MissingField("item"));
                }
            }
            DiceSystem::Display => {}
        }

        if self.checked_modifier_total().is_none() {
            return Err(ValidationError::InvalidResult(
                "modifier total overflows".to_string(),
            ));
        }
        if let Some(roll) = &self.roll {
            roll.validate()?;
        }
        Ok(())
    }
}

// ============================================================================
// Check Result
// ============================================================================

/// Per-target outcome of an accuracy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOutcome {
    Hit,
    Miss,
    Crit,
    Fumble,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResult {
    pub actor: ActorId,
    pub token: Option<TokenId>,
    pub result: TargetOutcome,
}

/// The resolved outcome of a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: CheckId,
    /// The check this result resolves.
    pub check_id: CheckId,
    /// Set when this result is a reroll of an earlier one.
    pub supersedes: Option<CheckId>,
    pub check_type: CheckType,
    pub dice_system: DiceSystem,
    pub actor: ActorId,
    pub item: Option<ItemId>,
    pub roll: Option<DiceRoll>,
    pub additional_rolls: Vec<DiceRoll>,
    pub modifier_total: i32,
    pub final_result: i32,
    pub critical: bool,
    pub fumble: bool,
    pub targeted_individuals: Vec<TargetResult>,
    pub additional_data: Map<String, Value>,
}

impl CheckResult {
    /// Empty result shell for `check`.
    pub fn for_check(check: &Check) -> Self {
        Self {
            id: check.id,
            check_id: check.id,
            supersedes: None,
            check_type: check.check_type,
            dice_system: check.dice_system,
            actor: check.actor,
            item: check.item.as_ref().map(|i| i.id),
            roll: None,
            additional_rolls: Vec::new(),
            modifier_total: check.modifier_total(),
            final_result: 0,
            critical: false,
            fumble: false,
            targeted_individuals: Vec::new(),
            additional_data: Map::new(),
        }
    }

    /// Check the invariants every emitted result must satisfy.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_dice_system(self.check_type, self.dice_system)?;

        if self.dice_system == DiceSystem::Display {
            if let Some(roll) = &self.roll {
                roll.validate()?;
            }
            return Ok(());
        }

        let roll = self.roll.as_ref().ok_or(ValidationError::MissingField("roll"))?;
        roll.validate()?;

        match self.dice_system {
            DiceSystem::Pool => {
                let successes = systems::pool::count_successes(&roll.faces()) as i32;
                if self.final_result != successes {
                    return Err(ValidationError::InvalidResult(format!(
                        "pool result {} does not match {successes} successes",
                        self.final_result
                    )));
                }
            }
            DiceSystem::D6 => {
                let infinity = self.additional_data.get(INFINITY_KEY) == Some(&Value::Bool(true));
                let expected = if infinity { AUTO_SUCCESS } else { roll.total };
                if self.final_result != expected {
                    return Err(ValidationError::InvalidResult(format!(
                        "2d6 result {} does not match expected {expected}",
                        self.final_result
                    )));
                }
            }
            DiceSystem::Display => {}
        }
        Ok(())
    }
}
