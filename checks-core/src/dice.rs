//! Dice formulas and the die roller collaborator.
//!
//! Supports the notation the pipeline emits: `XdY`, keep highest/lowest
//! (`3d6kh2`, `3d6kl2`) and flat terms (`2d6+3`). Dropped dice are never
//! discarded; they stay in the [`DiceRoll`] with `active = false`.

use crate::error::ValidationError;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;

/// Most dice a single term may roll.
pub const MAX_DICE: u32 = 1_000;
/// Largest die size accepted.
pub const MAX_SIDES: u32 = 1_000;
/// Largest absolute flat modifier accepted.
pub const MAX_MODIFIER: i32 = 1_000_000;

/// Error type for dice parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
    #[error("Dice formula out of range: {0}")]
    OutOfRange(String),
    #[error("Cannot keep {keep} dice when only rolling {count} (in {notation})")]
    InvalidKeepCount {
        keep: u32,
        count: u32,
        notation: String,
    },
}

/// Failure reported by a [`DieRoller`].
#[derive(Debug, Error)]
pub enum RollerError {
    #[error("Bad formula: {0}")]
    Formula(#[from] DiceError),
    #[error("Die roller failed: {0}")]
    Failed(String),
}

/// Advantage state for 2d6 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage) => Advantage::Normal,
            (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (Advantage::Advantage, Advantage::Advantage) => Advantage::Advantage,
            (Advantage::Disadvantage, Advantage::Disadvantage) => Advantage::Disadvantage,
        }
    }

    /// The base 2d6 formula for this advantage state.
    pub fn base_formula(&self) -> &'static str {
        match self {
            Advantage::Normal => "2d6",
            Advantage::Advantage => "3d6kh2",
            Advantage::Disadvantage => "3d6kl2",
        }
    }
}

/// Keep rule attached to a dice term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keep {
    Highest(u32),
    Lowest(u32),
}

/// A single `XdY` term of a dice expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceTerm {
    pub count: u32,
    pub sides: u32,
    pub keep: Option<Keep>,
}

/// A complete dice expression (e.g., `3d6kh2+4`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub terms: Vec<DiceTerm>,
    pub modifier: i32,
    pub original: String,
}

impl DiceExpression {
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut terms = Vec::new();
        let mut modifier: i32 = 0;
        let mut current = String::new();
        let mut sign: i32 = 1;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_term(&current, sign, &mut terms, &mut modifier)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                }
                ' ' => continue,
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_term(&current, sign, &mut terms, &mut modifier)?;
        }

        if terms.is_empty() {
            return Err(DiceError::NoDice);
        }

        Ok(DiceExpression {
            terms,
            modifier,
            original: notation,
        })
    }

    fn parse_term(
        s: &str,
        sign: i32,
        terms: &mut Vec<DiceTerm>,
        modifier: &mut i32,
    ) -> Result<(), DiceError> {
        let invalid = || DiceError::InvalidNotation(s.to_string());

        let Some(d_pos) = s.find('d') else {
            let value: i32 = s.parse().map_err(|_| invalid())?;
            *modifier = modifier
                .checked_add(sign * value)
                .filter(|m| m.abs() <= MAX_MODIFIER)
                .ok_or_else(|| DiceError::OutOfRange(s.to_string()))?;
            return Ok(());
        };

        if sign < 0 {
            return Err(invalid());
        }

        let count_str = &s[..d_pos];
        let rest = &s[d_pos + 1..];

        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str.parse().map_err(|_| invalid())?
        };
        if count == 0 {
            return Err(DiceError::NoDice);
        }
        if count > MAX_DICE {
            return Err(DiceError::OutOfRange(s.to_string()));
        }

        let (sides_str, keep) = if let Some(kh_pos) = rest.find("kh") {
            let keep: u32 = rest[kh_pos + 2..].parse().map_err(|_| invalid())?;
            (&rest[..kh_pos], Some(Keep::Highest(keep)))
        } else if let Some(kl_pos) = rest.find("kl") {
            let keep: u32 = rest[kl_pos + 2..].parse().map_err(|_| invalid())?;
            (&rest[..kl_pos], Some(Keep::Lowest(keep)))
        } else {
            (rest, None)
        };

        let sides: u32 = sides_str.parse().map_err(|_| invalid())?;
        if !(2..=MAX_SIDES).contains(&sides) {
            return Err(DiceError::InvalidDieSize(sides));
        }

        if let Some(Keep::Highest(k) | Keep::Lowest(k)) = keep {
            if k > count {
                return Err(DiceError::InvalidKeepCount {
                    keep: k,
                    count,
                    notation: s.to_string(),
                });
            }
        }

        terms.push(DiceTerm { count, sides, keep });
        Ok(())
    }

    /// Evaluate the expression, drawing each face from `next_face(sides)`.
    ///
    /// Faces are recorded in roll order; keep rules only flip `active`.
    pub fn evaluate_with<F>(&self, mut next_face: F) -> DiceRoll
    where
        F: FnMut(u32) -> u32,
    {
        let mut dice = Vec::new();

        for term in &self.terms {
            let start = dice.len();
            for _ in 0..term.count {
                dice.push(DieResult {
                    sides: term.sides,
                    face: next_face(term.sides),
                    active: true,
                });
            }

            if let Some(keep) = term.keep {
                let rolled = &mut dice[start..];
                let mut order: Vec<usize> = (0..rolled.len()).collect();
                let kept = match keep {
                    Keep::Highest(k) => {
                        order.sort_by(|&a, &b| rolled[b].face.cmp(&rolled[a].face));
                        k
                    }
                    Keep::Lowest(k) => {
                        order.sort_by(|&a, &b| rolled[a].face.cmp(&rolled[b].face));
                        k
                    }
                };
                for &index in order.iter().skip(kept as usize) {
                    rolled[index].active = false;
                }
            }
        }

        let dice_total: i32 = dice
            .iter()
            .filter(|d| d.active)
            .map(|d| d.face as i32)
            .sum();

        DiceRoll {
            formula: self.original.clone(),
            dice,
            modifier: self.modifier,
            total: dice_total + self.modifier,
        }
    }

    /// Roll with a specific RNG.
    pub fn roll_with_rng<R: Rng>(&self, rng: &mut R) -> DiceRoll {
        self.evaluate_with(|sides| rng.gen_range(1..=sides))
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// One rolled die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieResult {
    pub sides: u32,
    pub face: u32,
    /// False when a keep rule dropped this die.
    pub active: bool,
}

/// The outcome of evaluating a dice formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    pub formula: String,
    pub dice: Vec<DieResult>,
    pub modifier: i32,
    pub total: i32,
}

impl DiceRoll {
    /// Faces of every rolled die, dropped ones included.
    pub fn faces(&self) -> Vec<u32> {
        self.dice.iter().map(|d| d.face).collect()
    }

    pub fn active_faces(&self) -> Vec<u32> {
        self.dice.iter().filter(|d| d.active).map(|d| d.face).collect()
    }

    pub fn dropped_faces(&self) -> Vec<u32> {
        self.dice.iter().filter(|d| !d.active).map(|d| d.face).collect()
    }

    /// Check the outcome is internally consistent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.dice.is_empty() {
            return Err(ValidationError::InvalidRoll(format!(
                "{} rolled no dice",
                self.formula
            )));
        }
        if let Some(die) = self
            .dice
            .iter()
            .find(|d| d.face == 0 || d.face > d.sides)
        {
            return Err(ValidationError::InvalidRoll(format!(
                "face {} is impossible on a d{}",
                die.face, die.sides
            )));
        }
        let expected: i64 = self
            .active_faces()
            .iter()
            .map(|&f| i64::from(f))
            .sum::<i64>()
            + i64::from(self.modifier);
        if expected != i64::from(self.total) {
            return Err(ValidationError::InvalidRoll(format!(
                "total {} does not match kept dice ({expected})",
                self.total
            )));
        }
        Ok(())
    }

    /// Format the individual dice for display; dropped dice in parentheses.
    pub fn dice_display(&self) -> String {
        let shown: Vec<String> = self
            .dice
            .iter()
            .map(|d| {
                if d.active {
                    format!("{}", d.face)
                } else {
                    format!("({})", d.face)
                }
            })
            .collect();

        let dice_str = format!("[{}]", shown.join(", "));
        match self.modifier {
            0 => dice_str,
            m if m > 0 => format!("{dice_str} + {m}"),
            m => format!("{dice_str} - {}", m.abs()),
        }
    }
}

impl fmt::Display for DiceRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.dice_display(), self.total)
    }
}

/// External die roller. Fairness and PRNG quality are its concern.
#[async_trait]
pub trait DieRoller: Send + Sync {
    /// Evaluate a dice formula string.
    async fn evaluate(&self, formula: &str) -> Result<DiceRoll, RollerError>;
}

/// Default roller backed by a seedable [`StdRng`].
pub struct RandomRoller {
    rng: Mutex<StdRng>,
}

impl RandomRoller {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic roller for replays and tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomRoller {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RandomRoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomRoller").finish_non_exhaustive()
    }
}

#[async_trait]
impl DieRoller for RandomRoller {
    async fn evaluate(&self, formula: &str) -> Result<DiceRoll, RollerError> {
        let expr = DiceExpression::parse(formula)?;
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| RollerError::Failed("rng lock poisoned".to_string()))?;
        Ok(expr.roll_with_rng(&mut *rng))
    }
}
