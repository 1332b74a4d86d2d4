//! Error taxonomy for the check pipeline and the effect engine.
//!
//! Validation failures are fatal to the current call. Capacity rejections
//! are not errors at all (see [`crate::effects::ApplyOutcome::AtCapacity`]).
//! Hook failures are swallowed in lenient mode. Collaborator failures (the
//! die roller and the document store) propagate unchanged.

use crate::actor::StoreError;
use crate::dice::{Advantage, RollerError};
use crate::formula::FormulaError;
use crate::hooks::HookError;
use crate::model::{CheckType, DiceSystem};
use thiserror::Error;

/// A malformed Check or CheckResult.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Unknown check type: {0}")]
    UnknownCheckType(String),

    #[error("Check type {check_type} must use dice system {expected}, found {found}")]
    InconsistentDiceSystem {
        check_type: CheckType,
        expected: DiceSystem,
        found: DiceSystem,
    },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Actor has no attribute named {0}")]
    UnknownAttribute(String),

    #[error("Invalid roll: {0}")]
    InvalidRoll(String),

    #[error("Invalid result: {0}")]
    InvalidResult(String),

    #[error("Base roll {base_roll} does not match advantage state {advantage:?}")]
    BaseRollMismatch {
        base_roll: String,
        advantage: Advantage,
    },

    #[error("Pool of {dice} dice exceeds the maximum of {max}")]
    PoolTooLarge { dice: i32, max: i32 },

    #[error("Invalid formula: {0}")]
    Formula(#[from] FormulaError),
}

/// Errors from check pipeline operations.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Die roller error: {0}")]
    Roller(#[from] RollerError),

    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from effect application and duration bookkeeping.
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    #[error("Invalid effect document: {0}")]
    Document(#[from] serde_json::Error),
}

/// Errors from loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}
