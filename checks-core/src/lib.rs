//! Check resolution and status effects for tabletop RPG systems.
//!
//! This crate provides:
//! - A three-phase check pipeline (prepare, process, render) with
//!   priority-ordered hooks
//! - Success-counting dice pools and 2d6 rolls with three-keep-two advantage
//! - Effect application with stacking, toggling and combat-linked durations
//!
//! Actor data lives in an external document store; the engine reads and
//! writes it through [`ActorDocument`].
//!
//! # Quick Start
//!
//! ```ignore
//! use checks_core::{CheckRequest, Checks, EngineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let checks = Checks::with_random_roller(Arc::new(EngineConfig::default()));
//!
//!     let rendered = checks
//!         .attribute_check(CheckRequest::new(&actor).with_primary("might"))
//!         .await?;
//!     println!("{} successes", rendered.result.final_result);
//!     Ok(())
//! }
//! ```

pub mod actor;
pub mod config;
pub mod dice;
pub mod effects;
pub mod error;
pub mod formula;
pub mod hooks;
pub mod model;
pub mod pipeline;
pub mod systems;
pub mod testing;

// Primary public API
pub use actor::{ActorDocument, Item, ItemKind, Skill, StoreError, Target};
pub use config::{EngineConfig, CONFIG_VERSION};
pub use dice::{Advantage, DiceRoll, DieRoller, RandomRoller};
pub use effects::{
    ApplyOptions, ApplyOutcome, CombatClock, DurationReport, EffectData, EffectInstance,
    EffectProcessor, StackMode,
};
pub use error::{CheckError, ConfigError, EffectError, ValidationError};
pub use hooks::{hook_fn, Hook, HookError, HookFlow, HookMode};
pub use model::{Check, CheckResult, CheckType, DiceSystem, Modifier, AUTO_SUCCESS};
pub use pipeline::{CheckRequest, Checks, RenderedCheck, Section};
