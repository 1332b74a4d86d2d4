//! The actor document contract and the context types checks read from.
//!
//! Actor data (attributes, stats, embedded effects) lives in an external
//! document store. The engine only sees it through [`ActorDocument`].

use crate::effects::EffectInstance;
use crate::formula::Formula;
use crate::model::{ActorId, EffectId, ItemId, TokenId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stat key whose modifier is added to weapon accuracy.
pub const ACCURACY_STAT: &str = "accuracy";

/// Stat key whose modifier is added to ability and tactic accuracy.
pub const MAGIC_STAT: &str = "magic";

/// Failure reported by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Effect not found: {0}")]
    EffectNotFound(EffectId),

    #[error("Update rejected: {0}")]
    Rejected(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Read and write access to one actor document.
///
/// Reads of attributes and stats are synchronous snapshots; every effect
/// mutation is an awaited store call.
#[async_trait]
pub trait ActorDocument: Send + Sync {
    fn id(&self) -> ActorId;

    /// Effective rank of an attribute, or `None` if the actor has no such attribute.
    fn attribute_tick(&self, key: &str) -> Option<i32>;

    /// Modifier of a derived stat. Unknown stats contribute 0.
    fn stat_mod(&self, key: &str) -> i32;

    /// Actor-specific crit threshold. `None` uses the configured default.
    fn crit_threshold(&self) -> Option<u32> {
        None
    }

    async fn effects(&self) -> Result<Vec<EffectInstance>, StoreError>;

    /// Current stack count for `stack_id`, 0 when the actor has no such effect.
    async fn effect_stack_count(&self, stack_id: &str) -> Result<u32, StoreError> {
        Ok(self
            .effects()
            .await?
            .iter()
            .find_map(|e| e.stack().filter(|s| s.stack_id == stack_id))
            .map_or(0, |s| s.current_stacks))
    }

    async fn create_effect(&self, effect: EffectInstance) -> Result<EffectInstance, StoreError>;

    async fn update_effect(&self, effect: &EffectInstance) -> Result<(), StoreError>;

    async fn delete_effect(&self, id: EffectId) -> Result<(), StoreError>;
}

// ============================================================================
// Items and Skills
// ============================================================================

/// What kind of item an accuracy check is made with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Weapon,
    Ability,
    Tactic,
}

impl ItemKind {
    /// Stat whose modifier adds to accuracy with this kind of item.
    pub fn accuracy_stat(&self) -> &'static str {
        match self {
            ItemKind::Weapon => ACCURACY_STAT,
            ItemKind::Ability | ItemKind::Tactic => MAGIC_STAT,
        }
    }

    /// Whether accuracy is measured against a target's magic defense.
    pub fn targets_magic_defense(&self) -> bool {
        !matches!(self, ItemKind::Weapon)
    }
}

/// An item used for an accuracy check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub kind: ItemKind,
    /// Weapon accuracy bonus.
    pub to_hit: i32,
    /// Ability and tactic accuracy bonus.
    pub to_land: i32,
    /// Infinity items always succeed.
    pub is_infinity: bool,
    /// Attribute bound to the `tick` variable of `bonus_formula`.
    pub attribute: Option<String>,
    pub bonus_formula: Option<Formula>,
}

impl Item {
    pub fn new(name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id: ItemId::new(),
            name: name.into(),
            kind,
            to_hit: 0,
            to_land: 0,
            is_infinity: false,
            attribute: None,
            bonus_formula: None,
        }
    }

    pub fn weapon(name: impl Into<String>, to_hit: i32) -> Self {
        let mut item = Self::new(name, ItemKind::Weapon);
        item.to_hit = to_hit;
        item
    }

    pub fn ability(name: impl Into<String>, to_land: i32) -> Self {
        let mut item = Self::new(name, ItemKind::Ability);
        item.to_land = to_land;
        item
    }

    pub fn tactic(name: impl Into<String>, to_land: i32) -> Self {
        let mut item = Self::new(name, ItemKind::Tactic);
        item.to_land = to_land;
        item
    }

    pub fn infinity(mut self) -> Self {
        self.is_infinity = true;
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn with_bonus_formula(mut self, formula: Formula) -> Self {
        self.bonus_formula = Some(formula);
        self
    }

    /// The item's own accuracy field, chosen by kind.
    pub fn accuracy_bonus(&self) -> i32 {
        match self.kind {
            ItemKind::Weapon => self.to_hit,
            ItemKind::Ability | ItemKind::Tactic => self.to_land,
        }
    }
}

/// A trained skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub ticks: i32,
    /// Attribute paired with the skill.
    pub attribute: String,
}

impl Skill {
    pub fn new(name: impl Into<String>, ticks: i32, attribute: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ticks,
            attribute: attribute.into(),
        }
    }
}

/// A target of an accuracy check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub actor: ActorId,
    pub token: Option<TokenId>,
    pub defense: i32,
    pub magic_defense: i32,
}

impl Target {
    pub fn new(actor: ActorId, defense: i32, magic_defense: i32) -> Self {
        Self {
            actor,
            token: None,
            defense,
            magic_defense,
        }
    }

    pub fn with_token(mut self, token: TokenId) -> Self {
        self.token = Some(token);
        self
    }

    /// Defense value the given item kind is measured against.
    pub fn defense_against(&self, kind: ItemKind) -> i32 {
        if kind.targets_magic_defense() {
            self.magic_defense
        } else {
            self.defense
        }
    }
}
