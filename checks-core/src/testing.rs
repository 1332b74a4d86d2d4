//! Testing utilities for the check pipeline and the effect engine.
//!
//! This module provides tools for integration testing:
//! - `MemoryActor`, an in-memory actor document that stores effects in their
//!   persisted shape
//! - `ScriptedRoller`, a die roller that returns queued faces
//! - Assertion helpers for verifying effect state

use crate::actor::{ActorDocument, StoreError};
use crate::dice::{DiceExpression, DiceRoll, DieRoller, RollerError};
use crate::effects::{EffectDocument, EffectInstance};
use crate::model::{ActorId, EffectId};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;

/// Flag namespace used by [`MemoryActor`] unless told otherwise.
pub const DEFAULT_NAMESPACE: &str = "checks-core";

/// An actor document held in memory.
///
/// Effects round-trip through [`EffectDocument`] on every read and write, so
/// tests exercise the same conversion a real store would.
pub struct MemoryActor {
    id: ActorId,
    name: String,
    namespace: String,
    attributes: HashMap<String, i32>,
    stats: HashMap<String, i32>,
    crit_threshold: Option<u32>,
    documents: RwLock<Vec<EffectDocument>>,
    offline: AtomicBool,
}

impl MemoryActor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ActorId::new(),
            name: name.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            attributes: HashMap::new(),
            stats: HashMap::new(),
            crit_threshold: None,
            documents: RwLock::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, tick: i32) -> Self {
        self.attributes.insert(key.into(), tick);
        self
    }

    pub fn with_stat(mut self, key: impl Into<String>, value: i32) -> Self {
        self.stats.insert(key.into(), value);
        self
    }

    pub fn with_crit_threshold(mut self, threshold: u32) -> Self {
        self.crit_threshold = Some(threshold);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make every subsequent store call fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Raw stored documents.
    pub async fn documents(&self) -> Vec<EffectDocument> {
        self.documents.read().await.clone()
    }

    /// Effects whose name matches `name`.
    pub async fn effects_named(&self, name: &str) -> Vec<EffectInstance> {
        self.effects()
            .await
            .map(|effects| effects.into_iter().filter(|e| e.name == name).collect())
            .unwrap_or_default()
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("{} is offline", self.name)))
        } else {
            Ok(())
        }
    }

    fn encode(&self, effect: &EffectInstance) -> Result<EffectDocument, StoreError> {
        effect
            .to_document(&self.namespace)
            .map_err(|e| StoreError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl ActorDocument for MemoryActor {
    fn id(&self) -> ActorId {
        self.id
    }

    fn attribute_tick(&self, key: &str) -> Option<i32> {
        self.attributes.get(key).copied()
    }

    fn stat_mod(&self, key: &str) -> i32 {
        self.stats.get(key).copied().unwrap_or(0)
    }

    fn crit_threshold(&self) -> Option<u32> {
        self.crit_threshold
    }

    async fn effects(&self) -> Result<Vec<EffectInstance>, StoreError> {
        self.ensure_online()?;
        self.documents
            .read()
            .await
            .iter()
            .map(|doc| {
                EffectInstance::from_document(doc, &self.namespace)
                    .map_err(|e| StoreError::Rejected(e.to_string()))
            })
            .collect()
    }

    async fn create_effect(&self, effect: EffectInstance) -> Result<EffectInstance, StoreError> {
        self.ensure_online()?;
        let doc = self.encode(&effect)?;
        self.documents.write().await.push(doc);
        Ok(effect)
    }

    async fn update_effect(&self, effect: &EffectInstance) -> Result<(), StoreError> {
        self.ensure_online()?;
        let doc = self.encode(effect)?;
        let mut documents = self.documents.write().await;
        let slot = documents
            .iter_mut()
            .find(|d| d.id == effect.id)
            .ok_or(StoreError::EffectNotFound(effect.id))?;
        *slot = doc;
        Ok(())
    }

    async fn delete_effect(&self, id: EffectId) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| d.id != id);
        if documents.len() == before {
            return Err(StoreError::EffectNotFound(id));
        }
        Ok(())
    }
}

/// A die roller that returns queued faces in order.
///
/// Evaluation fails once the queue cannot cover every die of a formula.
#[derive(Debug, Default)]
pub struct ScriptedRoller {
    faces: Mutex<VecDeque<u32>>,
    formulas: Mutex<Vec<String>>,
}

impl ScriptedRoller {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        Self {
            faces: Mutex::new(faces.into_iter().collect()),
            formulas: Mutex::new(Vec::new()),
        }
    }

    /// Queue more faces.
    pub fn push(&self, faces: impl IntoIterator<Item = u32>) {
        if let Ok(mut queue) = self.faces.lock() {
            queue.extend(faces);
        }
    }

    /// Every formula evaluated so far.
    pub fn formulas(&self) -> Vec<String> {
        self.formulas
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.faces.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DieRoller for ScriptedRoller {
    async fn evaluate(&self, formula: &str) -> Result<DiceRoll, RollerError> {
        let expr = DiceExpression::parse(formula)?;
        let needed: usize = expr.terms.iter().map(|t| t.count as usize).sum();

        let mut queue = self
            .faces
            .lock()
            .map_err(|_| RollerError::Failed("face queue poisoned".to_string()))?;
        if queue.len() < needed {
            return Err(RollerError::Failed(format!(
                "{formula} needs {needed} dice but only {} are queued",
                queue.len()
            )));
        }

        let roll = expr.evaluate_with(|_| queue.pop_front().unwrap_or(1));
        if let Ok(mut formulas) = self.formulas.lock() {
            formulas.push(roll.formula.clone());
        }
        Ok(roll)
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert that the actor carries exactly `count` effects.
pub async fn assert_effect_count(actor: &MemoryActor, count: usize) {
    let effects = actor.effects().await.unwrap_or_default();
    assert_eq!(
        effects.len(),
        count,
        "Expected {} effects on {}, found {:?}",
        count,
        actor.name(),
        effects.iter().map(|e| &e.name).collect::<Vec<_>>()
    );
}

/// Assert the stack count for `stack_id`.
pub async fn assert_stacks(actor: &MemoryActor, stack_id: &str, stacks: u32) {
    let found = actor.effect_stack_count(stack_id).await.unwrap_or(0);
    assert_eq!(
        found, stacks,
        "Expected {} stacks of {} on {}",
        stacks, stack_id, actor.name()
    );
}
