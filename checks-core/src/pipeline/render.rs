//! Render phase: aggregate display sections for a resolved check.

use crate::error::CheckError;
use crate::hooks::HookRegistry;
use crate::model::{Check, CheckResult, CheckType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Order of the built-in summary section.
pub const SUMMARY_ORDER: i32 = 0;

/// One block of rendered output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Sort key, ascending.
    pub order: i32,
    pub kind: String,
    pub content: Value,
}

impl Section {
    pub fn new(order: i32, kind: impl Into<String>, content: Value) -> Self {
        Self {
            order,
            kind: kind.into(),
            content,
        }
    }
}

/// A check, its result and everything render hooks contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedCheck {
    pub check: Check,
    pub result: CheckResult,
    pub sections: Vec<Section>,
    pub flags: Map<String, Value>,
}

impl RenderedCheck {
    fn new(check: Check, result: CheckResult) -> Self {
        let summary = Section::new(SUMMARY_ORDER, "summary", summary(&result));
        Self {
            check,
            result,
            sections: vec![summary],
            flags: Map::new(),
        }
    }

    pub fn push_section(&mut self, section: Section) -> &mut Self {
        self.sections.push(section);
        self
    }

    pub fn set_flag(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.flags.insert(key.into(), value);
        self
    }

    /// First section of the given kind.
    pub fn section(&self, kind: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.kind.as_str()).collect()
    }
}

fn summary(result: &CheckResult) -> Value {
    json!({
        "checkType": result.check_type.name(),
        "formula": result.roll.as_ref().map(|r| r.formula.clone()),
        "dice": result.roll.as_ref().map(|r| r.dice_display()),
        "total": result.roll.as_ref().map(|r| r.total),
        "finalResult": result.final_result,
        "critical": result.critical,
        "fumble": result.fumble,
    })
}

/// Run render hooks and sort their sections.
pub(crate) async fn render(
    check: Check,
    result: CheckResult,
    hooks: &mut HookRegistry<CheckType, RenderedCheck>,
) -> Result<RenderedCheck, CheckError> {
    let check_type = check.check_type;
    let mut rendered = RenderedCheck::new(check, result);

    hooks.run_all(check_type, &mut rendered).await?;
    rendered.sections.sort_by_key(|s| s.order);

    tracing::debug!(
        check = %rendered.check.id,
        sections = rendered.sections.len(),
        "check rendered"
    );
    Ok(rendered)
}
