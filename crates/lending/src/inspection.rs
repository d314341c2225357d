use serde::{Deserialize, Serialize};

use borrowdesk_core::DomainError;

/// Outcome of the post-return inspection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    PendingInspection,
    GoodCondition,
    MinorDamage,
    MajorDamage,
    Lost,
    Unusable,
}

impl InspectionStatus {
    /// Usable or partially usable outcomes.
    pub fn is_usable(self) -> bool {
        matches!(self, InspectionStatus::GoodCondition | InspectionStatus::MinorDamage)
    }
}

/// Physical condition recorded by the inspector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    Excellent,
    Good,
    Fair,
    Poor,
    Damaged,
    Lost,
}

impl ItemCondition {
    /// Only these conditions put units back into available stock.
    pub fn is_restorable(self) -> bool {
        matches!(self, ItemCondition::Excellent | ItemCondition::Good | ItemCondition::Fair)
    }
}

/// Reject combinations where the outcome and the condition disagree about
/// whether the units can go back on the shelf.
pub fn ensure_consistent(status: InspectionStatus, condition: ItemCondition) -> Result<(), DomainError> {
    if status == InspectionStatus::PendingInspection {
        return Err(DomainError::validation(
            "inspection_status must be an inspection outcome, not pending_inspection",
        ));
    }
    if status.is_usable() != condition.is_restorable() {
        return Err(DomainError::validation(format!(
            "condition {condition:?} is inconsistent with inspection_status {status:?}"
        )));
    }
    Ok(())
}
