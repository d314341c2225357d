use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use borrowdesk_core::{Entity, UserId};

use crate::inspection::{InspectionStatus, ItemCondition};
use crate::status::VerificationStatus;

macro_rules! entity_id {
    ($t:ident) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(pub Uuid);

        impl $t {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

entity_id!(ReturnVerificationId);
entity_id!(ReturnTransactionId);

/// A borrower's claim that the units were handed back, awaiting admin review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnVerification {
    pub id: ReturnVerificationId,
    pub status: VerificationStatus,
    pub submitted_by: UserId,
    pub submitted_at: DateTime<Utc>,
    pub borrower_notes: Option<String>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
}

impl Entity for ReturnVerification {
    type Id = ReturnVerificationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// The physical return, created once receipt has been verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnTransaction {
    pub id: ReturnTransactionId,
    pub verification_id: ReturnVerificationId,
    pub received_by: UserId,
    pub returned_at: DateTime<Utc>,
    pub inspection_status: InspectionStatus,
    pub condition: Option<ItemCondition>,
    pub inspected_by: Option<UserId>,
    pub inspected_at: Option<DateTime<Utc>>,
    pub inspection_notes: Option<String>,
}

impl ReturnTransaction {
    pub fn is_inspected(&self) -> bool {
        self.inspection_status != InspectionStatus::PendingInspection
    }
}

impl Entity for ReturnTransaction {
    type Id = ReturnTransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
