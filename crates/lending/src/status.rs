use serde::{Deserialize, Serialize};

/// Borrow transaction status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorrowStatus {
    Pending,
    Borrowed,
    PendingReturnVerification,
    Returned,
    Rejected,
}

impl BorrowStatus {
    /// Edges of the state machine graph leaving this status.
    pub fn allowed_next(self) -> &'static [BorrowStatus] {
        match self {
            BorrowStatus::Pending => &[BorrowStatus::Borrowed, BorrowStatus::Rejected],
            BorrowStatus::Borrowed => &[BorrowStatus::PendingReturnVerification],
            // A rejected verification sends the transaction back to `borrowed`.
            BorrowStatus::PendingReturnVerification => {
                &[BorrowStatus::Returned, BorrowStatus::Borrowed]
            }
            BorrowStatus::Returned | BorrowStatus::Rejected => &[],
        }
    }

    pub fn can_transition_to(self, next: BorrowStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BorrowStatus::Pending => "pending",
            BorrowStatus::Borrowed => "borrowed",
            BorrowStatus::PendingReturnVerification => "pending_return_verification",
            BorrowStatus::Returned => "returned",
            BorrowStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BorrowStatus::Pending),
            "borrowed" => Some(BorrowStatus::Borrowed),
            "pending_return_verification" => Some(BorrowStatus::PendingReturnVerification),
            "returned" => Some(BorrowStatus::Returned),
            "rejected" => Some(BorrowStatus::Rejected),
            _ => None,
        }
    }
}

impl core::fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one return verification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    PendingVerification,
    Verified,
    Rejected,
}
