//! Borrow transaction lifecycle (event-sourced).
//!
//! `pending → borrowed → pending_return_verification → returned`, with
//! `rejected` as the terminal branch out of `pending`. Return verification
//! and the post-return inspection are entities owned by the transaction.
//! The aggregate never touches stock itself; it emits the facts from which
//! the ledger command is derived.

pub mod inspection;
pub mod returns;
pub mod status;
pub mod transaction;

pub use inspection::{InspectionStatus, ItemCondition};
pub use returns::{ReturnTransaction, ReturnTransactionId, ReturnVerification, ReturnVerificationId};
pub use status::{BorrowStatus, VerificationStatus};
pub use transaction::{
    ApproveBorrow, BorrowApproved, BorrowCommand, BorrowEvent, BorrowRejected, BorrowRequested,
    BorrowTransaction, BorrowTransactionId, InspectReturn, RejectBorrow, RejectReturn,
    RequestBorrow, ReturnInspected, ReturnSubmitted, ReturnVerificationRejected, ReturnVerified,
    ReturnWrittenOff, SubmitReturn, VerifyReturn, WriteOffReturn,
};
