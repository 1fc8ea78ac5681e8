//! Services module for business logic

pub mod recharge;

pub use recharge::{
    CreatedRecharge, ReconcileReport, RechargeService, VerificationOutcome, VerificationRequest,
    VerificationStatus,
};
