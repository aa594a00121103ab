//! Transactions against the vault
//!
//! `ActionRunner` validates a `VaultAction`, wraps native currency and
//! approves tokens where needed, submits the call and waits for it to be
//! confirmed. Outcomes are reported on a status channel and as a typed
//! `ActionError`.

mod runner;

pub use runner::ActionRunner;

use alloy_transport::TransportError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::calculator::VaultOp;
use crate::chain::{RebalanceTarget, Side};

/// Wallet error code for a request the user rejected
pub const USER_REJECTED_CODE: i64 = 4001;

const REJECTION_MARKERS: [&str; 3] = ["user rejected", "user denied", "action_rejected"];

/// What the user asked for; amounts are raw text as typed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultAction {
    Vault { op: VaultOp, side: Side, amount: String },
    FlashLoanMint { shares: String },
    FlashLoanRedeem { shares: String },
    Auction { side: Side, delta: String },
    Rebalance { target: RebalanceTarget, delta: String },
}

impl VaultAction {
    pub fn label(&self) -> String {
        match self {
            VaultAction::Vault { op, side, .. } => format!("{} {}", op, side),
            VaultAction::FlashLoanMint { .. } => "mint with flash loan".to_string(),
            VaultAction::FlashLoanRedeem { .. } => "redeem with flash loan".to_string(),
            VaultAction::Auction { side, .. } => format!("execute {} auction", side),
            VaultAction::Rebalance { target, .. } => {
                format!("rebalance {}", format!("{:?}", target).to_lowercase())
            }
        }
    }
}

/// Where the last action stands. A failure stays visible until the next run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    #[default]
    Idle,
    InProgress(String),
    Succeeded(String),
    Failed(String),
}

/// Whether calls are sent or only logged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMode {
    #[default]
    Preview,
    Live,
}

impl std::str::FromStr for SubmitMode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "preview" => Ok(SubmitMode::Preview),
            "live" => Ok(SubmitMode::Live),
            other => Err(eyre::eyre!("Unknown submit mode '{}' (expected preview or live)", other)),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("Transaction canceled by user")]
    UserCancelled,

    #[error("{0}")]
    Validation(String),

    #[error("Failed to {action}")]
    Failed { action: String },
}

impl ActionError {
    pub fn validation(message: impl Into<String>) -> Self {
        ActionError::Validation(message.into())
    }
}

/// Whether an error anywhere in the chain is a wallet rejection
pub fn is_user_rejection(err: &eyre::Report) -> bool {
    err.chain().any(|cause| {
        if let Some(TransportError::ErrorResp(payload)) = cause.downcast_ref::<TransportError>() {
            if payload.code == USER_REJECTED_CODE {
                return true;
            }
        }
        let message = cause.to_string().to_lowercase();
        REJECTION_MARKERS.iter().any(|marker| message.contains(marker))
    })
}

/// Map a submission failure onto the user-facing taxonomy
pub fn classify_error(action: &str, err: &eyre::Report) -> ActionError {
    if is_user_rejection(err) {
        return ActionError::UserCancelled;
    }
    error!("❌ {} failed: {:#}", action, err);
    ActionError::Failed { action: action.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_json_rpc::ErrorPayload;
    use eyre::eyre;

    #[test]
    fn test_rejection_messages() {
        let cases = [
            "User rejected the request. (code 4001)",
            "MetaMask Tx Signature: User denied transaction signature.",
            "ethers-user-denied: ACTION_REJECTED",
        ];
        for message in cases {
            assert_eq!(classify_error("approve", &eyre!(message)), ActionError::UserCancelled);
        }
    }

    #[test]
    fn test_rejection_code_in_rpc_error() {
        let payload: ErrorPayload = ErrorPayload {
            code: 4001,
            message: "request refused".into(),
            data: None,
        };
        let err = eyre::Report::new(TransportError::ErrorResp(payload)).wrap_err("approve");
        assert!(is_user_rejection(&err));
        assert_eq!(classify_error("approve", &err).to_string(), "Transaction canceled by user");
    }

    #[test]
    fn test_other_errors_fail_with_action() {
        let err = eyre!("execution reverted: ExceedsMaxDeposit");
        let classified = classify_error("deposit", &err);
        assert_eq!(classified, ActionError::Failed { action: "deposit".into() });
        assert_eq!(classified.to_string(), "Failed to deposit");
    }

    #[test]
    fn test_labels_and_modes() {
        let action = VaultAction::Vault {
            op: VaultOp::Deposit,
            side: Side::Collateral,
            amount: "1".into(),
        };
        assert_eq!(action.label(), "deposit collateral");
        let rebalance = VaultAction::Rebalance {
            target: RebalanceTarget::Shares,
            delta: "1".into(),
        };
        assert_eq!(rebalance.label(), "rebalance shares");
        assert_eq!("LIVE".parse::<SubmitMode>().unwrap(), SubmitMode::Live);
        assert!("later".parse::<SubmitMode>().is_err());
    }
}
