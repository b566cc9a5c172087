//! Error types for transaction building and the shielded send operation

use sapling_primitives::Money;
use thiserror::Error;

/// Failures raised by [`crate::builder::TransactionBuilder`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    #[error("Anchor does not match previously-added Sapling spends.")]
    AnchorMismatch,

    #[error("Sapling is not active at height {0}")]
    SaplingNotActive(u32),

    #[error("Value out of range")]
    ValueOutOfRange,

    #[error("Cannot add transparent inputs to a TransactionBuilder without a keystore")]
    MissingKeystore,

    #[error("Invalid output script")]
    InvalidTransparentOutput,

    #[error("Fee not set")]
    FeeNotSet,

    #[error("Fee cannot be negative")]
    NegativeFee,

    #[error("Change cannot be negative")]
    NegativeChange,

    #[error("Could not determine change address")]
    NoChangeAddress,

    #[error("Value is not conserved: {0}")]
    ValueNotConserved(Money),

    #[error("Spend proof failed: {0}")]
    SpendProofFailed(String),

    #[error("Output is invalid")]
    InvalidOutput,

    #[error("Failed to create output description: {0}")]
    OutputProofFailed(String),

    #[error("Failed to create spend authorization signature")]
    SpendSigFailed,

    #[error("Failed to create binding signature")]
    BindingSigFailed,

    #[error("Failed to sign transaction")]
    SigningFailed,
}

impl BuilderError {
    /// Misuse of the builder by its caller, as opposed to a build that
    /// failed on its inputs.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            BuilderError::AnchorMismatch
                | BuilderError::SaplingNotActive(_)
                | BuilderError::ValueOutOfRange
        )
    }
}

pub type BuilderResult<T> = Result<T, BuilderError>;

/// Broad class of an [`OperationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    InsufficientFunds,
    CacheCorruption,
    Fee,
    Build,
    Commit,
}

/// Failures raised by [`crate::operation::SaplingOperation`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("From address parameter missing")]
    MissingFromAddress,

    #[error("From address type cannot be shielded and transparent")]
    MixedFromAddress,

    #[error("No recipients")]
    NoRecipients,

    #[error("Minconf cannot be zero when sending from shielded address")]
    ZeroMinDepth,

    #[error("Memo size of {size} is too big, maximum allowed is {max}")]
    MemoTooLong { size: usize, max: usize },

    #[error("Too many outputs, size of raw transaction would be larger than limit of {max} bytes ({size})")]
    TxTooLarge { size: usize, max: usize },

    #[error("Insufficient transparent funds, have {have}, need {need}")]
    InsufficientTransparentFunds { have: Money, need: Money },

    #[error("Insufficient shielded funds, have {have}, need {need}")]
    InsufficientShieldedFunds { have: Money, need: Money },

    #[error(
        "Insufficient transparent funds, have {have}, need {need_more} more to avoid creating \
         invalid change output {change} (dust threshold is {threshold})"
    )]
    DustChange {
        have: Money,
        need_more: Money,
        change: Money,
        threshold: Money,
    },

    #[error("Insufficient funds, no available notes to spend")]
    NoAvailableNotes,

    #[error("Insufficient funds, shielded coins need at least {0} confirmations")]
    NotEnoughConfirmations(u32),

    #[error("Note cache corrupt, try \"-rescan\": {0}")]
    NoteCacheCorrupt(String),

    #[error("Missing witness for Sapling note")]
    MissingWitness,

    #[error("Spending key not found for Sapling note")]
    SpendingKeyNotFound,

    #[error("Could not generate a taddr to use as a change address")]
    ChangeKeyUnavailable,

    #[error("Fee set ({fee}) too low. Must be at least {min}")]
    FeeTooLow { fee: Money, min: Money },

    #[error("The transaction fee is too high: {fee} > {max}")]
    FeeTooHigh { fee: Money, max: Money },

    #[error("Unable to compute optimal fee. Set manually.")]
    FeeNotConverged,

    #[error("Failed to build transaction: {0}")]
    Build(#[from] BuilderError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Failed to commit transaction: {0}")]
    Commit(String),
}

impl OperationError {
    pub fn category(&self) -> ErrorCategory {
        use OperationError::*;
        match self {
            MissingFromAddress | MixedFromAddress | NoRecipients | ZeroMinDepth | TxTooLarge { .. } => {
                ErrorCategory::Configuration
            }
            InsufficientTransparentFunds { .. }
            | InsufficientShieldedFunds { .. }
            | DustChange { .. }
            | NoAvailableNotes
            | NotEnoughConfirmations(_) => ErrorCategory::InsufficientFunds,
            MemoTooLong { .. } | NoteCacheCorrupt(_) | MissingWitness | SpendingKeyNotFound => {
                ErrorCategory::CacheCorruption
            }
            FeeTooLow { .. } | FeeTooHigh { .. } | FeeNotConverged => ErrorCategory::Fee,
            ChangeKeyUnavailable | Build(_) | Serialization(_) => ErrorCategory::Build,
            Commit(_) => ErrorCategory::Commit,
        }
    }
}

pub type OperationResult<T> = Result<T, OperationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_violations() {
        assert!(BuilderError::AnchorMismatch.is_contract_violation());
        assert!(BuilderError::SaplingNotActive(5).is_contract_violation());
        assert!(!BuilderError::NegativeChange.is_contract_violation());
        assert!(!BuilderError::NoChangeAddress.is_contract_violation());
    }

    #[test]
    fn test_messages() {
        let err = OperationError::DustChange {
            have: Money(100_000_000),
            need_more: Money(4_000),
            change: Money(1_460),
            threshold: Money(5_460),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient transparent funds, have 1.00, need 0.00004 more to avoid creating \
             invalid change output 0.0000146 (dust threshold is 0.0000546)"
        );
        assert_eq!(err.category(), ErrorCategory::InsufficientFunds);

        let err = OperationError::FeeTooLow {
            fee: Money(100),
            min: Money(10_000),
        };
        assert_eq!(err.to_string(), "Fee set (0.000001) too low. Must be at least 0.0001");
        assert_eq!(err.category(), ErrorCategory::Fee);

        let err: OperationError = BuilderError::NoChangeAddress.into();
        assert_eq!(err.category(), ErrorCategory::Build);
    }

    #[test]
    fn test_prover_failures_carry_cause() {
        let err: OperationError = BuilderError::SpendProofFailed("anchor mismatch".into()).into();
        assert_eq!(
            err.to_string(),
            "Failed to build transaction: Spend proof failed: anchor mismatch"
        );
        assert_eq!(err.category(), ErrorCategory::Build);
        assert!(!BuilderError::OutputProofFailed(String::new()).is_contract_violation());
        assert!(!BuilderError::SigningFailed.is_contract_violation());
    }
}
