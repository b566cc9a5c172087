//! Rejection reasons for shielded transaction validation

use thiserror::Error;

/// Errors raised while checking a shielded transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("bad-spend-description-nullifiers-duplicate")]
    DuplicateNullifier,

    #[error("bad-txns-valuebalance-toolarge")]
    ValueBalanceOutOfRange,

    #[error("bad-txns-valuebalance-nonzero")]
    ValueBalanceNonZero,

    #[error("bad-tx-sapling-version")]
    SaplingDataOnLegacyTransaction,

    #[error("bad-txns-sapling-spend-auth-sig-invalid (spend {0})")]
    InvalidSpendAuthSig(usize),

    #[error("bad-txns-sapling-binding-signature-invalid")]
    InvalidBindingSignature,

    #[error("bad-txns-transparent-signature-invalid (input {0})")]
    InvalidTransparentSignature(usize),

    #[error("bad-txns-inputs-missingorspent (input {0})")]
    MissingPrevOutput(usize),

    /// A nullifier was already revealed by an earlier transaction
    #[error("Nullifier already spent (double-spend attempt)")]
    NullifierAlreadySpent,

    #[error("bad-txns-oversize: {size} > {max}")]
    TransactionTooLarge { size: usize, max: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type ValidationResult<T> = Result<T, ValidationError>;
