//! Sapling Shielded Wallet SDK
//!
//! Builds shielded transactions: a [`TransactionBuilder`] that accumulates
//! spends and outputs and places change, and a [`SaplingOperation`] that
//! selects inputs and converges on the fee before proving.
//!
//! # Example
//!
//! ```ignore
//! use shielded_wallet::{FromAddress, InMemoryWallet, MockTxProver, SaplingOperation, SendManyRecipient};
//!
//! let prover = MockTxProver::new();
//! let outcome = SaplingOperation::new(params, height, FeePolicy::default(), &wallet, &prover)
//!     .set_from_address(FromAddress::Shielded(from))
//!     .set_recipients(vec![SendManyRecipient::Shielded { address, amount, memo: String::new() }])
//!     .build()?;
//! ```

pub mod backend;
pub mod builder;
pub mod error;
pub mod fees;
pub mod operation;
pub mod prover;
pub mod signing;
pub mod wallet;

// Re-export main types
pub use backend::{
    CachedNoteData, CoinControl, NoteIndex, SaplingNoteEntry, SaplingOutPoint, TransactionCommitter,
    Utxo, UtxoSource,
};
pub use builder::{BuilderState, ChangeDestination, TransactionBuilder};
pub use error::{BuilderError, BuilderResult, ErrorCategory, OperationError, OperationResult};
pub use fees::FeePolicy;
pub use operation::{BuildOutcome, FromAddress, SaplingOperation, SendManyRecipient};
pub use prover::{MockTxProver, ProverError, SaplingProvingContext, TxProver};
pub use signing::{SignatureCreator, TransparentKeyStore};
pub use wallet::InMemoryWallet;

/// Re-export the primitives crate
pub use sapling_primitives as primitives;
