//! Shielded send operation
//!
//! Resolves the funding pool, selects notes or coins, and rebuilds the
//! transaction with dummy proofs until the assumed fee covers the fee its
//! serialized size requires. Only then are real proofs generated.
//!
//! Every fee attempt starts from a fresh builder and a fresh input
//! selection: a higher fee can change which inputs are needed.

use log::{debug, info, warn};

use sapling_primitives::crypto::{ExpandedSpendingKey, Memo, OutgoingViewingKey, PaymentAddress};
use sapling_primitives::script::{KeyId, Script};
use sapling_primitives::{
    Amount, ConsensusParams, Money, Transaction, TxId, OUTPUT_DESCRIPTION_SIZE,
    SPEND_DESCRIPTION_SIZE,
};

use crate::backend::{CoinControl, NoteIndex, SaplingNoteEntry, TransactionCommitter, UtxoSource};
use crate::builder::TransactionBuilder;
use crate::error::{BuilderError, OperationError, OperationResult};
use crate::fees::FeePolicy;
use crate::prover::TxProver;

/// Size estimate of a transparent input spending a P2PKH output
const TXIN_ESTIMATED_SIZE: usize = 148;

/// Size of a P2PKH transparent output
const TXOUT_ESTIMATED_SIZE: usize = 34;

/// Where the funds come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FromAddress {
    Unset,
    Transparent(KeyId),
    Shielded(PaymentAddress),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendManyRecipient {
    /// `memo` is stored as its UTF-8 bytes; empty for none
    Shielded {
        address: PaymentAddress,
        amount: Amount,
        memo: String,
    },
    Transparent {
        script: Script,
        amount: Amount,
    },
}

impl SendManyRecipient {
    pub fn amount(&self) -> Amount {
        match self {
            SendManyRecipient::Shielded { amount, .. } | SendManyRecipient::Transparent { amount, .. } => *amount,
        }
    }

    pub fn is_transparent(&self) -> bool {
        matches!(self, SendManyRecipient::Transparent { .. })
    }
}

/// A finished transaction and the fee it pays
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildOutcome {
    pub tx: Transaction,
    /// Includes change folded into the fee as dust
    pub fee: Amount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pool {
    Transparent,
    Shielded,
}

#[derive(Debug, Default)]
struct TxValues {
    trans_in: Amount,
    shielded_in: Amount,
    trans_out: Amount,
    shielded_out: Amount,
    target: Amount,
    transparent_inputs: usize,
    spends: usize,
}

enum CacheCheck {
    Ok,
    Spent,
}

pub struct SaplingOperation<'a, W, P> {
    params: ConsensusParams,
    height: u32,
    policy: FeePolicy,
    wallet: &'a W,
    prover: &'a P,
    from: FromAddress,
    select_transparent: bool,
    select_shielded: bool,
    recipients: Vec<SendManyRecipient>,
    fee: Amount,
    min_depth: Option<u32>,
    coin_control: Option<CoinControl>,
}

impl<'a, W, P> SaplingOperation<'a, W, P>
where
    W: NoteIndex + UtxoSource + TransactionCommitter,
    P: TxProver,
{
    pub fn new(params: ConsensusParams, height: u32, policy: FeePolicy, wallet: &'a W, prover: &'a P) -> Self {
        Self {
            params,
            height,
            policy,
            wallet,
            prover,
            from: FromAddress::Unset,
            select_transparent: false,
            select_shielded: false,
            recipients: Vec::new(),
            fee: 0,
            min_depth: None,
            coin_control: None,
        }
    }

    pub fn set_from_address(mut self, from: FromAddress) -> Self {
        self.from = from;
        self
    }

    /// Fund from any transparent coin when no from address is set
    pub fn set_select_transparent_coins(mut self, select: bool) -> Self {
        self.select_transparent = select;
        self
    }

    /// Fund from any shielded note when no from address is set
    pub fn set_select_shielded_coins(mut self, select: bool) -> Self {
        self.select_shielded = select;
        self
    }

    pub fn set_recipients(mut self, recipients: Vec<SendManyRecipient>) -> Self {
        self.recipients = recipients;
        self
    }

    /// Explicit fee; zero lets the operation compute the minimum
    pub fn set_fee(mut self, fee: Amount) -> Self {
        self.fee = fee;
        self
    }

    pub fn set_min_depth(mut self, min_depth: u32) -> Self {
        self.min_depth = Some(min_depth);
        self
    }

    /// Explicit inputs; overrides the from address and the select flags
    pub fn set_coin_control(mut self, coin_control: CoinControl) -> Self {
        self.coin_control = Some(coin_control);
        self
    }

    fn min_depth(&self) -> u32 {
        self.min_depth.unwrap_or(self.policy.default_min_depth)
    }

    fn selected_coins(&self) -> Option<&CoinControl> {
        self.coin_control
            .as_ref()
            .filter(|cc| cc.has_transparent() || cc.has_shielded())
    }

    fn resolve_pool(&self) -> OperationResult<Pool> {
        let (transparent, shielded) = match self.selected_coins() {
            Some(cc) => (cc.has_transparent(), cc.has_shielded()),
            None => match &self.from {
                FromAddress::Transparent(_) => (true, false),
                FromAddress::Shielded(_) => (false, true),
                FromAddress::Unset => (self.select_transparent, self.select_shielded),
            },
        };

        match (transparent, shielded) {
            (false, false) => Err(OperationError::MissingFromAddress),
            (true, true) => Err(OperationError::MixedFromAddress),
            (true, false) => Ok(Pool::Transparent),
            (false, true) => Ok(Pool::Shielded),
        }
    }

    /// One parsed memo per shielded recipient, in order
    fn parse_memos(&self) -> OperationResult<Vec<Option<Memo>>> {
        self.recipients
            .iter()
            .map(|recipient| match recipient {
                SendManyRecipient::Shielded { memo, .. } => Memo::from_text(memo)
                    .map(Some)
                    .map_err(|e| OperationError::MemoTooLong {
                        size: e.size,
                        max: e.max,
                    }),
                SendManyRecipient::Transparent { .. } => Ok(None),
            })
            .collect()
    }

    fn calculate_target(&self, fee: Amount) -> OperationResult<TxValues> {
        let mut values = TxValues::default();
        for recipient in &self.recipients {
            let total = if recipient.is_transparent() {
                &mut values.trans_out
            } else {
                &mut values.shielded_out
            };
            *total = total
                .checked_add(recipient.amount())
                .ok_or(OperationError::Build(BuilderError::ValueOutOfRange))?;
        }
        values.target = values
            .trans_out
            .checked_add(values.shielded_out)
            .and_then(|v| v.checked_add(fee))
            .ok_or(OperationError::Build(BuilderError::ValueOutOfRange))?;
        Ok(values)
    }

    /// Build the transaction: dummy builds until the fee converges, then
    /// real proofs and signatures.
    pub fn build(&self) -> OperationResult<BuildOutcome> {
        let pool = self.resolve_pool()?;
        if self.recipients.is_empty() {
            return Err(OperationError::NoRecipients);
        }
        let min_depth = self.min_depth();
        if pool == Pool::Shielded && min_depth == 0 {
            return Err(OperationError::ZeroMinDepth);
        }
        let memos = self.parse_memos()?;
        debug!(target: "sapling", "funding from {:?} pool, min depth {}", pool, min_depth);

        let mut fee = if self.fee > 0 {
            self.fee
        } else {
            self.policy.min_relay_fee_per_k
        };
        let mut tries = 0;

        loop {
            let mut values = self.calculate_target(fee)?;
            let mut builder = TransactionBuilder::new(
                self.params.clone(),
                self.height,
                self.policy.clone(),
                self.wallet.transparent_keystore(),
            );

            let ovk = match pool {
                Pool::Shielded => self.load_unspent_notes(&mut builder, &mut values, min_depth)?,
                Pool::Transparent => self.wallet.common_ovk(),
            };

            self.add_recipients(&mut builder, &memos, ovk)?;

            if pool == Pool::Transparent {
                self.load_utxos(&mut builder, &mut values, min_depth)?;
            }

            self.check_tx_values(&values, pool)?;
            self.check_transaction_size(&values, pool)?;

            if pool == Pool::Transparent {
                let change_key = self
                    .wallet
                    .reserve_change_key()
                    .ok_or(OperationError::ChangeKeyUnavailable)?;
                builder.send_change_to_transparent(change_key);
            }

            builder.set_fee(fee);
            builder.build(self.prover, true)?;

            let tx = builder.transaction();
            let size = tx
                .serialized_size()
                .map_err(|e| OperationError::Serialization(e.to_string()))?;
            let shielded = tx.is_shielded();
            let required = self.policy.required_fee(size, shielded);
            debug!(
                target: "sapling",
                "attempt {}: size {} bytes, assumed fee {}, required {}",
                tries,
                size,
                Money(fee),
                Money(required)
            );

            if required <= fee {
                let max = self.policy.max_fee(required, shielded);
                if fee > max {
                    return Err(OperationError::FeeTooHigh {
                        fee: Money(fee),
                        max: Money(max),
                    });
                }
                info!(
                    target: "sapling",
                    "spending {} to send {} with fee {} (min required {})",
                    Money(values.target),
                    Money(values.trans_out + values.shielded_out),
                    Money(fee),
                    Money(required)
                );
                debug!(
                    target: "sapling",
                    "transparent input {}, shielded input {}, transparent output {}, shielded output {}",
                    Money(values.trans_in),
                    Money(values.shielded_in),
                    Money(values.trans_out),
                    Money(values.shielded_out)
                );

                builder.clear_proofs_and_signatures();
                builder.prove_and_sign(self.prover)?;
                return Ok(BuildOutcome {
                    fee: builder.fee().unwrap_or(fee),
                    tx: builder.transaction().clone(),
                });
            }

            if self.fee > 0 {
                return Err(OperationError::FeeTooLow {
                    fee: Money(self.fee),
                    min: Money(required),
                });
            }

            tries += 1;
            if tries > self.policy.max_fee_iterations {
                return Err(OperationError::FeeNotConverged);
            }
            debug!(target: "sapling", "incrementing fee: {} --> {}", Money(fee), Money(required));
            fee = required;
        }
    }

    /// Hand a built transaction to the wallet and return its id
    pub fn send(&self, outcome: &BuildOutcome) -> OperationResult<TxId> {
        self.wallet
            .commit_transaction(&outcome.tx)
            .map_err(OperationError::Commit)?;
        let txid = outcome
            .tx
            .txid()
            .map_err(|e| OperationError::Serialization(e.to_string()))?;
        info!(target: "sapling", "committed transaction {}", txid);
        Ok(txid)
    }

    pub fn build_and_send(&self) -> OperationResult<TxId> {
        let outcome = self.build()?;
        self.send(&outcome)
    }

    fn add_recipients(
        &self,
        builder: &mut TransactionBuilder<'a>,
        memos: &[Option<Memo>],
        ovk: OutgoingViewingKey,
    ) -> OperationResult<()> {
        for (recipient, memo) in self.recipients.iter().zip(memos) {
            match recipient {
                SendManyRecipient::Transparent { script, amount } => {
                    builder.add_transparent_output(script.clone(), *amount)?;
                }
                SendManyRecipient::Shielded { address, amount, .. } => {
                    let memo = memo.clone().unwrap_or_default();
                    builder.add_sapling_output(ovk, *address, *amount, memo)?;
                }
            }
        }
        Ok(())
    }

    fn check_tx_values(&self, values: &TxValues, pool: Pool) -> OperationResult<()> {
        match pool {
            Pool::Transparent if values.trans_in < values.target => {
                Err(OperationError::InsufficientTransparentFunds {
                    have: Money(values.trans_in),
                    need: Money(values.target),
                })
            }
            Pool::Shielded if values.shielded_in < values.target => {
                Err(OperationError::InsufficientShieldedFunds {
                    have: Money(values.shielded_in),
                    need: Money(values.target),
                })
            }
            _ => Ok(()),
        }
    }

    /// Size estimate before the dummy build, counting one probable change
    /// output in the funding pool
    fn check_transaction_size(&self, values: &TxValues, pool: Pool) -> OperationResult<()> {
        let transparent_recipients = self.recipients.iter().filter(|r| r.is_transparent()).count();
        let transparent_outputs = transparent_recipients + usize::from(pool == Pool::Transparent);
        let shielded_outputs =
            self.recipients.len() - transparent_recipients + usize::from(pool == Pool::Shielded);

        let base = Transaction::new(self.params.tx_version(self.height))
            .serialized_size()
            .map_err(|e| OperationError::Serialization(e.to_string()))?;
        let size = base
            + TXIN_ESTIMATED_SIZE * values.transparent_inputs
            + TXOUT_ESTIMATED_SIZE * transparent_outputs
            + SPEND_DESCRIPTION_SIZE * values.spends
            + OUTPUT_DESCRIPTION_SIZE * shielded_outputs;

        let max = self.params.max_tx_size(self.height);
        if size > max {
            return Err(OperationError::TxTooLarge { size, max });
        }
        Ok(())
    }

    /// Witness must be cached; a missing nullifier is derived and cached,
    /// and a note found spent that way is dropped.
    fn check_cached_note(&self, entry: &SaplingNoteEntry, expsk: &ExpandedSpendingKey) -> OperationResult<CacheCheck> {
        let cached = self.wallet.cached_note(&entry.op);
        let position = match cached.as_ref().and_then(|c| c.witness_position) {
            Some(position) => position,
            None => {
                return Err(OperationError::NoteCacheCorrupt(format!(
                    "witness missing for note {}:{}",
                    entry.op.txid, entry.op.n
                )))
            }
        };

        if cached.and_then(|c| c.nullifier).is_some() {
            return Ok(CacheCheck::Ok);
        }

        warn!(
            target: "sapling",
            "nullifier not cached for note {}:{}, updating",
            entry.op.txid,
            entry.op.n
        );
        let nk = expsk.proof_generation_key().nk();
        let nullifier = entry.note.nullifier(&nk, position);
        self.wallet.update_nullifier_cache(&entry.op, nullifier);

        if self.wallet.is_spent(&nullifier) {
            warn!(
                target: "sapling",
                "removed note {}:{} as it appears to be already spent",
                entry.op.txid,
                entry.op.n
            );
            self.wallet.mark_dirty(&entry.op);
            return Ok(CacheCheck::Spent);
        }
        Ok(CacheCheck::Ok)
    }

    /// Select notes largest-first and add them as spends. Returns the ovk of
    /// the first selected note.
    fn load_unspent_notes(
        &self,
        builder: &mut TransactionBuilder<'a>,
        values: &mut TxValues,
        min_depth: u32,
    ) -> OperationResult<OutgoingViewingKey> {
        let from = match &self.from {
            FromAddress::Shielded(address) => Some(address),
            _ => None,
        };
        let coin_control = self.coin_control.as_ref().filter(|cc| cc.has_shielded());

        let mut entries = match coin_control {
            Some(cc) => self.wallet.get_notes(&cc.shielded),
            None => self.wallet.get_filtered_notes(from, min_depth),
        };
        if entries.is_empty() {
            if coin_control.is_none() && !self.wallet.get_filtered_notes(from, 0).is_empty() {
                return Err(OperationError::NotEnoughConfirmations(min_depth));
            }
            return Err(OperationError::NoAvailableNotes);
        }
        entries.sort_by(|a, b| b.note.value().cmp(&a.note.value()));

        let threshold = self.policy.shielded_dust_threshold();
        let mut selected = Vec::new();
        let mut ovk = None;
        for entry in entries {
            let expsk = self
                .wallet
                .spending_key_for(&entry.address)
                .ok_or(OperationError::SpendingKeyNotFound)?;

            if let CacheCheck::Spent = self.check_cached_note(&entry, &expsk)? {
                continue;
            }

            ovk.get_or_insert(expsk.ovk);
            values.shielded_in = Amount::try_from(entry.note.value())
                .ok()
                .and_then(|value| values.shielded_in.checked_add(value))
                .ok_or(BuilderError::ValueOutOfRange)?;
            selected.push((entry, expsk));

            // with explicit coin selection every selected note is used
            if coin_control.is_none() && values.shielded_in >= values.target {
                let change = values.shielded_in - values.target;
                if change == 0 || change >= threshold {
                    break;
                }
            }
        }

        if values.shielded_in < values.target {
            return Err(OperationError::InsufficientShieldedFunds {
                have: Money(values.shielded_in),
                need: Money(values.target),
            });
        }

        let ops: Vec<_> = selected.iter().map(|(entry, _)| entry.op).collect();
        let (witnesses, anchor) = self.wallet.get_witnesses_and_anchor(&ops);
        for (i, (entry, expsk)) in selected.into_iter().enumerate() {
            let witness = witnesses
                .get(i)
                .cloned()
                .flatten()
                .ok_or(OperationError::MissingWitness)?;
            builder.add_sapling_spend(expsk, entry.note, anchor, witness)?;
            values.spends += 1;
        }

        Ok(ovk.unwrap_or_else(|| self.wallet.common_ovk()))
    }

    /// Select coins largest-first, avoiding transparent dust change
    fn load_utxos(
        &self,
        builder: &mut TransactionBuilder<'a>,
        values: &mut TxValues,
        min_depth: u32,
    ) -> OperationResult<()> {
        let from = match &self.from {
            FromAddress::Transparent(key_id) => Some(key_id),
            _ => None,
        };
        let coin_control = self.coin_control.as_ref().filter(|cc| cc.has_transparent());
        let mut coins = self.wallet.available_coins(from, min_depth, coin_control);

        if coin_control.is_none() {
            coins.sort_by(|a, b| b.value.cmp(&a.value));

            let threshold = self.policy.dust_threshold();
            let mut dust_change = -1;
            let mut selected_amount: Amount = 0;
            let mut count = 0;
            for coin in &coins {
                selected_amount = selected_amount
                    .checked_add(coin.value)
                    .ok_or(BuilderError::ValueOutOfRange)?;
                count += 1;
                if selected_amount >= values.target {
                    dust_change = selected_amount - values.target;
                    if dust_change == 0 || dust_change >= threshold {
                        break;
                    }
                }
            }
            coins.truncate(count);

            if selected_amount < values.target {
                return Err(OperationError::InsufficientTransparentFunds {
                    have: Money(selected_amount),
                    need: Money(values.target),
                });
            }
            if dust_change != 0 && dust_change < threshold {
                return Err(OperationError::DustChange {
                    have: Money(selected_amount),
                    need_more: Money(threshold - dust_change),
                    change: Money(dust_change),
                    threshold: Money(threshold),
                });
            }
        }

        for coin in coins {
            values.trans_in = values
                .trans_in
                .checked_add(coin.value)
                .ok_or(BuilderError::ValueOutOfRange)?;
            builder.add_transparent_input(coin.outpoint, coin.script_pubkey, coin.value)?;
            values.transparent_inputs += 1;
        }
        Ok(())
    }
}
