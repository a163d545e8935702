//! Decoding of raw signed transactions and the per-pass working copy.

use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::chain::{ChainError, ChainId, ChainResult};
use crate::schedule::types::ScheduledTransaction;

sol! {
    interface IERC20Transfer {
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// What a signed transaction moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    Native { to: Option<Address>, value: U256 },
    Token { contract: Address, recipient: Address, amount: U256 },
}

/// Fields of a raw signed transaction the scheduler reasons about.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub hash: TxHash,
    pub nonce: u64,
    pub chain_id: Option<u64>,
    /// Legacy `gasPrice`, or `maxFee + maxPriorityFee` for fee-market transactions.
    pub effective_gas_price: u128,
    pub transfer: Transfer,
    envelope: TxEnvelope,
}

impl SignedTransaction {
    /// Decode EIP-2718 bytes (legacy RLP included).
    pub fn decode(raw: &Bytes) -> ChainResult<Self> {
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|e| ChainError::InvalidTransaction(e.to_string()))?;

        let effective_gas_price = match envelope.gas_price() {
            Some(price) => price,
            None => envelope
                .max_fee_per_gas()
                .saturating_add(envelope.max_priority_fee_per_gas().unwrap_or_default()),
        };

        let transfer = classify_transfer(envelope.to(), envelope.value(), envelope.input());

        Ok(Self {
            hash: *envelope.tx_hash(),
            nonce: envelope.nonce(),
            chain_id: envelope.chain_id(),
            effective_gas_price,
            transfer,
            envelope,
        })
    }

    /// Recover the signing address.
    pub fn recover_sender(&self) -> ChainResult<Address> {
        self.envelope
            .recover_signer()
            .map_err(|e| ChainError::InvalidTransaction(format!("signature recovery failed: {e}")))
    }
}

impl ScheduledTransaction {
    /// Build a Pending record from raw signed bytes.
    ///
    /// Sender, nonce and chain come from the transaction itself; `chain_id`
    /// is only needed for transactions signed without one.
    pub fn from_signed(raw: Bytes, chain_id: Option<ChainId>) -> ChainResult<Self> {
        let tx = SignedTransaction::decode(&raw)?;
        let sender = tx.recover_sender()?;
        let chain = match (tx.chain_id, chain_id) {
            (Some(signed), Some(given)) if signed != given.0 => {
                return Err(ChainError::ChainMismatch {
                    expected: given.0,
                    actual: signed,
                })
            }
            (Some(signed), _) => ChainId(signed),
            (None, Some(given)) => given,
            (None, None) => {
                return Err(ChainError::InvalidTransaction(
                    "transaction carries no chain id".to_string(),
                ))
            }
        };
        Ok(Self::new(chain, sender, tx.nonce, raw))
    }
}

fn classify_transfer(to: Option<Address>, value: U256, input: &Bytes) -> Transfer {
    if let Some(contract) = to {
        if input.starts_with(&IERC20Transfer::transferCall::SELECTOR) {
            if let Ok(call) = IERC20Transfer::transferCall::abi_decode(input) {
                return Transfer::Token {
                    contract,
                    recipient: call.to,
                    amount: call.amount,
                };
            }
        }
    }
    Transfer::Native { to, value }
}

/// A record paired with its decoded transaction for one processing pass.
///
/// Nothing here is persisted; outcomes flow back through
/// [`RecordUpdate`](crate::schedule::RecordUpdate).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: ScheduledTransaction,
    pub tx: SignedTransaction,
}

impl Candidate {
    pub fn new(record: ScheduledTransaction) -> ChainResult<Self> {
        let tx = SignedTransaction::decode(&record.signed_transaction)?;
        Ok(Self { record, tx })
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn chain_id(&self) -> ChainId {
        self.record.chain_id
    }
}
