//! Shared mocks and fixtures for integration tests.

#![allow(dead_code)]

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{keccak256, Address, Bytes, TxHash, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tx_scheduler::chain::{
    ChainClient, ChainError, ChainId, ChainRegistry, ChainResult, ChainTransaction, TxReceipt,
};
use tx_scheduler::config::ExecutorConfig;
use tx_scheduler::executor::{InFlightSet, TransactionExecutor};
use tx_scheduler::gas::{GasOracle, GasOracleError};
use tx_scheduler::notify::{NotificationKind, NotificationSink, NotifyError};
use tx_scheduler::processor::Processor;
use tx_scheduler::schedule::{
    FileRepository, RecordUpdate, RepositoryError, RepositoryResult, ScheduleFilter,
    ScheduleRepository, ScheduledTransaction, SignedTransaction,
};

pub const CHAIN: ChainId = ChainId(1);
pub const GWEI: u128 = 1_000_000_000;
pub const GAS_USED: u64 = 21_000;

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockState {
    pub block_number: u64,
    pub nonces: HashMap<Address, u64>,
    pub balances: HashMap<Address, U256>,
    pub token_balances: HashMap<(Address, Address), U256>,
    pub gas_price: u128,
    pub posted: HashSet<TxHash>,
    pub receipts: HashMap<TxHash, TxReceipt>,
    pub broadcast_error: Option<String>,
    pub revert_on_broadcast: bool,
    /// Senders whose nonce lookups fail with a non-transient error.
    pub failing_senders: HashSet<Address>,
    pub sent: Vec<Bytes>,
}

/// Scripted in-memory chain.
///
/// A broadcast mines immediately: the sender's nonce advances and a receipt
/// appears, so `wait_for_confirmations` succeeds after `confirm_delay`.
pub struct MockChainClient {
    chain_id: ChainId,
    state: Mutex<MockState>,
    confirm_delay: Mutex<Duration>,
    broadcasts: AtomicUsize,
}

impl MockChainClient {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            state: Mutex::new(MockState {
                gas_price: 10 * GWEI,
                ..MockState::default()
            }),
            confirm_delay: Mutex::new(Duration::ZERO),
            broadcasts: AtomicUsize::new(0),
        }
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_block(&self, block: u64) {
        self.with_state(|s| s.block_number = block);
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.with_state(|s| s.nonces.insert(address, nonce));
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.with_state(|s| s.balances.insert(address, balance));
    }

    pub fn set_token_balance(&self, token: Address, address: Address, balance: U256) {
        self.with_state(|s| s.token_balances.insert((token, address), balance));
    }

    pub fn set_gas_price(&self, price: u128) {
        self.with_state(|s| s.gas_price = price);
    }

    pub fn set_confirm_delay(&self, delay: Duration) {
        *self.confirm_delay.lock().unwrap() = delay;
    }

    pub fn fail_broadcasts(&self, message: &str) {
        self.with_state(|s| s.broadcast_error = Some(message.to_string()));
    }

    pub fn revert_broadcasts(&self) {
        self.with_state(|s| s.revert_on_broadcast = true);
    }

    pub fn fail_sender(&self, address: Address) {
        self.with_state(|s| s.failing_senders.insert(address));
    }

    /// Pretend `raw` was mined by someone else (e.g. a previous run).
    pub fn mine_externally(&self, raw: &Bytes, success: bool) -> TxHash {
        let hash = keccak256(raw);
        self.with_state(|s| {
            s.posted.insert(hash);
            s.receipts.insert(hash, receipt(hash, success, s.block_number, s.gas_price));
        });
        hash
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.with_state(|s| s.sent.clone())
    }
}

fn receipt(hash: TxHash, success: bool, block: u64, gas_price: u128) -> TxReceipt {
    TxReceipt {
        hash,
        success,
        block_number: Some(block),
        gas_used: GAS_USED,
        effective_gas_price: gas_price,
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn get_block_number(&self) -> ChainResult<u64> {
        Ok(self.with_state(|s| s.block_number))
    }

    async fn get_transaction_count(&self, address: Address) -> ChainResult<u64> {
        self.with_state(|s| {
            if s.failing_senders.contains(&address) {
                return Err(ChainError::Rpc("account lookup failed".into()));
            }
            Ok(s.nonces.get(&address).copied().unwrap_or_default())
        })
    }

    async fn get_transaction(&self, hash: TxHash) -> ChainResult<Option<ChainTransaction>> {
        Ok(self.with_state(|s| {
            s.posted.contains(&hash).then(|| ChainTransaction {
                hash,
                block_number: s.receipts.get(&hash).and_then(|r| r.block_number),
            })
        }))
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> ChainResult<Option<TxReceipt>> {
        Ok(self.with_state(|s| s.receipts.get(&hash).cloned()))
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> ChainResult<TxHash> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        let tx = SignedTransaction::decode(raw)?;
        let sender = tx.recover_sender()?;

        self.with_state(|s| {
            if let Some(message) = &s.broadcast_error {
                return Err(ChainError::Rpc(message.clone()));
            }
            let hash = keccak256(raw);
            s.sent.push(raw.clone());
            s.posted.insert(hash);
            s.nonces.insert(sender, tx.nonce + 1);
            let success = !s.revert_on_broadcast;
            s.receipts.insert(hash, receipt(hash, success, s.block_number, s.gas_price));
            Ok(hash)
        })
    }

    async fn wait_for_confirmations(&self, hash: TxHash, _confirmations: u64) -> ChainResult<TxReceipt> {
        let delay = *self.confirm_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.with_state(|s| s.receipts.get(&hash).cloned())
            .ok_or(ChainError::ConfirmationBudgetExhausted { hash, polls: 0 })
    }

    async fn get_balance(&self, address: Address) -> ChainResult<U256> {
        Ok(self.with_state(|s| s.balances.get(&address).copied().unwrap_or_default()))
    }

    async fn get_token_balance(&self, token: Address, address: Address) -> ChainResult<U256> {
        Ok(self.with_state(|s| {
            s.token_balances
                .get(&(token, address))
                .copied()
                .unwrap_or_default()
        }))
    }

    async fn get_gas_price(&self) -> ChainResult<u128> {
        Ok(self.with_state(|s| s.gas_price))
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// In-memory store with a switch to simulate an unreachable backend.
#[derive(Default)]
pub struct MemoryRepository {
    inner: FileRepository,
    unavailable: AtomicBool,
    updates: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            inner: FileRepository::new(None),
            ..Self::default()
        }
    }

    pub fn get(&self, id: &str) -> ScheduledTransaction {
        self.inner.get(id).expect("record exists")
    }

    pub fn cancel(&self, id: &str) {
        self.inner.cancel(id).unwrap();
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn check(&self) -> RepositoryResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduleRepository for MemoryRepository {
    async fn get_pending(&self, filter: &ScheduleFilter) -> RepositoryResult<Vec<ScheduledTransaction>> {
        self.check()?;
        self.inner.get_pending(filter).await
    }

    async fn get_by_ids(
        &self,
        filter: &ScheduleFilter,
        ids: &[String],
    ) -> RepositoryResult<Vec<ScheduledTransaction>> {
        self.check()?;
        self.inner.get_by_ids(filter, ids).await
    }

    async fn update(&self, id: &str, update: &RecordUpdate) -> RepositoryResult<()> {
        self.check()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(id, update).await
    }

    async fn save(&self, record: ScheduledTransaction) -> RepositoryResult<ScheduledTransaction> {
        self.check()?;
        self.inner.save(record).await
    }
}

// ---------------------------------------------------------------------------
// Notifications and gas
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(NotificationKind, ScheduledTransaction)>>,
}

impl RecordingNotifier {
    fn record(&self, kind: NotificationKind, record: &ScheduledTransaction) {
        self.sent.lock().unwrap().push((kind, record.clone()));
    }

    pub fn sent(&self) -> Vec<(NotificationKind, ScheduledTransaction)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.sent().into_iter().map(|(kind, _)| kind).collect()
    }

    /// Notifications are dispatched from spawned tasks; give them a moment.
    pub async fn wait_for(&self, count: usize) -> Vec<(NotificationKind, ScheduledTransaction)> {
        for _ in 0..100 {
            if self.sent.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent()
    }

    /// Let any spawned dispatch run, then return what arrived.
    pub async fn settle(&self) -> Vec<(NotificationKind, ScheduledTransaction)> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.sent()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify_success(&self, record: &ScheduledTransaction) -> Result<(), NotifyError> {
        self.record(NotificationKind::Success, record);
        Ok(())
    }

    async fn notify_failure(&self, record: &ScheduledTransaction) -> Result<(), NotifyError> {
        self.record(NotificationKind::Failure, record);
        Ok(())
    }

    async fn notify_delayed_gas_price(&self, record: &ScheduledTransaction) -> Result<(), NotifyError> {
        self.record(NotificationKind::DelayedGasPrice, record);
        Ok(())
    }
}

pub struct FixedGasOracle {
    price: Mutex<u128>,
}

impl FixedGasOracle {
    pub fn new(price: u128) -> Self {
        Self {
            price: Mutex::new(price),
        }
    }

    pub fn set(&self, price: u128) {
        *self.price.lock().unwrap() = price;
    }
}

#[async_trait]
impl GasOracle for FixedGasOracle {
    async fn safe_low_gas_price(&self, _chain_id: ChainId) -> Result<u128, GasOracleError> {
        Ok(*self.price.lock().unwrap())
    }
}

// ---------------------------------------------------------------------------
// Signed transactions
// ---------------------------------------------------------------------------

pub fn signer() -> PrivateKeySigner {
    PrivateKeySigner::random()
}

/// Legacy native transfer signed for `CHAIN`.
pub fn sign_legacy(signer: &PrivateKeySigner, nonce: u64, gas_price: u128, value: u64) -> Bytes {
    let mut tx = TxLegacy {
        chain_id: Some(CHAIN.0),
        nonce,
        gas_price,
        gas_limit: 21_000,
        to: TxKind::Call(Address::repeat_byte(0x42)),
        value: U256::from(value),
        input: Bytes::new(),
    };
    let sig = signer.sign_transaction_sync(&mut tx).unwrap();
    let envelope: TxEnvelope = tx.into_signed(sig).into();
    envelope.encoded_2718().into()
}

/// EIP-1559 native transfer signed for `CHAIN`.
pub fn sign_eip1559(signer: &PrivateKeySigner, nonce: u64, max_fee: u128, priority_fee: u128) -> Bytes {
    let mut tx = TxEip1559 {
        chain_id: CHAIN.0,
        nonce,
        gas_limit: 21_000,
        max_fee_per_gas: max_fee,
        max_priority_fee_per_gas: priority_fee,
        to: TxKind::Call(Address::repeat_byte(0x42)),
        value: U256::from(1u64),
        access_list: Default::default(),
        input: Bytes::new(),
    };
    let sig = signer.sign_transaction_sync(&mut tx).unwrap();
    let envelope: TxEnvelope = tx.into_signed(sig).into();
    envelope.encoded_2718().into()
}

/// A Pending record for `raw`, not yet stored.
pub fn record(raw: Bytes) -> ScheduledTransaction {
    ScheduledTransaction::from_signed(raw, None).unwrap()
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub chain: Arc<MockChainClient>,
    pub repository: Arc<MemoryRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub gas_oracle: Arc<FixedGasOracle>,
    pub in_flight: InFlightSet,
    pub executor: TransactionExecutor,
    pub processor: Arc<Processor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        let chain = Arc::new(MockChainClient::new(CHAIN));
        let repository = Arc::new(MemoryRepository::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let gas_oracle = Arc::new(FixedGasOracle::new(GWEI));
        let in_flight = InFlightSet::new();

        let mut chains = ChainRegistry::new();
        chains.insert(chain.clone());

        let executor = TransactionExecutor::new(
            chains.clone(),
            gas_oracle.clone(),
            notifier.clone(),
            in_flight.clone(),
            config,
        )
        .with_native_symbol(CHAIN, "ETH");

        let processor = Arc::new(Processor::new(
            repository.clone(),
            executor.clone(),
            notifier.clone(),
            chains,
        ));

        Self {
            chain,
            repository,
            notifier,
            gas_oracle,
            in_flight,
            executor,
            processor,
        }
    }

    /// Store `record` and return it with its id.
    pub async fn schedule(&self, record: ScheduledTransaction) -> ScheduledTransaction {
        self.repository.save(record).await.unwrap()
    }

    /// Set the head and run one tick.
    pub async fn tick(&self, block: u64) {
        self.chain.set_block(block);
        self.processor.process(CHAIN, block).await;
    }
}
