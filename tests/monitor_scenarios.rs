// DANS : tests/monitor_scenarios.rs

//! Scénarios de bout en bout du moniteur contre un nœud en mémoire.
//! Le temps tokio est virtuel : backoffs et intervalles de polling sont instantanés.

use async_trait::async_trait;
use pump_monitor::{
    decoders::{
        MonitoredProgram,
        pump::{CLAIM_CASHBACK_DISCRIMINATOR, COLLECT_CREATOR_FEE_DISCRIMINATOR, PUMP_PROGRAM_ID, pump_fee_claims},
    },
    error::{MonitorError, RpcError},
    events::DomainEvent,
    monitor::{ChainEventMonitor, CursorView, EventSink, MonitorHandle, MonitorSettings, StrategyKind},
    rpc::{
        LedgerClient, LedgerTransaction, LogNotification, LogPublisher, LogSubscription, RawInstruction,
        SignatureInfo, SignatureOrder, SignatureQuery,
    },
    state::{Cursor, CursorStore},
};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};
use tokio::time::Instant;

// --- NŒUD EN MÉMOIRE ---

#[derive(Default)]
struct LedgerState {
    /// Historique du programme, du plus ancien au plus récent.
    history: Vec<SignatureInfo>,
    transactions: HashMap<Signature, LedgerTransaction>,
    /// Nombre de réponses `None` restantes avant que la transaction soit visible.
    not_yet_indexed: HashMap<Signature, u32>,
    /// Nombre d'erreurs restantes par signature.
    failing_fetches: HashMap<Signature, u32>,
    failing_pings: u32,
    failing_subscribes: u32,
    publishers: Vec<LogPublisher>,
    fetches: Vec<Signature>,
    fetch_times: Vec<Instant>,
    next_slot: u64,
}

struct MockLedger {
    order: SignatureOrder,
    state: Mutex<LedgerState>,
}

impl MockLedger {
    fn new(order: SignatureOrder) -> Arc<Self> {
        Arc::new(Self {
            order,
            state: Mutex::new(LedgerState {
                next_slot: 100,
                ..LedgerState::default()
            }),
        })
    }

    /// Ajoute une transaction à l'historique du programme.
    fn push(&self, mut tx: LedgerTransaction) -> Signature {
        let mut state = self.state.lock().unwrap();
        state.next_slot += 1;
        tx.slot = state.next_slot;
        let signature = tx.signature;
        state.history.push(SignatureInfo {
            signature,
            slot: tx.slot,
            block_time: tx.block_time,
            failed: !tx.succeeded,
        });
        state.transactions.insert(signature, tx);
        signature
    }

    fn push_failed_signature(&self) -> Signature {
        let mut state = self.state.lock().unwrap();
        state.next_slot += 1;
        let signature = Signature::new_unique();
        let slot = state.next_slot;
        state.history.push(SignatureInfo {
            signature,
            slot,
            block_time: None,
            failed: true,
        });
        signature
    }

    fn publisher(&self, index: usize) -> Option<LogPublisher> {
        self.state.lock().unwrap().publishers.get(index).cloned()
    }

    fn subscriptions(&self) -> usize {
        self.state.lock().unwrap().publishers.len()
    }

    fn fetched(&self, signature: &Signature) -> bool {
        self.state.lock().unwrap().fetches.contains(signature)
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn signature_order(&self) -> SignatureOrder {
        self.order
    }

    async fn ping(&self) -> Result<u64, RpcError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_pings > 0 {
            state.failing_pings -= 1;
            return Err(RpcError::Request {
                method: "get_slot",
                message: "connection refused".to_string(),
            });
        }
        Ok(state.next_slot)
    }

    async fn subscribe_logs(&self, _address: &Pubkey) -> Result<LogSubscription, RpcError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            return Err(RpcError::Subscription("handshake refusé".to_string()));
        }
        let (publisher, subscription) = LogSubscription::channel(16);
        state.publishers.push(publisher);
        Ok(subscription)
    }

    async fn get_signatures_for_address(
        &self,
        _address: &Pubkey,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        let state = self.state.lock().unwrap();
        let position = |wanted: &Signature| state.history.iter().position(|info| &info.signature == wanted);
        let start = query.until.as_ref().and_then(position).map(|p| p + 1).unwrap_or(0);
        let end = query.before.as_ref().and_then(position).unwrap_or(state.history.len());
        let window = &state.history[start.min(end)..end];
        let newest = &window[window.len().saturating_sub(query.limit)..];

        let mut page: Vec<SignatureInfo> = newest.iter().rev().cloned().collect();
        if self.order == SignatureOrder::OldestFirst {
            page.reverse();
        }
        Ok(page)
    }

    async fn get_transaction(&self, signature: &Signature) -> Result<Option<LedgerTransaction>, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.fetches.push(*signature);
        state.fetch_times.push(Instant::now());
        if let Some(remaining) = state.failing_fetches.get_mut(signature).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(RpcError::Request {
                method: "get_transaction",
                message: "429 Too Many Requests".to_string(),
            });
        }
        if let Some(remaining) = state.not_yet_indexed.get_mut(signature).filter(|n| **n > 0) {
            *remaining -= 1;
            return Ok(None);
        }
        Ok(state.transactions.get(signature).cloned())
    }
}

// --- SINK D'ENREGISTREMENT ---

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<DomainEvent>>,
    /// Curseur observé au moment de chaque appel.
    cursors: Mutex<Vec<Option<Cursor>>>,
    view: OnceLock<CursorView>,
    failures_left: Mutex<u32>,
}

impl Recorder {
    fn failing(times: u32) -> Arc<Self> {
        let recorder = Recorder::default();
        *recorder.failures_left.lock().unwrap() = times;
        Arc::new(recorder)
    }

    fn signatures(&self) -> Vec<Signature> {
        self.events.lock().unwrap().iter().map(|e| *e.signature()).collect()
    }

    fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl EventSink for Recorder {
    async fn on_event(&self, event: DomainEvent) -> anyhow::Result<()> {
        self.cursors.lock().unwrap().push(self.view.get().and_then(CursorView::get));
        self.events.lock().unwrap().push(event);
        let mut left = self.failures_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            anyhow::bail!("webhook indisponible");
        }
        Ok(())
    }
}

// --- FABRIQUES ---

fn settings() -> MonitorSettings {
    MonitorSettings {
        poll_interval: Duration::from_secs(1),
        connect_retries: 2,
        connect_retry_delay: Duration::from_millis(10),
        missing_tx_delay: Duration::from_millis(10),
        ..MonitorSettings::default()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Une transaction `collect_creator_fee` réussie : `amount` lamports sortent du vault.
fn claim_tx(amount: u64) -> LedgerTransaction {
    LedgerTransaction {
        signature: Signature::new_unique(),
        slot: 0,
        block_time: Some(1_700_000_000),
        succeeded: true,
        account_keys: vec![Pubkey::new_unique(), Pubkey::new_unique(), PUMP_PROGRAM_ID],
        instructions: vec![RawInstruction {
            program_id: PUMP_PROGRAM_ID,
            accounts: vec![0, 1],
            data: COLLECT_CREATOR_FEE_DISCRIMINATOR.to_vec(),
        }],
        log_messages: vec!["Program log: Instruction: CollectCreatorFee".to_string()],
        pre_balances: vec![0, amount, 1],
        post_balances: vec![amount, 0, 1],
        pre_token_balances: Vec::new(),
        post_token_balances: Vec::new(),
    }
}

/// `collect_creator_fee` puis `claim_cashback` dans la même transaction.
fn double_claim_tx() -> LedgerTransaction {
    let mut tx = claim_tx(500);
    tx.account_keys = vec![
        Pubkey::new_unique(),
        Pubkey::new_unique(),
        Pubkey::new_unique(),
        Pubkey::new_unique(),
        PUMP_PROGRAM_ID,
    ];
    tx.instructions.push(RawInstruction {
        program_id: PUMP_PROGRAM_ID,
        accounts: vec![2, 3],
        data: CLAIM_CASHBACK_DISCRIMINATOR.to_vec(),
    });
    tx.pre_balances = vec![0, 500, 0, 70, 1];
    tx.post_balances = vec![500, 0, 70, 0, 1];
    tx
}

fn notification(signature: Signature) -> LogNotification {
    LogNotification {
        signature,
        slot: 0,
        logs: vec![
            format!("Program {PUMP_PROGRAM_ID} invoke [1]"),
            "Program log: Instruction: CollectCreatorFee".to_string(),
        ],
        failed: false,
    }
}

/// Laisse tourner le temps virtuel jusqu'à ce que `done` soit vrai.
async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition jamais atteinte");
}

/// Laisse passer quelques ticks sans rien attendre de précis.
async fn idle(ticks: u32) {
    tokio::time::sleep(settings().poll_interval * ticks).await;
}

async fn start(
    ledger: &Arc<MockLedger>,
    store: Option<Arc<CursorStore>>,
    strategy: StrategyKind,
    recorder: &Arc<Recorder>,
    settings: MonitorSettings,
) -> MonitorHandle {
    let client: Arc<dyn LedgerClient> = ledger.clone();
    let mut monitor = ChainEventMonitor::new(client, settings);
    if let Some(store) = store {
        monitor = monitor.with_cursor_store(store);
    }
    let sink: Arc<dyn EventSink> = recorder.clone();
    let handle = monitor.start(pump_fee_claims(), strategy, sink).await.unwrap();
    let _ = recorder.view.set(handle.cursor_view());
    handle
}

// --- DÉMARRAGE ---

#[tokio::test(start_paused = true)]
async fn start_rejects_an_empty_program() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    let client: Arc<dyn LedgerClient> = ledger.clone();
    let monitor = ChainEventMonitor::new(client, settings());
    let program = MonitoredProgram {
        instructions: Vec::new(),
        events: Vec::new(),
        ..pump_fee_claims()
    };
    let result = monitor.start(program, StrategyKind::Poll, Recorder::failing(0)).await;
    assert!(matches!(result, Err(MonitorError::Configuration(_))));
}

#[tokio::test(start_paused = true)]
async fn start_gives_up_after_the_connect_budget() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    ledger.state.lock().unwrap().failing_pings = 10;
    let client: Arc<dyn LedgerClient> = ledger.clone();
    let monitor = ChainEventMonitor::new(client, settings());
    let result = monitor
        .start(pump_fee_claims(), StrategyKind::Poll, Recorder::failing(0))
        .await;
    match result {
        Err(MonitorError::Connectivity { attempts, .. }) => assert_eq!(attempts, 2),
        Err(e) => panic!("erreur inattendue : {e}"),
        Ok(_) => panic!("le démarrage aurait dû échouer"),
    }
}

#[tokio::test(start_paused = true)]
async fn start_survives_a_transient_connect_failure() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    ledger.state.lock().unwrap().failing_subscribes = 1;
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Push, &recorder, settings()).await;
    assert_eq!(ledger.subscriptions(), 1);
    handle.stop().await;
}

// --- POLL ---

async fn poll_delivers_in_chain_order(order: SignatureOrder) {
    let ledger = MockLedger::new(order);
    let old = ledger.push(claim_tx(1));
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Poll, &recorder, settings()).await;

    wait_until(|| handle.cursor().is_some()).await;
    assert_eq!(handle.cursor().map(|c| c.signature), Some(old));

    let first = ledger.push(claim_tx(10));
    let second = ledger.push(claim_tx(20));
    wait_until(|| recorder.count() == 2).await;
    handle.stop().await;

    // L'historique antérieur au démarrage n'est pas rejoué.
    assert_eq!(recorder.signatures(), vec![first, second]);
    assert_eq!(handle.cursor().map(|c| c.signature), Some(second));
    assert!(!ledger.fetched(&old));
}

#[tokio::test(start_paused = true)]
async fn poll_delivers_in_chain_order_newest_first() {
    poll_delivers_in_chain_order(SignatureOrder::NewestFirst).await;
}

#[tokio::test(start_paused = true)]
async fn poll_delivers_in_chain_order_oldest_first() {
    poll_delivers_in_chain_order(SignatureOrder::OldestFirst).await;
}

#[tokio::test(start_paused = true)]
async fn cursor_never_moves_ahead_of_an_unfinished_item() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    let anchor = ledger.push(claim_tx(1));
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Poll, &recorder, settings()).await;
    wait_until(|| handle.cursor().is_some()).await;

    let flaky = claim_tx(10);
    let flaky_sig = flaky.signature;
    ledger.state.lock().unwrap().failing_fetches.insert(flaky_sig, 2);
    ledger.push(flaky);
    let next = ledger.push(claim_tx(20));

    wait_until(|| recorder.count() == 2).await;
    handle.stop().await;

    assert_eq!(recorder.signatures(), vec![flaky_sig, next]);
    let seen: Vec<Option<Signature>> = recorder
        .cursors
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.as_ref().map(|c| c.signature))
        .collect();
    // Pendant chaque livraison, le curseur pointe encore sur l'élément précédent.
    assert_eq!(seen, vec![Some(anchor), Some(flaky_sig)]);
    assert_eq!(handle.cursor().map(|c| c.signature), Some(next));
    assert!(handle.stats().rpc_errors >= 2);
}

#[tokio::test(start_paused = true)]
async fn two_instructions_in_one_transaction_yield_two_events() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    ledger.push(claim_tx(1));
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Poll, &recorder, settings()).await;
    wait_until(|| handle.cursor().is_some()).await;

    let signature = ledger.push(double_claim_tx());
    wait_until(|| recorder.count() == 2).await;
    handle.stop().await;

    let events = recorder.events.lock().unwrap().clone();
    assert!(events.iter().all(|e| e.signature() == &signature));
    assert_eq!(events.iter().map(DomainEvent::ordinal).collect::<Vec<_>>(), vec![0, 1]);
    // Les deux livraisons ont eu lieu avant l'avancée du curseur.
    let cursors = recorder.cursors.lock().unwrap().clone();
    assert!(cursors.iter().all(|c| c.as_ref().map(|c| c.signature) != Some(signature)));
    assert_eq!(handle.cursor().map(|c| c.signature), Some(signature));
}

#[tokio::test(start_paused = true)]
async fn malformed_instruction_is_skipped_but_its_sibling_is_delivered() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    ledger.push(claim_tx(1));
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Poll, &recorder, settings()).await;
    wait_until(|| handle.cursor().is_some()).await;

    let mut tx = double_claim_tx();
    tx.instructions[0].accounts.truncate(1);
    let signature = ledger.push(tx);
    wait_until(|| handle.cursor().map(|c| c.signature) == Some(signature)).await;
    handle.stop().await;

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].ordinal(), 0);
    assert_eq!(handle.stats().decode_errors, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_transactions_are_never_delivered() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    ledger.push(claim_tx(1));
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Poll, &recorder, settings()).await;
    wait_until(|| handle.cursor().is_some()).await;

    let listed_as_failed = ledger.push_failed_signature();
    // Listée comme réussie mais `meta.err` non nul dans le détail.
    let mut reverted = claim_tx(10);
    reverted.succeeded = false;
    let reverted_sig = reverted.signature;
    ledger.state.lock().unwrap().transactions.insert(reverted_sig, reverted.clone());
    {
        let mut state = ledger.state.lock().unwrap();
        state.next_slot += 1;
        let slot = state.next_slot;
        state.history.push(SignatureInfo {
            signature: reverted_sig,
            slot,
            block_time: None,
            failed: false,
        });
    }
    let good = ledger.push(claim_tx(20));

    wait_until(|| recorder.count() == 1).await;
    handle.stop().await;

    assert_eq!(recorder.signatures(), vec![good]);
    assert!(!ledger.fetched(&listed_as_failed));
    assert!(ledger.fetched(&reverted_sig));
    assert_eq!(handle.cursor().map(|c| c.signature), Some(good));
}

#[tokio::test(start_paused = true)]
async fn late_transactions_are_retried_on_later_ticks() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    ledger.push(claim_tx(1));
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Poll, &recorder, settings()).await;
    wait_until(|| handle.cursor().is_some()).await;

    let late = claim_tx(10);
    let late_sig = late.signature;
    ledger.state.lock().unwrap().not_yet_indexed.insert(late_sig, 2);
    ledger.push(late);

    wait_until(|| recorder.count() == 1).await;
    handle.stop().await;
    assert_eq!(recorder.signatures(), vec![late_sig]);
}

#[tokio::test(start_paused = true)]
async fn pagination_cap_skips_the_oldest_signatures() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    ledger.push(claim_tx(1));
    let recorder = Recorder::failing(0);
    let capped = MonitorSettings {
        signature_page_limit: 2,
        max_signature_pages: 2,
        ..settings()
    };
    let handle = start(&ledger, None, StrategyKind::Poll, &recorder, capped).await;
    wait_until(|| handle.cursor().is_some()).await;

    // Poussées en bloc entre deux ticks.
    let burst: Vec<Signature> = {
        let txs: Vec<LedgerTransaction> = (0..5).map(|i| claim_tx(10 + i)).collect();
        txs.into_iter().map(|tx| ledger.push(tx)).collect()
    };
    wait_until(|| recorder.count() == 4).await;
    idle(2).await;
    handle.stop().await;

    assert_eq!(recorder.signatures(), burst[1..].to_vec());
}

#[tokio::test(start_paused = true)]
async fn poll_resumes_from_a_persisted_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cursors.json");
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    let seen = ledger.push(claim_tx(1));
    let missed = ledger.push(claim_tx(2));

    let store = Arc::new(CursorStore::open(&path).await.unwrap());
    store
        .save(
            "pump",
            &Cursor {
                signature: seen,
                slot: 101,
                updated_at: unix_now(),
            },
        )
        .await
        .unwrap();

    let recorder = Recorder::failing(0);
    let handle = start(&ledger, Some(store), StrategyKind::Poll, &recorder, settings()).await;
    wait_until(|| recorder.count() == 1).await;
    handle.stop().await;
    assert_eq!(recorder.signatures(), vec![missed]);

    let reopened = CursorStore::open(&path).await.unwrap();
    assert_eq!(reopened.get("pump").await.map(|c| c.signature), Some(missed));
}

#[tokio::test(start_paused = true)]
async fn stale_persisted_cursor_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    let old = ledger.push(claim_tx(1));
    let newest = ledger.push(claim_tx(2));

    let store = Arc::new(CursorStore::open(dir.path().join("cursors.json")).await.unwrap());
    store
        .save(
            "pump",
            &Cursor {
                signature: old,
                slot: 101,
                updated_at: 0,
            },
        )
        .await
        .unwrap();

    let recorder = Recorder::failing(0);
    let handle = start(&ledger, Some(store), StrategyKind::Poll, &recorder, settings()).await;
    wait_until(|| handle.cursor().is_some()).await;
    idle(3).await;
    handle.stop().await;

    // Réancré sur la signature la plus récente : rien n'est rejoué.
    assert_eq!(recorder.count(), 0);
    assert_eq!(handle.cursor().map(|c| c.signature), Some(newest));
}

#[tokio::test(start_paused = true)]
async fn callback_failures_do_not_stop_the_monitor() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    ledger.push(claim_tx(1));
    let recorder = Recorder::failing(1);
    let handle = start(&ledger, None, StrategyKind::Poll, &recorder, settings()).await;
    wait_until(|| handle.cursor().is_some()).await;

    let first = ledger.push(claim_tx(10));
    let second = ledger.push(claim_tx(20));
    wait_until(|| recorder.count() == 2).await;
    idle(2).await;
    handle.stop().await;

    // L'événement en échec n'est pas relivré : sa signature est déjà retenue.
    assert_eq!(recorder.signatures(), vec![first, second]);
    assert_eq!(handle.stats().callback_errors, 1);
    assert_eq!(handle.stats().events, 2);
}

// --- PUSH ---

#[tokio::test(start_paused = true)]
async fn push_drops_duplicate_notifications() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Push, &recorder, settings()).await;

    let signature = ledger.push(claim_tx(10));
    let publisher = ledger.publisher(0).unwrap();
    publisher.publish(notification(signature));
    publisher.publish(notification(signature));
    wait_until(|| recorder.count() == 1).await;

    let other = ledger.push(claim_tx(20));
    publisher.publish(notification(signature));
    publisher.publish(notification(other));
    wait_until(|| recorder.count() == 2).await;
    handle.stop().await;

    assert_eq!(recorder.signatures(), vec![signature, other]);
}

#[tokio::test(start_paused = true)]
async fn push_skips_notifications_that_cannot_match() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Push, &recorder, settings()).await;
    let publisher = ledger.publisher(0).unwrap();

    let failed = ledger.push(claim_tx(10));
    publisher.publish(LogNotification {
        failed: true,
        ..notification(failed)
    });
    let unrelated = ledger.push(claim_tx(20));
    publisher.publish(LogNotification {
        logs: vec!["Program log: Instruction: Buy".to_string()],
        ..notification(unrelated)
    });
    let wanted = ledger.push(claim_tx(30));
    publisher.publish(notification(wanted));

    wait_until(|| recorder.count() == 1).await;
    handle.stop().await;
    assert_eq!(recorder.signatures(), vec![wanted]);
    assert!(!ledger.fetched(&failed));
    assert!(!ledger.fetched(&unrelated));
}

#[tokio::test(start_paused = true)]
async fn push_reconnects_and_never_redelivers() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Push, &recorder, settings()).await;

    let before_drop = ledger.push(claim_tx(10));
    let first = ledger.publisher(0).unwrap();
    first.publish(notification(before_drop));
    wait_until(|| recorder.count() == 1).await;

    // Perte du transport, puis un réabonnement refusé.
    ledger.state.lock().unwrap().failing_subscribes = 1;
    first.close();
    wait_until(|| ledger.subscriptions() == 2).await;

    let after_drop = ledger.push(claim_tx(20));
    let second = ledger.publisher(1).unwrap();
    second.publish(notification(before_drop));
    second.publish(notification(after_drop));
    wait_until(|| recorder.count() == 2).await;
    handle.stop().await;

    assert_eq!(recorder.signatures(), vec![before_drop, after_drop]);
    let stats = handle.stats();
    assert_eq!(stats.reconnects, 2);
    assert!(first.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn push_backs_off_on_rpc_errors() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Push, &recorder, settings()).await;

    let signature = ledger.push(claim_tx(10));
    ledger.state.lock().unwrap().failing_fetches.insert(signature, 2);
    ledger.publisher(0).unwrap().publish(notification(signature));
    wait_until(|| recorder.count() == 1).await;
    handle.stop().await;

    let times = ledger.state.lock().unwrap().fetch_times.clone();
    assert_eq!(times.len(), 3);
    // Base de reconnexion (1 s) puis double, bien au-delà du délai "pas encore indexée".
    assert!(times[1] - times[0] >= Duration::from_secs(1));
    assert!(times[2] - times[1] >= Duration::from_secs(2));
    assert_eq!(handle.stats().rpc_errors, 2);
}

#[tokio::test(start_paused = true)]
async fn push_gives_up_after_the_fetch_budget() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Push, &recorder, settings()).await;

    let signature = ledger.push(claim_tx(10));
    ledger.state.lock().unwrap().failing_fetches.insert(signature, 10);
    ledger.publisher(0).unwrap().publish(notification(signature));
    wait_until(|| handle.stats().rpc_errors == 3).await;
    idle(60).await;
    handle.stop().await;

    assert_eq!(recorder.count(), 0);
    assert_eq!(ledger.state.lock().unwrap().fetches.len(), 3);
}

/// Sink lent : chaque appel dure 5 s.
#[derive(Default)]
struct SlowSink {
    started: AtomicUsize,
    finished: AtomicUsize,
}

#[async_trait]
impl EventSink for SlowSink {
    async fn on_event(&self, _event: DomainEvent) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_the_running_callback_and_starts_no_other() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    let client: Arc<dyn LedgerClient> = ledger.clone();
    let sink = Arc::new(SlowSink::default());
    let handle = ChainEventMonitor::new(client, settings())
        .start(pump_fee_claims(), StrategyKind::Push, sink.clone())
        .await
        .unwrap();

    let publisher = ledger.publisher(0).unwrap();
    for amount in [10, 20, 30] {
        publisher.publish(notification(ledger.push(claim_tx(amount))));
    }
    wait_until(|| sink.started.load(Ordering::SeqCst) == 1).await;

    handle.stop().await;
    assert_eq!(sink.started.load(Ordering::SeqCst), 1);
    assert_eq!(sink.finished.load(Ordering::SeqCst), 1);

    idle(30).await;
    assert_eq!(sink.started.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_final() {
    let ledger = MockLedger::new(SignatureOrder::NewestFirst);
    let recorder = Recorder::failing(0);
    let handle = start(&ledger, None, StrategyKind::Push, &recorder, settings()).await;
    let publisher = ledger.publisher(0).unwrap();

    tokio::join!(handle.stop(), handle.stop());
    handle.stop().await;
    assert!(handle.is_stopped());
    assert!(publisher.is_cancelled());

    let signature = ledger.push(claim_tx(10));
    publisher.publish(notification(signature));
    idle(3).await;
    assert_eq!(recorder.count(), 0);
}
