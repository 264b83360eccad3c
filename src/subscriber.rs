//! Live history refresh
//!
//! Listens for logs from the contract and rebuilds the history feed when
//! one arrives. Rebuild requests go through a one-slot queue drained by a
//! single consumer task:
//! - at most one rebuild runs at a time, so `HistoryStore::replace` has a
//!   single writer
//! - any number of events arriving during a rebuild collapse into exactly
//!   one follow-up rebuild
//! - after `stop`, no further rebuild starts and the result of an
//!   in-flight rebuild is discarded
//!
//! If the log subscription ends on its own, the subscriber stops as if
//! `stop` had been called and reports `Idle`.

use crate::chain::{LogFilter, LogSubscription};
use crate::error::ChainError;
use crate::history::{HistoryBuilder, HistoryEntry};
use crate::store::HistoryStore;
use alloy_primitives::Address;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of the live subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Idle,
    Listening,
    Rebuilding,
}

/// Rebuilds `store` from `start_block` to the chain head on new contract logs.
pub struct LiveSubscriber {
    builder: Arc<HistoryBuilder>,
    store: Arc<HistoryStore>,
    contract: Address,
    start_block: u64,
}

impl LiveSubscriber {
    pub fn new(builder: Arc<HistoryBuilder>, store: Arc<HistoryStore>, contract: Address) -> Self {
        Self {
            builder,
            store,
            contract,
            start_block: 0,
        }
    }

    /// First block included in every rebuild (genesis by default).
    pub fn with_start_block(mut self, start_block: u64) -> Self {
        self.start_block = start_block;
        self
    }

    /// Subscribe to the contract's logs and start listening.
    pub async fn start(self) -> Result<SubscriberHandle, ChainError> {
        let subscription = self
            .builder
            .chain()
            .subscribe(LogFilter::address(self.contract))
            .await?;
        info!("Listening for logs from contract 0x{:x}", self.contract);

        let (state_tx, state_rx) = watch::channel(SubscriberState::Listening);
        let state_tx = Arc::new(state_tx);
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        let stopped = Arc::new(Mutex::new(false));
        let rebuilds = Arc::new(AtomicU64::new(0));

        let listener = tokio::spawn(listen(
            subscription,
            trigger_tx.clone(),
            stop_rx,
            state_tx.clone(),
            stopped.clone(),
        ));
        let rebuilder = tokio::spawn(rebuild_loop(
            self,
            trigger_rx,
            state_tx.clone(),
            stopped.clone(),
            rebuilds.clone(),
        ));

        Ok(SubscriberHandle {
            state_rx,
            state_tx,
            trigger: trigger_tx,
            stop_tx,
            stopped,
            rebuilds,
            listener,
            rebuilder,
        })
    }

    async fn rebuild(&self) -> Result<Vec<HistoryEntry>, ChainError> {
        self.builder
            .scan_to_head(self.start_block, self.contract)
            .await
    }
}

/// Queue a rebuild unless one is already queued.
fn request(trigger: &mpsc::Sender<()>) -> bool {
    match trigger.try_send(()) {
        Ok(()) => true,
        Err(TrySendError::Full(())) => {
            debug!("Rebuild already queued, coalescing");
            false
        }
        Err(TrySendError::Closed(())) => false,
    }
}

async fn listen(
    mut subscription: LogSubscription,
    trigger: mpsc::Sender<()>,
    mut stop: watch::Receiver<bool>,
    state: Arc<watch::Sender<SubscriberState>>,
    stopped: Arc<Mutex<bool>>,
) {
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            log = subscription.next() => match log {
                Some(log) => {
                    debug!(
                        "New log from 0x{:x} in block {:?} (tx {:?})",
                        log.address, log.block_number, log.transaction_hash
                    );
                    request(&trigger);
                }
                None => {
                    warn!("Log subscription ended, stopping live updates");
                    let mut stopped = stopped.lock().await;
                    *stopped = true;
                    state.send_replace(SubscriberState::Idle);
                    break;
                }
            },
        }
    }
    subscription.cancel();
}

async fn rebuild_loop(
    subscriber: LiveSubscriber,
    mut trigger: mpsc::Receiver<()>,
    state: Arc<watch::Sender<SubscriberState>>,
    stopped: Arc<Mutex<bool>>,
    rebuilds: Arc<AtomicU64>,
) {
    while trigger.recv().await.is_some() {
        {
            let stopped = stopped.lock().await;
            if *stopped {
                break;
            }
            state.send_replace(SubscriberState::Rebuilding);
        }

        let result = subscriber.rebuild().await;

        // Held across the write so `stop` cannot interleave with it.
        let stopped = stopped.lock().await;
        if *stopped {
            info!("Stopped during rebuild, discarding result");
            break;
        }
        match result {
            Ok(entries) => {
                info!("History rebuilt: {} entries", entries.len());
                subscriber.store.replace(entries);
                rebuilds.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => warn!("Rebuild failed, keeping previous history: {}", e),
        }
        state.send_replace(SubscriberState::Listening);
    }
}

/// Control handle returned by `LiveSubscriber::start`.
pub struct SubscriberHandle {
    state_rx: watch::Receiver<SubscriberState>,
    state_tx: Arc<watch::Sender<SubscriberState>>,
    trigger: mpsc::Sender<()>,
    stop_tx: watch::Sender<bool>,
    stopped: Arc<Mutex<bool>>,
    rebuilds: Arc<AtomicU64>,
    listener: JoinHandle<()>,
    rebuilder: JoinHandle<()>,
}

impl SubscriberHandle {
    pub fn state(&self) -> SubscriberState {
        *self.state_rx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<SubscriberState> {
        self.state_rx.clone()
    }

    /// Queue a rebuild, e.g. after submitting a transaction.
    ///
    /// Returns false when a rebuild was already queued.
    pub fn request_rebuild(&self) -> bool {
        request(&self.trigger)
    }

    /// Number of rebuilds whose result reached the store.
    pub fn completed_rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::SeqCst)
    }

    /// Cancel the subscription and wait for both tasks to finish.
    ///
    /// An in-flight rebuild runs to completion but its result is not
    /// written to the store.
    pub async fn stop(self) {
        let SubscriberHandle {
            state_tx,
            trigger,
            stop_tx,
            stopped,
            listener,
            rebuilder,
            ..
        } = self;

        {
            let mut stopped = stopped.lock().await;
            *stopped = true;
            state_tx.send_replace(SubscriberState::Idle);
        }
        let _ = stop_tx.send(true);
        drop(trigger);

        if let Err(e) = listener.await {
            warn!("Log listener task failed: {}", e);
        }
        if let Err(e) = rebuilder.await {
            warn!("Rebuild task failed: {}", e);
        }
        info!("Live subscriber stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::CandidateDirectory;
    use crate::history::TxStatus;
    use crate::registry::START_VOTING;
    use crate::testutil::*;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn candidates() -> Arc<dyn CandidateDirectory> {
        Arc::new(vec!["Alice".to_string(), "Bob".to_string()])
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    fn sentinel() -> HistoryEntry {
        HistoryEntry {
            label: "Voting".into(),
            hash: hash(999),
            timestamp: 1,
            block_number: 0,
            from: SENDER,
            status: TxStatus::Success,
            details: "Voting (Block: 0)".into(),
        }
    }

    fn setup(chain: MockChain) -> (Arc<MockChain>, LiveSubscriber, Arc<HistoryStore>) {
        let chain = Arc::new(chain);
        let builder = Arc::new(HistoryBuilder::new(chain.clone(), candidates()));
        let store = Arc::new(HistoryStore::new());
        let subscriber = LiveSubscriber::new(builder, store.clone(), CONTRACT);
        (chain, subscriber, store)
    }

    #[tokio::test]
    async fn test_log_triggers_rebuild() {
        let mut chain = MockChain::new(5);
        chain.add_tx(3, Some(CONTRACT), START_VOTING.to_vec(), true);
        let logs = chain.log_feed();
        let (_chain, subscriber, store) = setup(chain);

        let handle = subscriber.start().await.unwrap();
        assert_eq!(handle.state(), SubscriberState::Listening);

        logs.send(contract_log(3)).await.unwrap();
        wait_until(|| handle.completed_rebuilds() == 1).await;

        let current = store.current();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].label, "Voting has begun");
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_events_during_rebuild_coalesce() {
        let gate = Arc::new(Semaphore::new(0));
        let mut chain = MockChain::new(3);
        chain.add_tx(2, Some(CONTRACT), START_VOTING.to_vec(), true);
        let logs = chain.log_feed();
        let (chain, subscriber, _store) = setup(chain.gated(gate.clone()));
        let handle = subscriber.start().await.unwrap();

        logs.send(contract_log(1)).await.unwrap();
        wait_until(|| chain.height_calls() == 1).await;
        assert_eq!(handle.state(), SubscriberState::Rebuilding);

        // Two more events while the first rebuild is blocked.
        logs.send(contract_log(2)).await.unwrap();
        logs.send(contract_log(3)).await.unwrap();
        wait_until(|| logs.capacity() == logs.max_capacity()).await;

        gate.add_permits(10);
        wait_until(|| handle.completed_rebuilds() == 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(chain.height_calls(), 2);
        assert_eq!(handle.completed_rebuilds(), 2);
        assert_eq!(handle.state(), SubscriberState::Listening);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_store_and_listens() {
        let mut chain = MockChain::new(10);
        chain.add_tx(2, Some(CONTRACT), START_VOTING.to_vec(), true);
        chain.make_unreachable(4);
        let logs = chain.log_feed();
        let (chain, subscriber, store) = setup(chain);
        store.replace(vec![sentinel()]);
        let before = store.current();

        let handle = subscriber.start().await.unwrap();
        logs.send(contract_log(4)).await.unwrap();
        wait_until(|| chain.height_calls() == 1).await;
        wait_until(|| handle.state() == SubscriberState::Listening).await;

        assert_eq!(store.current(), before);
        assert_eq!(handle.completed_rebuilds(), 0);

        // Still listening: the next event triggers another attempt.
        logs.send(contract_log(5)).await.unwrap();
        wait_until(|| chain.height_calls() == 2).await;
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_discards_in_flight_rebuild() {
        let gate = Arc::new(Semaphore::new(0));
        let mut chain = MockChain::new(3);
        chain.add_tx(1, Some(CONTRACT), START_VOTING.to_vec(), true);
        let logs = chain.log_feed();
        let (chain, subscriber, store) = setup(chain.gated(gate.clone()));
        let handle = subscriber.start().await.unwrap();
        let state = handle.state_changes();

        logs.send(contract_log(1)).await.unwrap();
        wait_until(|| chain.height_calls() == 1).await;

        let stopping = tokio::spawn(handle.stop());
        wait_until(|| *state.borrow() == SubscriberState::Idle).await;
        gate.add_permits(10);
        stopping.await.unwrap();

        assert!(store.is_empty());
        assert_eq!(*state.borrow(), SubscriberState::Idle);
        // Subscription cancelled: nothing is delivered any more.
        assert!(logs.send(contract_log(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_request_rebuild() {
        let mut chain = MockChain::new(2);
        chain.add_tx(2, Some(CONTRACT), START_VOTING.to_vec(), true);
        let _logs = chain.log_feed();
        let (_chain, subscriber, store) = setup(chain);

        let handle = subscriber.with_start_block(2).start().await.unwrap();
        assert!(handle.request_rebuild());
        wait_until(|| handle.completed_rebuilds() == 1).await;
        assert_eq!(store.len(), 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_ended_subscription_goes_idle() {
        let mut chain = MockChain::new(2);
        chain.add_tx(1, Some(CONTRACT), START_VOTING.to_vec(), true);
        let logs = chain.log_feed();
        let (chain, subscriber, store) = setup(chain);
        let handle = subscriber.start().await.unwrap();
        assert_eq!(handle.state(), SubscriberState::Listening);

        drop(logs);
        wait_until(|| handle.state() == SubscriberState::Idle).await;

        // No rebuild runs once the feed is gone.
        handle.request_rebuild();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(chain.height_calls(), 0);
        assert_eq!(handle.completed_rebuilds(), 0);
        assert!(store.is_empty());
        assert_eq!(handle.state(), SubscriberState::Idle);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_start_fails_without_log_feed() {
        let (_chain, subscriber, _store) = setup(MockChain::new(1));
        let err = subscriber.start().await.err().unwrap();
        assert!(err.is_fatal());
    }
}
