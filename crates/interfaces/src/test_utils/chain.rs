//! Testing support for the chain client.

use crate::chain::{ChainClient, ChainError, ChainResult, HeadChangeStream};
use async_trait::async_trait;
use cid::{multihash::Multihash, Cid};
use filsync_primitives::{
    Address, ChainEpoch, DealInfo, HeadChange, PeerId, StorageAsk, TokenAmount,
};
use futures::{future, StreamExt};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Raw codec used for generated test cids.
const RAW_CODEC: u64 = 0x55;
/// sha2-256 multihash code.
const SHA2_256: u64 = 0x12;

/// Returns a deterministic, valid cid derived from `seed`.
pub fn test_cid(seed: u8) -> Cid {
    let hash = Multihash::<64>::wrap(SHA2_256, &[seed; 32]).expect("digest fits");
    Cid::new_v1(RAW_CODEC, hash)
}

/// Returns the id address `f0<id>`.
pub fn test_address(id: u64) -> Address {
    Address::new_id(id)
}

/// Returns an ask of `miner` with the given price and minimum piece size.
pub fn test_ask(miner: u64, price: TokenAmount, min_piece_size: u64) -> StorageAsk {
    StorageAsk { miner: test_address(miner), price, min_piece_size, timestamp: 1, expiry: 1_000 }
}

/// A deal start request recorded by [`TestChainClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedDeal {
    /// The imported data.
    pub data: Cid,
    /// The client wallet.
    pub client: Address,
    /// The miner.
    pub miner: Address,
    /// Price per epoch.
    pub epoch_price: TokenAmount,
    /// Duration in epochs.
    pub duration: u64,
}

#[derive(Debug, Default)]
struct ChainState {
    miners: Vec<Address>,
    fail_list_miners: bool,
    failing_peers: HashSet<Address>,
    asks: HashMap<Address, StorageAsk>,
    failing_asks: HashSet<Address>,
    ask_delays: HashMap<Address, Duration>,
    stamp_asks_with_listing: bool,
    deal_infos: HashMap<Cid, VecDeque<ChainResult<DealInfo>>>,
    failing_deal_miners: HashSet<Address>,
    started_deals: Vec<StartedDeal>,
    import_cid: Option<Cid>,
    imported: Vec<Vec<u8>>,
    fail_notify: bool,
}

/// A scripted [`ChainClient`].
///
/// Miners, asks and deal infos are configured up front (or changed while a test runs); failures
/// and latencies can be injected per miner.
#[derive(Debug)]
pub struct TestChainClient {
    state: Mutex<ChainState>,
    head_changes: Mutex<Option<broadcast::Sender<Vec<HeadChange>>>>,
    list_miners_calls: AtomicUsize,
    query_ask_calls: AtomicUsize,
    deal_info_calls: AtomicUsize,
    asks_in_flight: AtomicUsize,
    max_asks_in_flight: AtomicUsize,
}

impl Default for TestChainClient {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            state: Default::default(),
            head_changes: Mutex::new(Some(tx)),
            list_miners_calls: Default::default(),
            query_ask_calls: Default::default(),
            deal_info_calls: Default::default(),
            asks_in_flight: Default::default(),
            max_asks_in_flight: Default::default(),
        }
    }
}

impl TestChainClient {
    /// Creates a client that knows the given asks, miners are listed in the given order.
    pub fn with_asks(asks: impl IntoIterator<Item = StorageAsk>) -> Self {
        let client = Self::default();
        for ask in asks {
            client.add_ask(ask);
        }
        client
    }

    /// Registers a miner and its ask; replaces the ask if the miner is known.
    pub fn add_ask(&self, ask: StorageAsk) {
        let mut state = self.state.lock();
        if !state.miners.contains(&ask.miner) {
            state.miners.push(ask.miner);
        }
        state.asks.insert(ask.miner, ask);
    }

    /// Registers a miner without an ask, querying it fails.
    pub fn add_miner(&self, miner: Address) {
        let mut state = self.state.lock();
        if !state.miners.contains(&miner) {
            state.miners.push(miner);
        }
    }

    /// Makes `list_miners` fail.
    pub fn set_list_miners_error(&self, fail: bool) {
        self.state.lock().fail_list_miners = fail;
    }

    /// Makes resolving the peer id of `miner` fail.
    pub fn fail_peer_id(&self, miner: Address) {
        self.state.lock().failing_peers.insert(miner);
    }

    /// Makes querying the ask of `miner` fail.
    pub fn fail_ask(&self, miner: Address) {
        self.state.lock().failing_asks.insert(miner);
    }

    /// Delays every ask query of `miner`.
    pub fn set_ask_delay(&self, miner: Address, delay: Duration) {
        self.state.lock().ask_delays.insert(miner, delay);
    }

    /// Answers every ask query with the number of `list_miners` calls so far as its timestamp,
    /// tagging each ask with the refresh cycle that fetched it.
    pub fn stamp_asks_with_listing(&self) {
        self.state.lock().stamp_asks_with_listing = true;
    }

    /// Queues the next answer for the proposal of `info`.
    ///
    /// Answers are consumed in order, the last one is repeated.
    pub fn push_deal_info(&self, info: DealInfo) {
        self.state.lock().deal_infos.entry(info.proposal_cid).or_default().push_back(Ok(info));
    }

    /// Queues a failed answer for `proposal`.
    pub fn push_deal_error(&self, proposal: Cid) {
        self.state
            .lock()
            .deal_infos
            .entry(proposal)
            .or_default()
            .push_back(Err(ChainError::rpc("ClientGetDealInfo", "deal info unavailable")));
    }

    /// Makes starting a deal with `miner` fail.
    pub fn fail_start_deal(&self, miner: Address) {
        self.state.lock().failing_deal_miners.insert(miner);
    }

    /// Returns all successfully started deals.
    pub fn started_deals(&self) -> Vec<StartedDeal> {
        self.state.lock().started_deals.clone()
    }

    /// Sets the cid returned by `import`.
    pub fn set_import_cid(&self, cid: Cid) {
        self.state.lock().import_cid = Some(cid);
    }

    /// Returns the content of every imported file.
    pub fn imported_data(&self) -> Vec<Vec<u8>> {
        self.state.lock().imported.clone()
    }

    /// Makes `chain_notify` fail.
    pub fn set_notify_error(&self, fail: bool) {
        self.state.lock().fail_notify = fail;
    }

    /// Sends a head change to all subscribers.
    pub fn notify_head_change(&self, height: ChainEpoch) {
        if let Some(tx) = self.head_changes.lock().as_ref() {
            let _ = tx.send(vec![HeadChange::apply(height)]);
        }
    }

    /// Ends all head change subscriptions.
    pub fn close_head_changes(&self) {
        self.head_changes.lock().take();
    }

    /// Returns the number of `list_miners` calls.
    pub fn list_miners_calls(&self) -> usize {
        self.list_miners_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of `query_ask` calls.
    pub fn query_ask_calls(&self) -> usize {
        self.query_ask_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of `deal_info` calls.
    pub fn deal_info_calls(&self) -> usize {
        self.deal_info_calls.load(Ordering::SeqCst)
    }

    /// Returns the highest number of concurrently running ask queries observed.
    pub fn max_asks_in_flight(&self) -> usize {
        self.max_asks_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even if the query is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for TestChainClient {
    async fn list_miners(&self, _height: Option<ChainEpoch>) -> ChainResult<Vec<Address>> {
        self.list_miners_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.fail_list_miners {
            return Err(ChainError::rpc("StateListMiners", "node unavailable"))
        }
        Ok(state.miners.clone())
    }

    async fn miner_peer_id(
        &self,
        miner: &Address,
        _height: Option<ChainEpoch>,
    ) -> ChainResult<PeerId> {
        let state = self.state.lock();
        if state.failing_peers.contains(miner) || !state.miners.contains(miner) {
            return Err(ChainError::NotFound(format!("peer id of {miner}")))
        }
        Ok(PeerId::new(format!("peer-{miner}")))
    }

    async fn query_ask(&self, _peer: &PeerId, miner: &Address) -> ChainResult<StorageAsk> {
        self.query_ask_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.asks_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.asks_in_flight);
        self.max_asks_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = self.state.lock().ask_delays.get(miner).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        } else {
            // let other queries of the batch start
            tokio::task::yield_now().await;
        }

        let state = self.state.lock();
        if state.failing_asks.contains(miner) {
            return Err(ChainError::rpc("ClientQueryAsk", format!("{miner} refused connection")))
        }
        let mut ask = state
            .asks
            .get(miner)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("ask of {miner}")))?;
        if state.stamp_asks_with_listing {
            ask.timestamp = self.list_miners_calls() as u64;
        }
        Ok(ask)
    }

    async fn deal_info(&self, proposal: &Cid) -> ChainResult<DealInfo> {
        self.deal_info_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let Some(answers) = state.deal_infos.get_mut(proposal) else {
            return Err(ChainError::NotFound(format!("deal {proposal}")))
        };
        if answers.len() > 1 {
            answers.pop_front().expect("not empty")
        } else {
            let last = answers.front().cloned();
            last.unwrap_or_else(|| Err(ChainError::NotFound(proposal.to_string())))
        }
    }

    async fn start_deal(
        &self,
        data: &Cid,
        client: &Address,
        miner: &Address,
        epoch_price: TokenAmount,
        duration: u64,
    ) -> ChainResult<Cid> {
        let mut state = self.state.lock();
        if state.failing_deal_miners.contains(miner) {
            return Err(ChainError::rpc("ClientStartDeal", format!("{miner} rejected the deal")))
        }
        state.started_deals.push(StartedDeal {
            data: *data,
            client: *client,
            miner: *miner,
            epoch_price,
            duration,
        });
        Ok(test_cid(100 + state.started_deals.len() as u8))
    }

    async fn import(&self, path: &Path) -> ChainResult<Cid> {
        let data =
            std::fs::read(path).map_err(|err| ChainError::rpc("ClientImport", err.to_string()))?;
        let mut state = self.state.lock();
        state.imported.push(data);
        Ok(state.import_cid.unwrap_or_else(|| test_cid(0)))
    }

    async fn chain_notify(&self) -> ChainResult<HeadChangeStream> {
        if self.state.lock().fail_notify {
            return Err(ChainError::rpc("ChainNotify", "subscriptions disabled"))
        }
        let rx = match self.head_changes.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => return Err(ChainError::rpc("ChainNotify", "node shutting down")),
        };
        Ok(BroadcastStream::new(rx).filter_map(|changes| future::ready(changes.ok())).boxed())
    }
}
