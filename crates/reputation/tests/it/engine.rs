use assert_matches::assert_matches;
use filsync_config::ReputationConfig;
use filsync_index::{
    AskIndex, IndexPublisher, MinerPower, PowerIndex, Slashes, SlashingIndex,
};
use filsync_interfaces::{
    test_utils::{test_address, test_ask, TestDatastore, TestSourceClient},
    MemoryDatastore,
};
use filsync_reputation::{Indices, MinerScore, ReputationEngine, ReputationError};
use multiaddr::Multiaddr;
use std::{sync::Arc, time::Duration};
use tracing::Span;

type TestEngine = ReputationEngine<MemoryDatastore, Arc<TestSourceClient>>;

struct Publishers {
    power: IndexPublisher<PowerIndex>,
    slashing: IndexPublisher<SlashingIndex>,
    asks: IndexPublisher<AskIndex>,
}

impl Publishers {
    /// Miner 1 has more power and asks below the median, miner 2 doesn't.
    fn new() -> Self {
        Self {
            power: IndexPublisher::new(power_index(&[(1, 0.6), (2, 0.4)])),
            slashing: IndexPublisher::default(),
            asks: IndexPublisher::new(AskIndex::from_asks([
                test_ask(1, 10, 0),
                test_ask(2, 20, 0),
                test_ask(3, 30, 0),
            ])),
        }
    }

    fn indices(&self) -> Indices<'_> {
        Indices { power: &self.power, slashing: &self.slashing, asks: &self.asks }
    }
}

fn power_index(miners: &[(u64, f64)]) -> PowerIndex {
    PowerIndex {
        power: miners
            .iter()
            .map(|(id, relative)| (test_address(*id), MinerPower { power: 1, relative: *relative }))
            .collect(),
    }
}

fn source_addr(port: u16) -> Multiaddr {
    format!("/ip4/10.0.0.1/tcp/{port}").parse().unwrap()
}

fn start(publishers: &Publishers, sources: &Arc<TestSourceClient>) -> TestEngine {
    ReputationEngine::new(
        MemoryDatastore::new(),
        sources.clone(),
        publishers.indices(),
        ReputationConfig::default(),
        Span::none(),
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn ranks_current_snapshots_on_start() {
    filsync_tracing::init_test_tracing();
    let publishers = Publishers::new();
    let engine = start(&publishers, &Arc::default());
    wait_until(|| engine.rebuild_count() == 1).await;

    assert_eq!(engine.miner_count(), 2);
    assert_eq!(
        engine.get_top_miners(2).unwrap(),
        vec![
            MinerScore { addr: test_address(1), score: 72 },
            MinerScore { addr: test_address(2), score: 58 },
        ]
    );
    engine.close();
}

#[tokio::test(start_paused = true)]
async fn top_miners_bounds() {
    let publishers = Publishers::new();
    let engine = start(&publishers, &Arc::default());
    wait_until(|| engine.rebuild_count() == 1).await;

    assert!(engine.get_top_miners(0).unwrap().is_empty());
    let top = engine.get_top_miners(1).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].addr, test_address(1));
    assert_matches!(
        engine.get_top_miners(3),
        Err(ReputationError::NotEnoughMiners { requested: 3, available: 2 })
    );
    engine.close();
}

#[tokio::test(start_paused = true)]
async fn index_updates_trigger_rebuilds() {
    let publishers = Publishers::new();
    let engine = start(&publishers, &Arc::default());
    wait_until(|| engine.rebuild_count() == 1).await;

    publishers.power.publish(power_index(&[(1, 0.5), (2, 0.3), (3, 0.2)]));
    wait_until(|| engine.miner_count() == 3).await;

    let mut slashing = SlashingIndex::default();
    slashing.miners.insert(test_address(1), Slashes { epochs: vec![100, 200] });
    publishers.slashing.publish(slashing);
    // 50 * 0.25 + 20 * 0.5 + 10
    wait_until(|| engine.get_top_miners(3).unwrap().iter().any(|s| s.score == 32)).await;

    let top = engine.get_top_miners(3).unwrap();
    assert_eq!(top[0], MinerScore { addr: test_address(2), score: 56 });
    assert_eq!(top[1], MinerScore { addr: test_address(3), score: 54 });
    assert_eq!(top[2], MinerScore { addr: test_address(1), score: 32 });
    assert!(top.windows(2).all(|pair| pair[0].score >= pair[1].score));
    engine.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn updates_during_a_rebuild_are_coalesced() {
    let publishers = Publishers::new();
    let datastore = Arc::new(TestDatastore::default());
    datastore.hold_queries();
    let engine = ReputationEngine::new(
        datastore.clone(),
        Arc::new(TestSourceClient::default()),
        publishers.indices(),
        ReputationConfig::default(),
        Span::none(),
    );
    // the first rebuild is stuck reading the sources
    wait_until(|| datastore.held_queries() == 1).await;

    for id in 3..6 {
        publishers.power.publish(power_index(&[(1, 0.6), (2, 0.4), (id, 0.1)]));
    }
    wait_until(|| engine.index_update_count() == 3).await;
    assert_eq!(engine.rebuild_count(), 0);

    datastore.release_queries();
    wait_until(|| engine.rebuild_count() == 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // the first rebuild plus one for the whole burst
    assert_eq!(engine.rebuild_count(), 2);
    assert_eq!(engine.miner_count(), 3);
    assert_eq!(engine.get_top_miners(3).unwrap()[2].addr, test_address(5));
    engine.close();
}

#[tokio::test(start_paused = true)]
async fn refreshed_sources_count_with_their_weight() {
    let publishers = Publishers::new();
    let sources = Arc::new(TestSourceClient::default());
    sources.set_scores(source_addr(1), [(test_address(2), 2)]);
    sources.set_scores(source_addr(2), [(test_address(2), 4), (test_address(1), -1)]);

    let engine = start(&publishers, &sources);
    engine.add_source("first", source_addr(1)).unwrap();
    engine.add_source_with_weight("second", source_addr(2), 0.5).unwrap();
    wait_until(|| engine.rebuild_count() == 1).await;

    // the first refresh happens after the refresh interval
    tokio::time::sleep(Duration::from_secs(91)).await;
    wait_until(|| engine.rebuild_count() == 2).await;
    assert_eq!(sources.fetch_count(), 2);

    // miner 2: 50 + 8 + 20 * (2 + 0.5 * 4), miner 1: 50 + 12 + 10 + 20 * (0.5 * -1)
    assert_eq!(
        engine.get_top_miners(2).unwrap(),
        vec![
            MinerScore { addr: test_address(2), score: 138 },
            MinerScore { addr: test_address(1), score: 62 },
        ]
    );
    let registered = engine.sources().unwrap();
    assert!(registered.iter().all(|source| source.last_refresh.is_some()));
    engine.close();
}

#[tokio::test(start_paused = true)]
async fn unreachable_source_keeps_previous_scores() {
    let publishers = Publishers::new();
    let sources = Arc::new(TestSourceClient::default());
    sources.set_scores(source_addr(1), [(test_address(2), 5)]);

    let engine = start(&publishers, &sources);
    engine.add_source("flaky", source_addr(1)).unwrap();
    tokio::time::sleep(Duration::from_secs(91)).await;
    wait_until(|| engine.rebuild_count() == 2).await;
    assert_eq!(engine.get_top_miners(1).unwrap()[0].score, 158);

    sources.set_unreachable(source_addr(1), true);
    tokio::time::sleep(Duration::from_secs(90)).await;
    wait_until(|| sources.fetch_count() == 2).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(engine.rebuild_count(), 2);
    assert_eq!(engine.get_top_miners(1).unwrap()[0].score, 158);
    engine.close();
}

#[tokio::test]
async fn invalid_sources_are_rejected() {
    let publishers = Publishers::new();
    let engine = start(&publishers, &Arc::default());

    engine.add_source("a", source_addr(1)).unwrap();
    assert_matches!(
        engine.add_source("a", source_addr(2)),
        Err(ReputationError::DuplicateSource(_))
    );
    assert_matches!(
        engine.add_source_with_weight("b", source_addr(2), -0.1),
        Err(ReputationError::InvalidWeight(_))
    );
    assert_matches!(
        engine.add_source("", source_addr(2)),
        Err(ReputationError::InvalidSourceId(_))
    );
    assert_eq!(engine.sources().unwrap().len(), 1);
    engine.close();
}

#[tokio::test(start_paused = true)]
async fn close_is_immediate_and_idempotent() {
    let publishers = Publishers::new();
    let engine = start(&publishers, &Arc::default());
    wait_until(|| engine.rebuild_count() == 1).await;

    engine.close();
    engine.close();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(publishers.power.listener_count(), 0);

    publishers.power.publish(power_index(&[(9, 1.0)]));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(engine.rebuild_count(), 1);
    assert_eq!(engine.miner_count(), 2);
}
