use crate::wait_until;
use filsync_config::AskCacheConfig;
use filsync_deals::{asks::ask_key, AskCache, Query};
use filsync_interfaces::{
    test_utils::{test_address, test_ask, TestChainClient, TestDatastore},
    Datastore, DatastoreExt, MemoryDatastore,
};
use filsync_primitives::TokenAmount;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tracing::Span;

type TestCache = AskCache<Arc<TestChainClient>, Arc<TestDatastore>>;

fn start(client: &Arc<TestChainClient>, datastore: &Arc<TestDatastore>) -> TestCache {
    AskCache::new(client.clone(), datastore.clone(), AskCacheConfig::default(), Span::none())
}

fn prices(cache: &TestCache) -> Vec<TokenAmount> {
    cache.snapshot().iter().map(|ask| ask.price).collect()
}

#[tokio::test(start_paused = true)]
async fn first_cycle_runs_immediately_and_persists() {
    filsync_tracing::init_test_tracing();
    let client = Arc::new(TestChainClient::with_asks([test_ask(1, 30, 0), test_ask(2, 10, 0)]));
    let datastore = Arc::new(TestDatastore::default());
    let cache = start(&client, &datastore);

    wait_until(|| !cache.snapshot().is_empty()).await;
    assert_eq!(prices(&cache), vec![10, 30]);
    assert_eq!(client.list_miners_calls(), 1);
    assert_eq!(datastore.put_count(), 2);
    let persisted = datastore.get_json(&ask_key(&test_address(1))).unwrap();
    assert_eq!(persisted, Some(test_ask(1, 30, 0)));

    cache.close().await;
}

#[tokio::test(start_paused = true)]
async fn refreshes_on_interval() {
    let client = Arc::new(TestChainClient::with_asks([test_ask(1, 30, 0)]));
    let datastore = Arc::new(TestDatastore::default());
    let cache = start(&client, &datastore);
    wait_until(|| !cache.snapshot().is_empty()).await;

    client.add_ask(test_ask(2, 5, 0));
    tokio::time::sleep(Duration::from_secs(11)).await;
    wait_until(|| cache.snapshot().len() == 2).await;
    assert_eq!(prices(&cache), vec![5, 30]);
    assert_eq!(client.list_miners_calls(), 2);

    cache.close().await;
}

#[tokio::test(start_paused = true)]
async fn failed_persistence_keeps_previous_snapshot() {
    let client = Arc::new(TestChainClient::with_asks([test_ask(1, 30, 0), test_ask(2, 10, 0)]));
    let datastore = Arc::new(TestDatastore::default());
    let cache = start(&client, &datastore);
    wait_until(|| !cache.snapshot().is_empty()).await;
    let before = cache.snapshot();

    datastore.set_fail_puts(true);
    client.add_ask(test_ask(1, 1, 0));
    client.add_ask(test_ask(3, 2, 0));
    wait_until(|| client.list_miners_calls() == 3).await;

    assert_eq!(cache.snapshot(), before);
    assert_eq!(prices(&cache), vec![10, 30]);

    datastore.set_fail_puts(false);
    wait_until(|| cache.snapshot().len() == 3).await;
    assert_eq!(prices(&cache), vec![1, 2, 10]);

    cache.close().await;
}

#[tokio::test(start_paused = true)]
async fn failed_listing_keeps_previous_snapshot() {
    let client = Arc::new(TestChainClient::with_asks([test_ask(1, 30, 0)]));
    let datastore = Arc::new(TestDatastore::default());
    let cache = start(&client, &datastore);
    wait_until(|| !cache.snapshot().is_empty()).await;

    client.set_list_miners_error(true);
    client.add_ask(test_ask(2, 5, 0));
    wait_until(|| client.list_miners_calls() == 3).await;
    assert_eq!(prices(&cache), vec![30]);
    assert_eq!(client.query_ask_calls(), 1);

    cache.close().await;
}

#[tokio::test(start_paused = true)]
async fn failing_and_slow_miners_are_skipped() {
    let client = Arc::new(TestChainClient::with_asks([
        test_ask(1, 30, 0),
        test_ask(2, 20, 0),
        test_ask(3, 10, 0),
        test_ask(4, 40, 0),
    ]));
    client.fail_ask(test_address(2));
    client.fail_peer_id(test_address(3));
    // longer than the query timeout
    client.set_ask_delay(test_address(4), Duration::from_secs(25));
    client.add_miner(test_address(5));

    let datastore = Arc::new(TestDatastore::default());
    let cache = start(&client, &datastore);
    wait_until(|| !cache.snapshot().is_empty()).await;

    let miners = cache.snapshot().iter().map(|ask| ask.miner).collect::<Vec<_>>();
    assert_eq!(miners, vec![test_address(1)]);

    cache.close().await;
}

#[tokio::test(start_paused = true)]
async fn ask_queries_are_bounded() {
    let client = Arc::new(TestChainClient::with_asks((0..200).map(|i| test_ask(i, i as u128, 0))));
    let datastore = Arc::new(TestDatastore::default());
    let cache = start(&client, &datastore);
    wait_until(|| cache.snapshot().len() == 200).await;

    assert!(client.max_asks_in_flight() <= 50);
    assert!(client.max_asks_in_flight() > 1);
    let snapshot = cache.snapshot();
    assert!(snapshot.windows(2).all(|pair| pair[0].price <= pair[1].price));

    cache.close().await;
}

#[tokio::test(start_paused = true)]
async fn starts_with_persisted_asks() {
    let datastore = Arc::new(TestDatastore::default());
    for ask in [test_ask(1, 30, 0), test_ask(2, 10, 0), test_ask(3, 20, 0)] {
        datastore.put_json(&ask_key(&ask.miner), &ask).unwrap();
    }
    let client = Arc::new(TestChainClient::default());
    client.set_list_miners_error(true);

    let cache = start(&client, &datastore);
    assert_eq!(prices(&cache), vec![10, 20, 30]);

    wait_until(|| client.list_miners_calls() == 1).await;
    assert_eq!(prices(&cache), vec![10, 20, 30]);

    cache.close().await;
}

#[tokio::test(start_paused = true)]
async fn corrupt_persisted_ask_is_skipped() {
    let datastore = Arc::new(TestDatastore::default());
    for ask in [test_ask(1, 30, 0), test_ask(3, 20, 0)] {
        datastore.put_json(&ask_key(&ask.miner), &ask).unwrap();
    }
    datastore.put(&ask_key(&test_address(2)), b"{\"miner\":".to_vec()).unwrap();
    let client = Arc::new(TestChainClient::default());
    client.set_list_miners_error(true);

    let cache = start(&client, &datastore);
    assert_eq!(prices(&cache), vec![20, 30]);

    cache.close().await;
}

#[tokio::test(start_paused = true)]
async fn close_waits_for_cycle_in_flight() {
    let client = Arc::new(TestChainClient::with_asks([test_ask(1, 30, 0), test_ask(2, 10, 0)]));
    client.set_ask_delay(test_address(1), Duration::from_secs(5));
    let datastore = Arc::new(TestDatastore::default());
    let cache = start(&client, &datastore);

    wait_until(|| client.query_ask_calls() == 2).await;
    assert!(cache.snapshot().is_empty());

    cache.close().await;
    // the cycle completed before the loop exited
    assert_eq!(prices(&cache), vec![10, 30]);
    assert_eq!(client.list_miners_calls(), 1);

    cache.close().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(client.list_miners_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_see_whole_snapshots() {
    let client = Arc::new(TestChainClient::with_asks((0..50).map(|i| test_ask(i, i as u128, 0))));
    // every ask carries the refresh cycle that fetched it
    client.stamp_asks_with_listing();
    let config =
        AskCacheConfig { refresh_interval: Duration::from_millis(2), ..Default::default() };
    let cache = Arc::new(AskCache::new(
        client.clone(),
        Arc::new(MemoryDatastore::new()),
        config,
        Span::none(),
    ));

    let writer = {
        let client = client.clone();
        tokio::spawn(async move {
            for generation in 1..50u128 {
                for i in 0..50u64 {
                    client.add_ask(test_ask(i, (i as u128 * 7 + generation * 13) % 100, 0));
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    let query = Query { max_price: None, piece_size: 0, limit: 100, offset: 0 };
    let mut cycles = HashSet::new();
    while !writer.is_finished() {
        let snapshot = cache.snapshot();
        assert!(snapshot.windows(2).all(|pair| pair[0].price <= pair[1].price));
        assert!(snapshot.windows(2).all(|pair| pair[0].timestamp == pair[1].timestamp));
        cycles.extend(snapshot.first().map(|ask| ask.timestamp));

        let asks = cache.available_asks(&query);
        assert!(asks.windows(2).all(|pair| pair[0].price <= pair[1].price));
        assert!(asks.windows(2).all(|pair| pair[0].timestamp == pair[1].timestamp));
        assert!(asks.len() <= 50);
        tokio::task::yield_now().await;
    }
    assert!(cycles.len() > 1, "only saw cycles {cycles:?}");

    cache.close().await;
}
