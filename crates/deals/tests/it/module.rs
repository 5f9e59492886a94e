use crate::wait_until;
use assert_matches::assert_matches;
use filsync_deals::{DealConfig, DealModule, DealsError, Query};
use filsync_interfaces::{
    test_utils::{test_address, test_ask, test_cid, TestChainClient},
    ChainError, MemoryDatastore,
};
use filsync_primitives::{DealInfo, DealStatus};
use tracing::Span;

fn module(client: TestChainClient) -> DealModule<TestChainClient, MemoryDatastore> {
    DealModule::new(
        client,
        MemoryDatastore::new(),
        Default::default(),
        Default::default(),
        Span::none(),
    )
}

#[tokio::test]
async fn store_imports_data_and_starts_deals() {
    let client = TestChainClient::default();
    client.set_import_cid(test_cid(42));
    client.fail_start_deal(test_address(2));
    let module = module(client);

    let configs = vec![
        DealConfig { miner: test_address(1), epoch_price: 100 },
        DealConfig { miner: test_address(2), epoch_price: 200 },
        DealConfig { miner: test_address(3), epoch_price: 300 },
    ];
    let wallet = test_address(99);
    let result = module.store(&wallet, &b"some data"[..], &configs, 1000).await.unwrap();

    assert_eq!(result.proposals.len(), 2);
    assert_eq!(result.failed, vec![configs[1].clone()]);

    module.close().await;
}

#[tokio::test]
async fn store_records_every_started_deal() {
    let client = std::sync::Arc::new(TestChainClient::default());
    client.set_import_cid(test_cid(7));
    let module = DealModule::new(
        client.clone(),
        MemoryDatastore::new(),
        Default::default(),
        Default::default(),
        Span::none(),
    );

    let configs = vec![DealConfig { miner: test_address(5), epoch_price: 10 }];
    let result = module.store(&test_address(99), &b"payload"[..], &configs, 500).await.unwrap();
    assert_eq!(result.proposals.len(), 1);
    assert!(result.failed.is_empty());

    assert_eq!(client.imported_data(), vec![b"payload".to_vec()]);
    let started = client.started_deals();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].data, test_cid(7));
    assert_eq!(started[0].client, test_address(99));
    assert_eq!(started[0].miner, test_address(5));
    assert_eq!(started[0].epoch_price, 10);
    assert_eq!(started[0].duration, 500);

    module.close().await;
}

#[tokio::test]
async fn info_names_the_state() {
    let client = TestChainClient::default();
    let proposal = test_cid(3);
    client.push_deal_info(DealInfo {
        proposal_cid: proposal,
        state: DealStatus::Failed.id(),
        provider: test_address(1),
        piece_ref: vec![],
        size: 0,
        price_per_epoch: 0,
        duration: 0,
    });
    let module = module(client);

    let state = module.info(&proposal).await.unwrap();
    assert_eq!(state.state_name, "DealFailed");

    assert_matches!(
        module.info(&test_cid(4)).await,
        Err(DealsError::Chain(ChainError::NotFound(_)))
    );
    module.close().await;
}

#[tokio::test]
async fn watch_without_proposals_fails() {
    let module = module(TestChainClient::default());
    let (_signal, shutdown) = filsync_tasks::signal();
    assert_matches!(module.watch(shutdown, vec![]).await, Err(DealsError::NoProposals));
    module.close().await;
}

#[tokio::test(start_paused = true)]
async fn serves_cached_asks_and_closes_twice() {
    let module = module(TestChainClient::with_asks([
        test_ask(1, 40, 0),
        test_ask(2, 20, 0),
        test_ask(3, 30, 1 << 20),
    ]));
    let query = Query { max_price: Some(35), piece_size: 1024, limit: 10, offset: 0 };
    wait_until(|| !module.available_asks(&query).is_empty()).await;

    let asks = module.available_asks(&query);
    assert_eq!(asks.iter().map(|ask| ask.price).collect::<Vec<_>>(), vec![20]);

    module.close().await;
    module.close().await;
}
