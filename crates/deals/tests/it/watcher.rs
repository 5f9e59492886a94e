use crate::wait_until;
use assert_matches::assert_matches;
use filsync_config::DealWatcherConfig;
use filsync_deals::DealWatcher;
use filsync_interfaces::test_utils::{test_address, test_cid, TestChainClient};
use filsync_primitives::{Cid, DealInfo, DealStatus};
use filsync_tasks::signal;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::error::TryRecvError;
use tracing::Span;

fn deal_info(proposal: Cid, status: DealStatus) -> DealInfo {
    DealInfo {
        proposal_cid: proposal,
        state: status.id(),
        provider: test_address(1000),
        piece_ref: vec![0xca, 0xfe],
        size: 2048,
        price_per_epoch: 500,
        duration: 10_000,
    }
}

fn watcher(
    client: &Arc<TestChainClient>,
    config: DealWatcherConfig,
) -> DealWatcher<Arc<TestChainClient>> {
    DealWatcher::new(client.clone(), config, Span::none())
}

#[tokio::test(start_paused = true)]
async fn emits_only_state_changes() {
    let client = Arc::new(TestChainClient::default());
    let proposal = test_cid(1);
    client.push_deal_info(deal_info(proposal, DealStatus::Accepted));
    client.push_deal_info(deal_info(proposal, DealStatus::Accepted));
    client.push_deal_info(deal_info(proposal, DealStatus::Sealing));

    let (_signal, shutdown) = signal();
    let mut rx = watcher(&client, DealWatcherConfig::default())
        .watch(shutdown, vec![proposal])
        .await
        .unwrap();

    // first refresh after the initial wait
    let state = rx.recv().await.unwrap();
    assert_eq!(state.status(), Some(DealStatus::Accepted));
    assert_eq!(state.state_name, "DealAccepted");
    assert_eq!(client.deal_info_calls(), 1);

    client.notify_head_change(1);
    wait_until(|| client.deal_info_calls() == 2).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_matches!(rx.try_recv(), Err(TryRecvError::Empty));

    client.notify_head_change(2);
    let state = rx.recv().await.unwrap();
    assert_eq!(state.status(), Some(DealStatus::Sealing));
    assert_eq!(state.proposal_cid, proposal);
    assert_eq!(client.deal_info_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn blocked_channel_drops_updates() {
    let client = Arc::new(TestChainClient::default());
    let (first, second) = (test_cid(1), test_cid(2));
    client.push_deal_info(deal_info(first, DealStatus::Staged));
    client.push_deal_info(deal_info(second, DealStatus::Staged));

    let (_signal, shutdown) = signal();
    let mut rx = watcher(&client, DealWatcherConfig::default())
        .watch(shutdown, vec![first, second])
        .await
        .unwrap();

    // the update of `second` waits for the write timeout and is dropped
    wait_until(|| client.deal_info_calls() == 2).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(rx.recv().await.unwrap().proposal_cid, first);
    assert_matches!(rx.try_recv(), Err(TryRecvError::Empty));

    // unchanged states are not sent again
    client.notify_head_change(1);
    wait_until(|| client.deal_info_calls() == 4).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_matches!(rx.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test(start_paused = true)]
async fn failed_queries_are_skipped_for_one_cycle() {
    let client = Arc::new(TestChainClient::default());
    let proposal = test_cid(1);
    client.push_deal_error(proposal);
    client.push_deal_info(deal_info(proposal, DealStatus::Complete));

    let (_signal, shutdown) = signal();
    let mut rx = watcher(&client, DealWatcherConfig::default())
        .watch(shutdown, vec![proposal])
        .await
        .unwrap();

    wait_until(|| client.deal_info_calls() == 1).await;
    client.notify_head_change(1);
    let state = rx.recv().await.unwrap();
    assert_eq!(state.status(), Some(DealStatus::Complete));
    assert_eq!(client.deal_info_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_channel() {
    let client = Arc::new(TestChainClient::default());
    let proposal = test_cid(1);
    client.push_deal_info(deal_info(proposal, DealStatus::Accepted));

    let (signal, shutdown) = signal();
    let mut rx = watcher(&client, DealWatcherConfig::default())
        .watch(shutdown, vec![proposal])
        .await
        .unwrap();
    signal.fire();

    assert!(rx.recv().await.is_none());
    assert_eq!(client.deal_info_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_receiver_ends_watch() {
    let client = Arc::new(TestChainClient::default());
    let proposal = test_cid(1);
    client.push_deal_info(deal_info(proposal, DealStatus::Accepted));
    client.push_deal_info(deal_info(proposal, DealStatus::Staged));

    let (_signal, shutdown) = signal();
    let rx = watcher(&client, DealWatcherConfig::default())
        .watch(shutdown, vec![proposal])
        .await
        .unwrap();
    drop(rx);

    wait_until(|| client.deal_info_calls() == 1).await;
    client.notify_head_change(1);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(client.deal_info_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn fallback_interval_refreshes_without_head_changes() {
    let client = Arc::new(TestChainClient::default());
    let proposal = test_cid(1);
    client.push_deal_info(deal_info(proposal, DealStatus::Accepted));
    client.push_deal_info(deal_info(proposal, DealStatus::Sealing));

    let config = DealWatcherConfig {
        fallback_interval: Some(Duration::from_secs(30)),
        ..Default::default()
    };
    let (_signal, shutdown) = signal();
    let mut rx = watcher(&client, config).watch(shutdown, vec![proposal]).await.unwrap();

    assert_eq!(rx.recv().await.unwrap().status(), Some(DealStatus::Accepted));
    assert_eq!(rx.recv().await.unwrap().status(), Some(DealStatus::Sealing));
    assert_eq!(client.deal_info_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn ended_head_changes_stop_watch_after_last_refresh() {
    let client = Arc::new(TestChainClient::default());
    let proposal = test_cid(1);
    client.push_deal_info(deal_info(proposal, DealStatus::Accepted));

    let (_signal, shutdown) = signal();
    let mut rx = watcher(&client, DealWatcherConfig::default())
        .watch(shutdown, vec![proposal])
        .await
        .unwrap();
    client.close_head_changes();

    assert_eq!(rx.recv().await.unwrap().status(), Some(DealStatus::Accepted));
    assert!(rx.recv().await.is_none());
}
