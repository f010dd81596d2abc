//! Swarm membership gossip and end-to-end content fetch.

use skein_core::Timings;
use skein_tests::helpers::*;
use std::time::Duration;

const P1: &str = "127.0.0.1:9001";
const P2: &str = "127.0.0.2:9002";

/// Fast-forward until `check` holds, failing after `limit` of virtual time.
async fn wait_for(limit: Duration, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {limit:?}"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn joiner_fetches_content_from_swarm() {
    let net = SimNetwork::new();
    let pool_a = net.pool(P1, Timings::default());
    let pool_b = net.pool(P2, Timings::default());
    pool_b.add_bootstrap(P1);

    let blob = [0x41u8, 0x42];
    let publisher = host_blob(&pool_a, &blob);
    let joiner = join_swarm(&pool_b, content_id(&blob));
    assert!(!joiner.has_content());

    // Five stabilization passes are ample for discovery plus fetch.
    wait_for(Duration::from_secs(5), || joiner.has_content()).await;

    assert_eq!(joiner.read_content().unwrap(), blob);
    assert_eq!(content_id(&joiner.read_content().unwrap()), joiner.id());

    // Gossip works both ways: each side's swarm lists the other endpoint.
    wait_for(Duration::from_secs(5), || {
        publisher.summary().swarm.contains(&P2.to_string())
            && joiner.summary().swarm.contains(&P1.to_string())
    })
    .await;

    pool_a.shutdown();
    pool_b.shutdown();
}

#[tokio::test(start_paused = true)]
async fn one_endpoint_serves_multiple_swarms() {
    let net = SimNetwork::new();
    let pool_a = net.pool(P1, Timings::default());
    let pool_b = net.pool(P2, Timings::default());
    pool_b.add_bootstrap(P1);

    let blob_one = b"content of the first swarm".to_vec();
    let blob_two = b"content of the second swarm".to_vec();
    host_blob(&pool_a, &blob_one);
    host_blob(&pool_a, &blob_two);

    let join_one = join_swarm(&pool_b, content_id(&blob_one));
    let join_two = join_swarm(&pool_b, content_id(&blob_two));

    wait_for(Duration::from_secs(10), || {
        join_one.has_content() && join_two.has_content()
    })
    .await;

    assert_eq!(join_one.read_content().unwrap(), blob_one);
    assert_eq!(join_two.read_content().unwrap(), blob_two);

    pool_a.shutdown();
    pool_b.shutdown();
}

#[tokio::test(start_paused = true)]
async fn isolated_host_keeps_empty_tables() {
    let net = SimNetwork::new();
    let pool = net.pool(P1, Timings::default());
    let node = host_blob(&pool, b"abc");

    // Sample between passes.
    tokio::time::sleep(Duration::from_millis(5500)).await;

    let summary = node.summary();
    assert!(node.has_content());
    assert_eq!(summary.predecessor, None);
    assert_eq!(summary.successor, None);
    assert!(summary.fingers.iter().all(Option::is_none));
    assert!(summary.swarm.is_empty());

    pool.shutdown();
}
