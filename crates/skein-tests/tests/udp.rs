//! End-to-end smoke test over real UDP sockets on loopback.
//!
//! Uses short timings and ephemeral ports; everything else runs the same
//! code paths as the simulator tests.

use std::sync::Arc;
use std::time::Duration;

use skein_core::Timings;
use skein_net::{MemStore, NodePool, UdpServer, VirtualNode};
use skein_tests::helpers::content_id;

#[tokio::test]
async fn content_replicates_over_loopback_udp() {
    let timings = Timings::from_secs_f64(Some(0.05), Some(0.05), Some(0.05), Some(0.05));

    let server_a = Arc::new(UdpServer::bind("127.0.0.1:0").await.unwrap());
    let server_b = Arc::new(UdpServer::bind("127.0.0.1:0").await.unwrap());
    let addr_a = server_a.local_addr().unwrap().to_string();

    let pool_a = Arc::new(NodePool::new(server_a.clone(), timings));
    let pool_b = Arc::new(NodePool::new(server_b.clone(), timings));
    pool_b.add_bootstrap(addr_a);
    let recv_a = server_a.spawn_receiver(Arc::clone(&pool_a));
    let recv_b = server_b.spawn_receiver(Arc::clone(&pool_b));

    let blob = b"udp smoke blob".to_vec();
    let id = content_id(&blob);
    pool_a
        .host_virtual_node(VirtualNode::new(
            id,
            Box::new(MemStore::with_data("blob", blob.clone())),
            true,
        ))
        .unwrap();
    let joiner = pool_b
        .host_virtual_node(VirtualNode::new(id, Box::new(MemStore::empty("out")), false))
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while !joiner.has_content() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "content did not replicate in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(joiner.read_content().unwrap(), blob);

    pool_a.shutdown();
    pool_b.shutdown();
    recv_a.abort();
    recv_b.abort();
}
