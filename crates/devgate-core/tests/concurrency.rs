//! Concurrency properties of device sessions.
//!
//! Subscribe, unsubscribe, connect and disconnect on one session serialize on
//! its lock; these tests hammer a session from many tasks and check that the
//! subscription counts and the router attachment stay consistent.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use proptest::prelude::*;

use devgate_core::devices::{dummy, sensortag};
use devgate_core::mock::{BackendOp, MockBackend, MockBackendBuilder};
use devgate_core::{
    DeviceOverview, DeviceRegistry, DeviceSession, ProtocolKind, SessionConfig, SharedSession,
};

fn shared_session(name: &str, protocol: ProtocolKind, backend: Arc<MockBackend>) -> SharedSession {
    let registry = DeviceRegistry::with_defaults().unwrap();
    let overview = DeviceOverview::new("dev-1", name, protocol);
    Arc::new(
        registry
            .create_session(&overview, backend, SessionConfig::default())
            .unwrap(),
    )
}

fn slow_backend(protocol: ProtocolKind) -> Arc<MockBackend> {
    Arc::new(
        MockBackendBuilder::new()
            .protocol(protocol)
            .latency(Duration::from_millis(1))
            .build(),
    )
}

// =============================================================================
// Concurrent subscribe / unsubscribe
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscribes_then_unsubscribes() {
    const N: usize = 32;
    const M: usize = 20;

    let backend = slow_backend(ProtocolKind::Dummy);
    let session = shared_session("Dummy Device", ProtocolKind::Dummy, backend.clone());
    session.connect().await.unwrap();

    let subscribes = (0..N).map(|_| {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.subscribe(dummy::COMPONENT).await })
    });
    for result in join_all(subscribes).await {
        result.unwrap().unwrap();
    }
    assert_eq!(session.subscription_count(dummy::COMPONENT).await, N as u32);
    assert_eq!(backend.count(BackendOp::Subscribe).await, 1);

    let unsubscribes = (0..M).map(|_| {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.unsubscribe(dummy::COMPONENT).await })
    });
    for result in join_all(unsubscribes).await {
        result.unwrap().unwrap();
    }
    assert_eq!(
        session.subscription_count(dummy::COMPONENT).await,
        (N - M) as u32
    );
    assert_eq!(backend.count(BackendOp::Unsubscribe).await, 0);
    assert!(session.is_router_attached().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_subscribes_and_unsubscribes() {
    const N: usize = 24;
    const M: usize = 16;

    let backend = slow_backend(ProtocolKind::Dummy);
    let session = shared_session("Dummy Device", ProtocolKind::Dummy, backend.clone());
    session.connect().await.unwrap();

    // Unsubscribes racing ahead of subscribes are ignored, so the final
    // count lies between N - M and N and never underflows.
    let tasks = (0..N + M).map(|i| {
        let session = Arc::clone(&session);
        let unsubscribe = i % 2 == 1 && i / 2 < M;
        tokio::spawn(async move {
            if unsubscribe {
                session.unsubscribe(dummy::COMPONENT).await
            } else {
                session.subscribe(dummy::COMPONENT).await
            }
        })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let count = session.subscription_count(dummy::COMPONENT).await as usize;
    assert!((N - M..=N).contains(&count), "count {} out of range", count);
    assert_eq!(count > 0, session.is_router_attached().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_during_subscriptions() {
    let backend = slow_backend(ProtocolKind::Ble);
    backend
        .set_default_read(vec![0x00u8, 0x80, 0x00, 0x80, 0x10, 0x87, 0x01])
        .await;
    let session = shared_session("CC2650 SensorTag", ProtocolKind::Ble, backend.clone());
    session.connect().await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                session.subscribe(sensortag::HUMIDITY).await
            } else {
                session.read(sensortag::TEMPERATURE).await.map(|_| ())
            }
        }));
    }
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(session.subscription_count(sensortag::HUMIDITY).await, 4);
    assert_eq!(backend.count(BackendOp::Subscribe).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_do_not_share_state() {
    let backend = slow_backend(ProtocolKind::Dummy);
    let registry = DeviceRegistry::with_defaults().unwrap();

    let sessions: Vec<DeviceSession> = (0..4)
        .map(|i| {
            let overview =
                DeviceOverview::new(format!("d{}", i), "Dummy Device", ProtocolKind::Dummy);
            registry
                .create_session(&overview, backend.clone(), SessionConfig::default())
                .unwrap()
        })
        .collect();

    for result in join_all(sessions.iter().map(|s| s.connect())).await {
        result.unwrap();
    }
    join_all(sessions.iter().enumerate().map(|(i, s)| async move {
        for _ in 0..=i {
            s.subscribe(dummy::COMPONENT).await.unwrap();
        }
    }))
    .await;

    for (i, session) in sessions.iter().enumerate() {
        assert_eq!(
            session.subscription_count(dummy::COMPONENT).await,
            i as u32 + 1
        );
    }
    // One backend subscribe per device.
    assert_eq!(backend.count(BackendOp::Subscribe).await, 4);
}

// =============================================================================
// Property tests
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Subscribe,
    Unsubscribe,
    Disconnect,
    Connect,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Subscribe),
        4 => Just(Op::Unsubscribe),
        1 => Just(Op::Disconnect),
        1 => Just(Op::Connect),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// For any operation sequence the count follows a clamped model and the
    /// router is attached exactly while connected with an active subscription.
    #[test]
    fn router_attached_iff_active(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let backend = Arc::new(MockBackend::new(ProtocolKind::Dummy));
            let session = shared_session("Dummy Device", ProtocolKind::Dummy, backend.clone());
            session.connect().await.unwrap();

            let mut connected = true;
            let mut model: u32 = 0;
            for op in ops {
                match op {
                    Op::Subscribe => {
                        if session.subscribe(dummy::COMPONENT).await.is_ok() {
                            model += 1;
                        }
                    }
                    Op::Unsubscribe => {
                        if session.unsubscribe(dummy::COMPONENT).await.is_ok() {
                            model = model.saturating_sub(1);
                        }
                    }
                    Op::Disconnect => {
                        session.disconnect().await.unwrap();
                        connected = false;
                    }
                    Op::Connect => {
                        session.connect().await.unwrap();
                        connected = true;
                    }
                }

                prop_assert_eq!(session.subscription_count(dummy::COMPONENT).await, model);
                prop_assert_eq!(session.is_router_attached().await, connected && model > 0);
            }
            Ok(())
        })?;
    }
}
