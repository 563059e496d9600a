// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event replay windows and late-subscriber bootstrap.

use crate::prelude::*;
use berth_core::OpEventName;
use berth_engine::test_helpers::TestContext;
use berth_engine::EngineConfig;

#[tokio::test]
async fn replay_from_last_event_id_has_no_gaps() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let (_, outcome) = ctx.platform.create_project(svc_spec()).await.unwrap();
    let op_id = outcome.op.id.as_str();

    // Full history first
    let all = ctx.platform.subscribe_op_events(op_id, None).await.unwrap();
    let ids: Vec<u64> = all.replay.iter().map(|e| e.id).collect();
    assert_eq!(ids.first(), Some(&1));
    for pair in ids.windows(2) {
        assert_eq!(pair[1], pair[0] + 1);
    }

    // Resume from the middle: strictly the later events, in order
    let resumed = ctx
        .platform
        .subscribe_op_events(op_id, Some(3))
        .await
        .unwrap();
    let resumed_ids: Vec<u64> = resumed.replay.iter().map(|e| e.id).collect();
    let expected: Vec<u64> = ids.iter().copied().filter(|id| *id > 3).collect();
    assert_eq!(resumed_ids, expected);
    assert!(!resumed.needs_bootstrap);
}

#[tokio::test]
async fn subscriber_behind_ring_window_gets_bootstrap() {
    let mut config = EngineConfig::fast();
    config.event_ring = 3;
    let ctx = TestContext::with_config(config);
    ctx.platform.start();
    let (_, outcome) = ctx.platform.create_project(svc_spec()).await.unwrap();
    let op_id = outcome.op.id.as_str();

    let stream = ctx
        .platform
        .subscribe_op_events(op_id, Some(1))
        .await
        .unwrap();
    assert!(stream.needs_bootstrap);
    assert_eq!(stream.replay.len(), 1);

    let bootstrap = &stream.replay[0];
    assert_eq!(bootstrap.name, OpEventName::Bootstrap);
    assert_eq!(bootstrap.payload.op_id, op_id);
    assert_eq!(bootstrap.payload.total_steps, Some(4));
    assert_eq!(bootstrap.payload.progress_percent, Some(100));
    assert!(!bootstrap.payload.hint.is_empty());
    assert!(bootstrap
        .payload
        .artifacts
        .contains(&"build/image.txt".to_string()));
}

#[tokio::test]
async fn within_window_resume_still_replays_tail() {
    let mut config = EngineConfig::fast();
    config.event_ring = 3;
    let ctx = TestContext::with_config(config);
    ctx.platform.start();
    let (_, outcome) = ctx.platform.create_project(svc_spec()).await.unwrap();
    let op_id = outcome.op.id.as_str();

    // The create chain emits 10 events; the ring retains {8,9,10}
    let stream = ctx
        .platform
        .subscribe_op_events(op_id, Some(8))
        .await
        .unwrap();
    assert!(!stream.needs_bootstrap);
    let ids: Vec<u64> = stream.replay.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![9, 10]);
}
