//! 语音跟踪模块集成测试
//!
//! 通过引擎入口驱动语音状态机与巡检。

use leveleron::config::{XpEngineConfig, XpSourceConfig};
use leveleron::engine::XpEngine;
use leveleron::gateway::{MemberInfo, MockGateway};
use leveleron::storage::{MemoryStorage, XpStorage};
use std::sync::Arc;

struct VoiceHarness {
    engine: XpEngine,
    storage: Arc<MemoryStorage>,
    gateway: Arc<MockGateway>,
}

async fn voice_harness() -> VoiceHarness {
    let mut config = XpEngineConfig::default();
    // 零冷却使每轮巡检都可发放
    config.sources.voice = XpSourceConfig::new(10, 10, 0);
    config.cache.fallback_cleanup_interval_secs = 3600;

    let storage = Arc::new(MemoryStorage::new());
    let gateway = Arc::new(MockGateway::new());
    gateway.add_channel("g1", "voice-1");
    for user in ["alice", "bob"] {
        gateway.add_member("g1", MemberInfo::new(user, vec![]));
    }

    let engine = XpEngine::new(
        config,
        Arc::clone(&storage) as Arc<dyn XpStorage>,
        Arc::clone(&gateway) as _,
        None,
        None,
    )
    .await
    .unwrap();

    VoiceHarness {
        engine,
        storage,
        gateway,
    }
}

async fn join(h: &VoiceHarness, user: &str) {
    h.gateway.set_voice_state("g1", user, Some("voice-1"));
    h.engine
        .handle_voice_state(user, "g1", Some("voice-1"), false, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_sweep_awards_cohabiting_members() {
    let h = voice_harness().await;
    join(&h, "alice").await;
    join(&h, "bob").await;

    h.engine.sweep_voice_now().await;

    assert_eq!(h.engine.stats().voice_awards(), 2);
    let record = h.storage.get_user_xp("alice", "g1").await.unwrap().unwrap();
    assert_eq!(record.total_xp, 10);
    // 在场时长按巡检间隔入账
    assert_eq!(record.voice_time_secs, 300);
}

#[tokio::test]
async fn test_solo_member_earns_nothing() {
    let h = voice_harness().await;
    join(&h, "alice").await;

    h.engine.sweep_voice_now().await;

    assert_eq!(h.engine.stats().voice_awards(), 0);
    // 会话保留，下轮有人加入后恢复发放
    assert!(h
        .storage
        .get_voice_session("alice", "g1")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_leave_removes_session() {
    let h = voice_harness().await;
    join(&h, "alice").await;

    h.gateway.set_voice_state("g1", "alice", None);
    h.engine
        .handle_voice_state("alice", "g1", None, false, false)
        .await
        .unwrap();

    assert!(h
        .storage
        .get_voice_session("alice", "g1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_sweep_prunes_dead_channel_sessions() {
    let h = voice_harness().await;
    join(&h, "alice").await;
    join(&h, "bob").await;

    h.gateway.remove_channel("g1", "voice-1");
    h.engine.sweep_voice_now().await;

    assert_eq!(h.engine.stats().voice_awards(), 0);
    assert!(h
        .storage
        .get_voice_sessions("g1")
        .await
        .unwrap()
        .is_empty());
}
