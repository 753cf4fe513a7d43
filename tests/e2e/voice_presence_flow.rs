//! 端到端测试：语音在场从加入到离开的完整流程
//!
//! 测试场景：
//! 1. 两名成员加入语音频道，巡检为双方发放XP
//! 2. 一名成员静音，后续巡检按AFK倍率折减
//! 3. 成员移动到空频道后双方独处，发放暂停但时长继续累积
//! 4. 离开频道删除会话，后续巡检不再涉及该成员

use leveleron::config::{XpEngineConfig, XpSourceConfig};
use leveleron::engine::XpEngine;
use leveleron::gateway::{MemberInfo, MockGateway};
use leveleron::storage::{MemoryStorage, XpStorage};
use std::sync::Arc;

struct Scenario {
    engine: XpEngine,
    storage: Arc<MemoryStorage>,
    gateway: Arc<MockGateway>,
}

async fn setup() -> Scenario {
    let mut config = XpEngineConfig::default();
    config.sources.voice = XpSourceConfig::new(8, 8, 0);
    config.cache.fallback_cleanup_interval_secs = 3600;

    let storage = Arc::new(MemoryStorage::new());
    let gateway = Arc::new(MockGateway::new());
    gateway.add_channel("guild-1", "lounge");
    gateway.add_channel("guild-1", "study");
    gateway.add_member("guild-1", MemberInfo::new("alice", vec![]));
    gateway.add_member("guild-1", MemberInfo::new("bob", vec![]));

    let engine = XpEngine::new(
        config,
        Arc::clone(&storage) as Arc<dyn XpStorage>,
        Arc::clone(&gateway) as _,
        None,
        None,
    )
    .await
    .unwrap();

    Scenario {
        engine,
        storage,
        gateway,
    }
}

async fn move_to(s: &Scenario, user: &str, channel: Option<&str>, muted: bool) {
    s.gateway.set_voice_state("guild-1", user, channel);
    s.engine
        .handle_voice_state(user, "guild-1", channel, muted, false)
        .await
        .unwrap();
}

/// 端到端测试：语音在场完整流程
#[tokio::test]
async fn test_e2e_voice_presence_flow() {
    let s = setup().await;

    // Step 1: 双方加入，首轮巡检各得8 XP
    move_to(&s, "alice", Some("lounge"), false).await;
    move_to(&s, "bob", Some("lounge"), false).await;
    s.engine.sweep_voice_now().await;

    assert_eq!(s.engine.stats().voice_awards(), 2);
    assert_eq!(s.engine.stats().xp_awarded(), 16);

    // Step 2: alice静音，下一轮按0.25倍折减为2
    move_to(&s, "alice", Some("lounge"), true).await;
    s.engine.sweep_voice_now().await;

    let alice = s
        .storage
        .get_user_xp("alice", "guild-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.total_xp, 10);
    let bob = s.storage.get_user_xp("bob", "guild-1").await.unwrap().unwrap();
    assert_eq!(bob.total_xp, 16);

    // Step 3: bob移入空频道，双方独处，发放暂停但时长照常累积
    move_to(&s, "bob", Some("study"), false).await;
    s.engine.sweep_voice_now().await;

    assert_eq!(s.engine.stats().voice_awards(), 4);
    let alice = s
        .storage
        .get_user_xp("alice", "guild-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.total_xp, 10);
    assert_eq!(alice.voice_time_secs, 900);

    // Step 4: 双方离开，会话清空
    move_to(&s, "alice", None, false).await;
    move_to(&s, "bob", None, false).await;
    assert!(s
        .storage
        .get_voice_sessions("guild-1")
        .await
        .unwrap()
        .is_empty());

    s.engine.sweep_voice_now().await;
    assert_eq!(s.engine.stats().voice_awards(), 4);
}
