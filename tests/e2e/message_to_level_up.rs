//! 端到端测试：消息发放到升级的完整流程
//!
//! 测试场景：
//! 1. 新成员发送消息获得首笔XP
//! 2. 持续活跃积累XP并跨越升级门槛
//! 3. 升级事件外发通知
//! 4. 排行榜与个人统计反映最新状态

use async_trait::async_trait;
use leveleron::config::{XpEngineConfig, XpSourceConfig};
use leveleron::coordinator::{LevelUpEvent, LevelUpNotifier};
use leveleron::engine::XpEngine;
use leveleron::error::AwardOutcome;
use leveleron::gateway::{MemberInfo, MockGateway};
use leveleron::storage::MemoryStorage;
use std::sync::{Arc, Mutex};

struct CollectingNotifier {
    events: Mutex<Vec<LevelUpEvent>>,
}

#[async_trait]
impl LevelUpNotifier for CollectingNotifier {
    async fn on_level_up(&self, event: &LevelUpEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

async fn setup_engine(notifier: Arc<CollectingNotifier>) -> XpEngine {
    let mut config = XpEngineConfig::default();
    config.sources.message = XpSourceConfig::new(50, 50, 0);
    config.cache.fallback_cleanup_interval_secs = 3600;

    let gateway = MockGateway::new();
    gateway.add_member("guild-1", MemberInfo::new("alice", vec![]));
    gateway.add_member("guild-1", MemberInfo::new("bob", vec![]));

    XpEngine::new(
        config,
        Arc::new(MemoryStorage::new()),
        Arc::new(gateway),
        None,
        Some(notifier as Arc<dyn LevelUpNotifier>),
    )
    .await
    .unwrap()
}

/// 端到端测试：持续发消息直到升级
#[tokio::test]
async fn test_e2e_message_to_level_up() {
    let notifier = Arc::new(CollectingNotifier {
        events: Mutex::new(Vec::new()),
    });
    let engine = setup_engine(Arc::clone(&notifier)).await;

    // Step 1: 首笔发放
    let first = engine.handle_message("alice", "guild-1").await;
    match first {
        AwardOutcome::Awarded(result) => {
            assert_eq!(result.awarded, 50);
            assert_eq!(result.new_level, 0);
        }
        other => panic!("期望发放成功，实际: {:?}", other),
    }

    // Step 2: 第二笔跨过100 XP的1级门槛
    let second = engine.handle_message("alice", "guild-1").await;
    match second {
        AwardOutcome::Awarded(result) => {
            assert!(result.leveled_up());
            assert_eq!(result.new_level, 1);
            assert_eq!(result.total_xp, 100);
        }
        other => panic!("期望发放成功，实际: {:?}", other),
    }

    // Step 3: 升级通知恰好一次
    {
        let events = notifier.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id, "alice");
        assert_eq!(events[0].old_level, 0);
        assert_eq!(events[0].new_level, 1);
    }

    // Step 4: 个人统计与排行榜
    let stats = engine
        .get_user_stats("alice", "guild-1")
        .await
        .unwrap()
        .expect("应有记录");
    assert_eq!(stats.record.level, 1);
    assert_eq!(stats.daily_xp_today, 100);
    assert_eq!(stats.rank, Some(1));

    engine.handle_message("bob", "guild-1").await;
    engine.invalidate_guild_cache("guild-1").await;
    let board = engine.get_leaderboard("guild-1", 10).await.unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].user_id, "alice");
    assert_eq!(board[1].user_id, "bob");
}

/// 端到端测试：等级只进不退
#[tokio::test]
async fn test_e2e_level_never_regresses() {
    let notifier = Arc::new(CollectingNotifier {
        events: Mutex::new(Vec::new()),
    });
    let engine = setup_engine(Arc::clone(&notifier)).await;

    for _ in 0..6 {
        engine.handle_message("alice", "guild-1").await;
    }

    let stats = engine
        .get_user_stats("alice", "guild-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.record.total_xp, 300);
    assert_eq!(stats.record.level, 2);

    // 每个门槛各通知一次：100 XP升1级，255 XP升2级
    let events = notifier.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].new_level, 2);
}
