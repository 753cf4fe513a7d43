//! 发放协调器模块集成测试
//!
//! 覆盖冷却、倍率叠加与升级通知的协作行为。

use async_trait::async_trait;
use leveleron::activity_log::{ActivityLog, ActivityLogConfig};
use leveleron::config::{TierConfig, XpEngineConfig, XpSourceConfig};
use leveleron::coordinator::{LevelUpEvent, LevelUpNotifier, XpAwardCoordinator};
use leveleron::daily_cap::DailyCapLedger;
use leveleron::error::{AwardOutcome, SkipReason};
use leveleron::gateway::MemberInfo;
use leveleron::stats::EngineStats;
use leveleron::storage::MemoryStorage;
use std::sync::{Arc, Mutex};

/// 记录收到的升级事件，供断言使用
#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<LevelUpEvent>>,
}

#[async_trait]
impl LevelUpNotifier for RecordingNotifier {
    async fn on_level_up(&self, event: &LevelUpEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn build_coordinator(
    config: XpEngineConfig,
    notifier: Arc<RecordingNotifier>,
) -> XpAwardCoordinator {
    let storage = Arc::new(MemoryStorage::new());
    let config = Arc::new(config);
    let ledger = Arc::new(DailyCapLedger::new(
        Arc::clone(&storage) as _,
        Arc::clone(&config),
    ));
    XpAwardCoordinator::new(
        storage,
        ledger,
        config,
        notifier,
        Arc::new(ActivityLog::new(ActivityLogConfig::new().enabled(false))),
        Arc::new(EngineStats::default()),
    )
}

#[tokio::test]
async fn test_cooldown_blocks_second_award() {
    let mut config = XpEngineConfig::default();
    config.sources.message = XpSourceConfig::new(10, 10, 60);

    let coordinator = build_coordinator(config, Arc::new(RecordingNotifier::default()));
    let member = MemberInfo::new("alice", vec![]);

    let first = coordinator.award_from_message("alice", "g1", &member).await;
    assert!(matches!(first, AwardOutcome::Awarded(_)));

    let second = coordinator.award_from_message("alice", "g1", &member).await;
    assert!(matches!(
        second,
        AwardOutcome::Skipped(SkipReason::Cooldown)
    ));

    // 冷却按来源独立，回应不受消息冷却影响
    let reaction = coordinator.award_from_reaction("alice", "g1", &member).await;
    assert!(matches!(reaction, AwardOutcome::Awarded(_)));
}

#[tokio::test]
async fn test_tier_and_global_multipliers_stack() {
    let mut config = XpEngineConfig::default().with_global_multiplier(1.5);
    config.sources.message = XpSourceConfig::new(100, 100, 0);
    config.tiers = vec![TierConfig {
        rank: 3,
        role_id: "role-booster".to_string(),
        daily_cap: 50_000,
        multiplier: 2.0,
    }];

    let coordinator = build_coordinator(config, Arc::new(RecordingNotifier::default()));
    let member = MemberInfo::new("alice", vec!["role-booster".to_string()]);

    match coordinator.award_from_message("alice", "g1", &member).await {
        AwardOutcome::Awarded(result) => assert_eq!(result.awarded, 300),
        other => panic!("期望发放成功，实际: {:?}", other),
    }
}

#[tokio::test]
async fn test_level_up_notifies_once() {
    let mut config = XpEngineConfig::default();
    config.sources.message = XpSourceConfig::new(60, 60, 0);

    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = build_coordinator(config, Arc::clone(&notifier));
    let member = MemberInfo::new("alice", vec![]);

    // 60 XP不足以升级，120 XP跨过100的门槛
    let first = coordinator.award_from_message("alice", "g1", &member).await;
    match first {
        AwardOutcome::Awarded(result) => assert!(!result.leveled_up()),
        other => panic!("期望发放成功，实际: {:?}", other),
    }

    let second = coordinator.award_from_message("alice", "g1", &member).await;
    match second {
        AwardOutcome::Awarded(result) => {
            assert!(result.leveled_up());
            assert_eq!(result.new_level, 1);
        }
        other => panic!("期望发放成功，实际: {:?}", other),
    }

    let events = notifier.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].new_level, 1);
}
