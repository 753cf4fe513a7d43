//! 端到端测试：日限额从逼近到耗尽的完整流程
//!
//! 测试场景：
//! 1. 等级层成员按层上限（而非基础上限）累积当日XP
//! 2. 逼近上限时检查接口报告剩余额度
//! 3. 最后一笔发放不截断，当日总量允许越过上限
//! 4. 越过上限后的发放被拒绝，统计计入限额跳过

use leveleron::config::{TierConfig, XpEngineConfig, XpSourceConfig};
use leveleron::engine::XpEngine;
use leveleron::error::{AwardOutcome, SkipReason};
use leveleron::gateway::{MemberInfo, MockGateway};
use leveleron::storage::MemoryStorage;
use std::sync::Arc;

async fn setup_engine() -> XpEngine {
    let mut config = XpEngineConfig::default()
        .with_base_daily_cap(15_000)
        .with_tiers(vec![TierConfig {
            rank: 2,
            role_id: "role-silver".to_string(),
            daily_cap: 20_000,
            multiplier: 1.0,
        }]);
    config.sources.message = XpSourceConfig::new(50, 50, 0);
    config.sources.reaction = XpSourceConfig::new(80, 80, 0);
    config.cache.fallback_cleanup_interval_secs = 3600;

    let gateway = MockGateway::new();
    gateway.add_member(
        "guild-1",
        MemberInfo::new("alice", vec!["role-silver".to_string()]),
    );

    XpEngine::new(
        config,
        Arc::new(MemoryStorage::new()),
        Arc::new(gateway),
        None,
        None,
    )
    .await
    .unwrap()
}

/// 端到端测试：层上限生效、最后一笔不截断、越限后拒绝
#[tokio::test]
async fn test_e2e_daily_cap_exhaustion() {
    let engine = setup_engine().await;

    // Step 1: 399笔消息发放累积到19950
    for i in 0..399 {
        let outcome = engine.handle_message("alice", "guild-1").await;
        assert!(
            matches!(outcome, AwardOutcome::Awarded(_)),
            "第{}笔应当发放成功",
            i
        );
    }

    // Step 2: 剩余额度为50，尚未触达上限
    let check = engine.check_daily_cap("alice", "guild-1").await.unwrap();
    assert!(check.allowed);
    assert_eq!(check.daily_cap, 20_000);
    assert_eq!(check.current, 19_950);
    assert_eq!(check.remaining, 50);

    // Step 3: 80 XP的回应发放整笔入账，不按剩余额度截断
    match engine.handle_reaction("alice", "guild-1").await {
        AwardOutcome::Awarded(result) => {
            assert_eq!(result.awarded, 80);
            assert!(result.capped);
        }
        other => panic!("期望发放成功，实际: {:?}", other),
    }

    let daily = engine
        .get_daily_stats("alice", "guild-1")
        .await
        .unwrap()
        .expect("应有当日记录");
    assert_eq!(daily.total_xp, 20_030);

    // Step 4: 越限后发放被拒绝，剩余额度封底为0
    let blocked = engine.handle_message("alice", "guild-1").await;
    assert!(matches!(
        blocked,
        AwardOutcome::Skipped(SkipReason::DailyCapReached)
    ));

    let exhausted = engine.check_daily_cap("alice", "guild-1").await.unwrap();
    assert!(exhausted.is_at_cap());
    assert_eq!(exhausted.remaining, 0);
    assert_eq!(engine.stats().skipped_cap(), 1);
}

/// 端到端测试：管理员重置后立即恢复发放
#[tokio::test]
async fn test_e2e_admin_reset_reopens_cap() {
    let engine = setup_engine().await;

    for _ in 0..400 {
        engine.handle_message("alice", "guild-1").await;
    }
    assert!(matches!(
        engine.handle_message("alice", "guild-1").await,
        AwardOutcome::Skipped(SkipReason::DailyCapReached)
    ));

    let removed = engine.reset_daily_xp().await.unwrap();
    assert_eq!(removed, 1);

    // 当日记录清空，发放恢复；累计XP不受重置影响
    match engine.handle_message("alice", "guild-1").await {
        AwardOutcome::Awarded(result) => assert_eq!(result.total_xp, 20_050),
        other => panic!("期望发放成功，实际: {:?}", other),
    }
}
