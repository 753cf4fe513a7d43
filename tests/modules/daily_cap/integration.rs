//! 日限额模块集成测试
//!
//! 覆盖业务日界、等级层上限解析与限额检查的组合行为。

use chrono::{TimeZone, Utc};
use leveleron::config::{ResetConfig, TierConfig, TimezoneRule, XpEngineConfig};
use leveleron::daily_cap::{business_day_key, is_daylight_saving, DailyCapLedger};
use leveleron::gateway::MemberInfo;
use leveleron::storage::{MemoryStorage, XpSource, XpStorage};
use std::sync::Arc;

fn tiered_config() -> XpEngineConfig {
    XpEngineConfig::default()
        .with_base_daily_cap(15_000)
        .with_tiers(vec![
            TierConfig {
                rank: 2,
                role_id: "role-silver".to_string(),
                daily_cap: 20_000,
                multiplier: 1.0,
            },
            TierConfig {
                rank: 5,
                role_id: "role-gold".to_string(),
                daily_cap: 30_000,
                multiplier: 1.5,
            },
        ])
}

#[test]
fn test_business_day_rolls_at_reset_time() {
    let rule = TimezoneRule::default();
    let reset = ResetConfig::default();

    // 1月15日UTC 12:00，当地07:00，早于19:35，归入前一日
    let before = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
    assert_eq!(business_day_key(before, &rule, &reset), "2026-01-14");

    // 1月16日UTC 01:00，当地1月15日20:00，已过重置时刻
    let after = Utc.with_ymd_and_hms(2026, 1, 16, 1, 0, 0).unwrap();
    assert_eq!(business_day_key(after, &rule, &reset), "2026-01-15");
}

#[test]
fn test_daylight_saving_window() {
    let rule = TimezoneRule::default();

    let winter = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();
    assert!(!is_daylight_saving(winter, &rule));

    let summer = Utc.with_ymd_and_hms(2026, 7, 10, 12, 0, 0).unwrap();
    assert!(is_daylight_saving(summer, &rule));
}

#[tokio::test]
async fn test_highest_tier_rank_wins() {
    let storage = Arc::new(MemoryStorage::new());
    let ledger = DailyCapLedger::new(storage, Arc::new(tiered_config()));

    let untitled = MemberInfo::new("alice", vec![]);
    assert_eq!(ledger.user_daily_cap(&untitled), 15_000);

    let silver = MemberInfo::new("bob", vec!["role-silver".to_string()]);
    assert_eq!(ledger.user_daily_cap(&silver), 20_000);

    let both = MemberInfo::new(
        "carol",
        vec!["role-silver".to_string(), "role-gold".to_string()],
    );
    assert_eq!(ledger.user_daily_cap(&both), 30_000);
    assert_eq!(ledger.user_tier_multiplier(&both), 1.5);
}

#[tokio::test]
async fn test_can_gain_xp_tracks_usage() {
    let storage = Arc::new(MemoryStorage::new());
    let ledger = DailyCapLedger::new(Arc::clone(&storage) as Arc<dyn XpStorage>, Arc::new(tiered_config()));
    let member = MemberInfo::new("alice", vec![]);

    let fresh = ledger.can_gain_xp("alice", "g1", &member).await;
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, 15_000);
    assert_eq!(fresh.percentage, 0);

    let day = ledger.current_day();
    storage
        .update_daily_xp("alice", "g1", &day, 15_000, XpSource::Message)
        .await
        .unwrap();

    let capped = ledger.can_gain_xp("alice", "g1", &member).await;
    assert!(!capped.allowed);
    assert!(capped.is_at_cap());
    assert_eq!(capped.remaining, 0);
    assert_eq!(capped.percentage, 100);
}
