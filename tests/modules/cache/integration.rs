//! 缓存模块集成测试
//!
//! 不依赖Redis，验证纯回退模式下的分层行为。

use leveleron::cache_layer::CacheLayer;
use leveleron::config::CacheConfig;
use leveleron::storage::LeaderboardEntry;

fn test_cache_config() -> CacheConfig {
    let mut config = CacheConfig::default();
    config.fallback_cleanup_interval_secs = 3600;
    config
}

#[tokio::test]
async fn test_offline_layer_serves_from_fallback() {
    let layer = CacheLayer::new(test_cache_config(), None).await;
    assert!(layer.is_degraded());

    let key = layer.namespaced_key(&["user", "g1", "alice"]);
    assert_eq!(key, "leveleron:user:g1:alice");

    layer.set(&key, "42", None).await;
    assert_eq!(layer.get(&key).await.as_deref(), Some("42"));
    assert_eq!(layer.stats().fallback_hits(), 1);

    layer.delete(&key).await;
    assert!(layer.get(&key).await.is_none());
    layer.shutdown();
}

#[tokio::test]
async fn test_leaderboard_cache_roundtrip_and_invalidation() {
    let layer = CacheLayer::new(test_cache_config(), None).await;

    let entries = vec![LeaderboardEntry {
        user_id: "alice".to_string(),
        total_xp: 500,
        level: 2,
        rank: 1,
    }];
    layer.cache_leaderboard("g1", 10, &entries).await;

    let cached = layer.get_cached_leaderboard("g1", 10).await;
    assert_eq!(cached, Some(entries));
    // limit不同视为不同页
    assert!(layer.get_cached_leaderboard("g1", 5).await.is_none());

    layer.invalidate_guild_cache("g1").await;
    assert!(layer.get_cached_leaderboard("g1", 10).await.is_none());
    layer.shutdown();
}

#[tokio::test]
async fn test_invalidation_tombstone_rejects_stale_writes() {
    let layer = CacheLayer::new(test_cache_config(), None).await;

    layer
        .cache_validated_users("g1", &["alice".to_string()])
        .await;
    assert!(layer.get_cached_validated_users("g1").await.is_some());

    layer.invalidate_guild_cache("g1").await;
    assert!(layer.get_cached_validated_users("g1").await.is_none());

    // 宽限窗口内的安全写入被拒绝，不会复活失效前的数据
    let accepted = layer
        .safe_write_validated_users("g1", &["alice".to_string()])
        .await;
    assert!(!accepted);
    assert_eq!(layer.stats().write_skips(), 1);
    layer.shutdown();
}
