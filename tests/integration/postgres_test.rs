//! PostgreSQL集成测试
//!
//! 测试PostgreSQL存储后端的集成功能

use chrono::Utc;
use leveleron::postgres_storage::{PostgresStorage, PostgresStorageConfig};
use leveleron::storage::{VoiceSession, XpSource, XpStorage};

fn test_config() -> PostgresStorageConfig {
    PostgresStorageConfig::new("postgresql://localhost/leveleron_test")
}

fn session(user_id: &str, guild_id: &str, channel_id: &str) -> VoiceSession {
    let now = Utc::now();
    VoiceSession {
        user_id: user_id.to_string(),
        guild_id: guild_id.to_string(),
        channel_id: channel_id.to_string(),
        muted: false,
        deafened: false,
        joined_at: now,
        last_xp_award: now,
    }
}

/// 测试PostgreSQL连接
#[tokio::test]
#[ignore] // 需要真实的PostgreSQL连接
async fn test_postgres_connection() {
    let storage = PostgresStorage::new(test_config()).await.unwrap();
    storage.ping().await.unwrap();
}

/// 测试排行榜排序与名次查询
#[tokio::test]
#[ignore]
async fn test_postgres_leaderboard_and_rank() {
    let storage = PostgresStorage::new(test_config()).await.unwrap();
    let guild = "pg-lb-guild";

    storage
        .update_user_xp("lb-alice", guild, 300, XpSource::Message)
        .await
        .unwrap();
    storage
        .update_user_xp("lb-bob", guild, 500, XpSource::Message)
        .await
        .unwrap();
    storage
        .update_user_xp("lb-carol", guild, 300, XpSource::Reaction)
        .await
        .unwrap();

    let board = storage.get_leaderboard(guild, 10).await.unwrap();
    assert_eq!(board.len(), 3);
    assert_eq!(board[0].user_id, "lb-bob");
    assert_eq!(board[0].rank, 1);
    // 同分按user_id升序
    assert_eq!(board[1].user_id, "lb-alice");
    assert_eq!(board[2].user_id, "lb-carol");

    assert_eq!(storage.get_user_rank("lb-bob", guild).await.unwrap(), Some(1));
    assert_eq!(
        storage.get_user_rank("lb-missing", guild).await.unwrap(),
        None
    );
}

/// 测试语音会话生命周期
#[tokio::test]
#[ignore]
async fn test_postgres_voice_session_lifecycle() {
    let storage = PostgresStorage::new(test_config()).await.unwrap();
    let guild = "pg-voice-guild";

    let _ = storage.remove_voice_session("vs-alice", guild).await;

    let mut s = session("vs-alice", guild, "lounge");
    storage.set_voice_session(&s).await.unwrap();

    let fetched = storage
        .get_voice_session("vs-alice", guild)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.channel_id, "lounge");
    assert!(!fetched.muted);

    s.muted = true;
    s.channel_id = "study".to_string();
    storage.update_voice_session(&s).await.unwrap();

    let sessions = storage.get_voice_sessions(guild).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].muted);
    assert_eq!(sessions[0].channel_id, "study");

    storage.remove_voice_session("vs-alice", guild).await.unwrap();
    assert!(storage
        .get_voice_session("vs-alice", guild)
        .await
        .unwrap()
        .is_none());
}

/// 测试更新不存在的语音会话返回错误
#[tokio::test]
#[ignore]
async fn test_postgres_update_missing_session_fails() {
    let storage = PostgresStorage::new(test_config()).await.unwrap();

    let _ = storage
        .remove_voice_session("vs-ghost", "pg-voice-guild")
        .await;

    let s = session("vs-ghost", "pg-voice-guild", "lounge");
    assert!(storage.update_voice_session(&s).await.is_err());
}

/// 测试语音时长累加
#[tokio::test]
#[ignore]
async fn test_postgres_voice_time_accumulates() {
    let storage = PostgresStorage::new(test_config()).await.unwrap();
    let guild = "pg-vt-guild";

    storage
        .update_user_xp("vt-alice", guild, 10, XpSource::Voice)
        .await
        .unwrap();
    storage.add_voice_time("vt-alice", guild, 300).await.unwrap();
    storage.add_voice_time("vt-alice", guild, 300).await.unwrap();

    let record = storage
        .get_user_xp("vt-alice", guild)
        .await
        .unwrap()
        .unwrap();
    assert!(record.voice_time_secs >= 600);
}

/// 测试公会当日记录查询与按来源分列
#[tokio::test]
#[ignore]
async fn test_postgres_guild_daily_records() {
    let storage = PostgresStorage::new(test_config()).await.unwrap();
    let guild = "pg-daily-guild";
    let day = "2026-08-06";

    storage
        .update_daily_xp("gd-alice", guild, day, 50, XpSource::Message)
        .await
        .unwrap();
    storage
        .update_daily_xp("gd-alice", guild, day, 80, XpSource::Reaction)
        .await
        .unwrap();
    storage
        .update_daily_xp("gd-bob", guild, day, 10, XpSource::Voice)
        .await
        .unwrap();

    let records = storage.get_guild_daily_xp(guild, day).await.unwrap();
    assert_eq!(records.len(), 2);

    let alice = records.iter().find(|r| r.user_id == "gd-alice").unwrap();
    assert_eq!(alice.total_xp, 130);
    assert_eq!(alice.message_xp, 50);
    assert_eq!(alice.reaction_xp, 80);

    let bob = records.iter().find(|r| r.user_id == "gd-bob").unwrap();
    assert_eq!(bob.voice_xp, 10);
}

/// 测试每日记录重置返回删除行数
#[tokio::test]
#[ignore]
async fn test_postgres_reset_daily_xp() {
    let storage = PostgresStorage::new(test_config()).await.unwrap();

    storage
        .update_daily_xp("rd-alice", "pg-reset-guild", "2026-08-06", 50, XpSource::Message)
        .await
        .unwrap();

    let removed = storage.reset_daily_xp().await.unwrap();
    assert!(removed >= 1);

    let daily = storage
        .get_daily_xp("rd-alice", "pg-reset-guild", "2026-08-06")
        .await
        .unwrap();
    assert!(daily.is_none());
}
