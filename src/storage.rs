//! 存储抽象层
//!
//! 定义持久化存储接口和内存实现。

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// XP来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XpSource {
    /// 消息
    Message,
    /// 回应
    Reaction,
    /// 语音在场
    Voice,
}

impl XpSource {
    /// 来源的字符串标识
    pub fn as_str(&self) -> &'static str {
        match self {
            XpSource::Message => "message",
            XpSource::Reaction => "reaction",
            XpSource::Voice => "voice",
        }
    }

    /// 从字符串解析来源
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "message" => Some(XpSource::Message),
            "reaction" => Some(XpSource::Reaction),
            "voice" => Some(XpSource::Voice),
            _ => None,
        }
    }
}

impl std::fmt::Display for XpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 用户XP记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserXpRecord {
    pub user_id: String,
    pub guild_id: String,
    /// 累计XP（单调不减）
    pub total_xp: u64,
    /// 当前等级（由累计XP推导）
    pub level: u32,
    /// 消息发放次数
    pub message_count: u64,
    /// 回应发放次数
    pub reaction_count: u64,
    /// 累计语音在场秒数
    pub voice_time_secs: u64,
}

impl UserXpRecord {
    /// 构造空记录
    pub fn new(user_id: &str, guild_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            guild_id: guild_id.to_string(),
            total_xp: 0,
            level: 0,
            message_count: 0,
            reaction_count: 0,
            voice_time_secs: 0,
        }
    }
}

/// 每日XP记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyXpRecord {
    pub user_id: String,
    pub guild_id: String,
    /// 业务日键（由日界函数计算的日历日期字符串）
    pub day_key: String,
    pub total_xp: u64,
    pub message_xp: u64,
    pub reaction_xp: u64,
    pub voice_xp: u64,
}

impl DailyXpRecord {
    /// 构造空记录
    pub fn new(user_id: &str, guild_id: &str, day_key: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            guild_id: guild_id.to_string(),
            day_key: day_key.to_string(),
            total_xp: 0,
            message_xp: 0,
            reaction_xp: 0,
            voice_xp: 0,
        }
    }

    fn add(&mut self, delta: u64, source: XpSource) {
        self.total_xp += delta;
        match source {
            XpSource::Message => self.message_xp += delta,
            XpSource::Reaction => self.reaction_xp += delta,
            XpSource::Voice => self.voice_xp += delta,
        }
    }
}

/// 语音会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSession {
    pub user_id: String,
    pub guild_id: String,
    pub channel_id: String,
    pub muted: bool,
    pub deafened: bool,
    pub joined_at: DateTime<Utc>,
    /// 上次语音XP发放时刻
    pub last_xp_award: DateTime<Utc>,
}

/// 排行榜条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub total_xp: u64,
    pub level: u32,
    /// 榜内名次（从1开始）
    pub rank: u64,
}

/// 持久化存储接口
#[async_trait]
pub trait XpStorage: Send + Sync {
    /// 获取用户XP记录
    async fn get_user_xp(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<Option<UserXpRecord>, StorageError>;

    /// 累加用户XP并更新来源计数，记录不存在时创建
    ///
    /// 返回更新后的记录（其中level为旧值，等级重算由调用方负责）。
    async fn update_user_xp(
        &self,
        user_id: &str,
        guild_id: &str,
        delta: u64,
        source: XpSource,
    ) -> Result<UserXpRecord, StorageError>;

    /// 持久化用户等级
    async fn set_user_level(
        &self,
        user_id: &str,
        guild_id: &str,
        level: u32,
    ) -> Result<(), StorageError>;

    /// 累加用户语音在场秒数
    async fn add_voice_time(
        &self,
        user_id: &str,
        guild_id: &str,
        seconds: u64,
    ) -> Result<(), StorageError>;

    /// 获取指定业务日的每日记录
    async fn get_daily_xp(
        &self,
        user_id: &str,
        guild_id: &str,
        day_key: &str,
    ) -> Result<Option<DailyXpRecord>, StorageError>;

    /// 累加指定业务日的XP，行不存在时创建；返回新的当日总量
    async fn update_daily_xp(
        &self,
        user_id: &str,
        guild_id: &str,
        day_key: &str,
        delta: u64,
        source: XpSource,
    ) -> Result<u64, StorageError>;

    /// 获取某公会指定业务日的全部每日记录
    async fn get_guild_daily_xp(
        &self,
        guild_id: &str,
        day_key: &str,
    ) -> Result<Vec<DailyXpRecord>, StorageError>;

    /// 清空全部每日记录（管理操作），返回删除的行数
    async fn reset_daily_xp(&self) -> Result<u64, StorageError>;

    /// 删除早于截止日键的每日记录，返回删除的行数
    async fn cleanup_old_daily_xp(&self, cutoff_day: &str) -> Result<u64, StorageError>;

    /// 获取某公会的全部活跃语音会话
    async fn get_voice_sessions(&self, guild_id: &str)
        -> Result<Vec<VoiceSession>, StorageError>;

    /// 获取单个语音会话
    async fn get_voice_session(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<Option<VoiceSession>, StorageError>;

    /// 写入语音会话（整行替换）
    async fn set_voice_session(&self, session: &VoiceSession) -> Result<(), StorageError>;

    /// 原地更新语音会话
    async fn update_voice_session(&self, session: &VoiceSession) -> Result<(), StorageError>;

    /// 删除语音会话
    async fn remove_voice_session(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<(), StorageError>;

    /// 获取公会排行榜（按累计XP降序）
    async fn get_leaderboard(
        &self,
        guild_id: &str,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, StorageError>;

    /// 获取用户在公会内的名次（从1开始）
    async fn get_user_rank(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<Option<u64>, StorageError>;
}

/// 内存存储实现
#[derive(Default)]
pub struct MemoryStorage {
    users: dashmap::DashMap<String, UserXpRecord>,
    daily: dashmap::DashMap<String, DailyXpRecord>,
    voice: dashmap::DashMap<String, VoiceSession>,
}

impl MemoryStorage {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    fn user_key(user_id: &str, guild_id: &str) -> String {
        format!("{}:{}", guild_id, user_id)
    }

    fn daily_key(user_id: &str, guild_id: &str, day_key: &str) -> String {
        format!("{}:{}:{}", guild_id, user_id, day_key)
    }
}

#[async_trait]
impl XpStorage for MemoryStorage {
    async fn get_user_xp(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<Option<UserXpRecord>, StorageError> {
        Ok(self
            .users
            .get(&Self::user_key(user_id, guild_id))
            .map(|r| r.clone()))
    }

    async fn update_user_xp(
        &self,
        user_id: &str,
        guild_id: &str,
        delta: u64,
        source: XpSource,
    ) -> Result<UserXpRecord, StorageError> {
        let key = Self::user_key(user_id, guild_id);
        let mut entry = self
            .users
            .entry(key)
            .or_insert_with(|| UserXpRecord::new(user_id, guild_id));
        entry.total_xp += delta;
        match source {
            XpSource::Message => entry.message_count += 1,
            XpSource::Reaction => entry.reaction_count += 1,
            XpSource::Voice => {}
        }
        Ok(entry.clone())
    }

    async fn set_user_level(
        &self,
        user_id: &str,
        guild_id: &str,
        level: u32,
    ) -> Result<(), StorageError> {
        let key = Self::user_key(user_id, guild_id);
        match self.users.get_mut(&key) {
            Some(mut entry) => {
                entry.level = level;
                Ok(())
            }
            None => Err(StorageError::NotFound(key)),
        }
    }

    async fn add_voice_time(
        &self,
        user_id: &str,
        guild_id: &str,
        seconds: u64,
    ) -> Result<(), StorageError> {
        let key = Self::user_key(user_id, guild_id);
        let mut entry = self
            .users
            .entry(key)
            .or_insert_with(|| UserXpRecord::new(user_id, guild_id));
        entry.voice_time_secs += seconds;
        Ok(())
    }

    async fn get_daily_xp(
        &self,
        user_id: &str,
        guild_id: &str,
        day_key: &str,
    ) -> Result<Option<DailyXpRecord>, StorageError> {
        Ok(self
            .daily
            .get(&Self::daily_key(user_id, guild_id, day_key))
            .map(|r| r.clone()))
    }

    async fn update_daily_xp(
        &self,
        user_id: &str,
        guild_id: &str,
        day_key: &str,
        delta: u64,
        source: XpSource,
    ) -> Result<u64, StorageError> {
        let key = Self::daily_key(user_id, guild_id, day_key);
        let mut entry = self
            .daily
            .entry(key)
            .or_insert_with(|| DailyXpRecord::new(user_id, guild_id, day_key));
        entry.add(delta, source);
        Ok(entry.total_xp)
    }

    async fn get_guild_daily_xp(
        &self,
        guild_id: &str,
        day_key: &str,
    ) -> Result<Vec<DailyXpRecord>, StorageError> {
        Ok(self
            .daily
            .iter()
            .filter(|r| r.guild_id == guild_id && r.day_key == day_key)
            .map(|r| r.clone())
            .collect())
    }

    async fn reset_daily_xp(&self) -> Result<u64, StorageError> {
        let count = self.daily.len() as u64;
        self.daily.clear();
        Ok(count)
    }

    async fn cleanup_old_daily_xp(&self, cutoff_day: &str) -> Result<u64, StorageError> {
        let before = self.daily.len();
        // 日键为YYYY-MM-DD格式，字典序与日期序一致
        self.daily.retain(|_, r| r.day_key.as_str() >= cutoff_day);
        Ok((before - self.daily.len()) as u64)
    }

    async fn get_voice_sessions(
        &self,
        guild_id: &str,
    ) -> Result<Vec<VoiceSession>, StorageError> {
        Ok(self
            .voice
            .iter()
            .filter(|s| s.guild_id == guild_id)
            .map(|s| s.clone())
            .collect())
    }

    async fn get_voice_session(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<Option<VoiceSession>, StorageError> {
        Ok(self
            .voice
            .get(&Self::user_key(user_id, guild_id))
            .map(|s| s.clone()))
    }

    async fn set_voice_session(&self, session: &VoiceSession) -> Result<(), StorageError> {
        let key = Self::user_key(&session.user_id, &session.guild_id);
        self.voice.insert(key, session.clone());
        Ok(())
    }

    async fn update_voice_session(&self, session: &VoiceSession) -> Result<(), StorageError> {
        let key = Self::user_key(&session.user_id, &session.guild_id);
        match self.voice.get_mut(&key) {
            Some(mut entry) => {
                *entry = session.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(key)),
        }
    }

    async fn remove_voice_session(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<(), StorageError> {
        self.voice.remove(&Self::user_key(user_id, guild_id));
        Ok(())
    }

    async fn get_leaderboard(
        &self,
        guild_id: &str,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, StorageError> {
        let mut records: Vec<UserXpRecord> = self
            .users
            .iter()
            .filter(|r| r.guild_id == guild_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by(|a, b| b.total_xp.cmp(&a.total_xp).then(a.user_id.cmp(&b.user_id)));

        Ok(records
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, r)| LeaderboardEntry {
                user_id: r.user_id,
                total_xp: r.total_xp,
                level: r.level,
                rank: (i + 1) as u64,
            })
            .collect())
    }

    async fn get_user_rank(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<Option<u64>, StorageError> {
        let target = match self.get_user_xp(user_id, guild_id).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        let better = self
            .users
            .iter()
            .filter(|r| {
                r.guild_id == guild_id
                    && (r.total_xp > target.total_xp
                        || (r.total_xp == target.total_xp && r.user_id < target.user_id))
            })
            .count() as u64;

        Ok(Some(better + 1))
    }
}
