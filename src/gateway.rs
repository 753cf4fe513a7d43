//! 聊天网关接口
//!
//! 引擎消费的外部聊天平台能力：成员与角色查询、频道存在性、
//! 实时语音状态、出站消息。提供用于测试的内存实现。

use crate::error::XpEngineError;
use async_trait::async_trait;

/// 公会成员信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: String,
    pub display_name: String,
    pub role_ids: Vec<String>,
    pub is_bot: bool,
}

impl MemberInfo {
    /// 构造普通成员
    pub fn new(user_id: &str, role_ids: Vec<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            role_ids,
            is_bot: false,
        }
    }

    /// 是否持有指定角色
    pub fn has_role(&self, role_id: &str) -> bool {
        self.role_ids.iter().any(|r| r == role_id)
    }
}

/// 聊天网关接口
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// 查询公会成员，成员已离开时返回None
    async fn get_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberInfo>, XpEngineError>;

    /// 频道是否仍然存在
    async fn channel_exists(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<bool, XpEngineError>;

    /// 用户当前实际所在的语音频道（实时语音状态）
    async fn voice_channel_of(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, XpEngineError>;

    /// 频道内当前非机器人成员数
    async fn voice_channel_occupancy(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<usize, XpEngineError>;

    /// 发送出站消息
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), XpEngineError>;
}

/// 内存网关实现，用于测试
#[derive(Default)]
pub struct MockGateway {
    members: dashmap::DashMap<String, MemberInfo>,
    channels: dashmap::DashMap<String, ()>,
    /// (guild:user) -> channel
    voice_states: dashmap::DashMap<String, String>,
    sent: parking_lot::Mutex<Vec<(String, String)>>,
}

impl MockGateway {
    /// 创建空网关
    pub fn new() -> Self {
        Self::default()
    }

    fn member_key(guild_id: &str, user_id: &str) -> String {
        format!("{}:{}", guild_id, user_id)
    }

    fn channel_key(guild_id: &str, channel_id: &str) -> String {
        format!("{}:{}", guild_id, channel_id)
    }

    /// 注册成员
    pub fn add_member(&self, guild_id: &str, member: MemberInfo) {
        self.members
            .insert(Self::member_key(guild_id, &member.user_id), member);
    }

    /// 移除成员（模拟离开公会）
    pub fn remove_member(&self, guild_id: &str, user_id: &str) {
        self.members.remove(&Self::member_key(guild_id, user_id));
        self.voice_states
            .remove(&Self::member_key(guild_id, user_id));
    }

    /// 注册频道
    pub fn add_channel(&self, guild_id: &str, channel_id: &str) {
        self.channels
            .insert(Self::channel_key(guild_id, channel_id), ());
    }

    /// 删除频道（模拟频道被删除）
    pub fn remove_channel(&self, guild_id: &str, channel_id: &str) {
        self.channels
            .remove(&Self::channel_key(guild_id, channel_id));
        self.voice_states
            .retain(|key, channel| !(key.starts_with(guild_id) && channel == channel_id));
    }

    /// 设置用户的实时语音状态
    pub fn set_voice_state(&self, guild_id: &str, user_id: &str, channel_id: Option<&str>) {
        let key = Self::member_key(guild_id, user_id);
        match channel_id {
            Some(channel) => {
                self.voice_states.insert(key, channel.to_string());
            }
            None => {
                self.voice_states.remove(&key);
            }
        }
    }

    /// 已发送的消息快照
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ChatGateway for MockGateway {
    async fn get_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberInfo>, XpEngineError> {
        Ok(self
            .members
            .get(&Self::member_key(guild_id, user_id))
            .map(|m| m.clone()))
    }

    async fn channel_exists(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<bool, XpEngineError> {
        Ok(self
            .channels
            .contains_key(&Self::channel_key(guild_id, channel_id)))
    }

    async fn voice_channel_of(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, XpEngineError> {
        Ok(self
            .voice_states
            .get(&Self::member_key(guild_id, user_id))
            .map(|c| c.clone()))
    }

    async fn voice_channel_occupancy(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<usize, XpEngineError> {
        let prefix = format!("{}:", guild_id);
        let count = self
            .voice_states
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix) && entry.value() == channel_id)
            .filter(|entry| {
                self.members
                    .get(entry.key())
                    .map(|m| !m.is_bot)
                    .unwrap_or(false)
            })
            .count();
        Ok(count)
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), XpEngineError> {
        self.sent
            .lock()
            .push((channel_id.to_string(), content.to_string()));
        Ok(())
    }
}
