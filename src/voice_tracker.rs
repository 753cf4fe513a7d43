//! 语音在场跟踪
//!
//! 镜像语音频道成员状态的小型状态机：加入建会话、离开删会话、
//! 换频道整行替换、静音/耳聋只改标志。周期巡检逐会话校验
//! 频道存在性与实时语音状态（自愈漂移）、冷却、反单人挂机门限，
//! 掷骰并施加AFK惩罚后走协调器的语音发放路径。

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activity_log::{ActivityEvent, ActivityLog};
use crate::config::XpEngineConfig;
use crate::coordinator::XpAwardCoordinator;
use crate::error::{AwardOutcome, StorageError};
use crate::gateway::{ChatGateway, MemberInfo};
use crate::storage::{VoiceSession, XpStorage};

/// 单个公会的巡检结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// 巡检到的会话数
    pub sessions: usize,
    /// 本轮发放次数
    pub awards: usize,
    /// 本轮清除的失效会话数
    pub pruned: usize,
}

/// 语音在场跟踪器
pub struct VoicePresenceTracker {
    storage: Arc<dyn XpStorage>,
    gateway: Arc<dyn ChatGateway>,
    coordinator: Arc<XpAwardCoordinator>,
    config: Arc<XpEngineConfig>,
    activity_log: Arc<ActivityLog>,
    /// 出现过语音会话的公会集合，巡检遍历范围
    tracked_guilds: DashMap<String, ()>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl VoicePresenceTracker {
    /// 创建跟踪器
    pub fn new(
        storage: Arc<dyn XpStorage>,
        gateway: Arc<dyn ChatGateway>,
        coordinator: Arc<XpAwardCoordinator>,
        config: Arc<XpEngineConfig>,
        activity_log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            storage,
            gateway,
            coordinator,
            config,
            activity_log,
            tracked_guilds: DashMap::new(),
            sweep_handle: Mutex::new(None),
        }
    }

    /// 语音状态变更入口
    ///
    /// 按(当前会话, 新频道)分派到加入/离开/换频道/改标志，
    /// 供网关的voice-state-update回调直接调用。
    pub async fn apply_voice_state(
        &self,
        user_id: &str,
        guild_id: &str,
        channel_id: Option<&str>,
        muted: bool,
        deafened: bool,
    ) -> Result<(), StorageError> {
        let existing = self.storage.get_voice_session(user_id, guild_id).await?;

        match (existing, channel_id) {
            (None, Some(channel)) => {
                self.handle_join(user_id, guild_id, channel, muted, deafened)
                    .await
            }
            (Some(_), None) => self.handle_leave(user_id, guild_id).await,
            (Some(session), Some(channel)) if session.channel_id != channel => {
                self.handle_move(user_id, guild_id, channel).await
            }
            (Some(session), Some(_)) => {
                if session.muted != muted || session.deafened != deafened {
                    self.handle_flag_change(user_id, guild_id, muted, deafened)
                        .await
                } else {
                    Ok(())
                }
            }
            (None, None) => Ok(()),
        }
    }

    /// 加入语音频道
    pub async fn handle_join(
        &self,
        user_id: &str,
        guild_id: &str,
        channel_id: &str,
        muted: bool,
        deafened: bool,
    ) -> Result<(), StorageError> {
        let now = Utc::now();
        let session = VoiceSession {
            user_id: user_id.to_string(),
            guild_id: guild_id.to_string(),
            channel_id: channel_id.to_string(),
            muted,
            deafened,
            joined_at: now,
            last_xp_award: now,
        };

        self.tracked_guilds.insert(guild_id.to_string(), ());
        self.storage.set_voice_session(&session).await?;
        debug!(
            user_id = user_id,
            guild_id = guild_id,
            channel_id = channel_id,
            "语音会话已创建"
        );
        Ok(())
    }

    /// 离开语音频道
    pub async fn handle_leave(&self, user_id: &str, guild_id: &str) -> Result<(), StorageError> {
        self.storage.remove_voice_session(user_id, guild_id).await?;
        debug!(user_id = user_id, guild_id = guild_id, "语音会话已删除");
        Ok(())
    }

    /// 切换语音频道
    ///
    /// 会话整行替换为新频道，静音/耳聋标志随行保留；无现存会话时
    /// 按加入处理。
    pub async fn handle_move(
        &self,
        user_id: &str,
        guild_id: &str,
        new_channel_id: &str,
    ) -> Result<(), StorageError> {
        let (muted, deafened) = match self.storage.get_voice_session(user_id, guild_id).await? {
            Some(session) => (session.muted, session.deafened),
            None => (false, false),
        };
        self.handle_join(user_id, guild_id, new_channel_id, muted, deafened)
            .await
    }

    /// 静音/耳聋状态切换，仅更新标志，无XP副作用
    pub async fn handle_flag_change(
        &self,
        user_id: &str,
        guild_id: &str,
        muted: bool,
        deafened: bool,
    ) -> Result<(), StorageError> {
        let mut session = match self.storage.get_voice_session(user_id, guild_id).await? {
            Some(session) => session,
            None => {
                debug!(
                    user_id = user_id,
                    guild_id = guild_id,
                    "无活跃语音会话，忽略标志变更"
                );
                return Ok(());
            }
        };

        session.muted = muted;
        session.deafened = deafened;
        self.storage.update_voice_session(&session).await
    }

    /// 巡检全部已知公会
    pub async fn sweep_once(&self) {
        let guilds: Vec<String> = self
            .tracked_guilds
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for guild_id in guilds {
            let report = self.sweep_guild(&guild_id).await;
            if report.sessions > 0 {
                self.activity_log.record(ActivityEvent::VoiceSweep {
                    guild_id: guild_id.clone(),
                    sessions: report.sessions,
                    awards: report.awards,
                    pruned: report.pruned,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    /// 巡检单个公会的全部活跃会话
    ///
    /// 逐会话错误只记录不中断，剩余会话照常处理。
    pub async fn sweep_guild(&self, guild_id: &str) -> SweepReport {
        let sessions = match self.storage.get_voice_sessions(guild_id).await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(guild_id = guild_id, error = %e, "读取语音会话失败，跳过本轮巡检");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            sessions: sessions.len(),
            ..SweepReport::default()
        };

        for session in sessions {
            match self.sweep_session(&session).await {
                Ok(SessionOutcome::Awarded) => report.awards += 1,
                Ok(SessionOutcome::Pruned) => report.pruned += 1,
                Ok(SessionOutcome::Skipped) => {}
                Err(e) => {
                    warn!(
                        user_id = %session.user_id,
                        guild_id = guild_id,
                        error = %e,
                        "语音会话巡检失败"
                    );
                }
            }
        }

        if report.pruned > 0 {
            info!(
                guild_id = guild_id,
                pruned = report.pruned,
                "已清除失效语音会话"
            );
        }

        report
    }

    async fn sweep_session(
        &self,
        session: &VoiceSession,
    ) -> Result<SessionOutcome, crate::error::XpEngineError> {
        let user_id = session.user_id.as_str();
        let guild_id = session.guild_id.as_str();

        // 频道已不存在：自愈清除
        if !self
            .gateway
            .channel_exists(guild_id, &session.channel_id)
            .await?
        {
            self.storage.remove_voice_session(user_id, guild_id).await?;
            return Ok(SessionOutcome::Pruned);
        }

        // 成员已离开公会：自愈清除
        let member = match self.gateway.get_member(guild_id, user_id).await? {
            Some(member) => member,
            None => {
                self.storage.remove_voice_session(user_id, guild_id).await?;
                return Ok(SessionOutcome::Pruned);
            }
        };

        // 实时语音状态与记录的频道不一致：自愈清除
        let live_channel = self.gateway.voice_channel_of(guild_id, user_id).await?;
        if live_channel.as_deref() != Some(session.channel_id.as_str()) {
            self.storage.remove_voice_session(user_id, guild_id).await?;
            return Ok(SessionOutcome::Pruned);
        }

        // 在场已确认，先累计语音时长再判发放条件
        self.storage
            .add_voice_time(user_id, guild_id, self.config.voice.sweep_interval_secs)
            .await?;

        let cooldown_secs = self.config.sources.voice.cooldown_secs as i64;
        let elapsed = (Utc::now() - session.last_xp_award).num_seconds();
        if elapsed < cooldown_secs {
            return Ok(SessionOutcome::Skipped);
        }

        let occupancy = self
            .gateway
            .voice_channel_occupancy(guild_id, &session.channel_id)
            .await?;
        if occupancy < self.config.voice.min_occupancy {
            debug!(
                guild_id = guild_id,
                channel_id = %session.channel_id,
                occupancy = occupancy,
                "频道人数不足，跳过语音发放"
            );
            return Ok(SessionOutcome::Skipped);
        }

        let amount = self.roll_voice_xp(session, &member);
        let outcome = self
            .coordinator
            .award_from_voice_tick(user_id, guild_id, &member, amount)
            .await;

        if let AwardOutcome::Awarded(_) = outcome {
            let mut updated = session.clone();
            updated.last_xp_award = Utc::now();
            self.storage.update_voice_session(&updated).await?;
            return Ok(SessionOutcome::Awarded);
        }

        Ok(SessionOutcome::Skipped)
    }

    /// 掷骰语音XP并施加AFK惩罚
    ///
    /// 静音或耳聋视为AFK；豁免名单内的用户/角色改用豁免倍率。
    fn roll_voice_xp(&self, session: &VoiceSession, member: &MemberInfo) -> u64 {
        let source = &self.config.sources.voice;
        let roll: u64 = rand::thread_rng().gen_range(source.min_xp..=source.max_xp);

        if !session.muted && !session.deafened {
            return roll;
        }

        let factor = if self.is_afk_exempt(member) {
            self.config.voice.afk_exempt_multiplier
        } else {
            self.config.voice.afk_multiplier
        };
        (roll as f64 * factor).round() as u64
    }

    fn is_afk_exempt(&self, member: &MemberInfo) -> bool {
        let voice = &self.config.voice;
        voice.afk_exempt_users.iter().any(|u| u == &member.user_id)
            || voice.afk_exempt_roles.iter().any(|r| member.has_role(r))
    }

    /// 启动周期巡检任务
    pub fn start_sweep_task(self: &Arc<Self>) {
        let mut handle = self.sweep_handle.lock();
        if handle.is_some() {
            return;
        }

        let tracker = Arc::clone(self);
        let interval_secs = self.config.voice.sweep_interval_secs;
        *handle = Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // 首个tick立即返回，先行消费，避免启动即巡检
            interval.tick().await;
            loop {
                interval.tick().await;
                tracker.sweep_once().await;
            }
        }));
        info!(interval_secs = interval_secs, "语音巡检任务已启动");
    }

    /// 停止周期巡检任务
    pub fn stop_sweep_task(&self) {
        if let Some(handle) = self.sweep_handle.lock().take() {
            handle.abort();
        }
    }

    /// 已知公会数
    pub fn tracked_guild_count(&self) -> usize {
        self.tracked_guilds.len()
    }
}

impl Drop for VoicePresenceTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.sweep_handle.lock().take() {
            handle.abort();
        }
    }
}

/// 单个会话的巡检结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionOutcome {
    Awarded,
    Skipped,
    Pruned,
}
