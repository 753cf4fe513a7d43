//! XP发放协调器
//!
//! 所有发放事件的唯一入口：冷却判定、日限额委托、随机量、倍率、
//! 持久化、等级重算与升级通知。公开入口在顶层捕获全部内部错误，
//! 失败事件按未发放处理且不重试，调用方的事件循环不会因此中断。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use tracing::{debug, error, info};

use crate::activity_log::{ActivityEvent, ActivityLog};
use crate::config::{XpEngineConfig, XpSourceConfig};
use crate::daily_cap::DailyCapLedger;
use crate::error::{AwardOutcome, AwardResult, SkipReason, XpEngineError};
use crate::gateway::MemberInfo;
use crate::levels::level_for_xp;
use crate::stats::EngineStats;
use crate::storage::{XpSource, XpStorage};

/// 升级事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUpEvent {
    pub user_id: String,
    pub guild_id: String,
    pub old_level: u32,
    pub new_level: u32,
    pub total_xp: u64,
    pub source: XpSource,
}

/// 升级通知接口
#[async_trait]
pub trait LevelUpNotifier: Send + Sync {
    async fn on_level_up(&self, event: &LevelUpEvent);
}

/// 不发送任何通知的实现
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl LevelUpNotifier for NoopNotifier {
    async fn on_level_up(&self, _event: &LevelUpEvent) {}
}

/// XP发放协调器
pub struct XpAwardCoordinator {
    storage: Arc<dyn XpStorage>,
    ledger: Arc<DailyCapLedger>,
    config: Arc<XpEngineConfig>,
    /// (guild:user:source) -> 上次发放时刻，进程本地，重启即清空
    cooldowns: DashMap<String, Instant>,
    notifier: Arc<dyn LevelUpNotifier>,
    activity_log: Arc<ActivityLog>,
    stats: Arc<EngineStats>,
}

impl XpAwardCoordinator {
    /// 创建协调器
    pub fn new(
        storage: Arc<dyn XpStorage>,
        ledger: Arc<DailyCapLedger>,
        config: Arc<XpEngineConfig>,
        notifier: Arc<dyn LevelUpNotifier>,
        activity_log: Arc<ActivityLog>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            storage,
            ledger,
            config,
            cooldowns: DashMap::new(),
            notifier,
            activity_log,
            stats,
        }
    }

    fn cooldown_key(guild_id: &str, user_id: &str, source: XpSource) -> String {
        format!("{}:{}:{}", guild_id, user_id, source.as_str())
    }

    fn source_config(&self, source: XpSource) -> &XpSourceConfig {
        match source {
            XpSource::Message => &self.config.sources.message,
            XpSource::Reaction => &self.config.sources.reaction,
            XpSource::Voice => &self.config.sources.voice,
        }
    }

    /// 消息事件入口
    pub async fn award_from_message(
        &self,
        user_id: &str,
        guild_id: &str,
        member: &MemberInfo,
    ) -> AwardOutcome {
        self.award(user_id, guild_id, member, XpSource::Message, None)
            .await
    }

    /// 回应事件入口
    pub async fn award_from_reaction(
        &self,
        user_id: &str,
        guild_id: &str,
        member: &MemberInfo,
    ) -> AwardOutcome {
        self.award(user_id, guild_id, member, XpSource::Reaction, None)
            .await
    }

    /// 语音巡检入口
    ///
    /// 语音量由跟踪器掷骰并施加AFK惩罚后传入，这里不再掷骰。
    pub async fn award_from_voice_tick(
        &self,
        user_id: &str,
        guild_id: &str,
        member: &MemberInfo,
        amount: u64,
    ) -> AwardOutcome {
        self.award(user_id, guild_id, member, XpSource::Voice, Some(amount))
            .await
    }

    /// 顶层捕获的发放流程
    async fn award(
        &self,
        user_id: &str,
        guild_id: &str,
        member: &MemberInfo,
        source: XpSource,
        preset_amount: Option<u64>,
    ) -> AwardOutcome {
        let outcome = match self
            .try_award(user_id, guild_id, member, source, preset_amount)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(user_id, guild_id, source = %source, error = %e, "发放流程内部错误，本次事件不发放");
                AwardOutcome::Skipped(SkipReason::Failure)
            }
        };

        match &outcome {
            AwardOutcome::Awarded(result) => {
                self.stats.record_award(source, result.awarded);
                if result.leveled_up() {
                    self.stats.record_level_up();
                }
            }
            AwardOutcome::Skipped(reason) => self.stats.record_skip(*reason),
        }

        outcome
    }

    async fn try_award(
        &self,
        user_id: &str,
        guild_id: &str,
        member: &MemberInfo,
        source: XpSource,
        preset_amount: Option<u64>,
    ) -> Result<AwardOutcome, XpEngineError> {
        let source_config = self.source_config(source);
        if !source_config.enabled {
            return Ok(AwardOutcome::Skipped(SkipReason::SourceDisabled));
        }

        let key = Self::cooldown_key(guild_id, user_id, source);
        let window = Duration::from_secs(source_config.cooldown_secs);
        if let Some(last) = self.cooldowns.get(&key) {
            if last.elapsed() < window {
                debug!(user_id, guild_id, source = %source, "冷却期内，跳过发放");
                return Ok(AwardOutcome::Skipped(SkipReason::Cooldown));
            }
        }

        let check = self.ledger.can_gain_xp(user_id, guild_id, member).await;
        if !check.allowed {
            debug!(user_id, guild_id, current = check.current, cap = check.daily_cap, "已达日限额，跳过发放");
            return Ok(AwardOutcome::Skipped(SkipReason::DailyCapReached));
        }

        let roll = match preset_amount {
            Some(amount) => amount,
            None => rand::thread_rng().gen_range(source_config.min_xp..=source_config.max_xp),
        };
        let multiplier = self.ledger.user_tier_multiplier(member) * self.config.global_multiplier;
        let amount = ((roll as f64) * multiplier).round() as u64;

        let daily_total = self.ledger.add_xp(user_id, guild_id, amount, source).await?;
        let record = self
            .storage
            .update_user_xp(user_id, guild_id, amount, source)
            .await?;

        let old_level = record.level;
        // 等级只进不退，发放不会导致降级
        let new_level = level_for_xp(record.total_xp).max(old_level);
        if new_level > old_level {
            self.storage
                .set_user_level(user_id, guild_id, new_level)
                .await?;
            info!(user_id, guild_id, old_level, new_level, total_xp = record.total_xp, "用户升级");

            let event = LevelUpEvent {
                user_id: user_id.to_string(),
                guild_id: guild_id.to_string(),
                old_level,
                new_level,
                total_xp: record.total_xp,
                source,
            };
            self.notifier.on_level_up(&event).await;
            self.activity_log.record(ActivityEvent::LevelUp {
                user_id: user_id.to_string(),
                guild_id: guild_id.to_string(),
                old_level,
                new_level,
                total_xp: record.total_xp,
                timestamp: Utc::now(),
            });
        }

        self.cooldowns.insert(key, Instant::now());

        self.activity_log.record(ActivityEvent::XpAwarded {
            user_id: user_id.to_string(),
            guild_id: guild_id.to_string(),
            source,
            amount,
            daily_total,
            total_xp: record.total_xp,
            timestamp: Utc::now(),
        });

        Ok(AwardOutcome::Awarded(AwardResult {
            awarded: amount,
            total_xp: record.total_xp,
            old_level,
            new_level,
            capped: daily_total >= check.daily_cap,
        }))
    }

    /// 某键距可再次发放还需等待的时长
    pub fn cooldown_remaining(
        &self,
        guild_id: &str,
        user_id: &str,
        source: XpSource,
    ) -> Option<Duration> {
        let key = Self::cooldown_key(guild_id, user_id, source);
        let window = Duration::from_secs(self.source_config(source).cooldown_secs);
        let last = self.cooldowns.get(&key)?;
        window.checked_sub(last.elapsed())
    }

    /// 清理已全部过期的冷却条目，限制映射增长
    pub fn cleanup_cooldowns(&self) {
        let max_window = Duration::from_secs(
            self.config
                .sources
                .message
                .cooldown_secs
                .max(self.config.sources.reaction.cooldown_secs)
                .max(self.config.sources.voice.cooldown_secs),
        );
        self.cooldowns.retain(|_, last| last.elapsed() < max_window);
    }

    /// 当前冷却条目数
    pub fn cooldown_entries(&self) -> usize {
        self.cooldowns.len()
    }
}
