//! XP引擎门面
//!
//! 组装存储、缓存、日限额账本、发放协调器与语音跟踪器，
//! 对外提供事件入口、查询接口与生命周期管理。
//! 网关事件处理方只需要持有本类型。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::activity_log::{ActivityLog, ActivityLogConfig, ActivityLogStats};
use crate::cache_layer::{CacheLayer, CacheLayerStats};
use crate::config::XpEngineConfig;
use crate::coordinator::{LevelUpNotifier, NoopNotifier, XpAwardCoordinator};
use crate::daily_cap::DailyCapLedger;
use crate::error::{AwardOutcome, CapCheckResult, SkipReason, XpEngineError};
use crate::gateway::{ChatGateway, MemberInfo};
use crate::levels::level_progress;
use crate::redis_cache::RedisCacheConfig;
use crate::stats::EngineStats;
use crate::storage::{DailyXpRecord, LeaderboardEntry, UserXpRecord, XpStorage};
use crate::voice_tracker::VoicePresenceTracker;

/// 用户综合统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStats {
    /// 持久化记录
    pub record: UserXpRecord,
    /// 榜内名次（从1开始），无记录时为None
    pub rank: Option<u64>,
    /// (当前等级内已得XP, 升至下一级还需XP)
    pub level_progress: (u64, u64),
    /// 今日已获得XP
    pub daily_xp_today: u64,
}

/// XP引擎
pub struct XpEngine {
    config: Arc<XpEngineConfig>,
    storage: Arc<dyn XpStorage>,
    gateway: Arc<dyn ChatGateway>,
    cache: Arc<CacheLayer>,
    ledger: Arc<DailyCapLedger>,
    coordinator: Arc<XpAwardCoordinator>,
    tracker: Arc<VoicePresenceTracker>,
    activity_log: Arc<ActivityLog>,
    stats: Arc<EngineStats>,
}

impl XpEngine {
    /// 创建引擎
    ///
    /// `redis_config`为None时缓存层以纯回退模式运行。
    /// `notifier`为None时升级事件仅记录不外发。
    pub async fn new(
        config: XpEngineConfig,
        storage: Arc<dyn XpStorage>,
        gateway: Arc<dyn ChatGateway>,
        redis_config: Option<RedisCacheConfig>,
        notifier: Option<Arc<dyn LevelUpNotifier>>,
    ) -> Result<Self, XpEngineError> {
        config.validate().map_err(XpEngineError::ConfigError)?;
        let config = Arc::new(config);

        let cache = Arc::new(CacheLayer::new(config.cache.clone(), redis_config).await);
        let activity_log = Arc::new(ActivityLog::new(ActivityLogConfig::new()));
        let stats = Arc::new(EngineStats::default());
        let notifier = notifier.unwrap_or_else(|| Arc::new(NoopNotifier));

        let ledger = Arc::new(DailyCapLedger::new(
            Arc::clone(&storage),
            Arc::clone(&config),
        ));
        let coordinator = Arc::new(XpAwardCoordinator::new(
            Arc::clone(&storage),
            Arc::clone(&ledger),
            Arc::clone(&config),
            notifier,
            Arc::clone(&activity_log),
            Arc::clone(&stats),
        ));
        let tracker = Arc::new(VoicePresenceTracker::new(
            Arc::clone(&storage),
            Arc::clone(&gateway),
            Arc::clone(&coordinator),
            Arc::clone(&config),
            Arc::clone(&activity_log),
        ));

        info!(
            base_daily_cap = config.base_daily_cap,
            tiers = config.tiers.len(),
            "XP引擎已创建"
        );

        Ok(Self {
            config,
            storage,
            gateway,
            cache,
            ledger,
            coordinator,
            tracker,
            activity_log,
            stats,
        })
    }

    /// 启动后台任务：每日重置排程与语音巡检
    pub fn start(&self) {
        self.ledger.start_reset_scheduler();
        self.tracker.start_sweep_task();
    }

    /// 停止后台任务并排空活动日志
    pub async fn shutdown(self) {
        self.ledger.stop_reset_scheduler();
        self.tracker.stop_sweep_task();
        self.cache.shutdown();

        let Self {
            tracker,
            coordinator,
            activity_log,
            ..
        } = self;
        // 释放其余持有方后独占活动日志以排空队列
        drop(tracker);
        drop(coordinator);
        match Arc::try_unwrap(activity_log) {
            Ok(log) => log.shutdown().await,
            Err(_) => warn!("活动日志仍被外部持有，跳过排空"),
        }
        info!("XP引擎已停止");
    }

    async fn resolve_member(&self, guild_id: &str, user_id: &str) -> Option<MemberInfo> {
        match self.gateway.get_member(guild_id, user_id).await {
            Ok(Some(member)) => Some(member),
            Ok(None) => {
                debug!(user_id, guild_id, "成员无法解析，按未发放处理");
                None
            }
            Err(e) => {
                warn!(user_id, guild_id, error = %e, "成员查询失败，按未发放处理");
                None
            }
        }
    }

    /// 消息事件入口
    ///
    /// 发放路径从不向调用方抛错，成员无法解析同样按未发放处理。
    pub async fn handle_message(&self, user_id: &str, guild_id: &str) -> AwardOutcome {
        let member = match self.resolve_member(guild_id, user_id).await {
            Some(member) => member,
            None => return AwardOutcome::Skipped(SkipReason::Failure),
        };
        self.coordinator
            .award_from_message(user_id, guild_id, &member)
            .await
    }

    /// 回应事件入口
    pub async fn handle_reaction(&self, user_id: &str, guild_id: &str) -> AwardOutcome {
        let member = match self.resolve_member(guild_id, user_id).await {
            Some(member) => member,
            None => return AwardOutcome::Skipped(SkipReason::Failure),
        };
        self.coordinator
            .award_from_reaction(user_id, guild_id, &member)
            .await
    }

    /// 语音状态变更入口
    pub async fn handle_voice_state(
        &self,
        user_id: &str,
        guild_id: &str,
        channel_id: Option<&str>,
        muted: bool,
        deafened: bool,
    ) -> Result<(), XpEngineError> {
        self.tracker
            .apply_voice_state(user_id, guild_id, channel_id, muted, deafened)
            .await?;
        Ok(())
    }

    /// 立即执行一轮语音巡检（测试与诊断用，常规巡检走后台任务）
    pub async fn sweep_voice_now(&self) {
        self.tracker.sweep_once().await;
    }

    /// 查询用户日限额状态
    pub async fn check_daily_cap(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<CapCheckResult, XpEngineError> {
        let member = self
            .gateway
            .get_member(guild_id, user_id)
            .await?
            .ok_or_else(|| XpEngineError::GatewayError(format!("成员不存在: {}", user_id)))?;
        Ok(self.ledger.can_gain_xp(user_id, guild_id, &member).await)
    }

    /// 用户综合统计：记录、名次、等级进度、今日XP
    pub async fn get_user_stats(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<Option<UserStats>, XpEngineError> {
        let record = match self.storage.get_user_xp(user_id, guild_id).await? {
            Some(record) => record,
            None => return Ok(None),
        };
        let rank = self.storage.get_user_rank(user_id, guild_id).await?;
        let daily = self.ledger.get_daily_record(user_id, guild_id).await?;

        Ok(Some(UserStats {
            level_progress: level_progress(record.total_xp),
            daily_xp_today: daily.map(|d| d.total_xp).unwrap_or(0),
            record,
            rank,
        }))
    }

    /// 用户今日明细
    pub async fn get_daily_stats(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<Option<DailyXpRecord>, XpEngineError> {
        Ok(self.ledger.get_daily_record(user_id, guild_id).await?)
    }

    /// 公会今日全部明细
    pub async fn get_guild_daily_stats(
        &self,
        guild_id: &str,
    ) -> Result<Vec<DailyXpRecord>, XpEngineError> {
        let day = self.ledger.current_day();
        Ok(self.storage.get_guild_daily_xp(guild_id, &day).await?)
    }

    /// 公会排行榜，带TTL缓存
    pub async fn get_leaderboard(
        &self,
        guild_id: &str,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, XpEngineError> {
        if let Some(entries) = self.cache.get_cached_leaderboard(guild_id, limit).await {
            return Ok(entries);
        }

        let entries = self.storage.get_leaderboard(guild_id, limit).await?;
        self.cache.cache_leaderboard(guild_id, limit, &entries).await;
        Ok(entries)
    }

    /// 用户榜内名次
    pub async fn get_user_rank(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<Option<u64>, XpEngineError> {
        Ok(self.storage.get_user_rank(user_id, guild_id).await?)
    }

    /// 失效公会缓存（成员离开等显式事件）
    pub async fn invalidate_guild_cache(&self, guild_id: &str) {
        self.cache.invalidate_guild_cache(guild_id).await;
    }

    /// 管理操作：清空全部每日记录，返回删除的行数
    pub async fn reset_daily_xp(&self) -> Result<u64, XpEngineError> {
        Ok(self.ledger.reset_all_daily_xp().await?)
    }

    /// 清理过期冷却项（维护操作）
    pub fn cleanup_cooldowns(&self) {
        self.coordinator.cleanup_cooldowns();
    }

    /// 存储可达性检查，缓存降级只警告不报错
    pub async fn health_check(&self) -> Result<(), XpEngineError> {
        self.storage.get_user_xp("health", "health").await?;
        if self.cache.is_degraded() {
            warn!("缓存层处于降级状态");
        }
        Ok(())
    }

    /// 发放统计
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// 缓存统计
    pub fn cache_stats(&self) -> &CacheLayerStats {
        self.cache.stats()
    }

    /// 活动日志统计
    pub fn activity_stats(&self) -> &ActivityLogStats {
        self.activity_log.stats()
    }

    /// 缓存层（校验用户名单等由表现层直接使用）
    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    /// 生效配置
    pub fn config(&self) -> &XpEngineConfig {
        &self.config
    }

    /// 缓存是否降级
    pub fn is_cache_degraded(&self) -> bool {
        self.cache.is_degraded()
    }
}
