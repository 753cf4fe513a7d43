//! 双层缓存门面
//!
//! Redis主后端加进程内回退存储的统一读写接口。主后端出错时透明降级到
//! 回退存储并记录日志，降级状态保持到健康探测成功为止。调用方不感知
//! 请求由哪一层服务。
//!
//! # 特性
//!
//! - **双层结构**: Redis(主) -> 进程内回退
//! - **降级机制**: 主后端故障时自动切换到回退层
//! - **自动恢复**: 后台探测任务确认主后端恢复后解除降级
//! - **命名空间**: 所有键统一挂在配置前缀下

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::CacheConfig;
use crate::fallback_cache::{FallbackCache, FallbackCacheConfig};
use crate::redis_cache::{sanitize_key_component, RedisCache, RedisCacheConfig};
use crate::storage::LeaderboardEntry;

/// 已验证用户条目的载荷版本
const VALIDATED_USERS_VERSION: u32 = 1;

/// 已验证用户缓存载荷
///
/// 内嵌创建时间戳，读取方据此做比TTL更严格的新鲜度判定。
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ValidatedUsersEntry {
    version: u32,
    /// 创建时间（Unix秒）
    created_at: i64,
    users: Vec<String>,
}

/// 失效墓碑载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InvalidationTombstone {
    /// 失效发生时间（Unix秒）
    invalidated_at: i64,
}

/// 缓存层统计
#[derive(Debug, Default)]
pub struct CacheLayerStats {
    /// 主后端命中次数
    primary_hits: AtomicU64,
    /// 回退层命中次数
    fallback_hits: AtomicU64,
    /// 未命中次数
    misses: AtomicU64,
    /// 降级次数
    degradations: AtomicU64,
    /// 恢复次数
    recoveries: AtomicU64,
    /// 新鲜度门限拒绝次数
    stale_rejections: AtomicU64,
    /// 安全写入被跳过次数
    write_skips: AtomicU64,
}

impl CacheLayerStats {
    pub fn primary_hits(&self) -> u64 {
        self.primary_hits.load(Ordering::Relaxed)
    }

    pub fn fallback_hits(&self) -> u64 {
        self.fallback_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn degradations(&self) -> u64 {
        self.degradations.load(Ordering::Relaxed)
    }

    pub fn recoveries(&self) -> u64 {
        self.recoveries.load(Ordering::Relaxed)
    }

    pub fn stale_rejections(&self) -> u64 {
        self.stale_rejections.load(Ordering::Relaxed)
    }

    pub fn write_skips(&self) -> u64 {
        self.write_skips.load(Ordering::Relaxed)
    }

    /// 总命中率
    pub fn hit_rate(&self) -> f64 {
        let hits = self.primary_hits() + self.fallback_hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn reset(&self) {
        self.primary_hits.store(0, Ordering::Relaxed);
        self.fallback_hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.degradations.store(0, Ordering::Relaxed);
        self.recoveries.store(0, Ordering::Relaxed);
        self.stale_rejections.store(0, Ordering::Relaxed);
        self.write_skips.store(0, Ordering::Relaxed);
    }
}

/// 双层缓存
pub struct CacheLayer {
    /// 主后端（Redis），未配置时为None
    primary: Option<RedisCache>,
    /// 进程内回退存储
    fallback: Arc<FallbackCache>,
    config: CacheConfig,
    stats: Arc<CacheLayerStats>,
    /// 是否处于降级状态
    degraded: Arc<AtomicBool>,
    /// 健康探测任务句柄
    probe_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CacheLayer {
    /// 创建缓存层
    ///
    /// `redis_config`为None时以纯回退模式运行，不启动健康探测。
    /// 提供了Redis配置但连接失败时直接进入降级状态，由探测任务
    /// 在后端恢复后解除。
    pub async fn new(config: CacheConfig, redis_config: Option<RedisCacheConfig>) -> Self {
        let fallback = Arc::new(FallbackCache::with_config(
            FallbackCacheConfig::new()
                .capacity(config.fallback_capacity)
                .default_ttl(Duration::from_secs(config.default_ttl_secs))
                .cleanup_interval(Duration::from_secs(config.fallback_cleanup_interval_secs)),
        ));

        let stats = Arc::new(CacheLayerStats::default());

        let (primary, initially_degraded) = match redis_config {
            Some(redis_config) => match RedisCache::new(redis_config.clone()).await {
                Ok(cache) => {
                    info!("缓存主后端连接成功");
                    (Some(cache), false)
                }
                Err(e) => {
                    warn!(error = %e, "缓存主后端连接失败，以降级模式启动");
                    stats.degradations.fetch_add(1, Ordering::Relaxed);
                    (Some(RedisCache::offline(redis_config)), true)
                }
            },
            None => (None, true),
        };

        let degraded = Arc::new(AtomicBool::new(initially_degraded));

        let probe_handle = primary.as_ref().map(|primary| {
            Self::start_health_probe(
                primary.clone(),
                Arc::clone(&degraded),
                Arc::clone(&stats),
                Duration::from_secs(config.health_probe_interval_secs),
            )
        });

        Self {
            primary,
            fallback,
            config,
            stats,
            degraded,
            probe_handle,
        }
    }

    /// 启动健康探测任务
    ///
    /// 仅在降级状态下发PING，成功即解除降级。
    fn start_health_probe(
        primary: RedisCache,
        degraded: Arc<AtomicBool>,
        stats: Arc<CacheLayerStats>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !degraded.load(Ordering::Relaxed) {
                    continue;
                }
                trace!("探测缓存主后端");
                match primary.ping().await {
                    Ok(()) => {
                        degraded.store(false, Ordering::Relaxed);
                        stats.recoveries.fetch_add(1, Ordering::Relaxed);
                        info!("缓存主后端已恢复，解除降级");
                    }
                    Err(e) => {
                        debug!(error = %e, "缓存主后端仍不可用");
                    }
                }
            }
        })
    }

    /// 记录一次降级
    fn mark_degraded(&self, context: &str, error: &crate::error::StorageError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            self.stats.degradations.fetch_add(1, Ordering::Relaxed);
            warn!(context, error = %error, "缓存主后端出错，降级到进程内回退");
        }
    }

    fn primary_available(&self) -> Option<&RedisCache> {
        if self.degraded.load(Ordering::Relaxed) {
            return None;
        }
        self.primary.as_ref()
    }

    /// 在配置前缀下拼接命名空间键
    pub fn namespaced_key(&self, components: &[&str]) -> String {
        let mut key = self.config.key_prefix.clone();
        for component in components {
            key.push(':');
            key.push_str(&sanitize_key_component(component));
        }
        key
    }

    fn validated_users_key(&self, guild_id: &str) -> String {
        self.namespaced_key(&["validated", guild_id])
    }

    fn tombstone_key(&self, guild_id: &str) -> String {
        self.namespaced_key(&["invalidated", guild_id])
    }

    fn leaderboard_key(&self, guild_id: &str, limit: usize) -> String {
        let limit = limit.to_string();
        self.namespaced_key(&["leaderboard", guild_id, &limit])
    }

    fn now_unix() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// 读取文本值
    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(primary) = self.primary_available() {
            match primary.get(key).await {
                Ok(Some(value)) => {
                    self.stats.primary_hits.fetch_add(1, Ordering::Relaxed);
                    trace!(key, "主后端命中");
                    return Some(value);
                }
                Ok(None) => {
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Err(e) => self.mark_degraded("get", &e),
            }
        }

        match self.fallback.get(key) {
            Some(value) => {
                self.stats.fallback_hits.fetch_add(1, Ordering::Relaxed);
                trace!(key, "回退层命中");
                Some(value)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 写入文本值
    ///
    /// 回退层始终同步写入，主后端恢复前降级数据仍可读。
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let ttl = ttl.or(Some(Duration::from_secs(self.config.default_ttl_secs)));
        self.fallback.set(key, value, ttl);

        if let Some(primary) = self.primary_available() {
            let ttl_secs = ttl.map(|d| d.as_secs());
            if let Err(e) = primary.set(key, value, ttl_secs).await {
                self.mark_degraded("set", &e);
            }
        }
    }

    /// 读取二进制值
    pub async fn get_binary(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(primary) = self.primary_available() {
            match primary.get_binary(key).await {
                Ok(Some(value)) => {
                    self.stats.primary_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
                Ok(None) => {
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Err(e) => self.mark_degraded("get_binary", &e),
            }
        }

        match self.fallback.get_binary(key) {
            Some(value) => {
                self.stats.fallback_hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 写入二进制值
    pub async fn set_binary(&self, key: &str, value: &[u8], ttl: Option<Duration>) {
        let ttl = ttl.or(Some(Duration::from_secs(self.config.default_ttl_secs)));
        self.fallback.set_binary(key, value, ttl);

        if let Some(primary) = self.primary_available() {
            let ttl_secs = ttl.map(|d| d.as_secs());
            if let Err(e) = primary.set_binary(key, value, ttl_secs).await {
                self.mark_degraded("set_binary", &e);
            }
        }
    }

    /// 删除键
    pub async fn delete(&self, key: &str) {
        self.fallback.delete(key);

        if let Some(primary) = self.primary_available() {
            if let Err(e) = primary.delete(key).await {
                self.mark_degraded("delete", &e);
            }
        }
    }

    /// 按通配模式批量失效
    pub async fn clear_by_pattern(&self, pattern: &str) -> u64 {
        let fallback_cleared = self.fallback.clear_by_pattern(pattern);

        if let Some(primary) = self.primary_available() {
            match primary.clear_by_pattern(pattern).await {
                Ok(cleared) => return cleared.max(fallback_cleared),
                Err(e) => self.mark_degraded("clear_by_pattern", &e),
            }
        }

        fallback_cleared
    }

    /// 缓存公会的已验证用户列表
    pub async fn cache_validated_users(&self, guild_id: &str, users: &[String]) {
        let entry = ValidatedUsersEntry {
            version: VALIDATED_USERS_VERSION,
            created_at: Self::now_unix(),
            users: users.to_vec(),
        };
        let payload = match serde_json::to_string(&entry) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(guild_id, error = %e, "已验证用户列表序列化失败");
                return;
            }
        };
        self.set(
            &self.validated_users_key(guild_id),
            &payload,
            Some(Duration::from_secs(self.config.validated_users_ttl_secs)),
        )
        .await;
    }

    /// 读取公会的已验证用户列表
    ///
    /// 条目超过新鲜度门限或版本不符时按未命中处理。门限严于条目
    /// 自身的TTL，是叠加在过期之上的第二道判定。
    pub async fn get_cached_validated_users(&self, guild_id: &str) -> Option<Vec<String>> {
        let payload = self.get(&self.validated_users_key(guild_id)).await?;
        let entry: ValidatedUsersEntry = match serde_json::from_str(&payload) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(guild_id, error = %e, "已验证用户条目解析失败，视为未命中");
                return None;
            }
        };

        if entry.version != VALIDATED_USERS_VERSION {
            debug!(
                guild_id,
                version = entry.version,
                "已验证用户条目版本不符，视为未命中"
            );
            self.stats.stale_rejections.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let age = Self::now_unix().saturating_sub(entry.created_at);
        if age > self.config.validated_users_max_age_secs as i64 {
            debug!(guild_id, age, "已验证用户条目超过新鲜度门限，视为未命中");
            self.stats.stale_rejections.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        Some(entry.users)
    }

    /// 带防护的已验证用户写入
    ///
    /// 写入前复核两件事：已有新鲜条目则跳过，避免覆盖并发重算刚写
    /// 入的结果；失效墓碑仍在宽限期内也跳过，避免在途的陈旧重算把
    /// 显式失效立刻写回去。返回是否真正写入。
    pub async fn safe_write_validated_users(&self, guild_id: &str, users: &[String]) -> bool {
        if let Some(tombstone) = self.get(&self.tombstone_key(guild_id)).await {
            if let Ok(tombstone) = serde_json::from_str::<InvalidationTombstone>(&tombstone) {
                let age = Self::now_unix().saturating_sub(tombstone.invalidated_at);
                if age < self.config.invalidation_grace_secs as i64 {
                    debug!(guild_id, age, "失效墓碑仍在宽限期，跳过写入");
                    self.stats.write_skips.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
            }
        }

        if self.get_cached_validated_users(guild_id).await.is_some() {
            debug!(guild_id, "已存在新鲜条目，跳过写入");
            self.stats.write_skips.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        self.cache_validated_users(guild_id, users).await;
        true
    }

    /// 失效公会的全部缓存
    ///
    /// 先落墓碑再清条目，宽限期内拦截在途的陈旧写入。
    pub async fn invalidate_guild_cache(&self, guild_id: &str) {
        let tombstone = InvalidationTombstone {
            invalidated_at: Self::now_unix(),
        };
        if let Ok(payload) = serde_json::to_string(&tombstone) {
            self.set(
                &self.tombstone_key(guild_id),
                &payload,
                Some(Duration::from_secs(self.config.invalidation_grace_secs)),
            )
            .await;
        }

        self.delete(&self.validated_users_key(guild_id)).await;

        let pattern = self.namespaced_key(&["leaderboard", guild_id, "*"]);
        let cleared = self.clear_by_pattern(&pattern).await;
        info!(guild_id, cleared, "公会缓存已失效");
    }

    /// 缓存排行榜
    pub async fn cache_leaderboard(
        &self,
        guild_id: &str,
        limit: usize,
        entries: &[LeaderboardEntry],
    ) {
        let payload = match serde_json::to_string(entries) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(guild_id, error = %e, "排行榜序列化失败");
                return;
            }
        };
        self.set(
            &self.leaderboard_key(guild_id, limit),
            &payload,
            Some(Duration::from_secs(self.config.leaderboard_ttl_secs)),
        )
        .await;
    }

    /// 读取缓存的排行榜
    pub async fn get_cached_leaderboard(
        &self,
        guild_id: &str,
        limit: usize,
    ) -> Option<Vec<LeaderboardEntry>> {
        let payload = self.get(&self.leaderboard_key(guild_id, limit)).await?;
        match serde_json::from_str(&payload) {
            Ok(entries) => Some(entries),
            Err(e) => {
                debug!(guild_id, error = %e, "排行榜条目解析失败，视为未命中");
                None
            }
        }
    }

    /// 是否处于降级状态
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// 统计信息
    pub fn stats(&self) -> &CacheLayerStats {
        &self.stats
    }

    /// 配置
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 回退层统计（诊断用）
    pub fn fallback_stats(&self) -> &crate::fallback_cache::FallbackCacheStats {
        self.fallback.stats()
    }

    /// 停止后台任务
    pub fn shutdown(&self) {
        if let Some(handle) = &self.probe_handle {
            handle.abort();
        }
        self.fallback.shutdown();
    }
}

impl Drop for CacheLayer {
    fn drop(&mut self) {
        if let Some(handle) = &self.probe_handle {
            handle.abort();
        }
    }
}
