//! 进程内回退缓存
//!
//! Redis不可用时承接缓存读写的进程内存储，手动跟踪过期时间戳。
//!
//! # 特性
//!
//! - **LRU淘汰**: 容量满时自动淘汰最久未使用的条目
//! - **TTL管理**: 读取时检查过期，后台任务周期清理
//! - **双负载**: 文本与二进制负载共用一套条目
//! - **模式清除**: 支持通配符批量失效

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// 缓存负载
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachePayload {
    /// 结构化文本值
    Text(String),
    /// 渲染资产等二进制值
    Binary(Vec<u8>),
}

/// 回退缓存条目
#[derive(Debug, Clone)]
struct FallbackEntry {
    value: CachePayload,
    /// 过期时间（None表示永不过期）
    expires_at: Option<Instant>,
    last_accessed: Instant,
    access_count: u64,
}

impl FallbackEntry {
    fn new(value: CachePayload, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
            last_accessed: Instant::now(),
            access_count: 1,
        }
    }

    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() > expires_at,
            None => false,
        }
    }

    fn update_access(&mut self) {
        self.last_accessed = Instant::now();
        self.access_count += 1;
    }
}

/// 回退缓存配置
#[derive(Debug, Clone)]
pub struct FallbackCacheConfig {
    /// 缓存容量
    pub capacity: usize,
    /// 默认TTL
    pub default_ttl: Option<Duration>,
    /// 清理间隔
    pub cleanup_interval: Duration,
}

impl Default for FallbackCacheConfig {
    fn default() -> Self {
        Self {
            capacity: crate::constants::DEFAULT_FALLBACK_CACHE_CAPACITY,
            default_ttl: Some(Duration::from_secs(
                crate::constants::DEFAULT_FALLBACK_CACHE_TTL_SECS,
            )),
            cleanup_interval: Duration::from_secs(
                crate::constants::DEFAULT_FALLBACK_CACHE_CLEANUP_INTERVAL_SECS,
            ),
        }
    }
}

impl FallbackCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

/// 回退缓存统计信息
#[derive(Debug, Default)]
pub struct FallbackCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
    writes: AtomicU64,
}

impl FallbackCacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

type Store = Arc<Mutex<LruCache<String, FallbackEntry>>>;

/// 进程内回退缓存实现
pub struct FallbackCache {
    data: Store,
    config: FallbackCacheConfig,
    stats: Arc<FallbackCacheStats>,
    cleanup_handle: Option<JoinHandle<()>>,
}

impl FallbackCache {
    /// 创建新的回退缓存
    pub fn new(capacity: usize, cleanup_interval: Duration) -> Self {
        Self::with_config(FallbackCacheConfig {
            capacity,
            cleanup_interval,
            ..Default::default()
        })
    }

    /// 使用配置创建回退缓存
    pub fn with_config(config: FallbackCacheConfig) -> Self {
        let data: Store = Arc::new(Mutex::new(LruCache::new(
            NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
        )));
        let stats = Arc::new(FallbackCacheStats::default());
        let cleanup_handle = Self::start_cleanup_task(
            Arc::clone(&data),
            Arc::clone(&stats),
            config.cleanup_interval,
        );

        Self {
            data,
            config,
            stats,
            cleanup_handle: Some(cleanup_handle),
        }
    }

    /// 启动周期清理任务
    fn start_cleanup_task(
        data: Store,
        stats: Arc<FallbackCacheStats>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut cleanup_interval = tokio::time::interval(interval);
            loop {
                cleanup_interval.tick().await;
                let removed = Self::cleanup_expired_in(&data, &stats);
                if removed > 0 {
                    debug!("回退缓存清理了 {} 条过期数据", removed);
                }
            }
        })
    }

    fn cleanup_expired_in(data: &Store, stats: &FallbackCacheStats) -> usize {
        let mut cache = data.lock();
        let expired_keys: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();
        for key in expired_keys {
            cache.pop(&key);
            stats.expirations.fetch_add(1, Ordering::Relaxed);
        }
        count
    }

    fn get_entry(&self, key: &str) -> Option<CachePayload> {
        let mut cache = self.data.lock();
        if let Some(entry) = cache.get_mut(key) {
            if entry.is_expired() {
                cache.pop(key);
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }

            entry.update_access();
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.value.clone())
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    fn put_entry(&self, key: &str, value: CachePayload, ttl: Option<Duration>) {
        let ttl = ttl.or(self.config.default_ttl);
        let entry = FallbackEntry::new(value, ttl);

        let mut cache = self.data.lock();
        if cache.len() >= self.config.capacity {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        cache.put(key.to_string(), entry);
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        trace!("回退缓存写入 key={}, ttl={:?}", key, ttl);
    }

    /// 获取文本值
    pub fn get(&self, key: &str) -> Option<String> {
        match self.get_entry(key) {
            Some(CachePayload::Text(value)) => Some(value),
            _ => None,
        }
    }

    /// 设置文本值
    pub fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        self.put_entry(key, CachePayload::Text(value.to_string()), ttl);
    }

    /// 获取二进制值
    pub fn get_binary(&self, key: &str) -> Option<Vec<u8>> {
        match self.get_entry(key) {
            Some(CachePayload::Binary(value)) => Some(value),
            _ => None,
        }
    }

    /// 设置二进制值
    pub fn set_binary(&self, key: &str, value: &[u8], ttl: Option<Duration>) {
        self.put_entry(key, CachePayload::Binary(value.to_vec()), ttl);
    }

    /// 删除键
    pub fn delete(&self, key: &str) {
        self.data.lock().pop(key);
    }

    /// 检查键是否存在且未过期
    pub fn contains(&self, key: &str) -> bool {
        let mut cache = self.data.lock();
        match cache.get(key) {
            Some(entry) => !entry.is_expired(),
            None => false,
        }
    }

    /// 按通配符模式删除，返回删除的键数
    ///
    /// 模式语义与Redis的glob一致的子集：`*`匹配任意字符序列。
    pub fn clear_by_pattern(&self, pattern: &str) -> u64 {
        let mut cache = self.data.lock();
        let matched: Vec<String> = cache
            .iter()
            .filter(|(key, _)| key_matches_pattern(key, pattern))
            .map(|(key, _)| key.clone())
            .collect();

        let count = matched.len() as u64;
        for key in matched {
            cache.pop(&key);
        }

        if count > 0 {
            debug!("回退缓存按模式清除: pattern={}, deleted={}", pattern, count);
        }
        count
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.data.lock().clear();
    }

    /// 当前条目数
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// 立即清理过期数据，返回清理条数
    pub fn cleanup_expired(&self) -> usize {
        Self::cleanup_expired_in(&self.data, &self.stats)
    }

    /// 获取统计信息
    pub fn stats(&self) -> &FallbackCacheStats {
        &self.stats
    }

    /// 获取配置
    pub fn config(&self) -> &FallbackCacheConfig {
        &self.config
    }

    /// 停止清理任务
    pub fn shutdown(&self) {
        if let Some(handle) = &self.cleanup_handle {
            handle.abort();
        }
    }
}

impl Drop for FallbackCache {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

/// 通配符匹配，`*`匹配任意字符序列
fn key_matches_pattern(key: &str, pattern: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return key == pattern;
    }

    let mut remainder = key;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match remainder.strip_prefix(segment) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            return remainder.ends_with(segment);
        } else {
            match remainder.find(segment) {
                Some(pos) => remainder = &remainder[pos + segment.len()..],
                None => return false,
            }
        }
    }

    // 模式以*结尾时剩余部分任意
    segments
        .last()
        .map(|s| s.is_empty() || remainder.is_empty())
        .unwrap_or(true)
}
