//! Redis缓存后端
//!
//! 缓存层的分布式主后端，提供连接管理、重试机制和模式清除。
//!
//! # 特性
//!
//! - **连接池**: 使用ConnectionManager管理连接
//! - **重试机制**: 指数退避重试，最多3次
//! - **模式清除**: 基于SCAN游标的批量失效
//! - **二进制负载**: 渲染资产的字节存取

use redis::{aio::ConnectionManager, AsyncCommands, Client};
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::constants::{MAX_KEY_COMPONENT_LENGTH, MAX_KEY_LENGTH};
use crate::error::StorageError;

// ============================================================================
// 键验证和清理函数
// ============================================================================

/// 清理键组件（移除危险字符）
pub(crate) fn sanitize_key_component(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
        .take(MAX_KEY_COMPONENT_LENGTH)
        .collect()
}

/// 验证完整键
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::QueryError("键不能为空".to_string()));
    }

    if key.len() > MAX_KEY_LENGTH {
        return Err(StorageError::QueryError(format!(
            "键长度超过限制（最大 {} 字符）",
            MAX_KEY_LENGTH
        )));
    }

    // 检查是否包含空字节
    if key.contains('\0') {
        return Err(StorageError::QueryError("键包含非法字符".to_string()));
    }

    Ok(())
}

/// Redis缓存配置
#[derive(Clone)]
pub struct RedisCacheConfig {
    /// 连接URL
    pub url: String,
    /// 数据库索引
    pub db: i64,
    /// 密码（使用 Secret 包装以防止意外泄露）
    pub password: Option<Secret<String>>,
    /// 连接超时
    pub connection_timeout: Duration,
    /// 最大重试次数
    pub max_retries: u32,
    /// 重试初始退避时间
    pub retry_initial_backoff: Duration,
}

impl std::fmt::Debug for RedisCacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheConfig")
            .field("url", &self.url)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("connection_timeout", &self.connection_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_initial_backoff", &self.retry_initial_backoff)
            .finish()
    }
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            db: 0,
            password: None,
            connection_timeout: Duration::from_secs(5),
            max_retries: crate::constants::DEFAULT_MAX_RETRIES,
            retry_initial_backoff: Duration::from_millis(100),
        }
    }
}

impl RedisCacheConfig {
    /// 创建新的配置
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 设置数据库索引
    pub fn db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// 设置密码
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Secret::new(password.into()));
        self
    }

    /// 设置密码（使用 Secret）
    pub fn password_secret(mut self, password: Secret<String>) -> Self {
        self.password = Some(password);
        self
    }

    /// 设置连接超时
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// 设置最大重试次数
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// 设置重试初始退避时间
    pub fn retry_initial_backoff(mut self, backoff: Duration) -> Self {
        self.retry_initial_backoff = backoff;
        self
    }
}

/// Redis缓存后端实现
#[derive(Clone)]
pub struct RedisCache {
    /// 连接管理器
    conn_manager: Arc<Mutex<Option<ConnectionManager>>>,
    /// 配置
    config: RedisCacheConfig,
}

impl RedisCache {
    /// 创建新的Redis缓存后端并建立连接
    pub async fn new(config: RedisCacheConfig) -> Result<Self, StorageError> {
        info!("创建Redis缓存后端, URL: {}", config.url);

        let cache = Self {
            conn_manager: Arc::new(Mutex::new(None)),
            config,
        };

        cache.connect().await?;

        info!("Redis缓存后端创建成功");
        Ok(cache)
    }

    /// 创建未连接的Redis缓存后端
    ///
    /// 初次连接失败时使用，连接留待后续`ping`成功时补建。
    pub fn offline(config: RedisCacheConfig) -> Self {
        Self {
            conn_manager: Arc::new(Mutex::new(None)),
            config,
        }
    }

    /// 检查Redis连接，未初始化时先尝试建立
    pub async fn ping(&self) -> Result<(), StorageError> {
        let uninitialized = self.conn_manager.lock().await.is_none();
        if uninitialized {
            self.connect().await?;
        }

        let conn_manager = self.conn_manager.lock().await;
        let conn_manager = conn_manager
            .as_ref()
            .ok_or_else(|| StorageError::ConnectionError("连接未初始化".to_string()))?;

        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis PING失败: {}", e);
                StorageError::QueryError(format!("PING失败: {}", e))
            })?;

        Ok(())
    }

    /// 建立连接
    async fn connect(&self) -> Result<(), StorageError> {
        debug!("建立Redis连接");

        // 使用安全的 ConnectionInfo 来处理认证
        let url = self.config.url.trim_start_matches("redis://");
        let url = url.trim_start_matches("rediss://");
        let url = if let Some(at_pos) = url.find('@') {
            &url[at_pos + 1..]
        } else {
            url
        };

        // 解析地址和端口
        let (host, port) = if let Some(colon_pos) = url.rfind(':') {
            let host = &url[..colon_pos];
            let port = url[colon_pos + 1..].parse::<u16>().unwrap_or(6379);
            (host.to_string(), port)
        } else {
            (url.to_string(), 6379)
        };

        let client_info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host, port),
            redis: redis::RedisConnectionInfo {
                db: self.config.db,
                username: None,
                password: self
                    .config
                    .password
                    .as_ref()
                    .map(|p| p.expose_secret().clone()),
            },
        };

        let client = Client::open(client_info).map_err(|e| {
            error!("创建Redis客户端失败: {}", e);
            StorageError::ConnectionError(format!("创建Redis客户端失败: {}", e))
        })?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("创建Redis连接管理器失败: {}", e);
            StorageError::ConnectionError(format!("创建Redis连接管理器失败: {}", e))
        })?;

        *self.conn_manager.lock().await = Some(conn_manager);

        info!("Redis连接建立成功");
        Ok(())
    }

    /// 重新连接
    async fn reconnect(&self) -> Result<(), StorageError> {
        debug!("尝试重新连接Redis");

        *self.conn_manager.lock().await = None;
        self.connect().await
    }

    /// 带重试的执行
    async fn execute_with_retry<F, Fut, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, StorageError>>,
    {
        let mut last_error = None;
        let mut backoff = self.config.retry_initial_backoff;

        for attempt in 0..=self.config.max_retries {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("重试成功，尝试次数: {}", attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    last_error = Some(e.clone());

                    if attempt < self.config.max_retries {
                        warn!(
                            "操作失败，将在 {:?} 后重试 (尝试 {}/{}): {}",
                            backoff,
                            attempt + 1,
                            self.config.max_retries,
                            e
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.mul_f32(2.0); // 指数退避

                        if matches!(e, StorageError::ConnectionError(_)) {
                            if let Err(reconnect_err) = self.reconnect().await {
                                error!("重新连接失败: {}", reconnect_err);
                            }
                        }
                    }
                }
            }
        }

        error!("操作失败，已达最大重试次数: {:?}", last_error);
        Err(last_error.unwrap_or_else(|| StorageError::TimeoutError("操作超时".to_string())))
    }

    /// 读取文本值
    pub async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;

        self.execute_with_retry(|| async {
            let conn_manager = self.conn_manager.lock().await;
            let conn_manager = conn_manager
                .as_ref()
                .ok_or_else(|| StorageError::ConnectionError("连接未初始化".to_string()))?;

            let mut conn = conn_manager.clone();
            let result: Option<String> = conn.get(key).await.map_err(|e| {
                error!("Redis GET失败: {}", e);
                StorageError::QueryError(format!("GET失败: {}", e))
            })?;

            trace!("GET key={}, hit={}", key, result.is_some());
            Ok(result)
        })
        .await
    }

    /// 写入文本值
    pub async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), StorageError> {
        validate_key(key)?;

        self.execute_with_retry(|| async {
            let conn_manager = self.conn_manager.lock().await;
            let conn_manager = conn_manager
                .as_ref()
                .ok_or_else(|| StorageError::ConnectionError("连接未初始化".to_string()))?;

            let mut conn = conn_manager.clone();

            if let Some(ttl) = ttl {
                let _: () = conn.set_ex(key, value, ttl).await.map_err(|e| {
                    error!("Redis SETEX失败: {}", e);
                    StorageError::QueryError(format!("SETEX失败: {}", e))
                })?;
            } else {
                let _: () = conn.set(key, value).await.map_err(|e| {
                    error!("Redis SET失败: {}", e);
                    StorageError::QueryError(format!("SET失败: {}", e))
                })?;
            }

            trace!("SET key={}, ttl={:?}", key, ttl);
            Ok(())
        })
        .await
    }

    /// 读取二进制值
    pub async fn get_binary(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;

        self.execute_with_retry(|| async {
            let conn_manager = self.conn_manager.lock().await;
            let conn_manager = conn_manager
                .as_ref()
                .ok_or_else(|| StorageError::ConnectionError("连接未初始化".to_string()))?;

            let mut conn = conn_manager.clone();
            let result: Option<Vec<u8>> = conn.get(key).await.map_err(|e| {
                error!("Redis GET失败: {}", e);
                StorageError::QueryError(format!("GET失败: {}", e))
            })?;

            trace!("GET(binary) key={}, hit={}", key, result.is_some());
            Ok(result)
        })
        .await
    }

    /// 写入二进制值
    pub async fn set_binary(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<u64>,
    ) -> Result<(), StorageError> {
        validate_key(key)?;

        self.execute_with_retry(|| async {
            let conn_manager = self.conn_manager.lock().await;
            let conn_manager = conn_manager
                .as_ref()
                .ok_or_else(|| StorageError::ConnectionError("连接未初始化".to_string()))?;

            let mut conn = conn_manager.clone();

            if let Some(ttl) = ttl {
                let _: () = conn.set_ex(key, value, ttl).await.map_err(|e| {
                    error!("Redis SETEX失败: {}", e);
                    StorageError::QueryError(format!("SETEX失败: {}", e))
                })?;
            } else {
                let _: () = conn.set(key, value).await.map_err(|e| {
                    error!("Redis SET失败: {}", e);
                    StorageError::QueryError(format!("SET失败: {}", e))
                })?;
            }

            trace!("SET(binary) key={}, len={}, ttl={:?}", key, value.len(), ttl);
            Ok(())
        })
        .await
    }

    /// 删除键
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;

        self.execute_with_retry(|| async {
            let conn_manager = self.conn_manager.lock().await;
            let conn_manager = conn_manager
                .as_ref()
                .ok_or_else(|| StorageError::ConnectionError("连接未初始化".to_string()))?;

            let mut conn = conn_manager.clone();
            let _: () = conn.del(key).await.map_err(|e| {
                error!("Redis DEL失败: {}", e);
                StorageError::QueryError(format!("DEL失败: {}", e))
            })?;

            trace!("DEL key={}", key);
            Ok(())
        })
        .await
    }

    /// 按模式批量删除，返回删除的键数
    ///
    /// 使用SCAN游标遍历，避免KEYS阻塞服务端。
    pub async fn clear_by_pattern(&self, pattern: &str) -> Result<u64, StorageError> {
        validate_key(pattern)?;

        self.execute_with_retry(|| async {
            let conn_manager = self.conn_manager.lock().await;
            let conn_manager = conn_manager
                .as_ref()
                .ok_or_else(|| StorageError::ConnectionError("连接未初始化".to_string()))?;

            let mut conn = conn_manager.clone();
            let mut cursor: u64 = 0;
            let mut deleted: u64 = 0;

            loop {
                let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(100)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| {
                        error!("Redis SCAN失败: {}", e);
                        StorageError::QueryError(format!("SCAN失败: {}", e))
                    })?;

                if !keys.is_empty() {
                    let removed: u64 = conn.del(&keys).await.map_err(|e| {
                        error!("Redis DEL失败: {}", e);
                        StorageError::QueryError(format!("DEL失败: {}", e))
                    })?;
                    deleted += removed;
                }

                cursor = next_cursor;
                if cursor == 0 {
                    break;
                }
            }

            debug!("按模式清除: pattern={}, deleted={}", pattern, deleted);
            Ok(deleted)
        })
        .await
    }
}
