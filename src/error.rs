//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。

use thiserror::Error;

/// XP引擎错误类型
#[derive(Error, Debug)]
pub enum XpEngineError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 存储错误
    #[error("存储错误: {0}")]
    StorageError(#[from] StorageError),

    /// 缓存错误
    #[error("缓存错误: {0}")]
    CacheError(String),

    /// 网关错误
    #[error("网关错误: {0}")]
    GatewayError(String),

    /// 活动日志错误
    #[error("活动日志错误: {0}")]
    ActivityLogError(String),

    /// IO错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// 验证错误
    #[error("验证错误: {0}")]
    ValidationError(String),

    /// 其他错误
    #[error("未知错误: {0}")]
    Other(String),
}

/// 存储错误
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// 连接错误
    #[error("连接错误: {0}")]
    ConnectionError(String),

    /// 查询错误
    #[error("查询错误: {0}")]
    QueryError(String),

    /// 超时错误
    #[error("超时错误: {0}")]
    TimeoutError(String),

    /// 未找到
    #[error("未找到: {0}")]
    NotFound(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => StorageError::QueryError(db_err.to_string()),
            sqlx::Error::PoolTimedOut => StorageError::TimeoutError("连接池超时".to_string()),
            sqlx::Error::PoolClosed => StorageError::ConnectionError("连接池已关闭".to_string()),
            sqlx::Error::RowNotFound => StorageError::NotFound("记录未找到".to_string()),
            _ => StorageError::QueryError(err.to_string()),
        }
    }
}

/// 日限额检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapCheckResult {
    /// 是否允许继续获得XP
    pub allowed: bool,
    /// 今日剩余可获得XP（封底为0）
    pub remaining: u64,
    /// 今日已获得XP
    pub current: u64,
    /// 生效的每日上限
    pub daily_cap: u64,
    /// 已用百分比（四舍五入）
    pub percentage: u32,
}

impl CapCheckResult {
    /// 基础设施故障时的放行结果（可用性优先）
    pub fn fail_open(cap: u64) -> Self {
        Self {
            allowed: true,
            remaining: cap,
            current: 0,
            daily_cap: cap,
            percentage: 0,
        }
    }

    /// 是否已触达上限
    pub fn is_at_cap(&self) -> bool {
        !self.allowed
    }
}

/// XP发放结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardResult {
    /// 实际发放的XP数量（倍率取整后）
    pub awarded: u64,
    /// 发放后的总XP
    pub total_xp: u64,
    /// 发放前等级
    pub old_level: u32,
    /// 发放后等级
    pub new_level: u32,
    /// 发放后当日总量是否已触达上限
    pub capped: bool,
}

impl AwardResult {
    /// 是否升级
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }
}

/// 未发放原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 冷却中
    Cooldown,
    /// 已达日限额
    DailyCapReached,
    /// 来源未启用
    SourceDisabled,
    /// 发放路径内部错误，按未发放处理
    Failure,
}

/// 发放尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwardOutcome {
    /// 成功发放
    Awarded(AwardResult),
    /// 未发放
    Skipped(SkipReason),
}
