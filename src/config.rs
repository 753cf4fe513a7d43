//! 配置模块
//!
//! 定义XP引擎的配置结构。

use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::*;

/// XP引擎配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct XpEngineConfig {
    /// 基础每日XP上限
    pub base_daily_cap: u64,
    /// 全局XP倍率
    pub global_multiplier: f64,
    /// 各来源配置
    pub sources: XpSourcesConfig,
    /// 等级层配置（rank 1..10，高rank优先）
    pub tiers: Vec<TierConfig>,
    /// 每日重置配置
    pub reset: ResetConfig,
    /// 业务时区规则
    pub timezone: TimezoneRule,
    /// 语音跟踪配置
    pub voice: VoiceTrackerConfig,
    /// 缓存配置
    pub cache: CacheConfig,
}

impl Default for XpEngineConfig {
    fn default() -> Self {
        Self {
            base_daily_cap: DEFAULT_BASE_DAILY_CAP,
            global_multiplier: DEFAULT_GLOBAL_MULTIPLIER,
            sources: XpSourcesConfig::default(),
            tiers: Vec::new(),
            reset: ResetConfig::default(),
            timezone: TimezoneRule::default(),
            voice: VoiceTrackerConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl XpEngineConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), String> {
        if self.base_daily_cap == 0 {
            return Err("基础每日上限不能为0".to_string());
        }

        if self.global_multiplier <= 0.0 {
            return Err("全局倍率必须大于0".to_string());
        }

        self.sources.validate()?;
        self.reset.validate()?;
        self.timezone.validate()?;
        self.voice.validate()?;
        self.cache.validate()?;

        // 校验等级层：rank范围及唯一性
        let mut seen_ranks = HashMap::new();
        for (index, tier) in self.tiers.iter().enumerate() {
            tier.validate()
                .map_err(|e| format!("等级层[{}]校验失败: {}", index, e))?;
            if let Some(prev) = seen_ranks.insert(tier.rank, index) {
                return Err(format!(
                    "等级层rank重复: {} (条目{}和{})",
                    tier.rank, prev, index
                ));
            }
        }

        Ok(())
    }

    /// 设置基础每日上限
    pub fn with_base_daily_cap(mut self, cap: u64) -> Self {
        self.base_daily_cap = cap;
        self
    }

    /// 设置全局倍率
    pub fn with_global_multiplier(mut self, multiplier: f64) -> Self {
        self.global_multiplier = multiplier;
        self
    }

    /// 设置等级层列表
    pub fn with_tiers(mut self, tiers: Vec<TierConfig>) -> Self {
        self.tiers = tiers;
        self
    }

    /// 从YAML字符串加载配置
    pub fn from_yaml_str(yaml: &str) -> Result<Self, crate::error::XpEngineError> {
        let config: XpEngineConfig = serde_yaml::from_str(yaml)?;
        config
            .validate()
            .map_err(crate::error::XpEngineError::ConfigError)?;
        Ok(config)
    }

    /// 从YAML文件加载配置
    pub fn from_yaml_file(path: &std::path::Path) -> Result<Self, crate::error::XpEngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// 从进程环境变量加载配置
    ///
    /// 缺失的键使用默认值，无法解析的键记录警告后跳过。
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&vars)
    }

    /// 从键值表加载配置
    pub fn from_env_map(vars: &HashMap<String, String>) -> Self {
        let mut config = Self::default();

        if let Some(cap) = parse_env(vars, "XP_BASE_DAILY_CAP") {
            config.base_daily_cap = cap;
        }
        if let Some(mult) = parse_env(vars, "XP_GLOBAL_MULTIPLIER") {
            config.global_multiplier = mult;
        }

        config.sources.message.load_env(vars, "XP_MESSAGE");
        config.sources.reaction.load_env(vars, "XP_REACTION");
        config.sources.voice.load_env(vars, "XP_VOICE");

        if let Some(hour) = parse_env(vars, "XP_RESET_HOUR") {
            config.reset.hour = hour;
        }
        if let Some(minute) = parse_env(vars, "XP_RESET_MINUTE") {
            config.reset.minute = minute;
        }
        if let Some(days) = parse_env(vars, "XP_RETENTION_DAYS") {
            config.reset.retention_days = days;
        }

        if let Some(interval) = parse_env(vars, "VOICE_SWEEP_INTERVAL_SECS") {
            config.voice.sweep_interval_secs = interval;
        }
        if let Some(min) = parse_env(vars, "VOICE_MIN_MEMBERS") {
            config.voice.min_occupancy = min;
        }
        if let Some(penalty) = parse_env(vars, "AFK_PENALTY_MULTIPLIER") {
            config.voice.afk_multiplier = penalty;
        }
        if let Some(mult) = parse_env(vars, "AFK_EXEMPT_MULTIPLIER") {
            config.voice.afk_exempt_multiplier = mult;
        }
        if let Some(users) = vars.get("AFK_EXEMPT_USERS") {
            config.voice.afk_exempt_users = parse_id_list(users);
        }
        if let Some(roles) = vars.get("AFK_EXEMPT_ROLES") {
            config.voice.afk_exempt_roles = parse_id_list(roles);
        }

        if let Some(prefix) = vars.get("CACHE_KEY_PREFIX") {
            if !prefix.is_empty() {
                config.cache.key_prefix = prefix.clone();
            }
        }
        if let Some(ttl) = parse_env(vars, "CACHE_DEFAULT_TTL_SECS") {
            config.cache.default_ttl_secs = ttl;
        }

        config.tiers = load_tiers_from_env(vars);

        config
    }
}

/// 解析单个环境值，解析失败记录警告并返回None
fn parse_env<T: std::str::FromStr>(vars: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = vars.get(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = key, value = %raw, "环境变量无法解析，使用默认值");
            None
        }
    }
}

/// 解析逗号分隔的ID列表
fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 从索引式环境变量加载等级层列表
///
/// 读取 TIER_1_ROLE/TIER_1_XP_CAP 到 TIER_10_* 的键对。条目不完整或
/// 数值非法时记录警告并跳过该条目，不做逐字段静默兜底。
fn load_tiers_from_env(vars: &HashMap<String, String>) -> Vec<TierConfig> {
    let mut tiers = Vec::new();

    for rank in 1..=TIER_RANK_COUNT {
        let role_key = format!("TIER_{}_ROLE", rank);
        let cap_key = format!("TIER_{}_XP_CAP", rank);

        let role = match vars.get(&role_key) {
            Some(role) if !role.trim().is_empty() => role.trim().to_string(),
            Some(_) => {
                warn!(rank = rank, "等级层角色ID为空，跳过该等级层");
                continue;
            }
            None => continue,
        };

        let cap = match vars.get(&cap_key) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(cap) if cap > 0 => cap,
                Ok(_) => {
                    warn!(rank = rank, "等级层上限为0，跳过该等级层");
                    continue;
                }
                Err(_) => {
                    warn!(rank = rank, value = %raw, "等级层上限无法解析，跳过该等级层");
                    continue;
                }
            },
            None => {
                warn!(rank = rank, "等级层缺少上限配置，跳过该等级层");
                continue;
            }
        };

        tiers.push(TierConfig {
            rank,
            role_id: role,
            daily_cap: cap,
            multiplier: 1.0,
        });
    }

    tiers
}

/// 单个等级层配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierConfig {
    /// 层级rank（1..10，高者优先）
    pub rank: u8,
    /// 对应的角色ID
    pub role_id: String,
    /// 该层的每日XP上限
    pub daily_cap: u64,
    /// 该层的XP倍率
    #[serde(default = "default_tier_multiplier")]
    pub multiplier: f64,
}

fn default_tier_multiplier() -> f64 {
    1.0
}

impl TierConfig {
    /// 校验等级层配置
    pub fn validate(&self) -> Result<(), String> {
        if self.rank == 0 || self.rank > TIER_RANK_COUNT {
            return Err(format!("rank必须在1..={}之间: {}", TIER_RANK_COUNT, self.rank));
        }
        if self.role_id.is_empty() {
            return Err("角色ID不能为空".to_string());
        }
        if self.daily_cap == 0 {
            return Err("每日上限不能为0".to_string());
        }
        if self.multiplier <= 0.0 {
            return Err("倍率必须大于0".to_string());
        }
        Ok(())
    }
}

/// 各XP来源配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct XpSourcesConfig {
    pub message: XpSourceConfig,
    pub reaction: XpSourceConfig,
    pub voice: XpSourceConfig,
}

impl Default for XpSourcesConfig {
    fn default() -> Self {
        Self {
            message: XpSourceConfig::default(),
            reaction: XpSourceConfig::new(
                DEFAULT_REACTION_XP_MIN,
                DEFAULT_REACTION_XP_MAX,
                DEFAULT_REACTION_COOLDOWN_SECS,
            ),
            voice: XpSourceConfig::new(
                DEFAULT_VOICE_XP_MIN,
                DEFAULT_VOICE_XP_MAX,
                DEFAULT_VOICE_COOLDOWN_SECS,
            ),
        }
    }
}

impl XpSourcesConfig {
    /// 校验各来源配置
    pub fn validate(&self) -> Result<(), String> {
        self.message
            .validate()
            .map_err(|e| format!("message来源: {}", e))?;
        self.reaction
            .validate()
            .map_err(|e| format!("reaction来源: {}", e))?;
        self.voice
            .validate()
            .map_err(|e| format!("voice来源: {}", e))?;
        Ok(())
    }
}

/// 单个XP来源配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct XpSourceConfig {
    /// 是否启用该来源
    pub enabled: bool,
    /// 单次发放的最小XP
    pub min_xp: u64,
    /// 单次发放的最大XP（含）
    pub max_xp: u64,
    /// 冷却时长（秒）
    pub cooldown_secs: u64,
}

impl Default for XpSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_xp: DEFAULT_MESSAGE_XP_MIN,
            max_xp: DEFAULT_MESSAGE_XP_MAX,
            cooldown_secs: DEFAULT_MESSAGE_COOLDOWN_SECS,
        }
    }
}

impl XpSourceConfig {
    /// 构造指定范围与冷却的来源配置
    pub fn new(min_xp: u64, max_xp: u64, cooldown_secs: u64) -> Self {
        Self {
            enabled: true,
            min_xp,
            max_xp,
            cooldown_secs,
        }
    }

    /// 校验来源配置
    pub fn validate(&self) -> Result<(), String> {
        if self.min_xp == 0 {
            return Err("最小XP不能为0".to_string());
        }
        if self.max_xp < self.min_xp {
            return Err(format!(
                "最大XP不能小于最小XP: {} < {}",
                self.max_xp, self.min_xp
            ));
        }
        Ok(())
    }

    fn load_env(&mut self, vars: &HashMap<String, String>, prefix: &str) {
        if let Some(min) = parse_env(vars, &format!("{}_MIN", prefix)) {
            self.min_xp = min;
        }
        if let Some(max) = parse_env(vars, &format!("{}_MAX", prefix)) {
            self.max_xp = max;
        }
        if let Some(cooldown) = parse_env(vars, &format!("{}_COOLDOWN_SECS", prefix)) {
            self.cooldown_secs = cooldown;
        }
    }
}

/// 每日重置配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResetConfig {
    /// 重置时刻（当地时间，小时）
    pub hour: u32,
    /// 重置时刻（当地时间，分钟）
    pub minute: u32,
    /// 每日记录保留天数
    pub retention_days: i64,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            hour: DEFAULT_RESET_HOUR,
            minute: DEFAULT_RESET_MINUTE,
            retention_days: DEFAULT_DAILY_RETENTION_DAYS,
        }
    }
}

impl ResetConfig {
    /// 校验重置配置
    pub fn validate(&self) -> Result<(), String> {
        if self.hour > 23 {
            return Err(format!("重置小时超出范围: {}", self.hour));
        }
        if self.minute > 59 {
            return Err(format!("重置分钟超出范围: {}", self.minute));
        }
        if self.retention_days <= 0 {
            return Err("保留天数必须大于0".to_string());
        }
        Ok(())
    }
}

/// 业务时区规则
///
/// 固定形态的夏令时规则：三月第二个周日02:00（标准时间）进入夏令时，
/// 十一月第一个周日02:00（夏令时间）退出。偏移量可配置，规则形态固定。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimezoneRule {
    /// 标准时间相对UTC的偏移（小时）
    pub standard_offset_hours: i32,
    /// 夏令时间相对UTC的偏移（小时）
    pub daylight_offset_hours: i32,
}

impl Default for TimezoneRule {
    fn default() -> Self {
        Self {
            standard_offset_hours: -5,
            daylight_offset_hours: -4,
        }
    }
}

impl TimezoneRule {
    /// 校验时区规则
    pub fn validate(&self) -> Result<(), String> {
        if !(-12..=14).contains(&self.standard_offset_hours) {
            return Err(format!("标准偏移超出范围: {}", self.standard_offset_hours));
        }
        if !(-12..=14).contains(&self.daylight_offset_hours) {
            return Err(format!("夏令偏移超出范围: {}", self.daylight_offset_hours));
        }
        if self.daylight_offset_hours < self.standard_offset_hours {
            return Err("夏令偏移不能小于标准偏移".to_string());
        }
        Ok(())
    }
}

/// 语音跟踪配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceTrackerConfig {
    /// 巡检间隔（秒）
    pub sweep_interval_secs: u64,
    /// 频道内最少非机器人成员数
    pub min_occupancy: usize,
    /// AFK（静音/耳聋）惩罚倍率
    pub afk_multiplier: f64,
    /// 豁免成员的倍率
    pub afk_exempt_multiplier: f64,
    /// 豁免用户ID列表
    pub afk_exempt_users: Vec<String>,
    /// 豁免角色ID列表
    pub afk_exempt_roles: Vec<String>,
}

impl Default for VoiceTrackerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: DEFAULT_VOICE_SWEEP_INTERVAL_SECS,
            min_occupancy: DEFAULT_MIN_VOICE_OCCUPANCY,
            afk_multiplier: DEFAULT_AFK_XP_MULTIPLIER,
            afk_exempt_multiplier: 1.0,
            afk_exempt_users: Vec::new(),
            afk_exempt_roles: Vec::new(),
        }
    }
}

impl VoiceTrackerConfig {
    /// 校验语音跟踪配置
    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_interval_secs == 0 {
            return Err("巡检间隔不能为0".to_string());
        }
        if self.min_occupancy == 0 {
            return Err("最少成员数不能为0".to_string());
        }
        if self.afk_multiplier < 0.0 || self.afk_multiplier > 1.0 {
            return Err(format!("AFK惩罚倍率超出范围: {}", self.afk_multiplier));
        }
        if self.afk_exempt_multiplier <= 0.0 {
            return Err("豁免倍率必须大于0".to_string());
        }
        Ok(())
    }
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// 键命名空间前缀
    pub key_prefix: String,
    /// 默认条目TTL（秒）
    pub default_ttl_secs: u64,
    /// 已验证用户条目TTL（秒）
    pub validated_users_ttl_secs: u64,
    /// 已验证用户读取新鲜度门限（秒），严于TTL
    pub validated_users_max_age_secs: u64,
    /// 失效墓碑的宽限窗口（秒）
    pub invalidation_grace_secs: u64,
    /// 排行榜条目TTL（秒）
    pub leaderboard_ttl_secs: u64,
    /// 回退缓存容量
    pub fallback_capacity: usize,
    /// 回退缓存清理间隔（秒）
    pub fallback_cleanup_interval_secs: u64,
    /// 降级期间健康探测间隔（秒）
    pub health_probe_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: CACHE_KEY_PREFIX.to_string(),
            default_ttl_secs: DEFAULT_FALLBACK_CACHE_TTL_SECS,
            validated_users_ttl_secs: DEFAULT_VALIDATED_USERS_TTL_SECS,
            validated_users_max_age_secs: DEFAULT_VALIDATED_USERS_MAX_AGE_SECS,
            invalidation_grace_secs: DEFAULT_INVALIDATION_GRACE_SECS,
            leaderboard_ttl_secs: DEFAULT_LEADERBOARD_TTL_SECS,
            fallback_capacity: DEFAULT_FALLBACK_CACHE_CAPACITY,
            fallback_cleanup_interval_secs: DEFAULT_FALLBACK_CACHE_CLEANUP_INTERVAL_SECS,
            health_probe_interval_secs: DEFAULT_HEALTH_PROBE_INTERVAL_SECS,
        }
    }
}

impl CacheConfig {
    /// 校验缓存配置
    pub fn validate(&self) -> Result<(), String> {
        if self.key_prefix.is_empty() {
            return Err("键前缀不能为空".to_string());
        }
        if self.key_prefix.contains(':') {
            return Err("键前缀不能包含冒号".to_string());
        }
        if self.default_ttl_secs == 0 {
            return Err("默认TTL不能为0".to_string());
        }
        if self.validated_users_max_age_secs > self.validated_users_ttl_secs {
            return Err("新鲜度门限不能大于条目TTL".to_string());
        }
        if self.fallback_capacity == 0 {
            return Err("回退缓存容量不能为0".to_string());
        }
        Ok(())
    }
}
