//! 每日上限账本
//!
//! 解析用户的生效每日XP上限（基础或等级层抬升），按固定业务时区计算
//! 带夏令时修正的业务日键，维护当日累计并自续排程每日重置。
//!
//! 业务日不等于UTC日历日：先按规则式夏令时判定（3月第二个周日02:00
//! 起、11月第一个周日02:00止，均为当地时间）换算当地时间，再应用
//! 重置时刻边界，早于重置时刻的事件归入前一日历日。

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Timelike,
    Utc, Weekday,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{ResetConfig, TimezoneRule, XpEngineConfig};
use crate::constants::TIER_RANK_COUNT;
use crate::error::{CapCheckResult, StorageError};
use crate::gateway::MemberInfo;
use crate::storage::{XpSource, XpStorage};

/// 某月第n个指定星期几的日期
fn nth_weekday_of_month(year: i32, month: u32, weekday: Weekday, n: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let lead = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    let day = 1 + lead + 7 * (n - 1);
    NaiveDate::from_ymd_opt(year, month, day)
}

fn fixed_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

/// 给定年份的夏令时区间（UTC时刻）
///
/// 起点为3月第二个周日02:00标准时间，终点为11月第一个周日02:00
/// 夏令时间，换算到UTC后返回半开区间。
fn dst_bounds_utc(year: i32, rule: &TimezoneRule) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start_date = nth_weekday_of_month(year, 3, Weekday::Sun, 2)?;
    let end_date = nth_weekday_of_month(year, 11, Weekday::Sun, 1)?;
    let transition = NaiveTime::from_hms_opt(2, 0, 0)?;

    let standard = fixed_offset(rule.standard_offset_hours);
    let daylight = fixed_offset(rule.daylight_offset_hours);

    let start = Utc.from_utc_datetime(&(start_date.and_time(transition) - standard));
    let end = Utc.from_utc_datetime(&(end_date.and_time(transition) - daylight));
    Some((start, end))
}

/// 指定UTC时刻是否处于夏令时
pub fn is_daylight_saving(now: DateTime<Utc>, rule: &TimezoneRule) -> bool {
    match dst_bounds_utc(now.year(), rule) {
        Some((start, end)) => now >= start && now < end,
        None => false,
    }
}

/// 指定UTC时刻生效的业务时区偏移
pub fn business_offset(now: DateTime<Utc>, rule: &TimezoneRule) -> FixedOffset {
    let hours = if is_daylight_saving(now, rule) {
        rule.daylight_offset_hours
    } else {
        rule.standard_offset_hours
    };
    fixed_offset(hours)
}

/// 指定UTC时刻对应的业务日键
///
/// 当地时刻早于重置时刻的事件归入前一日历日；恰好等于重置时刻
/// 起归入新日。返回`YYYY-MM-DD`格式，字典序即日期序。
pub fn business_day_key(now: DateTime<Utc>, rule: &TimezoneRule, reset: &ResetConfig) -> String {
    let local = now.with_timezone(&business_offset(now, rule));
    let seconds_of_day = local.hour() * 3600 + local.minute() * 60;
    let reset_seconds = reset.hour * 3600 + reset.minute * 60;

    let mut day = local.date_naive();
    if seconds_of_day < reset_seconds {
        day -= Duration::days(1);
    }
    day.format("%Y-%m-%d").to_string()
}

/// 严格晚于`now`的下一次重置UTC时刻
///
/// 纯函数，便于用注入时钟测试。业务日长度在夏令时切换前后相差
/// 一小时，因此每次触发后都要用新的当前时刻重新计算。
pub fn next_reset_instant(
    now: DateTime<Utc>,
    rule: &TimezoneRule,
    reset: &ResetConfig,
) -> DateTime<Utc> {
    let offset_now = business_offset(now, rule);
    let local_now = now.with_timezone(&offset_now);
    let reset_time = NaiveTime::from_hms_opt(reset.hour, reset.minute, 0)
        .unwrap_or(NaiveTime::MIN);

    let mut candidate_date = local_now.date_naive();
    if local_now.time() >= reset_time {
        candidate_date += Duration::days(1);
    }

    let naive = candidate_date.and_time(reset_time);
    let mut instant = Utc.from_utc_datetime(&(naive - offset_now));

    // 候选时刻可能落在夏令时切换之后，用该时刻生效的偏移修正一次
    let offset_candidate = business_offset(instant, rule);
    if offset_candidate != offset_now {
        instant = Utc.from_utc_datetime(&(naive - offset_candidate));
    }
    instant
}

/// 每日上限账本
///
/// 除重置任务句柄外无内部状态，业务日键是时间的纯函数。
pub struct DailyCapLedger {
    storage: Arc<dyn XpStorage>,
    config: Arc<XpEngineConfig>,
    reset_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl DailyCapLedger {
    /// 创建账本
    pub fn new(storage: Arc<dyn XpStorage>, config: Arc<XpEngineConfig>) -> Self {
        Self {
            storage,
            config,
            reset_handle: Mutex::new(None),
        }
    }

    /// 解析成员的生效每日上限
    ///
    /// 从最高rank向下扫描，返回成员持有且上限为正数的第一层的
    /// 上限。层上限配置为0视为缺陷，跳过并回落。
    pub fn user_daily_cap(&self, member: &MemberInfo) -> u64 {
        for rank in (1..=TIER_RANK_COUNT).rev() {
            let tier = match self.config.tiers.iter().find(|t| t.rank == rank) {
                Some(tier) => tier,
                None => continue,
            };
            if !member.has_role(&tier.role_id) {
                continue;
            }
            if tier.daily_cap == 0 {
                debug!(rank, role_id = %tier.role_id, "层上限为0，回落到下一层");
                continue;
            }
            return tier.daily_cap;
        }
        self.config.base_daily_cap
    }

    /// 解析成员的生效等级层倍率
    ///
    /// 与上限解析同样从最高rank向下扫描，取成员持有且倍率为正的
    /// 第一层。未配置时为1.0。
    pub fn user_tier_multiplier(&self, member: &MemberInfo) -> f64 {
        for rank in (1..=TIER_RANK_COUNT).rev() {
            let tier = match self.config.tiers.iter().find(|t| t.rank == rank) {
                Some(tier) => tier,
                None => continue,
            };
            if member.has_role(&tier.role_id) && tier.multiplier > 0.0 {
                return tier.multiplier;
            }
        }
        1.0
    }

    /// 当前业务日键
    pub fn current_day(&self) -> String {
        business_day_key(Utc::now(), &self.config.timezone, &self.config.reset)
    }

    /// 检查用户今日是否还能获得XP
    ///
    /// 存储读取失败时放行（可用性优先于严格限额），只记录告警。
    pub async fn can_gain_xp(
        &self,
        user_id: &str,
        guild_id: &str,
        member: &MemberInfo,
    ) -> CapCheckResult {
        let cap = self.user_daily_cap(member);
        let day = self.current_day();

        let current = match self.storage.get_daily_xp(user_id, guild_id, &day).await {
            Ok(Some(record)) => record.total_xp,
            Ok(None) => 0,
            Err(e) => {
                warn!(user_id, guild_id, error = %e, "日限额读取失败，按放行处理");
                return CapCheckResult::fail_open(cap);
            }
        };

        CapCheckResult {
            allowed: current < cap,
            remaining: cap.saturating_sub(current),
            current,
            daily_cap: cap,
            percentage: ((current as f64 / cap as f64) * 100.0).round() as u32,
        }
    }

    /// 累加当日XP，返回新的当日总量
    pub async fn add_xp(
        &self,
        user_id: &str,
        guild_id: &str,
        amount: u64,
        source: XpSource,
    ) -> Result<u64, StorageError> {
        let day = self.current_day();
        self.storage
            .update_daily_xp(user_id, guild_id, &day, amount, source)
            .await
    }

    /// 查询用户当日记录
    pub async fn get_daily_record(
        &self,
        user_id: &str,
        guild_id: &str,
    ) -> Result<Option<crate::storage::DailyXpRecord>, StorageError> {
        let day = self.current_day();
        self.storage.get_daily_xp(user_id, guild_id, &day).await
    }

    /// 清空全部每日记录（管理操作），返回删除的行数
    pub async fn reset_all_daily_xp(&self) -> Result<u64, StorageError> {
        let removed = self.storage.reset_daily_xp().await?;
        info!(removed, "每日记录已全部清空");
        Ok(removed)
    }

    /// 执行一次每日重置
    ///
    /// 业务日键由时间函数自然滚动，这里只需裁剪保留窗口之外的
    /// 旧行。失败只记录告警，下一次触发会重试。
    pub async fn run_daily_reset(&self) {
        let cutoff_instant = Utc::now() - Duration::days(self.config.reset.retention_days);
        let cutoff_day =
            business_day_key(cutoff_instant, &self.config.timezone, &self.config.reset);

        match self.storage.cleanup_old_daily_xp(&cutoff_day).await {
            Ok(removed) => {
                info!(cutoff_day = %cutoff_day, removed, "每日重置完成，保留窗口外的旧行已清理");
            }
            Err(e) => {
                warn!(error = %e, "每日重置清理失败，等待下次触发");
            }
        }
    }

    /// 启动自续的重置排程任务
    ///
    /// 单发定时器而非固定周期：每次触发后用新的当前时刻重新计算
    /// 下一次重置点，夏令时切换日的业务日长度因此自动正确。
    pub fn start_reset_scheduler(self: &Arc<Self>) {
        let mut handle = self.reset_handle.lock();
        if handle.is_some() {
            return;
        }

        let ledger = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = next_reset_instant(now, &ledger.config.timezone, &ledger.config.reset);
                let delay = (next - now)
                    .to_std()
                    .unwrap_or(StdDuration::from_secs(1));
                debug!(next = %next, "已排程下一次每日重置");
                tokio::time::sleep(delay).await;
                ledger.run_daily_reset().await;
            }
        }));
    }

    /// 停止重置排程任务
    pub fn stop_reset_scheduler(&self) {
        if let Some(handle) = self.reset_handle.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for DailyCapLedger {
    fn drop(&mut self) {
        if let Some(handle) = self.reset_handle.lock().take() {
            handle.abort();
        }
    }
}
