//! 引擎运行统计
//!
//! 发放、跳过、失败与升级的进程内计数，全部为宽松序原子量，
//! 供诊断接口读取。

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::SkipReason;
use crate::storage::XpSource;

/// 引擎统计
#[derive(Debug, Default)]
pub struct EngineStats {
    /// 消息来源发放次数
    message_awards: AtomicU64,
    /// 回应来源发放次数
    reaction_awards: AtomicU64,
    /// 语音来源发放次数
    voice_awards: AtomicU64,
    /// 累计发放XP
    xp_awarded: AtomicU64,
    /// 冷却期跳过次数
    skipped_cooldown: AtomicU64,
    /// 触达日限额跳过次数
    skipped_cap: AtomicU64,
    /// 来源停用跳过次数
    skipped_disabled: AtomicU64,
    /// 发放路径内部失败次数
    award_failures: AtomicU64,
    /// 升级次数
    level_ups: AtomicU64,
}

impl EngineStats {
    pub fn record_award(&self, source: XpSource, amount: u64) {
        match source {
            XpSource::Message => self.message_awards.fetch_add(1, Ordering::Relaxed),
            XpSource::Reaction => self.reaction_awards.fetch_add(1, Ordering::Relaxed),
            XpSource::Voice => self.voice_awards.fetch_add(1, Ordering::Relaxed),
        };
        self.xp_awarded.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn record_skip(&self, reason: SkipReason) {
        match reason {
            SkipReason::Cooldown => self.skipped_cooldown.fetch_add(1, Ordering::Relaxed),
            SkipReason::DailyCapReached => self.skipped_cap.fetch_add(1, Ordering::Relaxed),
            SkipReason::SourceDisabled => self.skipped_disabled.fetch_add(1, Ordering::Relaxed),
            SkipReason::Failure => self.award_failures.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_level_up(&self) {
        self.level_ups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_awards(&self) -> u64 {
        self.message_awards.load(Ordering::Relaxed)
    }

    pub fn reaction_awards(&self) -> u64 {
        self.reaction_awards.load(Ordering::Relaxed)
    }

    pub fn voice_awards(&self) -> u64 {
        self.voice_awards.load(Ordering::Relaxed)
    }

    /// 三种来源的发放总次数
    pub fn total_awards(&self) -> u64 {
        self.message_awards() + self.reaction_awards() + self.voice_awards()
    }

    pub fn xp_awarded(&self) -> u64 {
        self.xp_awarded.load(Ordering::Relaxed)
    }

    pub fn skipped_cooldown(&self) -> u64 {
        self.skipped_cooldown.load(Ordering::Relaxed)
    }

    pub fn skipped_cap(&self) -> u64 {
        self.skipped_cap.load(Ordering::Relaxed)
    }

    pub fn skipped_disabled(&self) -> u64 {
        self.skipped_disabled.load(Ordering::Relaxed)
    }

    pub fn award_failures(&self) -> u64 {
        self.award_failures.load(Ordering::Relaxed)
    }

    pub fn level_ups(&self) -> u64 {
        self.level_ups.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.message_awards.store(0, Ordering::Relaxed);
        self.reaction_awards.store(0, Ordering::Relaxed);
        self.voice_awards.store(0, Ordering::Relaxed);
        self.xp_awarded.store(0, Ordering::Relaxed);
        self.skipped_cooldown.store(0, Ordering::Relaxed);
        self.skipped_cap.store(0, Ordering::Relaxed);
        self.skipped_disabled.store(0, Ordering::Relaxed);
        self.award_failures.store(0, Ordering::Relaxed);
        self.level_ups.store(0, Ordering::Relaxed);
    }
}
