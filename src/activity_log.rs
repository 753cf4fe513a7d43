//! 结构化活动日志
//!
//! 发放路径末端的尽力而为记录：事件经有界队列送入后台写任务，
//! 批量落为JSON行。队列满时丢弃并计数，绝不阻塞发放路径。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Sender};
use tracing::{debug, error, info};

use crate::storage::XpSource;

/// 活动事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityEvent {
    /// 一次成功发放
    XpAwarded {
        user_id: String,
        guild_id: String,
        source: XpSource,
        amount: u64,
        daily_total: u64,
        total_xp: u64,
        timestamp: DateTime<Utc>,
    },
    /// 升级
    LevelUp {
        user_id: String,
        guild_id: String,
        old_level: u32,
        new_level: u32,
        total_xp: u64,
        timestamp: DateTime<Utc>,
    },
    /// 一轮语音巡检
    VoiceSweep {
        guild_id: String,
        sessions: usize,
        awards: usize,
        pruned: usize,
        timestamp: DateTime<Utc>,
    },
    /// 每日重置
    DailyReset {
        removed_rows: u64,
        timestamp: DateTime<Utc>,
    },
}

impl ActivityEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ActivityEvent::XpAwarded { timestamp, .. } => *timestamp,
            ActivityEvent::LevelUp { timestamp, .. } => *timestamp,
            ActivityEvent::VoiceSweep { timestamp, .. } => *timestamp,
            ActivityEvent::DailyReset { timestamp, .. } => *timestamp,
        }
    }
}

/// 活动日志统计
#[derive(Debug, Default)]
pub struct ActivityLogStats {
    total_events: AtomicU64,
    award_events: AtomicU64,
    level_up_events: AtomicU64,
    sweep_events: AtomicU64,
    reset_events: AtomicU64,
    /// 队列满被丢弃的事件数
    dropped_events: AtomicU64,
    batch_writes: AtomicU64,
    write_failures: AtomicU64,
}

impl ActivityLogStats {
    pub fn total_events(&self) -> u64 {
        self.total_events.load(Ordering::Relaxed)
    }

    pub fn award_events(&self) -> u64 {
        self.award_events.load(Ordering::Relaxed)
    }

    pub fn level_up_events(&self) -> u64 {
        self.level_up_events.load(Ordering::Relaxed)
    }

    pub fn sweep_events(&self) -> u64 {
        self.sweep_events.load(Ordering::Relaxed)
    }

    pub fn reset_events(&self) -> u64 {
        self.reset_events.load(Ordering::Relaxed)
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn batch_writes(&self) -> u64 {
        self.batch_writes.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.total_events.store(0, Ordering::Relaxed);
        self.award_events.store(0, Ordering::Relaxed);
        self.level_up_events.store(0, Ordering::Relaxed);
        self.sweep_events.store(0, Ordering::Relaxed);
        self.reset_events.store(0, Ordering::Relaxed);
        self.dropped_events.store(0, Ordering::Relaxed);
        self.batch_writes.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
    }
}

/// 活动日志配置
#[derive(Debug, Clone)]
pub struct ActivityLogConfig {
    /// 队列容量
    pub queue_capacity: usize,
    /// 批量写入条数
    pub batch_size: usize,
    /// 批量写入超时
    pub batch_timeout: Duration,
    /// 是否启用
    pub enabled: bool,
    /// 追加写入的JSONL文件路径，None时仅走tracing
    pub output_path: Option<String>,
}

impl Default for ActivityLogConfig {
    fn default() -> Self {
        Self {
            queue_capacity: crate::constants::DEFAULT_ACTIVITY_QUEUE_SIZE,
            batch_size: 64,
            batch_timeout: Duration::from_secs(5),
            enabled: true,
            output_path: None,
        }
    }
}

impl ActivityLogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn output_path(mut self, path: String) -> Self {
        self.output_path = Some(path);
        self
    }
}

/// 活动日志记录器
pub struct ActivityLog {
    sender: Sender<ActivityEvent>,
    stats: Arc<ActivityLogStats>,
    config: ActivityLogConfig,
    write_handle: tokio::task::JoinHandle<()>,
}

impl ActivityLog {
    /// 创建记录器并启动写任务
    pub fn new(config: ActivityLogConfig) -> Self {
        info!(enabled = config.enabled, "创建活动日志记录器");

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let stats = Arc::new(ActivityLogStats::default());

        let write_handle =
            tokio::spawn(Self::write_task(receiver, Arc::clone(&stats), config.clone()));

        Self {
            sender,
            stats,
            config,
            write_handle,
        }
    }

    /// 非阻塞记录一条事件
    ///
    /// 队列满或记录器已停用时直接丢弃。
    pub fn record(&self, event: ActivityEvent) {
        if !self.config.enabled {
            return;
        }
        if self.sender.try_send(event).is_err() {
            self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
            debug!("活动日志队列已满，事件被丢弃");
        }
    }

    async fn write_task(
        mut receiver: mpsc::Receiver<ActivityEvent>,
        stats: Arc<ActivityLogStats>,
        config: ActivityLogConfig,
    ) {
        let mut batch = Vec::with_capacity(config.batch_size);
        let mut timeout = tokio::time::interval(config.batch_timeout);

        loop {
            tokio::select! {
                result = receiver.recv() => {
                    match result {
                        Some(event) => {
                            stats.total_events.fetch_add(1, Ordering::Relaxed);
                            match &event {
                                ActivityEvent::XpAwarded { .. } => {
                                    stats.award_events.fetch_add(1, Ordering::Relaxed);
                                }
                                ActivityEvent::LevelUp { .. } => {
                                    stats.level_up_events.fetch_add(1, Ordering::Relaxed);
                                }
                                ActivityEvent::VoiceSweep { .. } => {
                                    stats.sweep_events.fetch_add(1, Ordering::Relaxed);
                                }
                                ActivityEvent::DailyReset { .. } => {
                                    stats.reset_events.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                            batch.push(event);

                            if batch.len() >= config.batch_size {
                                Self::write_batch(&batch, &config, &stats);
                                batch.clear();
                            }
                        }
                        None => {
                            if !batch.is_empty() {
                                Self::write_batch(&batch, &config, &stats);
                            }
                            break;
                        }
                    }
                }
                _ = timeout.tick() => {
                    if !batch.is_empty() {
                        Self::write_batch(&batch, &config, &stats);
                        batch.clear();
                    }
                }
            }
        }

        info!("活动日志写任务结束");
    }

    fn write_batch(batch: &[ActivityEvent], config: &ActivityLogConfig, stats: &ActivityLogStats) {
        stats.batch_writes.fetch_add(1, Ordering::Relaxed);

        for event in batch {
            match serde_json::to_string(event) {
                Ok(json) => {
                    info!(target: "leveleron::activity", "{}", json);

                    if let Some(ref path) = config.output_path {
                        if let Err(e) = Self::append_to_file(path, &json) {
                            stats.write_failures.fetch_add(1, Ordering::Relaxed);
                            error!(path, error = %e, "写入活动日志文件失败");
                        }
                    }
                }
                Err(e) => {
                    stats.write_failures.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "序列化活动日志失败");
                }
            }
        }
    }

    fn append_to_file(path: &str, content: &str) -> std::io::Result<()> {
        use std::fs::OpenOptions;
        use std::io::Write;

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", content)?;
        Ok(())
    }

    pub fn stats(&self) -> &ActivityLogStats {
        &self.stats
    }

    pub fn config(&self) -> &ActivityLogConfig {
        &self.config
    }

    /// 排空队列并停止写任务
    pub async fn shutdown(mut self) {
        let handle = std::mem::replace(&mut self.write_handle, tokio::spawn(async {}));
        // 丢弃最后一个sender，写任务排空后自行退出
        let sender = std::mem::replace(&mut self.sender, mpsc::channel(1).0);
        drop(sender);
        let _ = handle.await;
    }
}

impl Drop for ActivityLog {
    fn drop(&mut self) {
        self.write_handle.abort();
    }
}
