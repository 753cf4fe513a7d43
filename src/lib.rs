//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Leveleron - Community XP and Leveling Engine
//!
//! Provides message, reaction, and voice XP awards, daily caps with tier
//! overrides, level progression, and dual-tier caching.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use leveleron::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`XpEngine`] - Main facade wiring storage, gateway, cache, and trackers
//! - [`XpEngineConfig`] - Configuration for XP sources, tiers, and caps
//! - [`AwardOutcome`] - Result of an award attempt
//! - [`XpEngineError`] - Error types
//!
//! ## Storage
//!
//! The [`XpStorage`] trait abstracts persistence. [`MemoryStorage`] ships
//! in-process; PostgreSQL support is behind the `postgres` feature.
//!
//! ## Gateway
//!
//! The [`ChatGateway`] trait abstracts the chat platform: member lookup,
//! voice channel state, and level-up announcements. [`MockGateway`] serves
//! tests and local development.
//!
//! ## Extensions (feature-gated)
//!
//! - PostgreSQL storage backend (requires `postgres` feature)
//!
//! # Examples
//!
//! ```rust
//! use leveleron::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = XpEngineConfig::default();
//!     let storage = Arc::new(MemoryStorage::new());
//!     let gateway = Arc::new(MockGateway::new());
//!     gateway.add_member("guild-1", MemberInfo::new("user-1", vec![]));
//!
//!     // 纯内存运行，无需Redis或PostgreSQL
//!     let engine = XpEngine::new(config, storage, gateway, None, None)
//!         .await
//!         .unwrap();
//!
//!     let outcome = engine.handle_message("user-1", "guild-1").await;
//!     assert!(matches!(outcome, AwardOutcome::Awarded(_)));
//! }
//! ```
//!
//! # Features
//!
//! - **Three XP sources**: Message, reaction, and voice presence awards with
//!   per-source ranges and cooldowns
//! - **Daily caps**: Business-day XP caps with tier-based overrides and a
//!   scheduled reset at a configurable local time
//! - **Voice tracking**: Periodic sweeps with self-healing session pruning,
//!   anti-solo occupancy checks, and AFK penalties
//! - **Level progression**: Quadratic level curve with forward-only recompute
//!   and level-up announcements
//! - **Dual-tier caching**: Redis primary with in-process fallback, sticky
//!   degradation, and health-probe recovery
//! - **Never-crash award path**: Infrastructure failures degrade to fail-open
//!   instead of surfacing errors to chat handlers

pub mod prelude;

pub mod activity_log;
pub mod cache_layer;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod daily_cap;
pub mod engine;
pub mod error;
pub mod fallback_cache;
pub mod gateway;
pub mod levels;
#[cfg(feature = "postgres")]
pub mod postgres_storage;
pub mod redis_cache;
pub mod stats;
pub mod storage;
pub mod voice_tracker;

// 重新导出常用类型
pub use activity_log::{ActivityEvent, ActivityLog, ActivityLogConfig, ActivityLogStats};
pub use cache_layer::{CacheLayer, CacheLayerStats};
pub use config::{
    CacheConfig, ResetConfig, TierConfig, TimezoneRule, VoiceTrackerConfig, XpEngineConfig,
    XpSourceConfig, XpSourcesConfig,
};
pub use coordinator::{LevelUpEvent, LevelUpNotifier, NoopNotifier, XpAwardCoordinator};
pub use daily_cap::DailyCapLedger;
pub use engine::{UserStats, XpEngine};
pub use error::{
    AwardOutcome, AwardResult, CapCheckResult, SkipReason, StorageError, XpEngineError,
};
pub use fallback_cache::{CachePayload, FallbackCache, FallbackCacheConfig, FallbackCacheStats};
pub use gateway::{ChatGateway, MemberInfo, MockGateway};
pub use levels::{level_for_xp, level_progress, xp_for_level};
#[cfg(feature = "postgres")]
pub use postgres_storage::{PostgresStorage, PostgresStorageConfig};
pub use redis_cache::{RedisCache, RedisCacheConfig};
pub use stats::EngineStats;
pub use storage::{
    DailyXpRecord, LeaderboardEntry, MemoryStorage, UserXpRecord, VoiceSession, XpSource,
    XpStorage,
};
pub use voice_tracker::{SweepReport, VoicePresenceTracker};
