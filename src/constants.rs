//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for Leveleron.
//!
//! This module provides well-documented constants used throughout the library.
//! All magic numbers are defined here with their purpose and usage context.

// ============================================================================
// Daily Cap Constants
// ============================================================================

/// Default base daily XP cap (15,000 XP).
///
/// Applied to every member without a tier override. A member stops earning
/// XP for the rest of the business day once this total is reached.
pub const DEFAULT_BASE_DAILY_CAP: u64 = 15_000;

/// Default daily reset time, hour component (local civil time).
pub const DEFAULT_RESET_HOUR: u32 = 19;

/// Default daily reset time, minute component (local civil time).
pub const DEFAULT_RESET_MINUTE: u32 = 35;

/// Retention window for per-day XP records (30 days).
///
/// Daily records older than this are pruned after each reset.
pub const DEFAULT_DAILY_RETENTION_DAYS: i64 = 30;

/// Number of configurable tier ranks.
///
/// Tier ranks run from 1 (lowest) to this value (highest). When a member
/// holds several tier roles, the highest rank wins.
pub const TIER_RANK_COUNT: u8 = 10;

// ============================================================================
// XP Source Constants
// ============================================================================

/// Default minimum XP for a message award roll.
pub const DEFAULT_MESSAGE_XP_MIN: u64 = 15;

/// Default maximum XP for a message award roll (inclusive).
pub const DEFAULT_MESSAGE_XP_MAX: u64 = 25;

/// Default message award cooldown (60 seconds).
pub const DEFAULT_MESSAGE_COOLDOWN_SECS: u64 = 60;

/// Default minimum XP for a reaction award roll.
pub const DEFAULT_REACTION_XP_MIN: u64 = 5;

/// Default maximum XP for a reaction award roll (inclusive).
pub const DEFAULT_REACTION_XP_MAX: u64 = 10;

/// Default reaction award cooldown (300 seconds).
pub const DEFAULT_REACTION_COOLDOWN_SECS: u64 = 300;

/// Default minimum XP for a voice sweep roll.
pub const DEFAULT_VOICE_XP_MIN: u64 = 5;

/// Default maximum XP for a voice sweep roll (inclusive).
pub const DEFAULT_VOICE_XP_MAX: u64 = 10;

/// Default voice award cooldown (300 seconds, one sweep interval).
pub const DEFAULT_VOICE_COOLDOWN_SECS: u64 = 300;

/// Default global XP multiplier.
pub const DEFAULT_GLOBAL_MULTIPLIER: f64 = 1.0;

// ============================================================================
// Voice Tracker Constants
// ============================================================================

/// Default voice sweep interval (5 minutes).
///
/// How often the presence tracker walks active sessions to award
/// accumulated voice XP and reconcile against live channel state.
pub const DEFAULT_VOICE_SWEEP_INTERVAL_SECS: u64 = 300;

/// Minimum channel occupancy for voice XP to accrue.
///
/// A member alone in a channel earns nothing during that sweep.
pub const DEFAULT_MIN_VOICE_OCCUPANCY: usize = 2;

/// XP multiplier applied to members parked in an AFK channel.
pub const DEFAULT_AFK_XP_MULTIPLIER: f64 = 0.25;

// ============================================================================
// Cache Constants
// ============================================================================

/// Key prefix for all engine cache entries.
pub const CACHE_KEY_PREFIX: &str = "leveleron";

/// Default capacity for the in-process fallback cache.
///
/// This value provides reasonable out-of-box performance for most deployments.
/// Represents 10,000 cache entries.
pub const DEFAULT_FALLBACK_CACHE_CAPACITY: usize = 10_000;

/// Default TTL for fallback cache entries (5 minutes).
///
/// After this duration, cache entries are considered stale and may be evicted.
pub const DEFAULT_FALLBACK_CACHE_TTL_SECS: u64 = 300;

/// Default cleanup interval for the fallback cache (1 minute).
///
/// How often the cache performs expiration checks and cleanup.
pub const DEFAULT_FALLBACK_CACHE_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Default TTL for validated-users cache entries (10 minutes).
pub const DEFAULT_VALIDATED_USERS_TTL_SECS: u64 = 600;

/// Staleness gate for validated-users reads (5 minutes).
///
/// Stricter than the storage TTL: entries older than this are treated as
/// absent even when the backend would still serve them.
pub const DEFAULT_VALIDATED_USERS_MAX_AGE_SECS: u64 = 300;

/// Grace window after a guild-wide invalidation (30 seconds).
///
/// Writes of validated-user sets computed before an invalidation inside
/// this window are discarded instead of resurrecting stale membership.
pub const DEFAULT_INVALIDATION_GRACE_SECS: u64 = 30;

/// Default TTL for cached leaderboard pages (2 minutes).
pub const DEFAULT_LEADERBOARD_TTL_SECS: u64 = 120;

/// Default TTL for cached user stat snapshots (1 minute).
pub const DEFAULT_USER_STATS_TTL_SECS: u64 = 60;

/// Interval between Redis health probes while degraded (15 seconds).
pub const DEFAULT_HEALTH_PROBE_INTERVAL_SECS: u64 = 15;

// ============================================================================
// Retry and Backoff Constants
// ============================================================================

/// Maximum retry attempts for transient failures.
///
/// Default number of retry attempts before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Initial delay for exponential backoff (10 milliseconds).
///
/// Starting delay before the first retry.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 10;

/// Maximum backoff delay (30 seconds).
///
/// Caps the exponential backoff to prevent excessive delays.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30000;

// ============================================================================
// Validation Constants
// ============================================================================

/// Maximum length of a single cache key component (255 characters).
pub const MAX_KEY_COMPONENT_LENGTH: usize = 255;

/// Maximum total cache key length (1024 characters).
pub const MAX_KEY_LENGTH: usize = 1024;

/// Maximum user ID length (256 characters).
///
/// Standard length for user identifier validation.
pub const MAX_USER_ID_LENGTH: usize = 256;

// ============================================================================
// Activity Log Constants
// ============================================================================

/// Default bounded queue size for the activity logger.
pub const DEFAULT_ACTIVITY_QUEUE_SIZE: usize = 4096;

// ============================================================================
// Time Conversion Constants
// ============================================================================

/// Seconds per minute.
pub const SECONDS_PER_MINUTE: u64 = 60;

/// Seconds per hour.
pub const SECONDS_PER_HOUR: u64 = 3600;

/// Seconds per day.
pub const SECONDS_PER_DAY: u64 = 86400;

/// Milliseconds per second.
pub const MS_PER_SECOND: u64 = 1000;
