//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from Leveleron,
//! allowing users to import them with a single `use leveleron::prelude::*;`
//! statement instead of importing each type individually.

// Core types - always available
pub use crate::config::{TierConfig, XpEngineConfig, XpSourceConfig};
pub use crate::engine::{UserStats, XpEngine};
pub use crate::error::{AwardOutcome, AwardResult, SkipReason, XpEngineError};

// Storage types
pub use crate::storage::{
    LeaderboardEntry, MemoryStorage, UserXpRecord, VoiceSession, XpSource, XpStorage,
};

// Gateway types
pub use crate::gateway::{ChatGateway, MemberInfo, MockGateway};

// Level-up notification
pub use crate::coordinator::{LevelUpEvent, LevelUpNotifier};

// Feature-gated exports
#[cfg(feature = "postgres")]
pub use crate::postgres_storage::PostgresStorage;
