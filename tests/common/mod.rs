//! 测试通用工具模块
//!
//! 提供测试中常用的工具函数和辅助结构。

use leveleron::{
    config::{XpEngineConfig, XpSourceConfig},
    engine::XpEngine,
    gateway::{MemberInfo, MockGateway},
    storage::MemoryStorage,
};
use std::sync::Arc;

/// 创建测试用的内存存储
pub fn create_memory_storage() -> Arc<MemoryStorage> {
    Arc::new(MemoryStorage::new())
}

/// 固定数额的XP来源配置（min=max，冷却为0，便于断言）
pub fn fixed_source(xp: u64) -> XpSourceConfig {
    XpSourceConfig::new(xp, xp, 0)
}

/// 测试用引擎配置
///
/// 三个来源均为固定数额零冷却，回退缓存清理间隔拉长以免测试中触发。
pub fn fast_test_config() -> XpEngineConfig {
    let mut config = XpEngineConfig::default();
    config.sources.message = fixed_source(100);
    config.sources.reaction = fixed_source(50);
    config.sources.voice = fixed_source(10);
    config.cache.fallback_cleanup_interval_secs = 3600;
    config
}

/// 创建预置成员与频道的Mock网关
pub fn seeded_gateway(guild_id: &str, user_ids: &[&str]) -> Arc<MockGateway> {
    let gateway = MockGateway::new();
    for user_id in user_ids {
        gateway.add_member(guild_id, MemberInfo::new(user_id, vec![]));
    }
    gateway.add_channel(guild_id, "voice-1");
    Arc::new(gateway)
}

/// 创建测试用的引擎（内存存储，无Redis，无外发通知）
pub async fn create_test_engine(config: XpEngineConfig, gateway: Arc<MockGateway>) -> XpEngine {
    XpEngine::new(config, create_memory_storage(), gateway, None, None)
        .await
        .expect("测试配置应当有效")
}
