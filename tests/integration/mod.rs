//! 集成测试模块
//!
//! 测试对外部后端（PostgreSQL、Redis）的集成

#[cfg(feature = "postgres")]
#[allow(unused_imports)]
mod postgres_test;

#[cfg(feature = "postgres")]
#[allow(unused_imports)]
pub use postgres_test::*;
#[allow(unused_imports)]
pub use redis_test::*;
