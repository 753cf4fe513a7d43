//! 端到端测试模块
//!
//! 测试完整的业务流程和场景

#[allow(unused_imports)]
mod daily_cap_exhaustion;
#[allow(unused_imports)]
mod message_to_level_up;
#[allow(unused_imports)]
mod voice_presence_flow;
