//! 等级换算
//!
//! 累计XP与等级之间的纯函数换算，无状态无副作用。

/// 从等级k升到k+1所需的XP
fn xp_for_step(level: u32) -> u64 {
    let l = level as u64;
    5 * l * l + 50 * l + 100
}

/// 达到指定等级所需的累计XP
///
/// 等级0对应0 XP，函数严格单调递增。
pub fn xp_for_level(level: u32) -> u64 {
    (0..level).map(xp_for_step).sum()
}

/// 由累计XP推导等级
pub fn level_for_xp(total_xp: u64) -> u32 {
    let mut level = 0u32;
    let mut required = 0u64;
    loop {
        required += xp_for_step(level);
        if total_xp < required {
            return level;
        }
        level += 1;
    }
}

/// 当前等级内的进度
///
/// 返回 (本级已积累XP, 升到下一级所需XP)。
pub fn level_progress(total_xp: u64) -> (u64, u64) {
    let level = level_for_xp(total_xp);
    let floor = xp_for_level(level);
    (total_xp - floor, xp_for_step(level))
}
