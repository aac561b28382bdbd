//! 按工具名的连续失败计数器
//!
//! 重试上限必须可单独审计与测试，因此实现为显式状态对象而不是散落在循环里的计数变量。
//! 同一工具连续失败到达上限后整次执行终止；一次成功即清零该工具的计数。

use std::collections::HashMap;

/// 每个工具名一个连续失败计数，record 返回累计值，reset 在成功后清零
#[derive(Debug)]
pub struct FailureTracker {
    counts: HashMap<String, u32>,
    max_consecutive: u32,
}

impl FailureTracker {
    pub fn new(max_consecutive: u32) -> Self {
        Self {
            counts: HashMap::new(),
            max_consecutive,
        }
    }

    /// 记录一次失败，返回该工具当前连续失败次数
    pub fn record(&mut self, tool: &str) -> u32 {
        let count = self.counts.entry(tool.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// 成功后清零该工具的连续失败计数（不影响其它工具）
    pub fn reset(&mut self, tool: &str) {
        self.counts.remove(tool);
    }

    /// 该工具是否已到达连续失败上限
    pub fn exhausted(&self, tool: &str) -> bool {
        self.counts.get(tool).copied().unwrap_or(0) >= self.max_consecutive
    }

    pub fn count(&self, tool: &str) -> u32 {
        self.counts.get(tool).copied().unwrap_or(0)
    }

    pub fn max_consecutive(&self) -> u32 {
        self.max_consecutive
    }
}
