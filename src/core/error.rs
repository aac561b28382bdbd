//! 执行错误类型
//!
//! 工具调用层面的失败全部被归一化并附着到步骤上（见 platform::normalize），
//! ExecError 只承载无法继续驱动循环的基础设施错误。

use thiserror::Error;

/// 编排器基础设施错误（模型请求、取消）
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Cancelled")]
    Cancelled,
}
