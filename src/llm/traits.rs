//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 ChatModel：给定对话转录与工具定义，
//! 返回最终回复或一批 Tool Call。模型是黑盒，正确性不得依赖模型行为良好。

use async_trait::async_trait;

use crate::llm::message::{Message, ToolCallRequest};

/// 暴露给模型的工具定义（名称、描述、参数 JSON Schema）
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// 模型一轮输出：最终文字回复，或一批按序执行的 Tool Call
#[derive(Clone, Debug)]
pub enum ModelTurn {
    Message(String),
    ToolCalls(Vec<ToolCallRequest>),
}

/// Tool-Calling 模型客户端 trait
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 请求下一轮：转录 + 工具定义 -> 回复或 Tool Call 列表
    async fn next_turn(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ModelTurn, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
