//! Mock 模型客户端（用于测试，无需 API）
//!
//! 按脚本顺序逐轮吐出 ModelTurn；脚本耗尽后返回固定结束语，便于本地跑通执行循环。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::message::{Message, ToolCallRequest};
use crate::llm::traits::{ChatModel, ModelTurn, ToolSpec};

/// 脚本化 Mock 客户端：next_turn 依次弹出预置轮次
#[derive(Debug, Default)]
pub struct MockChatModel {
    turns: Mutex<VecDeque<ModelTurn>>,
}

impl MockChatModel {
    pub fn new(turns: Vec<ModelTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
        }
    }

    /// 便捷构造：单个 Tool Call 轮次
    pub fn tool_call(name: &str, arguments: serde_json::Value) -> ModelTurn {
        ModelTurn::ToolCalls(vec![ToolCallRequest {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.to_string(),
            arguments,
        }])
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn next_turn(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<ModelTurn, String> {
        let mut turns = self.turns.lock().map_err(|e| e.to_string())?;
        Ok(turns
            .pop_front()
            .unwrap_or_else(|| ModelTurn::Message("Done.".to_string())))
    }
}
