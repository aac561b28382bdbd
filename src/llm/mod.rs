pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

pub use message::{Message, Role, ToolCallRequest};
pub use mock::MockChatModel;
pub use openai::OpenAiModel;
pub use traits::{ChatModel, ModelTurn, ToolSpec};

use std::sync::Arc;

use crate::config::AppConfig;

/// 根据配置创建模型客户端（OpenAI 兼容端点，base_url 可指向代理）
pub fn create_model_from_config(cfg: &AppConfig) -> Arc<dyn ChatModel> {
    Arc::new(OpenAiModel::new(
        cfg.llm.base_url.as_deref(),
        &cfg.llm.model,
        None,
    ))
}
