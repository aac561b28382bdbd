//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；
//! 使用原生 Tool-Calling：请求携带工具定义，响应解析为 ModelTurn。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequestArgs, FunctionCall, FunctionObject,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::message::{Message, Role, ToolCallRequest};
use crate::llm::traits::{ChatModel, ModelTurn, ToolSpec};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，next_turn 时转消息与工具定义为 API 格式
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiModel {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    fn to_openai_messages(&self, messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .unwrap(),
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .unwrap(),
                ),
                Role::Assistant => {
                    let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                    if !m.content.is_empty() {
                        args.content(m.content.clone());
                    }
                    if !m.tool_calls.is_empty() {
                        let calls: Vec<ChatCompletionMessageToolCalls> = m
                            .tool_calls
                            .iter()
                            .map(|tc| {
                                ChatCompletionMessageToolCalls::Function(
                                    ChatCompletionMessageToolCall {
                                        id: tc.id.clone(),
                                        function: FunctionCall {
                                            name: tc.name.clone(),
                                            arguments: tc.arguments.to_string(),
                                        },
                                    },
                                )
                            })
                            .collect();
                        args.tool_calls(calls);
                    }
                    ChatCompletionRequestMessage::Assistant(args.build().unwrap())
                }
                Role::Tool => ChatCompletionRequestMessage::Tool(
                    ChatCompletionRequestToolMessageArgs::default()
                        .content(m.content.clone())
                        .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
                        .build()
                        .unwrap(),
                ),
            })
            .collect()
    }

    fn to_openai_tools(&self, tools: &[ToolSpec]) -> Vec<ChatCompletionTools> {
        tools
            .iter()
            .map(|t| {
                ChatCompletionTools::Function(ChatCompletionTool {
                    function: FunctionObject {
                        name: t.name.to_string(),
                        description: Some(t.description.to_string()),
                        parameters: Some(t.parameters.clone()),
                        strict: None,
                    },
                })
            })
            .collect()
    }
}

#[async_trait]
impl ChatModel for OpenAiModel {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn next_turn(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ModelTurn, String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages))
            .tools(self.to_openai_tools(tools))
            .build()
            .map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| "empty choices in model response".to_string())?;

        if let Some(tool_calls) = choice.message.tool_calls {
            // 只认 function 类调用，其余工具类型直接忽略
            let calls: Vec<ToolCallRequest> = tool_calls
                .into_iter()
                .filter_map(|tc| match tc {
                    ChatCompletionMessageToolCalls::Function(call) => Some(ToolCallRequest {
                        id: call.id,
                        name: call.function.name,
                        // 参数字符串可能不是合法 JSON，解析失败时保底为空对象，由工具层校验
                        arguments: serde_json::from_str(&call.function.arguments)
                            .unwrap_or_else(|_| serde_json::json!({})),
                    }),
                    _ => None,
                })
                .collect();
            if !calls.is_empty() {
                return Ok(ModelTurn::ToolCalls(calls));
            }
        }

        Ok(ModelTurn::Message(choice.message.content.unwrap_or_default()))
    }
}
