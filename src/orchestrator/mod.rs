//! 指令编排器
//!
//! 单入口：一条自然语言指令进来，驱动有界的模型工具调用循环，出来一个
//! 结构化的执行结果（步骤、摘要、已建实体 id、可选阻断错误）。
//! 循环本体在 loop_，调用前修正在 fixes，提示词在 prompts。

pub mod fixes;
mod loop_;
pub mod prompts;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorSection;
use crate::core::ExecError;
use crate::events::{BlockingError, EventSender};
use crate::llm::ChatModel;
use crate::platform::gateway::{GatewayExecutor, ToolGateway};
use crate::platform::materials::Material;
use crate::steps::{CreatedEntityIds, ExecutionStep, ExecutionSummary};

/// 一次执行请求：自然语言指令 + 账户范围
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub command: String,
    pub account_id: String,
    pub business_id: String,
    pub tenant_id: String,
    /// 续跑来源：之前某次运行的 run_id；调用方据此查出该次已建实体并走
    /// [`CommandOrchestrator::execute_resuming`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_from_run_id: Option<String>,
}

/// 执行结果：会话存档与响应体共用的终态快照
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub summary: ExecutionSummary,
    pub steps: Vec<ExecutionStep>,
    pub message: String,
    #[serde(default)]
    pub created_ids: CreatedEntityIds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_error: Option<BlockingError>,
}

/// 指令编排器：组合模型客户端、Gateway 执行器与循环边界配置
pub struct CommandOrchestrator {
    model: Arc<dyn ChatModel>,
    gateway: GatewayExecutor,
    cfg: ExecutorSection,
}

impl CommandOrchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        gateway: Arc<dyn ToolGateway>,
        cfg: ExecutorSection,
    ) -> Self {
        let gateway = GatewayExecutor::new(gateway, cfg.gateway_timeout_secs);
        Self { model, gateway, cfg }
    }

    /// 执行一条指令
    ///
    /// events 为过程事件推送端（None 则静默执行）；cancel 触发即中止并返回
    /// [`ExecError::Cancelled`]。工具层面的失败不会让本方法返回 Err，而是体现在
    /// 结果的步骤与阻断错误里。
    pub async fn execute(
        &self,
        req: &ExecutionRequest,
        materials: &[Material],
        events: Option<&EventSender>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, ExecError> {
        self.execute_resuming(req, materials, CreatedEntityIds::default(), events, cancel)
            .await
    }

    /// 续跑：prior 为之前那次运行已创建的实体 id（调用方按
    /// `req.resume_from_run_id` 从会话里查出）。已有实体绝不重建，
    /// 循环直接从缺失的实体继续。
    pub async fn execute_resuming(
        &self,
        req: &ExecutionRequest,
        materials: &[Material],
        prior: CreatedEntityIds,
        events: Option<&EventSender>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, ExecError> {
        loop_::run_execution(
            self.model.as_ref(),
            &self.gateway,
            &self.cfg,
            req,
            materials,
            prior,
            events,
            cancel,
        )
        .await
    }
}
