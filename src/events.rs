//! 执行过程事件：用于 SSE 等单向推送通道展示步骤进度
//!
//! 封闭词表，serde tag = "type"。消费端按步骤 id 重建状态；未知事件类型与畸形
//! payload 必须被忽略而不中断流。生产端保证每次执行恰好一个终结事件
//! （timeline.done 或 execution_error）。

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::platform::normalize::{RemediationAction, RemediationCode};
use crate::steps::{CreatedEntityIds, ExecutionStep, ExecutionSummary};

/// 阻断错误 payload：调用方据 action 将用户导航到手动解决入口
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingError {
    /// 三个识别补救码之一；权限类阻断无码
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<RemediationCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<RemediationAction>,
    pub title: String,
    pub message: String,
    pub next_steps: Vec<String>,
}

/// 单步过程事件（序列化为 JSON 供前端展示）
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    /// 步骤首次进入 running
    #[serde(rename = "step.start")]
    StepStart { step: ExecutionStep },
    /// 步骤状态/重试/修正更新
    #[serde(rename = "step.update")]
    StepUpdate { step: ExecutionStep },
    /// 步骤终结为成功
    #[serde(rename = "step.success")]
    StepSuccess { step: ExecutionStep },
    /// 步骤终结为失败
    #[serde(rename = "step.error")]
    StepError { step: ExecutionStep },
    /// 执行摘要（终结事件之前发出）
    #[serde(rename = "execution_summary")]
    Summary {
        summary: ExecutionSummary,
        created_ids: CreatedEntityIds,
        message: String,
    },
    /// 正常终结
    #[serde(rename = "timeline.done")]
    TimelineDone,
    /// 阻断终结
    #[serde(rename = "execution_error")]
    ExecutionError { error: BlockingError },
}

pub type EventSender = mpsc::UnboundedSender<ExecutionEvent>;

/// 推送事件；消费端掉线（接收端已关闭）不影响执行继续
pub fn send_event(tx: &Option<&EventSender>, ev: ExecutionEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 消费端解码：未知类型或畸形 payload 返回 None，绝不让流中断
pub fn decode_event(raw: &str) -> Option<ExecutionEvent> {
    serde_json::from_str(raw).ok()
}
