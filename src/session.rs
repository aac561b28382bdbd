//! 执行会话
//!
//! 每次编排器调用一个 ExecutionSession：运行标识、指令、账户范围、状态、步骤与
//! 最终摘要。只由驱动该次执行的编排器变更；流关闭后仍可查询，超过 TTL 由
//! cleanup_expired 回收。会话之间互不共享状态。

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::events::BlockingError;
use crate::orchestrator::{ExecutionOutcome, ExecutionRequest};
use crate::steps::{CreatedEntityIds, ExecutionStep, ExecutionSummary};

/// 会话状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

/// 单次执行的会话记录
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSession {
    pub run_id: String,
    pub command: String,
    pub account_id: String,
    pub business_id: String,
    pub tenant_id: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub steps: Vec<ExecutionStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ExecutionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_error: Option<BlockingError>,
    #[serde(default)]
    pub created_ids: CreatedEntityIds,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 内存会话管理器：按 run_id 存取，TTL 过期回收
pub struct SessionManager {
    sessions: RwLock<HashMap<String, ExecutionSession>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// 创建新会话，返回 run_id
    pub async fn create(&self, req: &ExecutionRequest) -> String {
        let run_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let session = ExecutionSession {
            run_id: run_id.clone(),
            command: req.command.clone(),
            account_id: req.account_id.clone(),
            business_id: req.business_id.clone(),
            tenant_id: req.tenant_id.clone(),
            status: SessionStatus::Running,
            steps: Vec::new(),
            summary: None,
            message: None,
            blocking_error: None,
            created_ids: CreatedEntityIds::default(),
            created_at: now,
            updated_at: now,
        };
        self.sessions.write().await.insert(run_id.clone(), session);
        run_id
    }

    pub async fn get(&self, run_id: &str) -> Option<ExecutionSession> {
        self.sessions.read().await.get(run_id).cloned()
    }

    /// 执行中的步骤快照更新（供进度查询）
    pub async fn update_steps(&self, run_id: &str, steps: Vec<ExecutionStep>) {
        let mut sessions = self.sessions.write().await;
        if let Some(s) = sessions.get_mut(run_id) {
            s.steps = steps;
            s.updated_at = Utc::now();
        }
    }

    /// 执行结束：写入摘要、消息与阻断错误，状态转终态
    pub async fn finish(&self, run_id: &str, outcome: &ExecutionOutcome) {
        let mut sessions = self.sessions.write().await;
        if let Some(s) = sessions.get_mut(run_id) {
            s.steps = outcome.steps.clone();
            s.summary = Some(outcome.summary.clone());
            s.message = Some(outcome.message.clone());
            s.blocking_error = outcome.blocking_error.clone();
            s.created_ids = outcome.created_ids.clone();
            s.status = if outcome.blocking_error.is_some() {
                SessionStatus::Failed
            } else {
                SessionStatus::Completed
            };
            s.updated_at = Utc::now();
        }
    }

    /// 回收超过 TTL 的已结束会话，返回回收数；运行中的会话不回收
    pub async fn cleanup_expired(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.status == SessionStatus::Running || s.updated_at > cutoff);
        before - sessions.len()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::FinalStatus;

    fn req() -> ExecutionRequest {
        ExecutionRequest {
            command: "create a campaign".to_string(),
            account_id: "act_1".to_string(),
            business_id: "biz_1".to_string(),
            tenant_id: "t_1".to_string(),
            resume_from_run_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_finish() {
        let mgr = SessionManager::new(3600);
        let run_id = mgr.create(&req()).await;
        assert_eq!(mgr.get(&run_id).await.unwrap().status, SessionStatus::Running);

        let outcome = ExecutionOutcome {
            summary: ExecutionSummary {
                steps_completed: 0,
                total_steps: 0,
                retries: 0,
                final_status: FinalStatus::Success,
            },
            steps: Vec::new(),
            message: "done".to_string(),
            created_ids: CreatedEntityIds::default(),
            blocking_error: None,
        };
        mgr.finish(&run_id, &outcome).await;
        let s = mgr.get(&run_id).await.unwrap();
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.message.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_cleanup_skips_running_sessions() {
        let mgr = SessionManager::new(0); // TTL 0：一切已结束会话立即过期
        let run_id = mgr.create(&req()).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let evicted = mgr.cleanup_expired().await;
        assert_eq!(evicted, 0);
        assert!(mgr.get(&run_id).await.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_evicts_finished_sessions() {
        let mgr = SessionManager::new(0);
        let run_id = mgr.create(&req()).await;
        let outcome = ExecutionOutcome {
            summary: ExecutionSummary {
                steps_completed: 0,
                total_steps: 0,
                retries: 0,
                final_status: FinalStatus::Success,
            },
            steps: Vec::new(),
            message: String::new(),
            created_ids: CreatedEntityIds::default(),
            blocking_error: None,
        };
        mgr.finish(&run_id, &outcome).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(mgr.cleanup_expired().await, 1);
        assert!(mgr.get(&run_id).await.is_none());
    }
}
