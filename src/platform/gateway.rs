//! 平台工具 Gateway 抽象
//!
//! 真正的 Graph 式 HTTP 调用、合规字段附加、token/租户解析都在外部实现里；
//! 本 crate 只依赖这个 trait。GatewayExecutor 对每次调用施加超时并输出
//! 结构化审计日志（JSON）。失败以字符串返回：可能是纯文本，也可能是
//! JSON 编码的 {code, message, nextSteps}，由 normalize 模块分类。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use crate::platform::tools::ToolName;

/// 平台工具 Gateway：命名操作 -> 结构化成功对象或字符串错误
#[async_trait]
pub trait ToolGateway: Send + Sync {
    async fn execute(&self, op: ToolName, payload: Value) -> Result<Value, String>;
}

/// Gateway 调用包装：超时 + 审计日志
pub struct GatewayExecutor {
    gateway: Arc<dyn ToolGateway>,
    timeout: Duration,
}

impl GatewayExecutor {
    pub fn new(gateway: Arc<dyn ToolGateway>, timeout_secs: u64) -> Self {
        Self {
            gateway,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定操作；超时与失败都以字符串错误返回，供错误归一化分类；输出 JSON 审计日志
    pub async fn execute(&self, op: ToolName, payload: Value) -> Result<Value, String> {
        let start = Instant::now();
        let payload_preview = payload_preview(&payload);
        let result = timeout(self.timeout, self.gateway.execute(op, payload)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "gateway_audit",
            "op": op.as_str(),
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "payload_preview": payload_preview,
        });
        tracing::info!(audit = %audit.to_string(), "gateway");

        match result {
            Ok(inner) => inner,
            Err(_) => Err(format!(
                "{} timed out after {}s",
                op.as_str(),
                self.timeout.as_secs()
            )),
        }
    }
}

fn payload_preview(payload: &Value) -> String {
    let s = payload.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::normalize::{normalize_error, ErrorCategory};

    struct HangingGateway;

    #[async_trait]
    impl ToolGateway for HangingGateway {
        async fn execute(&self, _op: ToolName, _payload: Value) -> Result<Value, String> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_timeout_becomes_generic_string_error() {
        let executor = GatewayExecutor::new(Arc::new(HangingGateway), 0);
        let err = executor
            .execute(ToolName::GetCampaigns, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.contains("timed out"));

        let norm = normalize_error(&err);
        assert_eq!(norm.category, ErrorCategory::Generic);
        assert!(!norm.blocking);
    }
}
