//! Mock Gateway（用于测试，无需平台）
//!
//! 按脚本顺序逐次返回预置结果，并记录全部调用供断言。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::platform::gateway::ToolGateway;
use crate::platform::tools::ToolName;

/// 脚本化 Mock Gateway：execute 依次弹出预置结果；脚本耗尽返回通用错误
#[derive(Debug, Default)]
pub struct MockGateway {
    script: Mutex<VecDeque<Result<Value, String>>>,
    calls: Mutex<Vec<(ToolName, Value)>>,
}

impl MockGateway {
    pub fn new(script: Vec<Result<Value, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 已发生的调用（操作名 + payload），供测试断言
    pub fn calls(&self) -> Vec<(ToolName, Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ToolGateway for MockGateway {
    async fn execute(&self, op: ToolName, payload: Value) -> Result<Value, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((op, payload));
        }
        let mut script = self.script.lock().map_err(|e| e.to_string())?;
        script
            .pop_front()
            .unwrap_or_else(|| Err("mock gateway script exhausted".to_string()))
    }
}
