//! 步骤状态机与注册表
//!
//! 每次执行一个 StepRegistry，按逻辑键（campaign/adset/ad/validation，多广告时
//! ad 键带序号）保存唯一的 ExecutionStep；更新一律原地进行，绝不重复建步。
//! 终态（success/error）一经写入不再迁出。注册表是步骤生命周期唯一的所有者。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::platform::normalize::NormalizedError;

/// 逻辑步骤种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Campaign,
    Adset,
    Ad,
    /// 账户级校验。创建链路的合规预检（preflight_create_campaign_bundle）失败
    /// 直接终结 campaign 步骤，不单独建 validation 步；本变体保留给独立的
    /// 账户校验会话与外部存档的反序列化。
    Validation,
}

impl StepKind {
    /// 展示顺序；validation 在最前
    pub fn order(&self) -> u8 {
        match self {
            StepKind::Validation => 0,
            StepKind::Campaign => 1,
            StepKind::Adset => 2,
            StepKind::Ad => 3,
        }
    }

    /// 三个主步骤种类（campaign/adset/ad）计入 stepsCompleted/totalSteps
    pub fn is_primary(&self) -> bool {
        !matches!(self, StepKind::Validation)
    }
}

/// 逻辑步骤键：种类 + 序号（只有多广告时 ad 序号才会大于 1）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepKey {
    pub kind: StepKind,
    pub index: usize,
}

impl StepKey {
    pub fn of(kind: StepKind) -> Self {
        Self { kind, index: 1 }
    }

    pub fn ad(index: usize) -> Self {
        Self {
            kind: StepKind::Ad,
            index,
        }
    }

    fn title(&self) -> String {
        match self.kind {
            StepKind::Campaign => "Create campaign".to_string(),
            StepKind::Adset => "Create ad set".to_string(),
            StepKind::Ad => {
                if self.index > 1 {
                    format!("Create ad {}", self.index)
                } else {
                    "Create ad".to_string()
                }
            }
            StepKind::Validation => "Validate account".to_string(),
        }
    }
}

/// 步骤生命周期状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Retrying,
    Success,
    Error,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Error)
    }
}

/// 单个逻辑步骤的完整记录
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub id: String,
    pub kind: StepKind,
    /// 展示顺序（种类序 * 10 + 序号，保证多广告步骤相邻且有序）
    pub order: u16,
    pub title: String,
    pub status: StepStatus,
    pub summary: String,
    /// 面向用户的标题/说明/下一步/依据（出错时由归一化错误填充）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub next_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// 已应用的自动修正（可读文本，去重）
    #[serde(default)]
    pub fixes_applied: Vec<String>,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// 成功后平台分配的实体 id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
}

/// 平台分配 id 的累加器：只从成功的工具结果填充，绝不猜测
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEntityIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_set_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ad_ids: Vec<String>,
}

impl CreatedEntityIds {
    /// 幂等记录：同一逻辑键的重放不改变已记录的 id
    pub fn record(&mut self, kind: StepKind, id: &str) {
        match kind {
            StepKind::Campaign => {
                if self.campaign_id.is_none() {
                    self.campaign_id = Some(id.to_string());
                }
            }
            StepKind::Adset => {
                if self.ad_set_id.is_none() {
                    self.ad_set_id = Some(id.to_string());
                }
            }
            StepKind::Ad => {
                if self.ad_id.is_none() {
                    self.ad_id = Some(id.to_string());
                }
                if !self.ad_ids.iter().any(|existing| existing == id) {
                    self.ad_ids.push(id.to_string());
                }
            }
            StepKind::Validation => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.campaign_id.is_none() && self.ad_set_id.is_none() && self.ad_ids.is_empty()
    }
}

/// 最终执行状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    Success,
    Partial,
    Error,
}

/// 派生的执行摘要（不落库）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub steps_completed: usize,
    pub total_steps: usize,
    /// 全部步骤的 max(0, attempts-1) 之和
    pub retries: u32,
    pub final_status: FinalStatus,
}

/// 按逻辑键保存步骤的注册表；单次执行独占一个实例
#[derive(Debug, Default)]
pub struct StepRegistry {
    steps: HashMap<StepKey, ExecutionStep>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一次尝试：首次创建（running, attempts=1），重入则 attempts+1 并回到 running。
    /// 终态步骤不再变更。返回当前 attempts。
    pub fn register_attempt(&mut self, key: StepKey) -> u32 {
        if let Some(step) = self.steps.get_mut(&key) {
            if step.status.is_terminal() {
                return step.attempts;
            }
            step.attempts += 1;
            step.status = StepStatus::Running;
            return step.attempts;
        }
        let step = ExecutionStep {
            id: uuid::Uuid::new_v4().to_string(),
            kind: key.kind,
            order: key.kind.order() as u16 * 10 + key.index as u16,
            title: key.title(),
            status: StepStatus::Running,
            summary: String::new(),
            user_title: None,
            user_message: None,
            next_steps: Vec::new(),
            rationale: None,
            fixes_applied: Vec::new(),
            attempts: 1,
            started_at: Utc::now(),
            finished_at: None,
            entity_id: None,
            debug: None,
        };
        self.steps.insert(key, step);
        1
    }

    /// 追加自动修正说明（按去空白文本去重，幂等）
    pub fn append_fixes(&mut self, key: StepKey, fixes: &[String]) {
        let Some(step) = self.steps.get_mut(&key) else {
            return;
        };
        for fix in fixes {
            let trimmed = fix.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !step.fixes_applied.iter().any(|f| f.trim() == trimmed) {
                step.fixes_applied.push(trimmed.to_string());
            }
        }
    }

    /// 标记为重试中（终态不迁出）
    pub fn mark_retrying(&mut self, key: StepKey, summary: impl Into<String>) {
        if let Some(step) = self.steps.get_mut(&key) {
            if step.status.is_terminal() {
                return;
            }
            step.status = StepStatus::Retrying;
            step.summary = summary.into();
        }
    }

    /// 终结为成功（设置 finish 时间戳；重复调用无效果）
    pub fn mark_success(
        &mut self,
        key: StepKey,
        summary: impl Into<String>,
        entity_id: Option<String>,
    ) {
        if let Some(step) = self.steps.get_mut(&key) {
            if step.status.is_terminal() {
                return;
            }
            step.status = StepStatus::Success;
            step.summary = summary.into();
            step.entity_id = entity_id;
            step.finished_at = Some(Utc::now());
        }
    }

    /// 终结为失败，携带归一化错误的用户可读字段
    pub fn mark_error(&mut self, key: StepKey, error: &NormalizedError) {
        if let Some(step) = self.steps.get_mut(&key) {
            if step.status.is_terminal() {
                return;
            }
            step.status = StepStatus::Error;
            step.summary = error.message.clone();
            step.user_title = Some(error.title.clone());
            step.user_message = Some(error.message.clone());
            step.next_steps = error.next_steps.clone();
            step.rationale = Some(error.rationale.clone());
            step.debug = serde_json::to_value(&error.debug).ok();
            step.finished_at = Some(Utc::now());
        }
    }

    pub fn get(&self, key: StepKey) -> Option<&ExecutionStep> {
        self.steps.get(&key)
    }

    /// 某种类的步骤数（多广告时 ad 可能多个）
    pub fn count_of_kind(&self, kind: StepKind) -> usize {
        self.steps.keys().filter(|k| k.kind == kind).count()
    }

    /// 全部步骤，按 order 排序，开始时间决胜
    pub fn list(&self) -> Vec<ExecutionStep> {
        let mut steps: Vec<ExecutionStep> = self.steps.values().cloned().collect();
        steps.sort_by(|a, b| a.order.cmp(&b.order).then(a.started_at.cmp(&b.started_at)));
        steps
    }

    /// 派生摘要。completed = 执行循环正常收尾（模型给出最终回复或目标达成）。
    /// 只要存在任一主步骤，totalSteps 固定为 3（三个主步骤种类）。
    pub fn summarize(&self, completed: bool) -> ExecutionSummary {
        let has_primary = self.steps.keys().any(|k| k.kind.is_primary());
        let total_steps = if has_primary { 3 } else { 0 };
        // 种类完成 = 该种类至少一个步骤且全部 success
        let steps_completed = [StepKind::Campaign, StepKind::Adset, StepKind::Ad]
            .into_iter()
            .filter(|kind| {
                let of_kind: Vec<&ExecutionStep> =
                    self.steps.values().filter(|s| s.kind == *kind).collect();
                !of_kind.is_empty() && of_kind.iter().all(|s| s.status == StepStatus::Success)
            })
            .count();
        let retries: u32 = self.steps.values().map(|s| s.attempts.saturating_sub(1)).sum();
        let has_error = self.steps.values().any(|s| s.status == StepStatus::Error);
        let any_success = self
            .steps
            .values()
            .any(|s| s.kind.is_primary() && s.status == StepStatus::Success);

        // 正常收尾且无失败步骤即 success（update/duplicate 等单实体对话不要求三步齐全）；
        // 有失败步骤或提前中止但有进展为 partial
        let final_status = if has_error {
            if any_success {
                FinalStatus::Partial
            } else {
                FinalStatus::Error
            }
        } else if completed {
            FinalStatus::Success
        } else if any_success {
            FinalStatus::Partial
        } else {
            FinalStatus::Error
        };

        ExecutionSummary {
            steps_completed,
            total_steps,
            retries,
            final_status,
        }
    }
}
