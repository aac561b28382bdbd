//! 执行循环
//!
//! 一条指令一次循环：请求模型下一轮，执行其 Tool Call，把结果回填进转录，
//! 直到模型给出最终回复、目标达成、出现阻断错误或达到轮数上限。
//! 步骤注册表是本循环内部状态，正确性不依赖模型行为良好：
//! 幂等跳过重复创建、每次调用前跑确定性修正、失败按类别分流（阻断 / 重试）。

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorSection;
use crate::constraints::{enforce_constraints, parse_constraints};
use crate::core::{ExecError, FailureTracker};
use crate::events::{send_event, BlockingError, EventSender, ExecutionEvent};
use crate::llm::{ChatModel, Message, ModelTurn};
use crate::orchestrator::{fixes, prompts, ExecutionOutcome, ExecutionRequest};
use crate::platform::gateway::GatewayExecutor;
use crate::platform::materials::{requested_ad_count, resolve_materials, Material};
use crate::platform::normalize::{normalize_error, ErrorCategory, NormalizedError};
use crate::platform::tools::{tool_specs, ParsedToolCall, ToolName};
use crate::steps::{CreatedEntityIds, StepKey, StepKind, StepRegistry};

#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_execution(
    model: &dyn ChatModel,
    gateway: &GatewayExecutor,
    cfg: &ExecutorSection,
    req: &ExecutionRequest,
    materials: &[Material],
    prior: CreatedEntityIds,
    events: Option<&EventSender>,
    cancel: &CancellationToken,
) -> Result<ExecutionOutcome, ExecError> {
    let tools = tool_specs();
    let constraints = parse_constraints(&req.command);
    let requested_ads = requested_ad_count(&req.command)
        .unwrap_or(cfg.default_ad_count)
        .max(1);
    let assignments = resolve_materials(&req.command, materials, requested_ads);

    let mut registry = StepRegistry::new();
    let mut created = CreatedEntityIds::default();
    let mut failures = FailureTracker::new(cfg.max_consecutive_failures);

    // 预算继承源：以指令里的金额起步，Campaign 创建后以其实际预算为准
    let mut campaign_budget_cents = fixes::budget_cents_from_command(&req.command);
    let mut bid_required = false;
    let mut advantage_required = false;
    let mut campaign_created = false;
    let mut adset_created = false;
    let mut ads_created: usize = 0;
    let mut duplicate_done = false;
    let mut complete = false;
    let mut blocking: Option<BlockingError> = None;
    let mut final_text: Option<String> = None;

    // 续跑：上次已建的实体进注册表（终态 success），循环从缺失实体继续
    if let Some(id) = &prior.campaign_id {
        let key = StepKey::of(StepKind::Campaign);
        registry.register_attempt(key);
        registry.mark_success(key, "Created in a previous run", Some(id.clone()));
        created.record(StepKind::Campaign, id);
        campaign_created = true;
    }
    if let Some(id) = &prior.ad_set_id {
        let key = StepKey::of(StepKind::Adset);
        registry.register_attempt(key);
        registry.mark_success(key, "Created in a previous run", Some(id.clone()));
        created.record(StepKind::Adset, id);
        adset_created = true;
    }
    for id in &prior.ad_ids {
        let key = StepKey::ad(ads_created + 1);
        registry.register_attempt(key);
        registry.mark_success(key, "Created in a previous run", Some(id.clone()));
        created.record(StepKind::Ad, id);
        ads_created += 1;
    }

    let mut messages = vec![
        Message::system(prompts::build_system_prompt(
            req,
            materials,
            &assignments,
            requested_ads,
        )),
        Message::user(req.command.clone()),
    ];
    if !created.is_empty() {
        messages.push(Message::user(prompts::resume_context(&created)));
    }

    'run: for _iteration in 0..cfg.max_iterations {
        if cancel.is_cancelled() {
            let error = BlockingError {
                code: None,
                action: None,
                title: "Execution cancelled".to_string(),
                message: "The execution was cancelled before it finished.".to_string(),
                next_steps: vec!["Run the command again to restart.".to_string()],
            };
            send_event(&events, ExecutionEvent::ExecutionError { error });
            return Err(ExecError::Cancelled);
        }

        let turn = match model.next_turn(&messages, &tools).await {
            Ok(t) => t,
            Err(e) => {
                if registry.list().is_empty() {
                    let error = BlockingError {
                        code: None,
                        action: None,
                        title: "Model unavailable".to_string(),
                        message: e.clone(),
                        next_steps: vec!["Try the command again in a moment.".to_string()],
                    };
                    send_event(&events, ExecutionEvent::ExecutionError { error });
                    return Err(ExecError::Model(e));
                }
                // 已有进展：保留部分结果收尾，不丢弃已创建的实体
                tracing::warn!(error = %e, "model request failed mid-run");
                final_text = Some(format!(
                    "The model became unavailable before the run finished: {}",
                    e
                ));
                break;
            }
        };

        let calls = match turn {
            ModelTurn::Message(text) => {
                final_text = Some(text);
                complete = true;
                break;
            }
            ModelTurn::ToolCalls(calls) => calls,
        };

        messages.push(Message::assistant_tool_calls(calls.clone()));
        let mut progressed = false;

        for tc in &calls {
            let parsed = match ParsedToolCall::parse(&tc.name, &tc.arguments) {
                Ok(p) => p,
                Err(e) => {
                    // 未知工具或成形失败：按工具错误回填，绝不到达 Gateway
                    messages.push(Message::tool(tc.id.clone(), format!("Error: {}", e)));
                    continue;
                }
            };
            let op = parsed.tool_name();

            // 读操作：无步骤，直接转发
            if matches!(parsed, ParsedToolCall::GetCampaigns { .. }) {
                let text = match gateway.execute(op, envelope(req, parsed.to_payload())).await {
                    Ok(v) => v.to_string(),
                    Err(e) => format!("Error: {}", e),
                };
                messages.push(Message::tool(tc.id.clone(), text));
                continue;
            }

            let Some(kind) = op.step_kind() else {
                messages.push(Message::tool(
                    tc.id.clone(),
                    "Error: unsupported operation".to_string(),
                ));
                continue;
            };

            // 幂等跳过：已有的实体不重建
            match &parsed {
                ParsedToolCall::CreateCampaign(_) if created.campaign_id.is_some() => {
                    let id = created.campaign_id.clone().unwrap_or_default();
                    messages.push(Message::tool(
                        tc.id.clone(),
                        format!("The campaign already exists with id {}. Do not create it again.", id),
                    ));
                    continue;
                }
                ParsedToolCall::CreateAdset(_) if created.ad_set_id.is_some() => {
                    let id = created.ad_set_id.clone().unwrap_or_default();
                    messages.push(Message::tool(
                        tc.id.clone(),
                        format!("The ad set already exists with id {}. Do not create it again.", id),
                    ));
                    continue;
                }
                ParsedToolCall::CreateAd(_) if ads_created >= requested_ads => {
                    messages.push(Message::tool(
                        tc.id.clone(),
                        format!(
                            "All {} requested ads are already created. Reply with a summary instead.",
                            requested_ads
                        ),
                    ));
                    continue;
                }
                _ => {}
            }

            let key = match kind {
                StepKind::Ad => StepKey::ad(ads_created + 1),
                other => StepKey::of(other),
            };
            let attempts = registry.register_attempt(key);
            if let Some(step) = registry.get(key).cloned() {
                let ev = if attempts == 1 {
                    ExecutionEvent::StepStart { step }
                } else {
                    ExecutionEvent::StepUpdate { step }
                };
                send_event(&events, ev);
            }

            let is_duplicate = matches!(
                parsed,
                ParsedToolCall::DuplicateCampaign { .. }
                    | ParsedToolCall::DuplicateAdset { .. }
                    | ParsedToolCall::DuplicateAd { .. }
            );

            // 调用前的确定性修正
            let (params, fix_list): (Value, Vec<String>) = match parsed {
                ParsedToolCall::CreateCampaign(mut draft) => {
                    let applied = fixes::fix_campaign(&mut draft, &req.command);
                    campaign_budget_cents = draft.daily_budget_cents.or(campaign_budget_cents);
                    (serde_json::to_value(&draft).unwrap_or_default(), applied)
                }
                ParsedToolCall::CreateAdset(mut draft) => {
                    let mut applied = fixes::fix_adset(
                        &mut draft,
                        &created,
                        campaign_budget_cents,
                        bid_required,
                        advantage_required,
                    );
                    applied.extend(enforce_constraints(&constraints, &mut draft.targeting));
                    (serde_json::to_value(&draft).unwrap_or_default(), applied)
                }
                ParsedToolCall::CreateAd(mut draft) => {
                    let assignment = assignments.iter().find(|a| a.ad_index == key.index);
                    let applied =
                        fixes::fix_ad(&mut draft, &created, materials, assignment, key.index);
                    (serde_json::to_value(&draft).unwrap_or_default(), applied)
                }
                ParsedToolCall::UpdateCampaign { campaign_id, fields } => {
                    let mut campaign_id = campaign_id;
                    let mut applied = Vec::new();
                    if campaign_id.is_none() {
                        if let Some(id) = &created.campaign_id {
                            campaign_id = Some(id.clone());
                            applied.push(format!(
                                "Filled the missing campaign id with the created campaign {}",
                                id
                            ));
                        }
                    }
                    (json!({ "campaignId": campaign_id, "fields": fields }), applied)
                }
                ParsedToolCall::GetCampaigns { .. } => continue,
                other => (other.to_payload(), Vec::new()),
            };

            if !fix_list.is_empty() {
                registry.append_fixes(key, &fix_list);
                if let Some(step) = registry.get(key).cloned() {
                    send_event(&events, ExecutionEvent::StepUpdate { step });
                }
            }

            // Campaign 创建前的同步合规预检：失败一律阻断，零实体创建
            if op == ToolName::CreateCampaign {
                if let Err(e) = gateway
                    .execute(ToolName::PreflightCreateCampaignBundle, envelope(req, params.clone()))
                    .await
                {
                    let norm = normalize_error(&e);
                    registry.mark_error(key, &norm);
                    if let Some(step) = registry.get(key).cloned() {
                        send_event(&events, ExecutionEvent::StepError { step });
                    }
                    blocking = Some(blocking_payload(&norm));
                    messages.push(Message::tool(tc.id.clone(), format!("Error: {}", norm.message)));
                    break 'run;
                }
            }

            let tool = op.as_str();
            match gateway.execute(op, envelope(req, params)).await {
                Ok(value) => {
                    failures.reset(tool);
                    progressed = true;
                    let entity_id = entity_id_of(&value);
                    if let Some(id) = &entity_id {
                        created.record(kind, id);
                    }
                    match (op, kind) {
                        (ToolName::CreateCampaign, _) => campaign_created = true,
                        (ToolName::CreateAdset, _) => adset_created = true,
                        _ => {}
                    }
                    if kind == StepKind::Ad {
                        ads_created += 1;
                    }
                    if is_duplicate {
                        duplicate_done = true;
                    }
                    registry.mark_success(key, success_summary(op, entity_id.as_deref()), entity_id);
                    if let Some(step) = registry.get(key).cloned() {
                        send_event(&events, ExecutionEvent::StepSuccess { step });
                    }
                    messages.push(Message::tool(tc.id.clone(), value.to_string()));
                }
                Err(e) => {
                    let count = failures.record(tool);
                    let norm = normalize_error(&e);
                    match norm.category {
                        ErrorCategory::BidRequired => bid_required = true,
                        ErrorCategory::AdvantageAudience => advantage_required = true,
                        _ => {}
                    }

                    if norm.blocking || failures.exhausted(tool) {
                        registry.mark_error(key, &norm);
                        if let Some(step) = registry.get(key).cloned() {
                            send_event(&events, ExecutionEvent::StepError { step });
                        }
                        // 广告阶段撞上计费阻断：暂停已建实体，绝不删除
                        if norm.category == ErrorCategory::Billing && kind == StepKind::Ad {
                            rollback_pause(gateway, req, &created).await;
                        }
                        if norm.blocking {
                            blocking = Some(blocking_payload(&norm));
                        }
                        messages
                            .push(Message::tool(tc.id.clone(), format!("Error: {}", norm.message)));
                        tracing::warn!(
                            tool,
                            attempts = count,
                            category = ?norm.category,
                            "step failed terminally"
                        );
                        break 'run;
                    }

                    registry.mark_retrying(key, norm.message.clone());
                    if let Some(step) = registry.get(key).cloned() {
                        send_event(&events, ExecutionEvent::StepUpdate { step });
                    }
                    // 限流退避：按连续失败次数递增等待后再让模型重发
                    if norm.category == ErrorCategory::RateLimit {
                        tokio::time::sleep(std::time::Duration::from_millis(300 * count as u64))
                            .await;
                    }
                    let mut text = format!("Error: {}", norm.message);
                    if let Some(hint) = norm.retry_hint() {
                        text.push(' ');
                        text.push_str(hint);
                    }
                    messages.push(Message::tool(tc.id.clone(), text));
                }
            }
        }

        // 只有取得进展时才引导下一实体；失败场景交给模型按工具错误自行重试
        if progressed {
            if duplicate_done || (adset_created && ads_created >= requested_ads) {
                complete = true;
                break;
            }
            if let Some(campaign_id) = &created.campaign_id {
                if campaign_created && !adset_created {
                    messages.push(Message::user(prompts::nudge_create_adset(campaign_id)));
                }
            }
            if adset_created && ads_created < requested_ads {
                if let Some(ad_set_id) = &created.ad_set_id {
                    let next = ads_created + 1;
                    let assignment = assignments.iter().find(|a| a.ad_index == next);
                    messages.push(Message::user(prompts::nudge_create_ad(
                        ad_set_id,
                        next,
                        requested_ads,
                        assignment,
                    )));
                }
            }
        }
    }

    let summary = registry.summarize(complete);
    let steps = registry.list();
    let message =
        final_text.unwrap_or_else(|| synthesize_message(complete, &created, &blocking));

    send_event(
        &events,
        ExecutionEvent::Summary {
            summary: summary.clone(),
            created_ids: created.clone(),
            message: message.clone(),
        },
    );
    // 终结事件恰好一个
    match &blocking {
        Some(error) => send_event(&events, ExecutionEvent::ExecutionError { error: error.clone() }),
        None => send_event(&events, ExecutionEvent::TimelineDone),
    }

    Ok(ExecutionOutcome {
        summary,
        steps,
        message,
        created_ids: created,
        blocking_error: blocking,
    })
}

/// 账户范围信封：每次 Gateway 调用都带上完整的账户/租户上下文
fn envelope(req: &ExecutionRequest, params: Value) -> Value {
    json!({
        "accountId": req.account_id,
        "businessId": req.business_id,
        "tenantId": req.tenant_id,
        "params": params,
    })
}

/// 从成功结果里提取平台分配的实体 id
fn entity_id_of(value: &Value) -> Option<String> {
    ["id", "campaignId", "adsetId", "adSetId", "adId"]
        .iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn success_summary(op: ToolName, entity_id: Option<&str>) -> String {
    match (op, entity_id) {
        (ToolName::CreateCampaign, Some(id)) => format!("Campaign created with id {}", id),
        (ToolName::CreateAdset, Some(id)) => format!("Ad set created with id {}", id),
        (ToolName::CreateAd, Some(id)) => format!("Ad created with id {}", id),
        (ToolName::UpdateCampaign, _) => "Campaign updated".to_string(),
        (op, Some(id)) => format!("{} succeeded with id {}", op.as_str(), id),
        (op, None) => format!("{} succeeded", op.as_str()),
    }
}

fn blocking_payload(err: &NormalizedError) -> BlockingError {
    let (code, action) = match err.remediation() {
        Some((c, a)) => (Some(c), Some(a)),
        None => (None, None),
    };
    BlockingError {
        code,
        action,
        title: err.title.clone(),
        message: err.message.clone(),
        next_steps: err.next_steps.clone(),
    }
}

/// 计费阻断后的回滚：把已建实体暂停，失败只记日志不影响收尾
async fn rollback_pause(gateway: &GatewayExecutor, req: &ExecutionRequest, created: &CreatedEntityIds) {
    if let Some(adset_id) = &created.ad_set_id {
        let payload = envelope(req, json!({ "adsetId": adset_id, "status": "PAUSED" }));
        if let Err(e) = gateway.execute(ToolName::PauseAdset, payload).await {
            tracing::warn!(error = %e, "failed to pause ad set during rollback");
        }
    }
    if let Some(campaign_id) = &created.campaign_id {
        let payload = envelope(req, json!({ "campaignId": campaign_id, "status": "PAUSED" }));
        if let Err(e) = gateway.execute(ToolName::PauseCampaign, payload).await {
            tracing::warn!(error = %e, "failed to pause campaign during rollback");
        }
    }
}

/// 模型没有给最终回复时从已建实体合成结束消息
fn synthesize_message(
    complete: bool,
    created: &CreatedEntityIds,
    blocking: &Option<BlockingError>,
) -> String {
    if let Some(err) = blocking {
        return format!("{}: {}", err.title, err.message);
    }
    let mut parts = Vec::new();
    if let Some(id) = &created.campaign_id {
        parts.push(format!("campaign {}", id));
    }
    if let Some(id) = &created.ad_set_id {
        parts.push(format!("ad set {}", id));
    }
    if !created.ad_ids.is_empty() {
        parts.push(format!("{} ad(s)", created.ad_ids.len()));
    }
    if parts.is_empty() {
        if complete {
            "Nothing needed to be created.".to_string()
        } else {
            "The run ended before anything was created.".to_string()
        }
    } else if complete {
        format!("Created {}.", parts.join(", "))
    } else {
        format!(
            "Partial result: created {}. The run ended before the remaining steps finished.",
            parts.join(", ")
        )
    }
}
