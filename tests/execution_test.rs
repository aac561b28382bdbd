//! 执行集成测试
//!
//! 用脚本化的 Mock 模型与 Mock Gateway 驱动完整执行循环，验证约束强制、
//! 重试与修正、阻断错误与回滚、事件流终结语义。

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use adpilot::config::ExecutorSection;
use adpilot::core::ExecError;
use adpilot::events::{EventSender, ExecutionEvent};
use adpilot::llm::{MockChatModel, ModelTurn};
use adpilot::platform::{Material, MaterialCategory, MockGateway, RemediationCode, ToolName};
use adpilot::steps::{CreatedEntityIds, FinalStatus, StepKind, StepStatus};
use adpilot::{CommandOrchestrator, ExecutionRequest};

fn request(command: &str) -> ExecutionRequest {
    ExecutionRequest {
        command: command.to_string(),
        account_id: "act_100".to_string(),
        business_id: "biz_100".to_string(),
        tenant_id: "tenant_100".to_string(),
        resume_from_run_id: None,
    }
}

fn build(
    turns: Vec<ModelTurn>,
    script: Vec<Result<Value, String>>,
) -> (CommandOrchestrator, Arc<MockGateway>) {
    let gateway = Arc::new(MockGateway::new(script));
    let model = Arc::new(MockChatModel::new(turns));
    let orchestrator =
        CommandOrchestrator::new(model, gateway.clone(), ExecutorSection::default());
    (orchestrator, gateway)
}

fn drain(mut rx: mpsc::UnboundedReceiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

fn terminal_count(events: &[ExecutionEvent]) -> usize {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                ExecutionEvent::TimelineDone | ExecutionEvent::ExecutionError { .. }
            )
        })
        .count()
}

fn params_of(call: &(ToolName, Value)) -> &Value {
    &call.1["params"]
}

#[tokio::test]
async fn test_happy_path_enforces_command_constraints() {
    let command =
        "Create a leads campaign for Romanian men aged 20-45 with a $15 daily budget and one ad";
    let turns = vec![
        MockChatModel::tool_call(
            "create_campaign",
            json!({ "name": "Leads RO", "objective": "LEADS", "dailyBudgetCents": 1500 }),
        ),
        // 模型臆造了错误的国家和双性别定向，且用了占位 campaignId
        MockChatModel::tool_call(
            "create_adset",
            json!({
                "name": "AdSet RO",
                "campaignId": "{campaignId}",
                "targeting": { "geoLocations": { "countries": ["US"] }, "genders": [1, 2] }
            }),
        ),
        // 创意 URL 是编造的，链接里混了追踪参数
        MockChatModel::tool_call(
            "create_ad",
            json!({
                "name": "Ad 1",
                "adsetId": "{adsetId}",
                "title": "Get leads",
                "body": "Sign up today",
                "imageUrl": "https://made-up.example.com/pic.png",
                "linkUrl": "https://shop.example.com/p?utm_source=fb"
            }),
        ),
    ];
    let script = vec![
        Ok(json!({ "ok": true })),    // preflight
        Ok(json!({ "id": "c1" })),    // create_campaign
        Ok(json!({ "id": "s1" })),    // create_adset
        Ok(json!({ "id": "a1" })),    // create_ad
    ];
    let materials = vec![Material {
        id: "m1".to_string(),
        filename: "hero.jpg".to_string(),
        url: "https://cdn.example.com/m1".to_string(),
        category: MaterialCategory::Image,
    }];

    let (orchestrator, gateway) = build(turns, script);
    let (tx, rx) = mpsc::unbounded_channel();
    let sender: EventSender = tx;
    let cancel = CancellationToken::new();
    let outcome = orchestrator
        .execute(&request(command), &materials, Some(&sender), &cancel)
        .await
        .unwrap();
    drop(sender);

    assert_eq!(outcome.summary.final_status, FinalStatus::Success);
    assert_eq!(outcome.summary.steps_completed, 3);
    assert_eq!(outcome.summary.total_steps, 3);
    assert_eq!(outcome.summary.retries, 0);
    assert_eq!(outcome.created_ids.campaign_id.as_deref(), Some("c1"));
    assert_eq!(outcome.created_ids.ad_set_id.as_deref(), Some("s1"));
    assert_eq!(outcome.created_ids.ad_ids, vec!["a1"]);

    let calls = gateway.calls();
    assert_eq!(calls[0].0, ToolName::PreflightCreateCampaignBundle);
    assert_eq!(calls[1].0, ToolName::CreateCampaign);
    assert_eq!(calls[2].0, ToolName::CreateAdset);
    assert_eq!(calls[3].0, ToolName::CreateAd);

    // 账户范围信封
    assert_eq!(calls[1].1["accountId"], "act_100");

    // 约束强制：指令说的国家/性别/年龄必须生效，模型的臆造被覆盖
    let adset = params_of(&calls[2]);
    assert_eq!(adset["campaignId"], "c1");
    assert_eq!(adset["targeting"]["geoLocations"]["countries"], json!(["RO"]));
    assert_eq!(adset["targeting"]["genders"], json!([1]));
    assert_eq!(adset["targeting"]["ageMin"], 20);
    assert_eq!(adset["targeting"]["ageMax"], 45);
    // 预算从 Campaign 继承
    assert_eq!(adset["dailyBudgetCents"], 1500);

    // 广告修正：占位 id、创意 URL、追踪参数
    let ad = params_of(&calls[3]);
    assert_eq!(ad["adsetId"], "s1");
    assert_eq!(ad["imageUrl"], "https://cdn.example.com/m1");
    assert_eq!(ad["linkUrl"], "https://shop.example.com/p");
    assert_eq!(ad["urlTags"], "utm_source=fb");

    // 事件流：恰好一个终结事件，且在摘要之后
    let events = drain(rx);
    assert_eq!(terminal_count(&events), 1);
    assert!(matches!(events.last(), Some(ExecutionEvent::TimelineDone)));
    assert!(matches!(
        events[events.len() - 2],
        ExecutionEvent::Summary { .. }
    ));
}

#[tokio::test]
async fn test_bid_error_retried_with_derived_bid() {
    let command = "Create a traffic campaign for Germans with a $20 daily budget and one ad";
    let adset_args = json!({ "name": "AdSet DE", "campaignId": "{campaignId}" });
    let turns = vec![
        MockChatModel::tool_call(
            "create_campaign",
            json!({ "name": "Traffic DE", "objective": "TRAFFIC", "dailyBudgetCents": 2000 }),
        ),
        MockChatModel::tool_call("create_adset", adset_args.clone()),
        MockChatModel::tool_call("create_adset", adset_args.clone()),
        MockChatModel::tool_call("create_adset", adset_args),
        MockChatModel::tool_call(
            "create_ad",
            json!({ "name": "Ad 1", "adsetId": "{adsetId}", "title": "T", "body": "B" }),
        ),
    ];
    let script = vec![
        Ok(json!({ "ok": true })),
        Ok(json!({ "id": "c1" })),
        Err("Bid amount is required for this optimization goal".to_string()),
        Err("(#17) User request limit reached: too many calls".to_string()),
        Ok(json!({ "id": "s1" })),
        Ok(json!({ "id": "a1" })),
    ];

    let (orchestrator, gateway) = build(turns, script);
    let cancel = CancellationToken::new();
    let outcome = orchestrator
        .execute(&request(command), &[], None, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.summary.final_status, FinalStatus::Success);
    assert_eq!(outcome.summary.retries, 2);

    let adset_step = outcome
        .steps
        .iter()
        .find(|s| s.kind == StepKind::Adset)
        .unwrap();
    assert_eq!(adset_step.status, StepStatus::Success);
    assert_eq!(adset_step.attempts, 3);
    assert!(adset_step
        .fixes_applied
        .iter()
        .any(|f| f.to_lowercase().contains("bid")));

    // 出价错误之后的重试带上推导出的出价（2000 / 10）
    let calls = gateway.calls();
    let adset_payloads: Vec<Value> = calls
        .iter()
        .filter(|c| c.0 == ToolName::CreateAdset)
        .map(|c| c.1["params"].clone())
        .collect();
    assert_eq!(adset_payloads.len(), 3);
    assert!(adset_payloads[0].get("bidAmountCents").is_none());
    assert_eq!(adset_payloads[1]["bidAmountCents"], 200);
    assert_eq!(adset_payloads[2]["bidAmountCents"], 200);
}

#[tokio::test]
async fn test_billing_error_during_ad_pauses_created_entities() {
    let command = "Create a sales campaign for French women with a $10 daily budget and one ad";
    let turns = vec![
        MockChatModel::tool_call(
            "create_campaign",
            json!({ "name": "Sales FR", "objective": "SALES", "dailyBudgetCents": 1000 }),
        ),
        MockChatModel::tool_call(
            "create_adset",
            json!({ "name": "AdSet FR", "campaignId": "{campaignId}" }),
        ),
        MockChatModel::tool_call(
            "create_ad",
            json!({ "name": "Ad 1", "adsetId": "{adsetId}", "title": "T", "body": "B" }),
        ),
    ];
    let script = vec![
        Ok(json!({ "ok": true })),
        Ok(json!({ "id": "c1" })),
        Ok(json!({ "id": "s1" })),
        Err("There is no valid payment method on this ad account".to_string()),
        Ok(json!({})), // pause_adset
        Ok(json!({})), // pause_campaign
    ];

    let (orchestrator, gateway) = build(turns, script);
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let outcome = orchestrator
        .execute(&request(command), &[], Some(&tx), &cancel)
        .await
        .unwrap();
    drop(tx);

    assert_eq!(outcome.summary.final_status, FinalStatus::Partial);
    let blocking = outcome.blocking_error.unwrap();
    assert_eq!(blocking.code, Some(RemediationCode::PaymentMethodRequired));
    assert!(!blocking.next_steps.is_empty());

    // 已建实体保留在结果里，但广告没有 id
    assert_eq!(outcome.created_ids.campaign_id.as_deref(), Some("c1"));
    assert_eq!(outcome.created_ids.ad_set_id.as_deref(), Some("s1"));
    assert!(outcome.created_ids.ad_ids.is_empty());

    let ad_step = outcome.steps.iter().find(|s| s.kind == StepKind::Ad).unwrap();
    assert_eq!(ad_step.status, StepStatus::Error);

    // 回滚：暂停而不是删除
    let ops: Vec<ToolName> = gateway.calls().iter().map(|c| c.0).collect();
    assert!(ops.contains(&ToolName::PauseAdset));
    assert!(ops.contains(&ToolName::PauseCampaign));

    // 阻断终结：恰好一个终结事件且是 execution_error
    let events = drain(rx);
    assert_eq!(terminal_count(&events), 1);
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::ExecutionError { .. })
    ));
}

#[tokio::test]
async fn test_hallucinated_gender_stripped_when_command_is_silent() {
    let command = "Create a campaign in France with a $5 daily budget and one ad";
    let turns = vec![
        MockChatModel::tool_call(
            "create_campaign",
            json!({ "name": "FR", "objective": "TRAFFIC", "dailyBudgetCents": 500 }),
        ),
        // 指令没提性别，模型却只投女性
        MockChatModel::tool_call(
            "create_adset",
            json!({ "name": "AdSet", "campaignId": "{campaignId}", "targeting": { "genders": [2] } }),
        ),
        MockChatModel::tool_call(
            "create_ad",
            json!({ "name": "Ad 1", "adsetId": "{adsetId}", "title": "T", "body": "B" }),
        ),
    ];
    let script = vec![
        Ok(json!({ "ok": true })),
        Ok(json!({ "id": "c1" })),
        Ok(json!({ "id": "s1" })),
        Ok(json!({ "id": "a1" })),
    ];

    let (orchestrator, gateway) = build(turns, script);
    let cancel = CancellationToken::new();
    let outcome = orchestrator
        .execute(&request(command), &[], None, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.summary.final_status, FinalStatus::Success);
    let calls = gateway.calls();
    let adset = calls
        .iter()
        .find(|c| c.0 == ToolName::CreateAdset)
        .map(params_of)
        .unwrap();
    assert!(adset["targeting"].get("genders").is_none());
    assert_eq!(adset["targeting"]["geoLocations"]["countries"], json!(["FR"]));
}

#[tokio::test]
async fn test_unknown_tool_fed_back_without_reaching_gateway() {
    let turns = vec![
        MockChatModel::tool_call("delete_account", json!({})),
        ModelTurn::Message("I cannot do that.".to_string()),
    ];
    let (orchestrator, gateway) = build(turns, vec![]);
    let cancel = CancellationToken::new();
    let outcome = orchestrator
        .execute(&request("delete my account"), &[], None, &cancel)
        .await
        .unwrap();

    assert!(gateway.calls().is_empty());
    assert!(outcome.steps.is_empty());
    assert_eq!(outcome.summary.total_steps, 0);
    assert_eq!(outcome.summary.final_status, FinalStatus::Success);
    assert_eq!(outcome.message, "I cannot do that.");
}

#[tokio::test]
async fn test_preflight_failure_blocks_with_zero_creation() {
    let turns = vec![MockChatModel::tool_call(
        "create_campaign",
        json!({ "name": "C", "objective": "LEADS" }),
    )];
    let script = vec![Err(
        r#"{"code": "DSA_REQUIRED", "message": "Beneficiary information is missing"}"#.to_string(),
    )];

    let (orchestrator, gateway) = build(turns, script);
    let cancel = CancellationToken::new();
    let outcome = orchestrator
        .execute(&request("create a campaign"), &[], None, &cancel)
        .await
        .unwrap();

    let blocking = outcome.blocking_error.unwrap();
    assert_eq!(blocking.code, Some(RemediationCode::DsaRequired));
    assert!(outcome.created_ids.is_empty());
    assert_eq!(outcome.summary.final_status, FinalStatus::Error);
    // 预检失败后绝不调用 create_campaign
    assert_eq!(gateway.calls().len(), 1);
    assert_eq!(gateway.calls()[0].0, ToolName::PreflightCreateCampaignBundle);
}

#[tokio::test]
async fn test_cancellation_aborts_before_model_call() {
    let turns = vec![MockChatModel::tool_call(
        "create_campaign",
        json!({ "name": "C", "objective": "LEADS" }),
    )];
    let (orchestrator, gateway) = build(turns, vec![]);
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator
        .execute(&request("create a campaign"), &[], Some(&tx), &cancel)
        .await
        .unwrap_err();
    drop(tx);

    assert!(matches!(err, ExecError::Cancelled));
    assert!(gateway.calls().is_empty());
    let events = drain(rx);
    assert_eq!(terminal_count(&events), 1);
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::ExecutionError { .. })
    ));
}

#[tokio::test]
async fn test_exhausted_retries_end_the_run_partially() {
    let command = "Create a traffic campaign with a $20 daily budget and one ad";
    let adset_args = json!({ "name": "AdSet", "campaignId": "{campaignId}" });
    let turns = vec![
        MockChatModel::tool_call(
            "create_campaign",
            json!({ "name": "C", "objective": "TRAFFIC", "dailyBudgetCents": 2000 }),
        ),
        MockChatModel::tool_call("create_adset", adset_args.clone()),
        MockChatModel::tool_call("create_adset", adset_args.clone()),
        MockChatModel::tool_call("create_adset", adset_args),
    ];
    let script = vec![
        Ok(json!({ "ok": true })),
        Ok(json!({ "id": "c1" })),
        Err("(#100) Invalid parameter: optimizationGoal".to_string()),
        Err("(#100) Invalid parameter: optimizationGoal".to_string()),
        Err("(#100) Invalid parameter: optimizationGoal".to_string()),
    ];

    let (orchestrator, _gateway) = build(turns, script);
    let cancel = CancellationToken::new();
    let outcome = orchestrator
        .execute(&request(command), &[], None, &cancel)
        .await
        .unwrap();

    // 非阻断错误重试耗尽：整次执行结束，保留部分进展，无阻断错误
    assert!(outcome.blocking_error.is_none());
    assert_eq!(outcome.summary.final_status, FinalStatus::Partial);
    let adset_step = outcome
        .steps
        .iter()
        .find(|s| s.kind == StepKind::Adset)
        .unwrap();
    assert_eq!(adset_step.status, StepStatus::Error);
    assert_eq!(adset_step.attempts, 3);
    assert_eq!(outcome.summary.retries, 2);
}

#[tokio::test]
async fn test_runaway_model_stops_at_iteration_ceiling() {
    let cfg = ExecutorSection::default();
    // 模型永远只读不建：每轮一个 get_campaigns，远超轮数上限
    let turns: Vec<ModelTurn> = (0..cfg.max_iterations * 2)
        .map(|_| MockChatModel::tool_call("get_campaigns", json!({})))
        .collect();
    let script: Vec<Result<Value, String>> = (0..cfg.max_iterations)
        .map(|_| Ok(json!([])))
        .collect();

    let (orchestrator, gateway) = build(turns, script);
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let outcome = orchestrator
        .execute(&request("list my campaigns forever"), &[], Some(&tx), &cancel)
        .await
        .unwrap();
    drop(tx);

    // 硬停：不是 Err，也没有阻断错误，调用数正好等于轮数上限
    assert!(outcome.blocking_error.is_none());
    assert!(outcome.steps.is_empty());
    assert_eq!(gateway.calls().len(), cfg.max_iterations);
    assert!(gateway.calls().iter().all(|c| c.0 == ToolName::GetCampaigns));
    assert_eq!(outcome.message, "The run ended before anything was created.");

    // 事件流照常终结
    let events = drain(rx);
    assert_eq!(terminal_count(&events), 1);
    assert!(matches!(events.last(), Some(ExecutionEvent::TimelineDone)));
}

#[tokio::test]
async fn test_resumed_run_never_recreates_existing_entities() {
    let command = "Create a leads campaign with a $10 daily budget and one ad";
    // 模型无视续跑提示仍然先试图重建 Campaign，必须被幂等跳过
    let turns = vec![
        MockChatModel::tool_call(
            "create_campaign",
            json!({ "name": "C", "objective": "LEADS", "dailyBudgetCents": 1000 }),
        ),
        MockChatModel::tool_call(
            "create_adset",
            json!({ "name": "AdSet", "campaignId": "{campaignId}" }),
        ),
        MockChatModel::tool_call(
            "create_ad",
            json!({ "name": "Ad 1", "adsetId": "{adsetId}", "title": "T", "body": "B" }),
        ),
    ];
    let script = vec![Ok(json!({ "id": "s1" })), Ok(json!({ "id": "a1" }))];
    let prior = CreatedEntityIds {
        campaign_id: Some("c1".to_string()),
        ..Default::default()
    };

    let (orchestrator, gateway) = build(turns, script);
    let cancel = CancellationToken::new();
    let outcome = orchestrator
        .execute_resuming(&request(command), &[], prior, None, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.summary.final_status, FinalStatus::Success);
    assert_eq!(outcome.created_ids.campaign_id.as_deref(), Some("c1"));
    assert_eq!(outcome.created_ids.ad_set_id.as_deref(), Some("s1"));
    assert_eq!(outcome.created_ids.ad_ids, vec!["a1"]);
    assert_eq!(outcome.steps.len(), 3);
    let campaign_step = outcome
        .steps
        .iter()
        .find(|s| s.kind == StepKind::Campaign)
        .unwrap();
    assert_eq!(campaign_step.status, StepStatus::Success);
    assert_eq!(campaign_step.summary, "Created in a previous run");

    // 既无预检也无 create_campaign：已有实体绝不重建
    let ops: Vec<ToolName> = gateway.calls().iter().map(|c| c.0).collect();
    assert_eq!(ops, vec![ToolName::CreateAdset, ToolName::CreateAd]);

    // 新建的 AdSet 挂在上次的 Campaign 下
    let adset = gateway
        .calls()
        .into_iter()
        .find(|c| c.0 == ToolName::CreateAdset)
        .unwrap();
    assert_eq!(adset.1["params"]["campaignId"], "c1");
}

#[tokio::test]
async fn test_two_ads_use_assigned_materials() {
    let command = "Create a leads campaign with a $10 daily budget and two ads";
    let turns = vec![
        MockChatModel::tool_call(
            "create_campaign",
            json!({ "name": "C", "objective": "LEADS", "dailyBudgetCents": 1000 }),
        ),
        MockChatModel::tool_call(
            "create_adset",
            json!({ "name": "AdSet", "campaignId": "{campaignId}" }),
        ),
        MockChatModel::tool_call(
            "create_ad",
            json!({ "name": "Ad 1", "adsetId": "{adsetId}", "title": "T", "body": "B" }),
        ),
        MockChatModel::tool_call(
            "create_ad",
            json!({ "name": "Ad 2", "adsetId": "{adsetId}", "title": "T", "body": "B" }),
        ),
    ];
    let script = vec![
        Ok(json!({ "ok": true })),
        Ok(json!({ "id": "c1" })),
        Ok(json!({ "id": "s1" })),
        Ok(json!({ "id": "a1" })),
        Ok(json!({ "id": "a2" })),
    ];
    let materials = vec![
        Material {
            id: "m1".to_string(),
            filename: "first.jpg".to_string(),
            url: "https://cdn.example.com/m1".to_string(),
            category: MaterialCategory::Image,
        },
        Material {
            id: "m2".to_string(),
            filename: "second.mp4".to_string(),
            url: "https://cdn.example.com/m2".to_string(),
            category: MaterialCategory::Video,
        },
    ];

    let (orchestrator, gateway) = build(turns, script);
    let cancel = CancellationToken::new();
    let outcome = orchestrator
        .execute(&request(command), &materials, None, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.summary.final_status, FinalStatus::Success);
    assert_eq!(outcome.created_ids.ad_ids, vec!["a1", "a2"]);
    assert_eq!(outcome.steps.len(), 4); // campaign + adset + 两个 ad 步骤

    let calls = gateway.calls();
    let ad_payloads: Vec<Value> = calls
        .iter()
        .filter(|c| c.0 == ToolName::CreateAd)
        .map(|c| c.1["params"].clone())
        .collect();
    assert_eq!(ad_payloads.len(), 2);
    assert_eq!(ad_payloads[0]["imageUrl"], "https://cdn.example.com/m1");
    assert_eq!(ad_payloads[1]["videoUrl"], "https://cdn.example.com/m2");
}
