//! 平台工具词表
//!
//! 暴露给模型的封闭工具集合（名称 + 参数 JSON Schema），以及模型自由形态参数的
//! 校验中间结构：按工具名打标签的变体，未知形态在到达 Gateway 之前被拒绝或修补。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::traits::ToolSpec;
use crate::steps::StepKind;

/// Gateway 可执行的命名操作（含模型不可见的预检与回滚操作）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolName {
    GetCampaigns,
    CreateCampaign,
    CreateAdset,
    CreateAd,
    UpdateCampaign,
    DuplicateCampaign,
    DuplicateAdset,
    DuplicateAd,
    /// 同步合规预检，create_campaign 前调用；模型不可见
    PreflightCreateCampaignBundle,
    /// 回滚用：暂停（绝不删除）；模型不可见
    PauseCampaign,
    PauseAdset,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::GetCampaigns => "get_campaigns",
            ToolName::CreateCampaign => "create_campaign",
            ToolName::CreateAdset => "create_adset",
            ToolName::CreateAd => "create_ad",
            ToolName::UpdateCampaign => "update_campaign",
            ToolName::DuplicateCampaign => "duplicate_campaign",
            ToolName::DuplicateAdset => "duplicate_adset",
            ToolName::DuplicateAd => "duplicate_ad",
            ToolName::PreflightCreateCampaignBundle => "preflight_create_campaign_bundle",
            ToolName::PauseCampaign => "pause_campaign",
            ToolName::PauseAdset => "pause_adset",
        }
    }

    /// 该操作作用于哪个逻辑步骤；读操作与内部操作无步骤
    pub fn step_kind(&self) -> Option<StepKind> {
        match self {
            ToolName::CreateCampaign | ToolName::UpdateCampaign | ToolName::DuplicateCampaign => {
                Some(StepKind::Campaign)
            }
            ToolName::CreateAdset | ToolName::DuplicateAdset => Some(StepKind::Adset),
            ToolName::CreateAd | ToolName::DuplicateAd => Some(StepKind::Ad),
            _ => None,
        }
    }
}

/// 定向 payload（AdSet 上的 targeting 字段）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Targeting {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_locations: Option<GeoLocations>,
    /// 平台编码：1 = 男，2 = 女；None = 不限
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genders: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_min: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_max: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locales: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<Interest>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeoLocations {
    pub countries: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Interest {
    pub name: String,
}

/// create_campaign 参数
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CampaignDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 平台目标：LEADS / TRAFFIC / SALES 等
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// 日预算（最小货币单位，如美分）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_budget_cents: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub special_ad_categories: Vec<String>,
}

/// create_adset 参数
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdsetDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 父 Campaign id；模型在 Campaign 创建前不可能知道，允许占位符
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_budget_cents: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid_amount_cents: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization_goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_event: Option<String>,
    pub targeting: Targeting,
    /// Advantage Audience 开关；模型可能给 bool / 0,1 / 对象，统一归一化
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advantage_audience: Option<Value>,
}

/// create_ad 参数
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
    /// 链接追踪参数（utm 等），与 link_url 分开传
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_tags: Option<String>,
}

/// 按工具名打标签的已校验调用（模型的自由形态参数在此处收口）
#[derive(Clone, Debug)]
pub enum ParsedToolCall {
    GetCampaigns { limit: Option<u32> },
    CreateCampaign(CampaignDraft),
    CreateAdset(AdsetDraft),
    CreateAd(AdDraft),
    UpdateCampaign { campaign_id: Option<String>, fields: Value },
    DuplicateCampaign { campaign_id: Option<String>, name: Option<String> },
    DuplicateAdset { adset_id: Option<String>, campaign_id: Option<String> },
    DuplicateAd { ad_id: Option<String>, adset_id: Option<String> },
}

impl ParsedToolCall {
    /// 校验模型的自由形态参数：未知工具或无法成形的参数返回 Err，
    /// 可容忍的缺失字段留给编排器的修正逻辑补齐
    pub fn parse(name: &str, args: &Value) -> Result<ParsedToolCall, String> {
        let args = if args.is_object() {
            args.clone()
        } else {
            json!({})
        };
        match name {
            "get_campaigns" => Ok(ParsedToolCall::GetCampaigns {
                limit: args.get("limit").and_then(Value::as_u64).map(|v| v as u32),
            }),
            "create_campaign" => serde_json::from_value(args)
                .map(ParsedToolCall::CreateCampaign)
                .map_err(|e| format!("create_campaign arguments: {e}")),
            "create_adset" => serde_json::from_value(args)
                .map(ParsedToolCall::CreateAdset)
                .map_err(|e| format!("create_adset arguments: {e}")),
            "create_ad" => serde_json::from_value(args)
                .map(ParsedToolCall::CreateAd)
                .map_err(|e| format!("create_ad arguments: {e}")),
            "update_campaign" => Ok(ParsedToolCall::UpdateCampaign {
                campaign_id: string_field(&args, "campaignId"),
                fields: args.get("fields").cloned().unwrap_or_else(|| json!({})),
            }),
            "duplicate_campaign" => Ok(ParsedToolCall::DuplicateCampaign {
                campaign_id: string_field(&args, "campaignId"),
                name: string_field(&args, "name"),
            }),
            "duplicate_adset" => Ok(ParsedToolCall::DuplicateAdset {
                adset_id: string_field(&args, "adsetId"),
                campaign_id: string_field(&args, "campaignId"),
            }),
            "duplicate_ad" => Ok(ParsedToolCall::DuplicateAd {
                ad_id: string_field(&args, "adId"),
                adset_id: string_field(&args, "adsetId"),
            }),
            other => Err(format!("Unknown tool: {other}")),
        }
    }

    /// 对应的 Gateway 操作名
    pub fn tool_name(&self) -> ToolName {
        match self {
            ParsedToolCall::GetCampaigns { .. } => ToolName::GetCampaigns,
            ParsedToolCall::CreateCampaign(_) => ToolName::CreateCampaign,
            ParsedToolCall::CreateAdset(_) => ToolName::CreateAdset,
            ParsedToolCall::CreateAd(_) => ToolName::CreateAd,
            ParsedToolCall::UpdateCampaign { .. } => ToolName::UpdateCampaign,
            ParsedToolCall::DuplicateCampaign { .. } => ToolName::DuplicateCampaign,
            ParsedToolCall::DuplicateAdset { .. } => ToolName::DuplicateAdset,
            ParsedToolCall::DuplicateAd { .. } => ToolName::DuplicateAd,
        }
    }

    /// 序列化为 Gateway payload
    pub fn to_payload(&self) -> Value {
        match self {
            ParsedToolCall::GetCampaigns { limit } => json!({ "limit": limit }),
            ParsedToolCall::CreateCampaign(d) => serde_json::to_value(d).unwrap_or_default(),
            ParsedToolCall::CreateAdset(d) => serde_json::to_value(d).unwrap_or_default(),
            ParsedToolCall::CreateAd(d) => serde_json::to_value(d).unwrap_or_default(),
            ParsedToolCall::UpdateCampaign { campaign_id, fields } => {
                json!({ "campaignId": campaign_id, "fields": fields })
            }
            ParsedToolCall::DuplicateCampaign { campaign_id, name } => {
                json!({ "campaignId": campaign_id, "name": name })
            }
            ParsedToolCall::DuplicateAdset { adset_id, campaign_id } => {
                json!({ "adsetId": adset_id, "campaignId": campaign_id })
            }
            ParsedToolCall::DuplicateAd { ad_id, adset_id } => {
                json!({ "adId": ad_id, "adsetId": adset_id })
            }
        }
    }
}

fn string_field(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

/// 暴露给模型的工具定义（封闭词表；预检与暂停操作不在其中）
pub fn tool_specs() -> Vec<ToolSpec> {
    let targeting_schema = json!({
        "type": "object",
        "properties": {
            "geoLocations": {
                "type": "object",
                "properties": {
                    "countries": { "type": "array", "items": { "type": "string" } }
                }
            },
            "genders": { "type": "array", "items": { "type": "integer", "enum": [1, 2] } },
            "ageMin": { "type": "integer" },
            "ageMax": { "type": "integer" },
            "locales": { "type": "array", "items": { "type": "string" } },
            "interests": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": { "name": { "type": "string" } }
                }
            }
        }
    });

    vec![
        ToolSpec {
            name: "get_campaigns",
            description: "List existing campaigns in the ad account.",
            parameters: json!({
                "type": "object",
                "properties": { "limit": { "type": "integer" } },
                "required": []
            }),
        },
        ToolSpec {
            name: "create_campaign",
            description: "Create a new campaign. Must be called before creating ad sets or ads.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "objective": { "type": "string", "description": "LEADS, TRAFFIC, SALES, AWARENESS or ENGAGEMENT" },
                    "status": { "type": "string", "enum": ["ACTIVE", "PAUSED"] },
                    "dailyBudgetCents": { "type": "integer", "description": "Daily budget in minor currency units (cents)" },
                    "specialAdCategories": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["name", "objective"]
            }),
        },
        ToolSpec {
            name: "create_adset",
            description: "Create an ad set inside a campaign with budget and targeting.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "campaignId": { "type": "string", "description": "Exact id returned by create_campaign" },
                    "dailyBudgetCents": { "type": "integer" },
                    "bidAmountCents": { "type": "integer" },
                    "optimizationGoal": { "type": "string" },
                    "billingEvent": { "type": "string" },
                    "targeting": targeting_schema,
                    "advantageAudience": { "description": "Whether Advantage Audience is enabled (true/false)" }
                },
                "required": ["name", "campaignId"]
            }),
        },
        ToolSpec {
            name: "create_ad",
            description: "Create an ad inside an ad set with creative material.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "adsetId": { "type": "string", "description": "Exact id returned by create_adset" },
                    "title": { "type": "string" },
                    "body": { "type": "string" },
                    "imageUrl": { "type": "string" },
                    "videoUrl": { "type": "string" },
                    "linkUrl": { "type": "string" },
                    "urlTags": { "type": "string" }
                },
                "required": ["name", "adsetId"]
            }),
        },
        ToolSpec {
            name: "update_campaign",
            description: "Update fields of an existing campaign.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "campaignId": { "type": "string" },
                    "fields": { "type": "object" }
                },
                "required": ["campaignId", "fields"]
            }),
        },
        ToolSpec {
            name: "duplicate_campaign",
            description: "Duplicate an existing campaign with its ad sets and ads.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "campaignId": { "type": "string" },
                    "name": { "type": "string" }
                },
                "required": ["campaignId"]
            }),
        },
        ToolSpec {
            name: "duplicate_adset",
            description: "Duplicate an existing ad set, optionally into another campaign.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "adsetId": { "type": "string" },
                    "campaignId": { "type": "string" }
                },
                "required": ["adsetId"]
            }),
        },
        ToolSpec {
            name: "duplicate_ad",
            description: "Duplicate an existing ad, optionally into another ad set.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "adId": { "type": "string" },
                    "adsetId": { "type": "string" }
                },
                "required": ["adId"]
            }),
        },
    ]
}
