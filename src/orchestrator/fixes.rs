//! 调用前的确定性修正
//!
//! Gateway 调用前对模型给出的参数做实体专属修补：占位 id 解析、预算继承、
//! 出价推导、Advantage Audience 归一化、追踪参数拆分、创意 URL 解析到已上传
//! 素材、标题/文案兜底。每项修正都返回一条可读说明，附着到步骤上供观察。

use regex::Regex;
use serde_json::Value;

use crate::platform::materials::{is_uploaded_url, Material, MaterialAssignment};
use crate::platform::tools::{AdDraft, AdsetDraft, CampaignDraft};
use crate::steps::CreatedEntityIds;

/// 模型在父实体创建前可能写出的占位 id（"{campaignId}"、"CAMPAIGN_ID"、"<id>" 等）。
/// 平台 id 是纯数字串；其余一律按占位符处理。
fn is_placeholder_id(id: &str) -> bool {
    let trimmed = id.trim();
    trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit())
}

/// 指令中显式给出的日预算（"$15/day"、"$15 daily budget"）换算为美分
pub fn budget_cents_from_command(command: &str) -> Option<u64> {
    let re = Regex::new(
        r"(?i)\$\s*(\d+(?:\.\d{1,2})?)\s*(?:/day|per day|daily|a day|/ day)",
    )
    .ok()?;
    let caps = re.captures(command)?;
    let dollars: f64 = caps[1].parse().ok()?;
    Some((dollars * 100.0).round() as u64)
}

/// create_campaign 修正：指令预算覆盖缺失预算，状态兜底 PAUSED
pub fn fix_campaign(draft: &mut CampaignDraft, command: &str) -> Vec<String> {
    let mut fixes = Vec::new();

    if draft.daily_budget_cents.is_none() {
        if let Some(cents) = budget_cents_from_command(command) {
            draft.daily_budget_cents = Some(cents);
            fixes.push(format!(
                "Set campaign daily budget to {} cents from the command",
                cents
            ));
        }
    }

    if draft.status.is_none() {
        draft.status = Some("PAUSED".to_string());
        fixes.push("Created the campaign paused so nothing spends before review".to_string());
    }

    fixes
}

/// create_adset 修正：占位 campaignId 解析、预算继承、出价推导、Advantage Audience 归一化
pub fn fix_adset(
    draft: &mut AdsetDraft,
    created: &CreatedEntityIds,
    campaign_budget_cents: Option<u64>,
    bid_required: bool,
    advantage_required: bool,
) -> Vec<String> {
    let mut fixes = Vec::new();

    let needs_resolve = draft
        .campaign_id
        .as_deref()
        .map(is_placeholder_id)
        .unwrap_or(true);
    if needs_resolve {
        if let Some(id) = &created.campaign_id {
            draft.campaign_id = Some(id.clone());
            fixes.push(format!(
                "Resolved the campaign id placeholder to the created campaign {}",
                id
            ));
        }
    }

    if draft.daily_budget_cents.is_none() {
        if let Some(budget) = campaign_budget_cents {
            draft.daily_budget_cents = Some(budget);
            fixes.push(format!(
                "Inherited the daily budget of {} cents from the parent campaign",
                budget
            ));
        }
    }

    // 只有平台此前拒绝过缺失出价时才推导，避免无谓覆盖平台默认值
    if bid_required && draft.bid_amount_cents.is_none() {
        if let Some(budget) = draft.daily_budget_cents {
            let bid = (budget / 10).max(100);
            draft.bid_amount_cents = Some(bid);
            fixes.push(format!(
                "Derived a bid of {} cents from the daily budget after the platform required one",
                bid
            ));
        }
    }

    if let Some(fix) = normalize_advantage_audience(draft, advantage_required) {
        fixes.push(fix);
    }

    fixes
}

/// Advantage Audience 字段归一化：bool / 0,1 / "true" / {enabled: ...} 统一为 bool；
/// 平台要求显式设置而模型未给时默认关闭
fn normalize_advantage_audience(draft: &mut AdsetDraft, required: bool) -> Option<String> {
    match draft.advantage_audience.take() {
        Some(Value::Bool(b)) => {
            draft.advantage_audience = Some(Value::Bool(b));
            None
        }
        Some(Value::Number(n)) => {
            let b = n.as_i64() == Some(1);
            draft.advantage_audience = Some(Value::Bool(b));
            Some("Normalized the advantage audience flag to a boolean".to_string())
        }
        Some(Value::String(s)) => {
            let b = s.eq_ignore_ascii_case("true") || s == "1";
            draft.advantage_audience = Some(Value::Bool(b));
            Some("Normalized the advantage audience flag to a boolean".to_string())
        }
        Some(Value::Object(map)) => {
            let b = map
                .get("enabled")
                .or_else(|| map.get("advantageAudience"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            draft.advantage_audience = Some(Value::Bool(b));
            Some("Normalized the advantage audience flag to a boolean".to_string())
        }
        Some(other) => {
            draft.advantage_audience = Some(Value::Bool(false));
            Some(format!(
                "Replaced an unusable advantage audience value ({}) with false",
                other
            ))
        }
        None => {
            if required {
                draft.advantage_audience = Some(Value::Bool(false));
                Some(
                    "Set the advantage audience flag explicitly to false after the platform required it"
                        .to_string(),
                )
            } else {
                None
            }
        }
    }
}

/// create_ad 修正：占位 adsetId 解析、追踪参数拆分、创意 URL 解析、名称与文案兜底
pub fn fix_ad(
    draft: &mut AdDraft,
    created: &CreatedEntityIds,
    materials: &[Material],
    assignment: Option<&MaterialAssignment>,
    ad_index: usize,
) -> Vec<String> {
    let mut fixes = Vec::new();

    let needs_resolve = draft
        .adset_id
        .as_deref()
        .map(is_placeholder_id)
        .unwrap_or(true);
    if needs_resolve {
        if let Some(id) = &created.ad_set_id {
            draft.adset_id = Some(id.clone());
            fixes.push(format!(
                "Resolved the ad set id placeholder to the created ad set {}",
                id
            ));
        }
    }

    // 合并在链接里的追踪参数拆出来单独传
    if draft.url_tags.is_none() {
        if let Some(link) = &draft.link_url {
            if let Some((base, query)) = link.split_once('?') {
                if !query.is_empty() {
                    draft.url_tags = Some(query.to_string());
                    draft.link_url = Some(base.to_string());
                    fixes.push(
                        "Moved the tracking parameters out of the link URL into urlTags"
                            .to_string(),
                    );
                }
            }
        }
    }

    // 平台只接受已上传素材的 URL；模型编的地址换成分配好的素材
    let image_ok = draft
        .image_url
        .as_deref()
        .map(|u| is_uploaded_url(materials, u))
        .unwrap_or(false);
    let video_ok = draft
        .video_url
        .as_deref()
        .map(|u| is_uploaded_url(materials, u))
        .unwrap_or(false);
    if !image_ok && !video_ok {
        if let Some(a) = assignment {
            if a.filename.to_lowercase().ends_with(".mp4") {
                draft.video_url = Some(a.url.clone());
                draft.image_url = None;
            } else {
                draft.image_url = Some(a.url.clone());
                draft.video_url = None;
            }
            fixes.push(format!(
                "Replaced the creative URL with the uploaded material {} ({})",
                a.filename, a.url
            ));
        }
    }

    if draft.name.as_deref().map(str::trim).unwrap_or("").is_empty() {
        draft.name = Some(format!("Ad {}", ad_index));
        fixes.push(format!("Named the ad \"Ad {}\"", ad_index));
    }
    if draft.title.as_deref().map(str::trim).unwrap_or("").is_empty() {
        draft.title = draft.name.clone();
        fixes.push("Filled the missing ad title from the ad name".to_string());
    }
    if draft.body.as_deref().map(str::trim).unwrap_or("").is_empty() {
        draft.body = Some("Learn more".to_string());
        fixes.push("Filled the missing ad body with a safe default".to_string());
    }

    fixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::materials::MaterialCategory;
    use crate::steps::StepKind;

    fn created() -> CreatedEntityIds {
        let mut ids = CreatedEntityIds::default();
        ids.record(StepKind::Campaign, "120001");
        ids.record(StepKind::Adset, "120002");
        ids
    }

    #[test]
    fn test_budget_from_command() {
        assert_eq!(
            budget_cents_from_command("leads campaign with $15 daily budget"),
            Some(1500)
        );
        assert_eq!(budget_cents_from_command("with $7.50/day"), Some(750));
        assert_eq!(budget_cents_from_command("no budget here"), None);
    }

    #[test]
    fn test_placeholder_campaign_id_resolved() {
        let mut d = AdsetDraft {
            campaign_id: Some("{campaignId}".into()),
            ..AdsetDraft::default()
        };
        let fixes = fix_adset(&mut d, &created(), None, false, false);
        assert_eq!(d.campaign_id.as_deref(), Some("120001"));
        assert_eq!(fixes.len(), 1);
    }

    #[test]
    fn test_real_id_not_touched() {
        let mut d = AdsetDraft {
            campaign_id: Some("999888".into()),
            ..AdsetDraft::default()
        };
        let fixes = fix_adset(&mut d, &created(), None, false, false);
        assert_eq!(d.campaign_id.as_deref(), Some("999888"));
        assert!(fixes.is_empty());
    }

    #[test]
    fn test_budget_inherited_from_campaign() {
        let mut d = AdsetDraft {
            campaign_id: Some("120001".into()),
            ..AdsetDraft::default()
        };
        let fixes = fix_adset(&mut d, &created(), Some(1500), false, false);
        assert_eq!(d.daily_budget_cents, Some(1500));
        assert!(fixes.iter().any(|f| f.contains("Inherited")));
    }

    #[test]
    fn test_bid_derived_only_when_required() {
        let mut d = AdsetDraft {
            campaign_id: Some("120001".into()),
            daily_budget_cents: Some(1500),
            ..AdsetDraft::default()
        };
        assert!(fix_adset(&mut d, &created(), None, false, false).is_empty());
        assert_eq!(d.bid_amount_cents, None);

        let fixes = fix_adset(&mut d, &created(), None, true, false);
        assert_eq!(d.bid_amount_cents, Some(150));
        assert!(fixes.iter().any(|f| f.contains("bid")));
    }

    #[test]
    fn test_advantage_audience_normalized() {
        let mut d = AdsetDraft {
            campaign_id: Some("120001".into()),
            advantage_audience: Some(serde_json::json!(1)),
            ..AdsetDraft::default()
        };
        fix_adset(&mut d, &created(), None, false, false);
        assert_eq!(d.advantage_audience, Some(Value::Bool(true)));
    }

    #[test]
    fn test_advantage_audience_defaulted_when_required() {
        let mut d = AdsetDraft {
            campaign_id: Some("120001".into()),
            ..AdsetDraft::default()
        };
        fix_adset(&mut d, &created(), None, false, true);
        assert_eq!(d.advantage_audience, Some(Value::Bool(false)));
    }

    #[test]
    fn test_url_tags_split() {
        let mut d = AdDraft {
            adset_id: Some("120002".into()),
            name: Some("Ad 1".into()),
            title: Some("T".into()),
            body: Some("B".into()),
            link_url: Some("https://shop.example.com/p?utm_source=fb&utm_medium=paid".into()),
            ..AdDraft::default()
        };
        let fixes = fix_ad(&mut d, &created(), &[], None, 1);
        assert_eq!(d.link_url.as_deref(), Some("https://shop.example.com/p"));
        assert_eq!(d.url_tags.as_deref(), Some("utm_source=fb&utm_medium=paid"));
        assert!(fixes.iter().any(|f| f.contains("urlTags")));
    }

    #[test]
    fn test_unreachable_creative_replaced() {
        let materials = vec![Material {
            id: "m1".into(),
            filename: "hero.jpg".into(),
            url: "https://cdn.example.com/m1".into(),
            category: MaterialCategory::Image,
        }];
        let assignment = MaterialAssignment {
            ad_index: 1,
            material_id: "m1".into(),
            filename: "hero.jpg".into(),
            url: "https://cdn.example.com/m1".into(),
        };
        let mut d = AdDraft {
            adset_id: Some("120002".into()),
            name: Some("Ad 1".into()),
            title: Some("T".into()),
            body: Some("B".into()),
            image_url: Some("https://made-up.example.com/pic.png".into()),
            ..AdDraft::default()
        };
        let fixes = fix_ad(&mut d, &created(), &materials, Some(&assignment), 1);
        assert_eq!(d.image_url.as_deref(), Some("https://cdn.example.com/m1"));
        assert!(fixes.iter().any(|f| f.contains("hero.jpg")));
    }

    #[test]
    fn test_missing_copy_defaulted() {
        let mut d = AdDraft {
            adset_id: Some("120002".into()),
            ..AdDraft::default()
        };
        let fixes = fix_ad(&mut d, &created(), &[], None, 2);
        assert_eq!(d.name.as_deref(), Some("Ad 2"));
        assert_eq!(d.title.as_deref(), Some("Ad 2"));
        assert_eq!(d.body.as_deref(), Some("Learn more"));
        assert_eq!(fixes.len(), 3);
    }

    #[test]
    fn test_campaign_budget_and_status() {
        let mut d = CampaignDraft {
            name: Some("Leads RO".into()),
            objective: Some("LEADS".into()),
            ..CampaignDraft::default()
        };
        let fixes = fix_campaign(&mut d, "leads campaign with $15 daily budget");
        assert_eq!(d.daily_budget_cents, Some(1500));
        assert_eq!(d.status.as_deref(), Some("PAUSED"));
        assert_eq!(fixes.len(), 2);
    }
}
