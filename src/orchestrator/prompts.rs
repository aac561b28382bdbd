//! 系统提示与轮间指令
//!
//! system prompt 携带识别到的选项：可用创意素材与素材到广告位的推断分配。
//! 轮间 nudge 根据已累积的结果把模型推向下一个实体。

use crate::orchestrator::ExecutionRequest;
use crate::platform::materials::{Material, MaterialAssignment};
use crate::steps::CreatedEntityIds;

/// 构建会话 system prompt
pub fn build_system_prompt(
    req: &ExecutionRequest,
    materials: &[Material],
    assignments: &[MaterialAssignment],
    requested_ads: usize,
) -> String {
    let mut prompt = String::from(
        "You are an advertising operations assistant. You translate the operator's \
         command into platform tool calls, strictly in this order: create_campaign, \
         then create_adset, then create_ad (one call per ad). Rules:\n\
         - Never invent ids. Use the exact id returned by the previous tool result.\n\
         - Issue at most one tool call per turn.\n\
         - Budgets are given in minor currency units (cents).\n\
         - When a tool result reports an error, correct the call as instructed and retry it.\n\
         - When everything requested has been created, reply with a short plain-text summary \
           instead of a tool call.\n",
    );

    prompt.push_str(&format!(
        "\nAd account: {} (business {}).\n",
        req.account_id, req.business_id
    ));
    prompt.push_str(&format!("Requested number of ads: {}.\n", requested_ads));

    if materials.is_empty() {
        prompt.push_str("\nNo uploaded creative materials are available.\n");
    } else {
        prompt.push_str("\nAvailable creative materials (only these URLs are accepted by the platform):\n");
        for m in materials {
            prompt.push_str(&format!("- {} ({:?}): {}\n", m.filename, m.category, m.url));
        }
    }

    if !assignments.is_empty() {
        prompt.push_str("\nInferred material-to-ad assignments:\n");
        for a in assignments {
            prompt.push_str(&format!("- ad {}: {} ({})\n", a.ad_index, a.filename, a.url));
        }
    }

    prompt
}

/// 续跑开场：列出上次已建的实体，指示模型从缺失实体继续
pub fn resume_context(created: &CreatedEntityIds) -> String {
    let mut msg = String::from(
        "This command resumes a previous run. Already created, do not create again:\n",
    );
    if let Some(id) = &created.campaign_id {
        msg.push_str(&format!("- campaign: {}\n", id));
    }
    if let Some(id) = &created.ad_set_id {
        msg.push_str(&format!("- ad set: {}\n", id));
    }
    for id in &created.ad_ids {
        msg.push_str(&format!("- ad: {}\n", id));
    }
    msg.push_str("Continue with the first missing entity, using these exact ids as parents.");
    msg
}

/// Campaign 建好后：要求创建 AdSet
pub fn nudge_create_adset(campaign_id: &str) -> String {
    format!(
        "The campaign was created with id {}. Now call create_adset for this campaign \
         with the requested budget and targeting.",
        campaign_id
    )
}

/// AdSet 就绪且还有广告缺口：要求创建第 n 个广告（附素材与区分名）
pub fn nudge_create_ad(
    ad_set_id: &str,
    next_index: usize,
    total: usize,
    assignment: Option<&MaterialAssignment>,
) -> String {
    let mut msg = format!(
        "The ad set is ready with id {}. Now call create_ad for ad {} of {} and give it \
         a distinct name (for example \"Ad {}\").",
        ad_set_id, next_index, total, next_index
    );
    if let Some(a) = assignment {
        msg.push_str(&format!(
            " Use the uploaded material {} ({}).",
            a.filename, a.url
        ));
    }
    msg
}
