//! 素材解析
//!
//! 把已上传的创意素材（只读列表）映射到各广告位：指令里显式点名的文件优先，
//! 其余按类别与上传顺序补位。同时解析指令要求的广告数量（"<N> ads"）。

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 素材类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialCategory {
    Image,
    Video,
    Other,
}

/// 已上传的创意素材（外部素材源提供）
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    pub filename: String,
    pub url: String,
    pub category: MaterialCategory,
}

/// 素材到广告位的分配结果（ad_index 从 1 开始）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialAssignment {
    pub ad_index: usize,
    pub material_id: String,
    pub filename: String,
    pub url: String,
}

/// 解析指令要求的广告数量（"3 ads" / "one ad"）；未写明返回 None
pub fn requested_ad_count(command: &str) -> Option<usize> {
    if let Some(caps) = Regex::new(r"(?i)\b(\d{1,3})\s+ads?\b")
        .ok()
        .and_then(|r| r.captures(command))
    {
        return caps[1].parse().ok();
    }
    let words = [
        ("one", 1),
        ("two", 2),
        ("three", 3),
        ("four", 4),
        ("five", 5),
    ];
    for (word, n) in words {
        let pattern = format!(r"(?i)\b{}\s+ads?\b", word);
        if Regex::new(&pattern).map(|r| r.is_match(command)).unwrap_or(false) {
            return Some(n);
        }
    }
    None
}

/// 把可用素材分配到 1..=ad_count 的广告位
///
/// 规则有序：先按指令中显式出现的文件名（含去扩展名的词干，不区分大小写）配对，
/// 再用未占用的图片/视频素材按上传顺序补齐剩余位置。素材不足时后续广告位留空。
pub fn resolve_materials(
    command: &str,
    materials: &[Material],
    ad_count: usize,
) -> Vec<MaterialAssignment> {
    let lower = command.to_lowercase();
    let mut used: Vec<bool> = vec![false; materials.len()];
    let mut assignments: Vec<MaterialAssignment> = Vec::new();

    // 显式点名：按素材在指令中出现的位置排序，依次占据最靠前的广告位
    let mut mentioned: Vec<(usize, usize)> = Vec::new(); // (位置, 素材下标)
    for (i, m) in materials.iter().enumerate() {
        let full = m.filename.to_lowercase();
        let stem = full
            .rsplit_once('.')
            .map(|(s, _)| s.to_string())
            .unwrap_or_else(|| full.clone());
        let pos = lower.find(&full).or_else(|| {
            if stem.len() >= 3 {
                lower.find(&stem)
            } else {
                None
            }
        });
        if let Some(p) = pos {
            mentioned.push((p, i));
        }
    }
    mentioned.sort();

    for (_, idx) in mentioned {
        if assignments.len() >= ad_count {
            break;
        }
        used[idx] = true;
        let m = &materials[idx];
        assignments.push(MaterialAssignment {
            ad_index: assignments.len() + 1,
            material_id: m.id.clone(),
            filename: m.filename.clone(),
            url: m.url.clone(),
        });
    }

    // 按顺序补位（图片与视频均可作为创意）
    for (i, m) in materials.iter().enumerate() {
        if assignments.len() >= ad_count {
            break;
        }
        if used[i] || m.category == MaterialCategory::Other {
            continue;
        }
        used[i] = true;
        assignments.push(MaterialAssignment {
            ad_index: assignments.len() + 1,
            material_id: m.id.clone(),
            filename: m.filename.clone(),
            url: m.url.clone(),
        });
    }

    assignments
}

/// 某 URL 是否属于已上传素材（平台只认自己的素材地址）
pub fn is_uploaded_url(materials: &[Material], url: &str) -> bool {
    materials.iter().any(|m| m.url == url)
}
