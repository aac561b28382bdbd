//! 定向约束解析
//!
//! 从用户指令文本中提取结构化定向事实（语言/国家/性别/年龄/兴趣）。
//! 每个字段独立解析，规则有序，首条命中即生效；字段缺失表示「无约束」而非「全量」。
//! 关键正确性：性别只认显式的 men/women/male/female，绝不从国籍词推断
//! （"Romanians" 不得隐含性别）。

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 显式性别约束
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    All,
}

/// 从单条指令解析出的定向约束；None / 空列表 = 该维度无约束
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetingConstraints {
    pub language: Option<String>,
    /// 规范化语言 token（locale 形式，如 "ro"、"en"）
    pub language_tokens: Vec<String>,
    /// ISO 国家码，可多个
    pub countries: Vec<String>,
    pub gender: Option<Gender>,
    pub age_min: Option<u8>,
    pub age_max: Option<u8>,
    pub interests: Vec<String>,
}

impl TargetingConstraints {
    pub fn is_empty(&self) -> bool {
        self.language.is_none()
            && self.countries.is_empty()
            && self.gender.is_none()
            && self.age_min.is_none()
            && self.age_max.is_none()
            && self.interests.is_empty()
    }
}

/// 国籍/国名词表 -> ISO 国家码（按表序收集所有命中，去重）
const COUNTRY_LEXICON: &[(&str, &str)] = &[
    (r"(?i)\bromanians?\b|\bromania\b", "RO"),
    (r"(?i)\bmoldovans?\b|\bmoldova\b", "MD"),
    (r"(?i)\bhungarians?\b|\bhungary\b", "HU"),
    (r"(?i)\bgermans?\b|\bgermany\b", "DE"),
    (r"(?i)\bfrench\b|\bfrance\b", "FR"),
    (r"(?i)\bspanish\b|\bspaniards?\b|\bspain\b", "ES"),
    (r"(?i)\bitalians?\b|\bitaly\b", "IT"),
    (r"(?i)\bpolish\b|\bpoles\b|\bpoland\b", "PL"),
    (r"(?i)\bukrainians?\b|\bukraine\b", "UA"),
    (r"(?i)\bbulgarians?\b|\bbulgaria\b", "BG"),
    (r"(?i)\bgreeks?\b|\bgreece\b", "GR"),
    (r"(?i)\bczechs?\b|\bczechia\b", "CZ"),
    (r"(?i)\baustrians?\b|\baustria\b", "AT"),
    (r"(?i)\bportuguese\b|\bportugal\b", "PT"),
    (r"(?i)\bdutch\b|\bnetherlands\b", "NL"),
    (r"(?i)\bbritish\b|\buk\b|\bunited kingdom\b|\bengland\b", "GB"),
    (r"(?i)\bamericans?\b|\busa\b|\bunited states\b", "US"),
];

/// 语言词 -> locale token（只在显式 "in/on <语言>" 短语中生效）
const LANGUAGE_LEXICON: &[(&str, &str)] = &[
    ("english", "en"),
    ("romanian", "ro"),
    ("hungarian", "hu"),
    ("german", "de"),
    ("french", "fr"),
    ("spanish", "es"),
    ("italian", "it"),
    ("polish", "pl"),
    ("ukrainian", "uk"),
    ("russian", "ru"),
    ("bulgarian", "bg"),
    ("greek", "el"),
    ("czech", "cs"),
    ("portuguese", "pt"),
    ("dutch", "nl"),
];

fn parse_language(command: &str) -> (Option<String>, Vec<String>) {
    // 只匹配 "in Romanian" / "on English" 这类显式语言短语，避免把国籍词当语言
    let words: Vec<&str> = LANGUAGE_LEXICON.iter().map(|(w, _)| *w).collect();
    let pattern = format!(r"(?i)\b(?:in|on)\s+({})\b(?:\s+language)?", words.join("|"));
    let re = Regex::new(&pattern).ok();
    if let Some(caps) = re.and_then(|r| r.captures(command)) {
        let word = caps[1].to_lowercase();
        let token = LANGUAGE_LEXICON
            .iter()
            .find(|(w, _)| *w == word)
            .map(|(_, t)| t.to_string());
        return (Some(word), token.into_iter().collect());
    }
    (None, Vec::new())
}

fn parse_countries(command: &str) -> Vec<String> {
    let mut codes = Vec::new();
    for (pattern, code) in COUNTRY_LEXICON {
        if let Ok(re) = Regex::new(pattern) {
            if re.is_match(command) && !codes.contains(&code.to_string()) {
                codes.push(code.to_string());
            }
        }
    }
    codes
}

fn parse_gender(command: &str) -> Option<Gender> {
    // 规则有序：先「全性别」短语（含 "men and women"），再 female，再 male。
    // \bmen\b 不会命中 "women"（m 前是字母 o，无词边界），两条规则互不干扰。
    let all = Regex::new(
        r"(?i)\b(?:all genders|both genders|everyone|men and women|women and men|any gender)\b",
    )
    .ok()?;
    if all.is_match(command) {
        return Some(Gender::All);
    }
    let female = Regex::new(r"(?i)\b(?:women|woman|females?|girls|ladies)\b").ok()?;
    if female.is_match(command) {
        return Some(Gender::Female);
    }
    let male = Regex::new(r"(?i)\b(?:men|man|males?|guys|boys)\b").ok()?;
    if male.is_match(command) {
        return Some(Gender::Male);
    }
    None
}

fn parse_age_range(command: &str) -> (Option<u8>, Option<u8>) {
    let range_rules = [
        r"(?i)\baged?\s+(\d{1,2})\s*(?:-|–|to|through)\s*(\d{1,2})\b",
        r"(?i)\bbetween\s+(\d{1,2})\s+and\s+(\d{1,2})\b",
        r"(?i)\b(\d{1,2})\s*(?:-|–|to)\s*(\d{1,2})\s*(?:years?(?:\s+old)?|y\.?o\.?\b)",
    ];
    for rule in range_rules {
        if let Some(caps) = Regex::new(rule).ok().and_then(|r| r.captures(command)) {
            let lo: u8 = match caps[1].parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let hi: u8 = match caps[2].parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            return if lo <= hi {
                (Some(lo), Some(hi))
            } else {
                (Some(hi), Some(lo))
            };
        }
    }
    let min_only = Regex::new(r"(?i)\b(?:over|above|older than)\s+(\d{1,2})\b").ok();
    if let Some(caps) = min_only.and_then(|r| r.captures(command)) {
        return (caps[1].parse().ok(), None);
    }
    let max_only = Regex::new(r"(?i)\b(?:under|below|younger than)\s+(\d{1,2})\b").ok();
    if let Some(caps) = max_only.and_then(|r| r.captures(command)) {
        return (None, caps[1].parse().ok());
    }
    (None, None)
}

fn parse_interests(command: &str) -> Vec<String> {
    // 只取第一个 "interested in ..." 子句，逗号/and 切分
    let re = match Regex::new(r"(?i)\binterested in\s+([^.;\n]+)") {
        Ok(r) => r,
        Err(_) => return Vec::new(),
    };
    let Some(caps) = re.captures(command) else {
        return Vec::new();
    };
    caps[1]
        .split(',')
        .flat_map(|part| part.split(" and "))
        .map(|s| s.trim().trim_end_matches('.').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// 解析单条指令的全部定向约束（每次执行解析一次）
pub fn parse_constraints(command: &str) -> TargetingConstraints {
    let (language, language_tokens) = parse_language(command);
    let (age_min, age_max) = parse_age_range(command);
    TargetingConstraints {
        language,
        language_tokens,
        countries: parse_countries(command),
        gender: parse_gender(command),
        age_min,
        age_max,
        interests: parse_interests(command),
    }
}
