//! 定向约束强制执行
//!
//! 将解析出的事实覆盖到候选定向 payload 上：显式约束必须生效，缺失约束要主动剥离
//! 模型臆造的值。不对称是核心保证——最终发往下游的 payload 绝不定向用户没说的
//! 性别/国家/年龄，也绝不遗漏用户说了的。每次改动记录一条可读的修正说明。

use crate::constraints::parser::{Gender, TargetingConstraints};
use crate::platform::tools::{GeoLocations, Interest, Targeting};

/// 把约束应用到定向 payload 上，返回应用的修正说明列表（无改动则为空）
pub fn enforce_constraints(constraints: &TargetingConstraints, targeting: &mut Targeting) -> Vec<String> {
    let mut fixes = Vec::new();

    if !constraints.countries.is_empty() {
        let current = targeting
            .geo_locations
            .as_ref()
            .map(|g| g.countries.clone())
            .unwrap_or_default();
        if current != constraints.countries {
            fixes.push(format!(
                "Set target countries to [{}] from the command (model proposed [{}])",
                constraints.countries.join(", "),
                current.join(", ")
            ));
            targeting.geo_locations = Some(GeoLocations {
                countries: constraints.countries.clone(),
            });
        }
    }

    match constraints.gender {
        Some(Gender::Male) => {
            if targeting.genders.as_deref() != Some(&[1]) {
                fixes.push("Set gender targeting to men as requested in the command".to_string());
                targeting.genders = Some(vec![1]);
            }
        }
        Some(Gender::Female) => {
            if targeting.genders.as_deref() != Some(&[2]) {
                fixes.push("Set gender targeting to women as requested in the command".to_string());
                targeting.genders = Some(vec![2]);
            }
        }
        Some(Gender::All) => {
            if targeting.genders.is_some() {
                fixes.push(
                    "Removed gender restriction: the command asks for all genders".to_string(),
                );
                targeting.genders = None;
            }
        }
        None => {
            // 指令未提性别：单一性别限制是模型臆造的，剥离之
            if matches!(&targeting.genders, Some(g) if g.len() == 1) {
                fixes.push(
                    "Removed single-gender restriction not present in the command".to_string(),
                );
                targeting.genders = None;
            }
        }
    }

    if let Some(age_min) = constraints.age_min {
        if targeting.age_min != Some(age_min) {
            fixes.push(format!("Set minimum age to {} from the command", age_min));
            targeting.age_min = Some(age_min);
        }
    }
    if let Some(age_max) = constraints.age_max {
        if targeting.age_max != Some(age_max) {
            fixes.push(format!("Set maximum age to {} from the command", age_max));
            targeting.age_max = Some(age_max);
        }
    }

    if !constraints.language_tokens.is_empty() {
        let current = targeting.locales.clone().unwrap_or_default();
        if current != constraints.language_tokens {
            fixes.push(format!(
                "Set ad language to [{}] from the command",
                constraints.language_tokens.join(", ")
            ));
            targeting.locales = Some(constraints.language_tokens.clone());
        }
    }

    if !constraints.interests.is_empty() {
        let current: Vec<String> = targeting
            .interests
            .as_ref()
            .map(|v| v.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default();
        if current != constraints.interests {
            fixes.push(format!(
                "Set interests to [{}] from the command",
                constraints.interests.join(", ")
            ));
            targeting.interests = Some(
                constraints
                    .interests
                    .iter()
                    .map(|name| Interest { name: name.clone() })
                    .collect(),
            );
        }
    }

    fixes
}
