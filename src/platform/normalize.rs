//! 错误归一化
//!
//! 把任意失败（纯文本、JSON 错误体、平台错误码）分类为固定类别之一，并决定是否阻断。
//! 纯函数，无副作用。优先级有序，首条命中即定类：
//! 结构化显式码 -> 计费短语 -> 默认主页短语 -> DSA 短语 -> 出价缺失 ->
//! Advantage Audience -> 限流 -> 权限 -> 参数非法 -> generic。
//! 阻断类别必须给出至少一条用户可在系统外执行的下一步。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 错误类别（封闭集合）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Billing,
    DefaultPage,
    Dsa,
    BidRequired,
    AdvantageAudience,
    Permissions,
    InvalidParameter,
    RateLimit,
    Generic,
}

impl ErrorCategory {
    /// 阻断类别：无法自动修复，必须由用户改外部账户配置
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Billing
                | ErrorCategory::DefaultPage
                | ErrorCategory::Dsa
                | ErrorCategory::Permissions
        )
    }
}

/// 阻断错误的补救码（对外序列化为 SCREAMING_SNAKE）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemediationCode {
    #[serde(rename = "DSA_REQUIRED")]
    DsaRequired,
    #[serde(rename = "DEFAULT_PAGE_REQUIRED")]
    DefaultPageRequired,
    #[serde(rename = "PAYMENT_METHOD_REQUIRED")]
    PaymentMethodRequired,
}

/// 调用方路由用户去手动解决的导航动作
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemediationAction {
    #[serde(rename = "OPEN_DSA_SETTINGS")]
    OpenDsaSettings,
    #[serde(rename = "OPEN_DEFAULT_PAGE_SETTINGS")]
    OpenDefaultPageSettings,
    #[serde(rename = "OPEN_BILLING_SETTINGS")]
    OpenBillingSettings,
}

/// 调试信息袋：原始文本、平台 code/subcode、trace id
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDebug {
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcode: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// 归一化后的执行错误
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedError {
    pub category: ErrorCategory,
    pub blocking: bool,
    pub title: String,
    pub message: String,
    /// 有序补救步骤；阻断类别至少一条
    pub next_steps: Vec<String>,
    /// 机器可读的定类依据
    pub rationale: String,
    pub debug: ErrorDebug,
}

impl NormalizedError {
    /// 阻断错误对应的补救码与导航动作（三个识别码之外的阻断错误返回 None）
    pub fn remediation(&self) -> Option<(RemediationCode, RemediationAction)> {
        match self.category {
            ErrorCategory::Billing => Some((
                RemediationCode::PaymentMethodRequired,
                RemediationAction::OpenBillingSettings,
            )),
            ErrorCategory::DefaultPage => Some((
                RemediationCode::DefaultPageRequired,
                RemediationAction::OpenDefaultPageSettings,
            )),
            ErrorCategory::Dsa => Some((
                RemediationCode::DsaRequired,
                RemediationAction::OpenDsaSettings,
            )),
            _ => None,
        }
    }

    /// 重试前给模型的修正提示；阻断与 generic 类别无针对性修正
    pub fn retry_hint(&self) -> Option<&'static str> {
        match self.category {
            ErrorCategory::BidRequired => {
                Some("Include a bidAmountCents derived from the daily budget and retry the same call.")
            }
            ErrorCategory::AdvantageAudience => {
                Some("Set advantageAudience explicitly (true or false) and retry the same call.")
            }
            ErrorCategory::RateLimit => {
                Some("The platform is rate limiting; retry the exact same call.")
            }
            ErrorCategory::InvalidParameter => {
                Some("One of the parameters was rejected; correct it per the error message and retry.")
            }
            _ => None,
        }
    }
}

/// 从 JSON 错误体提取的字段
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawErrorBody {
    code: Option<Value>,
    message: Option<String>,
    #[serde(rename = "nextSteps")]
    next_steps: Option<Vec<String>>,
    #[serde(rename = "error_subcode", alias = "subcode")]
    error_subcode: Option<i64>,
    #[serde(rename = "fbtrace_id", alias = "traceId")]
    trace_id: Option<String>,
}

/// 平台限流错误码（"too many calls" 家族）
const RATE_LIMIT_CODES: &[i64] = &[4, 17, 613, 80004];

fn extract_body(raw: &str) -> Option<RawErrorBody> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    // 既接受顶层 {code, message, nextSteps}，也接受 Graph 风格 {"error": {...}}
    let body = value.get("error").cloned().unwrap_or(value);
    serde_json::from_value(body).ok()
}

fn build(
    category: ErrorCategory,
    title: &str,
    message: String,
    next_steps: Vec<String>,
    rationale: String,
    debug: ErrorDebug,
) -> NormalizedError {
    NormalizedError {
        category,
        blocking: category.is_blocking(),
        title: title.to_string(),
        message,
        next_steps,
        rationale,
        debug,
    }
}

/// 归一化任意失败文本（纯函数）
pub fn normalize_error(raw: &str) -> NormalizedError {
    let body = extract_body(raw);
    let mut debug = ErrorDebug {
        raw: raw.to_string(),
        ..ErrorDebug::default()
    };

    let mut explicit_code: Option<&str> = None;
    let mut numeric_code: Option<i64> = None;
    let mut body_message = String::new();
    let mut body_steps: Vec<String> = Vec::new();
    if let Some(body) = &body {
        match &body.code {
            Some(Value::String(s)) => explicit_code = Some(s.as_str()),
            Some(Value::Number(n)) => numeric_code = n.as_i64(),
            _ => {}
        }
        debug.code = numeric_code;
        debug.subcode = body.error_subcode;
        debug.trace_id = body.trace_id.clone();
        if let Some(m) = &body.message {
            body_message = m.clone();
        }
        if let Some(steps) = &body.next_steps {
            body_steps = steps.clone();
        }
    }

    let text = if body_message.is_empty() {
        raw.to_string()
    } else {
        body_message.clone()
    };
    let lower = format!("{} {}", raw.to_lowercase(), body_message.to_lowercase());

    // 1. 结构化显式码
    match explicit_code {
        Some("DSA_REQUIRED") => {
            return build(
                ErrorCategory::Dsa,
                "DSA compliance required",
                text,
                merge_steps(body_steps, dsa_steps()),
                "explicit code DSA_REQUIRED".to_string(),
                debug,
            );
        }
        Some("DEFAULT_PAGE_REQUIRED") => {
            return build(
                ErrorCategory::DefaultPage,
                "Default page required",
                text,
                merge_steps(body_steps, default_page_steps()),
                "explicit code DEFAULT_PAGE_REQUIRED".to_string(),
                debug,
            );
        }
        Some("PAYMENT_METHOD_REQUIRED") => {
            return build(
                ErrorCategory::Billing,
                "Payment method required",
                text,
                merge_steps(body_steps, billing_steps()),
                "explicit code PAYMENT_METHOD_REQUIRED".to_string(),
                debug,
            );
        }
        _ => {}
    }

    // 2. 计费/支付短语
    if contains_any(
        &lower,
        &[
            "payment method",
            "payment_method",
            "billing",
            "funding source",
            "no valid payment",
            "add a payment",
        ],
    ) {
        return build(
            ErrorCategory::Billing,
            "Payment method required",
            text,
            merge_steps(body_steps, billing_steps()),
            "billing phrase in error text".to_string(),
            debug,
        );
    }

    // 3. 默认主页短语
    if contains_any(&lower, &["default page", "promoted object page", "page is required"]) {
        return build(
            ErrorCategory::DefaultPage,
            "Default page required",
            text,
            merge_steps(body_steps, default_page_steps()),
            "default page phrase in error text".to_string(),
            debug,
        );
    }

    // 4. DSA / 受益方短语；"dsa" 必须整词命中，避免误吞含它的普通单词
    if contains_word(&lower, "dsa") || contains_any(&lower, &["beneficiary", "payer information"]) {
        return build(
            ErrorCategory::Dsa,
            "DSA compliance required",
            text,
            merge_steps(body_steps, dsa_steps()),
            "dsa/beneficiary phrase in error text".to_string(),
            debug,
        );
    }

    // 5. 出价缺失（可自动修复）
    if contains_any(&lower, &["bid amount", "bid_amount", "bid is required"]) {
        return build(
            ErrorCategory::BidRequired,
            "Bid amount required",
            text,
            vec!["A bid will be derived from the daily budget automatically.".to_string()],
            "bid-required phrase in error text".to_string(),
            debug,
        );
    }

    // 6. Advantage Audience（可自动修复）
    if contains_any(&lower, &["advantage audience", "advantage_audience", "targeting_automation"]) {
        return build(
            ErrorCategory::AdvantageAudience,
            "Advantage audience flag required",
            text,
            vec!["The advantage audience flag will be set explicitly on retry.".to_string()],
            "advantage-audience phrase in error text".to_string(),
            debug,
        );
    }

    // 7. 限流（平台数字码或短语）
    let is_rate_code = numeric_code.map(|c| RATE_LIMIT_CODES.contains(&c)).unwrap_or(false);
    if is_rate_code || contains_any(&lower, &["too many calls", "rate limit", "request limit reached"]) {
        return build(
            ErrorCategory::RateLimit,
            "Platform rate limit",
            text,
            vec!["Wait a moment; the call is retried automatically.".to_string()],
            if is_rate_code {
                format!("rate limit platform code {}", numeric_code.unwrap_or_default())
            } else {
                "rate limit phrase in error text".to_string()
            },
            debug,
        );
    }

    // 8. 权限（阻断）
    if contains_any(
        &lower,
        &[
            "permission",
            "not authorized",
            "unauthorized",
            "(#200)",
            "access denied",
        ],
    ) {
        return build(
            ErrorCategory::Permissions,
            "Missing permissions",
            text,
            merge_steps(
                body_steps,
                vec![
                    "Ask an admin of the ad account to grant your user advertising permissions."
                        .to_string(),
                    "Re-connect the account and try again.".to_string(),
                ],
            ),
            "permission phrase in error text".to_string(),
            debug,
        );
    }

    // 9. 参数非法（可重试）
    if contains_any(&lower, &["invalid parameter", "invalid param", "(#100)", "unsupported request"]) {
        return build(
            ErrorCategory::InvalidParameter,
            "Invalid parameter",
            text,
            vec!["The parameter is corrected and the call retried automatically.".to_string()],
            "invalid-parameter phrase in error text".to_string(),
            debug,
        );
    }

    // 10. 兜底
    build(
        ErrorCategory::Generic,
        "Execution error",
        text,
        body_steps,
        "no classification rule matched".to_string(),
        debug,
    )
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// 整词匹配：按非字母数字切词后逐一比较（"dsa_required" 也能命中）
fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token == word)
}

fn merge_steps(from_body: Vec<String>, fallback: Vec<String>) -> Vec<String> {
    if from_body.is_empty() {
        fallback
    } else {
        from_body
    }
}

fn billing_steps() -> Vec<String> {
    vec![
        "Open the ad account's billing settings and add a valid payment method.".to_string(),
        "Verify the payment method covers the campaign's currency.".to_string(),
        "Run the command again once billing is set up.".to_string(),
    ]
}

fn default_page_steps() -> Vec<String> {
    vec![
        "Open the business settings and set a default page for advertising.".to_string(),
        "Run the command again once the page is set.".to_string(),
    ]
}

fn dsa_steps() -> Vec<String> {
    vec![
        "Open the account's DSA settings and fill in beneficiary and payer information.".to_string(),
        "Run the command again once the DSA fields are saved.".to_string(),
    ]
}
