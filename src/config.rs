//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ADPILOT__*` 覆盖（双下划线表示嵌套，
//! 如 `ADPILOT__LLM__MODEL=gpt-4o`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub executor: ExecutorSection,
}

/// [app] 段：应用名
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    /// 后端：openai 兼容端点（可配置 base_url 指向代理或自建服务）
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 单次模型请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

/// [executor] 段：执行循环的边界参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// 单次指令最大模型轮数，防止失控模型拖垮成本
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 同一工具连续失败上限，到达后终止整次执行
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// 指令未写明数量时默认创建的广告数
    #[serde(default = "default_ad_count")]
    pub default_ad_count: usize,
    /// 单次 Gateway 调用超时（秒）
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,
    /// 执行会话保留时长（秒），到期由 cleanup_expired 回收
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

fn default_max_iterations() -> usize {
    15
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_ad_count() -> usize {
    1
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

fn default_session_ttl_secs() -> u64 {
    3600
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_consecutive_failures: default_max_consecutive_failures(),
            default_ad_count: default_ad_count(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            executor: ExecutorSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 ADPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ADPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ADPILOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置（配置热更新：调用方决定是否用新配置重建组件）
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
