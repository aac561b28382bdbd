//! Adpilot - 自然语言广告投放编排器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **constraints**: 指令定向约束解析与强制执行（国家/性别/年龄/兴趣）
//! - **core**: 执行错误类型与连续失败计数器
//! - **events**: 步骤进度事件（供 SSE 等单向推送通道使用）
//! - **llm**: Tool-Calling 模型客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: tracing 初始化
//! - **orchestrator**: 指令执行主循环（Campaign -> AdSet -> Ad）
//! - **platform**: 平台工具词表、Gateway 抽象、错误归一化、素材分配
//! - **session**: 单次执行会话与 TTL 管理
//! - **steps**: 步骤状态机、步骤注册表、执行摘要

pub mod config;
pub mod constraints;
pub mod core;
pub mod events;
pub mod llm;
pub mod observability;
pub mod orchestrator;
pub mod platform;
pub mod session;
pub mod steps;

pub use orchestrator::{CommandOrchestrator, ExecutionOutcome, ExecutionRequest};
