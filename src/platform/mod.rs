pub mod gateway;
pub mod materials;
pub mod mock;
pub mod normalize;
pub mod tools;

pub use gateway::{GatewayExecutor, ToolGateway};
pub use materials::{Material, MaterialAssignment, MaterialCategory};
pub use mock::MockGateway;
pub use normalize::{
    normalize_error, ErrorCategory, NormalizedError, RemediationAction, RemediationCode,
};
pub use tools::{tool_specs, AdDraft, AdsetDraft, CampaignDraft, ParsedToolCall, Targeting, ToolName};
