pub mod config;
pub mod entities;
pub mod error;
pub mod executor;
pub mod handler;
pub mod interpreter;
pub mod prompt;
pub mod template;
pub mod types;

pub use config::{BridgeConfig, ConfigLoader, ConfigOverrides, ConfigValidator};
pub use entities::{
    ExecutionResult, ExecutionSpec, ExecutionStatus, FailureKind, SessionSelector, ToolFailure,
    ToolRequest, ToolResponse,
};
pub use error::AppError;
pub use executor::{ProcessRunner, TokioProcessRunner};
pub use handler::RequestHandler;
pub use template::{CommandTemplate, TemplateResolver};
pub use types::*;
