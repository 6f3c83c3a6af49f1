// ABOUTME: Template engine module for the file templating action
// ABOUTME: Provides audited rendering, stub usage tracking and state classification

pub mod audit;
pub mod engine;
pub mod error;
pub mod state;

pub use audit::{
    AuditKey, AuditScope, AuditTracker, MissingStubPolicy, OptionalVariablePolicy, RenderRecord,
    Resolution, StubTotals,
};
pub use engine::TemplateEngine;
pub use error::{Result, TemplateError};
pub use state::TemplateState;
