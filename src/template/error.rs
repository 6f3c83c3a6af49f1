// ABOUTME: Error types for template engine operations
// ABOUTME: Defines specific error types for stub loading, syntax setup and rendering

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("{0}")]
    RenderError(#[from] minijinja::Error),

    #[error("Template syntax configuration error: {0}")]
    SyntaxError(String),

    #[error("Stub directory error: {0}")]
    StubDirectory(String),
}

pub type Result<T> = std::result::Result<T, TemplateError>;
