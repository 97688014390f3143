use thiserror::Error;

pub type Result<T, E = CompositorError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CompositorError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("event loop error: {0}")]
    EventLoop(String),

    #[error("renderer error: {0}")]
    Renderer(String),
}
