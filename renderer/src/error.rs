//! Renderer error types.

use forge_rhi::RhiError;
use thiserror::Error;

/// Errors surfaced by the renderer.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error("invalid resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    #[error("called from a thread other than the render thread")]
    NotRenderThread,

    #[error("must be called from a thread other than the render thread")]
    OnRenderThread,

    #[error("model format error: {0}")]
    ModelFormat(String),

    #[error("stale or unknown model handle")]
    InvalidHandle,

    #[error("missing shader source for '{0}'")]
    MissingShaderSource(&'static str),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RendererResult<T> = Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RendererError::InvalidResolution {
            width: 3,
            height: 2,
        };
        assert_eq!(err.to_string(), "invalid resolution 3x2");

        let err: RendererError = RhiError::InvalidArgument("bad".into()).into();
        assert_eq!(err.to_string(), "invalid argument: bad");
    }
}
