//! Editor error types.

use forge_renderer::RendererError;
use forge_rhi::RhiError;
use thiserror::Error;

use crate::widgets::WidgetKind;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Renderer(#[from] RendererError),

    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error("icon '{path}': {source}")]
    Icon {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("editor context used before init or after teardown")]
    NotInitialized,

    #[error("widget {0:?} registered twice")]
    DuplicateWidget(WidgetKind),
}

pub type EditorResult<T> = Result<T, EditorError>;
