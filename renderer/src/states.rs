//! Fixed-function state objects used by the passes.

use std::sync::Arc;

use forge_rhi::{
    BlendState, CompareFunction, CullMode, DepthStencilState,
    PolygonMode, RasterizerState, StencilOperation,
};

pub struct RasterizerStates {
    pub cull_back_solid: Arc<RasterizerState>,
    pub cull_back_wireframe: Arc<RasterizerState>,
    pub cull_none_solid: Arc<RasterizerState>,
    /// Depth biased, no clipping, for shadow maps.
    pub light_point_spot: Arc<RasterizerState>,
    pub light_directional: Arc<RasterizerState>,
}

impl RasterizerStates {
    pub fn new() -> Self {
        Self {
            cull_back_solid: RasterizerState::new(CullMode::Back, PolygonMode::Solid, true),
            cull_back_wireframe: RasterizerState::new(CullMode::Back, PolygonMode::Wireframe, true),
            cull_none_solid: RasterizerState::new(CullMode::None, PolygonMode::Solid, true),
            light_point_spot: RasterizerState::with_depth_bias(
                CullMode::Back,
                PolygonMode::Solid,
                true,
                600.0,
                0.0,
                -2.0,
            ),
            light_directional: RasterizerState::with_depth_bias(
                CullMode::Back,
                PolygonMode::Solid,
                false,
                6000.0,
                0.0,
                -2.0,
            ),
        }
    }
}

impl Default for RasterizerStates {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BlendStates {
    pub disabled: Arc<BlendState>,
    pub alpha: Arc<BlendState>,
    pub additive: Arc<BlendState>,
}

impl BlendStates {
    pub fn new() -> Self {
        Self {
            disabled: BlendState::disabled(),
            alpha: BlendState::alpha(),
            additive: BlendState::additive(),
        }
    }
}

impl Default for BlendStates {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-stencil states. The comparison direction depends on reverse-z, so
/// the whole set is rebuilt when that option flips.
pub struct DepthStencilStates {
    pub off: Arc<DepthStencilState>,
    pub read_write: Arc<DepthStencilState>,
    pub read: Arc<DepthStencilState>,
    /// Equal test against the prepass depth.
    pub read_equal: Arc<DepthStencilState>,
    pub read_write_stencil: Arc<DepthStencilState>,
    pub stencil_read: Arc<DepthStencilState>,
    reverse_z: bool,
}

impl DepthStencilStates {
    pub fn new(reverse_z: bool) -> Self {
        let function = if reverse_z {
            CompareFunction::GreaterEqual
        } else {
            CompareFunction::LessEqual
        };
        Self {
            off: DepthStencilState::new(false, false, CompareFunction::Always),
            read_write: DepthStencilState::new(true, true, function),
            read: DepthStencilState::new(true, false, function),
            read_equal: DepthStencilState::new(true, false, CompareFunction::Equal),
            read_write_stencil: DepthStencilState::with_stencil(
                true,
                true,
                function,
                true,
                true,
                CompareFunction::Always,
                StencilOperation::Replace,
            ),
            stencil_read: DepthStencilState::with_stencil(
                false,
                false,
                CompareFunction::Always,
                true,
                false,
                CompareFunction::Equal,
                StencilOperation::Keep,
            ),
            reverse_z,
        }
    }

    pub fn is_reverse_z(&self) -> bool {
        self.reverse_z
    }

    /// Depth the depth buffer is cleared to.
    pub fn clear_depth(&self) -> f32 {
        if self.reverse_z {
            0.0
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_z_direction() {
        let forward = DepthStencilStates::new(false);
        assert_eq!(forward.read_write.depth_function, CompareFunction::LessEqual);
        assert_eq!(forward.clear_depth(), 1.0);

        let reversed = DepthStencilStates::new(true);
        assert_eq!(reversed.read_write.depth_function, CompareFunction::GreaterEqual);
        assert_eq!(reversed.clear_depth(), 0.0);
        assert_ne!(forward.read_write.id(), reversed.read_write.id());
    }
}
