//! Renderer configuration.

use std::path::PathBuf;

use forge_rhi::{DeviceDescriptor, Extent, TextureFormat};

use crate::options::{OptionValue, RendererOption};

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub device: DeviceDescriptor,
    /// Swap chain images, also the number of command lists per pool set.
    pub swap_chain_buffer_count: u32,
    pub swap_chain_format: TextureFormat,
    /// Initial window (swap chain) size.
    pub window_size: Extent,
    pub resolution_render: Extent,
    pub resolution_output: Extent,
    pub vsync: bool,
    pub present: bool,
    /// Directory holding shader sources; `None` uses built-in placeholders.
    pub shader_directory: Option<PathBuf>,
    /// Compile shaders on a background worker instead of during construction.
    pub compile_shaders_async: bool,
    pub options: RendererOption,
    pub option_values: Vec<(OptionValue, f32)>,
    /// Initial vertex capacity of each debug line list.
    pub debug_line_capacity: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            device: DeviceDescriptor::default(),
            swap_chain_buffer_count: 2,
            swap_chain_format: TextureFormat::Rgba8Unorm,
            window_size: Extent::new(1280, 720),
            resolution_render: Extent::new(1280, 720),
            resolution_output: Extent::new(1280, 720),
            vsync: true,
            present: true,
            shader_directory: None,
            compile_shaders_async: true,
            options: RendererOption::default(),
            option_values: Vec::new(),
            debug_line_capacity: 4096,
        }
    }
}

impl RendererConfig {
    /// Configuration for headless use: null backend, synchronous shader
    /// compilation and no presentation.
    pub fn headless(width: u32, height: u32) -> Self {
        let size = Extent::new(width, height);
        Self {
            window_size: size,
            resolution_render: size,
            resolution_output: size,
            vsync: false,
            present: false,
            compile_shaders_async: false,
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: RendererOption) -> Self {
        self.options = options;
        self
    }

    pub fn with_option_value(mut self, option: OptionValue, value: f32) -> Self {
        self.option_values.push((option, value));
        self
    }
}
