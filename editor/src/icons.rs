//! Editor icons: decoded from an icon directory when present, generated
//! otherwise, and uploaded once as GPU textures.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use forge_rhi::{Device, Texture, TextureDescriptor, TextureFlags, TextureFormat, TextureSlice};
use image::{Rgba, RgbaImage};

use crate::error::{EditorError, EditorResult};

/// Edge length of generated icons.
pub const ICON_SIZE: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IconKind {
    Light,
    Camera,
    ReflectionProbe,
    Folder,
    File,
    Model,
    Texture,
    Material,
}

impl IconKind {
    pub const ALL: [Self; 8] = [
        Self::Light,
        Self::Camera,
        Self::ReflectionProbe,
        Self::Folder,
        Self::File,
        Self::Model,
        Self::Texture,
        Self::Material,
    ];

    /// File stem looked up in the icon directory.
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Camera => "camera",
            Self::ReflectionProbe => "reflection_probe",
            Self::Folder => "folder",
            Self::File => "file",
            Self::Model => "model",
            Self::Texture => "texture",
            Self::Material => "material",
        }
    }

    fn placeholder_color(self) -> [u8; 4] {
        match self {
            Self::Light => [255, 214, 80, 255],
            Self::Camera => [120, 200, 255, 255],
            Self::ReflectionProbe => [190, 150, 255, 255],
            Self::Folder => [230, 180, 90, 255],
            Self::File => [200, 200, 200, 255],
            Self::Model => [120, 230, 140, 255],
            Self::Texture => [240, 120, 160, 255],
            Self::Material => [255, 150, 90, 255],
        }
    }
}

pub struct Icon {
    pub texture: Arc<Texture>,
    /// Set once the icon is registered with the UI backend.
    pub texture_id: Option<egui::TextureId>,
}

impl Icon {
    pub fn size(&self) -> egui::Vec2 {
        egui::vec2(self.texture.width() as f32, self.texture.height() as f32)
    }
}

#[derive(Default)]
pub struct IconLibrary {
    icons: HashMap<IconKind, Icon>,
}

impl IconLibrary {
    /// Load every icon, preferring `<directory>/<stem>.png` over the generated
    /// placeholder.
    pub fn load(device: &Arc<Device>, directory: Option<&Path>) -> EditorResult<Self> {
        let mut icons = HashMap::new();
        for kind in IconKind::ALL {
            let image = match directory.map(|dir| dir.join(format!("{}.png", kind.file_stem()))) {
                Some(path) if path.is_file() => image::open(&path)
                    .map_err(|source| EditorError::Icon {
                        path: path.display().to_string(),
                        source,
                    })?
                    .to_rgba8(),
                _ => placeholder(kind),
            };
            let texture = upload(device, &image, kind.file_stem())?;
            icons.insert(
                kind,
                Icon {
                    texture,
                    texture_id: None,
                },
            );
        }
        log::debug!("Loaded {} editor icons", icons.len());
        Ok(Self { icons })
    }

    pub fn get(&self, kind: IconKind) -> Option<&Icon> {
        self.icons.get(&kind)
    }

    pub fn texture_id(&self, kind: IconKind) -> Option<egui::TextureId> {
        self.icons.get(&kind).and_then(|icon| icon.texture_id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (IconKind, &mut Icon)> {
        self.icons.iter_mut().map(|(kind, icon)| (*kind, icon))
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }
}

/// Filled disc in the icon's color with a darker rim.
fn placeholder(kind: IconKind) -> RgbaImage {
    let color = kind.placeholder_color();
    let rim = [color[0] / 2, color[1] / 2, color[2] / 2, 255];
    let center = (ICON_SIZE as f32 - 1.0) * 0.5;
    let radius = ICON_SIZE as f32 * 0.45;
    RgbaImage::from_fn(ICON_SIZE, ICON_SIZE, |x, y| {
        let distance = ((x as f32 - center).powi(2) + (y as f32 - center).powi(2)).sqrt();
        if distance > radius {
            Rgba([0, 0, 0, 0])
        } else if distance > radius - 2.0 {
            Rgba(rim)
        } else {
            Rgba(color)
        }
    })
}

fn upload(device: &Arc<Device>, image: &RgbaImage, name: &str) -> EditorResult<Arc<Texture>> {
    let descriptor = TextureDescriptor::new_2d(
        image.width(),
        image.height(),
        TextureFormat::Rgba8Unorm,
        TextureFlags::SRV,
    )
    .with_label(format!("icon_{name}"));
    let pixels = image.as_raw().clone();
    Ok(Texture::with_data(
        device,
        descriptor,
        vec![TextureSlice::single(pixels)],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_transparent_outside_disc() {
        let image = placeholder(IconKind::Light);
        assert_eq!(image.dimensions(), (ICON_SIZE, ICON_SIZE));
        assert_eq!(image.get_pixel(0, 0).0[3], 0);
        let center = ICON_SIZE / 2;
        assert_eq!(
            image.get_pixel(center, center).0,
            IconKind::Light.placeholder_color()
        );
    }

    #[test]
    fn test_file_stems_unique() {
        let mut stems: Vec<_> = IconKind::ALL.iter().map(|k| k.file_stem()).collect();
        stems.sort_unstable();
        stems.dedup();
        assert_eq!(stems.len(), IconKind::ALL.len());
    }
}
