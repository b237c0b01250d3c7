//! Material definitions shared across formats

use serde::{Deserialize, Serialize};

/// Color and surface properties referenced by visual elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    /// Base color as normalized RGB.
    pub color: [f32; 3],
    /// Full RGBA when the source document carried an alpha channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rgba: Option<[f32; 4]>,
    /// Texture file reference, unresolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specular: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shininess: Option<f32>,
}

impl Material {
    /// Fallback color used when a document gives none.
    pub const DEFAULT_COLOR: [f32; 4] = [0.7, 0.7, 0.7, 1.0];

    pub fn new(name: impl Into<String>, color: [f32; 3]) -> Self {
        Self {
            name: name.into(),
            color,
            rgba: None,
            texture: None,
            specular: None,
            shininess: None,
        }
    }

    pub fn from_rgba(name: impl Into<String>, rgba: [f32; 4]) -> Self {
        Self {
            name: name.into(),
            color: [rgba[0], rgba[1], rgba[2]],
            rgba: Some(rgba),
            texture: None,
            specular: None,
            shininess: None,
        }
    }

    /// RGBA to render with: the explicit channel when present, otherwise
    /// the base color fully opaque.
    pub fn effective_rgba(&self) -> [f32; 4] {
        self.rgba
            .unwrap_or([self.color[0], self.color[1], self.color[2], 1.0])
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::from_rgba("default", Self::DEFAULT_COLOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_rgba_prefers_explicit() {
        let mat = Material::from_rgba("glass", [0.2, 0.4, 0.6, 0.5]);
        assert_eq!(mat.effective_rgba(), [0.2, 0.4, 0.6, 0.5]);
    }

    #[test]
    fn test_effective_rgba_falls_back_opaque() {
        let mat = Material::new("steel", [0.8, 0.8, 0.9]);
        assert_eq!(mat.effective_rgba(), [0.8, 0.8, 0.9, 1.0]);
    }
}
