use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical orthogonal slicing orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plane {
    Axial,
    Coronal,
    Sagittal,
}

impl Plane {
    pub const ALL: [Plane; 3] = [Plane::Axial, Plane::Coronal, Plane::Sagittal];

    pub fn name(&self) -> &'static str {
        match self {
            Plane::Axial => "axial",
            Plane::Coronal => "coronal",
            Plane::Sagittal => "sagittal",
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where raw slice values are sampled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Processor {
    #[default]
    CPU,
    GPU,
}

/// Freehand drawing tool on the annotation surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pen,
    Highlighter,
    Eraser,
}

/// Color presets offered for overlays and drawing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetColor {
    #[default]
    Red,
    Yellow,
    Green,
    Blue,
}

impl PresetColor {
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            PresetColor::Red => [255, 0, 0],
            PresetColor::Yellow => [255, 255, 0],
            PresetColor::Green => [0, 255, 0],
            PresetColor::Blue => [0, 0, 255],
        }
    }
}
