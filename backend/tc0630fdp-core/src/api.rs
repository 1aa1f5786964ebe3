//! Public types shared by the compositor and its callers

use bincode::{Decode, Encode};
use std::fmt::{self, Display, Formatter};

pub use crate::video::GfxRomError;
pub use f3_config::{
    F3VideoConfig, LayerKind, LayerTieOrder, PaletteFormat, ParseConfigError, PlayfieldAddressing,
};

pub const SCREEN_WIDTH: usize = 320;
pub const SCREEN_HEIGHT: usize = 232;

pub const PALETTE_LEN: usize = 0x2000;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable, Encode, Decode)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0, 0, 0);

    #[must_use]
    #[inline]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

impl Default for Color {
    #[inline]
    fn default() -> Self {
        Self::BLACK
    }
}

/// The six word-addressed memories behind the chip's bus interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum RamRegion {
    Sprite,
    Playfield,
    Text,
    Char,
    Line,
    Pivot,
}

impl RamRegion {
    pub const ALL: [Self; 6] =
        [Self::Sprite, Self::Playfield, Self::Text, Self::Char, Self::Line, Self::Pivot];

    #[inline]
    #[must_use]
    pub fn len_words(self) -> usize {
        match self {
            Self::Sprite | Self::Line | Self::Pivot => 0x10000 / 2,
            Self::Playfield => 0xC000 / 2,
            Self::Text | Self::Char => 0x2000 / 2,
        }
    }
}

impl Display for RamRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sprite => "sprite RAM",
            Self::Playfield => "playfield RAM",
            Self::Text => "text RAM",
            Self::Char => "char RAM",
            Self::Line => "line RAM",
            Self::Pivot => "pivot RAM",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum ControlBank {
    // Playfield scroll
    Zero,
    // Pixel and text layer scroll
    One,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum BlendMode {
    #[default]
    Opaque,
    A,
    B,
}

/// Which layer supplied a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum LayerId {
    #[default]
    Background,
    Pivot,
    SpriteGroup(u8),
    Playfield(u8),
}

/// One column of the per-line priority/blend trace (`pri_alp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct PixelTrace {
    pub src_layer: LayerId,
    pub src_priority: u8,
    pub src_blend: BlendMode,
    pub dst_layer: Option<LayerId>,
    pub dst_priority: u8,
}
