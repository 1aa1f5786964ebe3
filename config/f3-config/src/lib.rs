//! Configuration types for the TC0630FDP video compositor

use bincode::{Decode, Encode};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {type_name} value: '{value}'")]
pub struct ParseConfigError {
    type_name: &'static str,
    value: String,
}

macro_rules! config_enum_impls {
    ($name:ident, [$($variant:ident),+ $(,)?]) => {
        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => write!(f, stringify!($variant)),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case(stringify!($variant)) {
                        return Ok(Self::$variant);
                    }
                )+

                Err(ParseConfigError { type_name: stringify!($name), value: s.into() })
            }
        }
    };
}

/// Playfield RAM decode, fixed by the board at power-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum PlayfieldAddressing {
    // 8 tilemaps of 32x32 tiles, 4 displayed at a time
    #[default]
    Standard,
    // 4 tilemaps of 64x32 tiles
    Extended,
}

config_enum_impls!(PlayfieldAddressing, [Standard, Extended]);

impl PlayfieldAddressing {
    #[inline]
    #[must_use]
    pub fn tilemap_count(self) -> usize {
        match self {
            Self::Standard => 8,
            Self::Extended => 4,
        }
    }

    #[inline]
    #[must_use]
    pub fn tilemap_width_tiles(self) -> usize {
        match self {
            Self::Standard => 32,
            Self::Extended => 64,
        }
    }

    #[inline]
    #[must_use]
    pub fn tilemap_len_words(self) -> usize {
        // 2 words per cell, always 32 rows
        2 * 32 * self.tilemap_width_tiles()
    }
}

/// Color encoding of palette entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum PaletteFormat {
    // ----RRRRGGGGBBBB
    Rgb444,
    // -RRRRRGGGGGBBBBB
    #[default]
    Rgb555,
}

config_enum_impls!(PaletteFormat, [Rgb444, Rgb555]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum LayerKind {
    Pivot,
    Sprites,
    Playfields,
}

config_enum_impls!(LayerKind, [Pivot, Sprites, Playfields]);

/// Draw order between layer kinds that share a priority nibble, bottom first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "[LayerKind; 3]")
)]
pub struct LayerTieOrder([LayerKind; 3]);

impl LayerTieOrder {
    /// Returns `None` unless every layer kind appears exactly once.
    #[must_use]
    pub fn new(order: [LayerKind; 3]) -> Option<Self> {
        let is_permutation = LayerKind::ALL.iter().all(|kind| order.contains(kind));
        is_permutation.then_some(Self(order))
    }

    #[must_use]
    pub fn rank(self, kind: LayerKind) -> usize {
        self.0.iter().position(|&k| k == kind).unwrap_or(0)
    }

    #[must_use]
    pub fn kinds(self) -> [LayerKind; 3] {
        self.0
    }
}

impl Default for LayerTieOrder {
    fn default() -> Self {
        Self([LayerKind::Pivot, LayerKind::Sprites, LayerKind::Playfields])
    }
}

impl TryFrom<[LayerKind; 3]> for LayerTieOrder {
    type Error = ParseConfigError;

    fn try_from(order: [LayerKind; 3]) -> Result<Self, Self::Error> {
        Self::new(order).ok_or_else(|| {
            let [a, b, c] = order;
            ParseConfigError { type_name: "LayerTieOrder", value: format!("{a},{b},{c}") }
        })
    }
}

impl Display for LayerTieOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a},{b},{c}")
    }
}

impl FromStr for LayerTieOrder {
    type Err = ParseConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseConfigError { type_name: "LayerTieOrder", value: s.into() };

        let kinds: Vec<LayerKind> =
            s.split(',').map(|kind| kind.trim().parse()).collect::<Result<_, _>>()?;
        let order: [LayerKind; 3] = kinds.try_into().map_err(|_| err())?;

        Self::new(order).ok_or_else(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct F3VideoConfig {
    pub playfield_addressing: PlayfieldAddressing,
    pub palette_format: PaletteFormat,
    pub tie_order: LayerTieOrder,
}

impl Display for F3VideoConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "  playfield_addressing: {}", self.playfield_addressing)?;
        writeln!(f, "  palette_format: {}", self.palette_format)?;
        write!(f, "  tie_order: {}", self.tie_order)
    }
}
