//! Graphics element decoding for ROM tile/sprite sets and the RAM-defined char/pivot sets

use crate::video::memory::{CHAR_ELEMENTS, PIVOT_ELEMENTS, VideoRam, WORDS_PER_DYNAMIC_ELEMENT};
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

// 16x16 4bpp packed, 8 bytes per row
const LOW_PLANE_ELEMENT_LEN: usize = 128;
// 16x16 2bpp, 4 bytes per row
const HIGH_PLANE_ELEMENT_LEN: usize = 64;

pub type Element16 = [u8; 16 * 16];
pub type Element8 = [u8; 8 * 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxRomSet {
    Sprite,
    Tile,
}

impl Display for GfxRomSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sprite => write!(f, "sprite"),
            Self::Tile => write!(f, "tile"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GfxRomError {
    #[error("{set} low-plane ROM length {len} is not a multiple of 128 bytes")]
    LowPlaneLength { set: GfxRomSet, len: usize },
    #[error("{set} high-plane ROM is {actual} bytes, expected {expected} to match the low-plane ROM")]
    HighPlaneLength { set: GfxRomSet, expected: usize, actual: usize },
}

/// A decoded 16x16 graphics set, one pen per byte.
#[derive(Debug, Clone, Default)]
pub struct GfxSet16 {
    elements: Vec<Element16>,
}

impl GfxSet16 {
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Element numbers past the end of the set wrap around.
    #[inline]
    #[must_use]
    pub fn element(&self, code: u32) -> Option<&Element16> {
        if self.elements.is_empty() {
            return None;
        }

        Some(&self.elements[code as usize % self.elements.len()])
    }
}

/// Which of the two 16x16 sets a tile or sprite reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaneDepth {
    // 4bpp low planes only
    #[default]
    Low,
    // 5/6bpp merged planes
    High,
}

impl PlaneDepth {
    #[inline]
    #[must_use]
    pub fn from_extra_planes(extra_planes: u8) -> Self {
        if extra_planes == 0 { Self::Low } else { Self::High }
    }
}

/// The ROM-backed graphics sets, decoded once at startup.
#[derive(Debug, Clone, Default)]
pub struct RomGraphics {
    sprites: GfxSet16,
    sprites_merged: Option<GfxSet16>,
    tiles: GfxSet16,
    tiles_merged: Option<GfxSet16>,
}

impl RomGraphics {
    /// Decode the sprite and playfield tile ROMs.
    ///
    /// The high-plane ROMs are optional; without them 5bpp and 6bpp tiles and sprites
    /// read only their low 4 planes.
    ///
    /// # Errors
    ///
    /// Returns an error if a low-plane ROM is not a whole number of elements, or if a
    /// high-plane ROM does not hold exactly one high-plane element per low-plane element.
    pub fn decode(
        sprite_lo: &[u8],
        sprite_hi: Option<&[u8]>,
        tile_lo: &[u8],
        tile_hi: Option<&[u8]>,
    ) -> Result<Self, GfxRomError> {
        let sprites = decode_low_planes(GfxRomSet::Sprite, sprite_lo)?;
        let sprites_merged = sprite_hi
            .map(|rom| merge_high_planes(GfxRomSet::Sprite, &sprites, rom, sprite_high_planes))
            .transpose()?;

        let tiles = decode_low_planes(GfxRomSet::Tile, tile_lo)?;
        let tiles_merged = tile_hi
            .map(|rom| merge_high_planes(GfxRomSet::Tile, &tiles, rom, tile_high_planes))
            .transpose()?;

        log::info!(
            "Decoded {} sprite elements (high planes: {}) and {} tile elements (high planes: {})",
            sprites.len(),
            sprites_merged.is_some(),
            tiles.len(),
            tiles_merged.is_some()
        );

        Ok(Self { sprites, sprites_merged, tiles, tiles_merged })
    }

    #[inline]
    #[must_use]
    pub fn sprites(&self, depth: PlaneDepth) -> &GfxSet16 {
        match depth {
            PlaneDepth::Low => &self.sprites,
            PlaneDepth::High => self.sprites_merged.as_ref().unwrap_or(&self.sprites),
        }
    }

    #[inline]
    #[must_use]
    pub fn tiles(&self, depth: PlaneDepth) -> &GfxSet16 {
        match depth {
            PlaneDepth::Low => &self.tiles,
            PlaneDepth::High => self.tiles_merged.as_ref().unwrap_or(&self.tiles),
        }
    }
}

fn decode_low_planes(set: GfxRomSet, rom: &[u8]) -> Result<GfxSet16, GfxRomError> {
    if rom.len() % LOW_PLANE_ELEMENT_LEN != 0 {
        return Err(GfxRomError::LowPlaneLength { set, len: rom.len() });
    }

    let elements = rom
        .chunks_exact(LOW_PLANE_ELEMENT_LEN)
        .map(|chunk| {
            let mut element = [0; 16 * 16];
            for (i, &byte) in chunk.iter().enumerate() {
                // Left pixel in the low nibble
                element[2 * i] = byte & 0x0F;
                element[2 * i + 1] = byte >> 4;
            }
            element
        })
        .collect();

    Ok(GfxSet16 { elements })
}

fn merge_high_planes(
    set: GfxRomSet,
    low: &GfxSet16,
    rom: &[u8],
    high_planes: fn(&[u8], usize) -> u8,
) -> Result<GfxSet16, GfxRomError> {
    let expected = low.len() * HIGH_PLANE_ELEMENT_LEN;
    if rom.len() != expected {
        return Err(GfxRomError::HighPlaneLength { set, expected, actual: rom.len() });
    }

    let elements = low
        .elements
        .iter()
        .zip(rom.chunks_exact(HIGH_PLANE_ELEMENT_LEN))
        .map(|(low_element, chunk)| {
            let mut element = *low_element;
            for (y, row) in chunk.chunks_exact(4).enumerate() {
                for x in 0..16 {
                    let pixel = &mut element[16 * y + x];
                    *pixel = (*pixel & 0x0F) | (high_planes(row, x) & 0x30);
                }
            }
            element
        })
        .collect();

    Ok(GfxSet16 { elements })
}

// Returns pen bits 4-5 for pixel x of a 4-byte tile high-plane row
fn tile_high_planes(row: &[u8], x: usize) -> u8 {
    let (plane_4, plane_5) = if x < 8 { (row[0], row[1]) } else { (row[2], row[3]) };
    let shift = x % 8;
    (((plane_4 >> shift) & 1) << 4) | (((plane_5 >> shift) & 1) << 5)
}

// Returns pen bits 4-5 for pixel x of a 4-byte sprite high-plane row
fn sprite_high_planes(row: &[u8], x: usize) -> u8 {
    let byte = row[x / 4];
    ((byte >> (2 * (x % 4))) & 0x03) << 4
}

/// Char and pivot graphics, decoded from RAM one 8x8 element at a time.
#[derive(Debug, Clone)]
pub struct DynamicGraphics {
    chars: Vec<Element8>,
    pivot: Vec<Element8>,
}

impl DynamicGraphics {
    /// Starts blank; the first `refresh` decodes whatever RAM is marked dirty.
    pub fn new() -> Self {
        Self { chars: vec![[0; 8 * 8]; CHAR_ELEMENTS], pivot: vec![[0; 8 * 8]; PIVOT_ELEMENTS] }
    }

    /// Re-decode every element whose backing RAM was written since the last refresh.
    pub fn refresh(&mut self, ram: &mut VideoRam) {
        let VideoRam { char, pivot, dirty_char_elements, dirty_pivot_elements, .. } = ram;
        if !dirty_char_elements.any() && !dirty_pivot_elements.any() {
            return;
        }

        let chars = dirty_char_elements.drain(|i| {
            let words = &char[i * WORDS_PER_DYNAMIC_ELEMENT..(i + 1) * WORDS_PER_DYNAMIC_ELEMENT];
            self.chars[i] = decode_element_8(words);
        });

        let pivots = dirty_pivot_elements.drain(|i| {
            let words = &pivot[i * WORDS_PER_DYNAMIC_ELEMENT..(i + 1) * WORDS_PER_DYNAMIC_ELEMENT];
            self.pivot[i] = decode_element_8(words);
        });

        if chars != 0 || pivots != 0 {
            log::trace!("Re-decoded {chars} char elements and {pivots} pivot elements");
        }
    }

    #[inline]
    #[must_use]
    pub fn char_element(&self, tile: u16) -> &Element8 {
        &self.chars[usize::from(tile) % self.chars.len()]
    }

    #[inline]
    #[must_use]
    pub fn pivot_element(&self, tile: u16) -> &Element8 {
        &self.pivot[usize::from(tile) % self.pivot.len()]
    }
}

fn decode_element_8(words: &[u16]) -> Element8 {
    let mut element = [0; 8 * 8];
    for (y, row) in words.chunks_exact(2).enumerate() {
        let (w0, w1) = (row[0], row[1]);
        let pens = [
            w1 >> 8, w1 >> 12, w1, w1 >> 4,
            w0 >> 8, w0 >> 12, w0, w0 >> 4,
        ];
        for (x, pen) in pens.into_iter().enumerate() {
            element[8 * y + x] = (pen & 0x0F) as u8;
        }
    }
    element
}
