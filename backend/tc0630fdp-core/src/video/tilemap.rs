//! Playfield, text, and pixel layer tile grids

use crate::num::GetBit;
use crate::video::Pixel;
use crate::video::gfx::{DynamicGraphics, PlaneDepth, RomGraphics};
use crate::video::memory::{PF_CELLS, PIXEL_CELLS, TEXT_CELLS, VideoRam};
use f3_config::PlayfieldAddressing;

const PLAYFIELD_HEIGHT_PIXELS: i32 = 32 * 16;
const TEXT_SIZE_PIXELS: u16 = 64 * 8;
const PIXEL_LAYER_WIDTH_PIXELS: u16 = 64 * 8;
const PIXEL_LAYER_HEIGHT_PIXELS: u16 = 32 * 8;

/// Pen mask for a playfield tile. The extra planes land on the same color index bits as the
/// low two palette code bits, so any plane whose palette bit is already set is masked off.
#[inline]
#[must_use]
pub fn pen_mask(extra_planes: u8, palette_code: u16) -> u8 {
    ((extra_planes & !(palette_code as u8) & 0x03) << 4) | 0x0F
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileInfo {
    pub tile: u16,
    pub palette: u16,
    pub depth: PlaneDepth,
    pub pen_mask: u8,
    pub flip_x: bool,
    pub flip_y: bool,
    pub blend_select: bool,
}

impl TileInfo {
    pub fn from_playfield_words(attributes: u16, tile: u16) -> Self {
        let palette = attributes.bits(0..=8);
        let extra_planes = attributes.bits(10..=11) as u8;

        Self {
            tile,
            palette,
            depth: PlaneDepth::from_extra_planes(extra_planes),
            pen_mask: pen_mask(extra_planes, palette),
            flip_x: attributes.bit(14),
            flip_y: attributes.bit(15),
            blend_select: attributes.bit(9),
        }
    }

    pub fn from_text_word(word: u16) -> Self {
        Self {
            tile: word.bits(0..=7),
            palette: word.bits(9..=14),
            depth: PlaneDepth::Low,
            pen_mask: 0x0F,
            flip_x: word.bit(8),
            flip_y: word.bit(15),
            blend_select: false,
        }
    }

    #[inline]
    fn pixel(self, pen: u8) -> Pixel {
        let pen = pen & self.pen_mask;
        if pen == 0 {
            return Pixel::TRANSPARENT;
        }

        let color = (self.palette << 4) | u16::from(pen);
        Pixel { color, opaque: true, blend_select: self.blend_select }
    }

    #[inline]
    fn element_index(self, x: u16, y: u16, size: u16) -> usize {
        let x = if self.flip_x { size - 1 - x } else { x };
        let y = if self.flip_y { size - 1 - y } else { y };
        usize::from(y * size + x)
    }
}

#[derive(Debug, Clone)]
pub struct Tilemaps {
    addressing: PlayfieldAddressing,
    playfield: Vec<TileInfo>,
    text: Vec<TileInfo>,
    pixel: Vec<TileInfo>,
}

impl Tilemaps {
    pub fn new(addressing: PlayfieldAddressing) -> Self {
        Self {
            addressing,
            playfield: vec![TileInfo::default(); PF_CELLS],
            text: vec![TileInfo::default(); TEXT_CELLS],
            pixel: vec![TileInfo::default(); PIXEL_CELLS],
        }
    }

    /// Re-derive every cell whose backing words were written since the last refresh.
    pub fn refresh(&mut self, ram: &mut VideoRam, pixel_scroll_y: u16) {
        let VideoRam { playfield, text, dirty_pf_cells, dirty_text_cells, dirty_pixel_cells, .. } =
            ram;

        let playfield_cells = dirty_pf_cells.drain(|cell| {
            self.playfield[cell] =
                TileInfo::from_playfield_words(playfield[2 * cell], playfield[2 * cell + 1]);
        });

        let text_cells = dirty_text_cells.drain(|cell| {
            self.text[cell] = TileInfo::from_text_word(text[cell]);
        });

        let pixel_cells = dirty_pixel_cells.drain(|cell| {
            let col = cell / 32;
            let row = cell % 32;

            // Lines scrolled into the lower half of the 512-line space read the second
            // half of text RAM for their palette and flip bits
            let scrolled_y = (row as u16 * 8).wrapping_add(pixel_scroll_y) & 0x1FF;
            let text_row = if scrolled_y >= 256 { row + 32 } else { row };

            let text_info = TileInfo::from_text_word(text[text_row * 64 + col]);
            self.pixel[cell] = TileInfo { tile: cell as u16, ..text_info };
        });

        if playfield_cells != 0 || text_cells != 0 || pixel_cells != 0 {
            log::trace!(
                "Refreshed {playfield_cells} playfield cells, {text_cells} text cells, {pixel_cells} pixel cells"
            );
        }
    }

    pub fn playfield_tile(&self, tilemap: usize, col: usize, row: usize) -> TileInfo {
        let addressing = self.addressing;
        let width = addressing.tilemap_width_tiles();
        // Two words per cell
        let base = (tilemap % addressing.tilemap_count()) * addressing.tilemap_len_words() / 2;
        self.playfield[base + row * width + col]
    }

    /// Sample a playfield tilemap at whole-pixel coordinates, wrapping at the map edges.
    pub fn playfield_pixel(&self, gfx: &RomGraphics, tilemap: usize, x: i32, y: i32) -> Pixel {
        let width_pixels = 16 * self.addressing.tilemap_width_tiles() as i32;
        let x = (x & (width_pixels - 1)) as u16;
        let y = (y & (PLAYFIELD_HEIGHT_PIXELS - 1)) as u16;

        let info = self.playfield_tile(tilemap, usize::from(x / 16), usize::from(y / 16));
        let Some(element) = gfx.tiles(info.depth).element(info.tile.into()) else {
            return Pixel::TRANSPARENT;
        };

        info.pixel(element[info.element_index(x % 16, y % 16, 16)])
    }

    pub fn text_pixel(&self, gfx: &DynamicGraphics, x: u16, y: u16) -> Pixel {
        let x = x % TEXT_SIZE_PIXELS;
        let y = y % TEXT_SIZE_PIXELS;

        let info = self.text[usize::from(y / 8) * 64 + usize::from(x / 8)];
        let element = gfx.char_element(info.tile);
        info.pixel(element[info.element_index(x % 8, y % 8, 8)])
    }

    pub fn pixel_layer_pixel(&self, gfx: &DynamicGraphics, x: u16, y: u16) -> Pixel {
        let x = x % PIXEL_LAYER_WIDTH_PIXELS;
        let y = y % PIXEL_LAYER_HEIGHT_PIXELS;

        // Column-major cells
        let info = self.pixel[usize::from(x / 8) * 32 + usize::from(y / 8)];
        let element = gfx.pivot_element(info.tile);
        info.pixel(element[info.element_index(x % 8, y % 8, 8)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RamRegion;
    use test_log::test;

    #[test]
    fn pen_mask_invariant() {
        assert_eq!(pen_mask(3, 0), 0x3F);
        assert_eq!(pen_mask(1, 0), 0x1F);
        assert_eq!(pen_mask(3, 0x001), 0x2F);
        assert_eq!(pen_mask(3, 0x1FF), 0x0F);
        for palette_code in 0..0x200 {
            assert_eq!(pen_mask(0, palette_code), 0x0F);
            for extra_planes in 0..4 {
                let expected = ((extra_planes & !(palette_code as u8)) << 4 | 0xF) & 0x3F;
                assert_eq!(pen_mask(extra_planes, palette_code), expected);
            }
        }
    }

    #[test]
    fn playfield_attribute_word() {
        let info = TileInfo::from_playfield_words(0xCE05, 0x1234);
        assert_eq!(info.tile, 0x1234);
        assert_eq!(info.palette, 0x005);
        assert!(info.blend_select);
        assert_eq!(info.depth, PlaneDepth::High);
        assert_eq!(info.pen_mask, 0x2F);
        assert!(info.flip_x);
        assert!(info.flip_y);
    }

    #[test]
    fn text_word() {
        let info = TileInfo::from_text_word(0x8000 | (0x2A << 9) | 0x0100 | 0x7F);
        assert_eq!(info.tile, 0x7F);
        assert_eq!(info.palette, 0x2A);
        assert!(info.flip_x);
        assert!(info.flip_y);
    }

    #[test]
    fn playfield_cells_track_writes() {
        let mut ram = VideoRam::new();
        let mut tilemaps = Tilemaps::new(PlayfieldAddressing::Standard);
        tilemaps.refresh(&mut ram, 0);

        // Tilemap 1, column 3, row 2
        let cell = 32 * 32 + 2 * 32 + 3;
        ram.write(RamRegion::Playfield, 2 * cell, 0x0007, 0xFFFF);
        ram.write(RamRegion::Playfield, 2 * cell + 1, 0x0042, 0xFFFF);
        assert_eq!(tilemaps.playfield_tile(1, 3, 2), TileInfo::default());

        tilemaps.refresh(&mut ram, 0);
        let info = tilemaps.playfield_tile(1, 3, 2);
        assert_eq!((info.tile, info.palette), (0x42, 7));

        ram.write(RamRegion::Playfield, 2 * cell + 1, 0x0043, 0xFFFF);
        tilemaps.refresh(&mut ram, 0);
        assert_eq!(tilemaps.playfield_tile(1, 3, 2).tile, 0x43);
    }

    #[test]
    fn extended_addressing_uses_wide_maps() {
        let mut ram = VideoRam::new();
        let mut tilemaps = Tilemaps::new(PlayfieldAddressing::Extended);

        // Tilemap 1 starts at word 0x1000; column 40, row 1
        let cell = 0x1000 / 2 + 64 + 40;
        ram.write(RamRegion::Playfield, 2 * cell + 1, 0x0099, 0xFFFF);
        tilemaps.refresh(&mut ram, 0);
        assert_eq!(tilemaps.playfield_tile(1, 40, 1).tile, 0x99);
    }

    #[test]
    fn pixel_layer_palette_page_follows_scroll() {
        let mut ram = VideoRam::new();
        let mut tilemaps = Tilemaps::new(PlayfieldAddressing::Standard);

        // Column 2: row 1 and row 33 carry different palettes
        ram.write(RamRegion::Text, 64 + 2, 0x01 << 9, 0xFFFF);
        ram.write(RamRegion::Text, 33 * 64 + 2, 0x02 << 9, 0xFFFF);

        tilemaps.refresh(&mut ram, 0);
        assert_eq!(tilemaps.pixel[2 * 32 + 1].palette, 1);
        assert_eq!(tilemaps.pixel[2 * 32 + 1].tile, 2 * 32 + 1);

        // Row 1 at y scroll 248 lands on line 256
        ram.dirty_pixel_cells.mark_all();
        tilemaps.refresh(&mut ram, 248);
        assert_eq!(tilemaps.pixel[2 * 32 + 1].palette, 2);
        assert_eq!(tilemaps.pixel[2 * 32].palette, 0);
    }
}
