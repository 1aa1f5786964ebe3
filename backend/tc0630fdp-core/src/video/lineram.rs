//! Per-scanline control latch
//!
//! Line RAM is split into sections of 256 words, one word per scanline:
//!
//! ```text
//! 0x2000-0x23FF  clip plane 0-3 low bits (left in bits 0-7, right in bits 8-15)
//! 0x2800         clip plane high bits (left bit 8 at 2n, right bit 8 at 2n+1)
//! 0x3000         sprite group blend bits (2 per group), pivot control in bits 8-15
//! 0x3100         blend levels (A src, B src, A dst, B dst)
//! 0x3200         mosaic (PF enables 0-3, size 4-7, sprites 8, pivot 9)
//! 0x3300         background palette index
//! 0x3800         pivot mix word
//! 0x3900         sprite mix word
//! 0x3A00         sprite group priorities
//! 0x4000-0x43FF  PF1-4 zoom (X in bits 0-7, Y in bits 8-15)
//! 0x4800-0x4BFF  PF1-4 palette add
//! 0x5000-0x53FF  PF1-4 row scroll
//! 0x5800-0x5BFF  PF1-4 mix word
//! 0x6000         PF1-4 alternate tilemap select
//! ```

use crate::num::GetBit;
use crate::video::registers::{
    BlendLevels, ClipPlane, ControlRegisters, MixControl, NUM_CLIP_PLANES, NUM_PLAYFIELDS,
    NUM_SPRITE_GROUPS,
};
use bincode::{Decode, Encode};
use std::array;

const SECTION_LEN: usize = 0x100;

const CLIP_LOW: usize = 0x2000;
const CLIP_HIGH: usize = 0x2800;
const SPRITE_BLEND_PIVOT_CONTROL: usize = 0x3000;
const BLEND_LEVELS: usize = 0x3100;
const MOSAIC: usize = 0x3200;
const BACKGROUND_PALETTE: usize = 0x3300;
const PIVOT_MIX: usize = 0x3800;
const SPRITE_MIX: usize = 0x3900;
const SPRITE_PRIORITY: usize = 0x3A00;
const PF_ZOOM: usize = 0x4000;
const PF_PALETTE_ADD: usize = 0x4800;
const PF_ROW_SCROLL: usize = 0x5000;
const PF_MIX: usize = 0x5800;
const PF_ALT_TILEMAP: usize = 0x6000;

// Sprite groups take clip and enable bits from the shared word
const SPRITE_SHARED_MIX_MASK: u16 = 0x3FF0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct PlayfieldLine {
    pub mix: MixControl,
    // 1/256 pixel
    pub origin_x: i32,
    pub origin_y: i32,
    pub step_x: i32,
    pub step_y: i32,
    pub palette_add: u16,
    pub alt_tilemap: bool,
    pub mosaic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct SpriteGroupLine {
    pub mix: MixControl,
    pub mosaic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct PivotLine {
    pub mix: MixControl,
    pub control: u8,
    pub mosaic: bool,
    pub scroll_x: u16,
    pub scroll_y: u16,
}

impl PivotLine {
    pub fn uses_pixel_layer(self) -> bool {
        self.control & 0xA0 != 0
    }
}

/// Everything needed to composite one scanline, latched before any pixel is drawn.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct LineControl {
    pub line: u16,
    pub clip_planes: [ClipPlane; NUM_CLIP_PLANES],
    pub pivot: PivotLine,
    pub sprite_groups: [SpriteGroupLine; NUM_SPRITE_GROUPS],
    pub playfields: [PlayfieldLine; NUM_PLAYFIELDS],
    pub blend_levels: BlendLevels,
    // Width in pixels of one mosaic block, 1 means no mosaic
    pub mosaic_width: u16,
    pub background_palette: u16,
}

impl LineControl {
    pub fn latch(line_ram: &[u16], registers: &ControlRegisters, line: u16) -> Self {
        let y = usize::from(line) % SECTION_LEN;
        let word = |section: usize| line_ram[section + y];

        let clip_high = word(CLIP_HIGH);
        let clip_planes = array::from_fn(|plane| {
            ClipPlane::from_words(word(CLIP_LOW + plane * SECTION_LEN), clip_high, plane)
        });

        let mosaic = word(MOSAIC);
        let sprite_blend_pivot = word(SPRITE_BLEND_PIVOT_CONTROL);

        let pivot = PivotLine {
            mix: MixControl(word(PIVOT_MIX)),
            control: sprite_blend_pivot.bits(8..=15) as u8,
            mosaic: mosaic.bit(9),
            scroll_x: 0,
            scroll_y: 0,
        };
        let (scroll_x, scroll_y) = if pivot.uses_pixel_layer() {
            (registers.pixel_scroll_x(), registers.pixel_scroll_y())
        } else {
            (registers.text_scroll_x(), registers.text_scroll_y())
        };
        let pivot = PivotLine { scroll_x, scroll_y, ..pivot };

        let sprite_mix = word(SPRITE_MIX) & SPRITE_SHARED_MIX_MASK;
        let sprite_priorities = word(SPRITE_PRIORITY);
        let sprite_groups = array::from_fn(|group| {
            let group_bits = group as u8;
            let priority = sprite_priorities.bits(4 * group_bits..=4 * group_bits + 3);
            let blend = sprite_blend_pivot.bits(2 * group_bits..=2 * group_bits + 1);
            SpriteGroupLine {
                mix: MixControl(sprite_mix | (blend << 14) | priority),
                mosaic: mosaic.bit(8),
            }
        });

        let alt_tilemaps = word(PF_ALT_TILEMAP);
        let playfields = array::from_fn(|pf| {
            let zoom = word(PF_ZOOM + pf * SECTION_LEN);
            let row_scroll = i32::from(word(PF_ROW_SCROLL + pf * SECTION_LEN)) << 2;
            PlayfieldLine {
                mix: MixControl(word(PF_MIX + pf * SECTION_LEN)),
                origin_x: registers.pf_scroll_x(pf) + row_scroll,
                origin_y: registers.pf_scroll_y(pf),
                step_x: 0x100 - i32::from(zoom.bits(0..=7)),
                step_y: 0x100 - i32::from(zoom.bits(8..=15)),
                palette_add: word(PF_PALETTE_ADD + pf * SECTION_LEN) & 0x1FF,
                alt_tilemap: alt_tilemaps.bit(pf as u8),
                mosaic: mosaic.bit(pf as u8),
            }
        });

        Self {
            line,
            clip_planes,
            pivot,
            sprite_groups,
            playfields,
            blend_levels: BlendLevels::from_word(word(BLEND_LEVELS)),
            mosaic_width: mosaic.bits(4..=7) + 1,
            background_palette: word(BACKGROUND_PALETTE) & 0x1FFF,
        }
    }
}
