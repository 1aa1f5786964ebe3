//! Sprite list scan and sprite group rasterization
//!
//! Sprite RAM holds two banks of 0x800 eight-word entries:
//!
//! ```text
//! word 0  tile code bits 0-15
//! word 1  X scale (bits 8-15), Y scale (bits 0-7); 0x80 is 1x
//! word 2  X position (bits 0-11), scroll commands and scroll opt-outs (bits 12-15)
//! word 3  Y position (bits 0-11), control entry flag (bit 15)
//! word 4  color (bits 0-7), flips (bits 8-9), block control (bits 10-15)
//! word 5  tile code bit 16, or the control word of a control entry
//! word 6  list jump (bit 15) and jump target (bits 0-9)
//! word 7  unused
//! ```

use crate::api::{SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::num::{GetBit, sign_extend_12};
use crate::video::gfx::{PlaneDepth, RomGraphics};
use crate::video::registers::NUM_SPRITE_GROUPS;
use bincode::{Decode, Encode};
use std::{array, mem};

pub const SPRITE_ENTRIES_PER_BANK: usize = 0x800;
const WORDS_PER_ENTRY: usize = 8;
const BANK_LEN_WORDS: usize = SPRITE_ENTRIES_PER_BANK * WORDS_PER_ENTRY;

const SPRITE_PALETTE_BASE: u16 = 0x1000;

const GROUP_BUFFER_LEN: usize = SCREEN_WIDTH * SCREEN_HEIGHT;

type GroupBuffer = Box<[u16; GROUP_BUFFER_LEN]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct SpriteDescriptor {
    pub tile: u32,
    pub color: u8,
    pub flip_x: bool,
    pub flip_y: bool,
    // 1/256 pixel
    pub x: i32,
    pub y: i32,
    pub scale_x: u16,
    pub scale_y: u16,
    pub priority: u8,
}

impl SpriteDescriptor {
    #[must_use]
    pub fn group(self) -> usize {
        usize::from(self.color >> 6)
    }

    fn sub_band(self) -> u8 {
        (self.color >> 3) & 0x07
    }

    // 1/256 pixel; 16 pixels at scale 0x80
    fn width(self) -> i32 {
        i32::from(self.scale_x) << 5
    }

    fn height(self) -> i32 {
        i32::from(self.scale_y) << 5
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BlockAnchor {
    x: i32,
    y: i32,
    color: u8,
    flip_x: bool,
    flip_y: bool,
    scale_x: u16,
    scale_y: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Continuation {
    #[default]
    None,
    Right,
    NextRow,
}

#[derive(Debug, Clone, Default)]
struct ScanState {
    global_x: i32,
    global_y: i32,
    subglobal_x: i32,
    subglobal_y: i32,
    anchor: BlockAnchor,
    continuation: Continuation,
    last_x: i32,
    last_y: i32,
    last_width: i32,
    last_height: i32,
}

impl ScanState {
    fn apply_scroll_command(&mut self, words: &[u16; WORDS_PER_ENTRY]) {
        let x = sign_extend_12(words[2]);
        let y = sign_extend_12(words[3]);

        match words[2].bits(12..=15) {
            0xA => {
                (self.global_x, self.global_y) = (x, y);
                log::trace!("Sprite global scroll: ({x}, {y})");
            }
            0x5 => {
                (self.subglobal_x, self.subglobal_y) = (x, y);
                log::trace!("Sprite sub-global scroll: ({x}, {y})");
            }
            0xB => {
                (self.subglobal_x, self.subglobal_y) = (x, y);
                (self.global_x, self.global_y) = (x, y);
                log::trace!("Sprite global and sub-global scroll: ({x}, {y})");
            }
            _ => {}
        }
    }

    fn place_sprite(&mut self, words: &[u16; WORDS_PER_ENTRY]) -> Option<SpriteDescriptor> {
        let attributes = words[4];

        let (color, flip_x, flip_y, scale_x, scale_y) = if attributes.bit(10) {
            let anchor = self.anchor;
            (anchor.color, anchor.flip_x, anchor.flip_y, anchor.scale_x, anchor.scale_y)
        } else {
            (
                attributes.bits(0..=7) as u8,
                attributes.bit(8),
                attributes.bit(9),
                words[1].bits(8..=15),
                words[1].bits(0..=7),
            )
        };

        let (x, y) = match self.continuation {
            Continuation::Right => (self.last_x + self.last_width, self.last_y),
            Continuation::NextRow => (self.anchor.x, self.last_y + self.last_height),
            Continuation::None => {
                let (scroll_x, scroll_y) = if words[2].bit(15) {
                    (0, 0)
                } else if words[2].bit(14) {
                    (self.global_x, self.global_y)
                } else {
                    (self.global_x + self.subglobal_x, self.global_y + self.subglobal_y)
                };

                let x = sign_extend_12(words[2]) + scroll_x;
                let y = sign_extend_12(words[3]) + scroll_y;
                (x << 8, y << 8)
            }
        };

        if attributes.bit(11) {
            self.anchor = BlockAnchor { x, y, color, flip_x, flip_y, scale_x, scale_y };
        }

        self.continuation = if attributes.bit(14) {
            Continuation::Right
        } else if attributes.bit(15) {
            Continuation::NextRow
        } else {
            Continuation::None
        };

        let sprite = SpriteDescriptor {
            tile: u32::from(words[0]) | (u32::from(words[5].bit(0)) << 16),
            color,
            flip_x,
            flip_y,
            x,
            y,
            scale_x,
            scale_y,
            priority: color >> 4,
        };

        self.last_x = x;
        self.last_y = y;
        self.last_width = sprite.width();
        self.last_height = sprite.height();

        // Blank entries still advance block positioning
        (sprite.tile != 0 && scale_x != 0 && scale_y != 0).then_some(sprite)
    }
}

#[derive(Debug, Clone)]
pub struct SpriteProcessor {
    // Double buffered: the front list is the one currently on screen
    lists: [Vec<SpriteDescriptor>; 2],
    front: usize,
    bank: bool,
    extra_planes: u8,
    flip_screen: bool,
    groups: [GroupBuffer; NUM_SPRITE_GROUPS],
    usage: [[u8; SCREEN_HEIGHT]; NUM_SPRITE_GROUPS],
}

impl SpriteProcessor {
    pub fn new() -> Self {
        Self {
            lists: [Vec::new(), Vec::new()],
            front: 0,
            bank: false,
            extra_planes: 0,
            flip_screen: false,
            groups: array::from_fn(|_| {
                vec![0; GROUP_BUFFER_LEN].into_boxed_slice().try_into().unwrap()
            }),
            usage: [[0; SCREEN_HEIGHT]; NUM_SPRITE_GROUPS],
        }
    }

    pub fn reset(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
        for buffer in &mut self.groups {
            buffer.fill(0);
        }
        self.usage = [[0; SCREEN_HEIGHT]; NUM_SPRITE_GROUPS];
        self.bank = false;
        self.extra_planes = 0;
        self.flip_screen = false;
    }

    /// Build the next frame's sprite list from sprite RAM, put it on screen, and redraw the groups.
    pub fn end_frame(&mut self, sprite_ram: &[u16], gfx: &RomGraphics) {
        let back = self.front ^ 1;

        let mut list = mem::take(&mut self.lists[back]);
        list.clear();
        self.scan(sprite_ram, &mut list);
        self.lists[back] = list;

        self.front = back;
        self.rasterize(gfx);
    }

    fn scan(&mut self, sprite_ram: &[u16], list: &mut Vec<SpriteDescriptor>) {
        let bank = self.bank;
        let base = if bank { BANK_LEN_WORDS } else { 0 };

        let mut state = ScanState::default();
        let mut entry = 0;
        let mut terminated = false;
        for _ in 0..SPRITE_ENTRIES_PER_BANK {
            let offset = base + entry * WORDS_PER_ENTRY;
            let words: [u16; WORDS_PER_ENTRY] = array::from_fn(|i| sprite_ram[offset + i]);

            let jump = words[6].bit(15).then(|| usize::from(words[6].bits(0..=9)));
            if jump == Some(entry) {
                // Jump to self marks the end of the list
                terminated = true;
                break;
            }

            if words[3].bit(15) {
                let control = words[5];
                self.bank = control.bit(0);
                self.extra_planes = control.bits(8..=9) as u8;
                self.flip_screen = control.bit(13);
                log::trace!("Sprite control entry {entry:03X}: {control:04X}");
            }

            state.apply_scroll_command(&words);
            list.extend(state.place_sprite(&words));

            entry = jump.unwrap_or(entry + 1);
            if entry == SPRITE_ENTRIES_PER_BANK {
                terminated = true;
                break;
            }
        }

        if !terminated {
            log::warn!(
                "Sprite list in bank {} did not end within {SPRITE_ENTRIES_PER_BANK} entries",
                u8::from(bank)
            );
        }

        log::debug!("Built sprite list with {} sprites from bank {}", list.len(), u8::from(bank));
    }

    fn rasterize(&mut self, gfx: &RomGraphics) {
        for buffer in &mut self.groups {
            buffer.fill(0);
        }
        self.usage = [[0; SCREEN_HEIGHT]; NUM_SPRITE_GROUPS];

        let set = gfx.sprites(PlaneDepth::from_extra_planes(self.extra_planes));
        let pen_mask = (self.extra_planes << 4) | 0x0F;

        // Earlier list entries draw over later ones
        for &sprite in self.lists[self.front].iter().rev() {
            let Some(element) = set.element(sprite.tile) else { continue };

            let group = sprite.group();
            let (width, height) = (sprite.width(), sprite.height());
            let (x_start, x_end) = pixel_span(sprite.x, width, SCREEN_WIDTH);
            let (y_start, y_end) = pixel_span(sprite.y, height, SCREEN_HEIGHT);

            for py in y_start..y_end {
                let row = source_texel(py, sprite.y, height, sprite.flip_y);
                let mut drawn = false;

                for px in x_start..x_end {
                    let col = source_texel(px, sprite.x, width, sprite.flip_x);
                    let pen = element[16 * row + col] & pen_mask;
                    if pen == 0 {
                        continue;
                    }

                    self.groups[group][py * SCREEN_WIDTH + px] =
                        SPRITE_PALETTE_BASE | (u16::from(sprite.color) << 4) | u16::from(pen);
                    drawn = true;
                }

                if drawn {
                    self.usage[group][py] |= 1 << sprite.sub_band();
                }
            }
        }
    }

    /// Palette index of the sprite pixel at this position, or 0 if transparent.
    #[inline]
    pub fn group_pixel(&self, group: usize, x: usize, line: usize) -> u16 {
        if line >= SCREEN_HEIGHT || x >= SCREEN_WIDTH {
            return 0;
        }
        self.groups[group][line * SCREEN_WIDTH + x]
    }

    pub fn usage(&self, group: usize, line: usize) -> u8 {
        self.usage[group].get(line).copied().unwrap_or(0)
    }

    pub fn descriptors(&self) -> &[SpriteDescriptor] {
        &self.lists[self.front]
    }

    pub fn flip_screen(&self) -> bool {
        self.flip_screen
    }
}

// Screen pixels whose left edge lies within [start, start + len), all in 1/256 pixel
fn pixel_span(start: i32, len: i32, limit: usize) -> (usize, usize) {
    let first = (start + 0xFF).div_euclid(0x100).clamp(0, limit as i32);
    let end = (start + len + 0xFF).div_euclid(0x100).clamp(first, limit as i32);
    (first as usize, end as usize)
}

fn source_texel(pixel: usize, start: i32, len: i32, flip: bool) -> usize {
    let offset = ((pixel as i32) << 8) - start;
    let texel = (offset * 16 / len).clamp(0, 15) as usize;
    if flip { 15 - texel } else { texel }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    struct SpriteRam(Vec<u16>);

    impl SpriteRam {
        fn new() -> Self {
            Self(vec![0; 2 * BANK_LEN_WORDS])
        }

        fn set(&mut self, bank: usize, entry: usize, words: [u16; 8]) {
            let offset = bank * BANK_LEN_WORDS + entry * WORDS_PER_ENTRY;
            self.0[offset..offset + WORDS_PER_ENTRY].copy_from_slice(&words);
        }

        fn end_list(&mut self, bank: usize, entry: usize) {
            self.set(bank, entry, [0, 0, 0, 0, 0, 0, 0x8000 | entry as u16, 0]);
        }
    }

    fn solid_sprite_gfx() -> RomGraphics {
        // Element 1 is solid pen 1, element 2 is transparent on its left half
        let mut rom = vec![0x00; 128];
        rom.extend([0x11; 128]);
        rom.extend((0..128).map(|i| if i % 8 < 4 { 0x00 } else { 0x22 }));
        RomGraphics::decode(&rom, None, &[], None).unwrap()
    }

    fn sprite(tile: u16, x: u16, y: u16, color: u8) -> [u16; 8] {
        [tile, 0x8080, x, y, color.into(), 0, 0, 0]
    }

    #[test]
    fn scan_builds_descriptors_until_end_marker() {
        let mut ram = SpriteRam::new();
        ram.set(0, 0, [0x1234, 0x8040, 10, 0xFFF, 0x0345, 0x0001, 0, 0]);
        ram.end_list(0, 1);
        ram.set(0, 2, sprite(5, 0, 0, 0));

        let mut sprites = SpriteProcessor::new();
        sprites.end_frame(&ram.0, &RomGraphics::default());

        assert_eq!(
            sprites.descriptors(),
            &[SpriteDescriptor {
                tile: 0x11234,
                color: 0x45,
                flip_x: true,
                flip_y: true,
                x: 10 << 8,
                y: -1 << 8,
                scale_x: 0x80,
                scale_y: 0x40,
                priority: 0x4,
            }]
        );
        assert_eq!(sprites.descriptors()[0].group(), 1);
    }

    #[test]
    fn jumps_skip_entries() {
        let mut ram = SpriteRam::new();
        ram.set(0, 0, [1, 0x8080, 0, 0, 0, 0, 0x8005, 0]);
        ram.set(0, 1, sprite(2, 0, 0, 0));
        ram.set(0, 5, sprite(3, 0, 0, 0));
        ram.end_list(0, 6);

        let mut sprites = SpriteProcessor::new();
        sprites.end_frame(&ram.0, &RomGraphics::default());

        let tiles: Vec<_> = sprites.descriptors().iter().map(|sprite| sprite.tile).collect();
        assert_eq!(tiles, vec![1, 3]);
    }

    #[test]
    fn jump_cycle_is_bounded() {
        let mut ram = SpriteRam::new();
        ram.set(0, 0, [1, 0x8080, 0, 0, 0, 0, 0x8001, 0]);
        ram.set(0, 1, [2, 0x8080, 0, 0, 0, 0, 0x8000, 0]);

        let mut sprites = SpriteProcessor::new();
        sprites.end_frame(&ram.0, &RomGraphics::default());
        assert_eq!(sprites.descriptors().len(), SPRITE_ENTRIES_PER_BANK);
    }

    #[test]
    fn scroll_commands() {
        let mut ram = SpriteRam::new();
        // Global scroll (16, 8), then sub-global (1, 2)
        ram.set(0, 0, [0, 0, 0xA010, 0x008, 0, 0, 0, 0]);
        ram.set(0, 1, [0, 0, 0x5001, 0x002, 0, 0, 0, 0]);
        ram.set(0, 2, sprite(1, 4, 4, 0));
        // Ignore sub-global
        ram.set(0, 3, sprite(2, 0x4004, 4, 0));
        // Ignore both
        ram.set(0, 4, sprite(3, 0x8004, 4, 0));
        ram.end_list(0, 5);

        let mut sprites = SpriteProcessor::new();
        sprites.end_frame(&ram.0, &RomGraphics::default());

        let positions: Vec<_> =
            sprites.descriptors().iter().map(|sprite| (sprite.x >> 8, sprite.y >> 8)).collect();
        assert_eq!(positions, vec![(21, 14), (20, 12), (4, 4)]);
    }

    #[test]
    fn block_continuation() {
        let mut ram = SpriteRam::new();
        // Anchor at (32, 48) at half scale, next sprite to the right
        ram.set(0, 0, [1, 0x4040, 32, 48, 0x4800 | 0x05, 0, 0, 0]);
        // Locked to the anchor, next sprite on the next row
        ram.set(0, 1, [2, 0, 0, 0, 0x8400, 0, 0, 0]);
        // Unlocked, keeps its own scale and color
        ram.set(0, 2, [3, 0x8080, 0, 0, 0x0007, 0, 0, 0]);
        ram.end_list(0, 3);

        let mut sprites = SpriteProcessor::new();
        sprites.end_frame(&ram.0, &RomGraphics::default());

        let list = sprites.descriptors();
        assert_eq!(list.len(), 3);
        assert_eq!((list[1].x, list[1].y), (40 << 8, 48 << 8));
        assert_eq!((list[1].color, list[1].scale_x), (0x05, 0x40));
        assert_eq!((list[2].x, list[2].y), (32 << 8, 56 << 8));
        assert_eq!((list[2].color, list[2].scale_x), (0x07, 0x80));
    }

    #[test]
    fn control_entry_selects_bank_for_next_scan() {
        let mut ram = SpriteRam::new();
        ram.set(0, 0, [0, 0, 0, 0x8000, 0, 0x2001, 0, 0]);
        ram.set(0, 1, sprite(1, 0, 0, 0));
        ram.end_list(0, 2);
        ram.set(1, 0, sprite(9, 0, 0, 0));
        ram.end_list(1, 1);

        let mut sprites = SpriteProcessor::new();
        sprites.end_frame(&ram.0, &RomGraphics::default());
        assert_eq!(sprites.descriptors()[0].tile, 1);
        assert!(sprites.flip_screen());

        sprites.end_frame(&ram.0, &RomGraphics::default());
        assert_eq!(sprites.descriptors()[0].tile, 9);
    }

    #[test]
    fn rasterize_scaled_sprite() {
        let mut ram = SpriteRam::new();
        // Half size at (10, 20), color 0x48 is group 1, sub-band 1
        ram.set(0, 0, [1, 0x4040, 10, 20, 0x48, 0, 0, 0]);
        ram.end_list(0, 1);

        let mut sprites = SpriteProcessor::new();
        sprites.end_frame(&ram.0, &solid_sprite_gfx());

        assert_eq!(sprites.group_pixel(1, 9, 20), 0);
        assert_eq!(sprites.group_pixel(1, 10, 20), 0x1000 | 0x480 | 1);
        assert_eq!(sprites.group_pixel(1, 17, 27), 0x1481);
        assert_eq!(sprites.group_pixel(1, 18, 20), 0);
        assert_eq!(sprites.group_pixel(1, 10, 28), 0);
        assert_eq!(sprites.group_pixel(0, 10, 20), 0);

        assert_eq!(sprites.usage(1, 20), 0b10);
        assert_eq!(sprites.usage(1, 28), 0);
        assert_eq!(sprites.usage(0, 20), 0);
    }

    #[test]
    fn flips_and_transparency() {
        let mut ram = SpriteRam::new();
        // Element 2 draws only its right half; flipped it draws only its left half
        ram.set(0, 0, [2, 0x8080, 0, 0, 0x0100, 0, 0, 0]);
        ram.set(0, 1, [2, 0x8080, 100, 0, 0x0000, 0, 0, 0]);
        ram.end_list(0, 2);

        let mut sprites = SpriteProcessor::new();
        sprites.end_frame(&ram.0, &solid_sprite_gfx());

        assert_eq!(sprites.group_pixel(0, 0, 0), 0x1002);
        assert_eq!(sprites.group_pixel(0, 8, 0), 0);
        assert_eq!(sprites.group_pixel(0, 100, 0), 0);
        assert_eq!(sprites.group_pixel(0, 108, 0), 0x1002);
    }

    #[test]
    fn earlier_sprites_draw_on_top() {
        let mut ram = SpriteRam::new();
        ram.set(0, 0, sprite(1, 0, 0, 0x01));
        ram.set(0, 1, sprite(1, 8, 0, 0x02));
        ram.end_list(0, 2);

        let mut sprites = SpriteProcessor::new();
        sprites.end_frame(&ram.0, &solid_sprite_gfx());

        assert_eq!(sprites.group_pixel(0, 8, 0), 0x1011);
        assert_eq!(sprites.group_pixel(0, 16, 0), 0x1021);
    }

    #[test]
    fn sprites_clip_at_screen_edges() {
        let mut ram = SpriteRam::new();
        // X = -8
        ram.set(0, 0, sprite(1, 0xFF8, 0, 0));
        ram.end_list(0, 1);

        let mut sprites = SpriteProcessor::new();
        sprites.end_frame(&ram.0, &solid_sprite_gfx());

        assert_eq!(sprites.group_pixel(0, 0, 0), 0x1001);
        assert_eq!(sprites.group_pixel(0, 7, 0), 0x1001);
        assert_eq!(sprites.group_pixel(0, 8, 0), 0);
    }
}
