//! Tile-data store: the chip's RAM regions plus dirty tracking for everything derived from them

use crate::api::RamRegion;
use crate::num::combine_masked;

const SPRITE_RAM_LEN_WORDS: usize = 0x10000 / 2;
const PF_RAM_LEN_WORDS: usize = 0xC000 / 2;
const TEXT_RAM_LEN_WORDS: usize = 0x2000 / 2;
const CHAR_RAM_LEN_WORDS: usize = 0x2000 / 2;
const LINE_RAM_LEN_WORDS: usize = 0x10000 / 2;
const PIVOT_RAM_LEN_WORDS: usize = 0x10000 / 2;

// Writes at or above this offset do not touch any tilemap
pub const PF_TILEMAP_BOUND_WORDS: usize = 0x4000;

pub const PF_CELLS: usize = PF_TILEMAP_BOUND_WORDS / 2;
pub const TEXT_CELLS: usize = TEXT_RAM_LEN_WORDS;
pub const PIXEL_CELLS: usize = 64 * 32;

// 8x8 4bpp elements are 16 words each
pub const WORDS_PER_DYNAMIC_ELEMENT: usize = 16;
pub const CHAR_ELEMENTS: usize = CHAR_RAM_LEN_WORDS / WORDS_PER_DYNAMIC_ELEMENT;
pub const PIVOT_ELEMENTS: usize = PIVOT_RAM_LEN_WORDS / WORDS_PER_DYNAMIC_ELEMENT;

fn new_ram<const LEN: usize>() -> Box<[u16; LEN]> {
    vec![0; LEN].into_boxed_slice().try_into().unwrap()
}

// All region lengths are powers of two except playfield RAM
fn wrap_offset(len: usize, offset: usize) -> usize {
    if len.is_power_of_two() { offset & (len - 1) } else { offset % len }
}

/// Fixed-size bitset of cells or elements that need to be re-derived.
#[derive(Debug, Clone)]
pub struct DirtyBits {
    words: Vec<u64>,
    len: usize,
}

impl DirtyBits {
    /// Starts with every bit set so the first consumer derives everything.
    pub fn new_all_set(len: usize) -> Self {
        let mut bits = Self { words: vec![0; len.div_ceil(64)], len };
        bits.mark_all();
        bits
    }

    #[inline]
    pub fn mark(&mut self, i: usize) {
        debug_assert!(i < self.len);
        self.words[i / 64] |= 1 << (i % 64);
    }

    pub fn mark_all(&mut self) {
        self.words.fill(u64::MAX);
        let tail = self.len % 64;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last = (1 << tail) - 1;
            }
        }
    }

    #[cfg(test)]
    pub fn is_marked(&self, i: usize) -> bool {
        self.words[i / 64] & (1 << (i % 64)) != 0
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.words.iter().any(|&word| word != 0)
    }

    /// Calls `f` with every marked index in ascending order and clears them. Returns the count.
    pub fn drain(&mut self, mut f: impl FnMut(usize)) -> usize {
        let mut count = 0;
        for (word_idx, word) in self.words.iter_mut().enumerate() {
            while *word != 0 {
                let bit = word.trailing_zeros() as usize;
                *word &= *word - 1;
                f(word_idx * 64 + bit);
                count += 1;
            }
        }
        count
    }
}

#[derive(Debug, Clone)]
pub struct VideoRam {
    pub sprite: Box<[u16; SPRITE_RAM_LEN_WORDS]>,
    pub playfield: Box<[u16; PF_RAM_LEN_WORDS]>,
    pub text: Box<[u16; TEXT_RAM_LEN_WORDS]>,
    pub char: Box<[u16; CHAR_RAM_LEN_WORDS]>,
    pub line: Box<[u16; LINE_RAM_LEN_WORDS]>,
    pub pivot: Box<[u16; PIVOT_RAM_LEN_WORDS]>,
    pub dirty_pf_cells: DirtyBits,
    pub dirty_text_cells: DirtyBits,
    pub dirty_pixel_cells: DirtyBits,
    pub dirty_char_elements: DirtyBits,
    pub dirty_pivot_elements: DirtyBits,
}

impl VideoRam {
    pub fn new() -> Self {
        Self {
            sprite: new_ram(),
            playfield: new_ram(),
            text: new_ram(),
            char: new_ram(),
            line: new_ram(),
            pivot: new_ram(),
            dirty_pf_cells: DirtyBits::new_all_set(PF_CELLS),
            dirty_text_cells: DirtyBits::new_all_set(TEXT_CELLS),
            dirty_pixel_cells: DirtyBits::new_all_set(PIXEL_CELLS),
            dirty_char_elements: DirtyBits::new_all_set(CHAR_ELEMENTS),
            dirty_pivot_elements: DirtyBits::new_all_set(PIVOT_ELEMENTS),
        }
    }

    fn region(&self, region: RamRegion) -> &[u16] {
        match region {
            RamRegion::Sprite => self.sprite.as_slice(),
            RamRegion::Playfield => self.playfield.as_slice(),
            RamRegion::Text => self.text.as_slice(),
            RamRegion::Char => self.char.as_slice(),
            RamRegion::Line => self.line.as_slice(),
            RamRegion::Pivot => self.pivot.as_slice(),
        }
    }

    fn region_mut(&mut self, region: RamRegion) -> &mut [u16] {
        match region {
            RamRegion::Sprite => self.sprite.as_mut_slice(),
            RamRegion::Playfield => self.playfield.as_mut_slice(),
            RamRegion::Text => self.text.as_mut_slice(),
            RamRegion::Char => self.char.as_mut_slice(),
            RamRegion::Line => self.line.as_mut_slice(),
            RamRegion::Pivot => self.pivot.as_mut_slice(),
        }
    }

    pub fn read(&self, region: RamRegion, offset: usize) -> u16 {
        let ram = self.region(region);
        ram[wrap_offset(ram.len(), offset)]
    }

    pub fn write(&mut self, region: RamRegion, offset: usize, data: u16, mem_mask: u16) {
        let ram = self.region_mut(region);
        let offset = wrap_offset(ram.len(), offset);
        ram[offset] = combine_masked(ram[offset], data, mem_mask);

        match region {
            RamRegion::Playfield => {
                if offset < PF_TILEMAP_BOUND_WORDS {
                    self.dirty_pf_cells.mark(offset / 2);
                }
            }
            RamRegion::Text => {
                self.dirty_text_cells.mark(offset);

                // Both halves of text RAM share one pixel-layer cell
                let col = offset & 0x3F;
                let row = (offset >> 6) & 0x1F;
                self.dirty_pixel_cells.mark(col * 32 + row);
            }
            RamRegion::Char => {
                self.dirty_char_elements.mark(offset / WORDS_PER_DYNAMIC_ELEMENT);
            }
            RamRegion::Pivot => {
                self.dirty_pivot_elements.mark(offset / WORDS_PER_DYNAMIC_ELEMENT);
            }
            RamRegion::Sprite | RamRegion::Line => {}
        }
    }
}
