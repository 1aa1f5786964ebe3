//! TC0630FDP scanline compositor

mod clip;
mod gfx;
mod lineram;
mod memory;
mod registers;
mod sprites;
mod tilemap;


use crate::api::{
    BlendMode, Color, ControlBank, LayerId, PALETTE_LEN, PixelTrace, RamRegion, SCREEN_WIDTH,
};
use crate::video::clip::resolve_clip_ranges;
use crate::video::gfx::DynamicGraphics;
use crate::video::memory::VideoRam;
use crate::video::registers::{ControlRegisters, NUM_PLAYFIELDS, NUM_SPRITE_GROUPS};
use crate::video::sprites::SpriteProcessor;
use crate::video::tilemap::Tilemaps;
use f3_config::{F3VideoConfig, LayerKind, PaletteFormat, PlayfieldAddressing};
use std::array;

pub use gfx::{GfxRomError, GfxSet16, PlaneDepth, RomGraphics};
pub use lineram::{LineControl, PivotLine, PlayfieldLine, SpriteGroupLine};
pub use registers::{BlendLevels, ClipPlane, MixControl};
pub use sprites::SpriteDescriptor;

const NUM_LAYERS: usize = 1 + NUM_SPRITE_GROUPS + NUM_PLAYFIELDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pixel {
    color: u16,
    opaque: bool,
    blend_select: bool,
}

impl Pixel {
    const TRANSPARENT: Self = Self { color: 0, opaque: false, blend_select: false };

    fn is_transparent(self) -> bool {
        !self.opaque
    }
}

#[derive(Debug, Clone, Copy)]
enum Layer {
    Pivot(PivotLine),
    SpriteGroup(u8, SpriteGroupLine),
    Playfield(u8, PlayfieldLine),
}

impl Layer {
    fn mix(self) -> MixControl {
        match self {
            Self::Pivot(pivot) => pivot.mix,
            Self::SpriteGroup(_, group) => group.mix,
            Self::Playfield(_, playfield) => playfield.mix,
        }
    }

    fn kind(self) -> LayerKind {
        match self {
            Self::Pivot(..) => LayerKind::Pivot,
            Self::SpriteGroup(..) => LayerKind::Sprites,
            Self::Playfield(..) => LayerKind::Playfields,
        }
    }

    fn index(self) -> u8 {
        match self {
            Self::Pivot(..) => 0,
            Self::SpriteGroup(i, _) | Self::Playfield(i, _) => i,
        }
    }

    fn id(self) -> LayerId {
        match self {
            Self::Pivot(..) => LayerId::Pivot,
            Self::SpriteGroup(i, _) => LayerId::SpriteGroup(i),
            Self::Playfield(i, _) => LayerId::Playfield(i),
        }
    }

    fn mosaic(self) -> bool {
        match self {
            Self::Pivot(pivot) => pivot.mosaic,
            Self::SpriteGroup(_, group) => group.mosaic,
            Self::Playfield(_, playfield) => playfield.mosaic,
        }
    }
}

/// Two-operand accumulator for one output column.
#[derive(Debug, Clone, Copy, Default)]
struct MixPixel {
    src: u16,
    src_level: u8,
    dst: u16,
    dst_level: u8,
    trace: PixelTrace,
}

impl MixPixel {
    fn background(palette_index: u16) -> Self {
        Self {
            src: palette_index,
            src_level: 8,
            dst: 0,
            dst_level: 0,
            trace: PixelTrace {
                src_layer: LayerId::Background,
                src_priority: 0,
                src_blend: BlendMode::Opaque,
                dst_layer: None,
                dst_priority: 0,
            },
        }
    }

    fn add(
        &mut self,
        color: u16,
        layer: LayerId,
        priority: u8,
        mode: BlendMode,
        levels: BlendLevels,
    ) {
        let (src_level, dst_level) = levels.for_mode(mode);

        let (dst, dst_layer, dst_priority) = match mode {
            BlendMode::Opaque => (0, None, 0),
            BlendMode::A | BlendMode::B => {
                (self.src, Some(self.trace.src_layer), self.trace.src_priority)
            }
        };

        *self = Self {
            src: color,
            src_level,
            dst,
            dst_level,
            trace: PixelTrace {
                src_layer: layer,
                src_priority: priority,
                src_blend: mode,
                dst_layer,
                dst_priority,
            },
        };
    }

    fn resolve(self, palette: &[u16], format: PaletteFormat) -> Color {
        let src = palette_color(palette, self.src, format);
        if self.dst_level == 0 && self.src_level == 8 {
            return src;
        }

        let dst = palette_color(palette, self.dst, format);
        let channel = |s: u8, d: u8| -> u8 {
            let src = u16::from(s) * u16::from(self.src_level);
            let dst = u16::from(d) * u16::from(self.dst_level);
            ((src + dst) / 8).min(255) as u8
        };
        Color::rgb(channel(src.r, dst.r), channel(src.g, dst.g), channel(src.b, dst.b))
    }
}

fn palette_color(palette: &[u16], index: u16, format: PaletteFormat) -> Color {
    let index = usize::from(index) & (PALETTE_LEN - 1);
    let Some(&word) = palette.get(index) else { return Color::BLACK };

    match format {
        PaletteFormat::Rgb444 => {
            let expand = |c: u16| {
                let c = (c & 0x0F) as u8;
                (c << 4) | c
            };
            Color::rgb(expand(word >> 8), expand(word >> 4), expand(word))
        }
        PaletteFormat::Rgb555 => {
            let expand = |c: u16| {
                let c = (c & 0x1F) as u8;
                (c << 3) | (c >> 2)
            };
            Color::rgb(expand(word >> 10), expand(word >> 5), expand(word))
        }
    }
}

#[derive(Debug, Clone)]
struct Buffers {
    mix: [MixPixel; SCREEN_WIDTH],
    trace: [PixelTrace; SCREEN_WIDTH],
}

impl Buffers {
    fn new() -> Self {
        Self {
            mix: array::from_fn(|_| MixPixel::default()),
            trace: array::from_fn(|_| PixelTrace::default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tc0630fdp {
    config: F3VideoConfig,
    ram: VideoRam,
    registers: ControlRegisters,
    rom_graphics: RomGraphics,
    dynamic_gfx: DynamicGraphics,
    tilemaps: Tilemaps,
    sprites: SpriteProcessor,
    buffers: Box<Buffers>,
}

impl Tc0630fdp {
    #[must_use]
    pub fn new(config: F3VideoConfig, rom_graphics: RomGraphics) -> Self {
        log::info!("Creating TC0630FDP with config:{config}");

        Self {
            config,
            ram: VideoRam::new(),
            registers: ControlRegisters::new(),
            rom_graphics,
            dynamic_gfx: DynamicGraphics::new(),
            tilemaps: Tilemaps::new(config.playfield_addressing),
            sprites: SpriteProcessor::new(),
            buffers: Box::new(Buffers::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> F3VideoConfig {
        self.config
    }

    #[must_use]
    pub fn read_ram(&self, region: RamRegion, offset: usize) -> u16 {
        self.ram.read(region, offset)
    }

    pub fn write_ram(&mut self, region: RamRegion, offset: usize, data: u16, mem_mask: u16) {
        self.ram.write(region, offset, data, mem_mask);
    }

    #[must_use]
    pub fn read_control(&self, bank: ControlBank, offset: usize) -> u16 {
        self.registers.read(bank, offset)
    }

    pub fn write_control(&mut self, bank: ControlBank, offset: usize, data: u16, mem_mask: u16) {
        if self.registers.write(bank, offset, data, mem_mask) {
            // Pixel layer palette pages depend on the Y scroll
            self.ram.dirty_pixel_cells.mark_all();
        }
    }

    /// Latch the sprite table for the next frame. Call once per frame after the last scanline.
    pub fn end_frame(&mut self) {
        self.sprites.end_frame(self.ram.sprite.as_slice(), &self.rom_graphics);
    }

    /// Composite one scanline and write its colors to `out`.
    ///
    /// `palette` is the externally owned palette RAM, one word per entry in the configured
    /// format. Columns past the end of `out` are not written.
    pub fn render_scanline(&mut self, line: u16, palette: &[u16], out: &mut [Color]) {
        self.dynamic_gfx.refresh(&mut self.ram);
        self.tilemaps.refresh(&mut self.ram, self.registers.pixel_scroll_y());

        let control = LineControl::latch(self.ram.line.as_slice(), &self.registers, line);

        self.buffers.mix.fill(MixPixel::background(control.background_palette));

        for layer in self.sorted_layers(&control) {
            let mix = layer.mix();
            if !mix.layer_enabled() {
                continue;
            }

            if let Layer::SpriteGroup(group, _) = layer
                && self.sprites.usage(group.into(), line.into()) == 0
            {
                continue;
            }

            let mosaic_width = if layer.mosaic() { control.mosaic_width } else { 1 };
            let layer_id = layer.id();
            let priority = mix.priority();

            for &(start, end) in resolve_clip_ranges(&control.clip_planes, mix).iter() {
                for x in start..=end {
                    let pixel = self.layer_pixel(layer, x - x % mosaic_width, line);
                    if pixel.is_transparent() {
                        continue;
                    }

                    let mode = if pixel.blend_select {
                        mix.blend_mode().swapped()
                    } else {
                        mix.blend_mode()
                    };
                    self.buffers.mix[usize::from(x)].add(
                        pixel.color,
                        layer_id,
                        priority,
                        mode,
                        control.blend_levels,
                    );
                }
            }
        }

        let Buffers { mix, trace } = &mut *self.buffers;
        for ((mixed, trace), out) in mix.iter().zip(trace.iter_mut()).zip(out) {
            *out = mixed.resolve(palette, self.config.palette_format);
            *trace = mixed.trace;
        }
    }

    // Bottom layer first
    fn sorted_layers(&self, control: &LineControl) -> [Layer; NUM_LAYERS] {
        let mut layers: [Layer; NUM_LAYERS] = array::from_fn(|i| match i {
            0 => Layer::Pivot(control.pivot),
            1..=NUM_SPRITE_GROUPS => {
                let group = i - 1;
                Layer::SpriteGroup(group as u8, control.sprite_groups[group])
            }
            _ => {
                let pf = i - 1 - NUM_SPRITE_GROUPS;
                Layer::Playfield(pf as u8, control.playfields[pf])
            }
        });

        let tie_order = self.config.tie_order;
        layers.sort_by_key(|&layer| {
            (layer.mix().priority(), tie_order.rank(layer.kind()), layer.index())
        });

        layers
    }

    fn layer_pixel(&self, layer: Layer, x: u16, line: u16) -> Pixel {
        match layer {
            Layer::Pivot(pivot) => {
                let x = x.wrapping_add(pivot.scroll_x);
                let y = line.wrapping_add(pivot.scroll_y);
                if pivot.uses_pixel_layer() {
                    self.tilemaps.pixel_layer_pixel(&self.dynamic_gfx, x, y)
                } else {
                    self.tilemaps.text_pixel(&self.dynamic_gfx, x, y)
                }
            }
            Layer::SpriteGroup(group, _) => {
                match self.sprites.group_pixel(group.into(), x.into(), line.into()) {
                    0 => Pixel::TRANSPARENT,
                    color => Pixel { color, opaque: true, blend_select: false },
                }
            }
            Layer::Playfield(pf, playfield) => {
                let tilemap = match self.config.playfield_addressing {
                    PlayfieldAddressing::Standard if playfield.alt_tilemap => pf + 4,
                    _ => pf,
                };

                let src_x = (playfield.origin_x + i32::from(x) * playfield.step_x) >> 8;
                let src_y = (playfield.origin_y + i32::from(line) * playfield.step_y) >> 8;
                let pixel =
                    self.tilemaps.playfield_pixel(&self.rom_graphics, tilemap.into(), src_x, src_y);
                if pixel.is_transparent() {
                    return pixel;
                }

                let color = pixel.color.wrapping_add(playfield.palette_add << 4) & 0x1FFF;
                Pixel { color, ..pixel }
            }
        }
    }

    /// Source and destination layers of each column of the last rendered scanline.
    #[must_use]
    pub fn priority_trace(&self) -> &[PixelTrace; SCREEN_WIDTH] {
        &self.buffers.trace
    }

    /// Bitmask of the priority sub-bands sprite group `group` drew on `line` this frame.
    #[must_use]
    pub fn sprite_usage(&self, group: usize, line: u16) -> u8 {
        if group >= NUM_SPRITE_GROUPS {
            return 0;
        }
        self.sprites.usage(group, line.into())
    }

    /// The sprite list currently on screen.
    #[must_use]
    pub fn sprite_descriptors(&self) -> &[SpriteDescriptor] {
        self.sprites.descriptors()
    }

    #[must_use]
    pub fn flip_screen(&self) -> bool {
        self.sprites.flip_screen()
    }

    #[must_use]
    pub fn line_control(&self, line: u16) -> LineControl {
        LineControl::latch(self.ram.line.as_slice(), &self.registers, line)
    }

    /// Clears the control registers and sprite buffers. RAM contents are kept.
    pub fn reset(&mut self) {
        log::info!("Resetting TC0630FDP");

        self.registers = ControlRegisters::new();
        self.sprites.reset();
        *self.buffers = Buffers::new();
        self.ram.dirty_pixel_cells.mark_all();
    }

    pub fn update_config(&mut self, config: F3VideoConfig) {
        if config.playfield_addressing != self.config.playfield_addressing {
            log::warn!(
                "Ignoring playfield addressing change from {} to {}; addressing is fixed at startup",
                self.config.playfield_addressing,
                config.playfield_addressing
            );
        }

        self.config = F3VideoConfig {
            playfield_addressing: self.config.playfield_addressing,
            ..config
        };
    }
}
