pub mod api;
mod num;
mod video;

pub use video::{
    BlendLevels, ClipPlane, GfxSet16, LineControl, MixControl, PivotLine, PlaneDepth,
    PlayfieldLine, RomGraphics, SpriteDescriptor, SpriteGroupLine, Tc0630fdp,
};
