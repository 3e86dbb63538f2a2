//! Font tables, atlas packing and font composition
//!
//! Handles:
//! - Dense glyph tables with kerning (table)
//! - Multi-channel atlas packing (atlas)
//! - Baked bitmap font import (baked)
//! - Lazy rasterization of system fonts (on_demand, system)
//! - Uniform rescaling (scaled)
//! - Font chains with per-range precedence (chain)
//! - Ownership of all of the above (collection)

pub mod atlas;
pub mod baked;
pub mod chain;
pub mod collection;
#[cfg(feature = "fontconfig")]
pub mod fontconfig;
pub mod on_demand;
pub mod scaled;
pub mod system;
pub mod table;

pub use atlas::{AtlasTexture, GammaTable, GlyphAtlas, NullTextureHost, Placement, TextureHost, TextureKind};
pub use baked::{import_baked, BakedFontDescription, BakedFontHeader, BakedGlyph, BakedKerning};
pub use chain::{ChainComposer, ChainEntry, CodepointRange, FontChain};
pub use collection::{Font, FontCollection, FontId, FontKind};
pub use on_demand::{GlyphBounds, GlyphMeasure, LineMetrics, OnDemandRasterizer, TextBackend};
pub use scaled::{scale_table, ScaleMode};
pub use system::FontdueBackend;
pub use table::{CodepointSet, FontMetrics, FontTable, GlyphRecord, HotData, KerningPair};
