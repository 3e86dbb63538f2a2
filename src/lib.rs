//! fontchain - glyph atlas and font composition engine
//!
//! Builds dense font tables for an immediate-mode GUI renderer and packs
//! their glyphs into shared BGRA8 atlas textures.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               FontCollection             │
//! ├──────────────────────────────────────────┤
//! │  Chain  →  Baked / OnDemand / Scaled     │
//! │                   ↓                      │
//! │        GlyphAtlas (4 channels/texture)   │
//! │                   ↓                      │
//! │        TextureHost (upload on change)    │
//! └──────────────────────────────────────────┘
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod font;

pub use config::Config;
pub use error::{FontError, Result};
pub use font::{
    ChainEntry, CodepointRange, FontChain, FontCollection, FontId, FontKind, FontTable, GlyphAtlas, GlyphRecord,
    ScaleMode, TextBackend, TextureHost,
};
