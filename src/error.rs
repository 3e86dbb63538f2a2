//! Engine error type

use thiserror::Error;

/// Errors surfaced by font construction and glyph loading.
///
/// A glyph missing from its source is not an error; it is recorded in the
/// font's load-attempted set and rendered through the fallback glyph.
#[derive(Debug, Error)]
pub enum FontError {
    /// The atlas would need more textures than the texture index can address
    #[error("atlas exhausted: no supported texture beyond {max} textures")]
    AtlasExhausted { max: usize },

    /// A glyph bitmap is larger than an empty atlas texture
    #[error("glyph U+{codepoint:04X} ({width}x{height}) does not fit in a {texture_width}x{texture_height} texture")]
    GlyphTooLarge {
        codepoint: u16,
        width: u32,
        height: u32,
        texture_width: u32,
        texture_height: u32,
    },

    /// The glyph array reached the IndexLookup sentinel
    #[error("glyph table is full")]
    GlyphTableFull,

    /// A named system font family could not be found
    #[error("font family not found: {0}")]
    FamilyNotFound(String),

    /// Font data could not be parsed by the backend
    #[error("failed to load font: {0}")]
    InvalidFont(String),

    /// A baked glyph refers to a texture file with no registered atlas texture
    #[error("baked texture file {0} has no registered atlas texture")]
    UnmappedTexture(u16),

    /// Pixel data handed to the atlas does not match the texture dimensions
    #[error("texture data is {actual} bytes, expected {expected}")]
    TextureSize { expected: usize, actual: usize },

    /// A chain was declared without entries
    #[error("font chain cannot be empty")]
    EmptyChain,

    /// Chain entries and sub-fonts are not paired 1:1
    #[error("font chain has {entries} entries but {sources} sub-fonts")]
    ChainArity { entries: usize, sources: usize },

    /// A font id does not name a font of the collection
    #[error("unknown font id {0}")]
    UnknownFont(usize),

    /// A font id names a font that cannot be used in this position
    #[error("font id {0} cannot be used as a sub-font here")]
    InvalidSubFont(usize),

    /// Scale factor was zero, negative, or not finite
    #[error("invalid scale factor {0}")]
    InvalidScale(f32),

    /// Requested pixel size was zero, negative, or not finite
    #[error("invalid font size {0}")]
    InvalidSize(f32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, FontError>;
