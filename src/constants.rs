//! Global constants for fontchain
//!
//! Consolidates codepoint, kerning, and atlas limits
//! to eliminate magic numbers throughout the codebase.

// ============================================================================
// Codepoint Constants
// ============================================================================

/// Highest codepoint a font table can hold
pub const MAX_CODEPOINT: u32 = 0xFFFF;

/// Number of addressable codepoints (bits in the load-attempted set)
pub const CODEPOINT_COUNT: usize = 0x1_0000;

/// IndexLookup sentinel meaning "no glyph"
pub const NO_GLYPH: u16 = 0xFFFF;

/// Codepoints covered by one bit of the used-pages map
pub const CODEPOINTS_PER_PAGE: u32 = 4096;

// ============================================================================
// Kerning Constants
// ============================================================================

/// Run length at which kerning lookup switches from linear scan to bisection
/// (~5 bisection steps vs 32 comparisons)
pub const KERNING_BISECT_THRESHOLD: u32 = 32;

/// Side of the dense frequent-kerning matrix
pub const FREQUENT_KERNING_DIM: usize = 128;

// ============================================================================
// Atlas Constants
// ============================================================================

/// Maximum number of atlas textures (texture index must fit in 8 bits,
/// 255 itself is reserved)
pub const MAX_ATLAS_TEXTURES: usize = 255;

/// Texture index recorded on a glyph whose packing failed
pub const TEXTURE_INDEX_EXHAUSTED: u8 = 255;

/// Independent channel packers per channel-packed texture
pub const CHANNELS_PER_TEXTURE: usize = 4;

/// Bytes per atlas texel (BGRA8)
pub const BYTES_PER_TEXEL: usize = 4;

/// Byte offset inside a BGRA8 texel for channel 0..=3 (R, G, B, A)
pub const CHANNEL_BYTE_ORDER: [usize; CHANNELS_PER_TEXTURE] = [2, 1, 0, 3];

// ============================================================================
// Font Metric Constants
// ============================================================================

/// Baked font sizes are in points; multiply to get pixels
pub const POINTS_TO_PIXELS: f32 = 4.0 / 3.0;

/// Fallback glyph preference: geta mark, then dash, then space
pub const FALLBACK_CANDIDATES: [u16; 3] = [0x3013, b'-' as u16, b' ' as u16];

/// Ellipsis preference: horizontal ellipsis, then NEL
pub const ELLIPSIS_CANDIDATES: [u16; 2] = [0x2026, 0x0085];

/// Dot preference
pub const DOT_CANDIDATES: [u16; 1] = [b'.' as u16];

/// Space codepoint
pub const SPACE: u16 = b' ' as u16;
