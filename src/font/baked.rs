//! Baked bitmap fonts
//!
//! Converts an already-parsed bitmap font description (glyph boxes inside
//! pre-rendered textures plus kerning) into a `FontTable`. No rasterization and
//! no packing: UVs come straight from the baked boxes, textures are registered
//! with the atlas beforehand and passed in as a file-index -> atlas-index map.

use log::{debug, info};

use crate::constants::{
    CHANNELS_PER_TEXTURE, DOT_CANDIDATES, ELLIPSIS_CANDIDATES, FALLBACK_CANDIDATES, MAX_CODEPOINT,
    POINTS_TO_PIXELS,
};
use crate::error::{FontError, Result};
use crate::font::table::{FontTable, GlyphRecord};

/// Font-wide values of a baked description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BakedFontHeader {
    /// Nominal size in points
    pub size: f32,
    /// Pixels above the baseline
    pub ascent: f32,
    /// Pixels below the baseline
    pub descent: f32,
    pub texture_width: u32,
    pub texture_height: u32,
}

/// One glyph box inside a baked texture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BakedGlyph {
    pub codepoint: u32,
    pub advance_width: f32,
    /// Which baked texture file holds the box
    pub texture_file_index: u16,
    /// Colour channel (0..=3) of the box; anything else means unpacked
    pub channel_index: u8,
    /// Texel origin of the box
    pub offset_x: u16,
    pub offset_y: u16,
    pub bounding_width: u16,
    pub bounding_height: u16,
    /// Vertical position of the box relative to the line top
    pub layout_offset_y: f32,
}

/// Advance adjustment between two baked codepoints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BakedKerning {
    pub left: u32,
    pub right: u32,
    pub adjustment: f32,
}

/// Parsed bitmap font description
#[derive(Debug, Clone, Default)]
pub struct BakedFontDescription {
    pub header: BakedFontHeader,
    pub glyphs: Vec<BakedGlyph>,
    pub kerning: Vec<BakedKerning>,
}

impl Default for BakedFontHeader {
    fn default() -> Self {
        Self {
            size: 12.0,
            ascent: 12.0,
            descent: 4.0,
            texture_width: 1024,
            texture_height: 1024,
        }
    }
}

impl BakedFontDescription {
    /// Number of texture files visible glyphs need (highest file index + 1)
    pub fn texture_file_count(&self) -> usize {
        self.glyphs
            .iter()
            .filter(|g| g.bounding_width > 0 && g.bounding_height > 0)
            .map(|g| g.texture_file_index as usize + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Build a font table from a baked description
///
/// `texture_map[file_index]` is the atlas texture registered for that file.
pub fn import_baked(desc: &BakedFontDescription, texture_map: &[u8]) -> Result<FontTable> {
    let header = &desc.header;
    if !(header.size.is_finite() && header.size > 0.0) {
        return Err(FontError::InvalidSize(header.size));
    }
    let tw = header.texture_width.max(1) as f32;
    let th = header.texture_height.max(1) as f32;

    let mut table = FontTable::new();
    let max_codepoint = desc
        .glyphs
        .iter()
        .map(|g| g.codepoint)
        .filter(|&c| c <= MAX_CODEPOINT)
        .max();
    if let Some(max) = max_codepoint {
        table.ensure_index_capacity(max);
    }

    for baked in &desc.glyphs {
        if baked.codepoint > MAX_CODEPOINT || table.contains(baked.codepoint) {
            continue;
        }

        let visible = baked.bounding_width > 0 && baked.bounding_height > 0;
        let texture_index = if visible {
            *texture_map
                .get(baked.texture_file_index as usize)
                .ok_or(FontError::UnmappedTexture(baked.texture_file_index))?
        } else {
            0
        };
        let du = if (baked.channel_index as usize) < CHANNELS_PER_TEXTURE {
            1.0 + baked.channel_index as f32
        } else {
            0.0
        };
        let (bw, bh) = (baked.bounding_width as f32, baked.bounding_height as f32);
        let (ox, oy) = (baked.offset_x as f32, baked.offset_y as f32);

        table.push_glyph(GlyphRecord {
            codepoint: baked.codepoint as u16,
            advance_x: baked.advance_width,
            visible,
            colored: false,
            texture_index,
            x0: 0.0,
            y0: baked.layout_offset_y,
            x1: bw,
            y1: baked.layout_offset_y + bh,
            u0: du + ox / tw,
            v0: oy / th,
            u1: du + (ox + bw) / tw,
            v1: (oy + bh) / th,
        })?;
    }

    let mut kerning = desc.kerning.clone();
    kerning.sort_by_key(|k| (k.right, k.left));
    let stored = kerning
        .iter()
        .filter(|k| table.add_kerning_pair(k.left, k.right, k.adjustment))
        .count();
    if stored < kerning.len() {
        debug!("Baked font: {} of {} kerning pairs skipped", kerning.len() - stored, kerning.len());
    }

    table.metrics.font_size = header.size * POINTS_TO_PIXELS;
    table.metrics.ascent = header.ascent;
    table.metrics.descent = header.descent.abs();
    table.resolve_special_chars(&FALLBACK_CANDIDATES, &ELLIPSIS_CANDIDATES, &DOT_CANDIDATES);
    table.repair_hot_data();

    info!(
        "Baked font imported: {:.1}px, {} glyphs, {} kerning pairs",
        table.metrics.font_size,
        table.glyphs().len(),
        table.kerning_pairs().len()
    );
    Ok(table)
}
