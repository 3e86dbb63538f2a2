//! Uniformly rescaled fonts
//!
//! A scaled font is a snapshot of its base table with every layout value
//! multiplied by one factor. Textures and UVs are shared with the base.

use log::debug;

use crate::error::{FontError, Result};
use crate::font::table::FontTable;

/// What to do with metrics after scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleMode {
    /// Multiply only
    #[default]
    Geometry,
    /// Multiply, then round advances and kerning to whole pixels
    Requantize,
}

/// Copy `source` with every layout value multiplied by `scale`
pub fn scale_table(source: &FontTable, scale: f32, mode: ScaleMode) -> Result<FontTable> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(FontError::InvalidScale(scale));
    }
    let quantize = |v: f32| match mode {
        ScaleMode::Geometry => v * scale,
        ScaleMode::Requantize => (v * scale).round(),
    };

    let mut table = source.clone();

    for glyph in table.glyphs_mut() {
        glyph.x0 *= scale;
        glyph.y0 *= scale;
        glyph.x1 *= scale;
        glyph.y1 *= scale;
        glyph.advance_x = quantize(glyph.advance_x);
    }
    for hot in table.hot_data_table_mut() {
        hot.advance_x = quantize(hot.advance_x);
        hot.occupied_width = quantize(hot.occupied_width);
    }
    for pair in table.kerning_pairs_mut() {
        pair.advance_x_adjustment = quantize(pair.advance_x_adjustment);
    }
    for adjustment in table.frequent_kerning_mut() {
        *adjustment = quantize(*adjustment);
    }

    let metrics = &mut table.metrics;
    metrics.font_size *= scale;
    metrics.ascent *= scale;
    metrics.descent *= scale;
    table.repair_hot_data();

    debug!(
        "Scaled font: x{:.3} {:?}, {:.1}px, {} glyphs",
        scale,
        mode,
        table.metrics.font_size,
        table.glyphs().len()
    );
    Ok(table)
}
