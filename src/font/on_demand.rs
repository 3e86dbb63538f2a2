//! On-demand rasterized fonts
//!
//! Wraps a system text backend and rasterizes glyphs lazily:
//! - every codepoint is attempted once; absent ones are never retried
//! - masks are rendered into one scratch buffer per batch
//! - bitmaps are packed through the shared atlas and blitted with gamma
//!
//! Metrics follow pixel-grid conventions: integer font size, ceil'd
//! ascent/descent, rounded advances.

use log::{debug, info, trace, warn};

use crate::constants::{
    BYTES_PER_TEXEL, CHANNEL_BYTE_ORDER, DOT_CANDIDATES, ELLIPSIS_CANDIDATES, FALLBACK_CANDIDATES,
    MAX_CODEPOINT, SPACE,
};
use crate::error::{FontError, Result};
use crate::font::atlas::{AtlasTexture, GammaTable, GlyphAtlas, Placement};
use crate::font::table::{first_available, FontTable, GlyphRecord};

/// Mask bounds in pixels, relative to the pen on the baseline (y grows down)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlyphBounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl GlyphBounds {
    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }

    pub fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }
}

/// Line metrics at the backend's pixel size (both distances positive)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LineMetrics {
    pub ascent: f32,
    pub descent: f32,
}

/// Scaled glyph metrics
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphMeasure {
    pub advance_x: f32,
    pub bounds: GlyphBounds,
}

/// System text backend
pub trait TextBackend {
    /// Glyph index for a codepoint; 0 means the font has no glyph
    fn glyph_index(&self, codepoint: u32) -> u16;

    fn line_metrics(&self, size_px: f32) -> LineMetrics;

    fn measure(&self, glyph_index: u16, size_px: f32) -> GlyphMeasure;

    /// Render an 8-bit coverage mask of `bounds` into `mask` (row-major,
    /// `bounds.width()` bytes per row)
    fn rasterize(&self, glyph_index: u16, size_px: f32, bounds: &GlyphBounds, mask: &mut [u8]);
}

/// Glyph measured but not yet placed
struct PendingGlyph {
    codepoint: u32,
    glyph_index: u16,
    measure: GlyphMeasure,
}

/// Lazily rasterizing font source
pub struct OnDemandRasterizer {
    backend: Box<dyn TextBackend>,
    size_px: f32,
}

impl OnDemandRasterizer {
    /// Create the rasterizer and its table, preloading space, the special
    /// characters and `preload`
    pub fn new(
        backend: Box<dyn TextBackend>,
        size_px: f32,
        atlas: &mut GlyphAtlas,
        preload: &[u32],
    ) -> Result<(Self, FontTable)> {
        if !(size_px.is_finite() && size_px > 0.0) {
            return Err(FontError::InvalidSize(size_px));
        }
        let rasterizer = Self { backend, size_px };

        let line = rasterizer.backend.line_metrics(size_px);
        let mut table = FontTable::new();
        table.metrics.font_size = size_px.round();
        table.metrics.ascent = line.ascent.ceil();
        table.metrics.descent = line.descent.abs().ceil();

        let available = |c: u16| rasterizer.is_char_available(c as u32);
        table.metrics.fallback_char = first_available(&FALLBACK_CANDIDATES, available)
            .or_else(|| FALLBACK_CANDIDATES.last().copied())
            .unwrap_or(SPACE);
        table.metrics.ellipsis_char = first_available(&ELLIPSIS_CANDIDATES, available);
        table.metrics.dot_char = first_available(&DOT_CANDIDATES, available);

        let metrics = table.metrics;
        let mut initial: Vec<u32> = [Some(SPACE), Some(metrics.fallback_char), metrics.ellipsis_char, metrics.dot_char]
            .into_iter()
            .flatten()
            .map(u32::from)
            .collect();
        initial.extend_from_slice(preload);
        rasterizer.load_glyphs(&mut table, atlas, &initial)?;

        info!(
            "On-demand font created: {:.0}px (ascent {:.0}, descent {:.0}), fallback U+{:04X}",
            table.metrics.font_size, table.metrics.ascent, table.metrics.descent, table.metrics.fallback_char
        );
        Ok((rasterizer, table))
    }

    pub fn size_px(&self) -> f32 {
        self.size_px
    }

    pub fn is_char_available(&self, codepoint: u32) -> bool {
        codepoint <= MAX_CODEPOINT && self.backend.glyph_index(codepoint) != 0
    }

    /// Rasterize every unattempted codepoint of `codepoints` into `table`
    ///
    /// Returns the number of glyphs added. A glyph too large for the atlas is
    /// skipped on its own; on exhaustion the glyphs added so far are kept. The
    /// table is repaired either way.
    pub fn load_glyphs(&self, table: &mut FontTable, atlas: &mut GlyphAtlas, codepoints: &[u32]) -> Result<usize> {
        let Some(max) = codepoints.iter().copied().filter(|&c| c <= MAX_CODEPOINT).max() else {
            return Ok(0);
        };
        table.ensure_index_capacity(max);

        let mut pending = Vec::new();
        for &codepoint in codepoints {
            if codepoint > MAX_CODEPOINT || !table.mark_attempted(codepoint) {
                continue;
            }
            let glyph_index = self.backend.glyph_index(codepoint);
            if glyph_index == 0 {
                trace!("No glyph for U+{:04X}", codepoint);
                continue;
            }
            pending.push(PendingGlyph {
                codepoint,
                glyph_index,
                measure: self.backend.measure(glyph_index, self.size_px),
            });
        }
        if pending.is_empty() {
            return Ok(0);
        }

        let mut touched = Vec::new();
        let mut added = 0;
        let result = self.place_batch(table, atlas, &pending, &mut touched, &mut added);

        for &index in &touched {
            atlas.mark_changed(index);
        }
        table.repair_hot_data();

        debug!(
            "Rasterized {} of {} glyphs at {:.0}px into {} texture(s)",
            added,
            pending.len(),
            self.size_px,
            touched.len()
        );
        result.map(|_| added)
    }

    fn place_batch(
        &self,
        table: &mut FontTable,
        atlas: &mut GlyphAtlas,
        pending: &[PendingGlyph],
        touched: &mut Vec<u8>,
        added: &mut usize,
    ) -> Result<()> {
        let max_area = pending.iter().map(|p| p.measure.bounds.area()).max().unwrap_or(0);
        let mut scratch = vec![0u8; max_area];
        let ascent = table.metrics.ascent;

        for p in pending {
            let bounds = p.measure.bounds;
            let mut glyph = GlyphRecord {
                codepoint: p.codepoint as u16,
                advance_x: p.measure.advance_x.round(),
                visible: bounds.area() != 0,
                x0: bounds.left as f32,
                y0: bounds.top as f32 + ascent,
                x1: bounds.right as f32,
                y1: bounds.bottom as f32 + ascent,
                ..GlyphRecord::default()
            };

            let placement = match atlas.allocate(&mut glyph) {
                Ok(placement) => placement,
                Err(FontError::GlyphTooLarge {
                    codepoint,
                    width,
                    height,
                    ..
                }) => {
                    warn!("Skipping U+{:04X}: {}x{} mask does not fit the atlas", codepoint, width, height);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(placement) = placement {
                let mask = &mut scratch[..bounds.area()];
                mask.fill(0);
                self.backend.rasterize(p.glyph_index, self.size_px, &bounds, mask);
                if let Some((texture, gamma)) = atlas.blit_target(placement.texture_index) {
                    blit_mask(texture, gamma, &placement, mask);
                }
                if !touched.contains(&placement.texture_index) {
                    touched.push(placement.texture_index);
                }
            }

            table.push_glyph(glyph)?;
            *added += 1;
        }
        Ok(())
    }
}

/// Write a coverage mask into a texture
///
/// Unpacked textures get opaque-white RGB with gamma-mapped alpha; channel
/// textures only get the placement channel's byte written.
fn blit_mask(texture: &mut AtlasTexture, gamma: &GammaTable, placement: &Placement, mask: &[u8]) {
    let width = placement.width as usize;
    if width == 0 {
        return;
    }
    let stride = texture.width() as usize * BYTES_PER_TEXEL;
    let pixels = texture.pixels_mut();

    for (row, src) in mask.chunks_exact(width).take(placement.height as usize).enumerate() {
        let start = (placement.y as usize + row) * stride + placement.x as usize * BYTES_PER_TEXEL;
        let Some(dst) = pixels.get_mut(start..start + width * BYTES_PER_TEXEL) else {
            break;
        };
        match placement.channel {
            None => {
                for (texel, &a) in dst.chunks_exact_mut(BYTES_PER_TEXEL).zip(src) {
                    texel[0] = 0xFF;
                    texel[1] = 0xFF;
                    texel[2] = 0xFF;
                    texel[3] = gamma.map(a);
                }
            }
            Some(channel) => {
                let byte = CHANNEL_BYTE_ORDER[channel as usize];
                for (texel, &a) in dst.chunks_exact_mut(BYTES_PER_TEXEL).zip(src) {
                    texel[byte] = gamma.map(a);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::AtlasConfig;
    use crate::constants::NO_GLYPH;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Deterministic backend: 'A'..='Z', '-' and space, boxes 6x9
    pub(crate) struct FakeBackend {
        pub(crate) index_calls: Rc<Cell<usize>>,
    }

    impl FakeBackend {
        pub(crate) fn new() -> Self {
            Self {
                index_calls: Rc::new(Cell::new(0)),
            }
        }
    }

    impl TextBackend for FakeBackend {
        fn glyph_index(&self, codepoint: u32) -> u16 {
            self.index_calls.set(self.index_calls.get() + 1);
            match char::from_u32(codepoint) {
                Some('A'..='Z' | '-' | ' ') => codepoint as u16,
                _ => 0,
            }
        }

        fn line_metrics(&self, size_px: f32) -> LineMetrics {
            LineMetrics {
                ascent: size_px * 0.8,
                descent: size_px * 0.25,
            }
        }

        fn measure(&self, glyph_index: u16, size_px: f32) -> GlyphMeasure {
            if glyph_index == SPACE {
                return GlyphMeasure {
                    advance_x: size_px * 0.3,
                    bounds: GlyphBounds::default(),
                };
            }
            GlyphMeasure {
                advance_x: size_px * 0.58,
                bounds: GlyphBounds {
                    left: 1,
                    top: -9,
                    right: 7,
                    bottom: 0,
                },
            }
        }

        fn rasterize(&self, _glyph_index: u16, _size_px: f32, _bounds: &GlyphBounds, mask: &mut [u8]) {
            mask.fill(0xFF);
        }
    }

    /// FakeBackend whose 'W' is wider than any test texture
    struct WideBackend(FakeBackend);

    impl TextBackend for WideBackend {
        fn glyph_index(&self, codepoint: u32) -> u16 {
            self.0.glyph_index(codepoint)
        }

        fn line_metrics(&self, size_px: f32) -> LineMetrics {
            self.0.line_metrics(size_px)
        }

        fn measure(&self, glyph_index: u16, size_px: f32) -> GlyphMeasure {
            let mut measure = self.0.measure(glyph_index, size_px);
            if glyph_index == b'W' as u16 {
                measure.bounds.right = 200;
            }
            measure
        }

        fn rasterize(&self, glyph_index: u16, size_px: f32, bounds: &GlyphBounds, mask: &mut [u8]) {
            self.0.rasterize(glyph_index, size_px, bounds, mask);
        }
    }

    fn atlas(side: u32, max_textures: usize) -> GlyphAtlas {
        GlyphAtlas::new(AtlasConfig {
            texture_width: side,
            texture_height: side,
            gamma: 1.0,
            max_textures,
            ..AtlasConfig::default()
        })
    }

    fn assert_fallback_invariant(table: &FontTable) {
        let fallback = *table.fallback_hot_data();
        for (cp, &index) in table.index_lookup().iter().enumerate() {
            if index == NO_GLYPH {
                assert_eq!(table.hot_data_table()[cp], fallback);
            }
        }
    }

    #[test]
    fn test_new_sets_metrics_and_preloads() {
        let mut atlas = atlas(64, 4);
        let (_, table) = OnDemandRasterizer::new(Box::new(FakeBackend::new()), 13.4, &mut atlas, &[]).unwrap();
        assert_eq!(table.metrics.font_size, 13.0);
        assert_eq!(table.metrics.ascent, 11.0);
        assert_eq!(table.metrics.descent, 4.0);
        assert_eq!(table.metrics.fallback_char, b'-' as u16);
        assert_eq!(table.metrics.ellipsis_char, None);
        assert!(table.contains(SPACE as u32));
        assert!(table.contains(b'-' as u32));
        assert!(!table.find_glyph(SPACE as u32).unwrap().visible);
        assert_eq!(table.fallback_glyph().unwrap().codepoint, b'-' as u16);
    }

    #[test]
    fn test_load_glyph_places_and_blits() {
        let mut atlas = atlas(64, 4);
        let (raster, mut table) = OnDemandRasterizer::new(Box::new(FakeBackend::new()), 13.0, &mut atlas, &[]).unwrap();
        atlas.update_textures();

        assert_eq!(raster.load_glyphs(&mut table, &mut atlas, &[b'A' as u32]).unwrap(), 1);
        let a = *table.find_glyph(b'A' as u32).unwrap();
        assert_eq!(a.advance_x, 8.0);
        assert_eq!((a.x0, a.y0, a.x1, a.y1), (1.0, 2.0, 7.0, 11.0));
        assert!(atlas.texture(a.texture_index).unwrap().is_changed());

        let channel = a.channel().unwrap();
        let texture = atlas.texture(a.texture_index).unwrap();
        let x = (a.u0_fract() * 64.0).round() as usize;
        let y = (a.v0 * 64.0).round() as usize;
        let texel = &texture.pixels()[(y * 64 + x) * 4..(y * 64 + x) * 4 + 4];
        for (byte, &value) in texel.iter().enumerate() {
            let expected = if byte == CHANNEL_BYTE_ORDER[channel as usize] { 0xFF } else { 0 };
            assert_eq!(value, expected, "byte {}", byte);
        }
    }

    #[test]
    fn test_absent_codepoint_is_not_retried() {
        let mut atlas = atlas(64, 4);
        let backend = FakeBackend::new();
        let calls = backend.index_calls.clone();
        let (raster, mut table) = OnDemandRasterizer::new(Box::new(backend), 13.0, &mut atlas, &[]).unwrap();

        assert_eq!(raster.load_glyphs(&mut table, &mut atlas, &[0x3042]).unwrap(), 0);
        let after_first = calls.get();
        assert_eq!(raster.load_glyphs(&mut table, &mut atlas, &[0x3042, 0x3042]).unwrap(), 0);
        assert_eq!(calls.get(), after_first);
        assert!(table.is_attempted(0x3042));
        assert_eq!(table.advance_x(0x3042), table.advance_x(b'-' as u32));
        assert_fallback_invariant(&table);
    }

    #[test]
    fn test_exhaustion_keeps_added_glyphs() {
        let mut atlas = atlas(12, 1);
        let (raster, mut table) = OnDemandRasterizer::new(Box::new(FakeBackend::new()), 13.0, &mut atlas, &[]).unwrap();

        let batch: Vec<u32> = "ABCDE".chars().map(|c| c as u32).collect();
        let err = raster.load_glyphs(&mut table, &mut atlas, &batch).unwrap_err();
        assert!(matches!(err, FontError::AtlasExhausted { max: 1 }));
        assert!(table.contains(b'A' as u32));
        assert!(table.contains(b'C' as u32));
        assert!(!table.contains(b'D' as u32));
        assert!(atlas.texture(0).unwrap().is_changed());
        assert_fallback_invariant(&table);
    }

    #[test]
    fn test_oversized_glyph_skips_only_itself() {
        let mut atlas = atlas(64, 4);
        let (raster, mut table) =
            OnDemandRasterizer::new(Box::new(WideBackend(FakeBackend::new())), 13.0, &mut atlas, &[]).unwrap();

        let batch = [b'W' as u32, b'A' as u32, b'B' as u32];
        assert_eq!(raster.load_glyphs(&mut table, &mut atlas, &batch).unwrap(), 2);
        assert!(!table.contains(b'W' as u32));
        assert!(table.is_attempted(b'W' as u32));
        assert!(table.contains(b'A' as u32));
        assert!(table.contains(b'B' as u32));
        assert_eq!(table.advance_x(b'W' as u32), table.advance_x(b'-' as u32));
        assert_fallback_invariant(&table);

        assert_eq!(raster.load_glyphs(&mut table, &mut atlas, &batch).unwrap(), 0);
    }

    #[test]
    fn test_unpacked_blit_writes_white_and_alpha() {
        let mut atlas = GlyphAtlas::new(AtlasConfig {
            texture_width: 32,
            texture_height: 32,
            gamma: 2.2,
            ..AtlasConfig::default()
        });
        let placement = atlas.allocate_rect(0x2605, 3, 2, true).unwrap();
        assert_eq!(placement.channel, None);
        let expected = atlas.gamma_table().map(0x40);
        assert_ne!(expected, 0x40);

        let (texture, gamma) = atlas.blit_target(placement.texture_index).unwrap();
        blit_mask(texture, gamma, &placement, &[0x40; 6]);

        let texture = atlas.texture(placement.texture_index).unwrap();
        for row in 0..2 {
            for col in 0..3 {
                let at = ((placement.y + row) * 32 + placement.x + col) as usize * BYTES_PER_TEXEL;
                assert_eq!(&texture.pixels()[at..at + 4], &[0xFF, 0xFF, 0xFF, expected]);
            }
        }
    }

    #[test]
    fn test_channel_blit_keeps_colocated_glyphs() {
        let mut atlas = atlas(32, 4);
        let first = atlas.allocate_rect(0x41, 2, 2, false).unwrap();
        let index = first.texture_index;
        let red = Placement { channel: Some(0), ..first };
        let blue = Placement { channel: Some(2), ..first };
        let (r, b) = (atlas.gamma_table().map(0x11), atlas.gamma_table().map(0x22));

        let (texture, gamma) = atlas.blit_target(index).unwrap();
        blit_mask(texture, gamma, &red, &[0x11; 4]);
        let (texture, gamma) = atlas.blit_target(index).unwrap();
        blit_mask(texture, gamma, &blue, &[0x22; 4]);

        let texture = atlas.texture(index).unwrap();
        let at = (first.y * 32 + first.x) as usize * BYTES_PER_TEXEL;
        let mut expected = [0u8; 4];
        expected[CHANNEL_BYTE_ORDER[0]] = r;
        expected[CHANNEL_BYTE_ORDER[2]] = b;
        assert_eq!(&texture.pixels()[at..at + 4], &expected);
    }

    #[test]
    fn test_invalid_size() {
        let mut atlas = atlas(64, 4);
        assert!(OnDemandRasterizer::new(Box::new(FakeBackend::new()), 0.0, &mut atlas, &[]).is_err());
    }
}
