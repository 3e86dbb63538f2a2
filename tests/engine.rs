//! End-to-end tests over a font collection
//!
//! Uses an in-memory text backend so no system fonts are needed.

use std::cell::RefCell;
use std::ops::RangeInclusive;
use std::rc::Rc;

use fontchain::constants::NO_GLYPH;
use fontchain::font::atlas::AtlasTexture;
use fontchain::font::baked::{BakedFontDescription, BakedFontHeader, BakedGlyph, BakedKerning};
use fontchain::font::on_demand::{GlyphBounds, GlyphMeasure, LineMetrics};
use fontchain::{
    ChainEntry, CodepointRange, Config, FontChain, FontCollection, FontError, FontTable, ScaleMode, TextBackend,
    TextureHost,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ========== Fixtures ==========

/// Backend covering one codepoint range with fixed 10x12 boxes
struct RangeBackend {
    range: RangeInclusive<u32>,
    advance: f32,
}

impl RangeBackend {
    fn boxed(range: RangeInclusive<u32>, advance: f32) -> Box<dyn TextBackend> {
        Box::new(Self { range, advance })
    }
}

impl TextBackend for RangeBackend {
    fn glyph_index(&self, codepoint: u32) -> u16 {
        if self.range.contains(&codepoint) {
            codepoint as u16 + 1
        } else {
            0
        }
    }

    fn line_metrics(&self, size_px: f32) -> LineMetrics {
        LineMetrics {
            ascent: size_px * 0.75,
            descent: size_px * 0.25,
        }
    }

    fn measure(&self, glyph_index: u16, _size_px: f32) -> GlyphMeasure {
        let bounds = if glyph_index == b' ' as u16 + 1 {
            GlyphBounds::default()
        } else {
            GlyphBounds {
                left: 0,
                top: -10,
                right: 10,
                bottom: 2,
            }
        };
        GlyphMeasure {
            advance_x: self.advance,
            bounds,
        }
    }

    fn rasterize(&self, _glyph_index: u16, _size_px: f32, _bounds: &GlyphBounds, mask: &mut [u8]) {
        for (i, v) in mask.iter_mut().enumerate() {
            *v = (i % 256) as u8;
        }
    }
}

#[derive(Default)]
struct HostLog {
    added: Vec<(u8, u32, u32)>,
    updated: Vec<u8>,
}

struct RecordingHost(Rc<RefCell<HostLog>>);

impl TextureHost for RecordingHost {
    fn texture_added(&mut self, index: u8, texture: &AtlasTexture) {
        self.0.borrow_mut().added.push((index, texture.width(), texture.height()));
    }

    fn texture_updated(&mut self, index: u8, _texture: &AtlasTexture) {
        self.0.borrow_mut().updated.push(index);
    }
}

fn config(side: u32, max_textures: usize) -> Config {
    let mut config = Config::default();
    config.atlas.texture_width = side;
    config.atlas.texture_height = side;
    config.atlas.max_textures = max_textures;
    config
}

fn baked_description() -> BakedFontDescription {
    let glyph = |codepoint: u32, advance_width: f32, offset_x: u16| BakedGlyph {
        codepoint,
        advance_width,
        texture_file_index: 0,
        channel_index: 1,
        offset_x,
        offset_y: 0,
        bounding_width: 9,
        bounding_height: 12,
        layout_offset_y: 1.0,
    };
    BakedFontDescription {
        header: BakedFontHeader {
            size: 12.0,
            ascent: 12.0,
            descent: 4.0,
            texture_width: 64,
            texture_height: 64,
        },
        glyphs: vec![glyph(0x41, 10.0, 0), glyph(0x42, 12.0, 16)],
        kerning: vec![BakedKerning {
            left: 0x41,
            right: 0x42,
            adjustment: -1.0,
        }],
    }
}

fn assert_fallback_invariant(table: &FontTable) {
    let fallback = *table.fallback_hot_data();
    for (cp, &index) in table.index_lookup().iter().enumerate() {
        if index == NO_GLYPH {
            assert_eq!(table.hot_data_table()[cp], fallback, "U+{:04X}", cp);
        }
    }
}

// ========== Chains ==========

#[test]
fn test_chain_precedence() {
    init_logger();
    let mut fonts = FontCollection::new(config(256, 8));
    let a = fonts.add_on_demand(RangeBackend::boxed(0x41..=0x5A, 7.0), 16.0).unwrap();
    let b = fonts.add_on_demand(RangeBackend::boxed(0x00..=0xFF, 9.0), 16.0).unwrap();
    let chain = FontChain::new(
        vec![
            ChainEntry::new(16.0)
                .with_ranges(vec![CodepointRange::new(0x41, 0x5A)])
                .with_offset(2.0, -1.0),
            ChainEntry::new(16.0).with_ranges(vec![CodepointRange::new(0x00, 0xFF)]),
        ],
        1.0,
    );
    let chain = fonts.add_chain(chain, &[a, b]).unwrap();
    fonts.load_glyphs(chain, &[0x42, 0x62]).unwrap();

    let from_a = *fonts.table(a).unwrap().find_glyph(0x42).unwrap();
    let composed = *fonts.table(chain).unwrap().find_glyph(0x42).unwrap();
    assert_eq!(composed.advance_x, 7.0);
    assert_eq!(composed.x0, from_a.x0 + 2.0);
    assert_eq!(composed.y0, from_a.y0 - 1.0);
    assert_eq!((composed.u0, composed.v0), (from_a.u0, from_a.v0));
    assert_eq!(composed.texture_index, from_a.texture_index);

    // 'b' is outside A's range and comes from B without offset
    let from_b = *fonts.table(b).unwrap().find_glyph(0x62).unwrap();
    let lower = *fonts.table(chain).unwrap().find_glyph(0x62).unwrap();
    assert_eq!(lower, from_b);
    assert!(!fonts.table(a).unwrap().is_attempted(0x62));
}

#[test]
fn test_baked_chain_end_to_end() {
    init_logger();
    let mut fonts = FontCollection::new(config(256, 8));
    let desc = baked_description();
    let baked = fonts
        .add_baked_with_textures(&desc, vec![vec![0u8; 64 * 64 * 4]])
        .unwrap();
    let size_px = fonts.table(baked).unwrap().metrics.font_size;
    assert_eq!(size_px, 16.0);

    let chain = fonts
        .add_chain(
            FontChain::new(vec![ChainEntry::new(size_px).with_letter_spacing(1.0)], 1.2),
            &[baked],
        )
        .unwrap();
    fonts.load_glyphs(chain, &[0x41, 0x42, 0x43]).unwrap();

    let table = fonts.table(chain).unwrap();
    assert_eq!(table.metrics.font_size, (size_px * 1.2).round());
    assert_eq!(table.advance_x(0x41), 11.0);
    assert_eq!(table.advance_x(0x42), 13.0);
    assert!(table.find_glyph(0x43).is_none());
    assert_eq!(table.find_glyph(0x41).unwrap().channel(), Some(1));
    // baked fonts have no '-' or space; the last candidate stays the fallback
    assert_eq!(table.metrics.fallback_char, b' ' as u16);
    assert!(table.fallback_glyph().is_none());
    assert_fallback_invariant(table);
}

#[test]
fn test_scaled_baked_font() {
    let mut fonts = FontCollection::new(config(256, 8));
    let baked = fonts
        .add_baked_with_textures(&baked_description(), vec![vec![0u8; 64 * 64 * 4]])
        .unwrap();
    let half = fonts.add_scaled(baked, 0.5, ScaleMode::Geometry).unwrap();

    let table = fonts.table(half).unwrap();
    assert_eq!(table.metrics.font_size, 8.0);
    assert_eq!(table.advance_x(0x42), 6.0);
    assert_eq!(table.resolve_kerning(0x41, 0x42), -0.5);
    let original = fonts.table(baked).unwrap().find_glyph(0x42).unwrap().u0;
    assert_eq!(table.find_glyph(0x42).unwrap().u0, original);
}

// ========== Atlas ==========

#[test]
fn test_host_sees_growth_and_uploads() {
    init_logger();
    let log = Rc::new(RefCell::new(HostLog::default()));
    let mut fonts = FontCollection::with_host(config(32, 8), Box::new(RecordingHost(log.clone())));
    let font = fonts.add_on_demand(RangeBackend::boxed(0x41..=0x5A, 11.0), 16.0).unwrap();
    assert!(log.borrow().added.is_empty());

    // 11x13 cells: at most 4 per channel, 16 per texture
    fonts.load_ranges(font, &[CodepointRange::new(0x41, 0x5A)]).unwrap();
    assert!(log.borrow().added.len() >= 2);
    assert!(log.borrow().added.iter().all(|&(_, w, h)| (w, h) == (32, 32)));

    fonts.atlas_mut().suppress_updates();
    assert_eq!(fonts.update_textures(), 0);
    fonts.atlas_mut().resume_updates();
    let uploaded = log.borrow().updated.len();
    assert_eq!(uploaded, log.borrow().added.len());
    assert_eq!(fonts.update_textures(), 0);
}

#[test]
fn test_exhaustion_keeps_font_consistent() {
    init_logger();
    let mut fonts = FontCollection::new(config(16, 1));
    let font = fonts.add_on_demand(RangeBackend::boxed(0x41..=0x5A, 11.0), 16.0).unwrap();

    let err = fonts
        .load_ranges(font, &[CodepointRange::new(0x41, 0x5A)])
        .unwrap_err();
    assert!(matches!(err, FontError::AtlasExhausted { max: 1 }));

    let table = fonts.table(font).unwrap();
    assert_eq!(table.glyphs().len(), 4);
    assert!(table.contains(0x41));
    assert!(!table.contains(0x5A));
    assert_fallback_invariant(table);

    // everything was attempted; nothing is retried
    assert_eq!(fonts.load_glyphs(font, &[0x5A]).unwrap(), 0);
}

#[test]
fn test_config_from_toml_drives_atlas() {
    let config = Config::from_toml_str(
        r#"
        [atlas]
        texture_width = 64
        texture_height = 32
        gamma = 1.0

        [fonts]
        preload = " AZ"
        "#,
    )
    .unwrap();
    let mut fonts = FontCollection::new(config);
    let font = fonts.add_on_demand(RangeBackend::boxed(0x20..=0x7E, 8.0), 16.0).unwrap();

    let table = fonts.table(font).unwrap();
    assert!(table.contains(0x41));
    assert!(table.contains(0x5A));
    assert!(!table.contains(0x42));
    let texture = fonts.atlas().texture(0).unwrap();
    assert_eq!((texture.width(), texture.height()), (64, 32));
    assert_eq!(fonts.atlas().gamma_table().gamma(), 1.0);
    assert_eq!(fonts.atlas().gamma_table().map(255), 255);
}
