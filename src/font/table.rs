//! Glyph table
//!
//! Dense per-font glyph storage shared by every font variant:
//! - glyph records (append-only)
//! - codepoint -> glyph index lookup
//! - per-codepoint hot data (advance, occupied width, kerning run)
//! - kerning pairs with a dense low-codepoint matrix
//!
//! Indices into the glyph array are the only references kept; after any
//! bulk mutation `repair_hot_data()` re-anchors the fallback references.

use log::warn;
use std::fmt;

use crate::constants::{
    CODEPOINTS_PER_PAGE, CODEPOINT_COUNT, CHANNELS_PER_TEXTURE, FREQUENT_KERNING_DIM,
    KERNING_BISECT_THRESHOLD, MAX_CODEPOINT, NO_GLYPH, SPACE,
};
use crate::error::{FontError, Result};

/// One visible or invisible character image
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphRecord {
    /// Codepoint this glyph renders
    pub codepoint: u16,
    /// Horizontal advance to next character
    pub advance_x: f32,
    /// Zero-area glyphs (e.g. space) are not visible and never packed
    pub visible: bool,
    /// Full-colour glyph (stored in an unpacked texture)
    pub colored: bool,
    /// Atlas texture holding the bitmap
    pub texture_index: u8,
    /// Layout quad, relative to the pen position at the top of the line
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    /// Texture coordinates; integer part of `u0`/`u1` is `1 + channel`
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

impl GlyphRecord {
    /// Layout width
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    /// Layout height
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Channel encoded in the integer part of `u0`
    ///
    /// Returns None for the unpacked designation (integer part 0).
    pub fn channel(&self) -> Option<u8> {
        let channel = self.u0.floor() as i32 - 1;
        if (0..CHANNELS_PER_TEXTURE as i32).contains(&channel) {
            Some(channel as u8)
        } else {
            None
        }
    }

    /// Normalized U origin with the channel offset removed
    pub fn u0_fract(&self) -> f32 {
        self.u0 - self.u0.floor()
    }

    /// Move the layout quad
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.x0 += dx;
        self.x1 += dx;
        self.y0 += dy;
        self.y1 += dy;
    }
}

/// Per-codepoint data read on every frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HotData {
    /// Horizontal advance
    pub advance_x: f32,
    /// max(advance_x, x1)
    pub occupied_width: f32,
    /// First index of this codepoint's kerning run (as right codepoint)
    pub kerning_offset: u32,
    /// Length of the kerning run
    pub kerning_count: u32,
    /// Run is long enough to bisect
    pub kerning_bisect: bool,
}

/// Advance adjustment between two codepoints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KerningPair {
    pub left: u16,
    pub right: u16,
    pub advance_x_adjustment: f32,
}

/// Dense bit-per-codepoint set over [0, 0xFFFF]
#[derive(Clone, PartialEq, Eq)]
pub struct CodepointSet {
    words: Vec<u64>,
}

impl CodepointSet {
    pub fn new() -> Self {
        Self {
            words: vec![0; CODEPOINT_COUNT / 64],
        }
    }

    /// Out-of-range codepoints are never contained
    pub fn contains(&self, codepoint: u32) -> bool {
        if codepoint > MAX_CODEPOINT {
            return false;
        }
        let cp = codepoint as usize;
        self.words[cp / 64] & (1 << (cp % 64)) != 0
    }

    /// Returns true if the codepoint was not yet in the set
    pub fn insert(&mut self, codepoint: u32) -> bool {
        if codepoint > MAX_CODEPOINT {
            return false;
        }
        let cp = codepoint as usize;
        let mask = 1u64 << (cp % 64);
        let word = &mut self.words[cp / 64];
        let inserted = *word & mask == 0;
        *word |= mask;
        inserted
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }
}

impl Default for CodepointSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodepointSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodepointSet").field("len", &self.len()).finish()
    }
}

/// Font-level metrics header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    /// Nominal size in pixels
    pub font_size: f32,
    /// Distance from line top to baseline
    pub ascent: f32,
    /// Distance from baseline to line bottom (positive)
    pub descent: f32,
    /// Render-time scale applied by the host
    pub scale: f32,
    /// Glyph drawn for codepoints without a glyph
    pub fallback_char: u16,
    /// Glyph used to elide text
    pub ellipsis_char: Option<u16>,
    /// Glyph used when the ellipsis is unavailable
    pub dot_char: Option<u16>,
    /// Glyph, index or kerning arrays changed since the host last called
    /// `take_lookup_tables_dirty`
    pub dirty_lookup_tables: bool,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            font_size: 0.0,
            ascent: 0.0,
            descent: 0.0,
            scale: 1.0,
            fallback_char: SPACE,
            ellipsis_char: None,
            dot_char: None,
            dirty_lookup_tables: false,
        }
    }
}

/// First candidate accepted by `available`
pub fn first_available(candidates: &[u16], available: impl Fn(u16) -> bool) -> Option<u16> {
    candidates.iter().copied().find(|&c| available(c))
}

/// Glyph table of one font
#[derive(Debug, Clone)]
pub struct FontTable {
    glyphs: Vec<GlyphRecord>,
    hot_data: Vec<HotData>,
    index_lookup: Vec<u16>,
    kerning_pairs: Vec<KerningPair>,
    frequent_kerning: Vec<f32>,
    attempted: CodepointSet,
    used_4k_pages: u16,
    /// Metrics header
    pub metrics: FontMetrics,
    fallback_glyph: Option<usize>,
    fallback_hot_data: HotData,
}

impl Default for FontTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FontTable {
    pub fn new() -> Self {
        Self {
            glyphs: Vec::new(),
            hot_data: Vec::new(),
            index_lookup: Vec::new(),
            kerning_pairs: Vec::new(),
            frequent_kerning: vec![0.0; FREQUENT_KERNING_DIM * FREQUENT_KERNING_DIM],
            attempted: CodepointSet::new(),
            used_4k_pages: 0,
            metrics: FontMetrics::default(),
            fallback_glyph: None,
            fallback_hot_data: HotData::default(),
        }
    }

    // ------------------------------------------------------------------
    // Raw arrays (the shape the host library consumes)
    // ------------------------------------------------------------------

    pub fn glyphs(&self) -> &[GlyphRecord] {
        &self.glyphs
    }

    pub(crate) fn glyphs_mut(&mut self) -> &mut [GlyphRecord] {
        &mut self.glyphs
    }

    pub fn index_lookup(&self) -> &[u16] {
        &self.index_lookup
    }

    pub fn hot_data_table(&self) -> &[HotData] {
        &self.hot_data
    }

    pub(crate) fn hot_data_table_mut(&mut self) -> &mut [HotData] {
        &mut self.hot_data
    }

    pub fn kerning_pairs(&self) -> &[KerningPair] {
        &self.kerning_pairs
    }

    pub(crate) fn kerning_pairs_mut(&mut self) -> &mut [KerningPair] {
        &mut self.kerning_pairs
    }

    /// Row-major 128x128 matrix, `[left * 128 + right]`
    pub fn frequent_kerning(&self) -> &[f32] {
        &self.frequent_kerning
    }

    pub(crate) fn frequent_kerning_mut(&mut self) -> &mut [f32] {
        &mut self.frequent_kerning
    }

    /// Bitmask of 4096-codepoint pages holding at least one glyph
    pub fn used_4k_pages(&self) -> u16 {
        self.used_4k_pages
    }

    pub fn is_page_used(&self, codepoint: u32) -> bool {
        codepoint <= MAX_CODEPOINT && self.used_4k_pages & (1 << (codepoint / CODEPOINTS_PER_PAGE)) != 0
    }

    // ------------------------------------------------------------------
    // Capacity and lookup
    // ------------------------------------------------------------------

    /// Highest codepoint the index currently covers
    pub fn max_codepoint(&self) -> Option<u32> {
        self.index_lookup.len().checked_sub(1).map(|m| m as u32)
    }

    /// Grow IndexLookup/HotData to cover `max_codepoint`; never shrinks
    ///
    /// New HotData slots alias the fallback glyph's hot data.
    pub fn ensure_index_capacity(&mut self, max_codepoint: u32) {
        let needed = max_codepoint.min(MAX_CODEPOINT) as usize + 1;
        if self.index_lookup.len() >= needed {
            return;
        }
        self.index_lookup.resize(needed, NO_GLYPH);
        self.hot_data.resize(needed, self.fallback_hot_data);
        self.metrics.dirty_lookup_tables = true;
    }

    /// Index into the glyph array, ignoring the fallback
    pub fn glyph_index(&self, codepoint: u32) -> Option<usize> {
        match self.index_lookup.get(codepoint as usize) {
            Some(&i) if i != NO_GLYPH => Some(i as usize),
            _ => None,
        }
    }

    /// Glyph for codepoint, or None for out-of-range/unmapped
    pub fn find_glyph(&self, codepoint: u32) -> Option<&GlyphRecord> {
        self.glyph_index(codepoint).map(|i| &self.glyphs[i])
    }

    /// Glyph for codepoint, falling back to the fallback glyph
    pub fn find_glyph_or_fallback(&self, codepoint: u32) -> Option<&GlyphRecord> {
        self.find_glyph(codepoint).or_else(|| self.fallback_glyph())
    }

    pub fn contains(&self, codepoint: u32) -> bool {
        self.glyph_index(codepoint).is_some()
    }

    /// Hot data for any codepoint (fallback's for anything past the index)
    pub fn hot_data(&self, codepoint: u32) -> &HotData {
        self.hot_data.get(codepoint as usize).unwrap_or(&self.fallback_hot_data)
    }

    /// Advance used by layout for codepoint
    pub fn advance_x(&self, codepoint: u32) -> f32 {
        self.hot_data(codepoint).advance_x
    }

    pub fn fallback_glyph(&self) -> Option<&GlyphRecord> {
        self.fallback_glyph.map(|i| &self.glyphs[i])
    }

    pub fn fallback_glyph_index(&self) -> Option<usize> {
        self.fallback_glyph
    }

    pub fn fallback_hot_data(&self) -> &HotData {
        &self.fallback_hot_data
    }

    // ------------------------------------------------------------------
    // Load-attempted tracking
    // ------------------------------------------------------------------

    pub fn is_attempted(&self, codepoint: u32) -> bool {
        self.attempted.contains(codepoint)
    }

    /// Returns true if this is the first attempt
    pub fn mark_attempted(&mut self, codepoint: u32) -> bool {
        self.attempted.insert(codepoint)
    }

    pub fn attempted(&self) -> &CodepointSet {
        &self.attempted
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Append a glyph and index it
    ///
    /// A codepoint already mapped keeps its first glyph; its index is returned.
    /// Kerning for the codepoint must be added after its glyph.
    pub fn push_glyph(&mut self, glyph: GlyphRecord) -> Result<usize> {
        let cp = glyph.codepoint as usize;
        self.ensure_index_capacity(cp as u32);
        if let Some(existing) = self.glyph_index(cp as u32) {
            return Ok(existing);
        }
        if self.glyphs.len() >= NO_GLYPH as usize {
            return Err(FontError::GlyphTableFull);
        }

        let index = self.glyphs.len();
        self.glyphs.push(glyph);
        self.index_lookup[cp] = index as u16;
        self.hot_data[cp] = HotData {
            advance_x: glyph.advance_x,
            occupied_width: glyph.advance_x.max(glyph.x1),
            ..HotData::default()
        };
        self.used_4k_pages |= 1 << (cp as u32 / CODEPOINTS_PER_PAGE);
        self.metrics.dirty_lookup_tables = true;
        Ok(index)
    }

    /// Append a kerning pair to the run of `right`
    ///
    /// Pairs sharing a right codepoint must arrive contiguously and sorted by
    /// left. Zero adjustments, out-of-range codepoints and right codepoints
    /// without a glyph are ignored. Returns whether the pair was stored.
    pub fn add_kerning_pair(&mut self, left: u32, right: u32, adjustment: f32) -> bool {
        if adjustment == 0.0 || left > MAX_CODEPOINT || right > MAX_CODEPOINT {
            return false;
        }
        if !self.contains(right) {
            return false;
        }

        let index = self.kerning_pairs.len() as u32;
        let hot = &mut self.hot_data[right as usize];
        if hot.kerning_count > 0 && hot.kerning_offset + hot.kerning_count != index {
            warn!(
                "Kerning run for U+{:04X} is not contiguous, dropping pair with U+{:04X}",
                right, left
            );
            return false;
        }
        if hot.kerning_count == 0 {
            hot.kerning_offset = index;
        }
        hot.kerning_count += 1;
        hot.kerning_bisect = hot.kerning_count >= KERNING_BISECT_THRESHOLD;

        let dim = FREQUENT_KERNING_DIM as u32;
        if left < dim && right < dim {
            self.frequent_kerning[(left * dim + right) as usize] = adjustment;
        }
        self.kerning_pairs.push(KerningPair {
            left: left as u16,
            right: right as u16,
            advance_x_adjustment: adjustment,
        });
        self.metrics.dirty_lookup_tables = true;
        true
    }

    /// Set a frequent-matrix entry directly (both codepoints below 128)
    pub(crate) fn set_frequent_kerning(&mut self, left: u32, right: u32, adjustment: f32) {
        let dim = FREQUENT_KERNING_DIM as u32;
        if left < dim && right < dim {
            self.frequent_kerning[(left * dim + right) as usize] = adjustment;
        }
    }

    /// Kerning run stored for `right` (fallback's run for unmapped codepoints)
    pub fn kerning_run(&self, right: u32) -> &[KerningPair] {
        let hot = self.hot_data(right);
        let start = hot.kerning_offset as usize;
        let end = start + hot.kerning_count as usize;
        self.kerning_pairs.get(start..end).unwrap_or(&[])
    }

    /// Advance adjustment to apply between `left` and `right`
    pub fn resolve_kerning(&self, left: u32, right: u32) -> f32 {
        let dim = FREQUENT_KERNING_DIM as u32;
        if left < dim && right < dim {
            return self.frequent_kerning[(left * dim + right) as usize];
        }
        if left > MAX_CODEPOINT {
            return 0.0;
        }

        let run = self.kerning_run(right);
        let found = if self.hot_data(right).kerning_bisect {
            bisect_run(run, left as u16)
        } else {
            scan_run(run, left as u16)
        };
        found.unwrap_or(0.0)
    }

    /// Pick fallback/ellipsis/dot characters among the glyphs present
    pub fn resolve_special_chars(&mut self, fallback: &[u16], ellipsis: &[u16], dot: &[u16]) {
        let table = &*self;
        let fallback_char = first_available(fallback, |c| table.contains(c as u32))
            .or_else(|| fallback.last().copied())
            .unwrap_or(SPACE);
        let ellipsis_char = first_available(ellipsis, |c| table.contains(c as u32));
        let dot_char = first_available(dot, |c| table.contains(c as u32));

        self.metrics.fallback_char = fallback_char;
        self.metrics.ellipsis_char = ellipsis_char;
        self.metrics.dot_char = dot_char;
    }

    /// Re-point every unmapped hot-data slot at the fallback glyph's hot data
    ///
    /// Must run after any bulk mutation of the glyph array.
    pub fn repair_hot_data(&mut self) {
        let fallback_char = self.metrics.fallback_char as u32;
        self.fallback_glyph = self.glyph_index(fallback_char);
        self.fallback_hot_data = match self.fallback_glyph {
            Some(_) => self.hot_data[fallback_char as usize],
            None => HotData::default(),
        };

        let fallback = self.fallback_hot_data;
        for (slot, &index) in self.hot_data.iter_mut().zip(&self.index_lookup) {
            if index == NO_GLYPH {
                *slot = fallback;
            }
        }
    }

    /// Return the dirty flag and clear it; hosts call this before rebuilding
    /// anything derived from the table's arrays
    pub fn take_lookup_tables_dirty(&mut self) -> bool {
        std::mem::take(&mut self.metrics.dirty_lookup_tables)
    }
}

/// Linear scan of a kerning run
fn scan_run(run: &[KerningPair], left: u16) -> Option<f32> {
    run.iter().find(|p| p.left == left).map(|p| p.advance_x_adjustment)
}

/// Binary search of a kerning run sorted by left
fn bisect_run(run: &[KerningPair], left: u16) -> Option<f32> {
    run.binary_search_by_key(&left, |p| p.left)
        .ok()
        .map(|i| run[i].advance_x_adjustment)
}
