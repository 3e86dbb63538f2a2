//! Font chains
//!
//! A chain composes several sub-fonts into one table. Entries are tried in
//! declared order and the first entry whose ranges cover a codepoint and whose
//! sub-font has a glyph for it supplies that glyph. Glyphs are copied, not
//! re-rasterized: the copy shares the source's texture and UV and only gets
//! the entry's letter spacing and offset applied.
//!
//! Composition of a batch runs in three steps driven by the owner of the
//! sub-fonts: `begin_batch`, then per entry `pending_for_entry` (what to
//! materialize in the sub-font) and `compose_entry`, then `finish_batch`.

use log::{debug, info};

use crate::constants::{
    DOT_CANDIDATES, ELLIPSIS_CANDIDATES, FALLBACK_CANDIDATES, FREQUENT_KERNING_DIM, MAX_CODEPOINT, SPACE,
};
use crate::error::{FontError, Result};
use crate::font::table::{FontMetrics, FontTable};

/// Inclusive codepoint range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodepointRange {
    pub start: u32,
    pub end: u32,
}

impl CodepointRange {
    /// Every codepoint a table can hold
    pub const ALL: Self = Self {
        start: 0,
        end: MAX_CODEPOINT,
    };

    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, codepoint: u32) -> bool {
        (self.start..=self.end).contains(&codepoint)
    }

    /// Codepoints of the range, clamped to what a table can hold
    pub fn codepoints(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end.min(MAX_CODEPOINT)
    }
}

/// One sub-font of a chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEntry {
    /// Codepoints this entry may supply (empty = all)
    pub ranges: Vec<CodepointRange>,
    /// Pixel size the sub-font was created at
    pub size_px: f32,
    /// Added to every copied glyph's advance
    pub letter_spacing: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl ChainEntry {
    pub fn new(size_px: f32) -> Self {
        Self {
            ranges: Vec::new(),
            size_px,
            letter_spacing: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    pub fn with_ranges(mut self, ranges: Vec<CodepointRange>) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn with_letter_spacing(mut self, letter_spacing: f32) -> Self {
        self.letter_spacing = letter_spacing;
        self
    }

    pub fn with_offset(mut self, offset_x: f32, offset_y: f32) -> Self {
        self.offset_x = offset_x;
        self.offset_y = offset_y;
        self
    }

    pub fn covers(&self, codepoint: u32) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(|r| r.contains(codepoint))
    }
}

/// Ordered composition of sub-fonts
#[derive(Debug, Clone, PartialEq)]
pub struct FontChain {
    pub entries: Vec<ChainEntry>,
    /// Line height as a multiple of the first entry's size
    pub line_height: f32,
}

impl FontChain {
    pub fn new(entries: Vec<ChainEntry>, line_height: f32) -> Self {
        Self { entries, line_height }
    }
}

/// Builds and extends the table of one chain
#[derive(Debug, Clone)]
pub struct ChainComposer {
    chain: FontChain,
    /// Entry that supplied each codepoint below 128
    low_suppliers: [Option<usize>; FREQUENT_KERNING_DIM],
}

impl ChainComposer {
    pub fn new(chain: FontChain) -> Result<Self> {
        let first = chain.entries.first().ok_or(FontError::EmptyChain)?;
        if !(chain.line_height.is_finite() && chain.line_height > 0.0) {
            return Err(FontError::InvalidScale(chain.line_height));
        }
        if let Some(bad) = chain.entries.iter().find(|e| !(e.size_px.is_finite() && e.size_px > 0.0)) {
            return Err(FontError::InvalidSize(bad.size_px));
        }
        debug!(
            "Font chain: {} entries, first {:.1}px, line height {:.2}",
            chain.entries.len(),
            first.size_px,
            chain.line_height
        );
        Ok(Self {
            chain,
            low_suppliers: [None; FREQUENT_KERNING_DIM],
        })
    }

    pub fn chain(&self) -> &FontChain {
        &self.chain
    }

    /// Extra vertical space an entry gets from the line height
    pub fn line_padding(&self, entry: &ChainEntry) -> f32 {
        entry.size_px * (self.chain.line_height - 1.0)
    }

    /// Layout offset applied to glyphs copied from entry `index`
    pub fn entry_offset(&self, index: usize) -> (f32, f32) {
        let entry = &self.chain.entries[index];
        (
            entry.offset_x.round(),
            (entry.offset_y + self.line_padding(entry) / 2.0).round(),
        )
    }

    /// Empty chain table with metrics derived from the first sub-font
    pub fn create_table(&self, first: &FontMetrics) -> FontTable {
        let entry = &self.chain.entries[0];
        let half_pad = self.line_padding(entry) / 2.0;

        let mut table = FontTable::new();
        table.metrics.font_size = (entry.size_px * self.chain.line_height).round();
        table.metrics.ascent = first.ascent + half_pad;
        table.metrics.descent = first.descent + half_pad;
        table.metrics.scale = first.scale;
        info!(
            "Chain font created: {:.0}px (ascent {:.1}, descent {:.1})",
            table.metrics.font_size, table.metrics.ascent, table.metrics.descent
        );
        table
    }

    /// Codepoints loaded into every new chain
    pub fn preload_codepoints() -> Vec<u32> {
        std::iter::once(SPACE)
            .chain(FALLBACK_CANDIDATES)
            .chain(ELLIPSIS_CANDIDATES)
            .chain(DOT_CANDIDATES)
            .map(u32::from)
            .collect()
    }

    /// Grow the table for a batch; returns false if there is nothing to do
    pub fn begin_batch(&self, table: &mut FontTable, batch: &[u32]) -> bool {
        let Some(max) = batch
            .iter()
            .copied()
            .filter(|&c| c <= MAX_CODEPOINT && !table.is_attempted(c))
            .max()
        else {
            return false;
        };
        table.ensure_index_capacity(max);
        true
    }

    /// Codepoints of `batch` that entry `index` may still supply
    pub fn pending_for_entry(&self, table: &FontTable, index: usize, batch: &[u32]) -> Vec<u32> {
        let entry = &self.chain.entries[index];
        batch
            .iter()
            .copied()
            .filter(|&c| c <= MAX_CODEPOINT && !table.is_attempted(c) && !table.contains(c) && entry.covers(c))
            .collect()
    }

    /// Copy the glyphs `source` has for `codepoints` into the chain table
    ///
    /// `source` must be the (already materialized) sub-font of entry `index`.
    /// Returns the number of glyphs copied.
    pub fn compose_entry(
        &mut self,
        table: &mut FontTable,
        index: usize,
        source: &FontTable,
        codepoints: &[u32],
    ) -> Result<usize> {
        let letter_spacing = self.chain.entries[index].letter_spacing;
        let (dx, dy) = self.entry_offset(index);

        let mut low_supplied = Vec::new();
        let mut run_rights = Vec::new();
        let mut copied = 0;
        for &codepoint in codepoints {
            if table.contains(codepoint) {
                continue;
            }
            let Some(src) = source.find_glyph(codepoint) else {
                continue;
            };
            let mut glyph = *src;
            glyph.advance_x += letter_spacing;
            glyph.translate(dx, dy);
            table.push_glyph(glyph)?;
            copied += 1;
            if !source.kerning_run(codepoint).is_empty() {
                run_rights.push(codepoint);
            }

            if (codepoint as usize) < FREQUENT_KERNING_DIM {
                self.low_suppliers[codepoint as usize] = Some(index);
                low_supplied.push(codepoint);
            }
        }

        self.copy_low_kerning(table, index, source, &low_supplied);
        self.copy_kerning_runs(table, index, source, &run_rights);
        Ok(copied)
    }

    /// Carry the sub-font's kerning runs over for right codepoints entry
    /// `index` supplied
    ///
    /// Pairs with both codepoints below 128 live in the frequent matrix and
    /// are left to `copy_low_kerning`. A left codepoint must be covered by the
    /// same entry.
    fn copy_kerning_runs(&self, table: &mut FontTable, index: usize, source: &FontTable, rights: &[u32]) {
        let entry = &self.chain.entries[index];
        let dim = FREQUENT_KERNING_DIM as u32;
        for &right in rights {
            for pair in source.kerning_run(right) {
                let left = pair.left as u32;
                if (left < dim && right < dim) || !entry.covers(left) {
                    continue;
                }
                table.add_kerning_pair(left, right, pair.advance_x_adjustment);
            }
        }
    }

    /// Carry the sub-font's frequent kerning over for low codepoints that
    /// entry `index` supplied
    fn copy_low_kerning(&self, table: &mut FontTable, index: usize, source: &FontTable, added: &[u32]) {
        if added.is_empty() {
            return;
        }
        let dim = FREQUENT_KERNING_DIM as u32;
        let frequent = source.frequent_kerning();
        let partners: Vec<u32> = (0..dim)
            .filter(|&c| self.low_suppliers[c as usize] == Some(index))
            .collect();

        for &new in added {
            for &other in &partners {
                table.set_frequent_kerning(new, other, frequent[(new * dim + other) as usize]);
                table.set_frequent_kerning(other, new, frequent[(other * dim + new) as usize]);
            }
        }
    }

    /// Mark the batch attempted, pick the special characters and repair
    pub fn finish_batch(&self, table: &mut FontTable, batch: &[u32]) {
        for &codepoint in batch {
            table.mark_attempted(codepoint);
        }
        table.resolve_special_chars(&FALLBACK_CANDIDATES, &ELLIPSIS_CANDIDATES, &DOT_CANDIDATES);
        table.repair_hot_data();
    }
}
