//! Font collection
//!
//! Arena owning the shared atlas and every font built on it. Fonts refer to
//! each other by `FontId`; a chain or scaled font only ever refers to fonts
//! created before it, so a chain's sub-fonts always sit below it in the arena.

use log::{debug, info};
use std::fmt;

use crate::config::Config;
use crate::error::{FontError, Result};
use crate::font::atlas::{check_texture_data, GlyphAtlas, TextureHost};
use crate::font::baked::{import_baked, BakedFontDescription};
use crate::font::chain::{ChainComposer, CodepointRange, FontChain};
use crate::font::on_demand::{OnDemandRasterizer, TextBackend};
use crate::font::scaled::{scale_table, ScaleMode};
use crate::font::system::FontdueBackend;
use crate::font::table::FontTable;

/// Handle to a font of a `FontCollection`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontId(usize);

impl FontId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Font variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontKind {
    Baked,
    OnDemand,
    Scaled,
    Chain,
}

enum FontSource {
    Baked,
    OnDemand(OnDemandRasterizer),
    Scaled {
        base: FontId,
        scale: f32,
        mode: ScaleMode,
    },
    Chain {
        composer: ChainComposer,
        sub_fonts: Vec<FontId>,
    },
}

/// One font of the collection
pub struct Font {
    table: FontTable,
    source: FontSource,
}

impl Font {
    pub fn kind(&self) -> FontKind {
        match self.source {
            FontSource::Baked => FontKind::Baked,
            FontSource::OnDemand(_) => FontKind::OnDemand,
            FontSource::Scaled { .. } => FontKind::Scaled,
            FontSource::Chain { .. } => FontKind::Chain,
        }
    }

    pub fn table(&self) -> &FontTable {
        &self.table
    }

    /// Sub-fonts of a chain, in entry order (empty for other kinds)
    pub fn sub_fonts(&self) -> &[FontId] {
        match &self.source {
            FontSource::Chain { sub_fonts, .. } => sub_fonts,
            _ => &[],
        }
    }

    /// Base font and factor of a scaled font
    pub fn scale_base(&self) -> Option<(FontId, f32, ScaleMode)> {
        match self.source {
            FontSource::Scaled { base, scale, mode } => Some((base, scale, mode)),
            _ => None,
        }
    }
}

impl fmt::Debug for Font {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Font")
            .field("kind", &self.kind())
            .field("font_size", &self.table.metrics.font_size)
            .field("glyphs", &self.table.glyphs().len())
            .finish()
    }
}

/// Owner of the atlas and all fonts
#[derive(Debug)]
pub struct FontCollection {
    config: Config,
    atlas: GlyphAtlas,
    fonts: Vec<Font>,
}

impl FontCollection {
    /// Collection with a headless atlas
    pub fn new(config: Config) -> Self {
        let atlas = GlyphAtlas::new(config.atlas.clone());
        Self {
            config,
            atlas,
            fonts: Vec::new(),
        }
    }

    pub fn with_host(config: Config, host: Box<dyn TextureHost>) -> Self {
        let atlas = GlyphAtlas::with_host(config.atlas.clone(), host);
        Self {
            config,
            atlas,
            fonts: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn atlas(&self) -> &GlyphAtlas {
        &self.atlas
    }

    pub fn atlas_mut(&mut self) -> &mut GlyphAtlas {
        &mut self.atlas
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn font(&self, id: FontId) -> Result<&Font> {
        self.fonts.get(id.0).ok_or(FontError::UnknownFont(id.0))
    }

    pub fn table(&self, id: FontId) -> Result<&FontTable> {
        self.font(id).map(Font::table)
    }

    fn push(&mut self, table: FontTable, source: FontSource) -> FontId {
        let id = FontId(self.fonts.len());
        self.fonts.push(Font { table, source });
        id
    }

    /// Import a baked font whose textures are already registered
    ///
    /// `texture_map[file_index]` is the atlas index returned by
    /// `GlyphAtlas::register_texture` for that file.
    pub fn add_baked(&mut self, desc: &BakedFontDescription, texture_map: &[u8]) -> Result<FontId> {
        let table = import_baked(desc, texture_map)?;
        Ok(self.push(table, FontSource::Baked))
    }

    /// Register the baked textures (BGRA8, one per file) and import the font
    ///
    /// The import runs against the indices the textures will get, so nothing
    /// is registered unless the whole font is accepted.
    pub fn add_baked_with_textures(&mut self, desc: &BakedFontDescription, textures: Vec<Vec<u8>>) -> Result<FontId> {
        let needed = desc.texture_file_count();
        if needed > textures.len() {
            return Err(FontError::UnmappedTexture(textures.len() as u16));
        }
        if textures.len() > self.atlas.free_texture_slots() {
            return Err(FontError::AtlasExhausted {
                max: self.atlas.config().max_textures,
            });
        }
        let (w, h) = (desc.header.texture_width, desc.header.texture_height);
        for pixels in &textures {
            check_texture_data(w, h, pixels)?;
        }

        let base = self.atlas.textures().len();
        let texture_map: Vec<u8> = (base..base + textures.len()).map(|i| i as u8).collect();
        let table = import_baked(desc, &texture_map)?;

        for (pixels, &expected) in textures.into_iter().zip(&texture_map) {
            let index = self.atlas.register_texture(w, h, Some(pixels))?;
            debug_assert_eq!(index, expected);
        }
        Ok(self.push(table, FontSource::Baked))
    }

    /// Lazily rasterized font on top of any text backend
    pub fn add_on_demand(&mut self, backend: Box<dyn TextBackend>, size_px: f32) -> Result<FontId> {
        let preload = self.config.fonts.preload_codepoints();
        let (rasterizer, table) = OnDemandRasterizer::new(backend, size_px, &mut self.atlas, &preload)?;
        Ok(self.push(table, FontSource::OnDemand(rasterizer)))
    }

    /// On-demand font for a system family (or font file path)
    pub fn add_system_font(&mut self, family: &str, size_px: f32) -> Result<FontId> {
        let backend = FontdueBackend::from_family(family, &self.config.fonts.search_dirs)?;
        self.add_on_demand(Box::new(backend), size_px)
    }

    /// Snapshot of `base` with every layout value scaled
    pub fn add_scaled(&mut self, base: FontId, scale: f32, mode: ScaleMode) -> Result<FontId> {
        let table = scale_table(self.table(base)?, scale, mode)?;
        Ok(self.push(table, FontSource::Scaled { base, scale, mode }))
    }

    /// Compose `sub_fonts` (paired 1:1 with the chain entries)
    pub fn add_chain(&mut self, chain: FontChain, sub_fonts: &[FontId]) -> Result<FontId> {
        if chain.entries.len() != sub_fonts.len() {
            return Err(FontError::ChainArity {
                entries: chain.entries.len(),
                sources: sub_fonts.len(),
            });
        }
        for id in sub_fonts {
            self.font(*id)?;
        }
        let composer = ChainComposer::new(chain)?;
        let first = self.table(sub_fonts[0])?.metrics;
        let table = composer.create_table(&first);

        let id = self.push(
            table,
            FontSource::Chain {
                composer,
                sub_fonts: sub_fonts.to_vec(),
            },
        );
        if let Err(e) = self.load_glyphs(id, &ChainComposer::preload_codepoints()) {
            self.fonts.pop();
            return Err(e);
        }
        Ok(id)
    }

    /// Make sure glyphs for `codepoints` are loaded (or known absent)
    ///
    /// Returns the number of glyphs added to the font itself.
    pub fn load_glyphs(&mut self, id: FontId, codepoints: &[u32]) -> Result<usize> {
        self.font(id)?;
        let added = load_in(&mut self.fonts, id.0, &mut self.atlas, codepoints)?;
        if added > 0 {
            debug!("Font {}: {} glyphs added", id.0, added);
        }
        Ok(added)
    }

    /// `load_glyphs` over inclusive ranges
    pub fn load_ranges(&mut self, id: FontId, ranges: &[CodepointRange]) -> Result<usize> {
        let codepoints: Vec<u32> = ranges.iter().flat_map(|r| r.codepoints()).collect();
        self.load_glyphs(id, &codepoints)
    }

    /// Upload changed atlas textures through the host
    pub fn update_textures(&mut self) -> usize {
        self.atlas.update_textures()
    }

    /// Drop every font (the atlas keeps its textures)
    pub fn clear(&mut self) {
        info!("Font collection cleared ({} fonts)", self.fonts.len());
        self.fonts.clear();
    }
}

/// Load into font `id`, recursing into chain sub-fonts
fn load_in(fonts: &mut [Font], id: usize, atlas: &mut GlyphAtlas, codepoints: &[u32]) -> Result<usize> {
    let (below, rest) = fonts.split_at_mut(id);
    let Font { table, source } = &mut rest[0];

    match source {
        FontSource::Baked | FontSource::Scaled { .. } => Ok(0),
        FontSource::OnDemand(rasterizer) => rasterizer.load_glyphs(table, atlas, codepoints),
        FontSource::Chain { composer, sub_fonts } => {
            if !composer.begin_batch(table, codepoints) {
                return Ok(0);
            }
            let before = table.glyphs().len();
            match compose_chain(below, table, composer, sub_fonts, atlas, codepoints) {
                Ok(()) => {
                    composer.finish_batch(table, codepoints);
                    Ok(table.glyphs().len() - before)
                }
                Err(e) => {
                    table.repair_hot_data();
                    Err(e)
                }
            }
        }
    }
}

fn compose_chain(
    below: &mut [Font],
    table: &mut FontTable,
    composer: &mut ChainComposer,
    sub_fonts: &[FontId],
    atlas: &mut GlyphAtlas,
    codepoints: &[u32],
) -> Result<()> {
    for (index, sub) in sub_fonts.iter().enumerate() {
        let wanted = composer.pending_for_entry(table, index, codepoints);
        if wanted.is_empty() {
            continue;
        }
        if sub.0 >= below.len() {
            return Err(FontError::InvalidSubFont(sub.0));
        }
        load_in(below, sub.0, atlas, &wanted)?;
        composer.compose_entry(table, index, &below[sub.0].table, &wanted)?;
    }
    Ok(())
}
