//! Glyph atlas
//!
//! Owns the growable list of atlas textures and packs glyph bitmaps into them.
//! Monochrome glyphs share texels four ways: every channel-packed texture keeps
//! one rectangle packer per colour channel, so four unrelated glyphs can sit at
//! the same texel rectangle in R, G, B and A. Colour glyphs go to unpacked
//! textures. Pixel data stays CPU-side; the host uploads changed textures.

use etagere::{size2, AtlasAllocator};
use log::{debug, info};
use std::fmt;

use crate::config::AtlasConfig;
use crate::constants::{BYTES_PER_TEXEL, CHANNELS_PER_TEXTURE, TEXTURE_INDEX_EXHAUSTED};
use crate::error::{FontError, Result};
use crate::font::table::GlyphRecord;

/// How a texture's texels are shared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// Four independent single-channel packers
    ChannelPacked,
    /// One packer, glyphs own all four bytes of a texel
    Color,
    /// Registered by the caller (pre-baked), never packed into
    External,
}

/// One atlas texture (BGRA8)
pub struct AtlasTexture {
    width: u32,
    height: u32,
    kind: TextureKind,
    pixels: Vec<u8>,
    packers: Vec<AtlasAllocator>,
    changed: bool,
}

impl AtlasTexture {
    fn new(kind: TextureKind, width: u32, height: u32) -> Self {
        let packer_count = match kind {
            TextureKind::ChannelPacked => CHANNELS_PER_TEXTURE,
            TextureKind::Color => 1,
            TextureKind::External => 0,
        };
        let packers = (0..packer_count)
            .map(|_| AtlasAllocator::new(size2(width as i32, height as i32)))
            .collect();
        Self {
            width,
            height,
            kind,
            pixels: vec![0u8; width as usize * height as usize * BYTES_PER_TEXEL],
            packers,
            changed: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    /// BGRA8 texels, row-major (empty for external textures without data)
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Needs re-upload
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Try each packer in order; returns (packer slot, left, top)
    fn pack(&mut self, width: u32, height: u32) -> Option<(usize, u32, u32)> {
        let size = size2(width as i32, height as i32);
        self.packers.iter_mut().enumerate().find_map(|(slot, packer)| {
            packer
                .allocate(size)
                .map(|alloc| (slot, alloc.rectangle.min.x as u32, alloc.rectangle.min.y as u32))
        })
    }
}

impl fmt::Debug for AtlasTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtlasTexture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("kind", &self.kind)
            .field("changed", &self.changed)
            .finish()
    }
}

/// Texture registration on the host rendering library
pub trait TextureHost {
    /// The texture list grew; `index` is the new texture's slot
    fn texture_added(&mut self, index: u8, texture: &AtlasTexture);

    /// Pixels of texture `index` changed since the last upload
    fn texture_updated(&mut self, index: u8, texture: &AtlasTexture);
}

/// Host that ignores every notification (headless use)
#[derive(Debug, Default)]
pub struct NullTextureHost;

impl TextureHost for NullTextureHost {
    fn texture_added(&mut self, _index: u8, _texture: &AtlasTexture) {}

    fn texture_updated(&mut self, _index: u8, _texture: &AtlasTexture) {}
}

/// Where a glyph bitmap landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub texture_index: u8,
    /// None for unpacked (colour) textures
    pub channel: Option<u8>,
    /// Texel origin of the bitmap (after padding)
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Gamma mapping table for 8-bit coverage
#[derive(Debug, Clone)]
pub struct GammaTable {
    gamma: f32,
    table: [u8; 256],
}

impl GammaTable {
    pub fn new(gamma: f32) -> Self {
        let mut table = [0u8; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = ((i as f32 / 255.0).clamp(0.0, 1.0).powf(1.0 / gamma) * 255.0) as u8;
        }
        Self { gamma, table }
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    #[inline]
    pub fn map(&self, coverage: u8) -> u8 {
        self.table[coverage as usize]
    }

    /// Rebuild if gamma moved noticeably; returns whether it was rebuilt
    pub fn set_gamma(&mut self, gamma: f32) -> bool {
        if (self.gamma - gamma).abs() < 0.0001 {
            return false;
        }
        *self = Self::new(gamma);
        true
    }
}

/// Shared texture atlas
pub struct GlyphAtlas {
    config: AtlasConfig,
    textures: Vec<AtlasTexture>,
    host: Box<dyn TextureHost>,
    gamma: GammaTable,
    suppress_updates: u32,
}

impl GlyphAtlas {
    /// Atlas without a host (headless)
    pub fn new(config: AtlasConfig) -> Self {
        Self::with_host(config, Box::new(NullTextureHost))
    }

    pub fn with_host(config: AtlasConfig, host: Box<dyn TextureHost>) -> Self {
        let config = config.validated();
        info!(
            "Glyph atlas: {}x{} textures, padding {}, gamma {:.2}, up to {} textures",
            config.texture_width, config.texture_height, config.glyph_padding, config.gamma, config.max_textures
        );
        Self {
            gamma: GammaTable::new(config.gamma),
            config,
            textures: Vec::new(),
            host,
            suppress_updates: 0,
        }
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn textures(&self) -> &[AtlasTexture] {
        &self.textures
    }

    pub fn texture(&self, index: u8) -> Option<&AtlasTexture> {
        self.textures.get(index as usize)
    }

    pub fn gamma_table(&self) -> &GammaTable {
        &self.gamma
    }

    /// Change gamma for glyphs rasterized from now on
    pub fn set_gamma(&mut self, gamma: f32) {
        if self.gamma.set_gamma(gamma) {
            debug!("Gamma table rebuilt for gamma {:.2}", gamma);
        }
    }

    /// Register a pre-baked texture and return its atlas index
    ///
    /// `pixels` are BGRA8 texels; None leaves pixel data host-side.
    pub fn register_texture(&mut self, width: u32, height: u32, pixels: Option<Vec<u8>>) -> Result<u8> {
        let mut texture = AtlasTexture::new(TextureKind::External, width, height);
        match pixels {
            Some(data) => {
                check_texture_data(width, height, &data)?;
                texture.pixels = data;
            }
            None => texture.pixels = Vec::new(),
        }
        self.push_texture(texture)
    }

    /// Atlas slots still free under `max_textures`
    pub fn free_texture_slots(&self) -> usize {
        self.config.max_textures.saturating_sub(self.textures.len())
    }

    fn push_texture(&mut self, texture: AtlasTexture) -> Result<u8> {
        if self.textures.len() >= self.config.max_textures {
            return Err(FontError::AtlasExhausted {
                max: self.config.max_textures,
            });
        }
        let index = self.textures.len() as u8;
        info!(
            "Atlas texture {} added: {}x{} {:?}",
            index, texture.width, texture.height, texture.kind
        );
        self.host.texture_added(index, &texture);
        self.textures.push(texture);
        Ok(index)
    }

    /// Reserve space for a glyph and write its texture index and UV
    ///
    /// Invisible glyphs are left untouched and return None.
    pub fn allocate(&mut self, glyph: &mut GlyphRecord) -> Result<Option<Placement>> {
        if !glyph.visible {
            return Ok(None);
        }

        let width = glyph.width().max(0.0).ceil() as u32;
        let height = glyph.height().max(0.0).ceil() as u32;
        let placement = match self.allocate_rect(glyph.codepoint, width, height, glyph.colored) {
            Ok(p) => p,
            Err(e) => {
                glyph.texture_index = TEXTURE_INDEX_EXHAUSTED;
                return Err(e);
            }
        };

        let texture = &self.textures[placement.texture_index as usize];
        let tw = texture.width as f32;
        let th = texture.height as f32;
        let du = placement.channel.map_or(0.0, |c| 1.0 + c as f32);

        glyph.texture_index = placement.texture_index;
        glyph.u0 = du + placement.x as f32 / tw;
        glyph.u1 = du + (placement.x + placement.width) as f32 / tw;
        glyph.v0 = placement.y as f32 / th;
        glyph.v1 = (placement.y + placement.height) as f32 / th;
        Ok(Some(placement))
    }

    /// Find room for a `width` x `height` bitmap (plus padding)
    pub fn allocate_rect(&mut self, codepoint: u16, width: u32, height: u32, colored: bool) -> Result<Placement> {
        let pad = self.config.glyph_padding;
        let (alloc_w, alloc_h) = (width + pad, height + pad);
        let kind = if colored {
            TextureKind::Color
        } else {
            TextureKind::ChannelPacked
        };

        for (index, texture) in self.textures.iter_mut().enumerate() {
            if texture.kind != kind {
                continue;
            }
            if let Some(packed) = texture.pack(alloc_w, alloc_h) {
                return Ok(Self::placement(index, kind, packed, width, height, pad));
            }
        }

        let (tw, th) = (self.config.texture_width, self.config.texture_height);
        let too_large = FontError::GlyphTooLarge {
            codepoint,
            width,
            height,
            texture_width: tw,
            texture_height: th,
        };
        if alloc_w > tw || alloc_h > th {
            return Err(too_large);
        }

        let index = self.push_texture(AtlasTexture::new(kind, tw, th))?;
        let packed = self.textures[index as usize]
            .pack(alloc_w, alloc_h)
            .ok_or(too_large)?;
        Ok(Self::placement(index as usize, kind, packed, width, height, pad))
    }

    /// `packed` is (packer slot, rect left, rect top)
    fn placement(index: usize, kind: TextureKind, packed: (usize, u32, u32), width: u32, height: u32, pad: u32) -> Placement {
        let (slot, left, top) = packed;
        Placement {
            texture_index: index as u8,
            channel: (kind == TextureKind::ChannelPacked).then_some(slot as u8),
            x: left + pad,
            y: top + pad,
            width,
            height,
        }
    }

    /// Texture to blit into, with the current gamma table
    pub(crate) fn blit_target(&mut self, index: u8) -> Option<(&mut AtlasTexture, &GammaTable)> {
        let gamma = &self.gamma;
        self.textures.get_mut(index as usize).map(|t| (t, gamma))
    }

    /// Flag a texture for re-upload; returns false if it was already flagged
    pub fn mark_changed(&mut self, index: u8) -> bool {
        match self.textures.get_mut(index as usize) {
            Some(t) if !t.changed => {
                t.changed = true;
                true
            }
            _ => false,
        }
    }

    /// Hand changed textures to the host unless updates are suppressed
    ///
    /// Returns the number of textures uploaded.
    pub fn update_textures(&mut self) -> usize {
        if self.suppress_updates > 0 {
            return 0;
        }
        let mut uploaded = 0;
        for (index, texture) in self.textures.iter_mut().enumerate() {
            if !texture.changed {
                continue;
            }
            self.host.texture_updated(index as u8, texture);
            texture.changed = false;
            uploaded += 1;
        }
        if uploaded > 0 {
            debug!("Atlas textures re-uploaded: {}", uploaded);
        }
        uploaded
    }

    /// Hold back uploads until the matching `resume_updates`
    pub fn suppress_updates(&mut self) {
        self.suppress_updates += 1;
    }

    /// Release one suppression; the last release uploads pending changes
    pub fn resume_updates(&mut self) {
        self.suppress_updates = self.suppress_updates.saturating_sub(1);
        if self.suppress_updates == 0 {
            self.update_textures();
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppress_updates > 0
    }
}

impl fmt::Debug for GlyphAtlas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlyphAtlas")
            .field("config", &self.config)
            .field("textures", &self.textures)
            .field("suppress_updates", &self.suppress_updates)
            .finish()
    }
}

/// Check that `data` holds exactly `width` x `height` BGRA8 texels
pub(crate) fn check_texture_data(width: u32, height: u32, data: &[u8]) -> Result<()> {
    let expected = width as usize * height as usize * BYTES_PER_TEXEL;
    if data.len() != expected {
        return Err(FontError::TextureSize {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}
