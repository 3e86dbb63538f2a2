//! System fonts
//!
//! `TextBackend` implementation on top of fontdue, plus family-name lookup.
//!
//! Lookup order for a family:
//! 1. The name itself, if it is a path to a font file
//! 2. fontconfig (with the `fontconfig` feature)
//! 3. Scan of the configured and well-known font directories

use fontdue::{Font, FontSettings};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::error::{FontError, Result};
use crate::font::on_demand::{GlyphBounds, GlyphMeasure, LineMetrics, TextBackend};

/// Font file extensions fontdue can parse
const FONT_EXTENSIONS: [&str; 3] = ["ttf", "otf", "ttc"];

/// Directory levels descended while scanning
const MAX_SCAN_DEPTH: usize = 4;

/// Well-known system font directories
const SYSTEM_FONT_DIRS: [&str; 5] = [
    "/usr/share/fonts",
    "/usr/local/share/fonts",
    // macOS (development/testing)
    "/System/Library/Fonts",
    "/Library/Fonts",
    "C:\\Windows\\Fonts",
];

/// fontdue-backed text backend
pub struct FontdueBackend {
    font: Font,
    name: String,
}

impl FontdueBackend {
    /// Parse font data
    pub fn from_bytes(data: &[u8], name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let font = Font::from_bytes(data, FontSettings::default())
            .map_err(|e| FontError::InvalidFont(format!("{}: {}", name, e)))?;
        debug!("Font parsed: {} ({} glyphs)", name, font.glyph_count());
        Ok(Self { font, name })
    }

    /// Read and parse a font file
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let backend = Self::from_bytes(&data, path.display().to_string())?;
        info!("Font loaded: {}", path.display());
        Ok(backend)
    }

    /// Resolve a family name (or path) and load it
    pub fn from_family(family: &str, search_dirs: &[String]) -> Result<Self> {
        let path = find_family(family, search_dirs).ok_or_else(|| FontError::FamilyNotFound(family.to_string()))?;
        info!("Font family resolved: \"{}\" -> {}", family, path.display());
        Self::from_path(&path)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TextBackend for FontdueBackend {
    fn glyph_index(&self, codepoint: u32) -> u16 {
        char::from_u32(codepoint).map_or(0, |c| self.font.lookup_glyph_index(c))
    }

    fn line_metrics(&self, size_px: f32) -> LineMetrics {
        match self.font.horizontal_line_metrics(size_px) {
            Some(m) => LineMetrics {
                ascent: m.ascent,
                descent: -m.descent,
            },
            // Fonts without hhea data
            None => LineMetrics {
                ascent: size_px * 0.8,
                descent: size_px * 0.2,
            },
        }
    }

    fn measure(&self, glyph_index: u16, size_px: f32) -> GlyphMeasure {
        let m = self.font.metrics_indexed(glyph_index, size_px);
        // fontdue measures ymin upward from the baseline
        GlyphMeasure {
            advance_x: m.advance_width,
            bounds: GlyphBounds {
                left: m.xmin,
                top: -(m.ymin + m.height as i32),
                right: m.xmin + m.width as i32,
                bottom: -m.ymin,
            },
        }
    }

    fn rasterize(&self, glyph_index: u16, size_px: f32, bounds: &GlyphBounds, mask: &mut [u8]) {
        let (m, bitmap) = self.font.rasterize_indexed(glyph_index, size_px);
        let dst_width = bounds.width() as usize;
        if m.width == 0 || dst_width == 0 {
            return;
        }
        let copy_width = m.width.min(dst_width);
        for (src, dst) in bitmap.chunks_exact(m.width).zip(mask.chunks_exact_mut(dst_width)) {
            dst[..copy_width].copy_from_slice(&src[..copy_width]);
        }
    }
}

/// Find the font file of a family
pub fn find_family(family: &str, search_dirs: &[String]) -> Option<PathBuf> {
    let path = Path::new(family);
    if path.is_file() && has_font_extension(path) {
        return Some(path.to_path_buf());
    }

    #[cfg(feature = "fontconfig")]
    {
        if let Some(m) = super::fontconfig::FontFinder::new().and_then(|f| f.find_font(family)) {
            debug!("fontconfig match for \"{}\": {}", family, m.family);
            return Some(m.path);
        }
    }

    let wanted = normalize_family(family);
    if wanted.is_empty() {
        return None;
    }
    let mut best: Option<(u8, PathBuf)> = None;
    for dir in font_dirs(search_dirs) {
        scan_dir(&dir, &wanted, 0, &mut best);
        if matches!(best, Some((0, _))) {
            break;
        }
    }
    best.map(|(_, p)| p)
}

/// Directories searched for font files, in priority order
pub fn font_dirs(search_dirs: &[String]) -> Vec<PathBuf> {
    let mut dirs_out: Vec<PathBuf> = search_dirs.iter().map(PathBuf::from).collect();
    if let Some(user) = dirs::font_dir() {
        dirs_out.push(user);
    }
    if let Some(data) = dirs::data_dir() {
        dirs_out.push(data.join("fonts"));
    }
    dirs_out.extend(SYSTEM_FONT_DIRS.iter().map(PathBuf::from));
    dirs_out.dedup();
    dirs_out
}

/// Lowercase alphanumerics only ("DejaVu Sans-Mono" -> "dejavusansmono")
fn normalize_family(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn has_font_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| FONT_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Rank a file stem against the wanted family (lower is better)
fn match_rank(stem: &str, wanted: &str) -> Option<u8> {
    let stem = normalize_family(stem);
    if stem == wanted {
        Some(0)
    } else if stem == format!("{}regular", wanted) {
        Some(1)
    } else if stem.starts_with(wanted) {
        Some(2)
    } else {
        None
    }
}

fn scan_dir(dir: &Path, wanted: &str, depth: usize, best: &mut Option<(u8, PathBuf)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if depth < MAX_SCAN_DEPTH {
                scan_dir(&path, wanted, depth + 1, best);
            }
            continue;
        }
        if !has_font_extension(&path) {
            continue;
        }
        let Some(rank) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| match_rank(s, wanted)) else {
            continue;
        };
        if best.as_ref().map_or(true, |(r, _)| rank < *r) {
            *best = Some((rank, path));
        }
    }
}
