//! fontconfig integration
//!
//! Resolves family names to font files (only with the `fontconfig` feature)

use fontconfig::Fontconfig;
use log::{debug, warn};
use std::path::PathBuf;

/// Font search result
#[derive(Debug, Clone)]
pub struct FontMatch {
    /// Font file path
    pub path: PathBuf,
    /// Family name reported by fontconfig
    pub family: String,
}

/// Search fonts using fontconfig
pub struct FontFinder {
    fc: Fontconfig,
}

impl FontFinder {
    /// None if fontconfig cannot be initialized
    pub fn new() -> Option<Self> {
        let fc = Fontconfig::new()?;
        debug!("fontconfig initialized");
        Some(Self { fc })
    }

    /// Search by family name
    ///
    /// fontconfig always answers with its closest match, so the result is
    /// only accepted when its family name overlaps the request.
    pub fn find_font(&self, family: &str) -> Option<FontMatch> {
        let font = self.fc.find(family, None)?;
        let req = family.to_ascii_lowercase();
        let got = font.name.to_ascii_lowercase();
        if got.contains(&req) || req.contains(&got) {
            return Some(FontMatch {
                path: font.path,
                family: font.name,
            });
        }
        warn!("fontconfig: rejected false match for \"{}\": got \"{}\"", family, font.name);
        None
    }
}
