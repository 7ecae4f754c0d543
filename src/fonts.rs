//! Font registry and text measurement.
//!
//! Faces come from `@font-face` rules and are parsed with `ttf-parser`;
//! text set in them is measured by shaping with `rustybuzz`. Families that
//! are not loaded fall back to the PDF base-14 fonts, measured with an
//! average-advance heuristic.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::css::{FontFace, Stylesheet};

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font file bytes, shared by measurement and PDF embedding.
    pub bytes: Vec<u8>,
    /// Face index inside a `.ttc` collection.
    pub index: u32,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
    pub line_gap: f32,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontKey {
    /// Lower-cased family name.
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

impl FontKey {
    pub fn new(family: &str, bold: bool, italic: bool) -> Self {
        Self {
            family: family.trim().to_ascii_lowercase(),
            bold,
            italic,
        }
    }
}

/// PDF base-14 families used when no loaded face matches.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinFamily {
    Helvetica,
    Times,
    Courier,
}

impl BuiltinFamily {
    /// Map a family or generic name onto a base-14 family.
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "serif" | "times" | "times new roman" | "times-roman" => Some(Self::Times),
            "monospace" | "courier" | "courier new" => Some(Self::Courier),
            "sans-serif" | "helvetica" | "arial" | "system-ui" => Some(Self::Helvetica),
            _ => None,
        }
    }

    /// Average advance as a fraction of the font size.
    fn average_advance(self, bold: bool) -> f32 {
        match (self, bold) {
            (Self::Helvetica, false) => 0.5,
            (Self::Helvetica, true) => 0.55,
            (Self::Times, false) => 0.45,
            (Self::Times, true) => 0.5,
            (Self::Courier, _) => 0.6,
        }
    }
}

/// The face a text run is set in.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontChoice {
    Loaded(FontKey),
    Builtin {
        family: BuiltinFamily,
        bold: bool,
        italic: bool,
    },
}

impl Default for FontChoice {
    fn default() -> Self {
        FontChoice::Builtin {
            family: BuiltinFamily::Helvetica,
            bold: false,
            italic: false,
        }
    }
}

/// Manages loaded fonts.
#[derive(Default)]
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
}

impl FontManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TTF/OTF face (or face `index` of a collection) from bytes.
    pub fn load_font(
        &mut self,
        family: &str,
        bold: bool,
        italic: bool,
        bytes: Vec<u8>,
        index: u32,
    ) -> Result<(), ttf_parser::FaceParsingError> {
        let face = ttf_parser::Face::parse(&bytes, index)?;
        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            line_gap: face.line_gap() as f32,
            index,
            bytes,
        };
        self.fonts.insert(FontKey::new(family, bold, italic), data);
        Ok(())
    }

    /// Load the file an `@font-face` rule points at. Failures are logged and
    /// the rule is skipped, leaving the family to fall back.
    pub fn register_font_face(&mut self, face: &FontFace) -> bool {
        let Some(src) = face.src.as_deref() else {
            log::warn!("@font-face for '{}' has no local source", face.family);
            return false;
        };
        let bytes = match std::fs::read(Path::new(src)) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("font '{}' unavailable at {src}: {e}", face.family);
                return false;
            }
        };
        if ttf_parser::fonts_in_collection(&bytes).is_some() {
            log::debug!("{src} is a font collection, using face 0");
        }
        match self.load_font(&face.family, face.bold, face.italic, bytes, 0) {
            Ok(()) => {
                log::debug!("loaded font '{}' from {src}", face.family);
                true
            }
            Err(e) => {
                log::warn!("font '{}' at {src} could not be parsed: {e}", face.family);
                false
            }
        }
    }

    /// Register every `@font-face` rule of a stylesheet.
    pub fn register_stylesheet(&mut self, sheet: &Stylesheet) {
        for face in &sheet.font_faces {
            self.register_font_face(face);
        }
    }

    pub fn has_loaded_fonts(&self) -> bool {
        !self.fonts.is_empty()
    }

    pub fn font_data(&self, key: &FontKey) -> Option<&FontData> {
        self.fonts.get(key)
    }

    /// Pick the face for a CSS family list: the first loaded family wins,
    /// then the first generic or base-14 name, then Helvetica.
    pub fn resolve(&self, families: &[String], bold: bool, italic: bool) -> FontChoice {
        for family in families {
            let name = family.trim().to_ascii_lowercase();
            let candidates = [
                FontKey::new(&name, bold, italic),
                FontKey::new(&name, false, italic),
                FontKey::new(&name, bold, false),
                FontKey::new(&name, false, false),
            ];
            if let Some(key) = candidates.into_iter().find(|k| self.fonts.contains_key(k)) {
                return FontChoice::Loaded(key);
            }
            if let Some(builtin) = BuiltinFamily::from_name(&name) {
                return FontChoice::Builtin {
                    family: builtin,
                    bold,
                    italic,
                };
            }
        }
        FontChoice::Builtin {
            family: BuiltinFamily::Helvetica,
            bold,
            italic,
        }
    }

    /// Measure the advance width of a string in points.
    pub fn measure_text_width(&self, text: &str, font_size: f32, font: &FontChoice) -> f32 {
        match font {
            FontChoice::Loaded(key) => match self.fonts.get(key) {
                Some(data) => shaped_width(data, text, font_size)
                    .unwrap_or_else(|| heuristic_width(text, font_size, BuiltinFamily::Helvetica, key.bold)),
                None => heuristic_width(text, font_size, BuiltinFamily::Helvetica, key.bold),
            },
            FontChoice::Builtin { family, bold, .. } => {
                heuristic_width(text, font_size, *family, *bold)
            }
        }
    }

    /// Distance from the top of the em box to the baseline, in points.
    pub fn ascender(&self, font_size: f32, font: &FontChoice) -> f32 {
        match font {
            FontChoice::Loaded(key) => match self.fonts.get(key) {
                Some(data) if data.units_per_em > 0.0 => {
                    let total = data.ascender - data.descender;
                    // Centre the glyph box on the em square.
                    let scale = font_size / data.units_per_em;
                    (data.ascender - (total - data.units_per_em) / 2.0) * scale
                }
                _ => font_size * 0.75,
            },
            FontChoice::Builtin { .. } => font_size * 0.75,
        }
    }
}

fn heuristic_width(text: &str, font_size: f32, family: BuiltinFamily, bold: bool) -> f32 {
    text.chars().count() as f32 * font_size * family.average_advance(bold)
}

fn shaped_width(data: &FontData, text: &str, font_size: f32) -> Option<f32> {
    if data.units_per_em <= 0.0 {
        return None;
    }
    let face = rustybuzz::Face::from_slice(&data.bytes, data.index)?;
    let mut buffer = rustybuzz::UnicodeBuffer::new();
    buffer.push_str(text);
    let glyphs = rustybuzz::shape(&face, &[], buffer);
    let units: i32 = glyphs.glyph_positions().iter().map(|p| p.x_advance).sum();
    Some(units as f32 * font_size / data.units_per_em)
}

/// Split `word` into pieces no wider than `max_width`, at least one char each.
pub fn break_word(
    word: &str,
    font_size: f32,
    font: &FontChoice,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in word.chars() {
        let mut candidate = current.clone();
        candidate.push(ch);
        if !current.is_empty()
            && fonts.measure_text_width(&candidate, font_size, font) > max_width
        {
            pieces.push(std::mem::take(&mut current));
            current.push(ch);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helvetica() -> FontChoice {
        FontChoice::default()
    }

    #[test]
    fn heuristic_text_width() {
        let mgr = FontManager::new();
        let w = mgr.measure_text_width("Hello", 16.0, &helvetica());
        // 5 chars × 16 × 0.5 = 40
        assert!((w - 40.0).abs() < 0.1);
    }

    #[test]
    fn break_word_pieces_fit() {
        let mgr = FontManager::new();
        let word = "abcdefghijklmnopqrstuvwxyz";
        let pieces = break_word(word, 10.0, &helvetica(), 50.0, &mgr);
        assert!(pieces.len() > 1);
        assert_eq!(pieces.concat(), word);
        for piece in &pieces {
            assert!(mgr.measure_text_width(piece, 10.0, &helvetica()) <= 50.0);
        }
    }

    #[test]
    fn break_word_keeps_one_char_when_nothing_fits() {
        let mgr = FontManager::new();
        let pieces = break_word("abc", 10.0, &helvetica(), 1.0, &mgr);
        assert_eq!(pieces, vec!["a", "b", "c"]);
    }

    #[test]
    fn family_list_falls_back_to_generic() {
        let mgr = FontManager::new();
        let families: Vec<String> = ["Noto Sans CJK", "WenQuanYi Zen Hei", "serif"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            mgr.resolve(&families, true, false),
            FontChoice::Builtin {
                family: BuiltinFamily::Times,
                bold: true,
                italic: false
            }
        );
        assert_eq!(
            mgr.resolve(&["Unknown Face".to_string()], false, false),
            FontChoice::default()
        );
    }

    #[test]
    fn missing_font_file_is_skipped() {
        let mut mgr = FontManager::new();
        let face = FontFace {
            family: "Nowhere Sans".to_string(),
            src: Some("/nonexistent/path/NowhereSans.ttf".to_string()),
            bold: false,
            italic: false,
        };
        assert!(!mgr.register_font_face(&face));
        assert!(!mgr.has_loaded_fonts());
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let mut mgr = FontManager::new();
        assert!(mgr
            .load_font("Broken", false, false, b"not a font".to_vec(), 0)
            .is_err());
        assert!(!mgr.has_loaded_fonts());
    }
}
