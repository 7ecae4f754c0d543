//! Layout config – the intermediate representation between layout computation
//! and PDF rendering. This is the "frozen" structure that encodes exactly what
//! goes on each page.

use serde::{Deserialize, Serialize};

use crate::fonts::FontChoice;

/// Page size and margins, in PDF points (1 pt = 1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
}

impl PageGeometry {
    /// A4 portrait, 210mm × 297mm.
    pub fn a4(margin: f32) -> Self {
        Self {
            width: 595.28,
            height: 841.89,
            margin_top: margin,
            margin_right: margin,
            margin_bottom: margin,
            margin_left: margin,
        }
    }

    pub fn content_width(&self) -> f32 {
        (self.width - self.margin_left - self.margin_right).max(1.0)
    }

    pub fn content_height(&self) -> f32 {
        (self.height - self.margin_top - self.margin_bottom).max(1.0)
    }

    /// Swap width and height.
    pub fn rotated(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
            ..self
        }
    }
}

/// A complete document layout ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Document title embedded in the PDF metadata.
    #[serde(default = "LayoutConfig::default_title")]
    pub title: String,
    pub page: PageGeometry,
    /// Ordered list of pages.
    pub pages: Vec<PageLayout>,
}

/// One page of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub boxes: Vec<LayoutBox>,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    /// Position relative to page top-left, in points.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,

    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,

    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
}

/// Wrapped text, one entry per line box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    pub lines: Vec<TextLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub runs: Vec<TextRun>,
    /// X offset within the layout box (alignment, list marker gutter).
    pub x_offset: f32,
    /// Y offset of the line top from the top of the layout box.
    pub y_offset: f32,
    /// Baseline position below the line top.
    pub baseline: f32,
    pub width: f32,
}

/// A stretch of text sharing one face, size and colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    /// Offset from the start of the line.
    pub x: f32,
    pub width: f32,
    pub font: FontChoice,
    pub font_size: f32,
    pub color: [f32; 4],
    pub underline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    pub src: String,
    pub width: f32,
    pub height: f32,
}

impl LayoutConfig {
    /// An empty layout on A4 pages.
    pub fn a4() -> Self {
        Self {
            title: Self::default_title(),
            page: PageGeometry::a4(crate::pipeline::DEFAULT_PAGE_MARGIN_PT),
            pages: Vec::new(),
        }
    }

    fn default_title() -> String {
        crate::pipeline::DEFAULT_TITLE.to_string()
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// All text on all pages, one line per text line, in paint order.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for page in &self.pages {
            for lbox in &page.boxes {
                lbox.collect_text(&mut out);
            }
        }
        out
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            text: None,
            image: None,
            children: Vec::new(),
        }
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            for line in &text.lines {
                let joined: String = line.runs.iter().map(|r| r.text.as_str()).collect();
                out.push_str(&joined);
                out.push('\n');
            }
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}

impl TextLine {
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_content_area() {
        let page = PageGeometry::a4(56.25);
        assert!((page.content_width() - 482.78).abs() < 0.01);
        assert!((page.content_height() - 729.39).abs() < 0.01);
        let landscape = page.rotated();
        assert_eq!(landscape.width, 841.89);
        assert_eq!(landscape.margin_left, 56.25);
    }

    #[test]
    fn title_defaults_when_missing_from_json() {
        let json = r#"{
            "page": {"width": 100.0, "height": 200.0, "margin_top": 0.0,
                     "margin_right": 0.0, "margin_bottom": 0.0, "margin_left": 0.0},
            "pages": []
        }"#;
        let config = LayoutConfig::from_json(json).unwrap();
        assert_eq!(config.title, "printsheet output");
        assert_eq!(config.page.height, 200.0);
    }

    #[test]
    fn plain_text_walks_nested_boxes() {
        let run = |text: &str| TextRun {
            text: text.to_string(),
            x: 0.0,
            width: 10.0,
            font: FontChoice::default(),
            font_size: 10.0,
            color: [0.0, 0.0, 0.0, 1.0],
            underline: false,
        };
        let mut outer = LayoutBox::new(0.0, 0.0, 100.0, 40.0);
        let mut inner = LayoutBox::new(0.0, 0.0, 100.0, 20.0);
        inner.text = Some(TextContent {
            lines: vec![TextLine {
                runs: vec![run("Tipo: "), run("Jornal")],
                x_offset: 0.0,
                y_offset: 0.0,
                baseline: 8.0,
                width: 20.0,
            }],
        });
        outer.children.push(inner);
        let config = LayoutConfig {
            pages: vec![PageLayout {
                page_index: 0,
                boxes: vec![outer],
            }],
            ..LayoutConfig::a4()
        };
        assert_eq!(config.plain_text(), "Tipo: Jornal\n");
    }
}
