//! Pipeline – ties together parsing, styling, layout, pagination, and
//! rendering into the [`PrintEngine`].

use crate::converter::RenderEngine;
use crate::css::{media_matches_print, Declaration, Stylesheet};
use crate::dom::Document;
use crate::error::Result;
use crate::fonts::FontManager;
use crate::layout::compute_layout;
use crate::layout_config::{LayoutConfig, PageGeometry};
use crate::pagination::paginate;
use crate::render::render_pdf;
use crate::style::{build_styled_tree, parse_length, user_agent_stylesheet, Cascade, FontUnits};

/// PDF title used when the document has no `<title>`.
pub const DEFAULT_TITLE: &str = "printsheet output";

/// Default page margin: 75 CSS px.
pub const DEFAULT_PAGE_MARGIN_PT: f32 = 56.25;

/// Page orientation for the generated PDF.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width > height.
    Landscape,
}

/// Configuration for the PDF generation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Document title embedded in the PDF metadata when the HTML has none.
    pub title: String,
    /// Page width in points (default: A4 = 595.28).
    pub page_width: f32,
    /// Page height in points (default: A4 = 841.89).
    pub page_height: f32,
    /// Page margin in points on every side.
    pub page_margin: f32,
    /// Page orientation; swaps effective width/height when `Landscape`.
    pub orientation: PageOrientation,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            page_width: 595.28,
            page_height: 841.89,
            page_margin: DEFAULT_PAGE_MARGIN_PT,
            orientation: PageOrientation::Portrait,
        }
    }
}

impl PipelineConfig {
    /// Page geometry after applying orientation.
    pub fn geometry(&self) -> PageGeometry {
        let portrait = PageGeometry {
            width: self.page_width,
            height: self.page_height,
            ..PageGeometry::a4(self.page_margin)
        };
        match self.orientation {
            PageOrientation::Portrait => portrait,
            PageOrientation::Landscape => portrait.rotated(),
        }
    }

    /// Create an A4 landscape config.
    pub fn a4_landscape() -> Self {
        Self {
            orientation: PageOrientation::Landscape,
            ..Self::default()
        }
    }
}

/// The in-crate HTML/CSS-to-PDF engine.
#[derive(Debug, Clone, Default)]
pub struct PrintEngine {
    config: PipelineConfig,
}

impl PrintEngine {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

impl RenderEngine for PrintEngine {
    type Document = Document;

    fn parse_html(&self, html: &str) -> Result<Document> {
        Document::parse(html)
    }

    fn write_pdf(&self, document: &Document, stylesheets: &[Stylesheet]) -> Result<Vec<u8>> {
        let (bytes, _) = render_document(document, stylesheets, &self.config)?;
        Ok(bytes)
    }
}

/// Full pipeline: HTML string → PDF bytes plus the layout they were drawn from.
pub fn generate_pdf(
    html: &str,
    stylesheets: &[Stylesheet],
    config: &PipelineConfig,
) -> Result<(Vec<u8>, LayoutConfig)> {
    let document = Document::parse(html)?;
    render_document(&document, stylesheets, config)
}

/// Generate only the layout config (no PDF rendering).
pub fn compute_layout_config(
    html: &str,
    stylesheets: &[Stylesheet],
    config: &PipelineConfig,
) -> Result<LayoutConfig> {
    let document = Document::parse(html)?;
    let (layout, _) = layout_document(&document, stylesheets, config)?;
    Ok(layout)
}

fn render_document(
    document: &Document,
    stylesheets: &[Stylesheet],
    config: &PipelineConfig,
) -> Result<(Vec<u8>, LayoutConfig)> {
    let (layout, fonts) = layout_document(document, stylesheets, config)?;
    let pdf = render_pdf(&layout, &fonts)?;
    Ok((pdf, layout))
}

/// Cascade order: user-agent defaults, the document's own `<style>` sheets
/// (print media only), then the caller's sheets in order.
fn layout_document(
    document: &Document,
    stylesheets: &[Stylesheet],
    config: &PipelineConfig,
) -> Result<(LayoutConfig, FontManager)> {
    let ua = user_agent_stylesheet();
    let embedded: Vec<Stylesheet> = document
        .embedded_styles()
        .into_iter()
        .filter(|s| s.media.as_deref().map_or(true, media_matches_print))
        .map(|s| Stylesheet::parse(&s.css))
        .collect();

    let mut cascade = Cascade::new(&ua);
    for sheet in embedded.iter().chain(stylesheets) {
        cascade.add_author(sheet);
    }
    log::debug!(
        "cascade: {} embedded and {} supplied stylesheet(s)",
        embedded.len(),
        stylesheets.len()
    );

    let mut fonts = FontManager::new();
    for sheet in cascade.sheets() {
        fonts.register_stylesheet(sheet);
    }

    let mut page = config.geometry();
    for sheet in cascade.sheets() {
        for rule in &sheet.page_rules {
            apply_page_rule(&mut page, rule);
        }
    }

    let boxes = match build_styled_tree(document, &cascade) {
        Some(styled) => compute_layout(&styled, &page, &fonts)?,
        None => Vec::new(),
    };
    let mut layout = paginate(&boxes, &page);
    layout.title = document
        .title()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| config.title.clone());

    log::trace!("layout config: {}", layout.to_json());
    Ok((layout, fonts))
}

/// Named page sizes, portrait, in points.
fn named_page_size(name: &str) -> Option<(f32, f32)> {
    match name {
        "a3" => Some((841.89, 1190.55)),
        "a4" => Some((595.28, 841.89)),
        "a5" => Some((419.53, 595.28)),
        "letter" => Some((612.0, 792.0)),
        "legal" => Some((612.0, 1008.0)),
        _ => None,
    }
}

/// Apply `size` and `margin*` declarations of an `@page` rule.
fn apply_page_rule(page: &mut PageGeometry, declarations: &[Declaration]) {
    for decl in declarations {
        let value = decl.value.trim().to_ascii_lowercase();
        match decl.property.as_str() {
            "size" => apply_page_size(page, &value),
            "margin" => {
                let sides: Vec<f32> = value
                    .split_whitespace()
                    .filter_map(|v| parse_length(v, FontUnits::default()))
                    .collect();
                let [top, right, bottom, left] = match sides.as_slice() {
                    [all] => [*all; 4],
                    [v, h] => [*v, *h, *v, *h],
                    [t, h, b] => [*t, *h, *b, *h],
                    [t, r, b, l] => [*t, *r, *b, *l],
                    _ => continue,
                };
                page.margin_top = top;
                page.margin_right = right;
                page.margin_bottom = bottom;
                page.margin_left = left;
            }
            "margin-top" => set_page_length(&mut page.margin_top, &value),
            "margin-right" => set_page_length(&mut page.margin_right, &value),
            "margin-bottom" => set_page_length(&mut page.margin_bottom, &value),
            "margin-left" => set_page_length(&mut page.margin_left, &value),
            _ => {}
        }
    }
}

fn set_page_length(target: &mut f32, value: &str) {
    if let Some(v) = parse_length(value, FontUnits::default()) {
        *target = v;
    }
}

fn apply_page_size(page: &mut PageGeometry, value: &str) {
    let mut size: Option<(f32, f32)> = None;
    let mut landscape = None;
    let mut lengths = Vec::new();
    for part in value.split_whitespace() {
        match part {
            "portrait" => landscape = Some(false),
            "landscape" => landscape = Some(true),
            _ => {
                if let Some(named) = named_page_size(part) {
                    size = Some(named);
                } else if let Some(len) = parse_length(part, FontUnits::default()) {
                    lengths.push(len);
                }
            }
        }
    }
    match lengths.as_slice() {
        [side] => size = Some((*side, *side)),
        [w, h] => size = Some((*w, *h)),
        _ => {}
    }
    let (mut width, mut height) = size.unwrap_or((page.width, page.height));
    match landscape {
        Some(true) if width < height => std::mem::swap(&mut width, &mut height),
        Some(false) if width > height => std::mem::swap(&mut width, &mut height),
        _ => {}
    }
    page.width = width;
    page.height = height;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_basic() {
        let html = "<h1>Hello</h1><p>World</p>";
        let (bytes, config) = generate_pdf(html, &[], &PipelineConfig::default()).unwrap();
        assert!(!bytes.is_empty());
        assert!(!config.pages.is_empty());
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn landscape_swaps_geometry() {
        let page = PipelineConfig::a4_landscape().geometry();
        assert!(page.width > page.height);
        assert_eq!(page.margin_top, DEFAULT_PAGE_MARGIN_PT);
    }

    #[test]
    fn page_rule_overrides_size_and_margin() {
        let sheet = Stylesheet::parse("@page { size: A5 landscape; margin: 1cm 2cm; }");
        let layout = compute_layout_config("<p>x</p>", &[sheet], &PipelineConfig::default()).unwrap();
        assert!((layout.page.width - 595.28).abs() < 0.01);
        assert!((layout.page.height - 419.53).abs() < 0.01);
        assert!((layout.page.margin_top - 28.35).abs() < 0.01);
        assert!((layout.page.margin_left - 56.69).abs() < 0.01);
    }

    #[test]
    fn document_title_becomes_pdf_title() {
        let html = "<html><head><title>Roteiro: Jornal</title></head><body></body></html>";
        let layout = compute_layout_config(html, &[], &PipelineConfig::default()).unwrap();
        assert_eq!(layout.title, "Roteiro: Jornal");

        let untitled = compute_layout_config("<p>x</p>", &[], &PipelineConfig::default()).unwrap();
        assert_eq!(untitled.title, DEFAULT_TITLE);
    }

    #[test]
    fn screen_only_embedded_styles_are_ignored() {
        let html = r#"<html><head>
            <style media="screen">.note { display: none; }</style>
            <style>.gone { display: none; }</style>
            </head><body><p class="note">kept</p><p class="gone">dropped</p></body></html>"#;
        let layout = compute_layout_config(html, &[], &PipelineConfig::default()).unwrap();
        let text = layout.plain_text();
        assert!(text.contains("kept"));
        assert!(!text.contains("dropped"));
    }
}
