//! Integration tests for the printsheet pipeline.
//!
//! These tests validate:
//! - PDF output exists and has valid format
//! - The print stylesheet suppresses hidden elements
//! - Layout configs stay on the page and survive JSON round-trips
//! - Pagination of long roteiros

use sha2::{Digest, Sha256};

use printsheet::converter::print_stylesheet;
use printsheet::layout_config::{LayoutBox, LayoutConfig};
use printsheet::pipeline::{compute_layout_config, generate_pdf, PipelineConfig};
use printsheet::render::render_pdf;
use printsheet::{templates, Converter, Error};

// =====================================================================
// Helpers
// =====================================================================

fn print_layout(html: &str) -> LayoutConfig {
    compute_layout_config(html, &[print_stylesheet()], &PipelineConfig::default()).unwrap()
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

fn visit_boxes<'a>(boxes: &'a [LayoutBox], out: &mut Vec<&'a LayoutBox>) {
    for b in boxes {
        out.push(b);
        visit_boxes(&b.children, out);
    }
}

/// Baseline of every text line, in page coordinates, per page.
fn line_baselines(config: &LayoutConfig) -> Vec<Vec<f32>> {
    fn collect(boxes: &[LayoutBox], out: &mut Vec<f32>) {
        for b in boxes {
            if let Some(text) = &b.text {
                out.extend(text.lines.iter().map(|l| b.y + l.y_offset + l.baseline));
            }
            collect(&b.children, out);
        }
    }
    config
        .pages
        .iter()
        .map(|page| {
            let mut out = Vec::new();
            collect(&page.boxes, &mut out);
            out
        })
        .collect()
}

fn assert_text_within_content_area(config: &LayoutConfig) {
    let top = config.page.margin_top;
    let bottom = config.page.height - config.page.margin_bottom;
    for (i, baselines) in line_baselines(config).iter().enumerate() {
        for y in baselines {
            assert!(
                *y >= top - 0.01 && *y <= bottom + 0.01,
                "page {i}: text baseline at {y} outside {top}..{bottom}"
            );
        }
    }
}

fn all_boxes(config: &LayoutConfig) -> Vec<&LayoutBox> {
    let mut out = Vec::new();
    for page in &config.pages {
        visit_boxes(&page.boxes, &mut out);
    }
    out
}

// =====================================================================
// Converter
// =====================================================================

#[test]
fn converter_output_is_a_pdf() {
    let pdf = Converter::new().convert(&templates::roteiro_template()).unwrap();
    assert_valid_pdf(&pdf);
}

#[test]
fn hello_document_ends_with_eof_marker() {
    let pdf = Converter::new().convert(templates::minimal_template()).unwrap();
    assert_valid_pdf(&pdf);
    let trimmed = String::from_utf8_lossy(&pdf);
    assert!(trimmed.trim_end().ends_with("%%EOF"));
}

#[test]
fn empty_input_gives_one_blank_page() {
    let pdf = Converter::new().convert("").unwrap();
    assert_valid_pdf(&pdf);

    let config = print_layout("");
    assert_eq!(config.pages.len(), 1);
    assert!(config.plain_text().is_empty());
}

#[test]
fn over_nested_input_is_rejected() {
    let html = "<div>".repeat(printsheet::dom::MAX_DEPTH + 1);
    let err = Converter::new().convert(&html).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");
    assert!(!err.to_string().contains('\n'));
}

// =====================================================================
// Print stylesheet behaviour
// =====================================================================

#[test]
fn print_hidden_elements_are_not_rendered() {
    let config = print_layout(&templates::roteiro_template());
    let text = config.plain_text();
    assert!(!text.contains(templates::HIDDEN_MARKER));
    assert!(text.contains("NOVA CENA"));
    assert!(text.contains("Data de Criação do Documento:"));
}

#[test]
fn hidden_elements_render_without_the_print_stylesheet() {
    let config =
        compute_layout_config(&templates::roteiro_template(), &[], &PipelineConfig::default())
            .unwrap();
    assert!(config.plain_text().contains(templates::HIDDEN_MARKER));
}

#[test]
fn header_cells_get_the_grey_background() {
    let config = print_layout(&templates::roteiro_template());
    let grey = 0xf2 as f32 / 255.0;
    let header = all_boxes(&config)
        .into_iter()
        .find(|b| {
            b.children
                .iter()
                .chain(std::iter::once(*b))
                .any(|c| {
                    c.text
                        .as_ref()
                        .and_then(|t| t.lines.first())
                        .is_some_and(|l| l.text() == "VÍDEO")
                })
                && b.background_color.is_some()
        })
        .expect("a header cell with a background");
    let [r, g, b, a] = header.background_color.unwrap();
    assert!((r - grey).abs() < 0.01 && (g - grey).abs() < 0.01 && (b - grey).abs() < 0.01);
    assert_eq!(a, 1.0);
}

#[test]
fn cell_line_breaks_are_preserved() {
    let config = print_layout(&templates::roteiro_template());
    let text = config.plain_text();
    assert!(text.contains("Abertura\nVinheta animada\n"), "{text}");
}

#[test]
fn logo_image_is_placed() {
    let config = print_layout(&templates::roteiro_template());
    let image = all_boxes(&config)
        .into_iter()
        .find_map(|b| b.image.as_ref())
        .expect("logo image");
    assert_eq!(image.src, templates::LOGO_DATA_URI);
    assert!(image.height <= 45.0 + 0.01);
}

#[test]
fn embedded_print_rules_apply() {
    let config = print_layout(templates::styled_template());
    assert_eq!(config.title, "Roteiro: Estilos");
    let text = config.plain_text();
    assert!(text.contains("Revisar antes de gravar"));
    assert!(text.contains("Produção & Edição"));
}

// =====================================================================
// Layout and pagination
// =====================================================================

#[test]
fn layout_positions_are_within_page() {
    let config = print_layout(&templates::long_roteiro_template(30));
    for page in &config.pages {
        for lbox in &page.boxes {
            assert!(
                lbox.x >= 0.0 && lbox.x < config.page.width,
                "Box x={} outside page width={}",
                lbox.x,
                config.page.width
            );
            assert!(
                lbox.y >= 0.0 && lbox.y + lbox.height <= config.page.height + 0.01,
                "Box y={} h={} outside page height={}",
                lbox.y,
                lbox.height,
                config.page.height
            );
        }
    }
}

#[test]
fn long_roteiro_spans_pages_with_repeated_header() {
    let config = print_layout(&templates::long_roteiro_template(40));
    assert!(config.pages.len() > 1, "got {} page(s)", config.pages.len());
    assert_eq!(config.plain_text().matches("TEC / TRANSIÇÃO").count(), config.pages.len());
    assert_eq!(config.plain_text().matches("CENA 40").count(), 1);
}

#[test]
fn long_roteiro_text_stays_inside_the_page() {
    let config = print_layout(&templates::long_roteiro_template(40));
    assert_text_within_content_area(&config);
}

#[test]
fn oversized_audio_cell_continues_across_pages() {
    let words = 4000;
    let config = print_layout(&templates::long_audio_template(words));
    assert!(config.pages.len() > 2, "got {} page(s)", config.pages.len());
    assert_text_within_content_area(&config);

    let text = config.plain_text();
    let spoken: Vec<&str> = text
        .split_whitespace()
        .filter(|w| w.starts_with("fala"))
        .collect();
    let expected: Vec<String> = (1..=words).map(|i| format!("fala{i}")).collect();
    assert_eq!(spoken, expected);
    assert_eq!(text.matches("TEC / TRANSIÇÃO").count(), config.pages.len());
    assert_eq!(text.matches("Até amanhã.").count(), 1);
}

#[test]
fn landscape_config_is_honoured() {
    let config = compute_layout_config(
        templates::minimal_template(),
        &[],
        &PipelineConfig::a4_landscape(),
    )
    .unwrap();
    assert!(config.page.width > config.page.height);
}

// =====================================================================
// Layout config JSON round-trip
// =====================================================================

#[test]
fn layout_config_json_roundtrip() {
    let config = print_layout(&templates::roteiro_template());
    let json = config.to_json();
    let parsed = LayoutConfig::from_json(&json).unwrap();
    assert_eq!(config.pages.len(), parsed.pages.len());
    assert_eq!(config.plain_text(), parsed.plain_text());
    assert_eq!(config.title, parsed.title);
}

#[test]
fn render_from_layout_config_json() {
    let config = print_layout(&templates::roteiro_template());
    let parsed = LayoutConfig::from_json(&config.to_json()).unwrap();
    let bytes = render_pdf(&parsed, &printsheet::fonts::FontManager::new()).unwrap();
    assert_valid_pdf(&bytes);
}

// =====================================================================
// Golden-sample stability test
// =====================================================================

#[test]
fn layout_is_deterministic() {
    let digest = |html: &str| {
        let config = print_layout(html);
        Sha256::digest(config.to_json().as_bytes())
    };
    let html = templates::roteiro_template();
    assert_eq!(digest(&html), digest(&html));
}

#[test]
fn generate_pdf_returns_layout_used_for_rendering() {
    let (bytes, config) = generate_pdf(
        &templates::roteiro_template(),
        &[print_stylesheet()],
        &PipelineConfig::default(),
    )
    .unwrap();
    assert_valid_pdf(&bytes);
    assert_eq!(config.title, "Roteiro: Jornal da Manhã");
    assert_eq!(config.pages.len(), 1);
}
