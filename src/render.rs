//! PDF renderer – takes a [`LayoutConfig`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API).

use std::collections::{HashMap, HashSet};

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use printpdf::*;

use crate::error::{Error, Result};
use crate::fonts::{BuiltinFamily, FontChoice, FontKey, FontManager};
use crate::layout_config::*;

const PT_TO_MM: f32 = 0.352778;

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Document-level resources shared by all pages.
struct Resources {
    images: HashMap<String, ImageResource>,
    fonts: HashMap<FontKey, FontId>,
}

/// Render a LayoutConfig into PDF bytes.
///
/// Images that cannot be decoded and faces printpdf cannot parse are
/// skipped with a warning; text in a skipped face falls back to Helvetica.
pub fn render_pdf(config: &LayoutConfig, fonts: &FontManager) -> Result<Vec<u8>> {
    let page_w = Mm(config.page.width * PT_TO_MM);
    let page_h = Mm(config.page.height * PT_TO_MM);

    let mut doc = PdfDocument::new(&config.title);

    let mut all_srcs: HashSet<&str> = HashSet::new();
    let mut all_fonts: HashSet<&FontKey> = HashSet::new();
    for page_layout in &config.pages {
        for lbox in &page_layout.boxes {
            collect_resources(lbox, &mut all_srcs, &mut all_fonts);
        }
    }

    let mut resources = Resources {
        images: HashMap::new(),
        fonts: HashMap::new(),
    };

    for src in all_srcs {
        if let Some(resource) = register_image(&mut doc, src) {
            resources.images.insert(src.to_string(), resource);
        }
    }

    for key in all_fonts {
        let Some(data) = fonts.font_data(key) else {
            continue;
        };
        match ParsedFont::from_bytes(&data.bytes, data.index as usize, &mut Vec::new()) {
            Some(parsed) => {
                let id = doc.add_font(&parsed);
                resources.fonts.insert(key.clone(), id);
            }
            None => log::warn!("cannot embed font '{}', using Helvetica", key.family),
        }
    }

    let mut pages = Vec::new();
    for page_layout in &config.pages {
        let mut ops = Vec::new();
        for lbox in &page_layout.boxes {
            render_box(&mut ops, lbox, config.page.height, &resources);
        }
        pages.push(PdfPage::new(page_w, page_h, ops));
    }
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }
    let page_count = pages.len();

    doc.with_pages(pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut Vec::new());

    if !bytes.starts_with(b"%PDF-") {
        return Err(Error::Pdf(
            "writer output lacks the %PDF- signature".to_string(),
        ));
    }
    log::debug!("wrote {page_count} page(s), {} bytes", bytes.len());
    Ok(bytes)
}

fn register_image(doc: &mut PdfDocument, src: &str) -> Option<ImageResource> {
    let bytes = parse_data_uri(src)
        .map_err(|e| log::warn!("skipping image: {e}"))
        .ok()?;
    let decoded = ::image::load_from_memory(&bytes)
        .map_err(|e| log::warn!("skipping image: decode error: {e}"))
        .ok()?;
    let raw = RawImage::decode_from_bytes(&bytes, &mut Vec::new())
        .map_err(|e| log::warn!("skipping image: PDF encode error: {e}"))
        .ok()?;
    Some(ImageResource {
        xobj_id: doc.add_image(&raw),
        px_width: decoded.width(),
        px_height: decoded.height(),
    })
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
///
/// Anything else (remote URLs, file paths, non-base64 data URIs) is an error;
/// the document has no way to fetch it.
pub(crate) fn parse_data_uri(src: &str) -> std::result::Result<Vec<u8>, String> {
    let Some(rest) = src.trim().strip_prefix("data:") else {
        let preview: String = src.chars().take(80).collect();
        return Err(format!("only base64 data URIs are embedded, got {preview:?}"));
    };
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| "data URI has no `,` separator".to_string())?;
    if !header.contains(";base64") {
        return Err("data URI is not base64-encoded".to_string());
    }
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64_STD
        .decode(cleaned)
        .map_err(|e| format!("base64 decode error: {e}"))
}

fn collect_resources<'a>(
    lbox: &'a LayoutBox,
    srcs: &mut HashSet<&'a str>,
    fonts: &mut HashSet<&'a FontKey>,
) {
    if let Some(img) = &lbox.image {
        srcs.insert(img.src.as_str());
    }
    if let Some(text) = &lbox.text {
        for run in text.lines.iter().flat_map(|l| &l.runs) {
            if let FontChoice::Loaded(key) = &run.font {
                fonts.insert(key);
            }
        }
    }
    for child in &lbox.children {
        collect_resources(child, srcs, fonts);
    }
}

fn builtin_font(family: BuiltinFamily, bold: bool, italic: bool) -> BuiltinFont {
    match (family, bold, italic) {
        (BuiltinFamily::Helvetica, false, false) => BuiltinFont::Helvetica,
        (BuiltinFamily::Helvetica, true, false) => BuiltinFont::HelveticaBold,
        (BuiltinFamily::Helvetica, false, true) => BuiltinFont::HelveticaOblique,
        (BuiltinFamily::Helvetica, true, true) => BuiltinFont::HelveticaBoldOblique,
        (BuiltinFamily::Times, false, false) => BuiltinFont::TimesRoman,
        (BuiltinFamily::Times, true, false) => BuiltinFont::TimesBold,
        (BuiltinFamily::Times, false, true) => BuiltinFont::TimesItalic,
        (BuiltinFamily::Times, true, true) => BuiltinFont::TimesBoldItalic,
        (BuiltinFamily::Courier, false, false) => BuiltinFont::Courier,
        (BuiltinFamily::Courier, true, false) => BuiltinFont::CourierBold,
        (BuiltinFamily::Courier, false, true) => BuiltinFont::CourierOblique,
        (BuiltinFamily::Courier, true, true) => BuiltinFont::CourierBoldOblique,
    }
}

/// Map a character to its WinAnsiEncoding byte; unmappable characters
/// become `?`.
fn win_ansi_byte(c: char) -> u8 {
    match c {
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{2122}' => 0x99,
        '\u{00A0}' => 0x20,
        c if (c as u32) < 256 => c as u8,
        _ => b'?',
    }
}

/// Re-encode text for a base-14 font. printpdf copies the string bytes
/// straight into the content stream, where the font's WinAnsiEncoding
/// decodes them one byte per glyph.
fn encode_win_ansi(s: &str) -> String {
    let bytes: Vec<u8> = s.chars().map(win_ansi_byte).collect();
    // SAFETY: the string is only handed to printpdf, which writes its bytes
    // unchanged into the PDF stream and never inspects them as UTF-8.
    #[allow(unsafe_code)]
    unsafe {
        String::from_utf8_unchecked(bytes)
    }
}

fn rgb(c: [f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Corners of a rectangle in PDF space, counter-clockwise from bottom-left.
fn rect_points(x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<LinePoint> {
    vec![
        point(x1, y1),
        point(x2, y1),
        point(x2, y2),
        point(x1, y2),
    ]
}

/// Recursively render a LayoutBox and its children into PDF ops.
fn render_box(ops: &mut Vec<Op>, lbox: &LayoutBox, page_height: f32, res: &Resources) {
    // PDF origin is bottom-left, layout origin top-left.
    let top = page_height - lbox.y;
    let bottom = top - lbox.height;
    let right = lbox.x + lbox.width;

    if let Some(bg) = lbox.background_color {
        ops.push(Op::SetFillColor { col: rgb(bg) });
        ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: rect_points(lbox.x, bottom, right, top),
                }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    if let Some(border) = &lbox.border {
        // Stroke centred inside the border band.
        let inset = border.width / 2.0;
        ops.push(Op::SetOutlineColor {
            col: rgb(border.color),
        });
        ops.push(Op::SetOutlineThickness {
            pt: Pt(border.width),
        });
        ops.push(Op::DrawLine {
            line: Line {
                points: rect_points(lbox.x + inset, bottom + inset, right - inset, top - inset),
                is_closed: true,
            },
        });
    }

    if let Some(text) = &lbox.text {
        for line in &text.lines {
            let baseline_y = top - line.y_offset - line.baseline;
            for run in &line.runs {
                let x = lbox.x + line.x_offset + run.x;
                render_run(ops, run, x, baseline_y, res);
            }
        }
    }

    if let Some(img) = &lbox.image {
        if let Some(image) = res.images.get(&img.src) {
            // At dpi=72 printpdf renders 1 px = 1 pt, so
            // scale = desired_pt / px_dim.
            let scale_x = img.width / image.px_width.max(1) as f32;
            let scale_y = img.height / image.px_height.max(1) as f32;
            ops.push(Op::UseXobject {
                id: image.xobj_id.clone(),
                transform: XObjectTransform {
                    translate_x: Some(Pt(lbox.x)),
                    translate_y: Some(Pt(top - img.height)),
                    dpi: Some(72.0),
                    scale_x: Some(scale_x),
                    scale_y: Some(scale_y),
                    rotate: None,
                },
            });
        }
    }

    for child in &lbox.children {
        render_box(ops, child, page_height, res);
    }
}

fn render_run(ops: &mut Vec<Op>, run: &TextRun, x: f32, baseline_y: f32, res: &Resources) {
    if run.text.trim().is_empty() {
        return;
    }
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point {
            x: Pt(x),
            y: Pt(baseline_y),
        },
    });
    ops.push(Op::SetFillColor {
        col: rgb(run.color),
    });

    let embedded = match &run.font {
        FontChoice::Loaded(key) => res.fonts.get(key),
        FontChoice::Builtin { .. } => None,
    };
    match embedded {
        Some(font_id) => {
            ops.push(Op::SetFontSize {
                size: Pt(run.font_size),
                font: font_id.clone(),
            });
            ops.push(Op::WriteText {
                items: vec![TextItem::Text(run.text.clone())],
                font: font_id.clone(),
            });
        }
        None => {
            let font = match &run.font {
                FontChoice::Builtin {
                    family,
                    bold,
                    italic,
                } => builtin_font(*family, *bold, *italic),
                FontChoice::Loaded(key) => {
                    builtin_font(BuiltinFamily::Helvetica, key.bold, key.italic)
                }
            };
            ops.push(Op::SetFontSizeBuiltinFont {
                size: Pt(run.font_size),
                font,
            });
            ops.push(Op::WriteTextBuiltinFont {
                items: vec![TextItem::Text(encode_win_ansi(&run.text))],
                font,
            });
        }
    }
    ops.push(Op::EndTextSection);

    if run.underline {
        let y = baseline_y - run.font_size * 0.1;
        ops.push(Op::SetOutlineThickness {
            pt: Pt((run.font_size * 0.05).max(0.5)),
        });
        ops.push(Op::SetOutlineColor {
            col: rgb(run.color),
        });
        ops.push(Op::DrawLine {
            line: Line {
                points: vec![point(x, y), point(x + run.width, y)],
                is_closed: false,
            },
        });
    }
}
