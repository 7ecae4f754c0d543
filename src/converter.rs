//! Converter – combines the built-in print stylesheet with an HTML document
//! and hands both to a [`RenderEngine`].

use crate::css::Stylesheet;
use crate::error::Result;
use crate::pipeline::PrintEngine;

/// Font declarations: the CJK face and the body font stack.
pub const FONT_FACE_CSS: &str = "
@font-face {
    font-family: 'Noto Sans CJK';
    src: url('/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc');
}
body {
    font-family: 'Noto Sans CJK', 'WenQuanYi Zen Hei', sans-serif;
}
";

/// Print layout rules for the roteiro documents.
pub const PRINT_LAYOUT_CSS: &str = "
body {
    font-family: 'Noto Sans CJK', 'WenQuanYi Zen Hei', sans-serif;
    margin: 20px;
    font-size: 10px;
}
table {
    width: 100%;
    border-collapse: collapse;
    margin-top: 15px;
    table-layout: fixed; /* columns keep their share of the width */
}
th, td {
    border: 1px solid #ccc;
    padding: 6px;
    text-align: left;
    word-wrap: break-word; /* long words wrap inside the cell */
    vertical-align: top; /* content starts at the top of the cell */
}
th {
    background-color: #f2f2f2;
    font-weight: bold;
}
.roteiro-header {
    text-align: center;
    margin-bottom: 20px;
}
.roteiro-header img {
    max-height: 60px;
    margin-bottom: 10px;
}
.roteiro-details p {
    margin: 3px 0;
    font-size: 11px;
}
.divisoria-row td {
    background-color: #e9e9e9;
    font-weight: bold;
    text-align: center;
    padding: 8px;
}
/* Hide elements marked with data-print-hide='true' */
[data-print-hide='true'] {
    display: none !important;
}
";

/// The effective stylesheet text: font block first, then layout block.
pub fn print_stylesheet_source() -> String {
    [FONT_FACE_CSS, PRINT_LAYOUT_CSS].concat()
}

/// The effective stylesheet, parsed.
pub fn print_stylesheet() -> Stylesheet {
    Stylesheet::parse(&print_stylesheet_source())
}

/// The two operations a converter needs from an HTML/CSS-to-PDF engine.
pub trait RenderEngine {
    type Document;

    fn parse_html(&self, html: &str) -> Result<Self::Document>;

    /// Render a parsed document, applying `stylesheets` after the
    /// document's own styles.
    fn write_pdf(&self, document: &Self::Document, stylesheets: &[Stylesheet]) -> Result<Vec<u8>>;
}

/// HTML in, PDF bytes out, always with the built-in print stylesheet.
#[derive(Debug, Clone)]
pub struct Converter<E: RenderEngine = PrintEngine> {
    engine: E,
    stylesheet: Stylesheet,
}

impl Converter<PrintEngine> {
    pub fn new() -> Self {
        Self::with_engine(PrintEngine::default())
    }
}

impl Default for Converter<PrintEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: RenderEngine> Converter<E> {
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine,
            stylesheet: print_stylesheet(),
        }
    }

    pub fn stylesheet(&self) -> &Stylesheet {
        &self.stylesheet
    }

    /// Convert one HTML document. Any parse or render failure is returned
    /// whole; no partial output is produced.
    pub fn convert(&self, html: &str) -> Result<Vec<u8>> {
        let document = self.engine.parse_html(html)?;
        let pdf = self
            .engine
            .write_pdf(&document, std::slice::from_ref(&self.stylesheet))?;
        log::debug!("converted {} bytes of HTML into {} bytes of PDF", html.len(), pdf.len());
        Ok(pdf)
    }
}
