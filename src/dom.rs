//! HTML parsing – builds a [`Document`] tree from an HTML string.
//!
//! Tokenising and tree construction follow the HTML5 algorithm via
//! `scraper` (html5ever), so implied end tags, misnested markup and
//! character references behave as in a browser. The result is converted
//! into the crate's own [`ElementNode`] tree, always rooted at
//! `html > (head, body)`.

use std::collections::HashMap;

use scraper::{ElementRef, Html, Node};

use crate::error::{Error, Result};

/// Deepest element nesting the parser accepts, counting `<html>` as 1.
pub const MAX_DEPTH: usize = 512;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// The tag name of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Html,
    Head,
    Body,
    Title,
    Style,
    Script,
    Meta,
    Link,
    Div,
    P,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Section,
    Header,
    Footer,
    Article,
    Main,
    Nav,
    Blockquote,
    Pre,
    Ul,
    Ol,
    Li,
    Table,
    Caption,
    Thead,
    Tbody,
    Tfoot,
    Tr,
    Td,
    Th,
    Span,
    A,
    Strong,
    B,
    Em,
    I,
    U,
    Small,
    Label,
    Code,
    Br,
    Hr,
    Img,
    /// Any other element; styled only through stylesheets.
    Unknown(String),
}

impl Tag {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "html" => Tag::Html,
            "head" => Tag::Head,
            "body" => Tag::Body,
            "title" => Tag::Title,
            "style" => Tag::Style,
            "script" => Tag::Script,
            "meta" => Tag::Meta,
            "link" => Tag::Link,
            "div" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "h5" => Tag::H5,
            "h6" => Tag::H6,
            "section" => Tag::Section,
            "header" => Tag::Header,
            "footer" => Tag::Footer,
            "article" => Tag::Article,
            "main" => Tag::Main,
            "nav" => Tag::Nav,
            "blockquote" => Tag::Blockquote,
            "pre" => Tag::Pre,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "caption" => Tag::Caption,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tfoot" => Tag::Tfoot,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "span" => Tag::Span,
            "a" => Tag::A,
            "strong" => Tag::Strong,
            "b" => Tag::B,
            "em" => Tag::Em,
            "i" => Tag::I,
            "u" => Tag::U,
            "small" => Tag::Small,
            "label" => Tag::Label,
            "code" => Tag::Code,
            "br" => Tag::Br,
            "hr" => Tag::Hr,
            "img" => Tag::Img,
            other => Tag::Unknown(other.to_string()),
        }
    }

    /// Lower-case element name, as matched by type selectors.
    pub fn name(&self) -> &str {
        match self {
            Tag::Html => "html",
            Tag::Head => "head",
            Tag::Body => "body",
            Tag::Title => "title",
            Tag::Style => "style",
            Tag::Script => "script",
            Tag::Meta => "meta",
            Tag::Link => "link",
            Tag::Div => "div",
            Tag::P => "p",
            Tag::H1 => "h1",
            Tag::H2 => "h2",
            Tag::H3 => "h3",
            Tag::H4 => "h4",
            Tag::H5 => "h5",
            Tag::H6 => "h6",
            Tag::Section => "section",
            Tag::Header => "header",
            Tag::Footer => "footer",
            Tag::Article => "article",
            Tag::Main => "main",
            Tag::Nav => "nav",
            Tag::Blockquote => "blockquote",
            Tag::Pre => "pre",
            Tag::Ul => "ul",
            Tag::Ol => "ol",
            Tag::Li => "li",
            Tag::Table => "table",
            Tag::Caption => "caption",
            Tag::Thead => "thead",
            Tag::Tbody => "tbody",
            Tag::Tfoot => "tfoot",
            Tag::Tr => "tr",
            Tag::Td => "td",
            Tag::Th => "th",
            Tag::Span => "span",
            Tag::A => "a",
            Tag::Strong => "strong",
            Tag::B => "b",
            Tag::Em => "em",
            Tag::I => "i",
            Tag::U => "u",
            Tag::Small => "small",
            Tag::Label => "label",
            Tag::Code => "code",
            Tag::Br => "br",
            Tag::Hr => "hr",
            Tag::Img => "img",
            Tag::Unknown(name) => name,
        }
    }

    /// Containers whose whitespace-only text is never rendered.
    fn drops_whitespace(&self) -> bool {
        matches!(
            self,
            Tag::Html
                | Tag::Head
                | Tag::Table
                | Tag::Thead
                | Tag::Tbody
                | Tag::Tfoot
                | Tag::Tr
                | Tag::Ul
                | Tag::Ol
        )
    }
}

/// A node in the DOM tree.
#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attr("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attr("style")
    }

    pub fn src(&self) -> Option<&str> {
        self.attr("src")
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Element children only, skipping text.
    pub fn element_children(&self) -> impl Iterator<Item = &ElementNode> {
        self.children.iter().filter_map(|c| match c {
            DomNode::Element(e) => Some(e),
            DomNode::Text(_) => None,
        })
    }
}

fn collect_text(nodes: &[DomNode], out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(t) => out.push_str(t),
            DomNode::Element(e) => collect_text(&e.children, out),
        }
    }
}

/// A `<style>` element's sheet as found in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedStyle {
    pub css: String,
    pub media: Option<String>,
}

/// A parsed HTML document, rooted at `<html>` with `<head>` and `<body>`.
#[derive(Debug, Clone)]
pub struct Document {
    pub root: ElementNode,
}

impl Document {
    /// Parse an HTML document.
    ///
    /// Fails only when elements nest deeper than [`MAX_DEPTH`].
    pub fn parse(html: &str) -> Result<Self> {
        let parsed = Html::parse_document(html);
        if !parsed.errors.is_empty() {
            log::debug!("recovered from {} HTML parse error(s)", parsed.errors.len());
        }
        let root = convert_element(parsed.root_element(), 1)?;
        Ok(Self { root })
    }

    pub fn head(&self) -> Option<&ElementNode> {
        self.root.element_children().find(|e| e.tag == Tag::Head)
    }

    pub fn body(&self) -> Option<&ElementNode> {
        self.root.element_children().find(|e| e.tag == Tag::Body)
    }

    /// Text of the first `<title>`, whitespace-collapsed.
    pub fn title(&self) -> Option<String> {
        let head = self.head()?;
        let title = head.element_children().find(|e| e.tag == Tag::Title)?;
        let text = title
            .text_content()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        (!text.is_empty()).then_some(text)
    }

    /// Every `<style>` element in document order.
    pub fn embedded_styles(&self) -> Vec<EmbeddedStyle> {
        let mut out = Vec::new();
        collect_styles(&self.root, &mut out);
        out
    }
}

fn collect_styles(element: &ElementNode, out: &mut Vec<EmbeddedStyle>) {
    for child in element.element_children() {
        if child.tag == Tag::Style {
            out.push(EmbeddedStyle {
                css: child.text_content(),
                media: child.attr("media").map(str::to_string),
            });
        } else {
            collect_styles(child, out);
        }
    }
}

fn convert_element(element: ElementRef<'_>, depth: usize) -> Result<ElementNode> {
    if depth > MAX_DEPTH {
        return Err(Error::InvalidInput(format!(
            "document nests deeper than {MAX_DEPTH} elements"
        )));
    }
    let value = element.value();
    let mut node = ElementNode::new(Tag::from_name(value.name()));
    for (name, attr) in value.attrs() {
        node.attributes
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| attr.to_string());
    }

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let converted = convert_element(child_element, depth + 1)?;
            node.children.push(DomNode::Element(converted));
            continue;
        }
        let Node::Text(text) = child.value() else {
            // Comments, doctypes and processing instructions.
            continue;
        };
        let text: &str = text;
        if text.trim().is_empty() && node.tag.drops_whitespace() {
            continue;
        }
        match node.children.last_mut() {
            Some(DomNode::Text(previous)) => previous.push_str(text),
            _ => node.children.push(DomNode::Text(text.to_string())),
        }
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(html: &str) -> ElementNode {
        Document::parse(html).unwrap().body().unwrap().clone()
    }

    fn first_element(parent: &ElementNode) -> &ElementNode {
        parent.element_children().next().expect("Expected an element")
    }

    #[test]
    fn parse_simple_div() {
        let body = body_of(r#"<div class="header details"><p>Hello</p></div>"#);
        assert_eq!(body.children.len(), 1);
        let e = first_element(&body);
        assert_eq!(e.tag, Tag::Div);
        assert_eq!(e.classes(), vec!["header", "details"]);
        assert_eq!(e.children.len(), 1);
    }

    #[test]
    fn parse_void_img_without_slash() {
        let body = body_of(r#"<img src="logo.png"><p>after</p>"#);
        assert_eq!(body.element_children().count(), 2);
        let img = first_element(&body);
        assert_eq!(img.tag, Tag::Img);
        assert_eq!(img.src(), Some("logo.png"));
        assert!(img.children.is_empty());
    }

    #[test]
    fn parse_nested_spans() {
        let body = body_of(r#"<p>Hello <span class="bold">world</span>!</p>"#);
        let p = first_element(&body);
        assert_eq!(p.tag, Tag::P);
        assert_eq!(p.children.len(), 3); // "Hello ", <span>, "!"
    }

    #[test]
    fn parse_table_drops_layout_whitespace() {
        let html = "<table>\n  <tbody><tr><th>Name</th><th>Age</th></tr>\n  <tr><td>Alice</td><td>30</td></tr>\n</tbody></table>";
        let body = body_of(html);
        let table = first_element(&body);
        assert_eq!(table.tag, Tag::Table);
        let tbody = first_element(table);
        assert_eq!(tbody.children.len(), 2); // 2 rows, no text
    }

    #[test]
    fn implied_end_tags_for_cells_and_items() {
        let body = body_of("<table><tr><td>a<td>b<tr><td>c</table>");
        let tbody = first_element(first_element(&body));
        assert_eq!(tbody.tag, Tag::Tbody);
        let rows: Vec<_> = tbody.element_children().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].element_children().count(), 2);
        assert_eq!(rows[1].element_children().count(), 1);

        let body = body_of("<ul><li>one<li>two<li>three</ul>");
        assert_eq!(first_element(&body).element_children().count(), 3);
    }

    #[test]
    fn open_paragraph_in_cell_is_closed_by_next_cell() {
        let body = body_of("<table><tr><td><p>um<td>dois</table>");
        let tbody = first_element(first_element(&body));
        let row = first_element(tbody);
        let cells: Vec<_> = row.element_children().collect();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].text_content(), "um");
        assert_eq!(cells[1].text_content(), "dois");
    }

    #[test]
    fn paragraph_closed_by_block() {
        let body = body_of("<p>intro<div>block</div>");
        assert_eq!(body.element_children().count(), 2);
    }

    #[test]
    fn stray_end_tag_is_ignored() {
        let body = body_of("<div>a</span>b</div>");
        let div = first_element(&body);
        assert_eq!(div.text_content(), "ab");
        assert_eq!(div.children.len(), 1);
    }

    #[test]
    fn style_content_is_raw_text() {
        let doc = Document::parse("<style>td > p { color: red }</style>").unwrap();
        let style = first_element(doc.head().unwrap());
        assert_eq!(style.tag, Tag::Style);
        assert_eq!(style.text_content(), "td > p { color: red }");
    }

    #[test]
    fn entities_are_decoded() {
        let body = body_of("<p title=\"a&amp;b\">caf&#233; &#x2013; &lt;ok&gt;</p>");
        let p = first_element(&body);
        assert_eq!(p.attr("title"), Some("a&b"));
        assert_eq!(p.text_content(), "café – <ok>");
    }

    #[test]
    fn attribute_names_are_lowercased() {
        let body = body_of("<div DATA-Print-Hide='true' hidden>x</div>");
        let div = first_element(&body);
        assert_eq!(div.attr("data-print-hide"), Some("true"));
        assert_eq!(div.attr("hidden"), Some(""));
    }

    #[test]
    fn document_is_normalised() {
        let doc = Document::parse("<!DOCTYPE html><title>Roteiro</title><p>Body</p>").unwrap();
        assert_eq!(doc.root.tag, Tag::Html);
        assert_eq!(doc.title().as_deref(), Some("Roteiro"));
        let body = doc.body().unwrap();
        assert_eq!(body.element_children().count(), 1);

        let empty = Document::parse("").unwrap();
        assert!(empty.head().is_some());
        assert!(empty.body().unwrap().children.is_empty());
    }

    #[test]
    fn embedded_styles_keep_media() {
        let doc = Document::parse(
            "<html><head><style media=\"screen\">p{}</style></head><body><style>td{}</style></body></html>",
        )
        .unwrap();
        let styles = doc.embedded_styles();
        assert_eq!(styles.len(), 2);
        assert_eq!(styles[0].media.as_deref(), Some("screen"));
        assert_eq!(styles[1].css, "td{}");
    }

    #[test]
    fn excessive_nesting_is_rejected() {
        let html = "<div>".repeat(MAX_DEPTH + 1);
        let err = Document::parse(&html).unwrap_err();
        assert!(err.to_string().contains("nests deeper"));

        let shallow = "<div>".repeat(MAX_DEPTH - 3);
        assert!(Document::parse(&shallow).is_ok());
    }
}
