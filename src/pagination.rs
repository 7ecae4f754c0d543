//! Pagination – splits positioned boxes into pages.
//!
//! Handles:
//! - page boundaries of the configured geometry
//! - break-before / break-after hints, also on nested boxes
//! - table row splitting, repeating the header row group
//! - slicing boxes taller than a page between text lines
//! - horizontal alignment of text lines

use crate::layout::{BoxContent, InlineText, PositionedBox};
use crate::layout_config::*;
use crate::style;

/// Tolerance for float noise when testing whether a box fits.
const FIT_EPSILON: f32 = 0.01;

/// A box scheduled for placement, with break hints inherited from any
/// container that was flattened around it.
struct Placement<'a> {
    pbox: &'a PositionedBox,
    break_before: bool,
    break_after: bool,
}

fn has_break_hint(pbox: &PositionedBox) -> bool {
    pbox.style.page_break_before
        || pbox.style.page_break_after
        || pbox.children.iter().any(has_break_hint)
}

fn is_table_like(pbox: &PositionedBox) -> bool {
    matches!(
        pbox.style.display,
        style::Display::Table | style::Display::TableRowGroup
    ) && !pbox.children.is_empty()
}

/// Recursively expand pure containers that are taller than a page, or that
/// hold a forced break somewhere inside, so their children paginate
/// individually. The container's own hints move to its first/last child.
fn flatten_for_pagination<'a>(
    boxes: &'a [PositionedBox],
    content_height: f32,
    out: &mut Vec<Placement<'a>>,
) {
    for pbox in boxes {
        let expand = pbox.is_container()
            && !is_table_like(pbox)
            && (pbox.height > content_height || pbox.children.iter().any(has_break_hint));
        if !expand {
            out.push(Placement {
                pbox,
                break_before: pbox.style.page_break_before,
                break_after: pbox.style.page_break_after,
            });
            continue;
        }
        let start = out.len();
        flatten_for_pagination(&pbox.children, content_height, out);
        if let Some(first) = out.get_mut(start) {
            first.break_before |= pbox.style.page_break_before;
        }
        if out.len() > start {
            if let Some(last) = out.last_mut() {
                last.break_after |= pbox.style.page_break_after;
            }
        }
    }
}

struct Paginator<'a> {
    page: &'a PageGeometry,
    pages: Vec<PageLayout>,
    current: Vec<LayoutBox>,
    /// Document-space y at which the current page begins.
    page_start: f32,
    /// Nothing but a repeated header has been placed on the current page.
    fresh: bool,
}

impl<'a> Paginator<'a> {
    fn new(page: &'a PageGeometry) -> Self {
        Self {
            page,
            pages: Vec::new(),
            current: Vec::new(),
            page_start: 0.0,
            fresh: true,
        }
    }

    fn fits(&self, pbox: &PositionedBox) -> bool {
        let y_on_page = (pbox.y - self.page_start).max(0.0);
        y_on_page + pbox.height <= self.page.content_height() + FIT_EPSILON
    }

    /// Close the current page; the next one starts at `doc_y`. Never emits a
    /// blank page.
    fn new_page(&mut self, doc_y: f32) {
        if !self.current.is_empty() {
            self.pages.push(PageLayout {
                page_index: self.pages.len(),
                boxes: std::mem::take(&mut self.current),
            });
        }
        self.page_start = doc_y;
        self.fresh = true;
    }

    /// Start a new page for content beginning at `doc_y`, opening it with
    /// the repeated table header if there is one.
    fn break_before(&mut self, doc_y: f32, header: Option<&PositionedBox>) {
        match header {
            Some(h) => {
                self.new_page(doc_y - h.height);
                self.place_at(h, 0.0);
                self.fresh = true;
            }
            None => self.new_page(doc_y),
        }
    }

    fn place(&mut self, pbox: &PositionedBox) {
        let y_on_page = (pbox.y - self.page_start).max(0.0);
        self.place_at(pbox, y_on_page);
    }

    fn place_at(&mut self, pbox: &PositionedBox, y_on_page: f32) {
        let layout_box = build_layout_box(pbox, pbox.x, self.page.margin_top + y_on_page);
        self.current.push(layout_box);
        self.fresh = false;
    }

    /// Place a box that does not fit, filling the current page and carrying
    /// the remainder over as many pages as it needs. Cuts fall between text
    /// lines; a line or image is only cut when it alone is taller than a page.
    fn place_sliced(&mut self, pbox: &PositionedBox, header: Option<&PositionedBox>) {
        let mut rest = pbox.clone();
        loop {
            if self.fits(&rest) {
                self.place(&rest);
                return;
            }
            let limit = self.page_start + self.page.content_height();
            let cut = match safe_cut(&rest, limit) {
                Some(cut) => cut,
                None if !self.fresh => {
                    self.break_before(rest.y, header);
                    continue;
                }
                None if limit > rest.y + FIT_EPSILON => limit,
                None => {
                    self.place(&rest);
                    return;
                }
            };
            let (head, tail) = split_box(&rest, cut);
            if let Some(head) = head {
                self.place(&head);
            }
            match tail {
                Some(tail) => {
                    self.break_before(tail.y, header);
                    rest = tail;
                }
                None => return,
            }
        }
    }

    fn split_table(&mut self, table: &PositionedBox) {
        let mut header: Option<&PositionedBox> = None;
        let mut rows: Vec<(&PositionedBox, bool)> = Vec::new();
        for child in &table.children {
            if child.style.display == style::Display::TableRowGroup {
                if child.repeat_on_break && header.is_none() {
                    header = Some(child);
                }
                rows.extend(child.children.iter().map(|r| (r, child.repeat_on_break)));
            } else {
                rows.push((child, false));
            }
        }

        let content_height = self.page.content_height();
        for (row, in_header) in rows {
            let repeat = header.filter(|_| !in_header);
            if !self.fits(row) {
                let room = content_height - repeat.map_or(0.0, |h| h.height);
                if row.height > room + FIT_EPSILON {
                    self.place_sliced(row, repeat);
                    continue;
                }
                if !self.fresh {
                    self.break_before(row.y, repeat);
                }
            }
            self.place(row);
        }
    }

    fn finish(mut self) -> Vec<PageLayout> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(PageLayout {
                page_index: self.pages.len(),
                boxes: std::mem::take(&mut self.current),
            });
        }
        self.pages
    }
}

/// Top and bottom of each unit that must not be cut: text lines, list
/// markers and images.
fn unbreakable_spans(pbox: &PositionedBox, out: &mut Vec<(f32, f32)>) {
    let bottom = pbox.y + pbox.height;
    match &pbox.content {
        BoxContent::Text { text, .. } => {
            for (i, line) in text.lines.iter().enumerate() {
                let top = pbox.y + line.y_offset;
                let line_bottom = text
                    .lines
                    .get(i + 1)
                    .map_or(bottom, |next| pbox.y + next.y_offset);
                out.push((top, line_bottom.max(top)));
            }
        }
        BoxContent::Marker { line } => {
            let top = pbox.y + line.y_offset;
            let size = line.runs.iter().map(|r| r.font_size).fold(0.0, f32::max);
            out.push((top, top + line.baseline + size));
        }
        BoxContent::Image { .. } => out.push((pbox.y, bottom)),
        BoxContent::None => {}
    }
    for child in &pbox.children {
        unbreakable_spans(child, out);
    }
}

/// Highest cut at or above `limit` that does not pass through a line or
/// image. `None` when no line or image would end up above it.
fn safe_cut(pbox: &PositionedBox, limit: f32) -> Option<f32> {
    let mut spans = Vec::new();
    unbreakable_spans(pbox, &mut spans);
    let mut cut = limit;
    loop {
        let lowered = spans
            .iter()
            .filter(|(top, bottom)| *top < cut - FIT_EPSILON && *bottom > cut + FIT_EPSILON)
            .map(|(top, _)| *top)
            .fold(cut, f32::min);
        if lowered >= cut {
            break;
        }
        cut = lowered;
    }
    let keeps_content =
        spans.is_empty() || spans.iter().any(|(_, bottom)| *bottom <= cut + FIT_EPSILON);
    (keeps_content && cut > pbox.y + FIT_EPSILON).then_some(cut)
}

/// Split a box at document-space `cut` into the part above and the part
/// below. Lines belong to the side their top is on; images are never cut.
fn split_box(pbox: &PositionedBox, cut: f32) -> (Option<PositionedBox>, Option<PositionedBox>) {
    let bottom = pbox.y + pbox.height;
    if bottom <= cut + FIT_EPSILON {
        return (Some(pbox.clone()), None);
    }
    if pbox.y >= cut - FIT_EPSILON {
        return (None, Some(pbox.clone()));
    }
    let shift = cut - pbox.y;

    let (head_content, tail_content) = match &pbox.content {
        BoxContent::Text { text, align } => {
            let (above, below): (Vec<_>, Vec<_>) = text
                .lines
                .iter()
                .cloned()
                .partition(|line| pbox.y + line.y_offset < cut - FIT_EPSILON);
            let below = below
                .into_iter()
                .map(|line| TextLine {
                    y_offset: line.y_offset - shift,
                    ..line
                })
                .collect();
            let piece = |lines: Vec<TextLine>, height: f32| BoxContent::Text {
                text: InlineText {
                    lines,
                    width: text.width,
                    height,
                },
                align: *align,
            };
            (piece(above, shift), piece(below, bottom - cut))
        }
        BoxContent::Image { .. } => return (Some(pbox.clone()), None),
        BoxContent::Marker { line } if pbox.y + line.y_offset >= cut - FIT_EPSILON => {
            let line = TextLine {
                y_offset: line.y_offset - shift,
                ..line.clone()
            };
            (BoxContent::None, BoxContent::Marker { line })
        }
        BoxContent::Marker { .. } => (pbox.content.clone(), BoxContent::None),
        BoxContent::None => (BoxContent::None, BoxContent::None),
    };

    let mut head_children = Vec::new();
    let mut tail_children = Vec::new();
    for child in &pbox.children {
        let (head, tail) = split_box(child, cut);
        head_children.extend(head);
        tail_children.extend(tail);
    }

    let head = PositionedBox {
        height: shift,
        content: head_content,
        children: head_children,
        ..pbox.clone()
    };
    let tail = PositionedBox {
        y: cut,
        height: bottom - cut,
        content: tail_content,
        children: tail_children,
        ..pbox.clone()
    };
    (Some(head), Some(tail))
}

/// Convert positioned boxes into a paginated LayoutConfig. At least one
/// page is always produced.
pub fn paginate(boxes: &[PositionedBox], page: &PageGeometry) -> LayoutConfig {
    let mut flat = Vec::new();
    flatten_for_pagination(boxes, page.content_height(), &mut flat);

    let mut paginator = Paginator::new(page);
    for item in &flat {
        let pbox = item.pbox;
        if item.break_before {
            paginator.new_page(pbox.y);
        }

        if !paginator.fits(pbox) {
            let taller_than_page = pbox.height > page.content_height() + FIT_EPSILON;
            let avoid = pbox.style.page_break_inside_avoid && !taller_than_page;
            if is_table_like(pbox) && !avoid {
                paginator.split_table(pbox);
            } else if taller_than_page {
                paginator.place_sliced(pbox, None);
            } else {
                paginator.new_page(pbox.y);
                paginator.place(pbox);
            }
        } else {
            paginator.place(pbox);
        }

        if item.break_after {
            paginator.new_page(pbox.y + pbox.height);
        }
    }

    let pages = paginator.finish();
    log::debug!("paginated {} boxes onto {} page(s)", flat.len(), pages.len());
    LayoutConfig {
        page: *page,
        pages,
        ..LayoutConfig::a4()
    }
}

/// Recursively build a LayoutBox tree where every box carries *page-absolute*
/// x/y coordinates (origin = top-left of the physical page).
///
/// PositionedBox.y values are document-space absolutes, so a child's
/// position on the page is `parent_abs_y + (child.y - parent.y)`.
fn build_layout_box(pbox: &PositionedBox, abs_x: f32, abs_y: f32) -> LayoutBox {
    let mut lb = LayoutBox::new(abs_x, abs_y, pbox.width, pbox.height);

    if !pbox.style.background_color.is_transparent() {
        lb.background_color = Some(pbox.style.background_color.to_array());
    }

    if pbox.style.border_width > 0.0 {
        lb.border = Some(BorderStyle {
            width: pbox.style.border_width,
            color: pbox.style.border_color.to_array(),
        });
    }

    match &pbox.content {
        BoxContent::Text { text, align } => {
            let lines = text
                .lines
                .iter()
                .map(|line| {
                    let slack = (pbox.width - line.width).max(0.0);
                    TextLine {
                        x_offset: match align {
                            style::TextAlign::Left => 0.0,
                            style::TextAlign::Center => slack / 2.0,
                            style::TextAlign::Right => slack,
                        },
                        ..line.clone()
                    }
                })
                .collect();
            lb.text = Some(TextContent { lines });
        }
        BoxContent::Marker { line } => {
            lb.text = Some(TextContent {
                lines: vec![line.clone()],
            });
        }
        BoxContent::Image { src } => {
            lb.image = Some(ImageContent {
                src: src.clone(),
                width: pbox.width,
                height: pbox.height,
            });
        }
        BoxContent::None => {}
    }

    for child in &pbox.children {
        let child_abs_y = abs_y + (child.y - pbox.y);
        lb.children.push(build_layout_box(child, child.x, child_abs_y));
    }

    lb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::Stylesheet;
    use crate::dom::Document;
    use crate::fonts::FontManager;
    use crate::layout::compute_layout;
    use crate::style::{build_styled_tree, user_agent_stylesheet, Cascade};

    fn paginate_html(html: &str, css: &str) -> LayoutConfig {
        let doc = Document::parse(html).unwrap();
        let ua = user_agent_stylesheet();
        let author = Stylesheet::parse(css);
        let mut cascade = Cascade::new(&ua);
        cascade.add_author(&author);
        let styled = build_styled_tree(&doc, &cascade).unwrap();
        let fonts = FontManager::new();
        let page = PageGeometry::a4(40.0);
        let boxes = compute_layout(&styled, &page, &fonts).unwrap();
        paginate(&boxes, &page)
    }

    fn baselines(boxes: &[LayoutBox], out: &mut Vec<f32>) {
        for b in boxes {
            if let Some(text) = &b.text {
                out.extend(text.lines.iter().map(|l| b.y + l.y_offset + l.baseline));
            }
            baselines(&b.children, out);
        }
    }

    fn assert_lines_on_page(config: &LayoutConfig) {
        let bottom = config.page.height - config.page.margin_bottom;
        for (i, page) in config.pages.iter().enumerate() {
            let mut found = Vec::new();
            baselines(&page.boxes, &mut found);
            for y in found {
                assert!(
                    y >= config.page.margin_top - 0.01 && y <= bottom + 0.01,
                    "page {i}: baseline at {y} outside the content area (bottom {bottom})"
                );
            }
        }
    }

    fn numbered_words(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("w{i}")).collect()
    }

    #[test]
    fn single_page() {
        let config = paginate_html("<p>Short text</p>", "");
        assert_eq!(config.pages.len(), 1);
    }

    #[test]
    fn empty_document_still_has_a_page() {
        let config = paginate_html("", "");
        assert_eq!(config.pages.len(), 1);
    }

    #[test]
    fn multiple_pages() {
        let mut html = String::new();
        for i in 0..80 {
            html.push_str(&format!("<p>Paragraph {} with some text</p>", i));
        }
        let config = paginate_html(&html, "");
        assert!(
            config.pages.len() > 1,
            "Expected multiple pages, got {}",
            config.pages.len()
        );
        for page in &config.pages {
            for b in &page.boxes {
                assert!(b.y >= 40.0 - 0.01);
            }
        }
    }

    #[test]
    fn nested_break_before_starts_new_page() {
        let config = paginate_html(
            r#"<div><p>one</p><p class="next">two</p></div>"#,
            ".next { page-break-before: always; }",
        );
        assert_eq!(config.pages.len(), 2);
        let second = LayoutConfig {
            pages: vec![config.pages[1].clone()],
            ..config.clone()
        };
        assert_eq!(second.plain_text(), "two\n");
    }

    #[test]
    fn split_table_repeats_header() {
        let mut html = String::from("<table><thead><tr><th>VIDEO</th></tr></thead><tbody>");
        for i in 0..120 {
            html.push_str(&format!("<tr><td>row {i}</td></tr>"));
        }
        html.push_str("</tbody></table>");
        let config = paginate_html(&html, "td, th { padding: 6px; }");
        assert!(config.pages.len() > 1);
        for (i, page) in config.pages.iter().enumerate() {
            let single = LayoutConfig {
                pages: vec![page.clone()],
                ..config.clone()
            };
            assert!(
                single.plain_text().starts_with("VIDEO\n"),
                "page {i} lacks the header row"
            );
        }
        assert_eq!(
            config.plain_text().matches("row 119").count(),
            1,
            "every body row is placed once"
        );
    }

    #[test]
    fn centred_text_gets_offset() {
        let config = paginate_html(r#"<p style="text-align: center">mid</p>"#, "");
        fn first_line(boxes: &[LayoutBox]) -> Option<&TextLine> {
            boxes.iter().find_map(|b| {
                b.text
                    .as_ref()
                    .and_then(|t| t.lines.first())
                    .or_else(|| first_line(&b.children))
            })
        }
        let line = first_line(&config.pages[0].boxes).unwrap();
        assert!(line.x_offset > 100.0);
    }

    #[test]
    fn paragraph_taller_than_a_page_continues_on_next_pages() {
        let words = numbered_words(6000);
        let html = format!("<h1>Roteiro</h1><p>{}</p>", words.join(" "));
        let config = paginate_html(&html, "");
        assert!(config.pages.len() > 2);
        assert_lines_on_page(&config);

        let text = config.plain_text();
        let placed: Vec<&str> = text.split_whitespace().skip(1).collect();
        assert_eq!(placed, words);
    }

    #[test]
    fn oversized_cell_splits_row_and_repeats_header() {
        let words = numbered_words(5000);
        let html = format!(
            "<table><thead><tr><th>AUDIO</th><th>TEMPO</th></tr></thead>\
             <tbody><tr><td>{}</td><td>10s</td></tr><tr><td>fim</td><td>2s</td></tr></tbody></table>",
            words.join(" ")
        );
        let config = paginate_html(&html, "td, th { padding: 6px; border: 1px solid black; }");
        assert!(config.pages.len() > 2);
        assert_lines_on_page(&config);

        for (i, page) in config.pages.iter().enumerate() {
            let single = LayoutConfig {
                pages: vec![page.clone()],
                ..config.clone()
            };
            assert!(
                single.plain_text().starts_with("AUDIO\nTEMPO\n"),
                "page {i} lacks the header row"
            );
        }
        let text = config.plain_text();
        let placed: Vec<&str> = text
            .split_whitespace()
            .filter(|w| w.starts_with('w'))
            .collect();
        assert_eq!(placed, words);
        assert_eq!(text.matches("10s").count(), 1);
        assert_eq!(text.matches("fim").count(), 1);
    }

    #[test]
    fn sliced_text_never_cuts_through_a_line() {
        let words = numbered_words(3000);
        let html = format!("<p style=\"line-height: 2\">{}</p>", words.join(" "));
        let config = paginate_html(&html, "");
        fn check(boxes: &[LayoutBox]) {
            for b in boxes {
                if let Some(text) = &b.text {
                    for line in &text.lines {
                        assert!(
                            line.y_offset >= -0.01 && line.y_offset < b.height,
                            "line at {} lies outside its {}pt box",
                            line.y_offset,
                            b.height
                        );
                    }
                }
                check(&b.children);
            }
        }
        assert!(config.pages.len() > 1);
        for page in &config.pages {
            check(&page.boxes);
        }
        assert_lines_on_page(&config);
    }
}
