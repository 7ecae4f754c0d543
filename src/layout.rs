//! Layout engine – uses Taffy to compute flexbox / grid layout from a styled
//! DOM tree, then converts the result into a tree of positioned boxes.
//!
//! Inline content never reaches Taffy as individual nodes: each run of
//! consecutive inline nodes is word-wrapped here, with every word measured in
//! its own font, and enters the Taffy tree as one fixed-height text leaf.
//! Tables become nested flex containers (rows are flex rows whose cells share
//! the row width by `colspan`).

use std::collections::{HashMap, HashSet};

use taffy::prelude::*;

use crate::dom::Tag;
use crate::error::Result;
use crate::fonts::{break_word, FontChoice, FontManager};
use crate::layout_config::{PageGeometry, TextLine, TextRun};
use crate::render::parse_data_uri;
use crate::style::{self, ComputedStyle, StyledNode, PX_TO_PT};

/// Space between a list marker and its item, in points.
pub const MARKER_GUTTER_PT: f32 = 6.0;

// ---------------------------------------------------------------------------
// Intermediate layout tree (pre-pagination)
// ---------------------------------------------------------------------------

/// A positioned box in document coordinates (before page splitting).
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub children: Vec<PositionedBox>,
    /// Header row group, repeated on every page the table continues on.
    pub repeat_on_break: bool,
}

impl PositionedBox {
    pub fn is_container(&self) -> bool {
        matches!(self.content, BoxContent::None | BoxContent::Marker { .. })
            && !self.children.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    Text {
        text: InlineText,
        align: style::TextAlign,
    },
    Image {
        src: String,
    },
    /// Bullet or ordinal of a list item; `x_offset` is negative, into the
    /// gutter left of the item box.
    Marker {
        line: TextLine,
    },
}

/// Word-wrapped inline content, lines not yet aligned.
#[derive(Debug, Clone, Default)]
pub struct InlineText {
    pub lines: Vec<TextLine>,
    /// Widest line.
    pub width: f32,
    pub height: f32,
}

// ---------------------------------------------------------------------------
// Inline formatting
// ---------------------------------------------------------------------------

enum InlineItem<'s> {
    Word {
        text: String,
        style: &'s ComputedStyle,
        space_before: bool,
    },
    Break,
}

/// Flatten an inline subtree into words and forced breaks. Whitespace
/// collapses; `<br>` forces a break.
fn collect_inline<'s>(
    node: &'s StyledNode,
    items: &mut Vec<InlineItem<'s>>,
    pending_space: &mut bool,
) {
    match node {
        StyledNode::Text { text, style } => {
            let mut word = String::new();
            for ch in text.chars() {
                if ch.is_whitespace() && ch != '\u{a0}' {
                    if !word.is_empty() {
                        items.push(InlineItem::Word {
                            text: std::mem::take(&mut word),
                            style,
                            space_before: *pending_space,
                        });
                    }
                    *pending_space = true;
                } else {
                    word.push(ch);
                }
            }
            if !word.is_empty() {
                items.push(InlineItem::Word {
                    text: word,
                    style,
                    space_before: *pending_space,
                });
                *pending_space = false;
            }
        }
        StyledNode::Element { tag: Tag::Br, .. } => {
            items.push(InlineItem::Break);
            *pending_space = false;
        }
        StyledNode::Element { children, .. } => {
            for child in children {
                collect_inline(child, items, pending_space);
            }
        }
    }
}

/// True for text and for inline elements holding only inline content.
fn is_inline_content(node: &StyledNode) -> bool {
    match node {
        StyledNode::Text { .. } => true,
        StyledNode::Element {
            tag: Tag::Img, ..
        } => false,
        StyledNode::Element {
            style, children, ..
        } => style.display == style::Display::Inline && children.iter().all(is_inline_content),
    }
}

struct LineBreaker<'a> {
    fonts: &'a FontManager,
    block: &'a ComputedStyle,
    max_width: f32,
    lines: Vec<TextLine>,
    runs: Vec<TextRun>,
    width: f32,
    line_height: f32,
    baseline: f32,
    y: f32,
}

impl<'a> LineBreaker<'a> {
    fn new(fonts: &'a FontManager, block: &'a ComputedStyle, max_width: f32) -> Self {
        Self {
            fonts,
            block,
            max_width: max_width.max(1.0),
            lines: Vec::new(),
            runs: Vec::new(),
            width: 0.0,
            line_height: 0.0,
            baseline: 0.0,
            y: 0.0,
        }
    }

    fn font_for(&self, style: &ComputedStyle) -> FontChoice {
        self.fonts
            .resolve(&style.font_family, style.is_bold(), style.is_italic())
    }

    /// Place a group of words with no breaking opportunity between them.
    fn place_chunk(&mut self, words: &[(&str, &ComputedStyle)], space_before: bool) {
        let fonts = self.fonts;
        let measured: Vec<(FontChoice, f32)> = words
            .iter()
            .map(|(text, style)| {
                let font = self.font_for(style);
                let width = fonts.measure_text_width(text, style.font_size, &font);
                (font, width)
            })
            .collect();
        let chunk_width: f32 = measured.iter().map(|(_, w)| w).sum();
        let (first_font, _) = &measured[0];
        let first_style = words[0].1;

        let mut space = if space_before && !self.runs.is_empty() {
            fonts.measure_text_width(" ", first_style.font_size, first_font)
        } else {
            0.0
        };
        if !self.runs.is_empty() && self.width + space + chunk_width > self.max_width {
            self.finish_line();
            space = 0.0;
        }
        if space > 0.0 {
            self.push_text(" ", first_style, first_font.clone(), space);
        }

        for ((text, style), (font, width)) in words.iter().zip(measured) {
            if style.break_words && width > self.max_width {
                if !self.runs.is_empty() {
                    self.finish_line();
                }
                let mut pieces =
                    break_word(text, style.font_size, &font, self.max_width, fonts).into_iter();
                let mut next = pieces.next();
                while let Some(piece) = next {
                    let piece_width = fonts.measure_text_width(&piece, style.font_size, &font);
                    self.push_text(&piece, style, font.clone(), piece_width);
                    next = pieces.next();
                    if next.is_some() {
                        self.finish_line();
                    }
                }
            } else {
                self.push_text(text, style, font, width);
            }
        }
    }

    fn push_text(&mut self, text: &str, style: &ComputedStyle, font: FontChoice, width: f32) {
        let color = style.color.to_array();
        let underline = style.text_decoration == style::TextDecoration::Underline;
        let line_height = style.font_size * style.line_height;
        let baseline = (line_height - style.font_size) / 2.0
            + self.fonts.ascender(style.font_size, &font);
        self.line_height = self.line_height.max(line_height);
        self.baseline = self.baseline.max(baseline);

        if let Some(last) = self.runs.last_mut() {
            if last.font == font
                && last.font_size == style.font_size
                && last.color == color
                && last.underline == underline
            {
                last.text.push_str(text);
                last.width += width;
                self.width += width;
                return;
            }
        }
        self.runs.push(TextRun {
            text: text.to_string(),
            x: self.width,
            width,
            font,
            font_size: style.font_size,
            color,
            underline,
        });
        self.width += width;
    }

    fn finish_line(&mut self) {
        if self.runs.is_empty() {
            let font = self.font_for(self.block);
            self.line_height = self.block.font_size * self.block.line_height;
            self.baseline = (self.line_height - self.block.font_size) / 2.0
                + self.fonts.ascender(self.block.font_size, &font);
        }
        self.lines.push(TextLine {
            runs: std::mem::take(&mut self.runs),
            x_offset: 0.0,
            y_offset: self.y,
            baseline: self.baseline,
            width: self.width,
        });
        self.y += self.line_height;
        self.width = 0.0;
        self.line_height = 0.0;
        self.baseline = 0.0;
    }

    fn finish(mut self) -> InlineText {
        if !self.runs.is_empty() {
            self.finish_line();
        }
        let width = self.lines.iter().map(|l| l.width).fold(0.0f32, f32::max);
        InlineText {
            lines: self.lines,
            width,
            height: self.y,
        }
    }
}

/// Word-wrap inline items into lines no wider than `max_width`.
fn layout_inline(
    items: &[InlineItem<'_>],
    block: &ComputedStyle,
    max_width: f32,
    fonts: &FontManager,
) -> InlineText {
    let mut breaker = LineBreaker::new(fonts, block, max_width);
    let mut i = 0;
    while i < items.len() {
        match &items[i] {
            InlineItem::Break => {
                breaker.finish_line();
                i += 1;
            }
            InlineItem::Word { space_before, .. } => {
                let space_before = *space_before;
                let mut chunk = Vec::new();
                while let Some(InlineItem::Word {
                    text,
                    style,
                    space_before: spaced,
                }) = items.get(i)
                {
                    if !chunk.is_empty() && *spaced {
                        break;
                    }
                    chunk.push((text.as_str(), *style));
                    i += 1;
                }
                breaker.place_chunk(&chunk, space_before);
            }
        }
    }
    breaker.finish()
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

struct TableContext {
    collapse: bool,
    /// `table-layout: fixed`: cell content never widens its column.
    fixed: bool,
    rows: usize,
}

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    node_styles: HashMap<NodeId, ComputedStyle>,
    node_content: HashMap<NodeId, BoxContent>,
    repeat_on_break: HashSet<NodeId>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            node_styles: HashMap::new(),
            node_content: HashMap::new(),
            repeat_on_break: HashSet::new(),
        }
    }

    fn build_node(
        &mut self,
        styled: &StyledNode,
        parent: &ComputedStyle,
        available: f32,
    ) -> Result<Option<NodeId>> {
        match styled {
            StyledNode::Text { style, .. } => {
                self.build_text_leaf(&[styled], style, available)
            }
            StyledNode::Element {
                tag: Tag::Img,
                style,
                attrs,
                ..
            } => {
                let src = attrs.get("src").map(String::as_str).unwrap_or("");
                self.build_image(src, style, parent, available)
            }
            StyledNode::Element {
                tag,
                style,
                children,
                ..
            } => {
                let id = if style.display == style::Display::Table {
                    self.build_table(style, children, available)?
                } else {
                    self.build_container(tag, style, children, available)?
                };
                Ok(Some(id))
            }
        }
    }

    /// Width left for children once margins, border and padding are taken.
    fn inner_width(style: &ComputedStyle, available: f32) -> f32 {
        let mut outer = style
            .width
            .resolve(available)
            .unwrap_or(available - style.margin_left - style.margin_right);
        if let Some(max) = style.max_width.resolve(available) {
            outer = outer.min(max);
        }
        (outer - style.horizontal_chrome()).max(1.0)
    }

    fn build_text_leaf(
        &mut self,
        nodes: &[&StyledNode],
        block: &ComputedStyle,
        max_width: f32,
    ) -> Result<Option<NodeId>> {
        let mut items = Vec::new();
        let mut pending_space = false;
        for node in nodes {
            collect_inline(node, &mut items, &mut pending_space);
        }
        if items.is_empty() {
            return Ok(None);
        }
        let text = layout_inline(&items, block, max_width, self.fonts);

        let taffy_style = Style {
            size: Size {
                width: taffy::Dimension::Auto,
                height: taffy::Dimension::Length(text.height),
            },
            min_size: Size {
                width: taffy::Dimension::Length(text.width),
                height: taffy::Dimension::Auto,
            },
            flex_shrink: 0.0,
            ..Default::default()
        };
        let node = self.taffy.new_leaf(taffy_style)?;
        self.node_styles.insert(node, block.for_text());
        self.node_content.insert(
            node,
            BoxContent::Text {
                text,
                align: block.text_align,
            },
        );
        Ok(Some(node))
    }

    /// Normal flow: block children stack, runs of inline siblings between
    /// them become anonymous text leaves.
    fn build_flow(
        &mut self,
        children: &[StyledNode],
        parent: &ComputedStyle,
        inner: f32,
    ) -> Result<Vec<NodeId>> {
        let mut ids = Vec::new();
        let mut inline_run: Vec<&StyledNode> = Vec::new();
        let mut list_index = 0usize;

        for child in children {
            if is_inline_content(child) {
                inline_run.push(child);
                continue;
            }
            if let Some(id) = self.build_text_leaf(&inline_run, parent, inner)? {
                ids.push(id);
            }
            inline_run.clear();

            let Some(id) = self.build_node(child, parent, inner)? else {
                continue;
            };
            let child_style = child.style();
            if child_style.display == style::Display::ListItem {
                list_index += 1;
                if let Some(marker) = child_style.list_style.marker(list_index) {
                    let line = self.marker_line(&marker, child_style);
                    self.node_content.insert(id, BoxContent::Marker { line });
                }
            }
            ids.push(id);
        }
        if let Some(id) = self.build_text_leaf(&inline_run, parent, inner)? {
            ids.push(id);
        }
        Ok(ids)
    }

    fn marker_line(&self, marker: &str, item: &ComputedStyle) -> TextLine {
        let font = self
            .fonts
            .resolve(&item.font_family, item.is_bold(), item.is_italic());
        let width = self.fonts.measure_text_width(marker, item.font_size, &font);
        let line_height = item.font_size * item.line_height;
        TextLine {
            runs: vec![TextRun {
                text: marker.to_string(),
                x: 0.0,
                width,
                font: font.clone(),
                font_size: item.font_size,
                color: item.color.to_array(),
                underline: false,
            }],
            x_offset: -(width + MARKER_GUTTER_PT),
            y_offset: item.padding_top + item.border_width,
            baseline: (line_height - item.font_size) / 2.0
                + self.fonts.ascender(item.font_size, &font),
            width,
        }
    }

    /// Flex and grid containers: every child is its own item.
    fn build_items(
        &mut self,
        children: &[StyledNode],
        style: &ComputedStyle,
        inner: f32,
    ) -> Result<Vec<NodeId>> {
        let item_count = children
            .iter()
            .filter(|c| match c {
                StyledNode::Text { text, .. } => !text.trim().is_empty(),
                StyledNode::Element { .. } => true,
            })
            .count()
            .max(1);
        let per_item = match (style.display, style.flex_direction) {
            (style::Display::Grid, _) => {
                let cols = style.grid_template_columns.len().max(1);
                (inner - style.gap * (cols - 1) as f32) / cols as f32
            }
            (_, style::FlexDirection::Row) => {
                (inner - style.gap * (item_count - 1) as f32) / item_count as f32
            }
            (_, style::FlexDirection::Column) => inner,
        }
        .max(1.0);

        let mut ids = Vec::new();
        for child in children {
            if let Some(id) = self.build_node(child, style, per_item)? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn build_container(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        available: f32,
    ) -> Result<NodeId> {
        let inner = Self::inner_width(style, available);
        let child_ids = match style.display {
            style::Display::Flex | style::Display::Grid => {
                self.build_items(children, style, inner)?
            }
            _ => self.build_flow(children, style, inner)?,
        };

        let taffy_style = self.computed_to_taffy(style);
        let node = self.taffy.new_with_children(taffy_style, &child_ids)?;
        self.node_styles.insert(node, style.clone());
        if *tag == Tag::Thead {
            self.repeat_on_break.insert(node);
        }
        Ok(node)
    }

    fn build_table(
        &mut self,
        style: &ComputedStyle,
        children: &[StyledNode],
        available: f32,
    ) -> Result<NodeId> {
        let inner = Self::inner_width(style, available);
        let mut ctx = TableContext {
            collapse: style.border_collapse,
            fixed: style.table_layout_fixed,
            rows: 0,
        };

        let mut ids = Vec::new();
        for child in children {
            let StyledNode::Element {
                tag,
                style: child_style,
                children: grandchildren,
                ..
            } = child
            else {
                if let Some(id) = self.build_node(child, style, inner)? {
                    ids.push(id);
                }
                continue;
            };
            match child_style.display {
                style::Display::TableRowGroup => {
                    let mut rows = Vec::new();
                    for row in grandchildren {
                        if let StyledNode::Element {
                            style: row_style,
                            children: cells,
                            ..
                        } = row
                        {
                            rows.push(self.build_row(row_style, cells, inner, &mut ctx)?);
                        }
                    }
                    let group = self.taffy.new_with_children(
                        Style {
                            display: taffy::Display::Flex,
                            flex_direction: taffy::FlexDirection::Column,
                            flex_shrink: 0.0,
                            ..Default::default()
                        },
                        &rows,
                    )?;
                    self.node_styles.insert(group, child_style.clone());
                    if *tag == Tag::Thead {
                        self.repeat_on_break.insert(group);
                    }
                    ids.push(group);
                }
                style::Display::TableRow => {
                    ids.push(self.build_row(child_style, grandchildren, inner, &mut ctx)?);
                }
                _ => {
                    if let Some(id) = self.build_node(child, style, inner)? {
                        ids.push(id);
                    }
                }
            }
        }

        let mut ts = self.computed_to_taffy(style);
        ts.display = taffy::Display::Flex;
        ts.flex_direction = taffy::FlexDirection::Column;
        let node = self.taffy.new_with_children(ts, &ids)?;
        self.node_styles.insert(node, style.clone());
        Ok(node)
    }

    fn build_row(
        &mut self,
        style: &ComputedStyle,
        cells: &[StyledNode],
        width: f32,
        ctx: &mut TableContext,
    ) -> Result<NodeId> {
        let first_row = ctx.rows == 0;
        ctx.rows += 1;

        let cells: Vec<(&ComputedStyle, &[StyledNode], usize)> = cells
            .iter()
            .filter_map(|c| match c {
                StyledNode::Element {
                    style,
                    children,
                    attrs,
                    ..
                } => {
                    let span = attrs
                        .get("colspan")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .filter(|n| *n > 0)
                        .unwrap_or(1);
                    Some((style, children.as_slice(), span))
                }
                StyledNode::Text { .. } => None,
            })
            .collect();

        let fixed: f32 = cells
            .iter()
            .filter_map(|(s, _, _)| s.width.resolve(width))
            .sum();
        let shared_span: usize = cells
            .iter()
            .filter(|(s, _, _)| s.width.resolve(width).is_none())
            .map(|(_, _, span)| span)
            .sum();
        let unit = (width - fixed).max(0.0) / shared_span.max(1) as f32;

        let mut ids = Vec::new();
        for (i, (cell_style, children, span)) in cells.into_iter().enumerate() {
            let explicit = cell_style.width.resolve(width);
            let cell_width = explicit.unwrap_or(unit * span as f32);
            let inner = (cell_width - cell_style.horizontal_chrome()).max(1.0);
            let child_ids = self.build_flow(children, cell_style, inner)?;

            let mut ts = self.computed_to_taffy(cell_style);
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Column;
            ts.justify_content = Some(match cell_style.vertical_align {
                style::VerticalAlign::Top => taffy::JustifyContent::Start,
                style::VerticalAlign::Middle => taffy::JustifyContent::Center,
                style::VerticalAlign::Bottom => taffy::JustifyContent::End,
            });
            ts.size.width = taffy::Dimension::Auto;
            ts.min_size.width = if ctx.fixed {
                taffy::Dimension::Length(0.0)
            } else {
                taffy::Dimension::Auto
            };
            match explicit {
                Some(w) => {
                    ts.flex_basis = taffy::Dimension::Length(w);
                    ts.flex_grow = 0.0;
                }
                None => {
                    ts.flex_basis = taffy::Dimension::Length(0.0);
                    ts.flex_grow = span as f32;
                }
            }
            ts.flex_shrink = 1.0;
            if ctx.collapse {
                // Adjacent borders overlap instead of doubling.
                let b = cell_style.border_width;
                ts.margin = Rect {
                    top: LengthPercentageAuto::Length(if first_row { 0.0 } else { -b }),
                    right: LengthPercentageAuto::Length(0.0),
                    bottom: LengthPercentageAuto::Length(0.0),
                    left: LengthPercentageAuto::Length(if i == 0 { 0.0 } else { -b }),
                };
            }
            let cell = self.taffy.new_with_children(ts, &child_ids)?;
            self.node_styles.insert(cell, cell_style.clone());
            ids.push(cell);
        }

        let row = self.taffy.new_with_children(
            Style {
                display: taffy::Display::Flex,
                flex_direction: taffy::FlexDirection::Row,
                align_items: Some(taffy::AlignItems::Stretch),
                flex_shrink: 0.0,
                min_size: Size {
                    width: taffy::Dimension::Length(0.0),
                    height: taffy::Dimension::Auto,
                },
                ..Default::default()
            },
            &ids,
        )?;
        self.node_styles.insert(row, style.clone());
        Ok(row)
    }

    fn build_image(
        &mut self,
        src: &str,
        style: &ComputedStyle,
        parent: &ComputedStyle,
        available: f32,
    ) -> Result<Option<NodeId>> {
        let container_height = parent.definite_content_height();
        let Some((width, height)) = resolve_image_size(src, style, available, container_height)
        else {
            return Ok(None);
        };
        let taffy_style = Style {
            size: Size {
                width: taffy::Dimension::Length(width),
                height: taffy::Dimension::Length(height),
            },
            flex_shrink: 0.0,
            margin: margin_rect(style),
            align_self: Some(match parent.text_align {
                style::TextAlign::Left => taffy::AlignSelf::Start,
                style::TextAlign::Center => taffy::AlignSelf::Center,
                style::TextAlign::Right => taffy::AlignSelf::End,
            }),
            ..Default::default()
        };
        let node = self.taffy.new_leaf(taffy_style)?;
        self.node_styles.insert(node, style.clone());
        self.node_content.insert(
            node,
            BoxContent::Image {
                src: src.to_string(),
            },
        );
        Ok(Some(node))
    }

    fn computed_to_taffy(&self, s: &ComputedStyle) -> Style {
        let mut ts = Style::default();

        match s.display {
            style::Display::Flex => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = match s.flex_direction {
                    style::FlexDirection::Row => taffy::FlexDirection::Row,
                    style::FlexDirection::Column => taffy::FlexDirection::Column,
                };
                ts.flex_wrap = match s.flex_wrap {
                    style::FlexWrap::NoWrap => taffy::FlexWrap::NoWrap,
                    style::FlexWrap::Wrap => taffy::FlexWrap::Wrap,
                };
                ts.justify_content = Some(match s.justify_content {
                    style::JustifyContent::Start => taffy::JustifyContent::Start,
                    style::JustifyContent::End => taffy::JustifyContent::End,
                    style::JustifyContent::Center => taffy::JustifyContent::Center,
                    style::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
                    style::JustifyContent::SpaceAround => taffy::JustifyContent::SpaceAround,
                    style::JustifyContent::SpaceEvenly => taffy::JustifyContent::SpaceEvenly,
                });
                ts.align_items = Some(match s.align_items {
                    style::AlignItems::Start => taffy::AlignItems::Start,
                    style::AlignItems::End => taffy::AlignItems::End,
                    style::AlignItems::Center => taffy::AlignItems::Center,
                    style::AlignItems::Stretch => taffy::AlignItems::Stretch,
                });
            }
            style::Display::Grid => {
                ts.display = taffy::Display::Grid;
                ts.grid_template_columns = if s.grid_template_columns.is_empty() {
                    vec![taffy::TrackSizingFunction::from_flex(1.0)]
                } else {
                    s.grid_template_columns
                        .iter()
                        .map(|track| match track {
                            style::GridTrack::Px(v) => taffy::TrackSizingFunction::from_length(*v),
                            style::GridTrack::Fr(v) => taffy::TrackSizingFunction::from_flex(*v),
                            style::GridTrack::Auto => taffy::TrackSizingFunction::AUTO,
                        })
                        .collect()
                };
            }
            style::Display::None => {
                ts.display = taffy::Display::None;
            }
            _ => {
                // Block-level boxes stack vertically.
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
            }
        }

        ts.size = Size {
            width: dim_to_taffy(s.width),
            height: dim_to_taffy(s.height),
        };
        // Allow flex/shrink items to compress below their natural content size
        ts.min_size = Size {
            width: if s.flex_shrink > 0.0 || s.flex_grow > 0.0 {
                taffy::Dimension::Length(0.0)
            } else {
                dim_to_taffy(s.min_width)
            },
            height: taffy::Dimension::Auto,
        };
        ts.max_size = Size {
            width: dim_to_taffy(s.max_width),
            height: dim_to_taffy(s.max_height),
        };

        ts.flex_grow = s.flex_grow;
        ts.flex_shrink = s.flex_shrink;

        ts.margin = margin_rect(s);
        ts.padding = Rect {
            top: LengthPercentage::Length(s.padding_top),
            right: LengthPercentage::Length(s.padding_right),
            bottom: LengthPercentage::Length(s.padding_bottom),
            left: LengthPercentage::Length(s.padding_left),
        };
        ts.border = Rect {
            top: LengthPercentage::Length(s.border_width),
            right: LengthPercentage::Length(s.border_width),
            bottom: LengthPercentage::Length(s.border_width),
            left: LengthPercentage::Length(s.border_width),
        };
        ts.gap = Size {
            width: LengthPercentage::Length(s.gap),
            height: LengthPercentage::Length(s.gap),
        };

        ts
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox> {
        let layout = self.taffy.layout(node)?;
        let style = self.node_styles.get(&node).cloned().unwrap_or_default();
        let content = self
            .node_content
            .get(&node)
            .cloned()
            .unwrap_or(BoxContent::None);

        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let children = self
            .taffy
            .children(node)?
            .into_iter()
            .map(|child| self.extract(child, x, y))
            .collect::<Result<Vec<_>>>()?;

        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            style,
            content,
            children,
            repeat_on_break: self.repeat_on_break.contains(&node),
        })
    }
}

fn dim_to_taffy(d: style::Dimension) -> taffy::Dimension {
    match d {
        style::Dimension::Auto => taffy::Dimension::Auto,
        style::Dimension::Px(v) => taffy::Dimension::Length(v),
        style::Dimension::Percent(v) => taffy::Dimension::Percent(v / 100.0),
    }
}

fn margin_rect(s: &ComputedStyle) -> Rect<LengthPercentageAuto> {
    Rect {
        top: LengthPercentageAuto::Length(s.margin_top),
        right: LengthPercentageAuto::Length(s.margin_right),
        bottom: LengthPercentageAuto::Length(s.margin_bottom),
        left: LengthPercentageAuto::Length(s.margin_left),
    }
}

// ---------------------------------------------------------------------------
// Image sizing
// ---------------------------------------------------------------------------

/// Decode a data-URI image and size it: explicit width/height win, a single
/// explicit side keeps the aspect ratio, otherwise the intrinsic size at
/// 1 image pixel = 1 CSS px. `max-width` / `max-height` then scale both
/// sides down together. Percentage heights need a parent with a definite
/// height and are ignored otherwise.
///
/// Returns `None` (and logs a warning) when the image cannot be used.
fn resolve_image_size(
    src: &str,
    style: &ComputedStyle,
    available: f32,
    container_height: Option<f32>,
) -> Option<(f32, f32)> {
    let bytes = match parse_data_uri(src) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("skipping image: {e}");
            return None;
        }
    };
    let img = match ::image::load_from_memory(&bytes) {
        Ok(img) => img,
        Err(e) => {
            log::warn!("skipping image: decode error: {e}");
            return None;
        }
    };
    let intrinsic_w = img.width() as f32 * PX_TO_PT;
    let intrinsic_h = img.height() as f32 * PX_TO_PT;
    if intrinsic_w <= 0.0 || intrinsic_h <= 0.0 {
        return None;
    }
    let aspect = intrinsic_w / intrinsic_h;

    let resolve_height = |d: style::Dimension| match d {
        style::Dimension::Percent(_) => container_height.and_then(|c| d.resolve(c)),
        other => other.resolve(0.0),
    };
    let known_h = resolve_height(style.height);
    let (mut w, mut h) = match (style.width.resolve(available), known_h) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, w / aspect),
        (None, Some(h)) => (h * aspect, h),
        (None, None) => (intrinsic_w, intrinsic_h),
    };

    if let Some(max_w) = style.max_width.resolve(available) {
        if w > max_w && w > 0.0 {
            h *= max_w / w;
            w = max_w;
        }
    }
    if let Some(max_h) = resolve_height(style.max_height) {
        if h > max_h && h > 0.0 {
            w *= max_h / h;
            h = max_h;
        }
    }
    Some((w.max(1.0), h.max(1.0)))
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Lay out the styled document (rooted at `<html>`) on pages of the given
/// geometry. Returned boxes are in document coordinates: x is page-absolute,
/// y runs from the top of the first page's content area.
pub fn compute_layout(
    root: &StyledNode,
    page: &PageGeometry,
    fonts: &FontManager,
) -> Result<Vec<PositionedBox>> {
    let content_width = page.content_width();
    let mut builder = LayoutBuilder::new(fonts);

    let initial = ComputedStyle::default();
    let child_ids: Vec<NodeId> = builder
        .build_node(root, &initial, content_width)?
        .into_iter()
        .collect();

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: taffy::Dimension::Length(content_width),
            height: taffy::Dimension::Auto,
        },
        ..Default::default()
    };
    let root_id = builder.taffy.new_with_children(root_style, &child_ids)?;

    builder.taffy.compute_layout(
        root_id,
        Size {
            width: AvailableSpace::Definite(content_width),
            height: AvailableSpace::MaxContent,
        },
    )?;
    log::debug!("laid out {} boxes", builder.taffy.total_node_count());

    let root_box = builder.extract(root_id, page.margin_left, 0.0)?;
    Ok(root_box.children)
}
