//! Style resolver – cascades stylesheets over the DOM and flattens the result
//! into a [`ComputedStyle`] per element, consumed by the layout engine.
//!
//! Lengths are stored in PDF points; CSS pixels convert at 0.75 pt.

use crate::css::{self, Declaration, Specificity, Stylesheet};
use crate::dom::{Document, DomNode, ElementNode, Tag};

/// One CSS pixel in points.
pub const PX_TO_PT: f32 = 0.75;

/// `medium` font size (16px).
pub const BASE_FONT_SIZE_PT: f32 = 12.0;

/// Font sizes that `em` and `rem` lengths resolve against, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontUnits {
    pub em: f32,
    pub rem: f32,
}

impl Default for FontUnits {
    fn default() -> Self {
        Self {
            em: BASE_FONT_SIZE_PT,
            rem: BASE_FONT_SIZE_PT,
        }
    }
}

/// Defaults applied beneath every author stylesheet.
pub const USER_AGENT_CSS: &str = r#"
html, body, div, p, h1, h2, h3, h4, h5, h6, section, header, footer, article,
main, nav, blockquote, pre, ul, ol, hr, address, figure, form, fieldset, caption {
    display: block;
}
head, title, style, script, meta, link, base, template, [hidden] { display: none; }
li { display: list-item; }
table { display: table; }
thead { display: table-header-group; }
tbody { display: table-row-group; }
tfoot { display: table-footer-group; }
tr { display: table-row; }
td, th { display: table-cell; padding: 1px; vertical-align: middle; }
th { font-weight: bold; text-align: center; }
img { display: inline-block; }
body { margin: 8px; }
p { margin: 1em 0; }
h1 { font-size: 2em; margin: 0.67em 0; font-weight: bold; }
h2 { font-size: 1.5em; margin: 0.83em 0; font-weight: bold; }
h3 { font-size: 1.17em; margin: 1em 0; font-weight: bold; }
h4 { margin: 1.33em 0; font-weight: bold; }
h5 { font-size: 0.83em; margin: 1.67em 0; font-weight: bold; }
h6 { font-size: 0.67em; margin: 2.33em 0; font-weight: bold; }
ul, ol { margin: 1em 0; padding-left: 40px; }
ul { list-style-type: disc; }
ol { list-style-type: decimal; }
blockquote { margin: 1em 40px; }
pre, code { font-family: monospace; }
hr { border: 1px inset gray; margin: 0.5em 0; }
strong, b { font-weight: bold; }
em, i { font-style: italic; }
u, a { text-decoration: underline; }
small { font-size: smaller; }
caption { text-align: center; }
"#;

/// Parse [`USER_AGENT_CSS`].
pub fn user_agent_stylesheet() -> Stylesheet {
    Stylesheet::parse(USER_AGENT_CSS)
}

/// Fully resolved style for a single element.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    // Display / layout
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub flex_wrap: FlexWrap,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,

    // Grid
    pub grid_template_columns: Vec<GridTrack>,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,
    pub min_width: Dimension,
    pub max_width: Dimension,
    pub max_height: Dimension,

    // Spacing (pt)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border
    pub border_width: f32,
    pub border_color: Color,

    // Tables
    pub border_collapse: bool,
    pub table_layout_fixed: bool,
    pub vertical_align: VerticalAlign,

    // Typography
    pub font_size: f32,
    /// Computed font size of the root element, for `rem`.
    pub root_font_size: f32,
    pub font_weight: FontWeight,
    /// Family list in preference order, generic names included.
    pub font_family: Vec<String>,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,
    pub font_style: FontStyle,
    pub break_words: bool,
    pub list_style: ListStyle,

    // Background
    pub background_color: Color,

    // Page break
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Inline,
            flex_direction: FlexDirection::Row,
            flex_wrap: FlexWrap::NoWrap,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            grid_template_columns: Vec::new(),
            width: Dimension::Auto,
            height: Dimension::Auto,
            min_width: Dimension::Auto,
            max_width: Dimension::Auto,
            max_height: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::BLACK,
            border_collapse: false,
            table_layout_fixed: false,
            vertical_align: VerticalAlign::Top,
            font_size: BASE_FONT_SIZE_PT,
            root_font_size: BASE_FONT_SIZE_PT,
            font_weight: FontWeight::Normal,
            font_family: vec!["serif".to_string()],
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.2,
            text_decoration: TextDecoration::None,
            font_style: FontStyle::Normal,
            break_words: false,
            list_style: ListStyle::Disc,
            background_color: Color::TRANSPARENT,
            page_break_before: false,
            page_break_after: false,
            page_break_inside_avoid: false,
        }
    }
}

impl ComputedStyle {
    /// Initial values, with inherited properties taken from `parent`.
    pub fn inherit_from(parent: &ComputedStyle) -> Self {
        Self {
            font_size: parent.font_size,
            root_font_size: parent.root_font_size,
            font_weight: parent.font_weight,
            font_family: parent.font_family.clone(),
            color: parent.color,
            text_align: parent.text_align,
            line_height: parent.line_height,
            text_decoration: parent.text_decoration,
            font_style: parent.font_style,
            break_words: parent.break_words,
            list_style: parent.list_style,
            border_collapse: parent.border_collapse,
            ..Self::default()
        }
    }

    /// Style for an anonymous text run: text properties only, no box.
    pub fn for_text(&self) -> Self {
        Self {
            display: Display::Inline,
            vertical_align: self.vertical_align,
            ..Self::inherit_from(self)
        }
    }

    pub fn font_units(&self) -> FontUnits {
        FontUnits {
            em: self.font_size,
            rem: self.root_font_size,
        }
    }

    pub fn is_bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }

    pub fn is_italic(&self) -> bool {
        self.font_style == FontStyle::Italic
    }

    /// Horizontal border + padding.
    pub fn horizontal_chrome(&self) -> f32 {
        self.padding_left + self.padding_right + 2.0 * self.border_width
    }

    pub fn vertical_chrome(&self) -> f32 {
        self.padding_top + self.padding_bottom + 2.0 * self.border_width
    }

    /// Content-box height when `height` is an explicit length.
    pub fn definite_content_height(&self) -> Option<f32> {
        match self.height {
            Dimension::Px(h) => Some((h - self.vertical_chrome()).max(0.0)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Grid,
    Inline,
    InlineBlock,
    ListItem,
    Table,
    TableRowGroup,
    TableRow,
    TableCell,
    None,
}

impl Display {
    pub fn is_inline_level(&self) -> bool {
        matches!(self, Display::Inline | Display::InlineBlock)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexWrap {
    NoWrap,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAlign {
    Top,
    Middle,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStyle {
    Disc,
    Circle,
    Square,
    Decimal,
    None,
}

impl ListStyle {
    /// Marker text for the `index`-th (1-based) item.
    pub fn marker(&self, index: usize) -> Option<String> {
        match self {
            ListStyle::Disc => Some("\u{2022}".to_string()),
            ListStyle::Circle => Some("o".to_string()),
            ListStyle::Square => Some("-".to_string()),
            ListStyle::Decimal => Some(format!("{index}.")),
            ListStyle::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

impl Dimension {
    /// Resolve against a containing length.
    pub fn resolve(&self, container: f32) -> Option<f32> {
        match self {
            Dimension::Auto => None,
            Dimension::Px(v) => Some(*v),
            Dimension::Percent(p) => Some(container * p / 100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridTrack {
    Px(f32),
    Fr(f32),
    Auto,
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: 1.0,
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        let digits: Vec<u8> = match hex.len() {
            3 => hex
                .chars()
                .map(|c| u8::from_str_radix(&c.to_string().repeat(2), 16).ok())
                .collect::<Option<_>>()?,
            6 => (0..3)
                .map(|i| u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok())
                .collect::<Option<_>>()?,
            _ => return None,
        };
        Some(Self::rgb(digits[0], digits[1], digits[2]))
    }

    /// Parse any supported CSS colour value. `current` answers `currentColor`.
    pub fn from_css(value: &str, current: Color) -> Option<Self> {
        let v = value.trim().to_ascii_lowercase();
        if v.starts_with('#') {
            return Self::from_hex(&v);
        }
        if let Some(args) = v
            .strip_prefix("rgba(")
            .or_else(|| v.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<&str> = args
                .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
                .filter(|p| !p.is_empty())
                .collect();
            if parts.len() < 3 {
                return None;
            }
            let channel = |p: &str| -> Option<f32> {
                match p.strip_suffix('%') {
                    Some(pct) => pct.parse::<f32>().ok().map(|n| n / 100.0),
                    None => p.parse::<f32>().ok().map(|n| n / 255.0),
                }
            };
            let alpha = match parts.get(3) {
                Some(a) => match a.strip_suffix('%') {
                    Some(pct) => pct.parse::<f32>().ok()? / 100.0,
                    None => a.parse::<f32>().ok()?,
                },
                None => 1.0,
            };
            return Some(Self {
                r: channel(parts[0])?.clamp(0.0, 1.0),
                g: channel(parts[1])?.clamp(0.0, 1.0),
                b: channel(parts[2])?.clamp(0.0, 1.0),
                a: alpha.clamp(0.0, 1.0),
            });
        }
        let named = match v.as_str() {
            "transparent" => Self::TRANSPARENT,
            "currentcolor" => current,
            "black" => Self::BLACK,
            "white" => Self::WHITE,
            "red" => Self::rgb(255, 0, 0),
            "green" => Self::rgb(0, 128, 0),
            "blue" => Self::rgb(0, 0, 255),
            "yellow" => Self::rgb(255, 255, 0),
            "orange" => Self::rgb(255, 165, 0),
            "purple" => Self::rgb(128, 0, 128),
            "navy" => Self::rgb(0, 0, 128),
            "maroon" => Self::rgb(128, 0, 0),
            "teal" => Self::rgb(0, 128, 128),
            "silver" => Self::rgb(192, 192, 192),
            "gray" | "grey" => Self::rgb(128, 128, 128),
            "darkgray" | "darkgrey" => Self::rgb(169, 169, 169),
            "lightgray" | "lightgrey" => Self::rgb(211, 211, 211),
            "whitesmoke" => Self::rgb(245, 245, 245),
            _ => return None,
        };
        Some(named)
    }
}

// ---------------------------------------------------------------------------
// Cascade
// ---------------------------------------------------------------------------

/// Where a stylesheet comes from; decides precedence before specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    UserAgent,
    Author,
}

/// Ordered stylesheets plus the rules for ranking their declarations.
pub struct Cascade<'a> {
    sheets: Vec<(Origin, &'a Stylesheet)>,
}

/// (origin/importance rank, inline, specificity, source order)
type CascadeKey = (u8, bool, Specificity, usize);

impl<'a> Cascade<'a> {
    pub fn new(user_agent: &'a Stylesheet) -> Self {
        Self {
            sheets: vec![(Origin::UserAgent, user_agent)],
        }
    }

    /// Append an author sheet; later sheets win ties.
    pub fn add_author(&mut self, sheet: &'a Stylesheet) {
        self.sheets.push((Origin::Author, sheet));
    }

    pub fn sheets(&self) -> impl Iterator<Item = &'a Stylesheet> + '_ {
        self.sheets.iter().map(|(_, s)| *s)
    }

    /// Declarations applying to `element`, lowest precedence first.
    pub fn declarations_for(
        &self,
        element: &ElementNode,
        ancestors: &[&ElementNode],
    ) -> Vec<Declaration> {
        let inline = element
            .inline_style()
            .map(css::parse_declarations)
            .unwrap_or_default();

        let mut entries: Vec<(CascadeKey, &Declaration)> = Vec::new();
        let mut order = 0usize;
        for (origin, sheet) in &self.sheets {
            for rule in &sheet.rules {
                let specificity = rule
                    .selectors
                    .iter()
                    .filter(|sel| sel.matches(element, ancestors))
                    .map(|sel| sel.specificity())
                    .max();
                let Some(specificity) = specificity else {
                    continue;
                };
                for decl in &rule.declarations {
                    entries.push((
                        (rank(*origin, decl.important), false, specificity, order),
                        decl,
                    ));
                    order += 1;
                }
            }
        }
        for decl in &inline {
            entries.push((
                (rank(Origin::Author, decl.important), true, (0, 0, 0), order),
                decl,
            ));
            order += 1;
        }

        entries.sort_by_key(|(key, _)| *key);
        entries.into_iter().map(|(_, decl)| decl.clone()).collect()
    }
}

fn rank(origin: Origin, important: bool) -> u8 {
    match (origin, important) {
        (Origin::UserAgent, false) => 0,
        (Origin::Author, false) => 1,
        (Origin::Author, true) => 2,
        (Origin::UserAgent, true) => 3,
    }
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element, inheriting text properties from its parent.
pub fn resolve_style(
    element: &ElementNode,
    ancestors: &[&ElementNode],
    parent: Option<&ComputedStyle>,
    cascade: &Cascade<'_>,
) -> ComputedStyle {
    let declarations = cascade.declarations_for(element, ancestors);
    let mut style = parent.map(ComputedStyle::inherit_from).unwrap_or_default();
    let parent_units = parent.map_or_else(FontUnits::default, ComputedStyle::font_units);

    // Font size first: `em` in every other property depends on it.
    for decl in declarations.iter().filter(|d| d.property == "font-size") {
        if let Some(size) = parse_font_size(&decl.value, parent_units) {
            style.font_size = size;
        }
    }
    if parent.is_none() {
        style.root_font_size = style.font_size;
    }
    for decl in declarations.iter().filter(|d| d.property != "font-size") {
        apply_css_property(&mut style, &decl.property, &decl.value);
    }
    style
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    let units = s.font_units();
    let raw = val.trim();
    let lower = raw.to_ascii_lowercase();
    let val = lower.as_str();
    match prop {
        "display" => {
            s.display = match val {
                "block" => Display::Block,
                "flex" => Display::Flex,
                "grid" => Display::Grid,
                "inline" => Display::Inline,
                "inline-block" => Display::InlineBlock,
                "list-item" => Display::ListItem,
                "table" | "inline-table" => Display::Table,
                "table-row-group" | "table-header-group" | "table-footer-group" => {
                    Display::TableRowGroup
                }
                "table-row" => Display::TableRow,
                "table-cell" => Display::TableCell,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "flex-direction" => {
            s.flex_direction = match val {
                "row" | "row-reverse" => FlexDirection::Row,
                "column" | "column-reverse" => FlexDirection::Column,
                _ => s.flex_direction,
            }
        }
        "flex-wrap" => {
            s.flex_wrap = match val {
                "wrap" | "wrap-reverse" => FlexWrap::Wrap,
                _ => FlexWrap::NoWrap,
            }
        }
        "flex-grow" => {
            if let Ok(v) = val.parse::<f32>() {
                s.flex_grow = v;
            }
        }
        "flex-shrink" => {
            if let Ok(v) = val.parse::<f32>() {
                s.flex_shrink = v;
            }
        }
        "flex" => match val {
            "none" => {
                s.flex_grow = 0.0;
                s.flex_shrink = 0.0;
            }
            "auto" => {
                s.flex_grow = 1.0;
                s.flex_shrink = 1.0;
            }
            _ => {
                let mut nums = val.split_whitespace().filter_map(|p| p.parse::<f32>().ok());
                if let Some(grow) = nums.next() {
                    s.flex_grow = grow;
                    s.flex_shrink = nums.next().unwrap_or(1.0);
                }
            }
        },
        "justify-content" => {
            s.justify_content = match val {
                "flex-start" | "start" | "left" => JustifyContent::Start,
                "flex-end" | "end" | "right" => JustifyContent::End,
                "center" => JustifyContent::Center,
                "space-between" => JustifyContent::SpaceBetween,
                "space-around" => JustifyContent::SpaceAround,
                "space-evenly" => JustifyContent::SpaceEvenly,
                _ => s.justify_content,
            }
        }
        "align-items" => {
            s.align_items = match val {
                "flex-start" | "start" => AlignItems::Start,
                "flex-end" | "end" => AlignItems::End,
                "center" => AlignItems::Center,
                "stretch" | "normal" => AlignItems::Stretch,
                _ => s.align_items,
            }
        }
        "gap" | "grid-gap" => {
            if let Some(v) = val.split_whitespace().next().and_then(|p| parse_length(p, units)) {
                s.gap = v;
            }
        }
        "grid-template-columns" => {
            if let Some(tracks) = parse_grid_tracks(val, units) {
                s.grid_template_columns = tracks;
            }
        }
        "width" => s.width = parse_dimension(val, units).unwrap_or(s.width),
        "height" => s.height = parse_dimension(val, units).unwrap_or(s.height),
        "min-width" => s.min_width = parse_dimension(val, units).unwrap_or(s.min_width),
        "max-width" => s.max_width = parse_max_dimension(val, units).unwrap_or(s.max_width),
        "max-height" => s.max_height = parse_max_dimension(val, units).unwrap_or(s.max_height),
        "margin" => apply_shorthand_spacing(
            val,
            units,
            [
                &mut s.margin_top,
                &mut s.margin_right,
                &mut s.margin_bottom,
                &mut s.margin_left,
            ],
        ),
        "margin-top" => set_length(&mut s.margin_top, val, units),
        "margin-right" => set_length(&mut s.margin_right, val, units),
        "margin-bottom" => set_length(&mut s.margin_bottom, val, units),
        "margin-left" => set_length(&mut s.margin_left, val, units),
        "padding" => apply_shorthand_spacing(
            val,
            units,
            [
                &mut s.padding_top,
                &mut s.padding_right,
                &mut s.padding_bottom,
                &mut s.padding_left,
            ],
        ),
        "padding-top" => set_length(&mut s.padding_top, val, units),
        "padding-right" => set_length(&mut s.padding_right, val, units),
        "padding-bottom" => set_length(&mut s.padding_bottom, val, units),
        "padding-left" => set_length(&mut s.padding_left, val, units),
        "border" => apply_border_shorthand(s, val),
        "border-width" => {
            if let Some(w) = val.split_whitespace().next().and_then(|p| parse_border_width(p, units)) {
                s.border_width = w;
            }
        }
        "border-style" => {
            if matches!(val.split_whitespace().next(), Some("none" | "hidden")) {
                s.border_width = 0.0;
            }
        }
        "border-color" => {
            if let Some(c) = val
                .split_whitespace()
                .next()
                .and_then(|p| Color::from_css(p, s.color))
            {
                s.border_color = c;
            }
        }
        "border-collapse" => s.border_collapse = val == "collapse",
        "table-layout" => s.table_layout_fixed = val == "fixed",
        "vertical-align" => {
            s.vertical_align = match val {
                "middle" => VerticalAlign::Middle,
                "bottom" | "text-bottom" => VerticalAlign::Bottom,
                "top" | "text-top" | "baseline" => VerticalAlign::Top,
                _ => s.vertical_align,
            }
        }
        "word-wrap" | "overflow-wrap" => s.break_words = matches!(val, "break-word" | "anywhere"),
        "word-break" => s.break_words = matches!(val, "break-all" | "break-word"),
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                "normal" | "lighter" | "100" | "200" | "300" | "400" | "500" => FontWeight::Normal,
                _ => s.font_weight,
            }
        }
        "font-style" => {
            s.font_style = match val {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "font-family" => {
            let families = parse_font_family(raw);
            if !families.is_empty() {
                s.font_family = families;
            }
        }
        "color" => {
            if let Some(c) = Color::from_css(val, s.color) {
                s.color = c;
            }
        }
        "background-color" => {
            if let Some(c) = Color::from_css(val, s.color) {
                s.background_color = c;
            }
        }
        "background" => {
            if let Some(c) = val
                .split_whitespace()
                .find_map(|p| Color::from_css(p, s.color))
            {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" | "end" => TextAlign::Right,
                "left" | "start" | "justify" => TextAlign::Left,
                _ => s.text_align,
            }
        }
        "line-height" => {
            if val == "normal" {
                s.line_height = 1.2;
            } else if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(pct) = val.strip_suffix('%').and_then(|p| p.parse::<f32>().ok()) {
                s.line_height = pct / 100.0;
            } else if let Some(len) = parse_length(val, units) {
                if s.font_size > 0.0 {
                    s.line_height = len / s.font_size;
                }
            }
        }
        "text-decoration" | "text-decoration-line" => {
            if val.split_whitespace().any(|p| p == "underline") {
                s.text_decoration = TextDecoration::Underline;
            } else if val.starts_with("none") {
                s.text_decoration = TextDecoration::None;
            }
        }
        "list-style-type" | "list-style" => {
            for part in val.split_whitespace() {
                s.list_style = match part {
                    "disc" => ListStyle::Disc,
                    "circle" => ListStyle::Circle,
                    "square" => ListStyle::Square,
                    "decimal" => ListStyle::Decimal,
                    "none" => ListStyle::None,
                    _ => continue,
                };
            }
        }
        "break-before" | "page-break-before" => {
            s.page_break_before = matches!(val, "always" | "page" | "left" | "right");
        }
        "break-after" | "page-break-after" => {
            s.page_break_after = matches!(val, "always" | "page" | "left" | "right");
        }
        "break-inside" | "page-break-inside" => {
            s.page_break_inside_avoid = matches!(val, "avoid" | "avoid-page");
        }
        _ => {}
    }
}

fn set_length(target: &mut f32, val: &str, units: FontUnits) {
    if let Some(v) = parse_length(val, units) {
        *target = v;
    } else if val == "auto" {
        *target = 0.0;
    }
}

/// Parse a CSS length into points. Unitless numbers are read as pixels.
pub fn parse_length(val: &str, units: FontUnits) -> Option<f32> {
    let val = val.trim();
    let split = val
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+')))
        .unwrap_or(val.len());
    let number: f32 = val[..split].parse().ok()?;
    let factor = match &val[split..] {
        "px" | "" => PX_TO_PT,
        "pt" => 1.0,
        "em" => units.em,
        "rem" => units.rem,
        "mm" => 72.0 / 25.4,
        "cm" => 72.0 / 2.54,
        "in" => 72.0,
        "pc" => 12.0,
        _ => return None,
    };
    Some(number * factor)
}

fn parse_dimension(val: &str, units: FontUnits) -> Option<Dimension> {
    if val == "auto" {
        Some(Dimension::Auto)
    } else if let Some(pct) = val.strip_suffix('%') {
        pct.trim().parse::<f32>().ok().map(Dimension::Percent)
    } else {
        parse_length(val, units).map(Dimension::Px)
    }
}

fn parse_max_dimension(val: &str, units: FontUnits) -> Option<Dimension> {
    if val == "none" {
        Some(Dimension::Auto)
    } else {
        parse_dimension(val, units)
    }
}

fn parse_font_size(val: &str, parent: FontUnits) -> Option<f32> {
    let val = val.trim().to_ascii_lowercase();
    let keyword = match val.as_str() {
        "xx-small" => Some(BASE_FONT_SIZE_PT * 0.6),
        "x-small" => Some(BASE_FONT_SIZE_PT * 0.75),
        "small" => Some(BASE_FONT_SIZE_PT * 0.89),
        "medium" => Some(BASE_FONT_SIZE_PT),
        "large" => Some(BASE_FONT_SIZE_PT * 1.2),
        "x-large" => Some(BASE_FONT_SIZE_PT * 1.5),
        "xx-large" => Some(BASE_FONT_SIZE_PT * 2.0),
        "smaller" => Some(parent.em * 0.83),
        "larger" => Some(parent.em * 1.2),
        _ => None,
    };
    if keyword.is_some() {
        return keyword;
    }
    if let Some(pct) = val.strip_suffix('%') {
        return pct.trim().parse::<f32>().ok().map(|p| parent.em * p / 100.0);
    }
    // `em` in font-size refers to the parent's size.
    parse_length(&val, parent).filter(|v| *v >= 0.0)
}

fn parse_border_width(val: &str, units: FontUnits) -> Option<f32> {
    match val {
        "thin" => Some(1.0 * PX_TO_PT),
        "medium" => Some(3.0 * PX_TO_PT),
        "thick" => Some(5.0 * PX_TO_PT),
        _ => parse_length(val, units).filter(|v| *v >= 0.0),
    }
}

/// `border: <width> <style> <color>` in any order.
fn apply_border_shorthand(s: &mut ComputedStyle, val: &str) {
    let mut width = None;
    let mut visible = false;
    let mut color = None;
    for part in val.split_whitespace() {
        match part {
            "none" | "hidden" => visible = false,
            "solid" | "dashed" | "dotted" | "double" | "groove" | "ridge" | "inset"
            | "outset" => visible = true,
            _ => {
                if let Some(w) = parse_border_width(part, s.font_units()) {
                    width = Some(w);
                } else if let Some(c) = Color::from_css(part, s.color) {
                    color = Some(c);
                }
            }
        }
    }
    s.border_width = if visible {
        width.unwrap_or(3.0 * PX_TO_PT)
    } else {
        0.0
    };
    s.border_color = color.unwrap_or(s.color);
}

fn apply_shorthand_spacing(val: &str, units: FontUnits, sides: [&mut f32; 4]) {
    let parts: Vec<f32> = val
        .split_whitespace()
        .map(|p| if p == "auto" { Some(0.0) } else { parse_length(p, units) })
        .collect::<Option<_>>()
        .unwrap_or_default();
    // top, right, bottom, left
    let values = match parts.as_slice() {
        [all] => [*all; 4],
        [vertical, horizontal] => [*vertical, *horizontal, *vertical, *horizontal],
        [top, horizontal, bottom] => [*top, *horizontal, *bottom, *horizontal],
        [top, right, bottom, left] => [*top, *right, *bottom, *left],
        _ => return,
    };
    for (side, value) in sides.into_iter().zip(values) {
        *side = value;
    }
}

fn parse_font_family(val: &str) -> Vec<String> {
    val.split(',')
        .map(|f| css::unquote(f).trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

fn parse_grid_tracks(val: &str, units: FontUnits) -> Option<Vec<GridTrack>> {
    if val == "none" {
        return Some(Vec::new());
    }
    if let Some(inner) = val.strip_prefix("repeat(").and_then(|r| r.strip_suffix(')')) {
        let (count, track) = inner.split_once(',')?;
        let count: usize = count.trim().parse().ok()?;
        let track = parse_grid_track(track.trim(), units)?;
        return Some(vec![track; count]);
    }
    val.split_whitespace()
        .map(|t| parse_grid_track(t, units))
        .collect()
}

fn parse_grid_track(track: &str, units: FontUnits) -> Option<GridTrack> {
    if track == "auto" {
        Some(GridTrack::Auto)
    } else if let Some(fr) = track.strip_suffix("fr") {
        fr.parse().ok().map(GridTrack::Fr)
    } else {
        parse_length(track, units).map(GridTrack::Px)
    }
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Element attributes (image `src`, `colspan`)
        attrs: std::collections::HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

impl StyledNode {
    pub fn style(&self) -> &ComputedStyle {
        match self {
            StyledNode::Element { style, .. } | StyledNode::Text { style, .. } => style,
        }
    }
}

/// Build the styled tree for a whole document, rooted at `<html>`.
///
/// Elements computing to `display: none` are dropped along with their
/// subtree: they generate no boxes at all.
pub fn build_styled_tree(document: &Document, cascade: &Cascade<'_>) -> Option<StyledNode> {
    let mut ancestors = Vec::new();
    style_element(&document.root, &mut ancestors, None, cascade)
}

fn style_element<'a>(
    element: &'a ElementNode,
    ancestors: &mut Vec<&'a ElementNode>,
    parent_style: Option<&ComputedStyle>,
    cascade: &Cascade<'_>,
) -> Option<StyledNode> {
    let style = resolve_style(element, ancestors, parent_style, cascade);
    if style.display == Display::None {
        return None;
    }

    ancestors.push(element);
    let mut children = Vec::new();
    for child in &element.children {
        match child {
            DomNode::Element(e) => {
                if let Some(node) = style_element(e, ancestors, Some(&style), cascade) {
                    children.push(node);
                }
            }
            DomNode::Text(text) => children.push(StyledNode::Text {
                text: text.clone(),
                style: style.for_text(),
            }),
        }
    }
    ancestors.pop();

    Some(StyledNode::Element {
        tag: element.tag.clone(),
        style,
        children,
        attrs: element.attributes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn styled(html: &str, author_css: &str) -> StyledNode {
        let doc = Document::parse(html).unwrap();
        let ua = user_agent_stylesheet();
        let author = Stylesheet::parse(author_css);
        let mut cascade = Cascade::new(&ua);
        cascade.add_author(&author);
        build_styled_tree(&doc, &cascade).unwrap()
    }

    /// Depth-first search for the first element with `tag`.
    fn find<'a>(node: &'a StyledNode, tag: &Tag) -> Option<&'a StyledNode> {
        match node {
            StyledNode::Element { tag: t, children, .. } => {
                if t == tag {
                    return Some(node);
                }
                children.iter().find_map(|c| find(c, tag))
            }
            StyledNode::Text { .. } => None,
        }
    }

    #[test]
    fn inline_style_font_size() {
        let root = styled(r#"<p style="font-size: 24px; color: #ff0000">x</p>"#, "");
        let p = find(&root, &Tag::P).unwrap().style();
        assert_eq!(p.font_size, 18.0);
        assert!((p.color.r - 1.0).abs() < 0.01);
    }

    #[test]
    fn color_from_hex() {
        let c = Color::from_hex("#ff8800").unwrap();
        assert!((c.r - 1.0).abs() < 0.01);
        assert!((c.g - 0.533).abs() < 0.01);
        assert_eq!(Color::from_hex("#ccc"), Some(Color::rgb(204, 204, 204)));
        let rgba = Color::from_css("rgba(0, 0, 0, 0.5)", Color::BLACK).unwrap();
        assert!((rgba.a - 0.5).abs() < 0.001);
    }

    #[test]
    fn heading_size_is_relative_to_parent() {
        let root = styled("<h1>Title</h1>", "body { font-size: 10px }");
        let h1 = find(&root, &Tag::H1).unwrap().style();
        // 2em of 7.5pt
        assert!((h1.font_size - 15.0).abs() < 0.01);
        assert!(h1.is_bold());
    }

    #[test]
    fn important_beats_inline_and_hides_subtree() {
        let root = styled(
            r#"<div data-print-hide="true" style="display: block"><p>secret</p></div><p>shown</p>"#,
            "[data-print-hide='true'] { display: none !important; }",
        );
        let body = find(&root, &Tag::Body).unwrap();
        let StyledNode::Element { children, .. } = body else {
            panic!("Expected body element");
        };
        assert_eq!(children.len(), 1);
        assert!(find(&root, &Tag::Div).is_none());
    }

    #[test]
    fn specificity_orders_rules() {
        let root = styled(
            r#"<table><tr class="divisoria-row"><td>x</td></tr></table>"#,
            ".divisoria-row td { background-color: #e9e9e9 } td { background-color: #ffffff }",
        );
        let td = find(&root, &Tag::Td).unwrap().style();
        assert_eq!(td.background_color, Color::rgb(0xe9, 0xe9, 0xe9));
    }

    #[test]
    fn later_sheet_wins_on_equal_specificity() {
        let doc = Document::parse("<html><head><style>p { color: red }</style></head><body><p>x</p></body></html>").unwrap();
        let ua = user_agent_stylesheet();
        let embedded = Stylesheet::parse(&doc.embedded_styles()[0].css);
        let supplied = Stylesheet::parse("p { color: blue }");
        let mut cascade = Cascade::new(&ua);
        cascade.add_author(&embedded);
        cascade.add_author(&supplied);
        let root = build_styled_tree(&doc, &cascade).unwrap();
        let p = find(&root, &Tag::P).unwrap().style();
        assert_eq!(p.color, Color::rgb(0, 0, 255));
    }

    #[test]
    fn border_shorthand_and_spacing() {
        let root = styled(
            "<table><tr><td>x</td></tr></table>",
            "td { border: 1px solid #ccc; padding: 6px; margin: 3px 0 }",
        );
        let td = find(&root, &Tag::Td).unwrap().style();
        assert_eq!(td.border_width, 0.75);
        assert_eq!(td.border_color, Color::rgb(204, 204, 204));
        assert_eq!(td.padding_left, 4.5);
        assert_eq!(td.margin_top, 2.25);
        assert_eq!(td.margin_left, 0.0);
        assert_eq!(td.display, Display::TableCell);
    }

    #[test]
    fn font_family_list_is_inherited() {
        let root = styled(
            "<p>x</p>",
            "body { font-family: 'Noto Sans CJK', 'WenQuanYi Zen Hei', sans-serif; }",
        );
        let p = find(&root, &Tag::P).unwrap().style();
        assert_eq!(
            p.font_family,
            vec!["Noto Sans CJK", "WenQuanYi Zen Hei", "sans-serif"]
        );
    }

    #[test]
    fn lengths_convert_to_points() {
        let units = FontUnits { em: 10.0, rem: 12.0 };
        assert_eq!(parse_length("20px", units), Some(15.0));
        assert_eq!(parse_length("2em", units), Some(20.0));
        assert_eq!(parse_length("2rem", units), Some(24.0));
        assert_eq!(parse_length("1in", units), Some(72.0));
        assert_eq!(parse_length("0", units), Some(0.0));
        assert_eq!(parse_length("wide", units), None);
    }

    #[test]
    fn rem_follows_the_root_font_size() {
        let root = styled(
            "<p>x</p>",
            "html { font-size: 20px } body { font-size: 10px } p { padding-left: 2rem; margin-left: 2em }",
        );
        let p = find(&root, &Tag::P).unwrap().style();
        // 2 × 15pt root, 2 × 7.5pt parent
        assert_eq!(p.padding_left, 30.0);
        assert_eq!(p.margin_left, 15.0);
        assert_eq!(p.root_font_size, 15.0);
    }

    #[test]
    fn font_family_keeps_case_while_keywords_do_not_care() {
        let root = styled(
            "<p>x</p>",
            "p { font-family: \"DejaVu Sans\", Serif; FONT-WEIGHT: BOLD; text-align: CENTER }",
        );
        let p = find(&root, &Tag::P).unwrap().style();
        assert_eq!(p.font_family, vec!["DejaVu Sans", "Serif"]);
        assert!(p.is_bold());
        assert_eq!(p.text_align, TextAlign::Center);
    }

    #[test]
    fn head_content_is_not_styled_into_boxes() {
        let root = styled("<title>T</title><p>x</p>", "");
        assert!(find(&root, &Tag::Head).is_none());
        assert!(find(&root, &Tag::P).is_some());
    }
}
