//! Stylesheet parser – turns CSS text into rules the cascade can match.
//!
//! Supported: style rules with selector lists, `!important`, `@font-face`,
//! `@page`, and `@media` blocks (kept when they target print). Selectors may
//! use type, universal, id, class and attribute components joined by
//! descendant or child combinators. A selector outside that subset drops its
//! whole rule, as CSS requires.

use crate::dom::ElementNode;

/// A parsed stylesheet together with the text it came from.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    source: String,
    pub rules: Vec<StyleRule>,
    pub font_faces: Vec<FontFace>,
    pub page_rules: Vec<Vec<Declaration>>,
}

/// `selector, selector { declarations }`
#[derive(Debug, Clone)]
pub struct StyleRule {
    pub selectors: Vec<Selector>,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

/// An `@font-face` rule reduced to what font loading needs.
#[derive(Debug, Clone, PartialEq)]
pub struct FontFace {
    pub family: String,
    /// Local path from the first `url()` source.
    pub src: Option<String>,
    pub bold: bool,
    pub italic: bool,
}

impl Stylesheet {
    /// Parse CSS text. Malformed parts are skipped; parsing never fails.
    pub fn parse(css: &str) -> Self {
        let mut sheet = Stylesheet {
            source: css.to_string(),
            ..Default::default()
        };
        let cleaned = strip_comments(css);
        parse_block_contents(&cleaned, &mut sheet);
        log::debug!(
            "parsed stylesheet: {} rules, {} font faces, {} page rules",
            sheet.rules.len(),
            sheet.font_faces.len(),
            sheet.page_rules.len()
        );
        sheet
    }

    /// The CSS text this sheet was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Whether a media query list applies to printed output.
///
/// Media features are not evaluated: a query matches when its media type
/// does, and a query without a type targets `all`.
pub fn media_matches_print(media: &str) -> bool {
    let media = media.trim();
    media.is_empty() || media.split(',').any(query_matches_print)
}

fn query_matches_print(query: &str) -> bool {
    let query = query.trim().to_ascii_lowercase();
    let mut words = query.split_whitespace().peekable();
    let negated = match words.peek() {
        Some(&"not") => {
            words.next();
            true
        }
        Some(&"only") => {
            words.next();
            false
        }
        _ => false,
    };
    let type_matches = match words.next() {
        None => true,
        Some(word) if word.starts_with('(') => true,
        Some(media_type) => matches!(media_type, "print" | "all"),
    };
    type_matches != negated
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse a run of rules and at-rules into `sheet`.
fn parse_block_contents(css: &str, sheet: &mut Stylesheet) {
    let mut rest = css;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if let Some(at) = rest.strip_prefix('@') {
            rest = parse_at_rule(at, sheet);
            continue;
        }
        let Some(open) = find_unquoted(rest, '{') else {
            break;
        };
        let prelude = &rest[..open];
        let (body, after) = split_block(&rest[open + 1..]);
        if let Some(selectors) = parse_selector_list(prelude) {
            sheet.rules.push(StyleRule {
                selectors,
                declarations: parse_declarations(body),
            });
        }
        rest = after;
    }
}

/// Parse one at-rule (text after the `@`), returning the remaining input.
fn parse_at_rule<'a>(at: &'a str, sheet: &mut Stylesheet) -> &'a str {
    let name_end = at
        .find(|c: char| !(c.is_alphanumeric() || c == '-'))
        .unwrap_or(at.len());
    let name = at[..name_end].to_ascii_lowercase();
    let rest = &at[name_end..];

    let semi = find_unquoted(rest, ';');
    let brace = find_unquoted(rest, '{');
    let open = match (semi, brace) {
        // Statement at-rule such as `@import` or `@charset`
        (Some(s), Some(b)) if s < b => return &rest[s + 1..],
        (Some(s), None) => return &rest[s + 1..],
        (_, Some(b)) => b,
        (None, None) => return "",
    };
    let prelude = rest[..open].trim();
    let (body, after) = split_block(&rest[open + 1..]);

    match name.as_str() {
        "font-face" => {
            if let Some(face) = parse_font_face(&parse_declarations(body)) {
                sheet.font_faces.push(face);
            }
        }
        "page" => sheet.page_rules.push(parse_declarations(body)),
        "media" => {
            if media_matches_print(prelude) {
                parse_block_contents(body, sheet);
            }
        }
        other => log::debug!("skipping unsupported @{other} rule"),
    }
    after
}

/// Split `body}rest` at the brace closing the block, honouring nesting.
fn split_block(input: &str) -> (&str, &str) {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '{' => depth += 1,
                '}' if depth == 0 => return (&input[..i], &input[i + 1..]),
                '}' => depth -= 1,
                _ => {}
            },
        }
    }
    (input, "")
}

fn find_unquoted(input: &str, target: char) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut parens = 0usize;
    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' => parens += 1,
                ')' => parens = parens.saturating_sub(1),
                c if c == target && parens == 0 => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// Parse `prop: value; prop: value !important` (also used for `style=""`).
pub fn parse_declarations(block: &str) -> Vec<Declaration> {
    let mut out = Vec::new();
    let mut rest = block;
    while !rest.trim().is_empty() {
        let end = find_unquoted(rest, ';').unwrap_or(rest.len());
        let decl = rest[..end].trim();
        rest = rest.get(end + 1..).unwrap_or("");

        let Some(colon) = decl.find(':') else {
            continue;
        };
        let property = decl[..colon].trim().to_ascii_lowercase();
        let mut value = decl[colon + 1..].trim();
        let mut important = false;
        if let Some(bang) = value.rfind('!') {
            if value[bang + 1..].trim().eq_ignore_ascii_case("important") {
                important = true;
                value = value[..bang].trim_end();
            }
        }
        if property.is_empty() || value.is_empty() {
            continue;
        }
        out.push(Declaration {
            property,
            value: value.to_string(),
            important,
        });
    }
    out
}

fn parse_font_face(decls: &[Declaration]) -> Option<FontFace> {
    let mut face = FontFace {
        family: String::new(),
        src: None,
        bold: false,
        italic: false,
    };
    for decl in decls {
        match decl.property.as_str() {
            "font-family" => face.family = unquote(&decl.value).to_string(),
            "src" => face.src = extract_url(&decl.value),
            "font-weight" => {
                face.bold = matches!(decl.value.trim(), "bold" | "bolder" | "600" | "700" | "800" | "900")
            }
            "font-style" => {
                face.italic = matches!(decl.value.trim(), "italic" | "oblique")
            }
            _ => {}
        }
    }
    (!face.family.is_empty()).then_some(face)
}

/// First non-data `url(...)` in a `src` descriptor.
fn extract_url(value: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();
    let mut search_from = 0usize;
    while let Some(idx) = lower[search_from..].find("url(") {
        let start = search_from + idx + 4;
        let end = start + value[start..].find(')')?;
        let raw = unquote(value[start..end].trim());
        if !raw.is_empty() && !raw.starts_with("data:") {
            return Some(raw.strip_prefix("file://").unwrap_or(raw).to_string());
        }
        search_from = end + 1;
    }
    None
}

/// Strip one layer of matching single or double quotes.
pub fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

/// `(ids, classes + attributes, types)`; compared lexicographically.
pub type Specificity = (u32, u32, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrOp {
    Exists,
    Equals(String),
    Includes(String),
    DashMatch(String),
    Prefix(String),
    Suffix(String),
    Substring(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttrSelector {
    pub name: String,
    pub op: AttrOp,
}

/// One compound selector such as `td.total[data-x='1']`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrSelector>,
}

/// A complex selector: compounds joined by combinators, left to right. The
/// combinator stored with a compound links it to the compound before it.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    parts: Vec<(Combinator, Compound)>,
}

impl Selector {
    pub fn specificity(&self) -> Specificity {
        self.parts.iter().fold((0, 0, 0), |(a, b, c), (_, part)| {
            (
                a + part.id.is_some() as u32,
                b + (part.classes.len() + part.attrs.len()) as u32,
                c + part.tag.is_some() as u32,
            )
        })
    }

    /// Match against `element`, whose ancestors are listed root first.
    pub fn matches(&self, element: &ElementNode, ancestors: &[&ElementNode]) -> bool {
        !self.parts.is_empty() && self.matches_at(self.parts.len() - 1, element, ancestors)
    }

    fn matches_at(&self, idx: usize, element: &ElementNode, ancestors: &[&ElementNode]) -> bool {
        let (combinator, compound) = &self.parts[idx];
        if !compound.matches(element) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => match ancestors.split_last() {
                Some((parent, up)) => self.matches_at(idx - 1, parent, up),
                None => false,
            },
            Combinator::Descendant => {
                let mut rest = ancestors;
                while let Some((ancestor, up)) = rest.split_last() {
                    if self.matches_at(idx - 1, ancestor, up) {
                        return true;
                    }
                    rest = up;
                }
                false
            }
        }
    }
}

impl Compound {
    fn matches(&self, element: &ElementNode) -> bool {
        if let Some(tag) = &self.tag {
            if tag != element.tag.name() {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes = element.classes();
            if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }
        self.attrs.iter().all(|sel| {
            let Some(value) = element.attr(&sel.name) else {
                return false;
            };
            match &sel.op {
                AttrOp::Exists => true,
                AttrOp::Equals(v) => value == v,
                AttrOp::Includes(v) => value.split_whitespace().any(|w| w == v),
                AttrOp::DashMatch(v) => value == v || value.starts_with(&format!("{v}-")),
                AttrOp::Prefix(v) => !v.is_empty() && value.starts_with(v.as_str()),
                AttrOp::Suffix(v) => !v.is_empty() && value.ends_with(v.as_str()),
                AttrOp::Substring(v) => !v.is_empty() && value.contains(v.as_str()),
            }
        })
    }
}

/// Parse `a, b > c` into selectors; `None` when any member is unsupported.
pub fn parse_selector_list(prelude: &str) -> Option<Vec<Selector>> {
    let mut out = Vec::new();
    for part in split_top_level_commas(prelude) {
        out.push(parse_selector(part.trim())?);
    }
    (!out.is_empty()).then_some(out)
}

fn split_top_level_commas(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = input;
    while let Some(i) = find_unquoted(rest, ',') {
        parts.push(&rest[..i]);
        rest = &rest[i + 1..];
    }
    parts.push(rest);
    parts
}

fn parse_selector(input: &str) -> Option<Selector> {
    let mut parts = Vec::new();
    let mut combinator = Combinator::Descendant;
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('>') {
            if parts.is_empty() {
                return None;
            }
            combinator = Combinator::Child;
            rest = after.trim_start();
            continue;
        }
        if rest.starts_with(['+', '~']) {
            // Sibling combinators are outside the supported subset.
            return None;
        }
        let end = compound_end(rest);
        parts.push((combinator, parse_compound(&rest[..end])?));
        combinator = Combinator::Descendant;
        rest = rest[end..].trim_start();
    }
    if parts.is_empty() || combinator == Combinator::Child {
        return None;
    }
    Some(Selector { parts })
}

/// Byte length of the compound selector at the start of `input`.
fn compound_end(input: &str) -> usize {
    let mut in_brackets = false;
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' if in_brackets => quote = Some(c),
                '[' => in_brackets = true,
                ']' => in_brackets = false,
                c if !in_brackets && (c.is_whitespace() || matches!(c, '>' | '+' | '~')) => {
                    return i
                }
                _ => {}
            },
        }
    }
    input.len()
}

fn parse_compound(input: &str) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut rest = input;

    let ident_len = |s: &str| {
        s.find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(s.len())
    };

    if let Some(after) = rest.strip_prefix('*') {
        rest = after;
    } else {
        let n = ident_len(rest);
        if n > 0 {
            compound.tag = Some(rest[..n].to_ascii_lowercase());
            rest = &rest[n..];
        }
    }

    while let Some(c) = rest.chars().next() {
        match c {
            '.' => {
                let n = ident_len(&rest[1..]);
                if n == 0 {
                    return None;
                }
                compound.classes.push(rest[1..1 + n].to_string());
                rest = &rest[1 + n..];
            }
            '#' => {
                let n = ident_len(&rest[1..]);
                if n == 0 {
                    return None;
                }
                compound.id = Some(rest[1..1 + n].to_string());
                rest = &rest[1 + n..];
            }
            '[' => {
                let close = find_unquoted(rest, ']')?;
                compound.attrs.push(parse_attr_selector(&rest[1..close])?);
                rest = &rest[close + 1..];
            }
            // Pseudo-classes and pseudo-elements
            _ => return None,
        }
    }
    Some(compound)
}

fn parse_attr_selector(inner: &str) -> Option<AttrSelector> {
    let inner = inner.trim();
    let Some(eq) = inner.find('=') else {
        let name = inner.to_ascii_lowercase();
        return (!name.is_empty()).then_some(AttrSelector {
            name,
            op: AttrOp::Exists,
        });
    };
    let (name_part, modifier) = match inner[..eq].chars().last() {
        Some(m @ ('~' | '|' | '^' | '$' | '*')) => (&inner[..eq - 1], Some(m)),
        _ => (&inner[..eq], None),
    };
    let name = name_part.trim().to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    let value = unquote(inner[eq + 1..].trim()).to_string();
    let op = match modifier {
        None => AttrOp::Equals(value),
        Some('~') => AttrOp::Includes(value),
        Some('|') => AttrOp::DashMatch(value),
        Some('^') => AttrOp::Prefix(value),
        Some('$') => AttrOp::Suffix(value),
        Some(_) => AttrOp::Substring(value),
    };
    Some(AttrSelector { name, op })
}
