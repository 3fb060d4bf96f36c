//! Wikitext → typed record extraction.
//!
//! Pages are classified by marker (category links and infobox templates),
//! then the infobox region is cut into `label = value` / `label: value`
//! segments. Labels resolve through [`Field::from_label`]; values are
//! stripped of wiki markup and typed with [`Field::parse_value`].
//!
//! Extraction never fails: a page that is not recognised, or that yields no
//! name, simply produces no record.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::entity::{AttributeValue, EntityRecord};
use crate::models::RawPage;
use crate::schema::{EntityKind, Field};

struct KindMarkers {
    kind: EntityKind,
    template: Regex,
    category: Regex,
}

impl KindMarkers {
    fn new(kind: EntityKind, templates: &str, categories: &str) -> Self {
        let template =
            Regex::new(&format!(r"(?i)\{{\{{\s*(?:{templates})\s*(?:\||\}}\}}|\n|$)"))
                .expect("valid template marker");
        let category =
            Regex::new(&format!(r"(?i)\[\[\s*category\s*:\s*(?:{categories})\s*(?:\||\]\])"))
                .expect("valid category marker");
        Self {
            kind,
            template,
            category,
        }
    }
}

/// Markers in classification priority order.
static MARKERS: LazyLock<Vec<KindMarkers>> = LazyLock::new(|| {
    EntityKind::PRIORITY
        .iter()
        .map(|&kind| match kind {
            EntityKind::Pet => KindMarkers::new(kind, "pet|follower pet", "pets"),
            EntityKind::Thrall => KindMarkers::new(kind, "thrall", "thralls"),
            EntityKind::Creature => KindMarkers::new(kind, "creature|animal", "creatures|animals"),
            EntityKind::Npc => KindMarkers::new(kind, "npc", "npcs"),
        })
        .collect()
});

static RE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?(?:-->|$)").expect("valid regex"));
static RE_PAGENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\{\{\s*PAGENAME\s*\}\}").expect("valid regex"));
static RE_ITEMLINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\{\{\s*ItemLink\s*\|([^|{}]*)(?:\|[^{}]*)?\}\}").expect("valid regex")
});
static RE_WIKILINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\[\]]*)\]\]").expect("valid regex"));
static RE_HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("valid regex"));
static RE_QUOTES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'{2,}").expect("valid regex"));
static RE_BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}|\[\[|\]\]").expect("valid regex"));
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static RE_NOTES_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*==+\s*notes\s*==+\s*$").expect("valid regex"));

/// Wiki boilerplate left in unfilled Notes sections.
const NOTES_PLACEHOLDER: &str = "any particular data";

/// Stateless wikitext extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct Extractor;

impl Extractor {
    /// Parse one raw page into at most one record.
    pub fn extract(page: &RawPage) -> Option<EntityRecord> {
        let text = RE_COMMENT.replace_all(&page.text, "");
        let (kind, region_start) = classify(&text)?;
        let region = &text[region_start..];

        let mut name = None;
        let mut attributes = BTreeMap::new();
        for segment in segments(region) {
            let Some((label, raw)) = split_field(segment) else {
                continue;
            };
            let Some(field) = Field::from_label(label) else {
                continue;
            };
            if !kind.has_field(field) {
                continue;
            }
            if field == Field::Name {
                if name.is_none() {
                    name = clean_value(raw, &page.title);
                }
                continue;
            }
            if attributes.contains_key(&field) {
                continue;
            }
            if let Some(value) = clean_value(raw, &page.title) {
                attributes.insert(field, field.parse_value(&value));
            }
        }

        if !attributes.contains_key(&Field::Notes) {
            if let Some(notes) = notes_section(&page.text, &page.title) {
                attributes.insert(Field::Notes, AttributeValue::Text(notes));
            }
        }

        let name = name.or_else(|| {
            let title = page.title.trim();
            (!title.is_empty()).then(|| title.to_string())
        })?;

        Some(EntityRecord {
            kind,
            name,
            attributes,
            source: page.into(),
        })
    }

    /// Kind of entity a page describes, if any.
    pub fn classify(text: &str) -> Option<EntityKind> {
        classify(&RE_COMMENT.replace_all(text, "")).map(|(kind, _)| kind)
    }
}

/// Winning kind plus the byte offset its field region starts at.
fn classify(text: &str) -> Option<(EntityKind, usize)> {
    MARKERS.iter().find_map(|markers| {
        if let Some(m) = markers.template.find(text) {
            Some((markers.kind, m.start()))
        } else if markers.category.is_match(text) {
            Some((markers.kind, 0))
        } else {
            None
        }
    })
}

/// Cut a region into candidate field segments.
///
/// Segments end at newlines and at `|` separators that belong to the
/// outermost template (not inside a link or a nested template).
fn segments(region: &str) -> Vec<&str> {
    let bytes = region.as_bytes();
    let mut out = Vec::new();
    let (mut links, mut templates) = (0usize, 0usize);
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let pair = bytes.get(i + 1).copied();
        match (bytes[i], pair) {
            (b'[', Some(b'[')) => {
                links += 1;
                i += 2;
                continue;
            }
            (b']', Some(b']')) => {
                links = links.saturating_sub(1);
                i += 2;
                continue;
            }
            (b'{', Some(b'{')) => {
                templates += 1;
                i += 2;
                continue;
            }
            (b'}', Some(b'}')) => {
                templates = templates.saturating_sub(1);
                i += 2;
                continue;
            }
            (b'\n', _) => {
                out.push(&region[start..i]);
                start = i + 1;
                links = 0;
            }
            (b'|', _) if links == 0 && templates <= 1 => {
                out.push(&region[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    out.push(&region[start..]);
    out
}

/// Split a segment at its first top-level `=` or `:`.
fn split_field(segment: &str) -> Option<(&str, &str)> {
    let bytes = segment.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let pair = bytes.get(i + 1).copied();
        match (bytes[i], pair) {
            (b'[', Some(b'[')) | (b'{', Some(b'{')) => {
                depth += 1;
                i += 2;
                continue;
            }
            (b']', Some(b']')) | (b'}', Some(b'}')) => {
                depth = depth.saturating_sub(1);
                i += 2;
                continue;
            }
            (b'=' | b':', _) if depth == 0 => {
                let label = segment[..i].trim();
                if label.is_empty() {
                    return None;
                }
                return Some((label, &segment[i + 1..]));
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Strip markup from a raw value. `None` when nothing meaningful remains.
fn clean_value(raw: &str, title: &str) -> Option<String> {
    let text = RE_COMMENT.replace_all(raw, "");
    let text = RE_PAGENAME.replace_all(&text, regex::NoExpand(title));
    let text = RE_ITEMLINK.replace_all(&text, "$1");
    let text = RE_WIKILINK.replace_all(&text, |caps: &regex::Captures<'_>| {
        caps[1].rsplit('|').next().unwrap_or_default().to_string()
    });
    let text = RE_HTML_TAG.replace_all(&text, " ");
    let text = RE_QUOTES.replace_all(&text, "");
    let text = RE_BRACKETS.replace_all(&text, "");
    let text = RE_SPACES.replace_all(&text, " ");
    let text = text
        .trim()
        .trim_start_matches(['=', ':', '*', ';', '#'])
        .trim();

    if is_absent(text) {
        None
    } else {
        Some(text.to_string())
    }
}

fn is_absent(value: &str) -> bool {
    value.is_empty()
        || value == "-"
        || value == "?"
        || value.eq_ignore_ascii_case("n/a")
        || value.eq_ignore_ascii_case("na")
}

/// First prose line under a `==Notes==` heading.
fn notes_section(text: &str, title: &str) -> Option<String> {
    let heading = RE_NOTES_HEADING.find(text)?;
    let body = RE_COMMENT.replace_all(&text[heading.end()..], "");
    body.lines()
        .map(str::trim)
        .take_while(|line| !line.starts_with('='))
        .filter(|line| !line.is_empty() && !line.to_lowercase().starts_with("[[category:"))
        .find_map(|line| {
            let cleaned = clean_value(line.trim_start_matches(['*', '#', ':', ';']), title)?;
            (!cleaned.to_lowercase().contains(NOTES_PLACEHOLDER)).then_some(cleaned)
        })
}
