//! Source-document cleanup applied before parsing
//!
//! The e-file source system emits ASCII-safe documents wrapped in several
//! namespace prefixes (`irs:`, `efile:`, ...). Folding works on local names
//! only, so prefixes and namespace declarations are stripped textually.
//! Elements that differ only by prefix collapse onto the same key.

use once_cell::sync::Lazy;
use regex::Regex;

static DECLARATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\?xml.*?\?>").unwrap());

static NAMESPACE_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:xmlns|xsi)(?::[^\s=>"]*)?\s*=\s*"[^"]*""#).unwrap());

// Prefixes are NCNames: a letter or underscore, then letters, digits, `_`, `.` or `-`
static OPEN_TAG_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[A-Za-z_][A-Za-z0-9_.\-]*:").unwrap());

static CLOSE_TAG_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</[A-Za-z_][A-Za-z0-9_.\-]*:").unwrap());

/// Keep printable 7-bit bytes plus tab, LF and CR; drop everything else
pub fn retain_printable_ascii(raw: &[u8]) -> String {
    raw.iter()
        .filter(|&&b| matches!(b, b'\t' | b'\n' | b'\r' | 0x20..=0x7e))
        .map(|&b| b as char)
        .collect()
}

pub fn strip_declaration(doc: &str) -> String {
    DECLARATION.replace(doc, "").into_owned()
}

pub fn strip_namespace_attributes(doc: &str) -> String {
    NAMESPACE_ATTRIBUTE.replace_all(doc, "").into_owned()
}

pub fn strip_element_prefixes(doc: &str) -> String {
    let opened = OPEN_TAG_PREFIX.replace_all(doc, "<");
    CLOSE_TAG_PREFIX.replace_all(&opened, "</").into_owned()
}

/// Full cleanup pipeline, in order
pub fn clean(raw: &[u8]) -> String {
    let ascii = retain_printable_ascii(raw);
    let no_declaration = strip_declaration(&ascii);
    let no_namespaces = strip_namespace_attributes(&no_declaration);
    strip_element_prefixes(&no_namespaces)
}
