use regex::Regex;
use std::sync::OnceLock;

fn trailing_undefined() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:\s*\bundefined\b)+\s*$").expect("static pattern")
    })
}

fn section_then_undefined() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</section>(?:\s*undefined)+\s*$").expect("static pattern")
    })
}

/// Strip the stray trailing `undefined` tokens some service replies end with.
///
/// Only whole words at the very end are removed; a closing `</section>`
/// right before them is kept.
pub fn sanitize(html: &str) -> String {
    let html = section_then_undefined().replace(html, "</section>");
    trailing_undefined().replace(&html, "").into_owned()
}
