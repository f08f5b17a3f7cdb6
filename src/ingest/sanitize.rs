use std::sync::OnceLock;

use regex::Regex;

fn newline_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:\r?\n)+").expect("static pattern"))
}

fn space_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" {2,}").expect("static pattern"))
}

/// Collapses newline runs and space runs to one character each. Tokens are untouched.
pub fn sanitize_text(text: &str) -> String {
    let collapsed = newline_runs().replace_all(text, "\n");
    space_runs().replace_all(&collapsed, " ").into_owned()
}
