//! Scrubs a user-supplied query string into a token stream safe for
//! the engine's query parser. Grounded on
//! `original_source/namex-solr-api/.../utils/formatting_helpers.py`'s
//! `prep_query_str` / `prep_query_str_namex` pair: the base
//! normalizer plus a wrapper that additionally strips configured
//! entity designations (e.g. "LTD", "INC") before normalizing.

use std::sync::OnceLock;

use regex::Regex;

/// Hyphen handling policy, applied after designation stripping and
/// before escaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DashPolicy {
    #[default]
    Unchanged,
    ReplaceWithSpace,
    Remove,
    PadWithSpaces,
    Tighten,
    TightenRemove,
}

fn repeated_amp_plus() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([&+])\1+").unwrap())
}

fn strip_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[()^{}|\\]").unwrap())
}

fn leading_escape_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `+ - / !` only when at the start of the string or right after
    // whitespace — these are Solr's unary query-prefix operators.
    RE.get_or_init(|| Regex::new(r"(^|\s)([+\-/!])").unwrap())
}

fn everywhere_escape_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(["\:\[\]~<>?])"#).unwrap())
}

fn double_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").unwrap())
}

fn tighten_dash() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*-\s*").unwrap())
}

fn apply_dash_policy(input: &str, policy: DashPolicy) -> String {
    match policy {
        DashPolicy::Unchanged => input.to_string(),
        DashPolicy::ReplaceWithSpace => input.replace('-', " "),
        DashPolicy::Remove => input.replace('-', ""),
        DashPolicy::PadWithSpaces => input.replace('-', " - "),
        DashPolicy::Tighten => tighten_dash().replace_all(input, "-").into_owned(),
        DashPolicy::TightenRemove => tighten_dash().replace_all(input, "").into_owned(),
    }
}

/// The base normalizer (`prep_query_str`). Total and, under
/// `DashPolicy::Unchanged`, idempotent (P1).
pub fn normalize(input: &str, dash: DashPolicy, replace_and: bool) -> String {
    if input.is_empty() {
        return String::new();
    }

    let mut s = input.to_lowercase();
    s = repeated_amp_plus().replace_all(&s, "$1").into_owned();
    s = strip_chars().replace_all(&s, "").into_owned();

    if replace_and {
        s = s.replace('&', "and").replace('+', "and");
    }

    s = apply_dash_policy(&s, dash);

    s = leading_escape_chars()
        .replace_all(&s, "$1\\$2")
        .into_owned();
    s = everywhere_escape_chars()
        .replace_all(&s, "\\$1")
        .into_owned();

    s = double_space().replace_all(&s, " ").into_owned();
    s.trim().to_lowercase()
}

/// Strip any of `designations` (matched as a whole trailing word or
/// phrase, case-insensitively) from the end of `input`, then apply
/// [`normalize`]. Designations are tried longest-first so a
/// multi-word designation isn't shadowed by a shorter one that's also
/// a suffix of it.
pub fn normalize_name_query(
    input: &str,
    designations: &[String],
    dash: DashPolicy,
    replace_and: bool,
    remove_designations: bool,
) -> String {
    if !remove_designations || designations.is_empty() {
        return normalize(input, dash, replace_and);
    }

    let mut sorted: Vec<&String> = designations.iter().collect();
    sorted.sort_by_key(|d| std::cmp::Reverse(d.len()));

    let trimmed_end = input.trim_end();
    let lower = trimmed_end.to_lowercase();
    for designation in sorted {
        let needle = designation.to_lowercase();
        if let Some(rest) = lower.strip_suffix(&needle) {
            if rest.is_empty() || rest.ends_with(char::is_whitespace) {
                let cut = trimmed_end.len() - needle.len();
                return normalize(trimmed_end[..cut].trim_end(), dash, replace_and);
            }
        }
    }

    normalize(input, dash, replace_and)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(normalize("", DashPolicy::Unchanged, true), "");
    }

    #[test]
    fn idempotent_under_identity_dash_policy() {
        for s in [
            "Acme & Sons Ltd.",
            "  weird++input  ",
            "quote\"bracket[test]",
            "tilde~fuzzy?",
            "-leading-dash",
        ] {
            let once = normalize(s, DashPolicy::Unchanged, true);
            let twice = normalize(&once, DashPolicy::Unchanged, true);
            assert_eq!(once, twice, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn never_leaves_unescaped_reserved_characters() {
        let out = normalize(
            r#"acme ":~<>?[] ()^{}|\ co"#,
            DashPolicy::Unchanged,
            true,
        );
        for ch in [':', '~', '<', '>', '?', '"', '[', ']'] {
            // every occurrence must be immediately preceded by a backslash
            for (i, c) in out.char_indices() {
                if c == ch {
                    assert!(i > 0 && out.as_bytes()[i - 1] == b'\\', "unescaped {ch}");
                }
            }
        }
        for ch in ['(', ')', '^', '{', '}', '|', '\\'] {
            assert!(!out.contains(ch), "should have been stripped: {ch}");
        }
    }

    #[test]
    fn collapses_doubled_ampersand_and_plus() {
        assert_eq!(normalize("a && b", DashPolicy::Unchanged, false), "a & b");
        assert_eq!(normalize("a +++ b", DashPolicy::Unchanged, false), "a + b");
    }

    #[test]
    fn replace_and_flag_converts_amp_and_plus() {
        assert_eq!(normalize("acme & co", DashPolicy::Unchanged, true), "acme and co");
    }

    #[test]
    fn leading_operators_are_escaped_only_at_word_boundaries() {
        let out = normalize("-acme +co !go /path", DashPolicy::Unchanged, false);
        assert_eq!(out, r"\-acme \+co \!go \/path");
    }

    #[test]
    fn dash_policies_behave_distinctly() {
        assert_eq!(
            apply_dash_policy("foo-bar", DashPolicy::ReplaceWithSpace),
            "foo bar"
        );
        assert_eq!(apply_dash_policy("foo-bar", DashPolicy::Remove), "foobar");
        assert_eq!(
            apply_dash_policy("foo-bar", DashPolicy::PadWithSpaces),
            "foo - bar"
        );
        assert_eq!(apply_dash_policy("foo - bar", DashPolicy::Tighten), "foo-bar");
        assert_eq!(
            apply_dash_policy("foo - bar", DashPolicy::TightenRemove),
            "foobar"
        );
    }

    #[test]
    fn strips_longest_matching_designation() {
        let designations = vec!["LTD".to_string(), "INTERNATIONAL LTD".to_string()];
        let out = normalize_name_query(
            "Acme International Ltd",
            &designations,
            DashPolicy::Unchanged,
            true,
            true,
        );
        assert_eq!(out, "acme");
    }

    #[test]
    fn leaves_value_alone_when_designation_not_a_suffix() {
        let designations = vec!["LTD".to_string()];
        let out = normalize_name_query(
            "Ltd Holdings",
            &designations,
            DashPolicy::Unchanged,
            true,
            true,
        );
        assert_eq!(out, "ltd holdings");
    }
}
