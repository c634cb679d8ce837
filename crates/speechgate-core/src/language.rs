//! BCP-47 tag matching on the primary subtag.
//!
//! Matching is case-insensitive and treats `_` like `-`. A request for `en` or
//! `en-AU` can be served by a model declaring `en-US`, but the resolved tag is
//! always one the model declares; no region is ever synthesized.

/// How a declared tag matched a requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LanguageMatch {
    Exact,
    Primary,
}

/// The part of a tag before the first `-` (or `_`).
pub fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

pub fn is_exact(declared: &str, requested: &str) -> bool {
    declared.len() == requested.len()
        && declared
            .bytes()
            .zip(requested.bytes())
            .all(|(a, b)| normalize(a) == normalize(b))
}

pub fn same_primary(declared: &str, requested: &str) -> bool {
    let requested = primary_subtag(requested);
    !requested.is_empty() && primary_subtag(declared).eq_ignore_ascii_case(requested)
}

/// Best declared tag for `requested`: an exact entry if there is one, otherwise the
/// first entry sharing its primary subtag.
pub fn best_match<'a>(declared: &'a [String], requested: &str) -> Option<(&'a str, LanguageMatch)> {
    declared
        .iter()
        .find(|tag| is_exact(tag, requested))
        .map(|tag| (tag.as_str(), LanguageMatch::Exact))
        .or_else(|| {
            declared
                .iter()
                .find(|tag| same_primary(tag, requested))
                .map(|tag| (tag.as_str(), LanguageMatch::Primary))
        })
}

fn normalize(byte: u8) -> u8 {
    match byte {
        b'_' => b'-',
        other => other.to_ascii_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_primary_subtag() {
        assert_eq!(primary_subtag("en-US"), "en");
        assert_eq!(primary_subtag("pt_BR"), "pt");
        assert_eq!(primary_subtag("ru"), "ru");
    }

    #[test]
    fn test_exact_is_case_and_separator_insensitive() {
        assert!(is_exact("en-US", "en_us"));
        assert!(!is_exact("en-US", "en"));
    }

    #[test]
    fn test_exact_wins_over_primary() {
        let declared = tags(&["en-US", "en-GB"]);
        assert_eq!(
            best_match(&declared, "en-gb"),
            Some(("en-GB", LanguageMatch::Exact))
        );
        assert_eq!(
            best_match(&declared, "en-AU"),
            Some(("en-US", LanguageMatch::Primary))
        );
        assert_eq!(best_match(&declared, "EN"), Some(("en-US", LanguageMatch::Primary)));
    }

    #[test]
    fn test_unrelated_languages_never_match() {
        let declared = tags(&["en-US"]);
        assert_eq!(best_match(&declared, "de"), None);
        assert_eq!(best_match(&declared, ""), None);
        // "e" is a prefix of "en" as a string, not as a subtag
        assert_eq!(best_match(&declared, "e"), None);
    }
}
