//! XPath locator helpers

use regex::Regex;
use std::sync::OnceLock;

static EXACT_MATCH: OnceLock<Regex> = OnceLock::new();

fn exact_match_pattern() -> &'static Regex {
    EXACT_MATCH.get_or_init(|| {
        // `lhs = 'literal'` where lhs is an attribute, text(), . or normalize-space()
        Regex::new(
            r#"(@[A-Za-z_][\w:.-]*|text\(\)|normalize-space\(\)|\.)\s*=\s*('[^']*'|"[^"]*")"#,
        )
        .expect("exact-match pattern compiles")
    })
}

/// Undo quote escaping that oracles tend to add, and drop a leading `xpath:` prefix
pub fn normalize_xpath(raw: &str) -> String {
    let cleaned = raw.trim().replace("\\'", "'").replace("\\\"", "\"");
    let cleaned = cleaned
        .strip_prefix("xpath:")
        .map(str::to_string)
        .unwrap_or(cleaned);

    if cleaned.starts_with('/') || cleaned.starts_with('(') || cleaned.is_empty() {
        cleaned
    } else {
        format!("//{}", cleaned)
    }
}

/// Loosen exact-match predicates into substring matches
///
/// `//button[text()='Save']` becomes `//button[contains(text(), 'Save')]`.
/// Returns `None` when the locator has no exact-match predicate to relax.
pub fn relax_exact_match(xpath: &str) -> Option<String> {
    let pattern = exact_match_pattern();
    if !pattern.is_match(xpath) {
        return None;
    }
    Some(pattern.replace_all(xpath, "contains($1, $2)").into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unescapes_quotes() {
        assert_eq!(
            normalize_xpath(r"//input[@name=\'q\']"),
            "//input[@name='q']"
        );
        assert_eq!(
            normalize_xpath(r#"//a[text()=\"Home\"]"#),
            r#"//a[text()="Home"]"#
        );
    }

    #[test]
    fn test_normalize_prefixes() {
        assert_eq!(normalize_xpath("xpath://div"), "//div");
        assert_eq!(normalize_xpath("button[@id='go']"), "//button[@id='go']");
        assert_eq!(normalize_xpath("(//a)[2]"), "(//a)[2]");
    }

    #[test]
    fn test_relax_text_and_attributes() {
        assert_eq!(
            relax_exact_match("//button[text()='Save']").as_deref(),
            Some("//button[contains(text(), 'Save')]")
        );
        assert_eq!(
            relax_exact_match(r#"//input[@placeholder="Search" and @type='text']"#).as_deref(),
            Some(r#"//input[contains(@placeholder, "Search") and contains(@type, 'text')]"#)
        );
        assert_eq!(
            relax_exact_match("//span[normalize-space()='Publish']").as_deref(),
            Some("//span[contains(normalize-space(), 'Publish')]")
        );
    }

    #[test]
    fn test_relax_without_exact_match() {
        assert_eq!(relax_exact_match("//div[contains(@class, 'card')]"), None);
        assert_eq!(relax_exact_match("//ul/li[3]"), None);
    }
}
