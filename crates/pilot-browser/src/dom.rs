//! Scripts injected into the page
//!
//! Every script is an expression that evaluates to a primitive (string or
//! number), so results come back by value over CDP.

use pilot_core::{Affordance, PilotError, Result};
use serde_json::Value;

/// Returned by element scripts when the XPath matches nothing
pub const NOT_FOUND: &str = "not_found";

/// Index, outline and describe every visible interactive element
///
/// Evaluates to a JSON array of tag strings such as `<button id="save">Save</button>`.
pub const ENUMERATE_AFFORDANCES: &str = r#"(() => {
  const selector = [
    'a[href]', 'button', 'input:not([type="hidden"])', 'select', 'textarea', 'summary',
    '[role="button"]', '[role="link"]', '[role="checkbox"]', '[role="tab"]',
    '[role="menuitem"]', '[onclick]', '[contenteditable="true"]'
  ].join(',');
  const attrs = ['id', 'name', 'type', 'placeholder', 'aria-label', 'title', 'value', 'href', 'role'];
  const clip = (s) => {
    const flat = String(s).replace(/\s+/g, ' ').trim();
    return flat.length > 80 ? flat.slice(0, 77) + '...' : flat;
  };
  const visible = (el) => {
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
  };
  const out = [];
  for (const el of document.querySelectorAll(selector)) {
    if (!visible(el)) continue;
    const tag = el.tagName.toLowerCase();
    const parts = [tag];
    for (const name of attrs) {
      const value = el.getAttribute(name);
      if (value === null || value === '') continue;
      parts.push(name + "='" + clip(value).replace(/'/g, '"') + "'");
    }
    el.setAttribute('data-pilot-index', String(out.length));
    el.setAttribute('data-pilot-outline', el.style.outline || '');
    el.style.outline = '2px solid orange';
    out.push('<' + parts.join(' ') + '>' + clip(el.innerText || el.textContent || '') + '</' + tag + '>');
  }
  return JSON.stringify(out);
})()"#;

/// Restore outlines and drop the index attributes set by [`ENUMERATE_AFFORDANCES`]
pub const REMOVE_HIGHLIGHT: &str = r#"(() => {
  const marked = document.querySelectorAll('[data-pilot-index]');
  for (const el of marked) {
    el.style.outline = el.getAttribute('data-pilot-outline') || '';
    el.removeAttribute('data-pilot-outline');
    el.removeAttribute('data-pilot-index');
  }
  return marked.length;
})()"#;

fn js_string(text: &str) -> String {
    Value::from(text).to_string()
}

fn first_match(xpath: &str) -> String {
    format!(
        "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
        js_string(xpath)
    )
}

/// Number of nodes the XPath resolves to
pub fn count_matches(xpath: &str) -> String {
    format!(
        "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength",
        js_string(xpath)
    )
}

/// Scroll the first match into view and click it
pub fn click(xpath: &str) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) return '{}'; \
         el.scrollIntoView({{block: 'center'}}); el.click(); return 'clicked'; }})()",
        first_match(xpath),
        NOT_FOUND
    )
}

/// Focus the first match, optionally clearing its current value
pub fn focus(xpath: &str, clear: bool) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) return '{}'; \
         el.scrollIntoView({{block: 'center'}}); el.focus(); \
         if ({}) {{ if ('value' in el) {{ el.value = ''; \
         el.dispatchEvent(new Event('input', {{bubbles: true}})); }} \
         else if (el.isContentEditable) {{ el.textContent = ''; }} }} \
         return 'focused'; }})()",
        first_match(xpath),
        NOT_FOUND,
        clear
    )
}

/// Scroll the window vertically; negative values scroll up
pub fn scroll_by(dy: i64) -> String {
    format!("(() => {{ window.scrollBy(0, {}); return window.scrollY; }})()", dy)
}

/// XPath of the file input to feed for an upload target
///
/// The target itself if it is a file input, else the first file input inside
/// it, else the first one after it in document order.
pub fn upload_target(xpath: &str) -> String {
    format!(
        "(({x})[1]/descendant-or-self::input[@type='file'] | ({x})[1]/following::input[@type='file'])[1]",
        x = xpath
    )
}

/// Parse the output of [`ENUMERATE_AFFORDANCES`]
pub fn parse_affordances(raw: &Value) -> Result<Vec<Affordance>> {
    let text = raw.as_str().ok_or_else(|| {
        PilotError::Browser(format!("Element enumeration returned {}", raw))
    })?;
    let tags: Vec<String> = serde_json::from_str(text)?;
    Ok(tags
        .into_iter()
        .enumerate()
        .map(|(index, descriptor)| Affordance { index, descriptor })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_xpath_is_embedded_as_string_literal() {
        let script = click(r#"//a[text()="Say "hi""]"#);
        assert!(script.contains(r#""//a[text()=\"Say \"hi\"\"]""#));
        assert!(script.contains(NOT_FOUND));
    }

    #[test]
    fn test_focus_clear_flag() {
        assert!(focus("//input", true).contains("if (true)"));
        assert!(focus("//input", false).contains("if (false)"));
    }

    #[test]
    fn test_upload_target() {
        assert_eq!(
            upload_target("//div[@id='drop']"),
            "((//div[@id='drop'])[1]/descendant-or-self::input[@type='file'] | \
             (//div[@id='drop'])[1]/following::input[@type='file'])[1]"
        );
    }

    #[test]
    fn test_parse_affordances() {
        let raw = json!(r#"["<button id='save'>Save</button>", "<a href='/home'>Home</a>"]"#);
        let affordances = parse_affordances(&raw).unwrap();
        assert_eq!(affordances.len(), 2);
        assert_eq!(affordances[1].index, 1);
        assert_eq!(affordances[0].descriptor, "<button id='save'>Save</button>");
    }

    #[test]
    fn test_parse_affordances_rejects_non_string() {
        assert!(parse_affordances(&Value::Null).is_err());
    }
}
