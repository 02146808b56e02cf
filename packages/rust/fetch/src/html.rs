//! HTML text, link and attribute extraction.

use scraper::{Html, Selector};
use url::Url;

/// Elements whose text never counts as page content.
const CHROME_TAGS: &[&str] = &["script", "style", "noscript", "nav", "header", "footer"];

/// Visible text of `html`, whitespace-collapsed and cut to `max_chars`.
pub fn extract_text(html: &str, max_chars: usize) -> String {
    let doc = Html::parse_document(html);
    let mut words: Vec<&str> = Vec::new();

    for node in doc.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| CHROME_TAGS.contains(&el.name()))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    truncate_chars(&words.join(" "), max_chars)
}

/// Links in `html` resolved against `base_url`, fragment-free and deduplicated
/// in document order.
pub fn extract_links(html: &str, base_url: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);
    let Ok(link_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let mut links: Vec<Url> = Vec::new();

    for el in doc.select(&link_sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        // Skip anchors, javascript:, mailto:, tel:
        if href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }

        if let Ok(mut resolved) = base_url.join(href) {
            resolved.set_fragment(None);
            if !links.contains(&resolved) {
                links.push(resolved);
            }
        }
    }

    links
}

/// Value of `attr` on every element matching `selector`.
///
/// An invalid selector yields no values.
pub fn select_attr(html: &str, selector: &str, attr: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse(selector) else {
        return Vec::new();
    };
    doc.select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(str::to_string)
        .collect()
}

/// First `max_chars` characters of `s`, respecting char boundaries.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_skips_scripts_and_navigation() {
        let html = r#"<html><head><style>body{}</style></head><body>
            <nav>Home | About</nav>
            <main><h1>Acme   Analytics</h1><p>We build
            data tools.</p></main>
            <script>track()</script>
            <footer>Copyright</footer>
        </body></html>"#;
        let text = extract_text(html, 1_000);
        assert_eq!(text, "Acme Analytics We build data tools.");
    }

    #[test]
    fn text_is_truncated_on_char_boundary() {
        let html = "<p>héllo wörld</p>";
        assert_eq!(extract_text(html, 4), "héll");
    }

    #[test]
    fn links_are_resolved_and_deduplicated() {
        let html = r##"<html><body>
            <a href="/pricing">Pricing</a>
            <a href="/pricing#plans">Plans</a>
            <a href="https://external.com">External</a>
            <a href="#top">Top</a>
            <a href="mailto:hi@acme.ie">Mail</a>
            <a href="about">About</a>
        </body></html>"##;
        let base = Url::parse("https://acme.ie/company/").unwrap();
        let links: Vec<String> = extract_links(html, &base)
            .into_iter()
            .map(|u| u.to_string())
            .collect();

        assert_eq!(
            links,
            vec![
                "https://acme.ie/pricing",
                "https://external.com/",
                "https://acme.ie/company/about",
            ]
        );
    }

    #[test]
    fn select_attr_collects_matching_values() {
        let html = r#"<div><a class="result__a" href="https://a.ie">A</a>
            <a class="other" href="https://b.ie">B</a>
            <a class="result__a" href="https://c.ie">C</a></div>"#;
        assert_eq!(
            select_attr(html, "a.result__a", "href"),
            vec!["https://a.ie", "https://c.ie"]
        );
        assert!(select_attr(html, "[[[", "href").is_empty());
    }
}
