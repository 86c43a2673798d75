//! HTML directory-listing parser.

use scraper::{Html, Selector};

/// Cheap heuristic, preserved from the source tool: a response "is HTML" iff
/// `<html>` appears literally in the body.
pub fn is_html(body: &str) -> bool {
    body.contains("<html>")
}

/// Enumerates every anchor `href` in a directory-listing page and keeps only
/// the relative, same-directory child paths: non-empty, not `.`/`..`, not
/// absolute, with neither a scheme nor a host.
pub fn parse_directory_listing(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let selector = Selector::parse("a").expect("static selector `a` is valid");

    let mut files = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };

        if let Some(path) = relative_child_path(href) {
            files.push(path);
        }
    }
    files
}

/// Mirrors `urllib.parse.urlparse(href)` being scheme-less, host-less, and
/// relative. `url::Url` refuses to parse bare relative references without a
/// base, so hrefs are parsed against an inert `http://dummy.invalid/` base
/// and only accepted when nothing in the original string implied a scheme
/// or authority.
fn relative_child_path(href: &str) -> Option<String> {
    let looks_absolute = href.contains("://") || href.starts_with("//");
    if looks_absolute {
        return None;
    }

    let trimmed = href.split(['?', '#']).next().unwrap_or("");
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return None;
    }
    if trimmed.starts_with('/') {
        return None;
    }

    // Reject anything with an embedded scheme (e.g. "javascript:void(0)").
    let base = url::Url::parse("http://dummy.invalid/").expect("static base url is valid");
    let parsed = base.join(href).ok()?;
    if parsed.host_str() != Some("dummy.invalid") {
        return None;
    }

    Some(trimmed.to_string())
}
