//! Content URL resolution and credential propagation.
//!
//! Tile services hand out relative references inside tileset documents and
//! expect every follow-up request to carry the API key and, once issued, the
//! session token. All helpers here take and return plain strings and never
//! fail: a reference that cannot be interpreted is passed through unchanged.

use reqwest::Url;

/// Query parameter carrying the API key.
pub const KEY_PARAM: &str = "key";

/// Query parameter carrying the session token.
pub const SESSION_PARAM: &str = "session";

/// How a content URL is handled by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// A binary mesh container, collected without fetching.
    Mesh,
    /// A structured tileset document.
    Document,
    /// No recognised extension; fetched and sniffed.
    Unknown,
}

/// Resolve a content reference against the URL of the document it came from.
///
/// Follows standard URL reference resolution, so `.` and `..` segments are
/// normalized the same way the HTTP client would normalize them. A base that
/// is not an absolute URL leaves the reference unchanged.
#[must_use]
pub fn resolve_uri(base: &str, uri: &str) -> String {
    let resolved = match Url::parse(base) {
        Ok(base) => base.join(uri),
        Err(_) => Url::parse(uri),
    };
    resolved.map_or_else(|_| uri.to_owned(), String::from)
}

/// Value of the first query parameter called `name`, if any.
#[must_use]
pub fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
    query_pairs(url).find_map(|(k, v)| (k == name).then_some(v))
}

/// Whether the URL's query declares a parameter called `name`.
#[must_use]
pub fn has_param(url: &str, name: &str) -> bool {
    query_pairs(url).any(|(k, _)| k == name)
}

/// The session token embedded in a URL, if it carries a non-empty one.
#[must_use]
pub fn session_of(url: &str) -> Option<&str> {
    query_param(url, SESSION_PARAM).filter(|s| !s.is_empty())
}

/// Append `name=value` to the query, before any fragment.
#[must_use]
pub fn append_param(url: &str, name: &str, value: &str) -> String {
    let (head, fragment) = match url.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (url, None),
    };
    let separator = if head.contains('?') { '&' } else { '?' };
    let mut out = format!("{head}{separator}{name}={value}");
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Add the API key and session token to a URL unless it already has them.
///
/// An empty key or session is never appended.
#[must_use]
pub fn with_credentials(url: &str, key: &str, session: &str) -> String {
    let mut url = url.to_owned();
    if !key.is_empty() && !has_param(&url, KEY_PARAM) {
        url = append_param(&url, KEY_PARAM, key);
    }
    if !session.is_empty() && !has_param(&url, SESSION_PARAM) {
        url = append_param(&url, SESSION_PARAM, session);
    }
    url
}

/// A credential-free identifier for the content a URL addresses.
///
/// The `key` and `session` parameters and any fragment are removed so the
/// same tile fetched under different sessions maps to one identifier.
#[must_use]
pub fn tile_identifier(url: &str) -> String {
    let url = url.split('#').next().unwrap_or(url);
    let Some((path, query)) = url.split_once('?') else {
        return url.to_owned();
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let name = pair.split('=').next().unwrap_or(pair);
            !pair.is_empty() && name != KEY_PARAM && name != SESSION_PARAM
        })
        .collect();
    if kept.is_empty() {
        path.to_owned()
    } else {
        format!("{path}?{}", kept.join("&"))
    }
}

/// Classify a URL by the extension of its path.
#[must_use]
pub fn classify(url: &str) -> ContentKind {
    let path = strip_query(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "glb" => ContentKind::Mesh,
        Some(ext) if ext == "json" => ContentKind::Document,
        _ => ContentKind::Unknown,
    }
}

fn strip_query(url: &str) -> &str {
    url.find(['?', '#']).map_or(url, |i| &url[..i])
}

fn query_pairs(url: &str) -> impl Iterator<Item = (&str, &str)> {
    let url = url.split('#').next().unwrap_or(url);
    let query = url.split_once('?').map_or("", |(_, q)| q);
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
}
