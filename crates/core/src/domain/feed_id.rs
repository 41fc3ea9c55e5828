// Feed Identifier - deterministic, storage-safe ID derived from a feed URL

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use url::Url;

/// Position of the hex digit taken from the URL digest when a query or
/// params are present. Gives 16-way separation between feeds sharing host+path.
pub const DISAMBIGUATOR_INDEX: usize = 6;

/// Feed identifier (safe as a document key and as a URL path segment)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for FeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FeedId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Build a feed ID from its source URL.
///
/// `netloc + path`, with `/` replaced by `_` and `+` by `-`. When the URL
/// carries params (`;...` on the last segment) or a query string, one hex
/// digit of the SHA-1 of the full input is appended. Trailing `_`/`-` are
/// trimmed.
///
/// Netloc and path are taken verbatim from the input: host case, default
/// ports, dot segments and non-ASCII characters are all preserved, so two
/// spellings of the same address get different IDs.
///
/// # Errors
/// - `AppError::InvalidUrl` if the URL does not parse or has no netloc
///
/// # Example
/// ```text
/// generate_id("http://example.com/feed.xml")?  // "example.com_feed.xml"
/// generate_id("http://Example.COM:80/a/../f")? // "Example.COM:80_a_.._f"
/// ```
pub fn generate_id(url: &str) -> Result<FeedId> {
    let parsed =
        Url::parse(url).map_err(|e| AppError::InvalidUrl(format!("{}: {}", url, e)))?;
    if parsed.cannot_be_a_base() {
        return Err(AppError::InvalidUrl(format!("{}: no path component", url)));
    }

    let parts = RawParts::split(url);
    if parts.netloc.is_empty() {
        return Err(AppError::InvalidUrl(format!("{}: no host component", url)));
    }

    let mut safe = format!("{}{}", parts.netloc, parts.path)
        .replace('/', "_")
        .replace('+', "-");

    if !parts.params.is_empty() || !parts.query.is_empty() {
        safe.push(disambiguator(url));
    }

    Ok(FeedId(safe.trim_end_matches(['_', '-']).to_string()))
}

/// Components of a URL as written, without any normalization
#[derive(Debug, PartialEq, Eq)]
struct RawParts<'a> {
    netloc: &'a str,
    path: &'a str,
    params: &'a str,
    query: &'a str,
}

impl<'a> RawParts<'a> {
    fn split(url: &'a str) -> Self {
        let url = url.trim_start_matches(|c: char| c <= ' ');
        let rest = match url.find(':') {
            Some(colon) => &url[colon + 1..],
            None => url,
        };

        let (netloc, rest) = match rest.strip_prefix("//") {
            Some(after) => {
                let end = after.find(['/', '?', '#']).unwrap_or(after.len());
                after.split_at(end)
            }
            None => ("", rest),
        };

        let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        let (path, params) = split_params(path);

        Self {
            netloc,
            path,
            params,
            query,
        }
    }
}

/// Params live after the first `;` of the last path segment
fn split_params(path: &str) -> (&str, &str) {
    let last_segment = path.rfind('/').unwrap_or(0);
    match path[last_segment..].find(';') {
        Some(offset) => {
            let at = last_segment + offset;
            (&path[..at], &path[at + 1..])
        }
        None => (path, ""),
    }
}

fn disambiguator(url: &str) -> char {
    let digest = hex::encode(Sha1::digest(url.as_bytes()));
    digest.as_bytes()[DISAMBIGUATOR_INDEX] as char
}
