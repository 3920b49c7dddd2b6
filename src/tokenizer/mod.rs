//! URL tokenizer (spec §4.1).
//!
//! Deterministic, pure tokenization of a request's `host`, `path`, and
//! `query_string` into an ordered, deduplicated sequence of lowercased
//! tokens. No shared state, no I/O.

use crate::model::Request;

/// Numeric path segments longer than this are treated as opaque ids and
/// replaced with the sentinel `<num>` token (spec §4.1).
const MAX_LITERAL_NUMERIC_LEN: usize = 6;

/// Tokenize a request into an ordered, deduplicated token sequence.
///
/// Used to build the TF-IDF vocabulary and document-frequency counts,
/// where membership (not multiplicity) is what matters.
#[must_use]
pub fn tokenize(request: &Request) -> Vec<String> {
    dedup_preserve_order(tokenize_raw(request))
}

/// Tokenize a request into the raw, non-deduplicated token sequence.
///
/// The embedder's term-frequency step re-tokenizes the raw stream rather
/// than reusing [`tokenize`]'s deduplicated output, since TF needs real
/// per-request counts (spec §4.1: "the TF step handles counts by
/// re-tokenizing raw stream before dedup").
#[must_use]
pub fn tokenize_raw(request: &Request) -> Vec<String> {
    let mut tokens = Vec::new();

    tokens.push(format!("h:{}", request.host.to_lowercase()));

    let segments: Vec<&str> = request.path.split('/').filter(|s| !s.is_empty()).collect();
    let last_idx = segments.len().checked_sub(1);

    for (idx, segment) in segments.iter().enumerate() {
        let is_last = Some(idx) == last_idx;
        if is_last {
            let (stem, ext) = split_extension(segment);
            tokenize_segment(stem, &mut tokens);
            if let Some(ext) = ext {
                tokens.push(format!("ext:{}", ext.to_lowercase()));
            }
        } else {
            tokenize_segment(segment, &mut tokens);
        }
    }

    if let Some(query) = &request.query_string {
        for key in extract_query_keys(query) {
            tokens.push(format!("q:{}", key.to_lowercase()));
        }
    }

    tokens
}

/// Split a path segment's trailing `.ext` off, if present and non-empty
/// before the dot (so a segment that's entirely an extension-looking
/// string, e.g. `.htaccess`, isn't mistaken for an empty stem + ext).
fn split_extension(segment: &str) -> (&str, Option<&str>) {
    match segment.rfind('.') {
        Some(pos) if pos > 0 && pos < segment.len() - 1 => {
            (&segment[..pos], Some(&segment[pos + 1..]))
        }
        _ => (segment, None),
    }
}

/// Split a segment on `[-_.]` and on case transitions, lowercasing and
/// collapsing pure-numeric sub-tokens longer than 6 digits into `<num>`.
fn tokenize_segment(segment: &str, out: &mut Vec<String>) {
    for piece in split_delimiters(segment) {
        for sub in split_case_transitions(piece) {
            if sub.is_empty() {
                continue;
            }
            if is_long_numeric(sub) {
                out.push("<num>".to_string());
            } else {
                out.push(sub.to_lowercase());
            }
        }
    }
}

fn split_delimiters(s: &str) -> Vec<&str> {
    s.split(|c| matches!(c, '-' | '_' | '.'))
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split `camelCase` / `PascalCase` into `camel`, `Case` style pieces.
fn split_case_transitions(s: &str) -> Vec<&str> {
    let mut bounds = vec![0];
    let chars: Vec<(usize, char)> = s.char_indices().collect();
    for i in 1..chars.len() {
        let (byte_idx, c) = chars[i];
        let (_, prev) = chars[i - 1];
        if prev.is_lowercase() && c.is_uppercase() {
            bounds.push(byte_idx);
        }
    }
    bounds.push(s.len());

    bounds
        .windows(2)
        .map(|w| &s[w[0]..w[1]])
        .filter(|p| !p.is_empty())
        .collect()
}

fn is_long_numeric(s: &str) -> bool {
    s.len() > MAX_LITERAL_NUMERIC_LEN && s.chars().all(|c| c.is_ascii_digit())
}

/// Extract parameter keys (not values) from a query string, in the order
/// they appear. Handles `a=1&b=2` and bare flags `a&b=2`.
fn extract_query_keys(query: &str) -> Vec<&str> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| pair.split('=').next().unwrap_or(pair))
        .filter(|k| !k.is_empty())
        .collect()
}

fn dedup_preserve_order(tokens: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokens.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BotCategory, Provider};

    fn req(host: &str, path: &str, query: Option<&str>) -> Request {
        Request {
            id: 0,
            timestamp: chrono::Utc::now(),
            client_ip: "1.2.3.4".into(),
            method: "GET".into(),
            host: host.into(),
            path: path.into(),
            status_code: 200,
            user_agent: "test".into(),
            provider: Provider::new("OpenAI"),
            bot_category: BotCategory::Crawler,
            query_string: query.map(str::to_string),
            response_bytes: None,
            request_bytes: None,
            response_time_ms: None,
            cache_status: None,
            edge_location: None,
            referer: None,
            protocol: None,
            ssl_protocol: None,
        }
    }

    #[test]
    fn tokenizes_path_segments_and_host() {
        let r = req("Example.com", "/api/weather/today.json", None);
        let tokens = tokenize(&r);
        assert!(tokens.contains(&"h:example.com".to_string()));
        assert!(tokens.contains(&"api".to_string()));
        assert!(tokens.contains(&"weather".to_string()));
        assert!(tokens.contains(&"today".to_string()));
        assert!(tokens.contains(&"ext:json".to_string()));
    }

    #[test]
    fn splits_camel_case() {
        let r = req("example.com", "/api/getWeatherReport", None);
        let tokens = tokenize(&r);
        assert!(tokens.contains(&"get".to_string()));
        assert!(tokens.contains(&"weather".to_string()));
        assert!(tokens.contains(&"report".to_string()));
    }

    #[test]
    fn long_numeric_segments_become_sentinel() {
        let r = req("example.com", "/users/1234567/profile", None);
        let tokens = tokenize(&r);
        assert!(tokens.contains(&"<num>".to_string()));
        assert!(!tokens.iter().any(|t| t == "1234567"));
    }

    #[test]
    fn short_numeric_segments_are_kept_literal() {
        let r = req("example.com", "/v2/items", None);
        let tokens = tokenize(&r);
        assert!(tokens.contains(&"v2".to_string()));
    }

    #[test]
    fn query_keys_only_not_values() {
        let r = req("example.com", "/search", Some("q=rust&session=abc123"));
        let tokens = tokenize(&r);
        assert!(tokens.contains(&"q:q".to_string()));
        assert!(tokens.contains(&"q:session".to_string()));
        assert!(!tokens.iter().any(|t| t.contains("abc123")));
    }

    #[test]
    fn drops_empty_segments() {
        let r = req("example.com", "//api//weather/", None);
        let tokens = tokenize(&r);
        assert!(tokens.contains(&"api".to_string()));
        assert!(tokens.contains(&"weather".to_string()));
    }

    #[test]
    fn deduplicates_tokens() {
        let r = req("example.com", "/api/api/api", None);
        let tokens = tokenize(&r);
        assert_eq!(tokens.iter().filter(|t| *t == "api").count(), 1);
    }

    #[test]
    fn is_deterministic() {
        let r = req("Example.com", "/api/getWeather/1234567890.json", Some("q=1&x=2"));
        assert_eq!(tokenize(&r), tokenize(&r));
    }
}
