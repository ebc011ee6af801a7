//! Request normalization
//!
//! Query options arrive either as pairs or as a pre-encoded string; both are
//! folded into the URL here, before the transport ever sees the request.

use crate::error::GetrError;
use getr_types::Query;
use url::Url;

/// Parse `raw` and append the query in its canonical encoded form
pub fn build_url(raw: &str, query: Option<&Query>) -> Result<Url, GetrError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(GetrError::InvalidRequest("Url missing".to_string()));
    }

    let mut url = Url::parse(raw)
        .map_err(|e| GetrError::InvalidRequest(format!("{}: {}", raw, e)))?;

    match query {
        None => {}
        Some(Query::Pairs(pairs)) => {
            if !pairs.is_empty() {
                url.query_pairs_mut().extend_pairs(pairs.iter());
            }
        }
        Some(Query::Encoded(encoded)) => {
            let encoded = encoded.trim_start_matches(|c| c == '?' || c == '&');
            if !encoded.is_empty() {
                let merged = match url.query() {
                    Some(existing) if !existing.is_empty() => format!("{}&{}", existing, encoded),
                    _ => encoded.to_string(),
                };
                url.set_query(Some(&merged));
            }
        }
    }

    Ok(url)
}
