//! Connection URL construction

use analysis_common::{ClientError, ClientResult};
use url::Url;

/// `{endpoint}/{analysis_id}?token={token}`, with proper encoding
pub fn build_url(endpoint: &str, analysis_id: &str, token: Option<&str>) -> ClientResult<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| ClientError::Config(format!("invalid endpoint '{endpoint}': {e}")))?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ClientError::Config(format!(
            "endpoint scheme must be ws or wss, got '{}'",
            url.scheme()
        )));
    }

    url.path_segments_mut()
        .map_err(|()| ClientError::Config(format!("endpoint '{endpoint}' cannot take a path")))?
        .pop_if_empty()
        .push(analysis_id);

    if let Some(token) = token.filter(|t| !t.is_empty()) {
        url.query_pairs_mut().append_pair("token", token);
    }

    Ok(url)
}

/// The URL with its query removed, safe to log
#[must_use]
pub fn redacted(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.to_string()
}
