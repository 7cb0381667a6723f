//! `Content-Encoding: gzip` body decoding, shared by the two endpoints that
//! accept a body (`PUT /filter/:id/result`, `PUT /stats/filters`).

use std::io::Read;

use axum::http::HeaderMap;
use flate2::read::GzDecoder;

use crate::error::ApiError;

/// If `headers` carries `Content-Encoding: gzip`, inflate `body`; otherwise
/// return it unchanged. The inflated form is expected to be UTF-8 text by
/// every caller, but decoding that is left to them.
pub fn maybe_inflate(headers: &HeaderMap, body: &[u8]) -> Result<Vec<u8>, ApiError> {
    let is_gzip = headers
        .get(axum::http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);

    if !is_gzip {
        return Ok(body.to_vec());
    }

    let mut decoder = GzDecoder::new(body);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ApiError::BadRequest(format!("failed to inflate gzip body: {e}")))?;
    Ok(out)
}
