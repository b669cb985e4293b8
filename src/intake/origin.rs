//! Cross-site submission guard.
//!
//! When a browser sends both `Origin` and `Host`, the origin's `host[:port]`
//! must equal the `Host` header exactly. Requests missing either header pass:
//! same-origin browser contexts and non-browser clients omit `Origin`.

use axum::http::{header, HeaderMap};
use url::Url;

use crate::intake::error::IntakeError;

/// Check the request origin against the request host.
pub fn check_origin(headers: &HeaderMap) -> Result<(), IntakeError> {
    let (Some(origin), Some(host)) = (headers.get(header::ORIGIN), headers.get(header::HOST))
    else {
        return Ok(());
    };

    let origin = origin.to_str().map_err(|_| IntakeError::InvalidOrigin)?;
    let parsed = Url::parse(origin).map_err(|_| IntakeError::InvalidOrigin)?;

    let origin_host = match (parsed.host_str(), parsed.port()) {
        (Some(h), Some(port)) => format!("{}:{}", h, port),
        (Some(h), None) => h.to_string(),
        (None, _) => String::new(),
    };

    match host.to_str() {
        Ok(host) if host == origin_host => Ok(()),
        _ => Err(IntakeError::OriginMismatch),
    }
}
