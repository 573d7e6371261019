use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::Sha256;
use url::form_urlencoded;

use crate::client::CosmosError;

pub(crate) const API_VERSION: &str = "2018-12-31";

/// Formats `now` the way `x-ms-date` expects (RFC 1123, always GMT).
pub(crate) fn ms_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Builds the url-encoded master key `Authorization` header value.
///
/// `resource_link` is the unencoded link of the addressed resource, or of the
/// parent collection for feed operations.
pub(crate) fn master_key_token(
    key: &[u8],
    method: &Method,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> Result<String, CosmosError> {
    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        method.as_str().to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    );

    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|_| CosmosError::Signature)?;
    mac.update(payload.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let token = format!("type=master&ver=1.0&sig={signature}");
    Ok(form_urlencoded::byte_serialize(token.as_bytes()).collect())
}
