use crate::{Error, Result};

pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// `Host` value for `url`; the port is dropped when it is the http default.
pub(super) fn host_header_value(url: &url::Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

pub(super) fn parse_http_url(raw: &str) -> Result<url::Url> {
    let url = url::Url::parse(raw).map_err(|e| Error::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "http" {
        return Err(Error::UnsupportedScheme {
            url: raw.to_string(),
            scheme: url.scheme().to_string(),
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> url::Url {
        url::Url::parse(s).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn host_header_omits_default_port() {
        assert_eq!(
            host_header_value(&url("http://reservas:80/reservas")).as_deref(),
            Some("reservas")
        );
        assert_eq!(
            host_header_value(&url("http://reservas:8080/reservas")).as_deref(),
            Some("reservas:8080")
        );
    }

    #[test]
    fn only_plain_http_is_accepted() {
        assert!(parse_http_url("http://localhost:8080/").is_ok());
        assert!(matches!(
            parse_http_url("https://localhost/"),
            Err(Error::UnsupportedScheme { scheme, .. }) if scheme == "https"
        ));
        assert!(matches!(
            parse_http_url("not a url"),
            Err(Error::InvalidUrl { .. })
        ));
    }
}
