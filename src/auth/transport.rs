//! Where credentials and rotation tokens travel.
//!
//! Each value can arrive in a header or a cookie. A transport is an ordered
//! list of sources; the first one present wins, so headers beat cookies.

use axum::http::{HeaderMap, HeaderValue, header};

use crate::session::IssuedSession;

/// Cookie name for the credential (short-lived).
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the rotation token (long-lived).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Header carrying the rotation token, in both directions.
pub const REFRESH_HEADER_NAME: &str = "x-refresh-token";

/// Response header carrying a freshly issued credential for header-based clients.
pub const ACCESS_HEADER_NAME: &str = "x-access-token";

/// A single place a token value can be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// A plain header holding the raw value
    Header(&'static str),
    /// A cookie in the `Cookie` header
    Cookie(&'static str),
}

impl TokenSource {
    /// Read the value from this source. Empty values count as absent.
    pub fn extract<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let value = match self {
            TokenSource::Bearer => headers
                .get(header::AUTHORIZATION)?
                .to_str()
                .ok()?
                .strip_prefix("Bearer ")?
                .trim(),
            TokenSource::Header(name) => headers.get(*name)?.to_str().ok()?.trim(),
            TokenSource::Cookie(name) => get_cookie(headers, name)?,
        };
        (!value.is_empty()).then_some(value)
    }

    pub fn is_cookie(&self) -> bool {
        matches!(self, TokenSource::Cookie(_))
    }
}

/// Ordered extractor strategies for one logical value.
#[derive(Debug, Clone, Copy)]
pub struct TokenTransport {
    sources: &'static [TokenSource],
}

/// Credential: bearer header first, then cookie.
pub const CREDENTIAL_TRANSPORT: TokenTransport = TokenTransport {
    sources: &[TokenSource::Bearer, TokenSource::Cookie(ACCESS_COOKIE_NAME)],
};

/// Rotation token: dedicated header first, then cookie.
pub const ROTATION_TRANSPORT: TokenTransport = TokenTransport {
    sources: &[
        TokenSource::Header(REFRESH_HEADER_NAME),
        TokenSource::Cookie(REFRESH_COOKIE_NAME),
    ],
};

impl TokenTransport {
    /// Return the first source that holds a value, with the value.
    pub fn extract<'a>(&self, headers: &'a HeaderMap) -> Option<(TokenSource, &'a str)> {
        self.sources
            .iter()
            .find_map(|source| source.extract(headers).map(|value| (*source, value)))
    }
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Overwrite the credential of an in-flight request so later extractors see it.
pub fn replace_credential(headers: &mut HeaderMap, credential: &str) {
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", credential)) {
        headers.insert(header::AUTHORIZATION, value);
    }
}

/// Build a Set-Cookie value for a token.
pub fn token_cookie(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        name, value, max_age, secure
    )
}

/// Build a Set-Cookie value that deletes a token cookie.
pub fn clear_cookie(name: &str, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0{}",
        name, secure
    )
}

/// Write a freshly issued pair into the response as HttpOnly cookies. When the
/// rotation token arrived in a header, the pair is also returned in headers.
pub fn write_session(
    headers: &mut HeaderMap,
    session: &IssuedSession,
    source: TokenSource,
    secure: bool,
) {
    let cookies = [
        token_cookie(
            ACCESS_COOKIE_NAME,
            &session.credential,
            session.credential_ttl,
            secure,
        ),
        token_cookie(
            REFRESH_COOKIE_NAME,
            &session.rotation_token,
            session.rotation_ttl,
            secure,
        ),
    ];
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }

    if !source.is_cookie() {
        if let Ok(value) = HeaderValue::from_str(&session.credential) {
            headers.insert(ACCESS_HEADER_NAME, value);
        }
        if let Ok(value) = HeaderValue::from_str(&session.rotation_token) {
            headers.insert(REFRESH_HEADER_NAME, value);
        }
    }
}

/// Whether the response already deletes the named cookie.
pub fn clears_cookie(headers: &HeaderMap, name: &str) -> bool {
    let cleared = format!("{}=;", name);
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(&cleared))
}

/// Append Set-Cookie headers deleting the given cookies.
pub fn append_cleared_cookies(headers: &mut HeaderMap, names: &[&str], secure: bool) {
    for name in names {
        if let Ok(value) = HeaderValue::from_str(&clear_cookie(name, secure)) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}
