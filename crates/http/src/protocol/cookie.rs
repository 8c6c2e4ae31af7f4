//! `Set-Cookie` parsing.
//!
//! Cookies are collected per response only; persisting them across requests
//! is left to the caller.

use std::collections::HashMap;
use std::collections::hash_map;
use std::ops::Index;

use http::HeaderMap;
use http::header::SET_COOKIE;
use tracing::debug;

/// A cookie received through a `Set-Cookie` header or trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    attributes: Vec<(String, Option<String>)>,
}

impl Cookie {
    /// Parses a `Set-Cookie` field value such as `id=a3fWa; Path=/; HttpOnly`.
    ///
    /// Returns `None` when the leading `name=value` pair is missing or the name is empty.
    pub fn parse(header_value: &str) -> Option<Cookie> {
        let mut parts = header_value.split(';');
        let (name, value) = parts.next()?.split_once('=')?;

        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let value = value.trim();
        let value = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);

        let attributes = parts
            .map(str::trim)
            .filter(|attr| !attr.is_empty())
            .map(|attr| match attr.split_once('=') {
                Some((key, value)) => (key.trim().to_string(), Some(value.trim().to_string())),
                None => (attr.to_string(), None),
            })
            .collect();

        Some(Cookie { name: name.to_string(), value: value.to_string(), attributes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Looks up an attribute by case-insensitive name.
    ///
    /// The outer `Option` tells whether the attribute is present, the inner one
    /// holds its value (flags such as `Secure` have none). The last occurrence wins.
    pub fn attribute(&self, name: &str) -> Option<Option<&str>> {
        self.attributes.iter().rev().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_deref())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.attributes.iter().map(|(key, value)| (key.as_str(), value.as_deref()))
    }

    pub fn path(&self) -> Option<&str> {
        self.attribute("Path").flatten()
    }

    pub fn domain(&self) -> Option<&str> {
        self.attribute("Domain").flatten()
    }

    pub fn expires(&self) -> Option<&str> {
        self.attribute("Expires").flatten()
    }

    pub fn max_age(&self) -> Option<i64> {
        self.attribute("Max-Age").flatten().and_then(|value| value.parse().ok())
    }

    pub fn same_site(&self) -> Option<&str> {
        self.attribute("SameSite").flatten()
    }

    pub fn secure(&self) -> bool {
        self.attribute("Secure").is_some()
    }

    pub fn http_only(&self) -> bool {
        self.attribute("HttpOnly").is_some()
    }
}

/// Cookies of one response, keyed by name. A later cookie replaces an earlier one with the same name.
#[derive(Debug, Clone, Default)]
pub struct Cookies {
    cookies: HashMap<String, Cookie>,
}

impl Cookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.get(name)
    }

    pub fn insert(&mut self, cookie: Cookie) -> Option<Cookie> {
        self.cookies.insert(cookie.name.clone(), cookie)
    }

    /// Parses every `Set-Cookie` field of `headers`, in order.
    pub fn extend_from_headers(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            match value.to_str().ok().and_then(Cookie::parse) {
                Some(cookie) => {
                    self.insert(cookie);
                }
                None => debug!(value = ?value, "skip malformed set-cookie"),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> hash_map::Values<'_, String, Cookie> {
        self.cookies.values()
    }
}

impl Index<&str> for Cookies {
    type Output = Cookie;

    /// # Panics
    ///
    /// Panics if there is no cookie named `name`, use [`Cookies::get`] to check.
    fn index(&self, name: &str) -> &Cookie {
        match self.get(name) {
            Some(cookie) => cookie,
            None => panic!("no cookie named {name:?}"),
        }
    }
}

impl<'a> IntoIterator for &'a Cookies {
    type Item = &'a Cookie;
    type IntoIter = hash_map::Values<'a, String, Cookie>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn parse_simple() {
        let cookie = Cookie::parse("test=passed").unwrap();
        assert_eq!(cookie.name(), "test");
        assert_eq!(cookie.value(), "passed");
        assert_eq!(cookie.attributes().count(), 0);
    }

    #[test]
    fn parse_attributes() {
        let cookie =
            Cookie::parse(r#"sid="a3fWa"; Path=/docs; Domain=example.org; Max-Age=3600; Secure; HttpOnly; SameSite=Lax"#).unwrap();

        assert_eq!(cookie.name(), "sid");
        assert_eq!(cookie.value(), "a3fWa");
        assert_eq!(cookie.path(), Some("/docs"));
        assert_eq!(cookie.domain(), Some("example.org"));
        assert_eq!(cookie.max_age(), Some(3600));
        assert_eq!(cookie.same_site(), Some("Lax"));
        assert!(cookie.secure());
        assert!(cookie.http_only());
        assert_eq!(cookie.expires(), None);
        assert_eq!(cookie.attribute("secure"), Some(None));
    }

    #[test]
    fn parse_rejects_missing_name() {
        assert!(Cookie::parse("=value").is_none());
        assert!(Cookie::parse("no-equals-sign").is_none());
        assert!(Cookie::parse("").is_none());
    }

    #[test]
    fn empty_value_is_allowed() {
        let cookie = Cookie::parse("flag=; Path=/").unwrap();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn last_write_wins() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("test=first"));
        headers.append(SET_COOKIE, HeaderValue::from_static("other=1"));
        headers.append(SET_COOKIE, HeaderValue::from_static("test=second; Path=/"));

        let mut cookies = Cookies::new();
        cookies.extend_from_headers(&headers);

        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies.get("test").unwrap().value(), "second");
        assert_eq!(cookies.get("other").unwrap().value(), "1");

        let mut trailers = HeaderMap::new();
        trailers.append(SET_COOKIE, HeaderValue::from_static("test=passed"));
        cookies.extend_from_headers(&trailers);

        assert_eq!(cookies.get("test").unwrap().value(), "passed");
        assert_eq!(cookies.get("test").unwrap().path(), None);
    }
}
