//! Reading and writing the routing cookie.

use crate::config::StickyConfig;
use std::fmt;
use std::time::Duration;

/// Find a cookie value across one or more `Cookie` header values.
///
/// Names compare case-insensitively; the first occurrence wins.
pub fn find_cookie<'a, I>(headers: I, name: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    headers
        .into_iter()
        .flat_map(|header| header.split([';', ',']))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

/// A `Set-Cookie` carrying a routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: String,
    /// `None` for a session cookie.
    pub max_age: Option<Duration>,
    pub secure: bool,
    pub httponly: bool,
}

impl SetCookie {
    /// Build the routing cookie for `value` from the group's settings.
    pub fn new(config: &StickyConfig, value: impl Into<String>) -> Self {
        Self {
            name: config.cookie_name.clone(),
            value: value.into(),
            domain: (!config.cookie_domain.is_empty()).then(|| config.cookie_domain.clone()),
            path: config.cookie_path.clone(),
            max_age: config.cookie_expires,
            secure: config.secure,
            httponly: config.httponly,
        }
    }
}

/// Renders the `Set-Cookie` header value.
impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        write!(f, "; Path={}", self.path)?;
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age.as_secs())?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.httponly {
            f.write_str("; HttpOnly")?;
        }
        Ok(())
    }
}

/// Where the host wants routing cookies delivered.
pub trait CookieSink {
    fn set_cookie(&mut self, cookie: SetCookie);
}

impl CookieSink for Vec<SetCookie> {
    fn set_cookie(&mut self, cookie: SetCookie) {
        self.push(cookie);
    }
}
