//! The `sticky` directive.
//!
//! Accepts the nginx-style argument line
//!
//! ```text
//! sticky name=route domain=.example.com path=/ expires=1h secure httponly
//!        hash=index|md5|sha1 | text=raw|md5|sha1 | hmac=md5|sha1 hmac_key=secret
//!        no_fallback lb_alg=rr|lc
//! ```
//!
//! or the same keys as a YAML map. Both forms resolve through
//! [`StickyArgs::finish`], which enforces that at most one identity mode is
//! chosen and that an HMAC key accompanies (and only accompanies) `hmac=`.

use crate::config::types::{Algorithm, DigestAlgorithm, Identity, StickyConfig};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors in a sticky directive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error("a value must be provided to \"{0}=\"")]
    MissingValue(&'static str),

    #[error("wrong value for \"{key}=\": {expected}")]
    InvalidValue {
        key: &'static str,
        expected: &'static str,
    },

    #[error("invalid value for \"expires=\": {0}")]
    InvalidExpires(String),

    #[error("invalid argument ({0})")]
    InvalidArgument(String),

    #[error("please choose between \"hash=\", \"hmac=\" and \"text=\"")]
    ConflictingIdentity,

    #[error("please specify \"hmac_key=\" when using \"hmac\"")]
    MissingHmacKey,

    #[error("\"hmac_key=\" is meaningless when \"hmac=\" is not used")]
    MeaninglessHmacKey,
}

/// Value of `hash=`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    Index,
    Md5,
    Sha1,
}

/// Value of `text=`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextMode {
    Raw,
    Md5,
    Sha1,
}

/// Raw, unvalidated sticky arguments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StickyArgs {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, with = "crate::config::types::option_humantime_serde")]
    pub expires: Option<Duration>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub httponly: bool,
    #[serde(default)]
    pub hash: Option<HashMode>,
    #[serde(default)]
    pub text: Option<TextMode>,
    #[serde(default)]
    pub hmac: Option<DigestAlgorithm>,
    #[serde(default)]
    pub hmac_key: Option<String>,
    #[serde(default)]
    pub no_fallback: bool,
    #[serde(default)]
    pub lb_alg: Option<Algorithm>,
}

impl StickyArgs {
    /// Parse a directive line. A leading `sticky` keyword is accepted.
    pub fn parse(line: &str) -> Result<Self, DirectiveError> {
        let mut args = StickyArgs::default();
        let mut tokens = line.split_whitespace().peekable();

        if tokens.peek() == Some(&"sticky") {
            tokens.next();
        }

        for token in tokens {
            match token.split_once('=') {
                Some((key, value)) => args.apply(token, key, value)?,
                None => match token {
                    "secure" => args.secure = true,
                    "httponly" => args.httponly = true,
                    "no_fallback" => args.no_fallback = true,
                    _ => return Err(DirectiveError::InvalidArgument(token.to_string())),
                },
            }
        }

        Ok(args)
    }

    fn apply(&mut self, token: &str, key: &str, value: &str) -> Result<(), DirectiveError> {
        let key: &'static str = match key {
            "name" => "name",
            "domain" => "domain",
            "path" => "path",
            "expires" => "expires",
            "hash" => "hash",
            "text" => "text",
            "hmac" => "hmac",
            "hmac_key" => "hmac_key",
            "lb_alg" => "lb_alg",
            _ => return Err(DirectiveError::InvalidArgument(token.to_string())),
        };

        if value.is_empty() {
            return Err(DirectiveError::MissingValue(key));
        }

        match key {
            "name" => self.name = Some(value.to_string()),
            "domain" => self.domain = Some(value.to_string()),
            "path" => self.path = Some(value.to_string()),
            "hmac_key" => self.hmac_key = Some(value.to_string()),
            "expires" => {
                let expires = humantime::parse_duration(value)
                    .map_err(|_| DirectiveError::InvalidExpires(value.to_string()))?;
                self.expires = Some(expires);
            }
            "hash" => {
                self.hash = Some(match value {
                    "index" => HashMode::Index,
                    "md5" => HashMode::Md5,
                    "sha1" => HashMode::Sha1,
                    _ => return Err(invalid(key, "index, md5 or sha1")),
                });
            }
            "text" => {
                self.text = Some(match value {
                    "raw" => TextMode::Raw,
                    "md5" => TextMode::Md5,
                    "sha1" => TextMode::Sha1,
                    _ => return Err(invalid(key, "raw, md5 or sha1")),
                });
            }
            "hmac" => {
                self.hmac = Some(match value {
                    "md5" => DigestAlgorithm::Md5,
                    "sha1" => DigestAlgorithm::Sha1,
                    _ => return Err(invalid(key, "md5 or sha1")),
                });
            }
            _ => {
                self.lb_alg = Some(match value {
                    "rr" => Algorithm::RoundRobin,
                    "lc" => Algorithm::LeastConnections,
                    _ => return Err(invalid(key, "rr or lc")),
                });
            }
        }

        Ok(())
    }

    /// Validate the arguments and fill in defaults.
    ///
    /// With no identity mode chosen the cookie carries an MD5 digest.
    pub fn finish(self) -> Result<StickyConfig, DirectiveError> {
        let modes = [self.hash.is_some(), self.text.is_some(), self.hmac.is_some()];
        if modes.iter().filter(|&&chosen| chosen).count() > 1 {
            return Err(DirectiveError::ConflictingIdentity);
        }

        let non_empty = [
            ("name", &self.name),
            ("domain", &self.domain),
            ("path", &self.path),
            ("hmac_key", &self.hmac_key),
        ];
        for (key, value) in non_empty {
            if value.as_deref() == Some("") {
                return Err(DirectiveError::MissingValue(key));
            }
        }

        if let Some(expires) = self.expires {
            if expires < Duration::from_secs(1) {
                return Err(DirectiveError::InvalidExpires(
                    humantime::format_duration(expires).to_string(),
                ));
            }
        }

        if self.hmac_key.is_some() && self.hmac.is_none() {
            return Err(DirectiveError::MeaninglessHmacKey);
        }

        let identity = match (self.hash, self.text, self.hmac) {
            (Some(HashMode::Index), _, _) => Identity::Index,
            (Some(HashMode::Md5), _, _) => Identity::Hash(DigestAlgorithm::Md5),
            (Some(HashMode::Sha1), _, _) => Identity::Hash(DigestAlgorithm::Sha1),
            (None, Some(TextMode::Raw), _) => Identity::Text(None),
            (None, Some(TextMode::Md5), _) => Identity::Text(Some(DigestAlgorithm::Md5)),
            (None, Some(TextMode::Sha1), _) => Identity::Text(Some(DigestAlgorithm::Sha1)),
            (None, None, Some(algorithm)) => Identity::Hmac {
                algorithm,
                key: self.hmac_key.ok_or(DirectiveError::MissingHmacKey)?,
            },
            (None, None, None) => Identity::Hash(DigestAlgorithm::Md5),
        };

        let defaults = StickyConfig::default();
        Ok(StickyConfig {
            cookie_name: self.name.unwrap_or(defaults.cookie_name),
            cookie_domain: self.domain.unwrap_or(defaults.cookie_domain),
            cookie_path: self.path.unwrap_or(defaults.cookie_path),
            cookie_expires: self.expires,
            secure: self.secure,
            httponly: self.httponly,
            identity,
            no_fallback: self.no_fallback,
            lb_alg: self.lb_alg.unwrap_or_default(),
        })
    }
}

fn invalid(key: &'static str, expected: &'static str) -> DirectiveError {
    DirectiveError::InvalidValue { key, expected }
}

/// The two accepted YAML shapes of `sticky:`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StickySource {
    Directive(String),
    Args(StickyArgs),
}

impl TryFrom<StickySource> for StickyConfig {
    type Error = DirectiveError;

    fn try_from(source: StickySource) -> Result<Self, Self::Error> {
        match source {
            StickySource::Directive(line) => StickyArgs::parse(&line)?.finish(),
            StickySource::Args(args) => args.finish(),
        }
    }
}

impl StickyConfig {
    /// Parse and validate a directive line.
    pub fn from_directive(line: &str) -> Result<Self, DirectiveError> {
        StickyArgs::parse(line)?.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_directive() {
        let config = StickyConfig::from_directive(
            "sticky name=srv domain=.example.com path=/app expires=1h secure httponly hash=sha1 no_fallback lb_alg=lc",
        )
        .unwrap();

        assert_eq!(config.cookie_name, "srv");
        assert_eq!(config.cookie_domain, ".example.com");
        assert_eq!(config.cookie_path, "/app");
        assert_eq!(config.cookie_expires, Some(Duration::from_secs(3600)));
        assert!(config.secure);
        assert!(config.httponly);
        assert_eq!(config.identity, Identity::Hash(DigestAlgorithm::Sha1));
        assert!(config.no_fallback);
        assert_eq!(config.lb_alg, Algorithm::LeastConnections);
    }

    #[test]
    fn test_empty_directive_defaults_to_md5() {
        let config = StickyConfig::from_directive("sticky").unwrap();
        assert_eq!(config, StickyConfig::default());
    }

    #[test]
    fn test_index_mode() {
        let config = StickyConfig::from_directive("hash=index").unwrap();
        assert_eq!(config.identity, Identity::Index);
        assert!(!config.identity.uses_digest());
    }

    #[test]
    fn test_text_modes() {
        let raw = StickyConfig::from_directive("text=raw").unwrap();
        assert_eq!(raw.identity, Identity::Text(None));

        let md5 = StickyConfig::from_directive("text=md5").unwrap();
        assert_eq!(md5.identity, Identity::Text(Some(DigestAlgorithm::Md5)));
    }

    #[test]
    fn test_hmac_requires_key() {
        let err = StickyConfig::from_directive("hmac=sha1").unwrap_err();
        assert_eq!(err, DirectiveError::MissingHmacKey);

        let config = StickyConfig::from_directive("hmac=sha1 hmac_key=secret").unwrap();
        assert_eq!(
            config.identity,
            Identity::Hmac {
                algorithm: DigestAlgorithm::Sha1,
                key: "secret".to_string()
            }
        );
    }

    #[test]
    fn test_hmac_key_without_hmac() {
        let err = StickyConfig::from_directive("hash=md5 hmac_key=secret").unwrap_err();
        assert_eq!(err, DirectiveError::MeaninglessHmacKey);
    }

    #[test]
    fn test_conflicting_modes() {
        for line in ["hash=md5 text=raw", "text=raw hmac=md5 hmac_key=k", "hmac=md5 hmac_key=k hash=sha1"] {
            let err = StickyConfig::from_directive(line).unwrap_err();
            assert_eq!(err, DirectiveError::ConflictingIdentity, "line: {line}");
        }
    }

    #[test]
    fn test_missing_values() {
        assert_eq!(
            StickyConfig::from_directive("name=").unwrap_err(),
            DirectiveError::MissingValue("name")
        );
        assert_eq!(
            StickyConfig::from_directive("lb_alg=").unwrap_err(),
            DirectiveError::MissingValue("lb_alg")
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            StickyConfig::from_directive("hash=crc32").unwrap_err(),
            DirectiveError::InvalidValue { key: "hash", .. }
        ));
        assert!(matches!(
            StickyConfig::from_directive("lb_alg=random").unwrap_err(),
            DirectiveError::InvalidValue { key: "lb_alg", .. }
        ));
        assert!(matches!(
            StickyConfig::from_directive("expires=soon").unwrap_err(),
            DirectiveError::InvalidExpires(_)
        ));
        assert!(matches!(
            StickyConfig::from_directive("expires=500ms").unwrap_err(),
            DirectiveError::InvalidExpires(_)
        ));
    }

    #[test]
    fn test_unknown_argument() {
        assert_eq!(
            StickyConfig::from_directive("sticky bogus").unwrap_err(),
            DirectiveError::InvalidArgument("bogus".to_string())
        );
        assert_eq!(
            StickyConfig::from_directive("color=red").unwrap_err(),
            DirectiveError::InvalidArgument("color=red".to_string())
        );
    }

    #[test]
    fn test_map_form() {
        let yaml = r#"
name: srv
hmac: md5
hmac_key: topsecret
lb_alg: lc
expires: 2h
"#;
        let config: StickyConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cookie_name, "srv");
        assert_eq!(config.cookie_expires, Some(Duration::from_secs(7200)));
        assert_eq!(config.lb_alg, Algorithm::LeastConnections);
        assert!(matches!(config.identity, Identity::Hmac { .. }));
    }

    #[test]
    fn test_map_form_conflict_is_rejected() {
        let yaml = "hash: md5\ntext: raw\n";
        assert!(serde_yaml::from_str::<StickyConfig>(yaml).is_err());
    }
}
