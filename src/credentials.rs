//! Registry credentials
//!
//! Credentials are chosen once at startup: none, one static login, or a
//! list of rules matched against the image reference being pushed or
//! pulled.

use serde::{Deserialize, Serialize};

/// Default registry for references without an explicit host
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// A username/secret pair for `login`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub secret: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

// Keep secrets out of debug logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"***")
            .finish()
    }
}

/// A credential applied to references starting with `pattern`.
///
/// A trailing `*` is accepted and ignored; matching is always by prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRule {
    pub pattern: String,
    pub credential: Credential,
}

impl CredentialRule {
    fn matches(&self, reference: &str) -> bool {
        let prefix = self.pattern.trim_end_matches('*');
        reference.starts_with(prefix)
    }
}

/// How registry operations authenticate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RegistryCredentials {
    /// Anonymous access
    #[default]
    None,
    /// One credential for one registry
    Static {
        registry: String,
        credential: Credential,
    },
    /// First matching rule wins
    ByReference(Vec<CredentialRule>),
}

impl RegistryCredentials {
    /// Pick the registry and credential to use for `reference`
    pub fn select(&self, reference: &str) -> Option<(String, &Credential)> {
        let host = registry_host(reference);
        match self {
            Self::None => None,
            Self::Static {
                registry,
                credential,
            } => (*registry == host).then(|| (registry.clone(), credential)),
            Self::ByReference(rules) => rules
                .iter()
                .find(|rule| rule.matches(reference))
                .map(|rule| (host.to_string(), &rule.credential)),
        }
    }
}

/// Registry host of an image reference, following the docker convention
pub fn registry_host(reference: &str) -> &str {
    match reference.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            first
        }
        _ => DEFAULT_REGISTRY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(user: &str) -> Credential {
        Credential::new(user, "token")
    }

    #[test]
    fn registry_host_detection() {
        assert_eq!(registry_host("ghcr.io/owner/repo:tag"), "ghcr.io");
        assert_eq!(registry_host("localhost:5000/img"), "localhost:5000");
        assert_eq!(registry_host("localhost/img"), "localhost");
        assert_eq!(registry_host("library/alpine"), "docker.io");
        assert_eq!(registry_host("alpine:3.19"), "docker.io");
    }

    #[test]
    fn none_selects_nothing() {
        assert!(RegistryCredentials::None.select("ghcr.io/a/b").is_none());
    }

    #[test]
    fn static_matches_registry_only() {
        let creds = RegistryCredentials::Static {
            registry: "ghcr.io".to_string(),
            credential: cred("bot"),
        };

        let (registry, c) = creds.select("ghcr.io/owner/cache:abc").unwrap();
        assert_eq!(registry, "ghcr.io");
        assert_eq!(c.username, "bot");
        assert!(creds.select("quay.io/owner/cache:abc").is_none());
    }

    #[test]
    fn first_matching_rule_wins() {
        let creds = RegistryCredentials::ByReference(vec![
            CredentialRule {
                pattern: "ghcr.io/acme/*".to_string(),
                credential: cred("acme"),
            },
            CredentialRule {
                pattern: "ghcr.io/".to_string(),
                credential: cred("fallback"),
            },
        ]);

        assert_eq!(creds.select("ghcr.io/acme/x").unwrap().1.username, "acme");
        assert_eq!(creds.select("ghcr.io/other/x").unwrap().1.username, "fallback");
        assert!(creds.select("quay.io/acme/x").is_none());
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", Credential::new("u", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
