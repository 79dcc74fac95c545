//! Credential resolution for bucket-store backends
//!
//! Credentials are resolved explicitly at construction time so backends
//! carry no hidden environment or filesystem side effects; tests substitute
//! static keys and never touch the ambient chain.

use sync_core::{Error, Result};

/// Where bucket-store credentials come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Ambient chain: environment variables, profiles, instance metadata
    Ambient,

    /// Static keys taken from the storage configuration
    Static {
        access_key: String,
        secret_key: String,
    },
}

impl CredentialSource {
    /// Resolve from optional config fields.
    ///
    /// Both keys present selects static credentials; both absent selects the
    /// ambient chain; one without the other is a configuration error.
    pub fn from_config(access_key: Option<&str>, secret_key: Option<&str>) -> Result<Self> {
        match (access_key, secret_key) {
            (Some(access), Some(secret)) => Ok(CredentialSource::Static {
                access_key: access.to_string(),
                secret_key: secret.to_string(),
            }),
            (None, None) => Ok(CredentialSource::Ambient),
            _ => Err(Error::InvalidConfig {
                message: "access_key and secret_key must be provided together".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_keys_selects_static() {
        let source = CredentialSource::from_config(Some("ak"), Some("sk")).unwrap();
        assert_eq!(
            source,
            CredentialSource::Static {
                access_key: "ak".to_string(),
                secret_key: "sk".to_string(),
            }
        );
    }

    #[test]
    fn test_no_keys_selects_ambient() {
        let source = CredentialSource::from_config(None, None).unwrap();
        assert_eq!(source, CredentialSource::Ambient);
    }

    #[test]
    fn test_lone_key_is_config_error() {
        let err = CredentialSource::from_config(Some("ak"), None).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }
}
