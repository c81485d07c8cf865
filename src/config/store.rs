//! Profile store configuration (Supabase)

use secrecy::SecretString;

use super::error::ValidationError;
use super::payment::is_http_url;

/// One Supabase project.
#[derive(Debug, Clone)]
pub struct StoreTarget {
    pub url: String,
    pub admin_key: SecretString,
}

/// Primary store plus an optional mirror that receives copies of every write.
#[derive(Debug, Clone)]
pub struct ProfileStoreConfig {
    pub primary: StoreTarget,
    pub mirror: Option<StoreTarget>,
}

impl ProfileStoreConfig {
    /// Validate store configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_http_url(&self.primary.url) {
            return Err(ValidationError::InvalidUrl("SUPABASE_URL"));
        }
        if let Some(mirror) = &self.mirror {
            if !is_http_url(&mirror.url) {
                return Err(ValidationError::InvalidUrl("WIZNOTE_SUPABASE_URL"));
            }
        }
        Ok(())
    }
}

/// Picks the first configured admin key, newest format first.
pub(super) fn first_key(candidates: &[Option<&String>]) -> Option<SecretString> {
    candidates
        .iter()
        .flatten()
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(|v| SecretString::new(v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn target(url: &str) -> StoreTarget {
        StoreTarget {
            url: url.to_string(),
            admin_key: SecretString::new("key".to_string()),
        }
    }

    #[test]
    fn test_first_key_prefers_earlier_candidates() {
        let new_key = "sb_secret_new".to_string();
        let legacy = "eyJ.legacy".to_string();
        let picked = first_key(&[Some(&new_key), Some(&legacy)]).unwrap();
        assert_eq!(picked.expose_secret(), "sb_secret_new");

        let blank = "  ".to_string();
        let picked = first_key(&[Some(&blank), Some(&legacy)]).unwrap();
        assert_eq!(picked.expose_secret(), "eyJ.legacy");

        assert!(first_key(&[None, None]).is_none());
    }

    #[test]
    fn test_validation_rejects_non_http_urls() {
        let config = ProfileStoreConfig {
            primary: target("db.example.com"),
            mirror: None,
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidUrl("SUPABASE_URL")));

        let config = ProfileStoreConfig {
            primary: target("https://a.supabase.co"),
            mirror: Some(target("ftp://b")),
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidUrl("WIZNOTE_SUPABASE_URL"))
        );
    }
}
