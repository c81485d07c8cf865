//! Identity directory port.
//!
//! The identity provider owns users. This service only ever asks it one
//! question: which user id has this email. Answers are best-effort.

use async_trait::async_trait;

use super::profile_store::StoreError;
use crate::domain::foundation::UserId;

/// Port for looking users up in the identity provider.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Case-insensitive email lookup. `None` if no user matches.
    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<UserId>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_directory_is_object_safe() {
        fn _accepts_dyn(_directory: &dyn IdentityDirectory) {}
    }
}
