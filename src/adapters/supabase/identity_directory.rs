//! Supabase Auth admin user list as an IdentityDirectory.
//!
//! The admin API has no email filter, so lookups page through users. The
//! scan is bounded and its answer is never authoritative.

use async_trait::async_trait;
use serde::Deserialize;

use super::client::SupabaseClient;
use crate::domain::foundation::UserId;
use crate::ports::{IdentityDirectory, StoreError};

/// Users fetched per admin API page.
pub const PAGE_SIZE: usize = 1000;

/// Pages scanned before giving up.
pub const MAX_PAGES: usize = 10;

#[derive(Debug, Clone)]
pub struct SupabaseIdentityDirectory {
    client: SupabaseClient,
}

#[derive(Debug, Deserialize)]
struct AdminUserPage {
    #[serde(default)]
    users: Vec<AdminUser>,
}

#[derive(Debug, Deserialize)]
struct AdminUser {
    id: String,
    email: Option<String>,
}

impl SupabaseIdentityDirectory {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

fn match_in_page(users: &[AdminUser], email: &str) -> Option<String> {
    users
        .iter()
        .find(|u| {
            u.email
                .as_deref()
                .map_or(false, |e| e.trim().eq_ignore_ascii_case(email))
        })
        .map(|u| u.id.clone())
}

#[async_trait]
impl IdentityDirectory for SupabaseIdentityDirectory {
    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<UserId>, StoreError> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(None);
        }

        for page in 1..=MAX_PAGES {
            let batch: AdminUserPage = self
                .client
                .get_path(
                    "auth/v1/admin/users",
                    &[("page", page.to_string()), ("per_page", PAGE_SIZE.to_string())],
                )
                .await?;

            if let Some(id) = match_in_page(&batch.users, email) {
                return UserId::new(id)
                    .map(Some)
                    .map_err(|e| StoreError::decode(e.to_string()));
            }
            if batch.users.len() < PAGE_SIZE {
                return Ok(None);
            }
        }

        tracing::warn!(max_pages = MAX_PAGES, "Identity scan hit page limit without a match");
        Ok(None)
    }
}
