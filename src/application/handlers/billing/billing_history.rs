//! GetBillingHistoryHandler - lists a user's invoices.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{from_minor_units, BillingError};
use crate::ports::{PaymentProvider, ProfileStore};

pub const DEFAULT_HISTORY_LIMIT: u32 = 10;
pub const MAX_HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub struct GetBillingHistoryQuery {
    pub user_id: String,
    pub limit: Option<u32>,
}

/// One invoice, amounts in major units.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingHistoryItem {
    pub id: String,
    pub number: Option<String>,
    pub amount_paid: f64,
    pub currency: String,
    pub status: Option<String>,
    pub created: Option<Timestamp>,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf: Option<String>,
}

pub struct GetBillingHistoryHandler {
    payments: Arc<dyn PaymentProvider>,
    profiles: Arc<dyn ProfileStore>,
}

impl GetBillingHistoryHandler {
    pub fn new(payments: Arc<dyn PaymentProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { payments, profiles }
    }

    pub async fn handle(
        &self,
        query: GetBillingHistoryQuery,
    ) -> Result<Vec<BillingHistoryItem>, BillingError> {
        let user_id = UserId::new(query.user_id.trim())?;
        let limit = query
            .limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);

        let profile = self
            .profiles
            .find_by_user_id(&user_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Profile", user_id.as_str()))?;

        let Some(customer_id) = profile.customer_id() else {
            return Ok(Vec::new());
        };

        let invoices = self.payments.list_invoices(customer_id, limit).await?;
        Ok(invoices
            .into_iter()
            .map(|invoice| BillingHistoryItem {
                amount_paid: from_minor_units(invoice.amount_paid, &invoice.currency),
                id: invoice.id,
                number: invoice.number,
                currency: invoice.currency,
                status: invoice.status,
                created: invoice.created,
                period_start: invoice.period_start,
                period_end: invoice.period_end,
                hosted_invoice_url: invoice.hosted_invoice_url,
                invoice_pdf: invoice.invoice_pdf,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryProfileStore;
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::domain::subscription::UserProfile;
    use crate::ports::Invoice;

    fn invoice(id: &str, amount: i64, currency: &str) -> Invoice {
        Invoice {
            id: id.to_string(),
            number: Some(format!("NO-{}", id)),
            customer_id: Some("cus_1".to_string()),
            subscription_id: Some("sub_a".to_string()),
            amount_paid: amount,
            currency: currency.to_string(),
            status: Some("paid".to_string()),
            created: Timestamp::from_unix(Some(1_704_067_200)),
            period_start: None,
            period_end: None,
            hosted_invoice_url: None,
            invoice_pdf: None,
        }
    }

    fn setup(customer: Option<&str>) -> (MockPaymentProvider, GetBillingHistoryHandler) {
        let mock = MockPaymentProvider::new();
        let store = Arc::new(InMemoryProfileStore::new());
        let mut profile = UserProfile::minimal(UserId::new("U1").unwrap());
        profile.stripe_customer_id = customer.map(str::to_string);
        store.insert(profile);
        (mock.clone(), GetBillingHistoryHandler::new(Arc::new(mock), store))
    }

    fn query(limit: Option<u32>) -> GetBillingHistoryQuery {
        GetBillingHistoryQuery {
            user_id: "U1".to_string(),
            limit,
        }
    }

    #[tokio::test]
    async fn amounts_are_major_units() {
        let (mock, handler) = setup(Some("cus_1"));
        mock.add_invoice(invoice("in_1", 999, "usd"));
        mock.add_invoice(invoice("in_2", 1200, "jpy"));

        let items = handler.handle(query(None)).await.unwrap();
        let usd = items.iter().find(|i| i.id == "in_1").unwrap();
        let jpy = items.iter().find(|i| i.id == "in_2").unwrap();
        assert!((usd.amount_paid - 9.99).abs() < 1e-9);
        assert!((jpy.amount_paid - 1200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_customer_means_empty_history() {
        let (mock, handler) = setup(None);
        assert!(handler.handle(query(None)).await.unwrap().is_empty());
        assert!(!mock.was_called("list_invoices"));
    }

    #[tokio::test]
    async fn limit_is_clamped() {
        let (mock, handler) = setup(Some("cus_1"));
        handler.handle(query(Some(1000))).await.unwrap();
        handler.handle(query(Some(0))).await.unwrap();
        let limits: Vec<String> = mock
            .calls()
            .into_iter()
            .filter(|c| c.method == "list_invoices")
            .map(|c| c.args[1].clone())
            .collect();
        assert_eq!(limits, vec!["100".to_string(), "1".to_string()]);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (_mock, handler) = setup(None);
        let err = handler
            .handle(GetBillingHistoryQuery {
                user_id: "U2".to_string(),
                limit: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NotFound { .. }));
    }
}
