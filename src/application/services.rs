//! BillingServices - the wired set of ports and the sync engine.
//!
//! Handlers are cheap to build, so they are created on demand from the
//! shared ports rather than stored.

use std::sync::Arc;

use crate::application::handlers::billing::{
    CancelSubscriptionHandler, ConfirmPaymentSheetHandler, CreateCheckoutHandler,
    CreateCouponHandler, CreateCustomerHandler, CreateDiscountedPriceHandler,
    CreatePaymentSheetHandler, CreatePromotionCodeHandler, CustomerResolver,
    GetBillingHistoryHandler, HandleStripeWebhookHandler, ReactivateSubscriptionHandler,
    SubscriptionGuard, SyncPlanHandler, ValidateCouponHandler, VerifySessionHandler,
};
use crate::application::reconciler::Reconciler;
use crate::application::sync::{SyncEngine, SyncEngineConfig};
use crate::ports::{IdentityDirectory, PaymentProvider, PlanStore, ProfileStore};

/// External systems the billing flows depend on.
#[derive(Clone)]
pub struct BillingPorts {
    pub payments: Arc<dyn PaymentProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub plans: Arc<dyn PlanStore>,
    pub identity: Option<Arc<dyn IdentityDirectory>>,
    /// Echoed to clients in payment-sheet responses.
    pub publishable_key: Option<String>,
}

#[derive(Clone)]
pub struct BillingServices {
    ports: BillingPorts,
    reconciler: Reconciler,
    sync: Arc<SyncEngine>,
}

impl BillingServices {
    pub fn new(ports: BillingPorts, sync_config: SyncEngineConfig) -> Self {
        let reconciler = Reconciler::new(ports.profiles.clone());
        let sync = Arc::new(SyncEngine::new(
            ports.payments.clone(),
            ports.profiles.clone(),
            reconciler.clone(),
            sync_config,
        ));
        Self {
            ports,
            reconciler,
            sync,
        }
    }

    pub fn ports(&self) -> &BillingPorts {
        &self.ports
    }

    pub fn sync(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    fn customers(&self) -> CustomerResolver {
        CustomerResolver::new(self.ports.payments.clone(), self.ports.profiles.clone())
    }

    fn guard(&self) -> SubscriptionGuard {
        SubscriptionGuard::new(self.ports.payments.clone(), self.reconciler.clone())
    }

    pub fn create_customer_handler(&self) -> CreateCustomerHandler {
        CreateCustomerHandler::new(self.reconciler.clone(), self.customers())
    }

    pub fn create_checkout_handler(&self) -> CreateCheckoutHandler {
        CreateCheckoutHandler::new(
            self.ports.payments.clone(),
            self.reconciler.clone(),
            self.customers(),
            self.guard(),
        )
    }

    pub fn create_payment_sheet_handler(&self) -> CreatePaymentSheetHandler {
        CreatePaymentSheetHandler::new(
            self.ports.payments.clone(),
            self.reconciler.clone(),
            self.customers(),
            self.guard(),
            self.ports.publishable_key.clone(),
        )
    }

    pub fn confirm_payment_sheet_handler(&self) -> ConfirmPaymentSheetHandler {
        ConfirmPaymentSheetHandler::new(
            self.ports.payments.clone(),
            self.ports.plans.clone(),
            self.reconciler.clone(),
        )
    }

    pub fn verify_session_handler(&self) -> VerifySessionHandler {
        VerifySessionHandler::new(self.ports.payments.clone(), self.reconciler.clone())
    }

    pub fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(self.ports.payments.clone(), self.reconciler.clone())
    }

    pub fn reactivate_subscription_handler(&self) -> ReactivateSubscriptionHandler {
        ReactivateSubscriptionHandler::new(self.ports.payments.clone(), self.reconciler.clone())
    }

    pub fn billing_history_handler(&self) -> GetBillingHistoryHandler {
        GetBillingHistoryHandler::new(self.ports.payments.clone(), self.ports.profiles.clone())
    }

    pub fn sync_plan_handler(&self) -> SyncPlanHandler {
        SyncPlanHandler::new(self.ports.payments.clone(), self.ports.plans.clone())
    }

    pub fn create_coupon_handler(&self) -> CreateCouponHandler {
        CreateCouponHandler::new(self.ports.payments.clone())
    }

    pub fn create_promotion_code_handler(&self) -> CreatePromotionCodeHandler {
        CreatePromotionCodeHandler::new(self.ports.payments.clone())
    }

    pub fn create_discounted_price_handler(&self) -> CreateDiscountedPriceHandler {
        CreateDiscountedPriceHandler::new(self.ports.payments.clone())
    }

    pub fn validate_coupon_handler(&self) -> ValidateCouponHandler {
        ValidateCouponHandler::new(self.ports.payments.clone())
    }

    pub fn webhook_handler(&self) -> HandleStripeWebhookHandler {
        HandleStripeWebhookHandler::new(
            self.ports.payments.clone(),
            self.ports.profiles.clone(),
            self.ports.identity.clone(),
            self.reconciler.clone(),
        )
    }
}
