use rust_decimal::Decimal;
use std::sync::Arc;

use crate::backend::MerchantBackend;
use crate::config::Fees;
use crate::error::{BackendError, CheckoutError};
use crate::model::{CheckoutContext, ProductPage, Receipt, cents_to_amount};
use crate::notifier::Notifier;
use crate::session::{CheckoutStage, Session};

/// Order details shown before the user confirms payment.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub product_name: String,
    pub address_name: String,
    pub card_name: String,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Initiated {
    /// Cart created and default address/card resolved.
    Summary(OrderSummary),
    /// Cart created but the wallet has no default address or card.
    NeedsDetails,
    /// The backend dropped the session; the user was logged out and must link again.
    ReauthenticationRequired,
}

/// Drives the buy flow against the merchant backend, one user session at a time.
pub struct CheckoutFlow {
    backend: Arc<dyn MerchantBackend>,
    notifier: Arc<dyn Notifier>,
    fees: Fees,
    page_size: u32,
}

impl CheckoutFlow {
    pub fn new(
        backend: Arc<dyn MerchantBackend>,
        notifier: Arc<dyn Notifier>,
        fees: Fees,
        page_size: u32,
    ) -> Self {
        CheckoutFlow {
            backend,
            notifier,
            fees,
            page_size,
        }
    }

    pub async fn browse_catalog(&self, session: &mut Session) -> Result<ProductPage, CheckoutError> {
        Ok(self.backend.list_products(session, 0, self.page_size).await?)
    }

    pub async fn checkout_context(&self, session: &Session) -> Result<CheckoutContext, CheckoutError> {
        Ok(self.backend.fetch_checkout_context(session).await?)
    }

    pub fn select_product(&self, session: &mut Session, product_id: String, product_name: String) {
        session.select_product(product_id, product_name);
    }

    pub fn select_address(
        &self,
        session: &mut Session,
        address_id: String,
        address_name: String,
    ) -> Result<(), CheckoutError> {
        session.select_address(address_id, address_name)
    }

    pub fn select_card(
        &self,
        session: &mut Session,
        card_id: String,
        card_name: String,
    ) -> Result<(), CheckoutError> {
        session.select_card(card_id, card_name)
    }

    /// Creates a cart for `product_id`, then resolves the wallet's default address and card.
    pub async fn initiate(&self, session: &mut Session, product_id: &str) -> Result<Initiated, CheckoutError> {
        let cart = self.backend.create_cart(session, product_id).await?;
        let price = cart.unit_price().ok_or(CheckoutError::MissingField {
            operation: "initiate checkout",
            field: "cart price",
        })?;
        let total = self.fees.total_for(cents_to_amount(price));
        log::info!("Created cart {} for {} (total {})", cart.id, session.user_id, total);
        session.cart_created(cart.id, total);

        let context = match self.backend.fetch_checkout_context(session).await {
            Ok(context) => context,
            Err(BackendError::SessionExpired) => {
                self.force_logout(session).await;
                return Ok(Initiated::ReauthenticationRequired);
            }
            Err(err) => return Err(err.into()),
        };

        session.clear_details();
        if let Some(address) = last_default(&context.shipping_addresses, "address", |a| a.selected_as_default) {
            session.address_id = Some(address.address_id.clone());
            session.address_name = Some(address.display_name());
        }
        if let Some(card) = last_default(&context.cards, "card", |c| c.selected_as_default) {
            session.card_id = Some(card.card_id.clone());
            session.card_name = Some(card.card_alias.clone());
        }
        session.resolve_details();

        if session.stage != CheckoutStage::DetailsResolved {
            log::warn!("No default address or card for {}", session.user_id);
            return Ok(Initiated::NeedsDetails);
        }
        Ok(Initiated::Summary(self.summary(session)?))
    }

    pub fn summary(&self, session: &Session) -> Result<OrderSummary, CheckoutError> {
        let operation = "summarize order";
        let required = |value: &Option<String>, field: &'static str| {
            value.clone().ok_or(CheckoutError::MissingField { operation, field })
        };
        Ok(OrderSummary {
            product_name: required(&session.product_name, "product name")
                .or_else(|_| required(&session.product_id, "product name"))?,
            address_name: required(&session.address_name, "address name")?,
            card_name: required(&session.card_name, "card name")?,
            total: session.total.ok_or(CheckoutError::MissingField {
                operation,
                field: "total",
            })?,
        })
    }

    pub async fn complete_express(&self, session: &mut Session) -> Result<Receipt, CheckoutError> {
        let ids = session.checkout_ids("express checkout")?;
        let receipt = self
            .backend
            .express_checkout(session, &ids.cart_id, &ids.card_id, &ids.address_id)
            .await?;
        log::info!("Express checkout of cart {} completed for {}", ids.cart_id, session.user_id);
        session.checkout_completed();
        Ok(receipt)
    }

    pub async fn complete_standard(&self, session: &mut Session) -> Result<Receipt, CheckoutError> {
        let ids = session.checkout_ids("standard checkout")?;
        let receipt = self.backend.standard_checkout(session, &ids.cart_id).await?;
        log::info!("Standard checkout of cart {} completed for {}", ids.cart_id, session.user_id);
        session.checkout_completed();
        Ok(receipt)
    }

    /// Exchanges the platform identity for a backend session token.
    pub async fn link_account(&self, session: &mut Session) -> Result<(), CheckoutError> {
        let token = self.backend.exchange_identity_for_session(&session.user_id).await?;
        session.link(token);
        Ok(())
    }

    pub async fn unlink_account(&self, session: &mut Session) -> Result<(), CheckoutError> {
        self.backend.revoke_session(&session.user_id).await?;
        log::info!("Logout successful for {}", session.user_id);
        session.unlink();
        Ok(())
    }

    async fn force_logout(&self, session: &mut Session) {
        log::warn!(
            "Backend no longer recognizes session of {}, forcing logout",
            session.user_id
        );
        session.unlink();
        if let Err(e) = self.notifier.unlink(&session.user_id).await {
            log::error!("Error logging out {}: {}", session.user_id, e);
        }
    }
}

/// Last item flagged as default. Several defaults are logged; the last one still wins.
fn last_default<'a, T>(items: &'a [T], kind: &str, is_default: impl Fn(&T) -> bool) -> Option<&'a T> {
    let mut defaults = items.iter().filter(|item| is_default(*item));
    let first = defaults.next()?;
    let mut chosen = first;
    let mut count = 1;
    for item in defaults {
        chosen = item;
        count += 1;
    }
    if count > 1 {
        log::warn!("{} {}s flagged as default, using the last one", count, kind);
    }
    Some(chosen)
}
