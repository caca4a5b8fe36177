use async_trait::async_trait;
use std::sync::Mutex;

use crate::backend::MerchantBackend;
use crate::error::{BackendError, NotifyError};
use crate::model::{
    Card, Cart, CartItem, CheckoutContext, Product, ProductPage, Receipt, ReceiptCart,
    ShippingAddress,
};
use crate::notifier::{Message, Notifier};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListProducts { page: u32, size: u32 },
    FetchCheckoutContext,
    CreateCart(String),
    ExpressCheckout {
        cart_id: String,
        card_id: String,
        address_id: String,
    },
    StandardCheckout(String),
    ExchangeIdentity(String),
    RevokeSession(String),
}

enum ContextFailure {
    Expired,
    Status(u16),
}

struct FakeState {
    calls: Vec<Call>,
    carts_created: usize,
    context: CheckoutContext,
    cart_status: Option<u16>,
    omit_cart_total: bool,
    context_failure: Option<ContextFailure>,
    checkout_status: Option<u16>,
}

/// Merchant backend double with one camera in stock and a wallet holding one
/// default address and card.
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        FakeBackend {
            state: Mutex::new(FakeState {
                calls: Vec::new(),
                carts_created: 0,
                context: CheckoutContext {
                    shipping_addresses: vec![ShippingAddress {
                        address_id: "a1".to_string(),
                        shipping_alias: Some("Home".to_string()),
                        city: "Dublin".to_string(),
                        country: "IE".to_string(),
                        selected_as_default: true,
                        ..Default::default()
                    }],
                    cards: vec![Card {
                        card_id: "k1".to_string(),
                        card_alias: "Work".to_string(),
                        brand_name: "Mastercard".to_string(),
                        selected_as_default: true,
                        ..Default::default()
                    }],
                },
                cart_status: None,
                omit_cart_total: false,
                context_failure: None,
                checkout_status: None,
            }),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn set_context(&self, context: CheckoutContext) {
        self.state.lock().unwrap().context = context;
    }

    pub fn reject_cart(&self, status: u16) {
        self.state.lock().unwrap().cart_status = Some(status);
    }

    /// Carts come back without a `total`, leaving only the item price.
    pub fn omit_cart_total(&self) {
        self.state.lock().unwrap().omit_cart_total = true;
    }

    pub fn expire_session(&self) {
        self.state.lock().unwrap().context_failure = Some(ContextFailure::Expired);
    }

    pub fn reject_context(&self, status: u16) {
        self.state.lock().unwrap().context_failure = Some(ContextFailure::Status(status));
    }

    pub fn reject_checkout(&self, status: u16) {
        self.state.lock().unwrap().checkout_status = Some(status);
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn checkout(&self, call: Call) -> Result<Receipt, BackendError> {
        self.record(call);
        if let Some(status) = self.state.lock().unwrap().checkout_status {
            return Err(rejected(status));
        }
        Ok(Receipt {
            recipient_name: "Jane Doe".to_string(),
            order_number: serde_json::json!("ORD-1"),
            line1: "1 Main St".to_string(),
            city: "Dublin".to_string(),
            country: "IE".to_string(),
            cart: ReceiptCart {
                cart_items: vec![camera_item()],
            },
            ..Default::default()
        })
    }
}

fn rejected(status: u16) -> BackendError {
    BackendError::Rejected {
        status,
        body: String::new(),
    }
}

fn camera_item() -> CartItem {
    CartItem {
        description: "Camera".to_string(),
        unit_price: 2999,
        image_uri: "/img/camera.png".to_string(),
    }
}

#[async_trait]
impl MerchantBackend for FakeBackend {
    async fn list_products(
        &self,
        session: &mut Session,
        page: u32,
        size: u32,
    ) -> Result<ProductPage, BackendError> {
        self.record(Call::ListProducts { page, size });
        session.xsrf_token = Some("xsrf-1".to_string());
        Ok(ProductPage {
            content: vec![Product {
                id: "p1".to_string(),
                description: "Camera".to_string(),
                unit_price: 2999,
                image_uri: "/img/camera.png".to_string(),
            }],
        })
    }

    async fn fetch_checkout_context(&self, _session: &Session) -> Result<CheckoutContext, BackendError> {
        self.record(Call::FetchCheckoutContext);
        let state = self.state.lock().unwrap();
        match state.context_failure {
            Some(ContextFailure::Expired) => Err(BackendError::SessionExpired),
            Some(ContextFailure::Status(status)) => Err(rejected(status)),
            None => Ok(state.context.clone()),
        }
    }

    async fn create_cart(&self, _session: &Session, product_id: &str) -> Result<Cart, BackendError> {
        self.record(Call::CreateCart(product_id.to_string()));
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.cart_status {
            return Err(rejected(status));
        }
        state.carts_created += 1;
        Ok(Cart {
            id: format!("cart-{}", state.carts_created),
            total: (!state.omit_cart_total).then_some(2999),
            cart_items: vec![camera_item()],
        })
    }

    async fn express_checkout(
        &self,
        _session: &Session,
        cart_id: &str,
        card_id: &str,
        address_id: &str,
    ) -> Result<Receipt, BackendError> {
        self.checkout(Call::ExpressCheckout {
            cart_id: cart_id.to_string(),
            card_id: card_id.to_string(),
            address_id: address_id.to_string(),
        })
    }

    async fn standard_checkout(&self, _session: &Session, cart_id: &str) -> Result<Receipt, BackendError> {
        self.checkout(Call::StandardCheckout(cart_id.to_string()))
    }

    async fn exchange_identity_for_session(&self, user_id: &str) -> Result<String, BackendError> {
        self.record(Call::ExchangeIdentity(user_id.to_string()));
        Ok(format!("token-{}", user_id))
    }

    async fn revoke_session(&self, user_id: &str) -> Result<(), BackendError> {
        self.record(Call::RevokeSession(user_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Message)>>,
    unlinked: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, Message)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn unlinked(&self) -> Vec<String> {
        self.unlinked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, message: Message) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((recipient.to_string(), message));
        Ok(())
    }

    async fn unlink(&self, recipient: &str) -> Result<(), NotifyError> {
        self.unlinked.lock().unwrap().push(recipient.to_string());
        Ok(())
    }
}
