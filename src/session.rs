use async_trait::async_trait;
use rust_decimal::Decimal;
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::sync::{Mutex, RwLock};

use crate::error::CheckoutError;

/// Where a user is in the buy flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutStage {
    #[default]
    Anonymous,
    Linked,
    ProductSelected,
    CartCreated,
    DetailsResolved,
    CheckoutComplete,
}

impl fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckoutStage::Anonymous => "anonymous",
            CheckoutStage::Linked => "linked",
            CheckoutStage::ProductSelected => "product selected",
            CheckoutStage::CartCreated => "cart created",
            CheckoutStage::DetailsResolved => "details resolved",
            CheckoutStage::CheckoutComplete => "checkout complete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user_id: String,
    pub stage: CheckoutStage,
    pub session_token: Option<String>,
    pub xsrf_token: Option<String>,
    pub cart_id: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub address_id: Option<String>,
    pub address_name: Option<String>,
    pub card_id: Option<String>,
    pub card_name: Option<String>,
    pub total: Option<Decimal>,
}

/// Ids needed by either checkout call.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutIds {
    pub cart_id: String,
    pub card_id: String,
    pub address_id: String,
}

impl Session {
    pub fn new(user_id: &str) -> Self {
        Session {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }

    pub fn is_linked(&self) -> bool {
        self.session_token.is_some()
    }

    pub fn link(&mut self, session_token: String) {
        self.session_token = Some(session_token);
        self.stage = if self.product_id.is_some() {
            CheckoutStage::ProductSelected
        } else {
            CheckoutStage::Linked
        };
    }

    pub fn unlink(&mut self) {
        self.session_token = None;
        self.stage = CheckoutStage::Anonymous;
    }

    pub fn select_product(&mut self, product_id: String, product_name: String) {
        self.product_id = Some(product_id);
        self.product_name = Some(product_name);
        if self.is_linked() {
            self.stage = CheckoutStage::ProductSelected;
        }
    }

    pub fn cart_created(&mut self, cart_id: String, total: Decimal) {
        self.cart_id = Some(cart_id);
        self.total = Some(total);
        self.stage = CheckoutStage::CartCreated;
    }

    /// Forgets the address and card of an earlier cart; a cart only keeps details it was given.
    pub fn clear_details(&mut self) {
        self.address_id = None;
        self.address_name = None;
        self.card_id = None;
        self.card_name = None;
        if self.stage == CheckoutStage::DetailsResolved {
            self.stage = CheckoutStage::CartCreated;
        }
    }

    pub fn select_address(&mut self, address_id: String, address_name: String) -> Result<(), CheckoutError> {
        self.require_cart("select address")?;
        self.address_id = Some(address_id);
        self.address_name = Some(address_name);
        self.resolve_details();
        Ok(())
    }

    pub fn select_card(&mut self, card_id: String, card_name: String) -> Result<(), CheckoutError> {
        self.require_cart("select card")?;
        self.card_id = Some(card_id);
        self.card_name = Some(card_name);
        self.resolve_details();
        Ok(())
    }

    /// Moves a cart-holding session to `DetailsResolved` once address and card are known.
    pub fn resolve_details(&mut self) {
        let has_cart = matches!(
            self.stage,
            CheckoutStage::CartCreated | CheckoutStage::DetailsResolved
        );
        if has_cart && self.address_id.is_some() && self.card_id.is_some() {
            self.stage = CheckoutStage::DetailsResolved;
        }
    }

    pub fn checkout_completed(&mut self) {
        self.cart_id = None;
        self.stage = CheckoutStage::CheckoutComplete;
    }

    /// Ids for a checkout call; fails on the first missing one before any stage check.
    pub fn checkout_ids(&self, operation: &'static str) -> Result<CheckoutIds, CheckoutError> {
        let field = |value: &Option<String>, field: &'static str| {
            value
                .clone()
                .ok_or(CheckoutError::MissingField { operation, field })
        };
        let ids = CheckoutIds {
            cart_id: field(&self.cart_id, "cart id")?,
            card_id: field(&self.card_id, "card id")?,
            address_id: field(&self.address_id, "address id")?,
        };
        if self.stage != CheckoutStage::DetailsResolved {
            return Err(CheckoutError::InvalidTransition {
                operation,
                stage: self.stage,
            });
        }
        Ok(ids)
    }

    fn require_cart(&self, operation: &'static str) -> Result<(), CheckoutError> {
        if self.cart_id.is_none() {
            return Err(CheckoutError::MissingField {
                operation,
                field: "cart id",
            });
        }
        match self.stage {
            CheckoutStage::CartCreated | CheckoutStage::DetailsResolved => Ok(()),
            stage => Err(CheckoutError::InvalidTransition { operation, stage }),
        }
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Per-user session records. `get` creates on first touch and afterwards always
/// hands back the same record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, user_id: &str) -> SessionHandle;
    async fn set(&self, user_id: &str, session: Session);
    async fn delete(&self, user_id: &str);
}

#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(user_id) {
            return handle.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(user_id))))
            .clone()
    }

    async fn set(&self, user_id: &str, session: Session) {
        let handle = self.get(user_id).await;
        *handle.lock().await = session;
    }

    async fn delete(&self, user_id: &str) {
        self.sessions.write().await.remove(user_id);
    }
}
