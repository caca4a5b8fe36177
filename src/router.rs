use serde::Deserialize;
use std::sync::Arc;

use crate::checkout::{CheckoutFlow, Initiated};
use crate::config::CheckoutMode;
use crate::error::CheckoutError;
use crate::notifier::{Message, Notifier};
use crate::session::{Session, SessionStore};
use crate::templates::Templates;

const SEPARATOR: char = '#';

/// Product id and display name carried by catalog buttons.
pub type ProductRef = (String, String);

/// Button postback, encoded as `command#param#param2`.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect,
    ProductCatalog,
    Buy(Option<ProductRef>),
    BuyNow(Option<ProductRef>),
    PreCheckout(Option<ProductRef>),
    ResumePurchase(Option<ProductRef>),
    UseAddress {
        id: Option<String>,
        name: Option<String>,
    },
    UseCard {
        id: Option<String>,
        name: Option<String>,
    },
    ChangeDetails,
    Checkout,
    Unknown(String),
}

impl Command {
    pub fn parse(payload: &str) -> Command {
        let mut parts = payload.splitn(3, SEPARATOR);
        let command = parts.next().unwrap_or_default().trim();
        let param = parts.next().filter(|p| !p.is_empty()).map(str::to_string);
        let param2 = parts.next().filter(|p| !p.is_empty()).map(str::to_string);
        let product = param.clone().zip(param2.clone());

        match command {
            "connect" => Command::Connect,
            "product_catalog" => Command::ProductCatalog,
            "buy" => Command::Buy(product),
            "buy_now" => Command::BuyNow(product),
            "pre_checkout" => Command::PreCheckout(product),
            "resume_purchase" => Command::ResumePurchase(product),
            "use_address" => Command::UseAddress {
                id: param,
                name: param2,
            },
            "use_card" => Command::UseCard {
                id: param,
                name: param2,
            },
            "change_details" => Command::ChangeDetails,
            "checkout" => Command::Checkout,
            other => Command::Unknown(other.to_string()),
        }
    }

    pub fn payload(&self) -> String {
        let (name, first, second) = match self {
            Command::Connect => ("connect", None, None),
            Command::ProductCatalog => ("product_catalog", None, None),
            Command::Buy(product) => ("buy", product.as_ref().map(|p| &p.0), product.as_ref().map(|p| &p.1)),
            Command::BuyNow(product) => ("buy_now", product.as_ref().map(|p| &p.0), product.as_ref().map(|p| &p.1)),
            Command::PreCheckout(product) => (
                "pre_checkout",
                product.as_ref().map(|p| &p.0),
                product.as_ref().map(|p| &p.1),
            ),
            Command::ResumePurchase(product) => (
                "resume_purchase",
                product.as_ref().map(|p| &p.0),
                product.as_ref().map(|p| &p.1),
            ),
            Command::UseAddress { id, name } => ("use_address", id.as_ref(), name.as_ref()),
            Command::UseCard { id, name } => ("use_card", id.as_ref(), name.as_ref()),
            Command::ChangeDetails => ("change_details", None, None),
            Command::Checkout => ("checkout", None, None),
            Command::Unknown(raw) => (raw.as_str(), None, None),
        };

        let mut payload = name.to_string();
        for param in [first, second].into_iter().flatten() {
            payload.push(SEPARATOR);
            payload.push_str(param);
        }
        payload
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub messaging: Vec<serde_json::Value>,
}

impl Entry {
    /// Events of this entry; ones that do not decode are logged and skipped.
    pub fn events(&self) -> impl Iterator<Item = MessagingEvent> + '_ {
        self.messaging.iter().filter_map(|raw| {
            serde_json::from_value(raw.clone())
                .map_err(|e| log::warn!("Skipping malformed messaging event {}: {}", raw, e))
                .ok()
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct Participant {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub text: Option<String>,
    #[serde(default)]
    pub is_echo: bool,
}

#[derive(Debug, Deserialize)]
pub struct PostbackEvent {
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountLinking {
    #[serde(default)]
    pub status: String,
    pub authorization_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagingEvent {
    pub sender: Participant,
    pub message: Option<InboundMessage>,
    pub postback: Option<PostbackEvent>,
    pub account_linking: Option<AccountLinking>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Text(String),
    Postback(Command),
    AccountLinked,
    AccountUnlinked,
}

impl MessagingEvent {
    pub fn classify(&self) -> Option<Event> {
        if let Some(text) = self
            .message
            .as_ref()
            .filter(|m| !m.is_echo)
            .and_then(|m| m.text.as_deref())
        {
            return Some(Event::Text(text.to_lowercase()));
        }
        if let Some(postback) = &self.postback {
            return Some(Event::Postback(Command::parse(&postback.payload)));
        }
        self.account_linking.as_ref().map(|linking| {
            if linking.authorization_code.is_some() || linking.status == "linked" {
                Event::AccountLinked
            } else {
                Event::AccountUnlinked
            }
        })
    }
}

/// Turns inbound messaging events into checkout steps and replies.
pub struct EventRouter {
    sessions: Arc<dyn SessionStore>,
    flow: CheckoutFlow,
    notifier: Arc<dyn Notifier>,
    templates: Templates,
    checkout_mode: CheckoutMode,
}

impl EventRouter {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        flow: CheckoutFlow,
        notifier: Arc<dyn Notifier>,
        templates: Templates,
        checkout_mode: CheckoutMode,
    ) -> Self {
        EventRouter {
            sessions,
            flow,
            notifier,
            templates,
            checkout_mode,
        }
    }

    /// Handles one event. Failures are logged and answered with a generic message.
    pub async fn handle(&self, event: &MessagingEvent) {
        let sender = event.sender.id.as_str();
        // Holding the record's lock for the whole event keeps one user's events in order.
        let handle = self.sessions.get(sender).await;
        let mut session = handle.lock().await;

        let Some(kind) = event.classify() else {
            log::debug!("Ignoring event from {}", sender);
            return;
        };

        if let Err(e) = self.dispatch(&mut session, kind).await {
            log::error!("Failed to handle event from {}: {}", sender, e);
            self.reply(sender, self.templates.failure()).await;
        }
    }

    async fn dispatch(&self, session: &mut Session, event: Event) -> Result<(), CheckoutError> {
        let sender = session.user_id.clone();
        match event {
            Event::Text(text) => {
                log::info!("Message Received: {}", text);
                let message = match text.trim() {
                    "login" => self.templates.login(),
                    "logout" => self.templates.logout(),
                    _ => self.templates.welcome(),
                };
                self.reply(&sender, message).await;
                Ok(())
            }
            Event::Postback(command) => self.dispatch_postback(session, command).await,
            Event::AccountLinked => {
                self.flow.link_account(session).await?;
                self.reply(&sender, self.templates.linked()).await;
                Ok(())
            }
            Event::AccountUnlinked => self.flow.unlink_account(session).await,
        }
    }

    async fn dispatch_postback(&self, session: &mut Session, command: Command) -> Result<(), CheckoutError> {
        let sender = session.user_id.clone();
        match command {
            Command::Connect => {
                self.reply(&sender, self.templates.login()).await;
                Ok(())
            }
            Command::ProductCatalog => self.show_catalog(session).await,
            Command::Buy(product) => {
                self.record_product(session, product);
                self.reply(&sender, self.templates.login()).await;
                Ok(())
            }
            Command::PreCheckout(product) | Command::ResumePurchase(product) => {
                self.record_product(session, product);
                match session.product_id.clone() {
                    Some(product_id) => self.pre_checkout(session, &product_id, false).await,
                    None => self.show_catalog(session).await,
                }
            }
            Command::BuyNow(product) => {
                self.record_product(session, product);
                match session.product_id.clone() {
                    Some(product_id) => self.pre_checkout(session, &product_id, true).await,
                    None => self.show_catalog(session).await,
                }
            }
            Command::UseAddress { id, name } => {
                if let Some(id) = id {
                    let name = name.unwrap_or_else(|| id.clone());
                    self.flow.select_address(session, id, name)?;
                }
                let context = self.flow.checkout_context(session).await?;
                self.reply(&sender, self.templates.card_carousel(&context)).await;
                Ok(())
            }
            Command::UseCard { id, name } => {
                if let Some(id) = id {
                    let name = name.unwrap_or_else(|| id.clone());
                    self.flow.select_card(session, id, name)?;
                }
                let summary = self.flow.summary(session)?;
                self.reply(&sender, self.templates.summary(&summary)).await;
                Ok(())
            }
            Command::ChangeDetails => self.show_addresses(session).await,
            Command::Checkout => self.finalize(session).await,
            Command::Unknown(raw) => {
                log::warn!("Unknown postback {:?} from {}", raw, sender);
                Ok(())
            }
        }
    }

    fn record_product(&self, session: &mut Session, product: Option<(String, String)>) {
        if let Some((id, name)) = product {
            self.flow.select_product(session, id, name);
        }
    }

    async fn show_catalog(&self, session: &mut Session) -> Result<(), CheckoutError> {
        let page = self.flow.browse_catalog(session).await?;
        let message = self.templates.product_carousel(&page.content, session.is_linked());
        self.reply(&session.user_id, message).await;
        Ok(())
    }

    async fn show_addresses(&self, session: &Session) -> Result<(), CheckoutError> {
        let context = self.flow.checkout_context(session).await?;
        self.reply(&session.user_id, self.templates.address_carousel(&context)).await;
        Ok(())
    }

    async fn pre_checkout(&self, session: &mut Session, product_id: &str, pay_now: bool) -> Result<(), CheckoutError> {
        match self.flow.initiate(session, product_id).await? {
            Initiated::Summary(_) if pay_now => self.finalize(session).await,
            Initiated::Summary(summary) => {
                self.reply(&session.user_id, self.templates.summary(&summary)).await;
                Ok(())
            }
            Initiated::NeedsDetails => self.show_addresses(session).await,
            Initiated::ReauthenticationRequired => {
                self.reply(&session.user_id, self.templates.login()).await;
                Ok(())
            }
        }
    }

    async fn finalize(&self, session: &mut Session) -> Result<(), CheckoutError> {
        let receipt = match self.checkout_mode {
            CheckoutMode::Express => self.flow.complete_express(session).await?,
            CheckoutMode::Standard => self.flow.complete_standard(session).await?,
        };
        log::debug!("Receipt for {}: {:?}", session.user_id, receipt);

        let timestamp = chrono::Utc::now().timestamp();
        match self.templates.receipt(&receipt, timestamp) {
            Some(message) => self.reply(&session.user_id, message).await,
            None => {
                log::error!("Checkout receipt for {} has no cart items", session.user_id);
                self.reply(&session.user_id, self.templates.failure()).await;
            }
        }
        Ok(())
    }

    async fn reply(&self, recipient: &str, message: Message) {
        if let Err(e) = self.notifier.send(recipient, message).await {
            log::error!("Error sending message to {}: {}", recipient, e);
        }
    }
}
