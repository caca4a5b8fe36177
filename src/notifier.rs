use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::NotifyError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Text { text: String },
    Attachment { attachment: Attachment },
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text { text: text.into() }
    }

    pub fn template(payload: Template) -> Self {
        Message::Attachment {
            attachment: Attachment {
                kind: "template",
                payload,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub payload: Template,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "template_type", rename_all = "snake_case")]
pub enum Template {
    Generic { elements: Vec<Element> },
    Button { text: String, buttons: Vec<Button> },
    Receipt(ReceiptTemplate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Button {
    Postback { title: String, payload: String },
    AccountLink { url: String },
    AccountUnlink,
}

impl Button {
    pub fn postback(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Button::Postback {
            title: title.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptTemplate {
    pub recipient_name: String,
    pub order_number: String,
    pub currency: String,
    pub payment_method: String,
    pub order_url: String,
    pub timestamp: i64,
    pub elements: Vec<ReceiptElement>,
    pub address: ReceiptAddress,
    pub summary: ReceiptSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptElement {
    pub title: String,
    pub subtitle: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub currency: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptAddress {
    pub street_1: String,
    pub street_2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptSummary {
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub shipping_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_cost: Decimal,
}

/// Outbound side of the messaging platform.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, message: Message) -> Result<(), NotifyError>;

    /// Asks the platform to drop the account link for `recipient`.
    async fn unlink(&self, recipient: &str) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct Envelope<'a> {
    recipient: Recipient<'a>,
    message: &'a Message,
}

#[derive(Serialize)]
struct Recipient<'a> {
    id: &'a str,
}

/// Messenger Send API client.
pub struct MessengerNotifier {
    client: Client,
    graph_url: String,
    access_token: String,
}

impl MessengerNotifier {
    pub fn new(client: Client, graph_url: &str, access_token: &str) -> Self {
        MessengerNotifier {
            client,
            graph_url: graph_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    async fn post<T: Serialize + Sync + ?Sized>(&self, path: &str, body: &T) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}{}", self.graph_url, path))
            .query(&[("access_token", &self.access_token)])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for MessengerNotifier {
    async fn send(&self, recipient: &str, message: Message) -> Result<(), NotifyError> {
        log::info!("Sending message to: {}", recipient);
        let envelope = Envelope {
            recipient: Recipient { id: recipient },
            message: &message,
        };
        self.post("/me/messages", &envelope).await
    }

    async fn unlink(&self, recipient: &str) -> Result<(), NotifyError> {
        log::info!("Unlinking account for: {}", recipient);
        self.post("/me/unlink_accounts", &serde_json::json!({ "psid": recipient }))
            .await
    }
}
