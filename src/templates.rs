use crate::checkout::OrderSummary;
use crate::config::Fees;
use crate::model::{Card, CheckoutContext, Product, Receipt, ShippingAddress, cents_to_amount};
use crate::notifier::{
    Button, Element, Message, ReceiptAddress, ReceiptElement, ReceiptSummary, ReceiptTemplate,
    Template,
};
use crate::router::Command;

const LOGO_URL: &str = "http://demo.labs.mastercard.com/apps/common-assets/mc_black_logo.png";
const WELCOME_IMAGE_URL: &str = "http://demo.labs.mastercard.com/apps/common-assets/cameras.jpg";

/// Builds every message the bot sends.
#[derive(Debug, Clone)]
pub struct Templates {
    merchant_url: String,
    fees: Fees,
}

impl Templates {
    pub fn new(merchant_url: &str, fees: Fees) -> Self {
        Templates {
            merchant_url: merchant_url.trim_end_matches('/').to_string(),
            fees,
        }
    }

    pub fn welcome(&self) -> Message {
        Message::template(Template::Generic {
            elements: vec![Element {
                title: "Welcome to AnyCamera 📷".to_string(),
                subtitle: Some("Browse our product catalog and pay with Masterpass!".to_string()),
                image_url: Some(WELCOME_IMAGE_URL.to_string()),
                buttons: vec![Button::postback(
                    "Product Catalog",
                    Command::ProductCatalog.payload(),
                )],
            }],
        })
    }

    pub fn login(&self) -> Message {
        Message::template(Template::Generic {
            elements: vec![Element {
                title: "Login to Masterpass".to_string(),
                subtitle: None,
                image_url: Some(LOGO_URL.to_string()),
                buttons: vec![Button::AccountLink {
                    url: format!("{}/example/facebook", self.merchant_url),
                }],
            }],
        })
    }

    pub fn logout(&self) -> Message {
        Message::template(Template::Generic {
            elements: vec![Element {
                title: "Log Out from Masterpass".to_string(),
                subtitle: None,
                image_url: Some(LOGO_URL.to_string()),
                buttons: vec![Button::AccountUnlink],
            }],
        })
    }

    pub fn linked(&self) -> Message {
        Message::template(Template::Button {
            text: "✔️ Masterpass linked\nYou can continue shopping now".to_string(),
            buttons: vec![Button::postback(
                "Resume Purchase",
                Command::ResumePurchase(None).payload(),
            )],
        })
    }

    pub fn failure(&self) -> Message {
        Message::text("⚠️ Something went wrong with your request. Please try again later.")
    }

    /// Linked users go straight to checkout; everyone else is asked to log in first.
    pub fn product_carousel(&self, products: &[Product], linked: bool) -> Message {
        let elements = products
            .iter()
            .map(|product| {
                let selection = Some((product.id.clone(), product.description.clone()));
                let button = if linked {
                    Button::postback("Checkout", Command::PreCheckout(selection).payload())
                } else {
                    Button::postback("Buy", Command::Buy(selection).payload())
                };
                Element {
                    title: product.description.clone(),
                    subtitle: Some(format!("${:.2}", product.price())),
                    image_url: Some(format!("{}{}", self.merchant_url, product.image_uri)),
                    buttons: vec![button],
                }
            })
            .collect();
        Message::template(Template::Generic { elements })
    }

    pub fn address_carousel(&self, context: &CheckoutContext) -> Message {
        let elements = context
            .shipping_addresses
            .iter()
            .map(|address| self.address_element(address))
            .collect();
        Message::template(Template::Generic { elements })
    }

    fn address_element(&self, address: &ShippingAddress) -> Element {
        let name = address.display_name();
        let mut subtitle = format!(
            "{} {}\n{} {}",
            address.city, address.country, address.line1, address.line2
        );
        if address.selected_as_default {
            subtitle.push_str(" [Default]");
        }
        Element {
            title: format!("📍{}", name),
            subtitle: Some(subtitle),
            image_url: address.image_uri.clone(),
            buttons: vec![Button::postback(
                format!("Ship to {}", name),
                Command::UseAddress {
                    id: Some(address.address_id.clone()),
                    name: Some(name.clone()),
                }
                .payload(),
            )],
        }
    }

    pub fn card_carousel(&self, context: &CheckoutContext) -> Message {
        let elements = context.cards.iter().map(card_element).collect();
        Message::template(Template::Generic { elements })
    }

    pub fn summary(&self, summary: &OrderSummary) -> Message {
        let text = format!(
            "Order Summary\n\n📷 {}\n\n📍 Shipping to: {}\n\n💳 Paying with: {}\n\n--\nTotal of ${:.2}",
            summary.product_name, summary.address_name, summary.card_name, summary.total
        );
        Message::template(Template::Button {
            text,
            buttons: vec![
                Button::postback("Pay with Masterpass", Command::Checkout.payload()),
                Button::postback("Change Details", Command::ChangeDetails.payload()),
            ],
        })
    }

    /// Receipt for the first cart item; `None` if the backend returned an empty cart.
    pub fn receipt(&self, receipt: &Receipt, timestamp: i64) -> Option<Message> {
        let item = receipt.first_item()?;
        let subtotal = cents_to_amount(item.unit_price);

        Some(Message::template(Template::Receipt(ReceiptTemplate {
            recipient_name: receipt.recipient_name.clone(),
            order_number: receipt.order_number(),
            currency: "USD".to_string(),
            payment_method: "Masterpass".to_string(),
            order_url: "http://www.mastercard.com".to_string(),
            timestamp,
            elements: vec![ReceiptElement {
                title: item.description.clone(),
                subtitle: "AnyCamera 35 Days Warranty Included".to_string(),
                quantity: 1,
                price: subtotal,
                currency: "USD".to_string(),
                image_url: format!("{}{}", self.merchant_url, item.image_uri),
            }],
            address: ReceiptAddress {
                street_1: receipt.line1.clone(),
                street_2: receipt.line2.clone(),
                city: receipt.city.clone(),
                state: "NA".to_string(),
                postal_code: receipt.postal_code.clone(),
                country: receipt.country.clone(),
            },
            summary: ReceiptSummary {
                subtotal,
                shipping_cost: self.fees.shipping,
                total_tax: self.fees.tax,
                total_cost: self.fees.total_for(subtotal),
            },
        })))
    }
}

fn card_element(card: &Card) -> Element {
    Element {
        title: format!("💳{}", card.card_alias),
        subtitle: Some(format!(
            "{}\nExpires {}\n{} {}",
            card.brand_name,
            card.expiry(),
            card.billing_address.city,
            card.billing_address.country
        )),
        image_url: card.image_uri.clone(),
        buttons: vec![Button::postback(
            format!("Use {}", card.card_alias),
            Command::UseCard {
                id: Some(card.card_id.clone()),
                name: Some(card.card_alias.clone()),
            }
            .payload(),
        )],
    }
}
