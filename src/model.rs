use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

/// Merchant ids arrive as JSON strings or numbers depending on the endpoint.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

pub fn cents_to_amount(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub description: String,
    pub unit_price: i64,
    #[serde(default)]
    pub image_uri: String,
}

impl Product {
    pub fn price(&self) -> Decimal {
        cents_to_amount(self.unit_price)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductPage {
    #[serde(default)]
    pub content: Vec<Product>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(default)]
    pub description: String,
    pub unit_price: i64,
    #[serde(default)]
    pub image_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Order value in cents, excluding shipping and tax.
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub cart_items: Vec<CartItem>,
}

impl Cart {
    /// Price in cents of the single item bought, falling back to the cart total.
    pub fn unit_price(&self) -> Option<i64> {
        self.cart_items
            .first()
            .map(|item| item.unit_price)
            .or(self.total)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[serde(deserialize_with = "id_string")]
    pub address_id: String,
    pub shipping_alias: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    pub image_uri: Option<String>,
    #[serde(default)]
    pub selected_as_default: bool,
}

impl ShippingAddress {
    /// Alias if the user gave one, otherwise "city country".
    pub fn display_name(&self) -> String {
        match self.shipping_alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => format!("{} {}", self.city, self.country),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingAddress {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    #[serde(deserialize_with = "id_string")]
    pub card_id: String,
    #[serde(default)]
    pub card_alias: String,
    #[serde(default)]
    pub brand_name: String,
    #[serde(default)]
    pub expiry_month: serde_json::Value,
    #[serde(default)]
    pub expiry_year: serde_json::Value,
    #[serde(default)]
    pub billing_address: BillingAddress,
    pub image_uri: Option<String>,
    #[serde(default)]
    pub selected_as_default: bool,
}

impl Card {
    pub fn expiry(&self) -> String {
        format!("{}/{}", plain(&self.expiry_month), plain(&self.expiry_year))
    }
}

fn plain(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Addresses and cards the wallet holds for a linked user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutContext {
    #[serde(default)]
    pub shipping_addresses: Vec<ShippingAddress>,
    #[serde(default)]
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptCart {
    #[serde(default)]
    pub cart_items: Vec<CartItem>,
}

/// Completed order as returned by either checkout endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(default)]
    pub recipient_name: String,
    #[serde(default)]
    pub order_number: serde_json::Value,
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub cart: ReceiptCart,
}

impl Receipt {
    pub fn order_number(&self) -> String {
        plain(&self.order_number)
    }

    pub fn first_item(&self) -> Option<&CartItem> {
        self.cart.cart_items.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_product_page_accepts_numeric_ids() {
        let page: ProductPage = serde_json::from_str(
            r#"{"content":[{"id":7,"description":"Camera","unitPrice":2999,"imageUri":"/img/7.png"}]}"#,
        )
        .unwrap();
        assert_eq!(page.content[0].id, "7");
        assert_eq!(page.content[0].price(), dec!(29.99));
    }

    #[test]
    fn test_checkout_context_parsing() {
        let context: CheckoutContext = serde_json::from_str(
            r#"{
                "shippingAddresses": [
                    {"addressId": "a1", "city": "Dublin", "country": "IE", "line1": "1 Main St", "selectedAsDefault": true}
                ],
                "cards": [
                    {"cardId": 11, "cardAlias": "Work", "brandName": "Mastercard",
                     "expiryMonth": 4, "expiryYear": 2030,
                     "billingAddress": {"city": "Dublin", "country": "IE"}}
                ]
            }"#,
        )
        .unwrap();

        let address = &context.shipping_addresses[0];
        assert_eq!(address.display_name(), "Dublin IE");
        assert!(address.selected_as_default);

        let card = &context.cards[0];
        assert_eq!(card.card_id, "11");
        assert_eq!(card.expiry(), "4/2030");
        assert!(!card.selected_as_default);
    }

    #[test]
    fn test_cart_price_prefers_item_over_total() {
        let cart: Cart = serde_json::from_str(
            r#"{"id": 3, "total": 5998, "cartItems": [{"description": "Camera", "unitPrice": 2999}]}"#,
        )
        .unwrap();
        assert_eq!(cart.id, "3");
        assert_eq!(cart.unit_price(), Some(2999));

        let bare: Cart = serde_json::from_str(r#"{"id": "c1", "total": 1000}"#).unwrap();
        assert_eq!(bare.unit_price(), Some(1000));

        let empty: Cart = serde_json::from_str(r#"{"id": "c2"}"#).unwrap();
        assert_eq!(empty.unit_price(), None);
    }

    #[test]
    fn test_alias_preferred_for_display_name() {
        let address = ShippingAddress {
            address_id: "a".to_string(),
            shipping_alias: Some("Home".to_string()),
            city: "Paris".to_string(),
            country: "FR".to_string(),
            ..Default::default()
        };
        assert_eq!(address.display_name(), "Home");
    }
}
