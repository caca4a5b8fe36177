use rust_decimal::Decimal;
use std::{str::FromStr, time::Duration};

use crate::error::ConfigError;

/// Fixed per-order charges added on top of the cart subtotal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fees {
    pub shipping: Decimal,
    pub tax: Decimal,
}

impl Default for Fees {
    fn default() -> Self {
        Self {
            shipping: Decimal::new(495, 2),
            tax: Decimal::new(619, 2),
        }
    }
}

impl Fees {
    pub fn total_for(&self, subtotal: Decimal) -> Decimal {
        subtotal + self.shipping + self.tax
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutMode {
    #[default]
    Express,
    Standard,
}

impl FromStr for CheckoutMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "express" => Ok(CheckoutMode::Express),
            "standard" => Ok(CheckoutMode::Standard),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub merchant_url: String,
    pub page_access_token: String,
    pub verify_token: String,
    pub port: u16,
    pub graph_api_url: String,
    pub request_timeout: Duration,
    pub fees: Fees,
    pub checkout_mode: CheckoutMode,
    pub catalog_page_size: u32,
    pub channel_namespace: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let or_default = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let merchant_url = required("MERCHANT_URL")?.trim_end_matches('/').to_string();
        let page_access_token = required("PAGE_ACCESS_TOKEN")?;
        let verify_token = or_default("VERIFY_TOKEN", "masterpass_chatbot");
        let graph_api_url = or_default("GRAPH_API_URL", "https://graph.facebook.com/v2.6")
            .trim_end_matches('/')
            .to_string();
        let channel_namespace = or_default("CHANNEL_NAMESPACE", "messenger");

        let port = parse(&lookup, "PORT", 5000u16)?;
        let timeout_secs = parse(&lookup, "REQUEST_TIMEOUT_SECS", 30u64)?;
        let catalog_page_size = parse(&lookup, "CATALOG_PAGE_SIZE", 5u32)?;

        let defaults = Fees::default();
        let fees = Fees {
            shipping: parse(&lookup, "SHIPPING_FEE", defaults.shipping)?,
            tax: parse(&lookup, "TAX_FEE", defaults.tax)?,
        };

        let checkout_mode = match lookup("CHECKOUT_MODE") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "CHECKOUT_MODE",
                value: raw,
            })?,
            None => CheckoutMode::default(),
        };

        Ok(Config {
            merchant_url,
            page_access_token,
            verify_token,
            port,
            graph_api_url,
            request_timeout: Duration::from_secs(timeout_secs),
            fees,
            checkout_mode,
            catalog_page_size,
            channel_namespace,
        })
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
