use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::de::DeserializeOwned;

use crate::error::BackendError;
use crate::model::{Cart, CheckoutContext, ProductPage, Receipt};
use crate::session::Session;

const SESSION_COOKIE: &str = "JSESSIONID";
const XSRF_COOKIE: &str = "XSRF-TOKEN";
const XSRF_HEADER: &str = "X-XSRF-TOKEN";

/// Merchant checkout backend. Credentials come from the caller's session record.
#[async_trait]
pub trait MerchantBackend: Send + Sync {
    /// Anonymous catalog page. Captures a fresh anti-forgery token into `session`.
    async fn list_products(
        &self,
        session: &mut Session,
        page: u32,
        size: u32,
    ) -> Result<ProductPage, BackendError>;

    /// Wallet addresses and cards. A 404 maps to [`BackendError::SessionExpired`].
    async fn fetch_checkout_context(&self, session: &Session) -> Result<CheckoutContext, BackendError>;

    async fn create_cart(&self, session: &Session, product_id: &str) -> Result<Cart, BackendError>;

    async fn express_checkout(
        &self,
        session: &Session,
        cart_id: &str,
        card_id: &str,
        address_id: &str,
    ) -> Result<Receipt, BackendError>;

    /// Lets the merchant pick the address and card itself.
    async fn standard_checkout(&self, session: &Session, cart_id: &str) -> Result<Receipt, BackendError>;

    async fn exchange_identity_for_session(&self, user_id: &str) -> Result<String, BackendError>;

    async fn revoke_session(&self, user_id: &str) -> Result<(), BackendError>;
}

pub struct MerchantClient {
    client: Client,
    base_url: String,
    namespace: String,
}

impl MerchantClient {
    pub fn new(client: Client, base_url: &str, namespace: &str) -> Self {
        MerchantClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_session(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        request.header(header::COOKIE, session_cookie(session))
    }

    fn with_xsrf(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        let request = request.header(header::COOKIE, cookie_header(session));
        match session.xsrf_token.as_deref() {
            Some(token) => request.header(XSRF_HEADER, token),
            None => request,
        }
    }

    fn with_identity(&self, request: RequestBuilder, user_id: &str) -> RequestBuilder {
        request.header(header::AUTHORIZATION, basic_auth(&self.namespace, user_id))
    }
}

#[async_trait]
impl MerchantBackend for MerchantClient {
    async fn list_products(
        &self,
        session: &mut Session,
        page: u32,
        size: u32,
    ) -> Result<ProductPage, BackendError> {
        let query = serde_urlencoded::to_string([("p", page), ("s", size)])
            .unwrap_or_else(|_| format!("p={}&s={}", page, size));
        let response = self
            .client
            .get(self.url(&format!("/products?{}", query)))
            .send()
            .await?;
        let response = ensure_ok(response).await?;

        if let Some(token) = xsrf_from_response(&response) {
            session.xsrf_token = Some(token);
        } else {
            log::warn!("Product listing for {} carried no {} cookie", session.user_id, XSRF_COOKIE);
        }
        decode(response).await
    }

    async fn fetch_checkout_context(&self, session: &Session) -> Result<CheckoutContext, BackendError> {
        let request = self.client.get(self.url("/api/express"));
        let response = self.with_session(request, session).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::SessionExpired);
        }
        decode(ensure_ok(response).await?).await
    }

    async fn create_cart(&self, session: &Session, product_id: &str) -> Result<Cart, BackendError> {
        let request = self.client.post(self.url("/buy")).json(&serde_json::json!({
            "productId": product_id,
            "quantity": "1",
        }));
        let response = self.with_xsrf(request, session).send().await?;
        decode(ensure_ok(response).await?).await
    }

    async fn express_checkout(
        &self,
        session: &Session,
        cart_id: &str,
        card_id: &str,
        address_id: &str,
    ) -> Result<Receipt, BackendError> {
        let request = self
            .client
            .post(self.url(&format!("/api/express/{}", cart_id)))
            .json(&serde_json::json!({
                "cardId": card_id,
                "shippingAddressId": address_id,
            }));
        let response = self.with_xsrf(request, session).send().await?;
        decode(ensure_ok(response).await?).await
    }

    async fn standard_checkout(&self, session: &Session, cart_id: &str) -> Result<Receipt, BackendError> {
        let request = self.client.post(self.url(&format!("/api/standard/{}", cart_id)));
        let response = self.with_xsrf(request, session).send().await?;
        decode(ensure_ok(response).await?).await
    }

    async fn exchange_identity_for_session(&self, user_id: &str) -> Result<String, BackendError> {
        let request = self.client.get(self.url("/channel/session"));
        let response = self.with_identity(request, user_id).send().await?;
        let body = ensure_ok(response).await?.text().await?;
        log::info!("Received session token for {}", user_id);
        Ok(body.trim().trim_matches('"').to_string())
    }

    async fn revoke_session(&self, user_id: &str) -> Result<(), BackendError> {
        let request = self.client.delete(self.url("/channel/user"));
        let response = self.with_identity(request, user_id).send().await?;
        let body = ensure_ok(response).await?.text().await?;
        log::debug!("Logout response for {}: {}", user_id, body);
        Ok(())
    }
}

async fn ensure_ok(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Rejected {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let body = response.text().await?;
    log::debug!("Backend response: {}", body);
    Ok(serde_json::from_str(&body)?)
}

fn xsrf_from_response(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| cookie_value(cookie, XSRF_COOKIE))
}

/// Value of `name` in a `Set-Cookie` line such as `XSRF-TOKEN=abc; Path=/`.
fn cookie_value(set_cookie: &str, name: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?.trim();
    let (key, value) = pair.split_once('=')?;
    (key.trim() == name).then(|| value.trim().to_string())
}

fn session_cookie(session: &Session) -> String {
    format!(
        "{}={}",
        SESSION_COOKIE,
        session.session_token.as_deref().unwrap_or_default()
    )
}

fn cookie_header(session: &Session) -> String {
    match session.xsrf_token.as_deref() {
        Some(xsrf) => format!("{}; {}={}", session_cookie(session), XSRF_COOKIE, xsrf),
        None => session_cookie(session),
    }
}

fn basic_auth(namespace: &str, user_id: &str) -> String {
    let identity = format!("{}:{}", namespace, user_id);
    format!("Basic {}", BASE64.encode(identity))
}
