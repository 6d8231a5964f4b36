//! Stripe Checkout API client.
//!
//! Covers exactly two calls: creating a hosted checkout session and
//! retrieving a finalized one by id. Everything else about payment is
//! the hosted page's problem.
//!
//! Amounts cross this boundary as integer minor units; the rest of the
//! application works in `Decimal`.

pub mod types;

pub use types::{
    CheckoutSession, LineItem, PaymentStatus, ProductLine, SessionLine,
    PRODUCT_ID_METADATA_KEY,
};

use secrecy::ExposeSecret;

use greenstem_core::ProductId;

use crate::config::StripeConfig;

/// Stripe API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com/v1";

/// Per-attempt request timeout.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// Errors that can occur when talking to Stripe.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        message: String,
    },

    /// Request timed out after the retry.
    #[error("request timed out")]
    Timeout,

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// One line of a checkout-session creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionLine {
    /// Display name shown on the hosted page.
    pub name: String,
    /// Unit price in minor units.
    pub unit_amount: i64,
    /// Units purchased.
    pub quantity: u32,
    /// Durable product id, attached as product metadata so the
    /// reconciler can recover the line unambiguously. `None` for the
    /// shipping-fee line.
    pub product_id: Option<ProductId>,
}

/// Parameters for creating a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    /// ISO 4217 currency code, lowercase (e.g. `usd`).
    pub currency: String,
    /// Customer email to prefill on the hosted page.
    pub customer_email: String,
    /// Where Stripe redirects after payment. Must contain the
    /// `{CHECKOUT_SESSION_ID}` placeholder.
    pub success_url: String,
    /// Where Stripe redirects on cancel.
    pub cancel_url: String,
    /// Opaque session metadata (customer id, shipping address).
    pub metadata: Vec<(String, String)>,
    /// Priced line items.
    pub lines: Vec<CreateSessionLine>,
}

impl CreateSessionRequest {
    /// Render the request as Stripe's bracketed form encoding.
    #[must_use]
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_owned(), "payment".to_owned()),
            ("customer_email".to_owned(), self.customer_email.clone()),
            ("success_url".to_owned(), self.success_url.clone()),
            ("cancel_url".to_owned(), self.cancel_url.clone()),
        ];

        for (key, value) in &self.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        for (i, line) in self.lines.iter().enumerate() {
            form.push((
                format!("line_items[{i}][price_data][currency]"),
                self.currency.clone(),
            ));
            form.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                line.unit_amount.to_string(),
            ));
            form.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                line.name.clone(),
            ));
            if let Some(product_id) = line.product_id {
                form.push((
                    format!(
                        "line_items[{i}][price_data][product_data][metadata][{PRODUCT_ID_METADATA_KEY}]"
                    ),
                    product_id.to_string(),
                ));
            }
            form.push((format!("line_items[{i}][quantity]"), line.quantity.to_string()));
        }

        form
    }
}

/// Stripe Checkout API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: secrecy::SecretString,
    api_base: String,
}

impl StripeClient {
    /// Create a new Stripe API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.clone(),
        })
    }

    /// Create a hosted checkout session.
    ///
    /// The returned session carries the redirect `url` the customer must
    /// be sent to.
    ///
    /// # Errors
    ///
    /// Returns error on network failure (after one retry), a non-2xx
    /// response, or an undecodable body.
    pub async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CheckoutSession, StripeError> {
        let url = format!("{}/checkout/sessions", self.api_base);
        let form = request.to_form();

        let response = self
            .send_with_retry(|| {
                self.client
                    .post(&url)
                    .bearer_auth(self.secret_key.expose_secret())
                    .form(&form)
            })
            .await?;

        Self::decode(response).await
    }

    /// Retrieve a finalized checkout session by id, with line items and
    /// their product metadata expanded.
    ///
    /// The id comes from an untrusted redirect query parameter; it is
    /// passed through opaquely and everything about the session is taken
    /// from Stripe's answer, never from the caller.
    ///
    /// # Errors
    ///
    /// Returns error on network failure (after one retry), a non-2xx
    /// response (including unknown session ids), or an undecodable body.
    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let url = format!("{}/checkout/sessions/{session_id}", self.api_base);

        let response = self
            .send_with_retry(|| {
                self.client
                    .get(&url)
                    .bearer_auth(self.secret_key.expose_secret())
                    .query(&[
                        ("expand[]", "line_items"),
                        ("expand[]", "line_items.data.price.product"),
                    ])
            })
            .await?;

        Self::decode(response).await
    }

    /// Send a request, retrying once on transient network failure.
    ///
    /// Payment state is re-queried from Stripe on every reconciliation
    /// attempt, so a duplicate read is harmless; a duplicate create just
    /// produces an unused session. Retries exhausting fails closed.
    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, StripeError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        match build().send().await {
            Ok(response) => Ok(response),
            Err(first) if first.is_timeout() || first.is_connect() => {
                tracing::warn!(error = %first, "Transient Stripe request failure, retrying once");
                build().send().await.map_err(|second| {
                    if second.is_timeout() {
                        StripeError::Timeout
                    } else {
                        StripeError::Http(second)
                    }
                })
            }
            Err(e) => Err(StripeError::Http(e)),
        }
    }

    /// Check the response status and decode the JSON body.
    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| StripeError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_session_form_encoding() {
        let request = CreateSessionRequest {
            currency: "usd".to_owned(),
            customer_email: "shopper@example.com".to_owned(),
            success_url: "https://shop.test/payment/return?session_id={CHECKOUT_SESSION_ID}"
                .to_owned(),
            cancel_url: "https://shop.test/payment/cancel".to_owned(),
            metadata: vec![("customer_id".to_owned(), "7".to_owned())],
            lines: vec![
                CreateSessionLine {
                    name: "Boston Fern".to_owned(),
                    unit_amount: 1000,
                    quantity: 2,
                    product_id: Some(ProductId::new(41)),
                },
                CreateSessionLine {
                    name: "Shipping".to_owned(),
                    unit_amount: 300,
                    quantity: 1,
                    product_id: None,
                },
            ],
        };

        let form = request.to_form();

        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("customer_email"), Some("shopper@example.com"));
        assert_eq!(get("metadata[customer_id]"), Some("7"));
        assert_eq!(get("line_items[0][price_data][currency]"), Some("usd"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("1000"));
        assert_eq!(
            get("line_items[0][price_data][product_data][name]"),
            Some("Boston Fern")
        );
        assert_eq!(
            get("line_items[0][price_data][product_data][metadata][product_id]"),
            Some("41")
        );
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        // The shipping line carries no product metadata.
        assert_eq!(get("line_items[1][price_data][unit_amount]"), Some("300"));
        assert_eq!(
            get("line_items[1][price_data][product_data][metadata][product_id]"),
            None
        );
    }

    #[test]
    fn test_success_url_keeps_session_placeholder() {
        // Stripe substitutes the placeholder itself; it must survive
        // form encoding untouched.
        let request = CreateSessionRequest {
            currency: "usd".to_owned(),
            customer_email: "shopper@example.com".to_owned(),
            success_url: "https://shop.test/payment/return?session_id={CHECKOUT_SESSION_ID}"
                .to_owned(),
            cancel_url: "https://shop.test/payment/cancel".to_owned(),
            metadata: vec![],
            lines: vec![],
        };

        let form = request.to_form();
        let success = form
            .iter()
            .find(|(k, _)| k == "success_url")
            .map(|(_, v)| v.as_str())
            .expect("success_url present");
        assert!(success.contains("{CHECKOUT_SESSION_ID}"));
    }
}
