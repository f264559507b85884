//! Stripe Checkout over its form-encoded REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{CheckoutRequest, CheckoutSession, CreatedCheckout, PaymentError, PaymentGateway};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Clone)]
pub struct StripeGateway {
    http:       reqwest::Client,
    api_base:   String,
    secret_key: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Deserialize)]
struct CreatedSession {
    id:  String,
    url: Option<String>,
}

impl StripeGateway {
    pub fn new(api_base: &str, secret_key: &str) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("concierge-backend/0.1")
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    fn key(&self) -> Result<&str, PaymentError> {
        if self.secret_key.is_empty() {
            Err(PaymentError::NotConfigured)
        } else {
            Ok(&self.secret_key)
        }
    }

    async fn read<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T, PaymentError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }
        let message = match resp.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope.error.message.unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };
        Err(PaymentError::Provider { status: status.as_u16(), message })
    }
}

/// Flattens a checkout request into Stripe's bracketed form keys.
pub fn form_fields(request: &CheckoutRequest) -> Vec<(String, String)> {
    let item = &request.line_item;
    let mut fields = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("line_items[0][quantity]".to_string(), item.quantity.to_string()),
        ("line_items[0][price_data][currency]".to_string(), item.currency.clone()),
        ("line_items[0][price_data][unit_amount]".to_string(), item.unit_amount.to_string()),
        ("line_items[0][price_data][product_data][name]".to_string(), item.name.clone()),
    ];
    if let Some(description) = item.description.as_ref().filter(|d| !d.is_empty()) {
        fields.push((
            "line_items[0][price_data][product_data][description]".to_string(),
            description.clone(),
        ));
    }
    for (i, image) in item.images.iter().enumerate() {
        fields.push((format!("line_items[0][price_data][product_data][images][{i}]"), image.clone()));
    }
    if let Some(email) = &request.customer_email {
        fields.push(("customer_email".to_string(), email.clone()));
    }
    for (key, value) in &request.metadata {
        fields.push((format!("metadata[{key}]"), value.clone()));
    }
    fields
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CreatedCheckout, PaymentError> {
        let key = self.key()?;
        let resp = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(key)
            .form(&form_fields(request))
            .send()
            .await?;
        let created: CreatedSession = Self::read(resp).await?;
        let url = created.url.ok_or_else(|| PaymentError::Provider {
            status:  502,
            message: "Checkout session has no redirect URL".into(),
        })?;
        Ok(CreatedCheckout { id: created.id, url })
    }

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, PaymentError> {
        let key = self.key()?;
        let resp = self
            .http
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.api_base,
                urlencoding::encode(id)
            ))
            .bearer_auth(key)
            .send()
            .await?;
        Self::read(resp).await
    }
}
