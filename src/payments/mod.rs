//! Payment provider boundary: hosted checkout sessions and webhook events.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub mod signature;
pub mod stripe;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment provider not configured")]
    NotConfigured,
    #[error("Payment provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Payment provider rejected the request ({status}): {message}")]
    Provider { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub name:        String,
    pub description: Option<String>,
    pub images:      Vec<String>,
    pub currency:    String,
    /// Minor units (cents).
    pub unit_amount: i64,
    pub quantity:    u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub line_item:      LineItem,
    pub success_url:    String,
    pub cancel_url:     String,
    pub customer_email: Option<String>,
    pub metadata:       BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCheckout {
    pub id:  String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
    pub name:  Option<String>,
}

/// The checkout session object, as delivered in webhook events and by the
/// retrieve endpoint. Only the fields the booking flow reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CheckoutSession {
    pub id:               String,
    #[serde(default)]
    pub payment_intent:   Option<String>,
    #[serde(default)]
    pub payment_status:   Option<String>,
    #[serde(default)]
    pub amount_total:     Option<i64>,
    #[serde(default)]
    pub currency:         Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub success_url:      Option<String>,
    #[serde(default)]
    pub url:              Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata:         HashMap<String, String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl CheckoutSession {
    /// Non-empty metadata value.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn customer_email(&self) -> Option<&str> {
        self.customer_details.as_ref().and_then(|c| c.email.as_deref())
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.customer_details.as_ref().and_then(|c| c.name.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id:   String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CreatedCheckout, PaymentError>;

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, PaymentError>;
}
