//! Stripe API client for enrichment lookups.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::processor::{
    Charge, Customer, PaymentIntent, PaymentProcessor, ProcessorError, Subscription,
};

/// Stripe REST client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    secret_key: String,
    base_url: String,
    http_client: Client,
}

impl StripeClient {
    const API_BASE: &'static str = "https://api.stripe.com";

    pub fn new(secret_key: impl Into<String>) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            secret_key: secret_key.into(),
            base_url: Self::API_BASE.to_string(),
            http_client,
        }
    }

    /// Points the client at another API host (mock servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, resource: &str, id: &str) -> String {
        format!("{}/v1/{}/{}", self.base_url, resource, id)
    }

    async fn retrieve<T: DeserializeOwned>(
        &self,
        resource: &str,
        id: &str,
    ) -> Result<T, ProcessorError> {
        tracing::debug!(resource, id, "Retrieving processor object");

        let response = self
            .http_client
            .get(self.url(resource, id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, id, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProcessorError::Decode(e.to_string()))
    }
}

fn status_error(status: StatusCode, id: &str, body: String) -> ProcessorError {
    if status == StatusCode::NOT_FOUND {
        return ProcessorError::NotFound(id.to_string());
    }

    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);

    ProcessorError::Api {
        status: status.as_u16(),
        message,
    }
}

impl From<reqwest::Error> for ProcessorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProcessorError::Timeout
        } else {
            ProcessorError::Http(err.to_string())
        }
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn retrieve_charge(&self, id: &str) -> Result<Charge, ProcessorError> {
        self.retrieve("charges", id).await
    }

    async fn retrieve_customer(&self, id: &str) -> Result<Customer, ProcessorError> {
        self.retrieve("customers", id).await
    }

    async fn retrieve_subscription(&self, id: &str) -> Result<Subscription, ProcessorError> {
        self.retrieve("subscriptions", id).await
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProcessorError> {
        self.retrieve("payment_intents", id).await
    }
}
