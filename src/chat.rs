use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::slam::Chat;
use crate::transcript::Conversation;

pub const OPENROUTER_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRYABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];
const RETRYABLE_PROVIDER_CODES: [i64; 2] = [524, 529];

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Application-level attempts per request.
    pub attempts: u32,
    /// Backoff after attempt `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
    /// Extra tries for connection failures, beneath the attempts above.
    pub transport_retries: u32,
    pub transport_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(500),
            transport_retries: 3,
            transport_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a Conversation,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ReplyMessage>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// The `error` member of a failed response. Providers send either
/// `{"code", "message"}` or a bare string; only a numeric code in
/// [`RETRYABLE_PROVIDER_CODES`] makes it worth another attempt.
fn is_retryable_error(error: &serde_json::Value) -> bool {
    let code = match error.get("code") {
        Some(serde_json::Value::Number(number)) => number.as_i64(),
        Some(serde_json::Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    };
    code.is_some_and(|code| RETRYABLE_PROVIDER_CODES.contains(&code))
}

/// How a single HTTP exchange ended.
#[derive(Debug)]
enum Attempt {
    Success(String),
    Retry(anyhow::Error),
    Fatal(anyhow::Error),
}

fn classify(status: StatusCode, body: &str) -> Attempt {
    if status.is_client_error() {
        return Attempt::Fatal(anyhow!("Client error {status}: {body}"));
    }
    if RETRYABLE_STATUSES.contains(&status.as_u16()) {
        return Attempt::Retry(anyhow!("Retryable HTTP {status} status"));
    }

    let response: ChatResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(error) => {
            return Attempt::Retry(
                anyhow!(error).context(format!("Malformed response body (HTTP {status})")),
            );
        }
    };

    if let Some(error) = response.error {
        return if is_retryable_error(&error) {
            Attempt::Retry(anyhow!("Retryable provider error: {error}"))
        } else {
            Attempt::Fatal(anyhow!("Non-retryable API error: {error}"))
        };
    }

    match response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
    {
        Some(text) if !text.is_empty() => Attempt::Success(text),
        _ => Attempt::Fatal(anyhow!("Response carried no reply text")),
    }
}

/// Result of [`ChatClient::exchange`]: the reply, if any, and every backoff
/// wait taken on the way.
#[derive(Debug)]
pub struct Exchange {
    pub reply: Option<String>,
    pub waits: Vec<Duration>,
}

/// OpenRouter chat-completions client.
///
/// Holds one pooled HTTP client that is reused across attempts and requests;
/// it carries no conversation state.
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl ChatClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoint: OPENROUTER_ENDPOINT.to_owned(),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_owned();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sends the whole conversation and returns the model's reply, or `None`
    /// once the call failed for good.
    pub async fn send(&self, conversation: &Conversation) -> Option<String> {
        let exchange = self.exchange(conversation).await;
        if !exchange.waits.is_empty() {
            log::debug!(
                "Backed off {} times, {:?} in total",
                exchange.waits.len(),
                exchange.waits.iter().sum::<Duration>()
            );
        }
        exchange.reply
    }

    pub async fn exchange(&self, conversation: &Conversation) -> Exchange {
        let attempts = self.retry.attempts;
        let mut waits = Vec::new();

        for attempt in 1..=attempts {
            let outcome = match self.post(conversation).await {
                Ok((status, body)) => classify(status, &body),
                Err(error) => Attempt::Retry(error),
            };

            match outcome {
                Attempt::Success(text) => {
                    return Exchange {
                        reply: Some(text),
                        waits,
                    };
                }
                Attempt::Fatal(error) => {
                    log::error!("{error:#}");
                    return Exchange { reply: None, waits };
                }
                Attempt::Retry(error) => {
                    log::warn!("Attempt {attempt}/{attempts} failed: {error:#}");
                    if attempt == attempts {
                        log::error!("All {attempts} attempts failed. Last error: {error:#}");
                        break;
                    }
                    let wait = self.retry.backoff(attempt);
                    waits.push(wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }

        Exchange { reply: None, waits }
    }

    async fn post(&self, conversation: &Conversation) -> Result<(StatusCode, String)> {
        let request = ChatRequest {
            model: &self.model,
            messages: conversation,
            stream: false,
        };
        log::debug!(
            "Sending {} turns to {} ({})",
            conversation.len(),
            self.model,
            self.endpoint
        );

        let mut transport_retries = self.retry.transport_retries;
        let response = loop {
            match self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(response) => break response,
                Err(error) if error.is_connect() && transport_retries > 0 => {
                    transport_retries -= 1;
                    log::info!("Connection failed, retrying ({transport_retries} left): {error}");
                    tokio::time::sleep(self.retry.transport_delay).await;
                }
                Err(error) => return Err(error).context("Failed to send request to OpenRouter"),
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read OpenRouter response body")?;
        Ok((status, body))
    }
}

impl Chat for ChatClient {
    async fn reply(&self, conversation: &Conversation) -> Option<String> {
        self.send(conversation).await
    }
}
