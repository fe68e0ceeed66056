//! Send provider abstraction over the transport gateways.
//!
//! Outcomes are tagged values, never errors: a provider rejecting a message
//! is ordinary business data counted in the job's counters, while only
//! programmer errors (bad config) surface as `Err` elsewhere. Transport
//! failures (connect refused, timeout) are folded into a failed outcome the
//! same way.

use std::{future::Future, pin::Pin};

use herald_core::models::Channel;
use serde::Deserialize;
use tracing::debug;

/// Result of one send attempt, success or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// Whether the provider accepted the message.
    pub success: bool,
    /// Provider-assigned message id, when available.
    pub message_id: Option<String>,
    /// Provider error for failed sends.
    pub error: Option<String>,
}

impl SendOutcome {
    /// A successful send.
    pub fn success(message_id: Option<String>) -> Self {
        Self { success: true, message_id, error: None }
    }

    /// A failed send with a provider error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, message_id: None, error: Some(error.into()) }
    }
}

/// Narrow send interface the worker delivers through.
///
/// Concrete providers (transactional email API, SMS gateway, chat-bot
/// messaging) are fully swappable behind this trait; the worker picks the
/// method from the job's channel.
pub trait SendProvider: Send + Sync + 'static {
    /// Sends an email.
    fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        text: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = SendOutcome> + Send + '_>>;

    /// Sends an sms or chat message.
    fn send_message(
        &self,
        channel: Channel,
        address: &str,
        body: &str,
    ) -> Pin<Box<dyn Future<Output = SendOutcome> + Send + '_>>;
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Production provider talking to the message gateway over HTTP.
///
/// The gateway multiplexes all three channels behind two endpoints:
/// `POST {base}/email` and `POST {base}/messages`. Any 2xx response counts
/// as accepted; everything else, including transport errors, becomes a
/// failed outcome.
pub struct GatewaySendProvider {
    client: reqwest::Client,
    base_url: String,
}

impl GatewaySendProvider {
    /// Creates a provider against the given gateway base URL.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> SendOutcome {
        let url = format!("{}{path}", self.base_url);
        let response = match self.client.post(&url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => return SendOutcome::failure(format!("gateway unreachable: {e}")),
        };

        let status = response.status();
        let parsed: GatewayResponse = response.json().await.unwrap_or(GatewayResponse {
            message_id: None,
            error: None,
        });

        if status.is_success() {
            debug!(%url, message_id = ?parsed.message_id, "gateway accepted message");
            SendOutcome::success(parsed.message_id)
        } else {
            let error = parsed.error.unwrap_or_else(|| format!("gateway returned {status}"));
            SendOutcome::failure(error)
        }
    }
}

impl SendProvider for GatewaySendProvider {
    fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        text: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = SendOutcome> + Send + '_>> {
        let body = serde_json::json!({
            "to": to,
            "subject": subject,
            "html": html,
            "text": text,
        });
        Box::pin(async move { self.post("/email", body).await })
    }

    fn send_message(
        &self,
        channel: Channel,
        address: &str,
        body: &str,
    ) -> Pin<Box<dyn Future<Output = SendOutcome> + Send + '_>> {
        let body = serde_json::json!({
            "channel": channel.to_string(),
            "address": address,
            "body": body,
        });
        Box::pin(async move { self.post("/messages", body).await })
    }
}

pub mod mock {
    //! Scripted provider for tests.

    use std::{
        future::Future,
        pin::Pin,
        sync::{Arc, Mutex},
    };

    use herald_core::models::Channel;

    use super::{SendOutcome, SendProvider};

    /// One recorded send call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentMessage {
        /// Channel the call used.
        pub channel: Channel,
        /// Address the message went to.
        pub address: String,
        /// Merged subject (empty for message channels).
        pub subject: String,
        /// Merged body (html for email, text for messages).
        pub body: String,
    }

    /// Provider that replays a scripted outcome sequence.
    ///
    /// Outcomes are consumed in call order; once the script runs out every
    /// further call succeeds.
    pub struct ScriptedProvider {
        script: Mutex<Vec<SendOutcome>>,
        sent: Arc<Mutex<Vec<SentMessage>>>,
    }

    impl ScriptedProvider {
        /// Provider that succeeds on every call.
        pub fn always_succeeding() -> Self {
            Self::with_script(Vec::new())
        }

        /// Provider that replays `script` front to back.
        pub fn with_script(script: Vec<SendOutcome>) -> Self {
            Self {
                script: Mutex::new(script),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Script failing the first `n` calls, succeeding afterwards.
        pub fn failing_first(n: usize) -> Self {
            Self::with_script(vec![SendOutcome::failure("provider rejected"); n])
        }

        /// Calls recorded so far.
        pub fn sent(&self) -> Vec<SentMessage> {
            self.sent.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
        }

        fn record_and_pop(&self, message: SentMessage) -> SendOutcome {
            self.sent.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(message);
            let mut script =
                self.script.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if script.is_empty() {
                SendOutcome::success(Some(format!("msg-{}", self.sent().len())))
            } else {
                script.remove(0)
            }
        }
    }

    impl SendProvider for ScriptedProvider {
        fn send_email(
            &self,
            to: &str,
            subject: &str,
            html: &str,
            _text: Option<&str>,
        ) -> Pin<Box<dyn Future<Output = SendOutcome> + Send + '_>> {
            let outcome = self.record_and_pop(SentMessage {
                channel: Channel::Email,
                address: to.to_string(),
                subject: subject.to_string(),
                body: html.to_string(),
            });
            Box::pin(async move { outcome })
        }

        fn send_message(
            &self,
            channel: Channel,
            address: &str,
            body: &str,
        ) -> Pin<Box<dyn Future<Output = SendOutcome> + Send + '_>> {
            let outcome = self.record_and_pop(SentMessage {
                channel,
                address: address.to_string(),
                subject: String::new(),
                body: body.to_string(),
            });
            Box::pin(async move { outcome })
        }
    }
}
