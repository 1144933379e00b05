//! HTTP client for the remote assistant and its pipeline endpoints.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use drover_chain::proxy_url;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::retry::HasOwnerAddress;
use crate::session::Session;
use crate::stream::ChatReply;
use crate::PipelineError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.3";
const MODEL_ID: &str = "gpt-4.1-mini-2025-04-14";
const SUPPORTED_CHAINS: &str = "Arbitrum, Base, Optimism, Polygon, BSC, Berachain, Hyperliquid, \
                                Ink, Soneium, Zksync, Monad Testnet";
const REGISTER_LOOKUP_ACTION: &str = "d2b7eee79fc50da3dc8db7ccb2d33e9dc428eb42";
const REGISTER_ACTION: &str = "387b8e2c267dcadab8db293e8b84de57649ec4cd";

/// Server actions posted to a chat page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAction {
    CreateSwap,
    GetSwapData,
    SendTx,
    SignedMessage,
}

impl ServerAction {
    fn id(&self) -> &'static str {
        match self {
            ServerAction::CreateSwap => "a831b0e504b3ba6cff855dc044e7b68692282af7",
            ServerAction::GetSwapData => "fa538a090030a8a9e2a5fca2171f22dd1891f8be",
            ServerAction::SendTx => "4595dcc7970106ab7b07f377d4ac56c9e37d4067",
            ServerAction::SignedMessage => "9c7a4279b05b2de05c8b7d0a7f3a7fe717f202dc",
        }
    }

    fn body(&self, payload: Value) -> Value {
        match self {
            ServerAction::SignedMessage => json!([payload]),
            _ => json!([payload, true]),
        }
    }
}

/// Account points as reported by the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Points {
    #[serde(default)]
    pub referral_code: Option<String>,
    #[serde(default)]
    pub points_v2: Value,
    #[serde(default)]
    pub rank_v2: Value,
}

/// Quest progress counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestSummary {
    pub completed: usize,
    pub total: usize,
}

impl std::fmt::Display for QuestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)
    }
}

/// A chat thread and the history sent with every turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Value>,
}

/// Client for one wallet's session with the service.
pub struct ServiceClient {
    http: Client,
    base_url: String,
    address: String,
    country_code: String,
    session: Arc<RwLock<Option<Session>>>,
}

impl ServiceClient {
    pub fn new(
        base_url: impl Into<String>,
        address: impl Into<String>,
        country_code: impl Into<String>,
        route: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(reqwest::header::ORIGIN, header_value(&base_url)?);
        headers.insert(reqwest::header::REFERER, header_value(&format!("{base_url}/"))?);

        let mut builder = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60));
        if let Some(proxy) = route.and_then(proxy_url) {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
            address: address.into(),
            country_code: country_code.into(),
            session: Arc::new(RwLock::new(None)),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Submit a signed SIWE message.
    #[instrument(skip_all, fields(address = %self.address))]
    pub async fn verify_siwe(
        &self,
        message: &str,
        signature: &str,
        referral_code: &str,
    ) -> Result<(), PipelineError> {
        let mut request = self
            .http
            .post(format!("{}/api/siwe_verification", self.base_url))
            .json(&json!({
                "message": message,
                "signature": signature,
                "walletAddress": self.address,
            }));
        if !referral_code.is_empty() {
            request = request.header(
                reqwest::header::REFERER,
                format!("{}/login?referral={referral_code}", self.base_url),
            );
        }

        let body = read_json(request.send().await?).await?;
        let accepted = body.get("success") == Some(&Value::Bool(true))
            && body.get("message").and_then(Value::as_str)
                == Some("Signature validation successful");
        if !accepted {
            return Err(PipelineError::Protocol(format!(
                "unexpected auth response: {body}"
            )));
        }
        debug!("signed in");
        Ok(())
    }

    pub async fn set_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    /// Session fields merged into authenticated request bodies.
    async fn session_fields(&self) -> Result<Map<String, Value>, PipelineError> {
        match self.session.read().await.as_ref() {
            Some(session) => match serde_json::to_value(session)? {
                Value::Object(map) => Ok(map),
                _ => Ok(Map::new()),
            },
            None => Ok(Map::new()),
        }
    }

    pub async fn points(&self) -> Result<Points, PipelineError> {
        let mut body = self.session_fields().await?;
        body.insert("evm_address".into(), json!(self.address));

        let response = self
            .http
            .post(format!("{}/api/points", self.base_url))
            .json(&body)
            .send()
            .await?;
        Ok(serde_json::from_value(read_json(response).await?)?)
    }

    pub async fn quests(&self) -> Result<QuestSummary, PipelineError> {
        let response = self
            .http
            .post(format!("{}/api/quests", self.base_url))
            .header(reqwest::header::REFERER, format!("{}/points", self.base_url))
            .json(&json!({"evm_address": self.address}))
            .send()
            .await?;

        let body = read_json(response).await?;
        let quests = body
            .as_array()
            .ok_or_else(|| PipelineError::Protocol(format!("failed to get quests: {body}")))?;
        let completed = quests
            .iter()
            .filter(|q| {
                let done = q.get("progress_completed").and_then(Value::as_f64);
                let total = q.get("progress_total").and_then(Value::as_f64);
                matches!((done, total), (Some(d), Some(t)) if d >= t)
            })
            .count();
        Ok(QuestSummary {
            completed,
            total: quests.len(),
        })
    }

    /// Create the account, optionally under someone's referral code.
    #[instrument(skip_all, fields(address = %self.address))]
    pub async fn register(&self, referral_code: &str) -> Result<(), PipelineError> {
        self.post_action(
            &format!("{}/", self.base_url),
            REGISTER_LOOKUP_ACTION,
            &format!("{}/", self.base_url),
            json!([self.address]),
        )
        .await?;
        self.post_action(
            &format!("{}/", self.base_url),
            REGISTER_ACTION,
            &format!("{}/", self.base_url),
            json!([
                {"evmAddress": self.address},
                "Injected",
                "$undefined",
                referral_code,
            ]),
        )
        .await?;
        Ok(())
    }

    /// A fresh conversation seeded with the wallet's system message.
    pub fn start_conversation(&self) -> Conversation {
        let system = format!(
            "User has connected from country code {} via Injected with their wallet address: {} \
             and it supports the following chains: {SUPPORTED_CHAINS}",
            self.country_code, self.address
        );
        Conversation {
            id: Uuid::new_v4().to_string(),
            messages: vec![json!({
                "id": Uuid::new_v4().to_string(),
                "role": "system",
                "content": system,
                "parts": [{"type": "text", "text": system}],
            })],
        }
    }

    /// Send one user turn and parse the streamed reply.
    ///
    /// `previous` is the assistant turn being answered, appended to the history first.
    #[instrument(skip_all, fields(address = %self.address, chat_id = %conversation.id))]
    pub async fn chat(
        &self,
        conversation: &mut Conversation,
        question: &str,
        previous: Option<Value>,
    ) -> Result<ChatReply, PipelineError> {
        if let Some(previous) = previous {
            conversation.messages.push(previous);
        }
        conversation.messages.push(json!({
            "id": Uuid::new_v4().to_string(),
            "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "role": "user",
            "content": question,
            "parts": [{"type": "text", "text": question}],
        }));

        let mut body = self.session_fields().await?;
        body.insert("id".into(), json!(conversation.id));
        body.insert("messages".into(), json!(conversation.messages));
        body.insert("modelId".into(), json!(MODEL_ID));
        body.insert(
            "multiChainAddress".into(),
            json!({"evmAddress": self.address}),
        );
        if conversation.messages.len() == 2 {
            body.insert("locale".into(), json!("en"));
        }

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .header(
                reqwest::header::REFERER,
                format!("{}/chat/{}", self.base_url, conversation.id),
            )
            .json(&body)
            .send()
            .await?;
        let text = read_text(response).await?;
        debug!(bytes = text.len(), "assistant replied");
        ChatReply::parse(&text)
    }

    /// Dry-run a swap pipeline and return its sub-actions.
    pub async fn dry_run_pipeline(
        &self,
        bundled_execution: bool,
        swap_data: Value,
    ) -> Result<Value, PipelineError> {
        let response = self
            .http
            .post(format!("{}/api/pipeline", self.base_url))
            .json(&json!({
                "pipeline": [{"action_type": "swap", "swap_data": swap_data}],
                "dry_run": true,
                "bundledExecution": bundled_execution,
                "isBrowserWallet": true,
            }))
            .send()
            .await?;
        read_json(response).await
    }

    /// Post a server action to the chat page and return the raw segmented body.
    pub async fn next_action(
        &self,
        chat_id: &str,
        action: ServerAction,
        payload: Value,
    ) -> Result<String, PipelineError> {
        let page = format!("{}/chat/{chat_id}", self.base_url);
        self.post_action(&page, action.id(), &page, action.body(payload))
            .await
    }

    async fn post_action(
        &self,
        url: &str,
        action_id: &str,
        referer: &str,
        body: Value,
    ) -> Result<String, PipelineError> {
        let response = self
            .http
            .post(url)
            .header("Next-Action", action_id)
            .header(reqwest::header::REFERER, referer)
            .header(reqwest::header::COOKIE, "locale=en")
            .json(&body)
            .send()
            .await?;
        read_text(response).await
    }
}

impl HasOwnerAddress for ServiceClient {
    fn owner_address(&self) -> &str {
        &self.address
    }
}

fn header_value(value: &str) -> Result<HeaderValue, PipelineError> {
    HeaderValue::from_str(value)
        .map_err(|e| PipelineError::Config(format!("invalid service url {value:?}: {e}")))
}

async fn read_text(response: reqwest::Response) -> Result<String, PipelineError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(PipelineError::Protocol(format!(
            "request failed ({status}): {}",
            excerpt(&text)
        )));
    }
    Ok(text)
}

async fn read_json(response: reqwest::Response) -> Result<Value, PipelineError> {
    let text = read_text(response).await?;
    serde_json::from_str(&text)
        .map_err(|_| PipelineError::Protocol(format!("bad json response: {}", excerpt(&text))))
}

fn excerpt(text: &str) -> String {
    text.chars().take(350).collect::<String>().replace('\n', " ")
}
