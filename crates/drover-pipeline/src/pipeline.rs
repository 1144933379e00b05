//! The per-job state machine: sign in, ask for a leg, drive the remote
//! pipeline to something executable, and settle it on-chain.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use drover_chain::{
    Address, B256, Chain, ChainClient, ChainError, TokenAmount, TxDescriptor, U256, decode_approve,
};
use drover_queue::{ClaimedJob, Job, JobContext, JobKind, Store};
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::actions::{SwapAction, SwapData, classify_swap_data, estimate_id, extract_pipeline_id};
use crate::prompts::{Amount, PromptBook, PromptRequest};
use crate::retry::{HasOwnerAddress, RetryPolicy};
use crate::service::{Conversation, ServerAction, ServiceClient};
use crate::session::{Session, generate_nonce, siwe_message};
use crate::stream::ChatReply;
use crate::PipelineError;

const SOURCE: &str = "pipeline";
const SWAP_TOOL: &str = "show_swap_or_bridge_ui";
/// Dust kept on a bridge's destination chain when nothing else was there.
const BRIDGE_DUST_ETH: f64 = 0.000005;

/// Opening and closing amounts for swap jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapPlan {
    /// Token symbols to buy with ETH.
    pub tokens: Vec<String>,
    /// USD value of ETH spent on an opening swap.
    pub eth_usd: RangeInclusive<f64>,
    /// Percent of the token balance sold back on a closing swap.
    pub back_swap: RangeInclusive<f64>,
}

impl Default for SwapPlan {
    fn default() -> Self {
        Self {
            tokens: vec!["USDC".to_string()],
            eth_usd: 1.0..=3.0,
            back_swap: 100.0..=100.0,
        }
    }
}

/// Destinations and amounts for bridge jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgePlan {
    pub to_chains: Vec<Chain>,
    pub eth_usd: RangeInclusive<f64>,
}

impl Default for BridgePlan {
    fn default() -> Self {
        Self {
            to_chains: vec![Chain::Arbitrum, Chain::Optimism],
            eth_usd: 1.0..=3.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub swap: SwapPlan,
    pub bridge: BridgePlan,
    /// Chain every opening leg starts from.
    pub home_chain: Chain,
    /// Token addresses on the home chain, by symbol.
    pub tokens: HashMap<String, Address>,
    pub poll_interval: Duration,
    /// Swap-data polls before a leg gives up.
    pub max_polls: u32,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            swap: SwapPlan::default(),
            bridge: BridgePlan::default(),
            home_chain: Chain::Base,
            tokens: HashMap::new(),
            poll_interval: Duration::from_secs(3),
            max_polls: 100,
            retry: RetryPolicy::default(),
        }
    }
}

/// Where a leg currently is, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingReply,
    ParsedToolCall,
    PipelineCreated,
    AwaitingSwapData,
    ApprovalNeeded,
    SignatureNeeded,
    TxReady,
    Submitted,
    Confirmed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::AwaitingReply => "awaiting_reply",
            Stage::ParsedToolCall => "parsed_tool_call",
            Stage::PipelineCreated => "pipeline_created",
            Stage::AwaitingSwapData => "awaiting_swap_data",
            Stage::ApprovalNeeded => "approval_needed",
            Stage::SignatureNeeded => "signature_needed",
            Stage::TxReady => "tx_ready",
            Stage::Submitted => "submitted",
            Stage::Confirmed => "confirmed",
        };
        f.write_str(name)
    }
}

/// Runs jobs for any wallet. Cheap to share across workers.
pub struct Pipeline {
    store: Arc<Store>,
    config: Arc<PipelineConfig>,
    prompts: Arc<PromptBook>,
}

impl Pipeline {
    pub fn new(store: Arc<Store>, config: Arc<PipelineConfig>, prompts: Arc<PromptBook>) -> Self {
        Self {
            store,
            config,
            prompts,
        }
    }

    /// Carry out one claimed job.
    ///
    /// Opening legs queue their closing leg before returning. The job itself
    /// is committed by the caller.
    #[instrument(skip_all, fields(address = %job.address, kind = %job.job.kind, closing = job.job.is_closing()))]
    pub async fn execute(
        &self,
        job: &ClaimedJob,
        chain: &dyn ChainClient,
        service: &ServiceClient,
    ) -> Result<(), PipelineError> {
        let run = WalletRun {
            pipeline: self,
            job,
            chain,
            service,
        };
        let retry = &self.config.retry;

        chain.wait_for_gwei().await?;
        retry.run(&run, SOURCE, "login", || run.login()).await?;

        match (job.job.kind, job.job.is_closing()) {
            (JobKind::Swap, false) => run.open_swap().await?,
            (JobKind::Swap, true) => run.close_swap().await?,
            (JobKind::Bridge, false) => run.open_bridge().await?,
            (JobKind::Bridge, true) => run.close_bridge().await?,
        }

        if self.store.remaining_count(&job.encrypted_key).await? == 1 {
            run.report_stats().await?;
        }
        Ok(())
    }
}

/// A leg request with its prompt and the chains it touches.
struct Leg {
    prompt: PromptRequest,
    kind: JobKind,
    from_chain: Chain,
    /// Destination chain whose balance proves a bridge landed.
    to_chain: Option<Chain>,
    error_text: &'static str,
}

/// A remote pipeline that reached an executable state.
struct Prepared {
    chat_id: String,
    pipeline_id: Value,
    data: SwapData,
}

/// One job's execution context.
struct WalletRun<'a> {
    pipeline: &'a Pipeline,
    job: &'a ClaimedJob,
    chain: &'a dyn ChainClient,
    service: &'a ServiceClient,
}

impl HasOwnerAddress for WalletRun<'_> {
    fn owner_address(&self) -> &str {
        &self.job.address
    }
}

impl WalletRun<'_> {
    fn config(&self) -> &PipelineConfig {
        &self.pipeline.config
    }

    fn store(&self) -> &Store {
        &self.pipeline.store
    }

    fn key(&self) -> &str {
        &self.job.encrypted_key
    }

    fn address(&self) -> &str {
        &self.job.address
    }

    async fn login(&self) -> Result<(), PipelineError> {
        let referral_code = self.store().referral_lookup(self.address()).await?;
        let message = siwe_message(self.address(), &generate_nonce(), Utc::now());
        let signature = self.chain.sign_message(&message).await?;
        self.service
            .verify_siwe(&message, &signature, &referral_code)
            .await?;
        self.service
            .set_session(Session {
                sign_in_message: message,
                signature,
            })
            .await;

        let mut points = self.service.points().await?;
        if points.referral_code.is_none() {
            self.service.register(&referral_code).await?;
            let line = if referral_code.is_empty() {
                info!(address = self.address(), "registered without referral code");
                "register <b>without</b> ref code".to_string()
            } else {
                info!(address = self.address(), code = %referral_code, "registered with referral code");
                format!("register with ref code {referral_code}")
            };
            self.store().append_report(self.key(), &line, None).await?;
            points = self.service.points().await?;
        }

        match points.referral_code {
            Some(code) => Ok(self.store().referral_record(self.address(), &code).await?),
            None => Err(PipelineError::Protocol(
                "account has no referral code after registration".into(),
            )),
        }
    }

    async fn open_swap(&self) -> Result<(), PipelineError> {
        let (token, usd) = {
            let plan = &self.config().swap;
            let mut rng = rand::thread_rng();
            let token = plan.tokens.choose(&mut rng).cloned().ok_or_else(|| {
                PipelineError::Config("no tokens configured for swaps".into())
            })?;
            let digits = rng.gen_range(0..=2);
            (token, round_to(rng.gen_range(plan.eth_usd.clone()), digits))
        };

        let home = self.config().home_chain;
        let leg = Leg {
            prompt: PromptRequest::Swap {
                amount: Amount::Usd(usd),
                from_token: "ETH".into(),
                to_token: token.clone(),
                chain_name: home.display_name().into(),
            },
            kind: JobKind::Swap,
            from_chain: home,
            to_chain: None,
            error_text: "Not found Swap routes",
        };
        self.config()
            .retry
            .run(self, SOURCE, "swap", || self.run_leg(&leg))
            .await?;

        let mut context = JobContext::new();
        context.insert("token_name".into(), json!(token));
        self.store()
            .append_job(self.key(), Job::closing(JobKind::Swap, context))
            .await?;
        Ok(())
    }

    async fn close_swap(&self) -> Result<(), PipelineError> {
        let token = context_str(&self.job.job.context, "token_name")?;
        let home = self.config().home_chain;
        let address = *self.config().tokens.get(&token).ok_or_else(|| {
            PipelineError::NonRetryable(format!("token {token} is not configured"))
        })?;

        let balance = self.chain.token_balance(home, address).await?.as_f64();
        let amount = {
            let mut rng = rand::thread_rng();
            let percent = rng.gen_range(self.config().swap.back_swap.clone()) / 100.0;
            truncate_to(balance * percent, rng.gen_range(5..=7))
        };
        if amount <= 0.0 {
            return Err(PipelineError::NonRetryable(format!(
                "no {token} balance to swap back"
            )));
        }

        let leg = Leg {
            prompt: PromptRequest::Swap {
                amount: Amount::Tokens(amount),
                from_token: token,
                to_token: "ETH".into(),
                chain_name: home.display_name().into(),
            },
            kind: JobKind::Swap,
            from_chain: home,
            to_chain: None,
            error_text: "Not found Swap routes",
        };
        self.config()
            .retry
            .run(self, SOURCE, "swap", || self.run_leg(&leg))
            .await?;
        Ok(())
    }

    async fn open_bridge(&self) -> Result<(), PipelineError> {
        let (destination, usd) = {
            let plan = &self.config().bridge;
            let mut rng = rand::thread_rng();
            let destination = *plan.to_chains.choose(&mut rng).ok_or_else(|| {
                PipelineError::Config("no destination chains configured for bridges".into())
            })?;
            let digits = rng.gen_range(0..=2);
            (destination, round_to(rng.gen_range(plan.eth_usd.clone()), digits))
        };

        let home = self.config().home_chain;
        let leg = Leg {
            prompt: PromptRequest::Bridge {
                amount: Amount::Usd(usd),
                from_chain: home.as_str().into(),
                to_chain: destination.as_str().into(),
            },
            kind: JobKind::Bridge,
            from_chain: home,
            to_chain: Some(destination),
            error_text: "Not found Bridge routes",
        };
        let bridged = self
            .config()
            .retry
            .run(self, SOURCE, "bridge", || self.run_leg(&leg))
            .await?
            .ok_or_else(|| PipelineError::Protocol("bridge finished without a measured arrival".into()))?;

        let mut context = JobContext::new();
        context.insert("from_chain".into(), json!(destination.as_str()));
        context.insert("token_amount".into(), json!(bridged));
        self.store()
            .append_job(self.key(), Job::closing(JobKind::Bridge, context))
            .await?;
        Ok(())
    }

    async fn close_bridge(&self) -> Result<(), PipelineError> {
        let context = &self.job.job.context;
        let source: Chain = context_str(context, "from_chain")?
            .parse()
            .map_err(|e: ChainError| PipelineError::NonRetryable(e.to_string()))?;
        let mut amount = context
            .get("token_amount")
            .and_then(Value::as_f64)
            .ok_or_else(|| PipelineError::NonRetryable("bridge context has no token_amount".into()))?;

        let balance = eth(self.chain.native_balance(source).await?);
        if balance - amount <= BRIDGE_DUST_ETH {
            amount -= BRIDGE_DUST_ETH;
        }
        let amount = truncate_to(amount, rand::thread_rng().gen_range(5..=7));
        if amount <= 0.0 {
            return Err(PipelineError::NonRetryable(format!(
                "nothing to bridge back from {source}"
            )));
        }

        let home = self.config().home_chain;
        let leg = Leg {
            prompt: PromptRequest::Bridge {
                amount: Amount::Tokens(amount),
                from_chain: source.as_str().into(),
                to_chain: home.as_str().into(),
            },
            kind: JobKind::Bridge,
            from_chain: source,
            to_chain: Some(home),
            error_text: "Not found Bridge routes",
        };
        self.config()
            .retry
            .run(self, SOURCE, "bridge", || self.run_leg(&leg))
            .await?;
        Ok(())
    }

    /// One attempt at a leg. Returns the ETH that arrived on the destination
    /// chain for bridges.
    async fn run_leg(&self, leg: &Leg) -> Result<Option<f64>, PipelineError> {
        let prepared = self.prepare(leg).await?;
        match prepared.data {
            SwapData::SignatureNeeded(action) => {
                self.settle_signature(leg, &prepared.chat_id, &prepared.pipeline_id, &action)
                    .await
            }
            SwapData::TxReady { action, raw_data } => {
                self.settle_transaction(leg, &prepared.chat_id, &prepared.pipeline_id, &action, &raw_data)
                    .await
            }
            SwapData::Approval(_) | SwapData::Pending => Err(PipelineError::Protocol(
                "pipeline stopped before it was executable".into(),
            )),
        }
    }

    /// Ask for the leg and poll the remote pipeline until it is executable.
    async fn prepare(&self, leg: &Leg) -> Result<Prepared, PipelineError> {
        let question = self.pipeline.prompts.render(&leg.prompt)?;
        info!(address = self.address(), question = %question, "asking assistant");
        debug!(stage = %Stage::AwaitingReply);

        let mut conversation = self.service.start_conversation();
        let reply = self.service.chat(&mut conversation, &question, None).await?;
        let reply = self.follow_up(&mut conversation, reply, leg.error_text).await?;
        let call = reply
            .tool_call(SWAP_TOOL)
            .ok_or_else(|| PipelineError::Protocol(format!("{} in AI answer", leg.error_text)))?;
        debug!(stage = %Stage::ParsedToolCall, tool_call_id = %call.tool_call_id);

        let result = &call.result;
        let bundled = result
            .get("bundledExecution")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let swap_data = json!({
            "amount": result.get("amount"),
            "from_asset": result.get("fromToken"),
            "from_chain": result.get("fromChain"),
            "to_asset": result.get("toToken"),
            "to_chain": result.get("toChain"),
            "eoa_address": result.get("fromAddress"),
            "to_address": result.get("toAddress"),
            "slippage": result.get("slippage"),
            "provider": result.get("provider"),
        });
        let estimate = estimate_id(&self.service.dry_run_pipeline(bundled, swap_data).await?)?;

        let created = self
            .service
            .next_action(
                &conversation.id,
                ServerAction::CreateSwap,
                json!({
                    "pipeline": [{"action_type": "swap", "swap_estimate_id": estimate}],
                    "bundled_execution": bundled,
                    "message_id": call.tool_call_id,
                }),
            )
            .await?;
        let mut pipeline_id = extract_pipeline_id(&created)?;
        debug!(stage = %Stage::PipelineCreated, pipeline_id = %pipeline_id);

        let mut approved: HashSet<(Address, Address)> = HashSet::new();
        for poll in 0..self.config().max_polls {
            if poll > 0 {
                sleep(self.config().poll_interval).await;
            }
            debug!(stage = %Stage::AwaitingSwapData, poll);

            let body = self
                .service
                .next_action(&conversation.id, ServerAction::GetSwapData, pipeline_id.clone())
                .await?;
            match classify_swap_data(&body)? {
                SwapData::Approval(action) => {
                    self.approve(leg, &conversation.id, &pipeline_id, &action, &mut approved)
                        .await?;
                }
                SwapData::Pending => {}
                data => {
                    let task_id = match &data {
                        SwapData::SignatureNeeded(action) => action.task_id.clone(),
                        SwapData::TxReady { action, raw_data } if raw_data.is_empty() => {
                            action.task_id.clone()
                        }
                        _ => None,
                    };
                    if let Some(task_id) = task_id {
                        pipeline_id = task_id;
                    }
                    return Ok(Prepared {
                        chat_id: conversation.id,
                        pipeline_id,
                        data,
                    });
                }
            }
        }

        Err(PipelineError::Protocol(format!(
            "pipeline {pipeline_id} not ready after {} polls",
            self.config().max_polls
        )))
    }

    /// Press the affirmative button when the assistant asks before showing routes.
    async fn follow_up(
        &self,
        conversation: &mut Conversation,
        reply: ChatReply,
        error_text: &str,
    ) -> Result<ChatReply, PipelineError> {
        if reply.tool_call(SWAP_TOOL).is_some() {
            return Ok(reply);
        }
        if reply.buttons().is_empty() {
            return Err(PipelineError::Protocol(format!(
                "{error_text} in AI answer (no buttons)"
            )));
        }
        let Some(button) = reply.affirmative_button() else {
            return Err(PipelineError::Protocol(format!(
                "{error_text} in AI answer (no agree button)"
            )));
        };

        debug!(button = %button, "answering assistant");
        let previous = reply.previous_message(Utc::now());
        let reply = self
            .service
            .chat(conversation, &button, Some(previous))
            .await?;
        if reply.tool_call(SWAP_TOOL).is_none() {
            return Err(PipelineError::Protocol(format!(
                "{error_text} in AI answer (after Yes)"
            )));
        }
        Ok(reply)
    }

    /// Grant the allowance a poll asked for. Only the first request per token
    /// and spender is forced; later ones are skipped once the allowance covers it.
    async fn approve(
        &self,
        leg: &Leg,
        chat_id: &str,
        pipeline_id: &Value,
        action: &SwapAction,
        approved: &mut HashSet<(Address, Address)>,
    ) -> Result<(), PipelineError> {
        debug!(stage = %Stage::ApprovalNeeded);
        let tx = action.tx_descriptor("")?;
        let (spender, value) = decode_approve(&tx.data)?;
        let chain = action.chain(leg.from_chain);
        let force = approved.insert((tx.to, spender));

        let label = format!("approve {}", tx.to);
        let hash = match self.chain.approve(chain, tx.to, spender, value, force).await {
            Ok(Some(hash)) => hash,
            Ok(None) => return Ok(()),
            Err(e) => return Err(self.record_failure(e, &label).await),
        };
        info!(address = self.address(), %chain, tx = %hash, "approval confirmed");
        self.store().append_report(self.key(), &label, Some(true)).await?;

        if action.status.as_deref() == Some("sign_pending") {
            self.report_submitted(chat_id, pipeline_id, hash).await?;
        }
        Ok(())
    }

    async fn settle_signature(
        &self,
        leg: &Leg,
        chat_id: &str,
        pipeline_id: &Value,
        action: &SwapAction,
    ) -> Result<Option<f64>, PipelineError> {
        debug!(stage = %Stage::SignatureNeeded);
        let chain = action.chain(leg.from_chain);
        let label = action.label();
        info!(address = self.address(), action = %label, "signing order");

        let typed = action.typed_data()?;
        let signature = self.chain.sign_typed_data(&typed).await?;
        // A filled bridge order shows up on the destination, a swap on the source.
        let destination = self.destination_snapshot(leg).await?;
        let (watched, before) = match destination {
            Some(snapshot) => snapshot,
            None => (chain, self.chain.native_balance(chain).await?),
        };
        self.service
            .next_action(
                chat_id,
                ServerAction::SignedMessage,
                json!({"task_id": pipeline_id, "status": "signed", "signature": signature}),
            )
            .await?;
        debug!(stage = %Stage::Submitted);

        let arrived = if destination.is_some() {
            Some(self.await_arrival(watched, before).await?)
        } else {
            self.chain.await_balance_change(watched, before, true).await?;
            None
        };
        debug!(stage = %Stage::Confirmed);
        info!(address = self.address(), action = %label, "order filled");
        self.store().append_report(self.key(), &label, Some(true)).await?;
        Ok(arrived)
    }

    async fn settle_transaction(
        &self,
        leg: &Leg,
        chat_id: &str,
        pipeline_id: &Value,
        action: &SwapAction,
        raw_data: &str,
    ) -> Result<Option<f64>, PipelineError> {
        debug!(stage = %Stage::TxReady);
        let chain = action.chain(leg.from_chain);
        let label = action.label();
        info!(address = self.address(), action = %label, "sending transaction");

        let destination = self.destination_snapshot(leg).await?;

        let tx = action.tx_descriptor(raw_data)?;
        let hash = self.send_and_confirm(chain, tx, &label).await?;
        self.report_submitted(chat_id, pipeline_id, hash).await?;

        match destination {
            Some((to, before)) => Ok(Some(self.await_arrival(to, before).await?)),
            None => Ok(None),
        }
    }

    /// Native balance on a bridge's destination chain before it is sent.
    async fn destination_snapshot(&self, leg: &Leg) -> Result<Option<(Chain, U256)>, PipelineError> {
        match (leg.kind, leg.to_chain) {
            (JobKind::Bridge, Some(to)) => Ok(Some((to, self.chain.native_balance(to).await?))),
            _ => Ok(None),
        }
    }

    /// ETH that landed on `to` since the `before` snapshot.
    async fn await_arrival(&self, to: Chain, before: U256) -> Result<f64, PipelineError> {
        let after = self.chain.await_balance_change(to, before, true).await?;
        let arrived = eth(after.saturating_sub(before));
        info!(address = self.address(), chain = %to, arrived, "bridge landed");
        Ok(arrived)
    }

    async fn send_and_confirm(
        &self,
        chain: Chain,
        tx: TxDescriptor,
        label: &str,
    ) -> Result<B256, PipelineError> {
        let hash = self.chain.submit(chain, tx).await?;
        debug!(stage = %Stage::Submitted, %chain, tx = %hash);
        info!(address = self.address(), link = %self.chain.explorer_link(chain, hash), "{label} tx sent");

        if let Err(e) = self.chain.await_confirmation(chain, hash).await {
            return Err(self.record_failure(e, label).await);
        }
        debug!(stage = %Stage::Confirmed, %chain, tx = %hash);
        self.store().append_report(self.key(), label, Some(true)).await?;
        Ok(hash)
    }

    /// Write a failure line with the explorer link when a transaction reverted.
    async fn record_failure(&self, error: ChainError, label: &str) -> PipelineError {
        if let ChainError::Reverted { link } = &error {
            warn!(address = self.address(), action = label, %link, "transaction reverted");
            let line = format!("{label} | tx is failed | <a href=\"{link}\">link 👈</a>");
            if let Err(e) = self.store().append_report(self.key(), &line, Some(false)).await {
                return e.into();
            }
        }
        error.into()
    }

    async fn report_submitted(
        &self,
        chat_id: &str,
        pipeline_id: &Value,
        hash: B256,
    ) -> Result<(), PipelineError> {
        self.service
            .next_action(
                chat_id,
                ServerAction::SendTx,
                json!({"task_id": pipeline_id, "status": "submitted", "tx_hash": hash.to_string()}),
            )
            .await?;
        Ok(())
    }

    /// Add points, rank and quest progress to the report. Best effort.
    async fn report_stats(&self) -> Result<(), PipelineError> {
        let points = match self.service.points().await {
            Ok(points) => points,
            Err(e) => {
                warn!(address = self.address(), error = %e, "failed to fetch points");
                return Ok(());
            }
        };
        let quests = match self.service.quests().await {
            Ok(quests) => quests,
            Err(e) => {
                warn!(address = self.address(), error = %e, "failed to fetch quests");
                return Ok(());
            }
        };

        info!(
            address = self.address(),
            points = %points.points_v2,
            rank = %points.rank_v2,
            quests = %quests,
            "wallet stats"
        );
        let line = format!(
            "\n⭐️ <b>points</b> {}\n🏆 <b>rank</b> {}\n📝 <b>completed quests</b> {quests}",
            plain(&points.points_v2),
            plain(&points.rank_v2),
        );
        self.store().append_report(self.key(), &line, None).await?;
        Ok(())
    }
}

fn context_str(context: &JobContext, field: &str) -> Result<String, PipelineError> {
    context
        .get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| PipelineError::NonRetryable(format!("job context has no {field}")))
}

/// Strings without their JSON quotes.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn eth(wei: U256) -> f64 {
    TokenAmount {
        raw: wei,
        decimals: 18,
    }
    .as_f64()
}

fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

fn truncate_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).trunc() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1.23456, 0, 1.0 ; "whole")]
    #[test_case(1.23556, 2, 1.24 ; "cents")]
    fn test_round_to(value: f64, digits: i32, expected: f64) {
        assert_eq!(round_to(value, digits), expected);
    }

    #[test]
    fn test_truncate_never_rounds_up() {
        assert_eq!(truncate_to(0.12345678, 5), 0.12345);
        assert_eq!(truncate_to(0.99999999, 7), 0.9999999);
    }

    #[test]
    fn test_plain_strips_quotes() {
        assert_eq!(plain(&json!("1,204")), "1,204");
        assert_eq!(plain(&json!(17)), "17");
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::AwaitingSwapData.to_string(), "awaiting_swap_data");
        assert_eq!(Stage::TxReady.to_string(), "tx_ready");
    }
}
