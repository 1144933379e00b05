//! Conversational transaction pipeline for drover.
//!
//! A job is carried out by asking a remote assistant for a swap or bridge,
//! turning its tool call into a tracked remote pipeline, and then polling that
//! pipeline until it hands back something to sign or submit on-chain.
//!
//! This crate provides:
//! - The retry policy wrapped around every remote leg
//! - A parser for the assistant's position-tagged response stream
//! - An HTTP client for the remote service
//! - The pipeline state machine for opening and closing legs

mod actions;
mod error;
mod pipeline;
mod prompts;
mod retry;
mod service;
mod session;
mod stream;

pub use actions::{EvmTxData, SwapAction, SwapData, classify_swap_data, extract_pipeline_id};
pub use error::PipelineError;
pub use pipeline::{BridgePlan, Pipeline, PipelineConfig, Stage, SwapPlan};
pub use prompts::{Amount, PromptBook, PromptRequest};
pub use retry::{Classify, HasOwnerAddress, RetryPolicy};
pub use service::{Conversation, Points, QuestSummary, ServerAction, ServiceClient};
pub use session::{Session, generate_nonce, siwe_message};
pub use stream::{ChatReply, StreamPart, ToolCall, json_segment, parse_stream, segment};
