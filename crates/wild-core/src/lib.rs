//! # wild-core
//!
//! The autonomous control loop ("wild loop") for ML experiment sweeps.
//!
//! This crate provides:
//! - The priority event queue holding prompts awaiting delivery
//! - The phase controller that owns loop state and transition rules
//! - The poller that converts backend status changes into queued events
//! - Signal and job-spec parsing from agent response text
//! - Prompt construction with provenance bookkeeping
//!
//! The crate is a library consumed by a delivery mechanism: the host calls
//! [`WildLoop::start`] with a goal, repeatedly delivers the head of the queue
//! to a reasoning agent, and feeds each raw response back through
//! [`WildLoop::on_response_complete`].

mod controller;
mod poller;
pub mod prompts;
pub mod queue;
pub mod signal_parser;

pub use controller::{LoopState, LoopStatus, TerminationConditions, TerminationReason, WildLoop};
pub use prompts::{FallbackRenderer, PromptBuilder, StaticTemplateRenderer};
pub use queue::EventQueue;
pub use signal_parser::{AlertResolution, LoopSignal};
