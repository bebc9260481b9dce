//! Agent adapters - drafted content for the orchestration engine
//!
//! Each adapter here is a pure decision/content producer: it builds a prompt
//! from an immutable context snapshot, asks the natural-language provider for
//! a completion, and validates the result into a typed draft. Nothing in this
//! crate persists state or commits side effects.
//!
//! # Safety Principle
//!
//! The provider is strictly a copywriter. It never decides *whether* a quote
//! is sent, a job is booked, or an approval is required - those are
//! deterministic planner/policy decisions. When the provider fails or returns
//! schema-invalid output, every adapter falls back to a deterministic
//! templated draft so the plan keeps moving.

pub mod intake;
pub mod llm;
pub mod quote;
pub mod reviews;
pub mod schedule;

pub use intake::{IntakeAgent, IntakeDraft};
pub use llm::{LlmClient, NoopLlmClient, ScriptedLlmClient};
pub use quote::{QuoteAgent, QuoteDraft};
pub use reviews::{ReviewAgent, ReviewDraft};
pub use schedule::{ScheduleAgent, ScheduleDraft};
