//! Tool facade - interfaces to external side-effecting systems
//!
//! This crate is the only place the orchestration engine touches the outside
//! world:
//! - **SMS delivery** (`sms`) - best-effort outbound text delivery
//! - **FSM** (`fsm`) - the field-service-management system of record for
//!   leads and jobs
//!
//! Each facade is a trait with an HTTP implementation for production, a noop
//! implementation for local development, and a recording implementation for
//! tests. Calls are synchronous either-succeeds-or-fails: no retries at this
//! layer, failures surface as step failures upstream.

pub mod fsm;
pub mod sms;

pub use fsm::{
    ExternalRef, FsmClient, FsmError, HttpFsmClient, NewFsmJob, NewLead, NoopFsmClient,
    RecordingFsmClient,
};
pub use sms::{
    HttpSmsDelivery, NoopSmsDelivery, OutboundSms, RecordingSmsDelivery, SmsDelivery, SmsError,
    SmsReceipt,
};
