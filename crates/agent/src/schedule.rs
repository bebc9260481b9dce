use std::sync::Arc;

use serde::Deserialize;

use leadline_core::context::ContextSnapshot;

use crate::llm::{decode_structured, LlmClient};

/// Structured scheduling decision over the offered slots.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ScheduleDraft {
    pub can_schedule: bool,
    pub proposed_date_index: usize,
    pub suggested_message: String,
    pub needs_confirmation: bool,
}

pub struct ScheduleAgent {
    llm: Arc<dyn LlmClient>,
}

impl ScheduleAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// `slots` is the ordered list of offered dates; `proposed_date_index`
    /// points into it. An index out of range is schema-invalid.
    pub async fn draft_schedule(
        &self,
        customer_name: &str,
        service: &str,
        slots: &[String],
        snapshot: &ContextSnapshot,
    ) -> ScheduleDraft {
        let prompt = self.build_prompt(customer_name, service, slots, snapshot);
        match self.llm.complete(&prompt).await {
            Ok(raw) => match decode_structured::<ScheduleDraft>(&raw) {
                Ok(draft) if is_valid_schedule(&draft, slots) => draft,
                Ok(_) => {
                    tracing::warn!(
                        event_name = "agent.schedule.invalid_draft",
                        "schedule draft failed validation; using fallback"
                    );
                    fallback_schedule(customer_name, service, slots, snapshot)
                }
                Err(error) => {
                    tracing::warn!(
                        event_name = "agent.schedule.schema_invalid",
                        error = %error,
                        "schedule completion was not a valid draft; using fallback"
                    );
                    fallback_schedule(customer_name, service, slots, snapshot)
                }
            },
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.schedule.provider_error",
                    error = %error,
                    "schedule provider call failed; using fallback"
                );
                fallback_schedule(customer_name, service, slots, snapshot)
            }
        }
    }

    fn build_prompt(
        &self,
        customer_name: &str,
        service: &str,
        slots: &[String],
        snapshot: &ContextSnapshot,
    ) -> String {
        format!(
            "You schedule jobs for {business}. Customer {customer_name} wants {service}.\n\
             Offered dates (zero-indexed): {slots}\n\
             Respond with JSON only: {{\"can_schedule\": <bool>, \
             \"proposed_date_index\": <index into the offered dates>, \
             \"suggested_message\": \"<SMS confirming the proposal>\", \
             \"needs_confirmation\": <bool>}}",
            business = snapshot.business.name,
            slots = slots.join(", "),
        )
    }
}

fn is_valid_schedule(draft: &ScheduleDraft, slots: &[String]) -> bool {
    !draft.suggested_message.trim().is_empty()
        && (!draft.can_schedule || draft.proposed_date_index < slots.len())
}

fn fallback_schedule(
    customer_name: &str,
    service: &str,
    slots: &[String],
    snapshot: &ContextSnapshot,
) -> ScheduleDraft {
    match slots.first() {
        Some(first_slot) => ScheduleDraft {
            can_schedule: true,
            proposed_date_index: 0,
            suggested_message: format!(
                "Hi {customer_name}, {business} can take care of your {service} on {first_slot}. \
                 Does that work for you?",
                business = snapshot.business.name,
            ),
            needs_confirmation: true,
        },
        None => ScheduleDraft {
            can_schedule: false,
            proposed_date_index: 0,
            suggested_message: format!(
                "Hi {customer_name}, {business} received your {service} request - we'll text you \
                 as soon as a crew opening comes up.",
                business = snapshot.business.name,
            ),
            needs_confirmation: true,
        },
    }
}
