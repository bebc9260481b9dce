use std::sync::Arc;

use serde::Deserialize;

use leadline_core::context::ContextSnapshot;
use leadline_core::domain::event::EventType;

use crate::llm::{decode_structured, LlmClient};

/// Drafted reply for the first touch on an inbound event.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct IntakeDraft {
    pub reply: String,
}

const MAX_REPLY_CHARS: usize = 480;

pub struct IntakeAgent {
    llm: Arc<dyn LlmClient>,
}

impl IntakeAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Never fails: provider errors and schema-invalid output fall back to a
    /// deterministic template so the plan keeps moving.
    pub async fn draft_reply(&self, event_type: EventType, snapshot: &ContextSnapshot) -> IntakeDraft {
        let prompt = self.build_prompt(event_type, snapshot);
        match self.llm.complete(&prompt).await {
            Ok(raw) => match decode_structured::<IntakeDraft>(&raw) {
                Ok(draft) if is_valid_reply(&draft.reply) => draft,
                Ok(_) => {
                    tracing::warn!(
                        event_name = "agent.intake.invalid_draft",
                        "intake draft failed validation; using fallback"
                    );
                    fallback_reply(event_type, snapshot)
                }
                Err(error) => {
                    tracing::warn!(
                        event_name = "agent.intake.schema_invalid",
                        error = %error,
                        "intake completion was not a valid draft; using fallback"
                    );
                    fallback_reply(event_type, snapshot)
                }
            },
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.intake.provider_error",
                    error = %error,
                    "intake provider call failed; using fallback"
                );
                fallback_reply(event_type, snapshot)
            }
        }
    }

    fn build_prompt(&self, event_type: EventType, snapshot: &ContextSnapshot) -> String {
        let mut prompt = format!(
            "You draft SMS replies for {business}, serving {area}. Services: {services}.\n\
             A customer just triggered a `{event}` event.",
            business = snapshot.business.name,
            area = snapshot.business.service_area,
            services = snapshot.business.services.join(", "),
            event = event_type.as_str(),
        );

        if let Some(message) = snapshot.last_customer_message() {
            prompt.push_str(&format!("\nTheir latest message: {}", message.content));
        }
        if let Some(name) = snapshot.customer_name() {
            prompt.push_str(&format!("\nCustomer name: {name}"));
        }

        prompt.push_str(
            "\nRespond with JSON only: {\"reply\": \"<one friendly SMS under 480 characters>\"}",
        );
        prompt
    }
}

fn is_valid_reply(reply: &str) -> bool {
    let trimmed = reply.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= MAX_REPLY_CHARS
}

fn fallback_reply(event_type: EventType, snapshot: &ContextSnapshot) -> IntakeDraft {
    let business = &snapshot.business.name;
    let reply = match event_type {
        EventType::MissedCall => format!(
            "Hi, this is {business}. Sorry we missed your call! How can we help today?"
        ),
        EventType::InboundSms => format!(
            "Thanks for reaching out to {business}! We'll get you an answer right away - what service do you need?"
        ),
        EventType::WebLead => format!(
            "Thanks for your request to {business}! We received your details and will follow up with scheduling options shortly."
        ),
        EventType::JobCompleted => {
            format!("Thanks from the whole team at {business}!")
        }
    };
    IntakeDraft { reply }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use leadline_core::config::BusinessProfile;
    use leadline_core::context::ContextSnapshot;
    use leadline_core::domain::event::EventType;

    use super::IntakeAgent;
    use crate::llm::ScriptedLlmClient;

    fn snapshot() -> ContextSnapshot {
        ContextSnapshot::new(
            None,
            Vec::new(),
            BusinessProfile {
                name: "Brightside Exteriors".to_owned(),
                services: vec!["gutter cleaning".to_owned()],
                service_area: "Travis County".to_owned(),
                ..BusinessProfile::default()
            },
        )
    }

    #[tokio::test]
    async fn uses_the_provider_draft_when_it_validates() {
        let llm = Arc::new(ScriptedLlmClient::with_responses(vec![Ok(
            r#"{"reply": "Hey! Sorry we missed you - want us to call back?"}"#.to_owned(),
        )]));
        let agent = IntakeAgent::new(llm);

        let draft = agent.draft_reply(EventType::MissedCall, &snapshot()).await;
        assert_eq!(draft.reply, "Hey! Sorry we missed you - want us to call back?");
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_the_template() {
        let llm = Arc::new(ScriptedLlmClient::with_responses(vec![Err("timeout".to_owned())]));
        let agent = IntakeAgent::new(llm);

        let draft = agent.draft_reply(EventType::MissedCall, &snapshot()).await;
        assert!(draft.reply.contains("Brightside Exteriors"));
        assert!(draft.reply.contains("missed your call"));
    }

    #[tokio::test]
    async fn schema_invalid_output_falls_back_to_the_template() {
        let llm = Arc::new(ScriptedLlmClient::with_responses(vec![Ok(
            "I think you should say hello.".to_owned(),
        )]));
        let agent = IntakeAgent::new(llm);

        let draft = agent.draft_reply(EventType::InboundSms, &snapshot()).await;
        assert!(draft.reply.contains("Brightside Exteriors"));
    }

    #[tokio::test]
    async fn oversized_reply_is_rejected_in_favor_of_the_template() {
        let oversized = "x".repeat(600);
        let llm = Arc::new(ScriptedLlmClient::with_responses(vec![Ok(format!(
            r#"{{"reply": "{oversized}"}}"#
        ))]));
        let agent = IntakeAgent::new(llm);

        let draft = agent.draft_reply(EventType::WebLead, &snapshot()).await;
        assert!(draft.reply.chars().count() <= 480);
    }
}
