use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;

use leadline_core::context::ContextSnapshot;

use crate::llm::{decode_structured, LlmClient};

/// Drafted quote: outbound message text plus the structured number the
/// engine persists with the pending action.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct QuoteDraft {
    pub message: String,
    pub price: Decimal,
    pub service_type: String,
}

/// Flat fallback rate used when the provider cannot produce a valid draft.
/// A deliberately conservative placeholder the operator sees before approval.
const FALLBACK_PRICE_CENTS: i64 = 15_000;
const MAX_PRICE: Decimal = Decimal::from_parts(10_000_000, 0, 0, false, 2);

pub struct QuoteAgent {
    llm: Arc<dyn LlmClient>,
}

impl QuoteAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn draft_quote(
        &self,
        service_hint: Option<&str>,
        snapshot: &ContextSnapshot,
    ) -> QuoteDraft {
        let prompt = self.build_prompt(service_hint, snapshot);
        match self.llm.complete(&prompt).await {
            Ok(raw) => match decode_structured::<QuoteDraft>(&raw) {
                Ok(draft) if is_valid_quote(&draft) => draft,
                Ok(_) => {
                    tracing::warn!(
                        event_name = "agent.quote.invalid_draft",
                        "quote draft failed validation; using fallback"
                    );
                    fallback_quote(service_hint, snapshot)
                }
                Err(error) => {
                    tracing::warn!(
                        event_name = "agent.quote.schema_invalid",
                        error = %error,
                        "quote completion was not a valid draft; using fallback"
                    );
                    fallback_quote(service_hint, snapshot)
                }
            },
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.quote.provider_error",
                    error = %error,
                    "quote provider call failed; using fallback"
                );
                fallback_quote(service_hint, snapshot)
            }
        }
    }

    fn build_prompt(&self, service_hint: Option<&str>, snapshot: &ContextSnapshot) -> String {
        let mut prompt = format!(
            "You draft service quotes for {business} in {area}. Services: {services}.",
            business = snapshot.business.name,
            area = snapshot.business.service_area,
            services = snapshot.business.services.join(", "),
        );
        if let Some(service) = service_hint {
            prompt.push_str(&format!("\nRequested service: {service}"));
        }
        if let Some(message) = snapshot.last_customer_message() {
            prompt.push_str(&format!("\nCustomer request: {}", message.content));
        }
        prompt.push_str(
            "\nRespond with JSON only: {\"message\": \"<SMS quote text>\", \
             \"price\": <dollars as number>, \"service_type\": \"<service>\"}",
        );
        prompt
    }
}

fn is_valid_quote(draft: &QuoteDraft) -> bool {
    !draft.message.trim().is_empty()
        && !draft.service_type.trim().is_empty()
        && draft.price > Decimal::ZERO
        && draft.price <= MAX_PRICE
}

fn fallback_quote(service_hint: Option<&str>, snapshot: &ContextSnapshot) -> QuoteDraft {
    let service_type = service_hint
        .map(str::to_owned)
        .or_else(|| snapshot.business.services.first().cloned())
        .unwrap_or_else(|| "general service".to_owned());
    let price = Decimal::new(FALLBACK_PRICE_CENTS, 2);

    QuoteDraft {
        message: format!(
            "Thanks for asking! {business} can take care of {service_type} starting at ${price}. \
             Reply YES and we'll get you on the schedule.",
            business = snapshot.business.name,
        ),
        price,
        service_type,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use leadline_core::config::BusinessProfile;
    use leadline_core::context::ContextSnapshot;

    use super::QuoteAgent;
    use crate::llm::ScriptedLlmClient;

    fn snapshot() -> ContextSnapshot {
        ContextSnapshot::new(
            None,
            Vec::new(),
            BusinessProfile {
                name: "Brightside Exteriors".to_owned(),
                services: vec!["gutter cleaning".to_owned(), "lawn care".to_owned()],
                service_area: "Travis County".to_owned(),
                ..BusinessProfile::default()
            },
        )
    }

    #[tokio::test]
    async fn uses_the_provider_draft_when_it_validates() {
        let llm = Arc::new(ScriptedLlmClient::with_responses(vec![Ok(
            r#"{"message": "Gutter cleaning for $180 flat.", "price": 180, "service_type": "gutter cleaning"}"#
                .to_owned(),
        )]));
        let agent = QuoteAgent::new(llm);

        let draft = agent.draft_quote(Some("gutter cleaning"), &snapshot()).await;
        assert_eq!(draft.price, Decimal::new(180, 0));
        assert_eq!(draft.service_type, "gutter cleaning");
    }

    #[tokio::test]
    async fn non_positive_price_is_rejected_in_favor_of_the_fallback() {
        let llm = Arc::new(ScriptedLlmClient::with_responses(vec![Ok(
            r#"{"message": "free!", "price": 0, "service_type": "lawn care"}"#.to_owned(),
        )]));
        let agent = QuoteAgent::new(llm);

        let draft = agent.draft_quote(Some("lawn care"), &snapshot()).await;
        assert_eq!(draft.price, Decimal::new(15_000, 2));
        assert_eq!(draft.service_type, "lawn care");
    }

    #[tokio::test]
    async fn provider_failure_falls_back_with_the_hinted_service() {
        let llm = Arc::new(ScriptedLlmClient::with_responses(vec![Err("down".to_owned())]));
        let agent = QuoteAgent::new(llm);

        let draft = agent.draft_quote(Some("lawn care"), &snapshot()).await;
        assert!(draft.message.contains("lawn care"));
        assert!(draft.price > Decimal::ZERO);
    }

    #[tokio::test]
    async fn fallback_without_a_hint_uses_the_first_offered_service() {
        let llm = Arc::new(ScriptedLlmClient::default());
        let agent = QuoteAgent::new(llm);

        let draft = agent.draft_quote(None, &snapshot()).await;
        assert_eq!(draft.service_type, "gutter cleaning");
    }
}
