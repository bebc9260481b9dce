use std::sync::Arc;

use serde::Deserialize;

use leadline_core::context::ContextSnapshot;

use crate::llm::{decode_structured, LlmClient};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ReviewDraft {
    pub message: String,
}

pub struct ReviewAgent {
    llm: Arc<dyn LlmClient>,
}

impl ReviewAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn draft_review_request(&self, snapshot: &ContextSnapshot) -> ReviewDraft {
        let prompt = self.build_prompt(snapshot);
        match self.llm.complete(&prompt).await {
            Ok(raw) => match decode_structured::<ReviewDraft>(&raw) {
                Ok(draft) if !draft.message.trim().is_empty() => {
                    ensure_review_link(draft, snapshot)
                }
                Ok(_) | Err(_) => {
                    tracing::warn!(
                        event_name = "agent.reviews.schema_invalid",
                        "review completion was not a valid draft; using fallback"
                    );
                    fallback_review(snapshot)
                }
            },
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.reviews.provider_error",
                    error = %error,
                    "review provider call failed; using fallback"
                );
                fallback_review(snapshot)
            }
        }
    }

    fn build_prompt(&self, snapshot: &ContextSnapshot) -> String {
        let mut prompt = format!(
            "You draft post-job review requests for {business}.",
            business = snapshot.business.name,
        );
        if let Some(name) = snapshot.customer_name() {
            prompt.push_str(&format!("\nCustomer name: {name}"));
        }
        if let Some(link) = &snapshot.business.review_link {
            prompt.push_str(&format!("\nReview link to include verbatim: {link}"));
        }
        prompt.push_str(
            "\nRespond with JSON only: {\"message\": \"<short thank-you SMS asking for a review>\"}",
        );
        prompt
    }
}

/// A drafted request that drops the configured link gets it appended rather
/// than thrown away.
fn ensure_review_link(mut draft: ReviewDraft, snapshot: &ContextSnapshot) -> ReviewDraft {
    if let Some(link) = &snapshot.business.review_link {
        if !draft.message.contains(link.as_str()) {
            draft.message = format!("{} {link}", draft.message.trim_end());
        }
    }
    draft
}

fn fallback_review(snapshot: &ContextSnapshot) -> ReviewDraft {
    let greeting = match snapshot.customer_name() {
        Some(name) => format!("Thanks {name}!"),
        None => "Thank you!".to_owned(),
    };
    let mut message = format!(
        "{greeting} It was a pleasure working with you - {business} would love a quick review if \
         you have a minute.",
        business = snapshot.business.name,
    );
    if let Some(link) = &snapshot.business.review_link {
        message.push_str(&format!(" {link}"));
    }
    ReviewDraft { message }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use leadline_core::config::BusinessProfile;
    use leadline_core::context::ContextSnapshot;

    use super::ReviewAgent;
    use crate::llm::ScriptedLlmClient;

    fn snapshot_with_link() -> ContextSnapshot {
        ContextSnapshot::new(
            None,
            Vec::new(),
            BusinessProfile {
                name: "Brightside Exteriors".to_owned(),
                services: vec!["lawn care".to_owned()],
                service_area: "Travis County".to_owned(),
                review_link: Some("https://reviews.example.com/brightside".to_owned()),
                ..BusinessProfile::default()
            },
        )
    }

    #[tokio::test]
    async fn appends_the_review_link_when_the_draft_omits_it() {
        let llm = Arc::new(ScriptedLlmClient::with_responses(vec![Ok(
            r#"{"message": "Thanks for choosing us!"}"#.to_owned(),
        )]));
        let agent = ReviewAgent::new(llm);

        let draft = agent.draft_review_request(&snapshot_with_link()).await;
        assert!(draft.message.contains("https://reviews.example.com/brightside"));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_with_the_link() {
        let llm = Arc::new(ScriptedLlmClient::with_responses(vec![Err("down".to_owned())]));
        let agent = ReviewAgent::new(llm);

        let draft = agent.draft_review_request(&snapshot_with_link()).await;
        assert!(draft.message.contains("Brightside Exteriors"));
        assert!(draft.message.contains("https://reviews.example.com/brightside"));
    }
}
