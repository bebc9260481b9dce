use serde::{Deserialize, Serialize};

/// Explicit planner configuration. Passed by value into every `plan()` call
/// so planning stays a pure function of its arguments; never read from
/// ambient state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerPolicy {
    /// Bumped whenever the planning rules change; recorded in the audit
    /// trail so replans can be traced to the policy that produced them.
    pub version: u32,
    /// When false, drafted quotes are held for approval instead of being
    /// sent immediately.
    pub auto_quote_enabled: bool,
    /// When true, booking steps suspend the plan behind a pending action.
    pub approvals_required_for_booking: bool,
    /// Whether job completions trigger review-request drafting at all.
    pub review_requests_enabled: bool,
}

impl Default for PlannerPolicy {
    fn default() -> Self {
        Self {
            version: 1,
            auto_quote_enabled: false,
            approvals_required_for_booking: true,
            review_requests_enabled: true,
        }
    }
}
