//! Tool planning

use crate::query::Intent;

/// Searches policy documents
pub const POLICY_TOOL: &str = "policy_tool";

/// Searches operations documents
pub const OPS_TOOL: &str = "ops_tool";

/// Ordered tool plan for an intent
pub fn plan_tools(intent: Intent) -> Vec<&'static str> {
    match intent {
        Intent::Policy => vec![POLICY_TOOL],
        Intent::Ops => vec![OPS_TOOL],
        Intent::Ambiguous => vec![POLICY_TOOL, OPS_TOOL],
    }
}

/// Document category searched by a standard tool
pub fn category_for_tool(tool: &str) -> Option<&'static str> {
    match tool {
        POLICY_TOOL => Some("policy"),
        OPS_TOOL => Some("ops"),
        _ => None,
    }
}

/// Provider label for answers that no model wrote
pub fn infer_provider_label(tool_calls: &[String]) -> &'static str {
    if tool_calls.is_empty() {
        "graph"
    } else if tool_calls.iter().all(|t| t == POLICY_TOOL) {
        "policy-lookup"
    } else if tool_calls.iter().all(|t| t == OPS_TOOL) {
        "ops-lookup"
    } else {
        "graph"
    }
}
