//! Compiled self-knowledge injected into provider prompts so external
//! models answer with ew's contract in mind.

const SELF_KNOWLEDGE_JSON: &str = include_str!("self_knowledge.json");

pub fn core_prompt() -> Option<&'static str> {
    if SELF_KNOWLEDGE_JSON.trim().is_empty() {
        return None;
    }
    Some(SELF_KNOWLEDGE_JSON)
}

/// Wraps a task prompt with the self-knowledge document and the
/// machine context, when available.
pub fn wrap_with_self_knowledge(prompt: &str, system_context: &str) -> String {
    let mut parts = Vec::with_capacity(3);
    if let Some(core) = core_prompt() {
        let core = core.trim();
        if !core.is_empty() {
            parts.push(format!("EW_SELF_KNOWLEDGE_JSON:\n{core}"));
        }
    }
    let system_context = system_context.trim();
    if !system_context.is_empty() {
        parts.push(format!("EW_SYSTEM_PROFILE:\n{system_context}"));
    }
    if parts.is_empty() {
        return prompt.trim().to_string();
    }
    parts.push(format!("TASK:\n{prompt}"));
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_core_prompt_is_valid_json() {
        let core = core_prompt().expect("embedded knowledge");
        let value: serde_json::Value = serde_json::from_str(core).expect("valid json");
        assert!(value.get("name").is_some());
    }

    #[test]
    fn unit_wrap_orders_blocks() {
        let wrapped = wrap_with_self_knowledge("do the thing", "os=linux shell=zsh");
        let knowledge_at = wrapped.find("EW_SELF_KNOWLEDGE_JSON:").expect("knowledge block");
        let profile_at = wrapped.find("EW_SYSTEM_PROFILE:").expect("profile block");
        let task_at = wrapped.find("TASK:\ndo the thing").expect("task block");
        assert!(knowledge_at < profile_at && profile_at < task_at);
    }

    #[test]
    fn unit_wrap_without_context_still_carries_knowledge() {
        let wrapped = wrap_with_self_knowledge("just this", "");
        assert!(wrapped.contains("TASK:\njust this"));
        assert!(!wrapped.contains("EW_SYSTEM_PROFILE"));
    }
}
