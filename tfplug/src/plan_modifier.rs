use crate::types::{AttributePath, Diagnostic, Dynamic};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PlanModifyRequest {
    pub state: Dynamic,
    pub plan: Dynamic,
    pub config: Dynamic,
    pub path: AttributePath,
}

#[derive(Debug, Clone)]
pub struct PlanModifyResponse {
    pub plan_value: Dynamic,
    pub requires_replace: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanModifyResponse {
    fn unchanged(plan_value: Dynamic) -> Self {
        Self {
            plan_value,
            requires_replace: false,
            diagnostics: Vec::new(),
        }
    }
}

/// Trait for modifying terraform plan behavior
///
/// Plan modifiers run after defaults have been applied and computed
/// attributes have been marked unknown. They can:
/// - Modify the planned value
/// - Mark an attribute as requiring replacement
/// - Add warnings or errors to the plan
pub trait PlanModifier: Send + Sync {
    fn description(&self) -> String;
    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse;
}

/// Marks an attribute as requiring replacement when it changes
pub struct RequiresReplaceIfChanged;

impl RequiresReplaceIfChanged {
    pub fn create() -> Arc<dyn PlanModifier> {
        Arc::new(Self)
    }
}

impl PlanModifier for RequiresReplaceIfChanged {
    fn description(&self) -> String {
        "changing this value forces a new resource".to_string()
    }

    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse {
        // a missing prior state is a create, not a replacement
        let requires_replace = !request.state.is_null()
            && !request.plan.is_unknown()
            && !request.state.is_unknown()
            && request.state != request.plan;

        PlanModifyResponse {
            requires_replace,
            ..PlanModifyResponse::unchanged(request.plan)
        }
    }
}

/// Keeps the prior state value for a computed attribute instead of showing
/// it as "known after apply" on every update
pub struct UseStateForUnknown;

impl UseStateForUnknown {
    pub fn create() -> Arc<dyn PlanModifier> {
        Arc::new(Self)
    }
}

impl PlanModifier for UseStateForUnknown {
    fn description(&self) -> String {
        "value does not change once set".to_string()
    }

    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse {
        let plan_value = if request.plan.is_unknown() && !request.state.is_null() {
            request.state
        } else {
            request.plan
        };

        PlanModifyResponse::unchanged(plan_value)
    }
}

pub struct RequiresReplaceIf<F>
where
    F: Fn(&PlanModifyRequest) -> bool + Send + Sync,
{
    predicate: F,
    description: String,
}

impl<F> RequiresReplaceIf<F>
where
    F: Fn(&PlanModifyRequest) -> bool + Send + Sync,
{
    pub fn new(predicate: F, description: impl Into<String>) -> Self {
        Self {
            predicate,
            description: description.into(),
        }
    }
}

impl<F> PlanModifier for RequiresReplaceIf<F>
where
    F: Fn(&PlanModifyRequest) -> bool + Send + Sync,
{
    fn description(&self) -> String {
        self.description.clone()
    }

    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse {
        let mut diagnostics = Vec::new();
        let requires_replace = (self.predicate)(&request);

        if requires_replace {
            diagnostics.push(
                Diagnostic::warning(
                    format!("Attribute '{}' requires resource replacement", request.path),
                    &self.description,
                )
                .with_attribute(request.path.clone()),
            );
        }

        PlanModifyResponse {
            plan_value: request.plan,
            requires_replace,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(state: Dynamic, plan: Dynamic) -> PlanModifyRequest {
        PlanModifyRequest {
            config: plan.clone(),
            state,
            plan,
            path: AttributePath::new("organization_id"),
        }
    }

    fn string(s: &str) -> Dynamic {
        Dynamic::String(s.to_string())
    }

    #[test]
    fn requires_replace_if_changed_does_not_trigger_on_same_value() {
        let response = RequiresReplaceIfChanged.modify_plan(request(string("o1"), string("o1")));
        assert!(!response.requires_replace);
        assert!(response.diagnostics.is_empty());
    }

    #[test]
    fn requires_replace_if_changed_triggers_on_different_value() {
        let response = RequiresReplaceIfChanged.modify_plan(request(string("o1"), string("o2")));
        assert!(response.requires_replace);
    }

    #[test]
    fn requires_replace_if_changed_ignores_create_and_unknowns() {
        assert!(
            !RequiresReplaceIfChanged
                .modify_plan(request(Dynamic::Null, string("o1")))
                .requires_replace
        );
        assert!(
            !RequiresReplaceIfChanged
                .modify_plan(request(string("o1"), Dynamic::Unknown))
                .requires_replace
        );
    }

    #[test]
    fn use_state_for_unknown_preserves_state_when_unknown() {
        let response = UseStateForUnknown.modify_plan(request(string("N_123"), Dynamic::Unknown));
        assert_eq!(response.plan_value, string("N_123"));
    }

    #[test]
    fn use_state_for_unknown_keeps_unknown_on_create() {
        let response = UseStateForUnknown.modify_plan(request(Dynamic::Null, Dynamic::Unknown));
        assert!(response.plan_value.is_unknown());
    }

    #[test]
    fn use_state_for_unknown_uses_plan_when_known() {
        let response = UseStateForUnknown.modify_plan(request(string("old"), string("new")));
        assert_eq!(response.plan_value, string("new"));
    }

    #[test]
    fn requires_replace_if_triggers_on_condition() {
        let modifier = RequiresReplaceIf::new(
            |req| {
                matches!((&req.state, &req.plan),
                    (Dynamic::String(old), Dynamic::String(new)) if !old.is_empty() && new.is_empty()
                )
            },
            "Cannot change to empty string without replacement",
        );

        let response = modifier.modify_plan(request(string("has-value"), string("")));
        assert!(response.requires_replace);
        assert_eq!(response.diagnostics.len(), 1);

        let response = modifier.modify_plan(request(string(""), string("new-value")));
        assert!(!response.requires_replace);
        assert!(response.diagnostics.is_empty());
    }
}
