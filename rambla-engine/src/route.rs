//! Model routing: (intent, complexity, budget flag) -> concrete model.

use rambla_core::{
    AgentResult, Complexity, Intent, ModelCatalog, ModelDecision, ModelProfile,
};

/// Pure routing over the configured model catalog. Models are looked up by
/// tier label; no provider or model name appears in the logic.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    catalog: ModelCatalog,
}

impl ModelRouter {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self { catalog }
    }

    /// Select a model for a classified request.
    ///
    /// Budget mode forces the cheap tiers regardless of complexity. A
    /// preferred model (user preference or deployment config) overrides the
    /// tier choice except when budget mode is on.
    pub fn route(
        &self,
        intent: Intent,
        complexity: Complexity,
        budget_mode: bool,
        preferred_model: Option<&str>,
    ) -> AgentResult<ModelDecision> {
        let label: &str = if budget_mode {
            match intent {
                Intent::Chitchat => self.catalog.chat.as_str(),
                _ => self.catalog.fast.as_str(),
            }
        } else if let Some(preferred) = preferred_model {
            if self.catalog.profiles.contains_key(preferred) {
                preferred
            } else {
                // Unknown preference falls through to the tier table
                tracing::warn!(preferred, "preferred model not in catalog, ignoring");
                self.tier_label(intent, complexity)
            }
        } else {
            self.tier_label(intent, complexity)
        };

        let profile = self.catalog.profile(label)?;
        tracing::debug!(
            intent = intent.as_str(),
            complexity = complexity.as_str(),
            budget_mode,
            model = %profile.name,
            "model routed"
        );
        Ok(Self::decision(profile))
    }

    fn tier_label(&self, intent: Intent, complexity: Complexity) -> &str {
        match (intent, complexity) {
            (Intent::Search, Complexity::High) => self.catalog.mid.as_str(),
            (Intent::Search, _) => self.catalog.fast.as_str(),
            (Intent::Recommend, Complexity::Low) => self.catalog.fast.as_str(),
            (Intent::Recommend, _) => self.catalog.mid.as_str(),
            (Intent::Plan, Complexity::High) => self.catalog.top.as_str(),
            (Intent::Plan, _) => self.catalog.mid.as_str(),
            (Intent::Chitchat, _) => self.catalog.chat.as_str(),
        }
    }

    fn decision(profile: &ModelProfile) -> ModelDecision {
        ModelDecision {
            provider: profile.provider.clone(),
            model: profile.name.clone(),
            max_tokens: profile.max_tokens,
            temperature: profile.temperature,
            input_cost_per_1k: profile.input_cost_per_1k,
            output_cost_per_1k: profile.output_cost_per_1k,
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> ModelRouter {
        ModelRouter::new(ModelCatalog::openai_default())
    }

    #[test]
    fn test_routing_table() {
        let router = router();
        let cases = [
            (Intent::Search, Complexity::Low, "gpt-4o-mini"),
            (Intent::Search, Complexity::Medium, "gpt-4o-mini"),
            (Intent::Search, Complexity::High, "gpt-4-turbo"),
            (Intent::Recommend, Complexity::Low, "gpt-4o-mini"),
            (Intent::Recommend, Complexity::Medium, "gpt-4-turbo"),
            (Intent::Recommend, Complexity::High, "gpt-4-turbo"),
            (Intent::Plan, Complexity::Low, "gpt-4-turbo"),
            (Intent::Plan, Complexity::Medium, "gpt-4-turbo"),
            (Intent::Plan, Complexity::High, "gpt-4"),
            (Intent::Chitchat, Complexity::Low, "gpt-3.5-turbo"),
            (Intent::Chitchat, Complexity::High, "gpt-3.5-turbo"),
        ];
        for (intent, complexity, expected) in cases {
            let decision = router.route(intent, complexity, false, None).unwrap();
            assert_eq!(decision.model, expected, "{:?}/{:?}", intent, complexity);
        }
    }

    #[test]
    fn test_budget_mode_forces_cheap_tiers() {
        let router = router();
        for intent in [Intent::Search, Intent::Recommend, Intent::Plan] {
            for complexity in [Complexity::Low, Complexity::Medium, Complexity::High] {
                let decision = router.route(intent, complexity, true, None).unwrap();
                assert_eq!(decision.model, "gpt-4o-mini");
            }
        }
        let decision = router.route(Intent::Chitchat, Complexity::Low, true, None).unwrap();
        assert_eq!(decision.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_budget_mode_beats_preference() {
        let router = router();
        let decision = router
            .route(Intent::Plan, Complexity::High, true, Some("gpt-4"))
            .unwrap();
        assert_eq!(decision.model, "gpt-4o-mini");
    }

    #[test]
    fn test_preferred_model_overrides_tier() {
        let router = router();
        let decision = router
            .route(Intent::Search, Complexity::Low, false, Some("gpt-4-turbo"))
            .unwrap();
        assert_eq!(decision.model, "gpt-4-turbo");
    }

    #[test]
    fn test_unknown_preference_falls_back() {
        let router = router();
        let decision = router
            .route(Intent::Search, Complexity::Low, false, Some("made-up-model"))
            .unwrap();
        assert_eq!(decision.model, "gpt-4o-mini");
    }

    #[test]
    fn test_decision_carries_costs() {
        let router = router();
        let decision = router.route(Intent::Plan, Complexity::High, false, None).unwrap();
        assert!(decision.input_cost_per_1k > 0.0);
        assert!(decision.output_cost_per_1k > 0.0);
        assert_eq!(decision.provider, "openai");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_intent() -> impl Strategy<Value = Intent> {
        prop_oneof![
            Just(Intent::Search),
            Just(Intent::Recommend),
            Just(Intent::Plan),
            Just(Intent::Chitchat),
        ]
    }

    fn arb_complexity() -> impl Strategy<Value = Complexity> {
        prop_oneof![Just(Complexity::Low), Just(Complexity::Medium), Just(Complexity::High)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// For every (intent, complexity, budget) the routed model exists in
        /// the catalog.
        #[test]
        fn prop_routed_model_in_catalog(
            intent in arb_intent(),
            complexity in arb_complexity(),
            budget_mode in any::<bool>(),
        ) {
            let router = ModelRouter::new(ModelCatalog::openai_default());
            let decision = router.route(intent, complexity, budget_mode, None).unwrap();
            prop_assert!(router.catalog().profiles.contains_key(&decision.model));
        }
    }
}
