//! Context builder: memory window -> model-facing messages + agent context.

use crate::plan::PlanContextExtractor;
use rambla_core::{
    AgentResult, ChatMessage, ConfigError, Language, MemoryWindow, MessageRole, PlaceRef,
    PlanState, SessionId, ValidatedContext,
};
use serde::{Deserialize, Serialize};

/// Places enumerated in the system prompt for coreference.
const MAX_PLACE_REFERENCES: usize = 10;

const DEFAULT_BASE_PROMPT: &str = "You are a local discovery assistant. You help people find \
places (bars, restaurants, cafes, museums, parks) and build outing plans. Use the available \
tools to look up real places instead of inventing them, and keep answers concise and friendly.";

// ============================================================================
// AGENT CONTEXT
// ============================================================================

/// Context record handed to the reason-act executor alongside the message
/// sequence. Mirrors the memory window plus token accounting and the plan
/// parameters merged with the current query's extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub user_id: String,
    pub session_id: SessionId,
    pub language: Language,
    pub current_query: String,
    pub previous_places: Vec<PlaceRef>,
    pub session_summary: Option<String>,
    pub total_turns: i32,
    pub estimated_tokens: i32,
    pub tokens_remaining: i32,
    pub plan_params: PlanState,
}

// ============================================================================
// CONTEXT BUILDER
// ============================================================================

/// Pure transformer from `(MemoryWindow, ValidatedContext, query)` to the
/// model message sequence and the agent context record.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    max_context_tokens: i32,
    base_prompt: String,
}

impl ContextBuilder {
    pub fn new(max_context_tokens: i32, base_prompt: Option<&str>) -> AgentResult<Self> {
        if max_context_tokens <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_context_tokens".to_string(),
                value: max_context_tokens.to_string(),
                reason: "context budget must be positive".to_string(),
            }
            .into());
        }
        Ok(Self {
            max_context_tokens,
            base_prompt: base_prompt.unwrap_or(DEFAULT_BASE_PROMPT).to_string(),
        })
    }

    /// Build the model-facing message sequence:
    /// `[system, ...recent user/assistant pairs, current user message]`.
    pub fn build_messages(
        &self,
        window: &MemoryWindow,
        context: &ValidatedContext,
        query: &str,
        tone_instruction: Option<&str>,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(window.recent.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt(window, context, tone_instruction)));

        for entry in &window.recent {
            let message = match entry.role {
                MessageRole::User => ChatMessage::user(entry.text.clone()),
                MessageRole::Assistant => ChatMessage::assistant(entry.text.clone()),
                // Windows only hold user/assistant pairs; anything else is
                // carried through verbatim
                other => ChatMessage { role: other, content: entry.text.clone() },
            };
            messages.push(message);
        }

        messages.push(ChatMessage::user(query));
        messages
    }

    /// Build the agent context record, merging the current query's extracted
    /// plan slots over the ones persisted in turn metadata.
    pub fn build_agent_context(
        &self,
        window: &MemoryWindow,
        context: &ValidatedContext,
        query: &str,
        known_cities: &[&str],
    ) -> AgentContext {
        let extracted = PlanContextExtractor::extract_from_query(query, known_cities);
        let plan_params = PlanState::merge(&window.plan_params, &extracted);

        AgentContext {
            user_id: context.user_id.clone(),
            session_id: context.session_id,
            language: context.language,
            current_query: query.to_string(),
            previous_places: window.previous_places.clone(),
            session_summary: window.session_summary.clone(),
            total_turns: window.total_turns,
            estimated_tokens: window.estimated_tokens,
            tokens_remaining: (self.max_context_tokens - window.estimated_tokens).max(0),
            plan_params,
        }
    }

    /// Base prompt augmented with language, session summary, enumerated
    /// place references, and an optional tone instruction.
    fn system_prompt(
        &self,
        window: &MemoryWindow,
        context: &ValidatedContext,
        tone_instruction: Option<&str>,
    ) -> String {
        let mut sections = vec![self.base_prompt.clone()];

        sections.push(format!(
            "Respond in {}.",
            match context.language {
                Language::Es => "Spanish",
                Language::En => "English",
                Language::Ca => "Catalan",
                Language::Gl => "Galician",
            }
        ));

        if let Some(summary) = &window.session_summary {
            sections.push(format!("## Session context\n{}", summary));
        }

        if !window.previous_places.is_empty() {
            sections.push(format!(
                "## Recently mentioned places\nThe user may refer to these by position \
(\"the second one\", \"that bar\"):\n{}",
                format_place_references(&window.previous_places)
            ));
        }

        if let Some(tone) = tone_instruction {
            sections.push(format!("## Tone\n{}", tone));
        }

        sections.join("\n\n")
    }

    pub fn max_context_tokens(&self) -> i32 {
        self.max_context_tokens
    }
}

fn format_place_references(places: &[PlaceRef]) -> String {
    places
        .iter()
        .take(MAX_PLACE_REFERENCES)
        .enumerate()
        .map(|(i, place)| {
            let mut line = format!("#{}: {}", i + 1, place.name);
            let mut details = Vec::new();
            if let Some(rating) = place.rating {
                details.push(format!("rating {:.1}", rating));
            }
            if let Some(category) = &place.category {
                details.push(category.clone());
            }
            details.push(format!("turn -{}", place.turn_index));
            if !details.is_empty() {
                line.push_str(&format!(" ({})", details.join(", ")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::DEFAULT_CITIES;
    use rambla_core::{EntityIdType, RecentMessage};

    fn validated(language: Language) -> ValidatedContext {
        ValidatedContext {
            user_id: "u1".to_string(),
            session_id: SessionId::now_v7(),
            language,
            location: None,
            preferences: None,
            budget_mode: false,
            preferred_model: None,
        }
    }

    fn window_with_history() -> MemoryWindow {
        MemoryWindow {
            recent: vec![
                RecentMessage {
                    role: MessageRole::User,
                    text: "buscar bares".to_string(),
                    turn_index: 1,
                },
                RecentMessage {
                    role: MessageRole::Assistant,
                    text: "aquí tienes tres bares".to_string(),
                    turn_index: 1,
                },
            ],
            previous_places: vec![
                PlaceRef {
                    name: "Bar Uno".to_string(),
                    rating: Some(4.5),
                    category: Some("bar".to_string()),
                    turn_index: 1,
                    position: 1,
                },
                PlaceRef {
                    name: "Bar Dos".to_string(),
                    rating: None,
                    category: None,
                    turn_index: 1,
                    position: 2,
                },
            ],
            session_summary: Some("Conversación previa: 5 mensajes anteriores.".to_string()),
            total_turns: 6,
            estimated_tokens: 120,
            plan_params: PlanState::default(),
        }
    }

    #[test]
    fn test_message_sequence_shape() {
        let builder = ContextBuilder::new(4000, None).unwrap();
        let window = window_with_history();
        let messages =
            builder.build_messages(&window, &validated(Language::Es), "dame más info", None);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[2].role, MessageRole::Assistant);
        assert_eq!(messages[3].role, MessageRole::User);
        assert_eq!(messages[3].content, "dame más info");
    }

    #[test]
    fn test_system_prompt_augmentation() {
        let builder = ContextBuilder::new(4000, Some("Base prompt.")).unwrap();
        let window = window_with_history();
        let messages = builder.build_messages(
            &window,
            &validated(Language::Es),
            "q",
            Some("Be concise"),
        );

        let system = &messages[0].content;
        assert!(system.starts_with("Base prompt."));
        assert!(system.contains("Respond in Spanish."));
        assert!(system.contains("Conversación previa"));
        assert!(system.contains("#1: Bar Uno (rating 4.5, bar, turn -1)"));
        assert!(system.contains("#2: Bar Dos"));
        assert!(system.contains("## Tone\nBe concise"));
    }

    #[test]
    fn test_empty_window_yields_system_and_user_only() {
        let builder = ContextBuilder::new(4000, None).unwrap();
        let messages = builder.build_messages(
            &MemoryWindow::empty(),
            &validated(Language::En),
            "hello",
            None,
        );
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("Respond in English."));
        assert!(!messages[0].content.contains("## Session context"));
        assert!(!messages[0].content.contains("## Recently mentioned places"));
    }

    #[test]
    fn test_agent_context_token_accounting() {
        let builder = ContextBuilder::new(4000, None).unwrap();
        let window = window_with_history();
        let ctx = builder.build_agent_context(&window, &validated(Language::Es), "q", &[]);
        assert_eq!(ctx.estimated_tokens, 120);
        assert_eq!(ctx.tokens_remaining, 3880);

        let mut big = window_with_history();
        big.estimated_tokens = 5000;
        let ctx = builder.build_agent_context(&big, &validated(Language::Es), "q", &[]);
        assert_eq!(ctx.tokens_remaining, 0);
    }

    #[test]
    fn test_agent_context_merges_plan_extraction() {
        let builder = ContextBuilder::new(4000, None).unwrap();
        let mut window = window_with_history();
        window.plan_params = PlanState {
            num_people: Some(2),
            duration: Some("2 hours".to_string()),
            ..Default::default()
        };

        let cities: Vec<&str> = DEFAULT_CITIES.to_vec();
        let ctx = builder.build_agent_context(
            &window,
            &validated(Language::Es),
            "bares románticos en Zaragoza",
            &cities,
        );
        assert_eq!(ctx.plan_params.num_people, Some(2));
        assert_eq!(ctx.plan_params.cities, vec!["Zaragoza"]);
        assert_eq!(ctx.plan_params.place_types, vec!["bars"]);
        assert_eq!(ctx.plan_params.vibe.as_deref(), Some("romantic"));
        assert_eq!(ctx.plan_params.duration.as_deref(), Some("2 hours"));
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(ContextBuilder::new(0, None).is_err());
    }
}
