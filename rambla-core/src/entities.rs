//! Core entity structures

use crate::{
    BudgetLevel, Complexity, Intent, Language, MessageRole, SessionId, Timestamp, TurnId,
    identity::EntityIdType,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

// ============================================================================
// GEOGRAPHY
// ============================================================================

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether both components are inside their valid ranges.
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Haversine distance to another point, in kilometers.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }
}

// ============================================================================
// PLACES
// ============================================================================

/// Canonical place record as returned by the Places service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Opaque place identifier from the Places service
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// Rating on a 0-5 scale
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub rating_count: Option<i32>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub opening_hours: Option<String>,
    /// Price level 1-4 when the service reports one
    #[serde(default)]
    pub price_level: Option<i32>,
}

impl Place {
    /// Primary category, when the service reported any.
    pub fn primary_category(&self) -> Option<&str> {
        self.categories.first().map(String::as_str)
    }
}

// ============================================================================
// CONVERSATION TURN
// ============================================================================

/// Metadata key under which merged plan parameters are persisted.
pub const META_PLAN_PARAMS: &str = "plan_params";

/// Metadata key under which places surfaced during the turn are persisted.
pub const META_PLACES: &str = "places";

/// Metadata key under which a generated itinerary is persisted.
pub const META_ITINERARY: &str = "itinerary";

/// One (user query, assistant response) pair within a session. Append-only;
/// created at the end of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_id: TurnId,
    pub session_id: SessionId,
    /// Opaque user identifier (supports external auth provider ids)
    pub user_id: String,
    pub query: String,
    pub response: String,
    pub language: Language,
    pub intent: Intent,
    pub confidence: f32,
    pub complexity: Complexity,
    pub model: String,
    pub provider: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub cost_usd: f64,
    pub duration_ms: i64,
    pub created_at: Timestamp,
    /// Open metadata map; carries `plan_params`, `places`, `itinerary`
    pub extra_metadata: Option<serde_json::Value>,
}

impl ConversationTurn {
    /// Create a turn with the required identity fields; everything else is
    /// filled via `with_*` builders.
    pub fn new(session_id: SessionId, user_id: &str, query: &str, response: &str) -> Self {
        Self {
            turn_id: TurnId::now_v7(),
            session_id,
            user_id: user_id.to_string(),
            query: query.to_string(),
            response: response.to_string(),
            language: Language::Es,
            intent: Intent::Chitchat,
            confidence: 0.0,
            complexity: Complexity::Low,
            model: String::new(),
            provider: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            duration_ms: 0,
            created_at: Utc::now(),
            extra_metadata: None,
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_classification(mut self, intent: Intent, confidence: f32, complexity: Complexity) -> Self {
        self.intent = intent;
        self.confidence = confidence;
        self.complexity = complexity;
        self
    }

    pub fn with_model(mut self, provider: &str, model: &str) -> Self {
        self.provider = provider.to_string();
        self.model = model.to_string();
        self
    }

    pub fn with_usage(mut self, input_tokens: i32, output_tokens: i32, cost_usd: f64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.cost_usd = cost_usd;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.extra_metadata = Some(metadata);
        self
    }

    /// Merged plan parameters persisted with this turn, if any.
    pub fn plan_params(&self) -> Option<&serde_json::Value> {
        self.extra_metadata.as_ref().and_then(|m| m.get(META_PLAN_PARAMS))
    }

    /// Places surfaced during this turn, parsed from metadata. Entries that
    /// fail to parse are skipped rather than failing the whole read.
    pub fn places(&self) -> Vec<Place> {
        self.extra_metadata
            .as_ref()
            .and_then(|m| m.get(META_PLACES))
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| serde_json::from_value(e.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// USER PREFERENCES
// ============================================================================

/// Per-user preferences. One row per user id; upsert semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: String,
    pub preferred_language: Option<Language>,
    pub preferred_model: Option<String>,
    pub budget_mode: bool,
    /// Open map of favorites (place ids, categories, ...)
    pub favorites: serde_json::Value,
    pub updated_at: Timestamp,
}

impl UserPreferences {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            preferred_language: None,
            preferred_model: None,
            budget_mode: false,
            favorites: serde_json::json!({}),
            updated_at: Utc::now(),
        }
    }

    pub fn with_budget_mode(mut self, budget_mode: bool) -> Self {
        self.budget_mode = budget_mode;
        self
    }

    pub fn with_preferred_language(mut self, language: Language) -> Self {
        self.preferred_language = Some(language);
        self
    }

    pub fn with_preferred_model(mut self, model: &str) -> Self {
        self.preferred_model = Some(model.to_string());
        self
    }
}

// ============================================================================
// VALIDATED CONTEXT
// ============================================================================

/// Immutable per-request context produced by the validator. Created once
/// after validation; read-only for the rest of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedContext {
    pub user_id: String,
    pub session_id: SessionId,
    pub language: Language,
    pub location: Option<Coordinates>,
    /// Stored preferences for the user, when any exist
    pub preferences: Option<UserPreferences>,
    /// Effective budget flag (config OR stored preference)
    pub budget_mode: bool,
    /// Effective preferred model (stored preference over config)
    pub preferred_model: Option<String>,
}

// ============================================================================
// MEMORY WINDOW
// ============================================================================

/// One message inside the memory window's recent slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentMessage {
    pub role: MessageRole,
    pub text: String,
    /// Relative turn index; 1 = most recent persisted turn
    pub turn_index: i32,
}

/// A place referenced in recent turns, kept for coreference resolution
/// ("the second one", "that bar").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRef {
    pub name: String,
    pub rating: Option<f32>,
    pub category: Option<String>,
    /// Relative turn index the place came from; 1 = most recent
    pub turn_index: i32,
    /// 1-based position of the place inside its source turn
    pub position: i32,
}

/// Bounded, possibly compressed slice of a session's history, supplied to
/// the model for one request. Derived on demand; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryWindow {
    pub recent: Vec<RecentMessage>,
    /// Most-recent-first, deduplicated by place name
    pub previous_places: Vec<PlaceRef>,
    pub session_summary: Option<String>,
    pub total_turns: i32,
    pub estimated_tokens: i32,
    /// Plan slots accumulated from persisted turn metadata, oldest first
    #[serde(default)]
    pub plan_params: PlanState,
}

impl MemoryWindow {
    /// Empty window for a fresh session.
    pub fn empty() -> Self {
        Self {
            recent: Vec::new(),
            previous_places: Vec::new(),
            session_summary: None,
            total_turns: 0,
            estimated_tokens: 0,
            plan_params: PlanState::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty() && self.session_summary.is_none()
    }

    /// Number of distinct persisted turns represented in the recent slice.
    pub fn recent_turn_count(&self) -> usize {
        let mut indices: Vec<i32> = self.recent.iter().map(|m| m.turn_index).collect();
        indices.sort_unstable();
        indices.dedup();
        indices.len()
    }
}

// ============================================================================
// DECISIONS
// ============================================================================

/// Typed output of the intent classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDecision {
    pub intent: Intent,
    /// Confidence in [0, 1]
    pub confidence: f32,
    pub complexity: Complexity,
    pub reasoning: String,
}

impl IntentDecision {
    /// Safe fallback used when classification fails or confidence is too low.
    pub fn fallback(reasoning: &str) -> Self {
        Self {
            intent: Intent::Chitchat,
            confidence: 0.0,
            complexity: Complexity::Low,
            reasoning: reasoning.to_string(),
        }
    }
}

/// Concrete model selection produced by the router. Pure function of
/// (intent, complexity, budget flag) over the configured catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDecision {
    pub provider: String,
    pub model: String,
    pub max_tokens: i32,
    pub temperature: f32,
    /// USD per 1000 input tokens
    pub input_cost_per_1k: f64,
    /// USD per 1000 output tokens
    pub output_cost_per_1k: f64,
}

impl ModelDecision {
    /// Estimated cost for a token usage pair, in USD.
    pub fn estimate_cost(&self, input_tokens: i32, output_tokens: i32) -> f64 {
        (input_tokens.max(0) as f64 / 1000.0) * self.input_cost_per_1k
            + (output_tokens.max(0) as f64 / 1000.0) * self.output_cost_per_1k
    }
}

// ============================================================================
// TOOL CALLS
// ============================================================================

/// Outcome of a single tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolOutcome {
    Ok { observation: serde_json::Value },
    Error { message: String },
}

/// One tool call within a reason-act execution, ordered by step index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub step: i32,
    pub tool: String,
    pub arguments: serde_json::Value,
    pub outcome: ToolOutcome,
    pub duration_ms: i64,
}

// ============================================================================
// PLAN PARAMETERS (shared vocabulary)
// ============================================================================

/// Structured slots that define a buildable itinerary. All optional until
/// extraction fills them; `None`/empty means "not yet known".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanState {
    pub duration: Option<String>,
    pub num_people: Option<i32>,
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default)]
    pub place_types: Vec<String>,
    pub vibe: Option<String>,
    pub budget: Option<BudgetLevel>,
    pub transport: Option<crate::TransportMode>,
}

impl PlanState {
    /// Required slots that gate itinerary creation.
    pub const REQUIRED: [&'static str; 5] =
        ["duration", "num_people", "cities", "place_types", "vibe"];

    /// Names of required slots that are still unset.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.duration.is_none() {
            missing.push("duration");
        }
        if self.num_people.is_none() {
            missing.push("num_people");
        }
        if self.cities.is_empty() {
            missing.push("cities");
        }
        if self.place_types.is_empty() {
            missing.push("place_types");
        }
        if self.vibe.is_none() {
            missing.push("vibe");
        }
        missing
    }

    /// A plan is ready when every required slot is set.
    pub fn is_ready(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Parse recognized plan slots out of a metadata value. Unknown keys
    /// are ignored; a non-object value yields an empty state.
    pub fn from_metadata(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Merge newly extracted slots over an existing state. Scalar slots take
    /// the new value when present, otherwise keep the existing one; list
    /// slots union without duplicates, existing entries first. Idempotent on
    /// the right: merge(a, b) == merge(a, merge(b, b)).
    pub fn merge(existing: &PlanState, new: &PlanState) -> PlanState {
        fn union(existing: &[String], new: &[String]) -> Vec<String> {
            let mut merged: Vec<String> = existing.to_vec();
            for item in new {
                if !merged.iter().any(|e| e.eq_ignore_ascii_case(item)) {
                    merged.push(item.clone());
                }
            }
            merged
        }

        PlanState {
            duration: new.duration.clone().or_else(|| existing.duration.clone()),
            num_people: new.num_people.or(existing.num_people),
            cities: union(&existing.cities, &new.cities),
            place_types: union(&existing.place_types, &new.place_types),
            vibe: new.vibe.clone().or_else(|| existing.vibe.clone()),
            budget: new.budget.or(existing.budget),
            transport: new.transport.or(existing.transport),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coordinates_range() {
        assert!(Coordinates::new(41.65, -0.88).in_range());
        assert!(!Coordinates::new(91.0, 0.0).in_range());
        assert!(!Coordinates::new(0.0, -181.0).in_range());
    }

    #[test]
    fn test_haversine_distance() {
        // Zaragoza <-> Madrid is roughly 270 km as the crow flies
        let zaragoza = Coordinates::new(41.6488, -0.8891);
        let madrid = Coordinates::new(40.4168, -3.7038);
        let d = zaragoza.distance_km(&madrid);
        assert!((250.0..290.0).contains(&d), "got {}", d);
    }

    #[test]
    fn test_haversine_zero_distance() {
        let p = Coordinates::new(41.65, -0.88);
        assert!(p.distance_km(&p) < 1e-9);
    }

    #[test]
    fn test_turn_serde_roundtrip() {
        let turn = ConversationTurn::new(SessionId::now_v7(), "auth0|u1", "hola", "¡hola!")
            .with_language(Language::Es)
            .with_classification(Intent::Chitchat, 0.9, Complexity::Low)
            .with_model("openai", "gpt-4o-mini")
            .with_usage(120, 30, 0.0001)
            .with_duration_ms(412)
            .with_metadata(json!({"plan_params": {"vibe": "chill"}}));
        let json = serde_json::to_string(&turn).unwrap();
        let restored: ConversationTurn = serde_json::from_str(&json).unwrap();
        assert_eq!(turn, restored);
    }

    #[test]
    fn test_turn_metadata_accessors() {
        let turn = ConversationTurn::new(SessionId::now_v7(), "u1", "q", "r").with_metadata(json!({
            "plan_params": {"num_people": 2},
            "places": [
                {"id": "p1", "name": "Bar Uno", "rating": 4.5},
                {"not_a_place": true}
            ]
        }));
        assert_eq!(turn.plan_params().unwrap()["num_people"], 2);
        let places = turn.places();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].name, "Bar Uno");
    }

    #[test]
    fn test_turn_without_metadata() {
        let turn = ConversationTurn::new(SessionId::now_v7(), "u1", "q", "r");
        assert!(turn.plan_params().is_none());
        assert!(turn.places().is_empty());
    }

    #[test]
    fn test_preferences_builders() {
        let prefs = UserPreferences::new("u1")
            .with_budget_mode(true)
            .with_preferred_language(Language::En)
            .with_preferred_model("gpt-4o-mini");
        assert!(prefs.budget_mode);
        assert_eq!(prefs.preferred_language, Some(Language::En));
        assert_eq!(prefs.preferred_model.as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn test_memory_window_empty() {
        let window = MemoryWindow::empty();
        assert!(window.is_empty());
        assert_eq!(window.estimated_tokens, 0);
        assert_eq!(window.total_turns, 0);
    }

    #[test]
    fn test_intent_decision_fallback() {
        let decision = IntentDecision::fallback("model unavailable");
        assert_eq!(decision.intent, Intent::Chitchat);
        assert_eq!(decision.complexity, Complexity::Low);
        assert_eq!(decision.confidence, 0.0);
    }

    #[test]
    fn test_model_decision_cost() {
        let decision = ModelDecision {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2048,
            temperature: 0.7,
            input_cost_per_1k: 0.00015,
            output_cost_per_1k: 0.0006,
        };
        let cost = decision.estimate_cost(1000, 500);
        assert!((cost - (0.00015 + 0.0003)).abs() < 1e-9);
        // Negative counts clamp to zero rather than producing negative cost
        assert_eq!(decision.estimate_cost(-5, -5), 0.0);
    }

    #[test]
    fn test_plan_state_missing_fields() {
        let mut plan = PlanState::default();
        assert_eq!(plan.missing_fields().len(), 5);
        assert!(!plan.is_ready());

        plan.duration = Some("2 hours".to_string());
        plan.num_people = Some(2);
        plan.cities = vec!["Zaragoza".to_string()];
        plan.place_types = vec!["bars".to_string()];
        assert_eq!(plan.missing_fields(), vec!["vibe"]);

        plan.vibe = Some("romantic".to_string());
        assert!(plan.is_ready());
    }

    #[test]
    fn test_plan_state_merge_semantics() {
        let existing = PlanState {
            duration: Some("2 hours".to_string()),
            cities: vec!["Zaragoza".to_string()],
            place_types: vec!["bars".to_string()],
            ..Default::default()
        };
        let new = PlanState {
            duration: Some("evening".to_string()),
            num_people: Some(4),
            place_types: vec!["Bars".to_string(), "cafes".to_string()],
            ..Default::default()
        };

        let merged = PlanState::merge(&existing, &new);
        // New scalar wins
        assert_eq!(merged.duration.as_deref(), Some("evening"));
        // Existing survives when new is unset
        assert_eq!(merged.cities, vec!["Zaragoza"]);
        // Lists union case-insensitively, existing first
        assert_eq!(merged.place_types, vec!["bars", "cafes"]);
        assert_eq!(merged.num_people, Some(4));
    }

    #[test]
    fn test_plan_state_merge_right_idempotent() {
        let a = PlanState {
            duration: Some("2 hours".to_string()),
            cities: vec!["Zaragoza".to_string()],
            ..Default::default()
        };
        let b = PlanState {
            num_people: Some(2),
            cities: vec!["Madrid".to_string()],
            vibe: Some("romantic".to_string()),
            ..Default::default()
        };
        assert_eq!(PlanState::merge(&a, &b), PlanState::merge(&a, &PlanState::merge(&b, &b)));
    }

    #[test]
    fn test_plan_state_from_metadata() {
        let value = serde_json::json!({
            "duration": "2 hours",
            "num_people": 2,
            "cities": ["Zaragoza"],
            "unrecognized_key": true
        });
        let state = PlanState::from_metadata(&value);
        assert_eq!(state.duration.as_deref(), Some("2 hours"));
        assert_eq!(state.num_people, Some(2));
        assert_eq!(state.cities, vec!["Zaragoza"]);

        assert_eq!(PlanState::from_metadata(&serde_json::json!("nope")), PlanState::default());
    }

    #[test]
    fn test_tool_outcome_serde_tagging() {
        let ok = ToolOutcome::Ok { observation: json!({"count": 3}) };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "ok");

        let err = ToolOutcome::Error { message: "boom".to_string() };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
    }
}
