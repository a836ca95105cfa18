//! Enum types for Rambla entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// INTENT AND COMPLEXITY
// ============================================================================

/// Coarse category describing what the user wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    /// Single-shot lookup of venues or locations
    Search,
    /// Filtered or ranked suggestions
    Recommend,
    /// Multi-stop itinerary building
    Plan,
    /// Small talk, no tools required
    Chitchat,
}

impl Intent {
    /// Stable wire/storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "SEARCH",
            Self::Recommend => "RECOMMEND",
            Self::Plan => "PLAN",
            Self::Chitchat => "CHITCHAT",
        }
    }
}

impl FromStr for Intent {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SEARCH" => Ok(Self::Search),
            "RECOMMEND" => Ok(Self::Recommend),
            "PLAN" => Ok(Self::Plan),
            "CHITCHAT" => Ok(Self::Chitchat),
            _ => Err(EnumParseError::new("Intent", s)),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rubric label summarizing how much reasoning a request requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Complexity {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(EnumParseError::new("Complexity", s)),
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LANGUAGE
// ============================================================================

/// Languages the assistant can answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Spanish
    Es,
    /// English
    En,
    /// Catalan
    Ca,
    /// Galician
    Gl,
}

impl Language {
    /// ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Es => "es",
            Self::En => "en",
            Self::Ca => "ca",
            Self::Gl => "gl",
        }
    }

    /// Parse a language code, case-insensitively. Returns None for codes
    /// outside the known set; the validator decides whether that is an error.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "es" => Some(Self::Es),
            "en" => Some(Self::En),
            "ca" => Some(Self::Ca),
            "gl" => Some(Self::Gl),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// PLAN VOCABULARY
// ============================================================================

/// Transport mode for itinerary routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Walking,
    Driving,
    Transit,
}

impl TransportMode {
    /// Mean speed used for inter-stop travel time estimates.
    pub fn mean_speed_kmh(&self) -> f64 {
        match self {
            Self::Walking => 5.0,
            Self::Driving => 30.0,
            Self::Transit => 20.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Walking => "walking",
            Self::Driving => "driving",
            Self::Transit => "transit",
        }
    }
}

impl FromStr for TransportMode {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "walking" => Ok(Self::Walking),
            "driving" => Ok(Self::Driving),
            "transit" => Ok(Self::Transit),
            _ => Err(EnumParseError::new("TransportMode", s)),
        }
    }
}

/// Budget level for itineraries and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetLevel {
    Low,
    Medium,
    High,
}

impl BudgetLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Display symbol used in itinerary cost estimates.
    pub fn cost_symbol(&self) -> &'static str {
        match self {
            Self::Low => "$",
            Self::Medium => "$$",
            Self::High => "$$$",
        }
    }
}

impl FromStr for BudgetLevel {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(EnumParseError::new("BudgetLevel", s)),
        }
    }
}

// ============================================================================
// EMOTION
// ============================================================================

/// User emotion detected from the query text. Metadata only; it never
/// influences model routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserEmotion {
    Bored,
    Excited,
    Romantic,
    Stressed,
    Adventurous,
    Tired,
    Celebratory,
    Neutral,
}

impl UserEmotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bored => "bored",
            Self::Excited => "excited",
            Self::Romantic => "romantic",
            Self::Stressed => "stressed",
            Self::Adventurous => "adventurous",
            Self::Tired => "tired",
            Self::Celebratory => "celebratory",
            Self::Neutral => "neutral",
        }
    }
}

// ============================================================================
// ERROR KIND TAXONOMY
// ============================================================================

/// Internal error taxonomy, independent of surface representation.
/// Every pipeline failure maps to exactly one of these kinds for metrics
/// and for the localized user-facing error object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidSession,
    UnsupportedLanguage,
    InvalidLocation,
    MemoryUnavailable,
    /// Soft: classification degrades to chitchat, counted in metrics only
    ClassificationFailed,
    ModelError,
    /// Soft: returned to the model as an observation
    ToolError,
    Timeout,
    Cancelled,
    Overloaded,
    PersistenceFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSession => "INVALID_SESSION",
            Self::UnsupportedLanguage => "UNSUPPORTED_LANGUAGE",
            Self::InvalidLocation => "INVALID_LOCATION",
            Self::MemoryUnavailable => "MEMORY_UNAVAILABLE",
            Self::ClassificationFailed => "CLASSIFICATION_FAILED",
            Self::ModelError => "MODEL_ERROR",
            Self::ToolError => "TOOL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Overloaded => "OVERLOADED",
            Self::PersistenceFailed => "PERSISTENCE_FAILED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PARSE ERROR
// ============================================================================

/// Error parsing an enum from its string representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub type_name: &'static str,
    pub input: String,
}

impl EnumParseError {
    fn new(type_name: &'static str, input: &str) -> Self {
        Self {
            type_name,
            input: input.to_string(),
        }
    }
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.type_name, self.input)
    }
}

impl std::error::Error for EnumParseError {}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_roundtrip() {
        for intent in [Intent::Search, Intent::Recommend, Intent::Plan, Intent::Chitchat] {
            let parsed: Intent = intent.as_str().parse().unwrap();
            assert_eq!(intent, parsed);
        }
    }

    #[test]
    fn test_intent_parse_is_case_insensitive() {
        assert_eq!("search".parse::<Intent>().unwrap(), Intent::Search);
        assert_eq!("Plan".parse::<Intent>().unwrap(), Intent::Plan);
        assert!("PLANNING".parse::<Intent>().is_err());
    }

    #[test]
    fn test_intent_serde_screaming() {
        let json = serde_json::to_string(&Intent::Recommend).unwrap();
        assert_eq!(json, "\"RECOMMEND\"");
    }

    #[test]
    fn test_complexity_roundtrip() {
        for c in [Complexity::Low, Complexity::Medium, Complexity::High] {
            let parsed: Complexity = c.as_str().parse().unwrap();
            assert_eq!(c, parsed);
        }
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("ES"), Some(Language::Es));
        assert_eq!(Language::from_code(" gl "), Some(Language::Gl));
        assert_eq!(Language::from_code("fr"), None);
        assert_eq!(Language::Ca.code(), "ca");
    }

    #[test]
    fn test_transport_speeds() {
        assert!(TransportMode::Driving.mean_speed_kmh() > TransportMode::Transit.mean_speed_kmh());
        assert!(TransportMode::Transit.mean_speed_kmh() > TransportMode::Walking.mean_speed_kmh());
    }

    #[test]
    fn test_budget_symbols() {
        assert_eq!(BudgetLevel::Low.cost_symbol(), "$");
        assert_eq!(BudgetLevel::High.cost_symbol(), "$$$");
    }

    #[test]
    fn test_error_kind_wire_format() {
        assert_eq!(ErrorKind::MemoryUnavailable.as_str(), "MEMORY_UNAVAILABLE");
        let json = serde_json::to_string(&ErrorKind::InvalidSession).unwrap();
        assert_eq!(json, "\"INVALID_SESSION\"");
    }
}
