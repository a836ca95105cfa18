//! Context validation: the first pipeline stage.

use rambla_core::{
    AgentResult, Coordinates, EngineConfig, EntityIdType, Language, SessionId, UserPreferences,
    ValidatedContext, ValidationError,
};
use rambla_storage::PreferenceStore;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

/// Longest accepted query, in characters.
const MAX_QUERY_CHARS: usize = 4000;

/// Incoming pipeline request, as received from the transport layer.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentRequest {
    pub user_id: String,
    /// Session UUID; a missing id starts a new session, a malformed one is
    /// rejected
    #[serde(default)]
    pub session_id: Option<String>,
    pub query: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub location: Option<Coordinates>,
}

/// Validates identifiers, language, and coordinates, and merges stored user
/// preferences into an immutable `ValidatedContext`. No side effects beyond
/// the preferences read.
pub struct ContextValidator {
    supported_languages: Vec<Language>,
    default_language: Language,
    budget_mode: bool,
    preferred_model: Option<String>,
    preferences: Arc<dyn PreferenceStore>,
}

impl ContextValidator {
    pub fn new(config: &EngineConfig, preferences: Arc<dyn PreferenceStore>) -> Self {
        Self {
            supported_languages: config.supported_languages.clone(),
            default_language: config.default_language,
            budget_mode: config.budget_mode,
            preferred_model: config.preferred_model.clone(),
            preferences,
        }
    }

    pub async fn validate(&self, request: &AgentRequest) -> AgentResult<ValidatedContext> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(ValidationError::InvalidField {
                field: "user_id".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        let query_chars = request.query.chars().count();
        if request.query.trim().is_empty() || query_chars > MAX_QUERY_CHARS {
            return Err(ValidationError::InvalidField {
                field: "query".to_string(),
                reason: format!("length must be 1..={} characters", MAX_QUERY_CHARS),
            }
            .into());
        }

        let session_id = match &request.session_id {
            Some(raw) => SessionId::from_str(raw).map_err(|_| ValidationError::InvalidSession {
                value: raw.clone(),
            })?,
            None => {
                let generated = SessionId::new_v4();
                tracing::info!(session_id = %generated, "session id generated");
                generated
            }
        };

        if let Some(location) = &request.location {
            if !location.in_range() {
                return Err(ValidationError::InvalidLocation {
                    lat: location.lat,
                    lon: location.lon,
                }
                .into());
            }
        }

        // The preferences read is the only side effect; a failing store
        // degrades to "no stored preferences" rather than failing validation
        let preferences = match self.preferences.get(user_id).await {
            Ok(preferences) => preferences,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "preference read failed, continuing without");
                None
            }
        };

        let language = self.resolve_language(request.language.as_deref(), preferences.as_ref())?;

        let budget_mode =
            self.budget_mode || preferences.as_ref().is_some_and(|p| p.budget_mode);
        let preferred_model = preferences
            .as_ref()
            .and_then(|p| p.preferred_model.clone())
            .or_else(|| self.preferred_model.clone());

        Ok(ValidatedContext {
            user_id: user_id.to_string(),
            session_id,
            language,
            location: request.location,
            preferences,
            budget_mode,
            preferred_model,
        })
    }

    /// Request language wins; stored preference fills the gap; the
    /// configured default is last. Preferences never override a
    /// request-supplied language.
    fn resolve_language(
        &self,
        requested: Option<&str>,
        preferences: Option<&UserPreferences>,
    ) -> Result<Language, ValidationError> {
        if let Some(code) = requested {
            let language = Language::from_code(code).ok_or_else(|| {
                ValidationError::UnsupportedLanguage { language: code.to_string() }
            })?;
            if !self.supported_languages.contains(&language) {
                return Err(ValidationError::UnsupportedLanguage {
                    language: code.to_string(),
                });
            }
            return Ok(language);
        }

        if let Some(preferred) = preferences.and_then(|p| p.preferred_language) {
            if self.supported_languages.contains(&preferred) {
                return Ok(preferred);
            }
        }

        Ok(self.default_language)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rambla_core::ErrorKind;
    use rambla_storage::MemoryPreferenceStore;

    fn validator() -> ContextValidator {
        ContextValidator::new(&EngineConfig::default(), Arc::new(MemoryPreferenceStore::new()))
    }

    async fn validator_with_prefs(prefs: UserPreferences) -> ContextValidator {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.upsert(&prefs).await.unwrap();
        ContextValidator::new(&EngineConfig::default(), store)
    }

    fn request(query: &str) -> AgentRequest {
        AgentRequest {
            user_id: "auth0|u1".to_string(),
            session_id: Some(SessionId::new_v4().to_string()),
            query: query.to_string(),
            language: Some("es".to_string()),
            location: None,
        }
    }

    #[tokio::test]
    async fn test_valid_request_passes() {
        let context = validator().validate(&request("buscar bares")).await.unwrap();
        assert_eq!(context.user_id, "auth0|u1");
        assert_eq!(context.language, Language::Es);
        assert!(!context.budget_mode);
    }

    #[tokio::test]
    async fn test_malformed_session_rejected() {
        let mut req = request("hola");
        req.session_id = Some("not-a-uuid".to_string());
        let err = validator().validate(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSession);
    }

    #[tokio::test]
    async fn test_missing_session_generated() {
        let mut req = request("hola");
        req.session_id = None;
        let context = validator().validate(&req).await.unwrap();
        assert_ne!(context.session_id, SessionId::nil());
    }

    #[tokio::test]
    async fn test_unsupported_language_rejected() {
        let mut req = request("bonjour");
        req.language = Some("fr".to_string());
        let err = validator().validate(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedLanguage);
    }

    #[tokio::test]
    async fn test_language_outside_configured_set_rejected() {
        let config = EngineConfig {
            supported_languages: vec![Language::Es],
            default_language: Language::Es,
            ..Default::default()
        };
        let validator =
            ContextValidator::new(&config, Arc::new(MemoryPreferenceStore::new()));
        let mut req = request("hello");
        req.language = Some("en".to_string());
        let err = validator.validate(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedLanguage);
    }

    #[tokio::test]
    async fn test_out_of_range_location_rejected() {
        let mut req = request("hola");
        req.location = Some(Coordinates::new(95.0, 0.0));
        let err = validator().validate(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocation);
    }

    #[tokio::test]
    async fn test_empty_user_and_query_rejected() {
        let mut req = request("hola");
        req.user_id = "  ".to_string();
        assert!(validator().validate(&req).await.is_err());

        let mut req = request("");
        req.user_id = "u1".to_string();
        assert!(validator().validate(&req).await.is_err());

        let req = request(&"x".repeat(4001));
        assert!(validator().validate(&req).await.is_err());
    }

    #[tokio::test]
    async fn test_preferences_merge_without_overriding_language() {
        let prefs = UserPreferences::new("auth0|u1")
            .with_budget_mode(true)
            .with_preferred_language(Language::En)
            .with_preferred_model("gpt-4o-mini");
        let validator = validator_with_prefs(prefs).await;

        // Request says Spanish; the stored English preference must not win
        let context = validator.validate(&request("hola")).await.unwrap();
        assert_eq!(context.language, Language::Es);
        assert!(context.budget_mode);
        assert_eq!(context.preferred_model.as_deref(), Some("gpt-4o-mini"));

        // Without a requested language, the preference fills the gap
        let mut req = request("hello");
        req.language = None;
        let context = validator.validate(&req).await.unwrap();
        assert_eq!(context.language, Language::En);
    }
}
