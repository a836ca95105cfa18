//! Plan-parameter extraction from user queries.
//!
//! Rule-based slot filling over the supported languages. The vocabulary
//! below spans es/en/ca/gl so mixed-language queries still fill slots; the
//! merge semantics live on `PlanState` itself.

use rambla_core::{BudgetLevel, Language, PlanState, TransportMode};

/// Cities recognized by default when no deployment-specific list is given.
pub const DEFAULT_CITIES: [&str; 4] = ["Zaragoza", "Madrid", "Barcelona", "Valencia"];

/// Group-size markers that make a nearby small integer a head count.
const GROUP_WORDS: [&str; 12] = [
    "personas", "persona", "people", "person", "amigos", "amigas", "friends", "gente",
    "persones", "amics", "persoas", "amigo",
];

/// Function words that precede a head count ("para 4", "somos 3").
const GROUP_PREPOSITIONS: [&str; 5] = ["para", "somos", "for", "som", "of"];

/// Duration phrases without an explicit numeric quantity.
const DURATION_PHRASES: [(&str, &str); 16] = [
    ("fin de semana", "weekend"),
    ("cap de setmana", "weekend"),
    ("weekend", "weekend"),
    ("vespre", "evening"),
    ("todo el día", "full day"),
    ("día completo", "full day"),
    ("tot el dia", "full day"),
    ("todo o día", "full day"),
    ("full day", "full day"),
    ("medio día", "half day"),
    ("half day", "half day"),
    ("mañana", "morning"),
    ("morning", "morning"),
    ("tarde", "afternoon"),
    ("noche", "evening"),
    ("evening", "evening"),
];

const PLACE_TYPE_KEYWORDS: [(&str, &str); 28] = [
    ("bares", "bars"),
    ("bar", "bars"),
    ("bars", "bars"),
    ("pub", "bars"),
    ("pubs", "bars"),
    ("taberna", "bars"),
    ("tabernas", "bars"),
    ("restaurantes", "restaurants"),
    ("restaurante", "restaurants"),
    ("restaurants", "restaurants"),
    ("restaurant", "restaurants"),
    ("tapas", "restaurants"),
    ("cafeterías", "cafes"),
    ("cafetería", "cafes"),
    ("cafés", "cafes"),
    ("café", "cafes"),
    ("cafes", "cafes"),
    ("cafe", "cafes"),
    ("museos", "museums"),
    ("museo", "museums"),
    ("museums", "museums"),
    ("museum", "museums"),
    ("museus", "museums"),
    ("parques", "parks"),
    ("parque", "parks"),
    ("parks", "parks"),
    ("discotecas", "clubs"),
    ("discoteca", "clubs"),
];

const VIBE_KEYWORDS: [(&str, &str); 16] = [
    ("romántico", "romantic"),
    ("romántica", "romantic"),
    ("romantic", "romantic"),
    ("cita", "romantic"),
    ("tranquilo", "chill"),
    ("tranquila", "chill"),
    ("relajado", "chill"),
    ("chill", "chill"),
    ("fiesta", "party"),
    ("party", "party"),
    ("aventura", "adventurous"),
    ("adventure", "adventurous"),
    ("celebrar", "celebratory"),
    ("cumpleaños", "celebratory"),
    ("cansado", "tired"),
    ("cansada", "tired"),
];

const BUDGET_KEYWORDS: [(&str, BudgetLevel); 8] = [
    ("barato", BudgetLevel::Low),
    ("económico", BudgetLevel::Low),
    ("cheap", BudgetLevel::Low),
    ("asequible", BudgetLevel::Low),
    ("moderado", BudgetLevel::Medium),
    ("premium", BudgetLevel::High),
    ("lujo", BudgetLevel::High),
    ("caro", BudgetLevel::High),
];

const TRANSPORT_KEYWORDS: [(&str, TransportMode); 10] = [
    ("andando", TransportMode::Walking),
    ("caminando", TransportMode::Walking),
    ("a pie", TransportMode::Walking),
    ("walking", TransportMode::Walking),
    ("coche", TransportMode::Driving),
    ("driving", TransportMode::Driving),
    ("conduciendo", TransportMode::Driving),
    ("metro", TransportMode::Transit),
    ("bus", TransportMode::Transit),
    ("tranvía", TransportMode::Transit),
];

/// Extracts structured plan slots from conversation text.
///
/// Stateless; continuity across turns comes from merging these extractions
/// into the plan parameters persisted in turn metadata.
pub struct PlanContextExtractor;

impl PlanContextExtractor {
    /// Extract whatever slots the query mentions. Slots the query is silent
    /// on stay unset so merging never clobbers earlier answers.
    pub fn extract_from_query(query: &str, known_cities: &[&str]) -> PlanState {
        let lower = query.to_lowercase();
        let tokens = tokenize(&lower);

        let mut state = PlanState {
            num_people: extract_num_people(&tokens),
            duration: extract_duration(&lower, &tokens),
            ..Default::default()
        };

        for city in known_cities {
            if contains_word(&tokens, &city.to_lowercase()) {
                state.cities.push((*city).to_string());
            }
        }

        for (keyword, place_type) in PLACE_TYPE_KEYWORDS {
            if contains_word(&tokens, keyword)
                && !state.place_types.iter().any(|t| t == place_type)
            {
                state.place_types.push(place_type.to_string());
            }
        }

        for (keyword, vibe) in VIBE_KEYWORDS {
            if contains_word(&tokens, keyword) {
                state.vibe = Some(vibe.to_string());
                break;
            }
        }

        for (keyword, budget) in BUDGET_KEYWORDS {
            if contains_word(&tokens, keyword) {
                state.budget = Some(budget);
                break;
            }
        }

        for (keyword, transport) in TRANSPORT_KEYWORDS {
            // "a pie" is the one multiword marker; everything else matches
            // on whole tokens
            if keyword.contains(' ') {
                if lower.contains(keyword) {
                    state.transport = Some(transport);
                    break;
                }
            } else if contains_word(&tokens, keyword) {
                state.transport = Some(transport);
                break;
            }
        }

        state
    }

    /// A friendly question asking for the missing required slots.
    pub fn missing_fields_prompt(missing: &[&str], language: Language) -> String {
        if missing.is_empty() {
            return String::new();
        }

        let names: Vec<&str> = missing.iter().map(|f| field_name(f, language)).collect();
        let list = join_names(&names, language);
        match language {
            Language::Es => format!("Para crear el plan perfecto, necesito saber: {}.", list),
            Language::En => format!("To build the perfect plan, I still need: {}.", list),
            Language::Ca => format!("Per crear el pla perfecte, necessito saber: {}.", list),
            Language::Gl => format!("Para crear o plan perfecto, necesito saber: {}.", list),
        }
    }
}

fn tokenize(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

fn contains_word(tokens: &[&str], word: &str) -> bool {
    tokens.iter().any(|t| *t == word)
}

fn extract_num_people(tokens: &[&str]) -> Option<i32> {
    for (i, token) in tokens.iter().enumerate() {
        let Ok(n) = token.parse::<i32>() else { continue };
        if !(1..=100).contains(&n) {
            continue;
        }
        let next_is_group = tokens.get(i + 1).is_some_and(|t| GROUP_WORDS.contains(t));
        let prev_is_preposition = i > 0 && GROUP_PREPOSITIONS.contains(&tokens[i - 1]);
        if next_is_group || prev_is_preposition {
            return Some(n);
        }
    }
    None
}

fn extract_duration(lower: &str, tokens: &[&str]) -> Option<String> {
    // Numeric quantity followed by a time unit: "2 horas", "30 min", "1h"
    for (i, token) in tokens.iter().enumerate() {
        if let Ok(n) = token.parse::<i32>() {
            if let Some(next) = tokens.get(i + 1) {
                if is_hour_unit(next) {
                    return Some(format!("{} hours", n));
                }
                if is_minute_unit(next) {
                    return Some(format!("{} min", n));
                }
            }
        }
        // Glued forms like "2h" or "90min"
        if let Some(rest) = token.strip_suffix('h') {
            if let Ok(n) = rest.parse::<i32>() {
                return Some(format!("{} hours", n));
            }
        }
        if let Some(rest) = token.strip_suffix("min") {
            if let Ok(n) = rest.parse::<i32>() {
                return Some(format!("{} min", n));
            }
        }
    }

    // Phrase forms; "quick" style markers first since they are more specific
    if lower.contains("rápido") || lower.contains("rapido") || lower.contains("quick") {
        return Some("quick".to_string());
    }
    for (phrase, canonical) in DURATION_PHRASES {
        if lower.contains(phrase) {
            return Some(canonical.to_string());
        }
    }
    None
}

fn is_hour_unit(token: &str) -> bool {
    matches!(token, "hora" | "horas" | "hour" | "hours" | "h" | "hores")
}

fn is_minute_unit(token: &str) -> bool {
    matches!(token, "min" | "mins" | "minuto" | "minutos" | "minute" | "minutes" | "minuts")
}

fn field_name(field: &str, language: Language) -> &'static str {
    match (field, language) {
        ("duration", Language::Es) => "la duración del plan",
        ("duration", Language::En) => "the plan duration",
        ("duration", Language::Ca) => "la durada del pla",
        ("duration", Language::Gl) => "a duración do plan",
        ("num_people", Language::Es) => "el número de personas",
        ("num_people", Language::En) => "how many people",
        ("num_people", Language::Ca) => "el nombre de persones",
        ("num_people", Language::Gl) => "o número de persoas",
        ("cities", Language::Es) => "la ciudad",
        ("cities", Language::En) => "the city",
        ("cities", Language::Ca) => "la ciutat",
        ("cities", Language::Gl) => "a cidade",
        ("place_types", Language::Es) => "el tipo de lugares (bares, restaurantes...)",
        ("place_types", Language::En) => "the kind of places (bars, restaurants...)",
        ("place_types", Language::Ca) => "el tipus de llocs (bars, restaurants...)",
        ("place_types", Language::Gl) => "o tipo de lugares (bares, restaurantes...)",
        ("vibe", Language::Es) => "el ambiente que buscas",
        ("vibe", Language::En) => "the vibe you want",
        ("vibe", Language::Ca) => "l'ambient que busques",
        ("vibe", Language::Gl) => "o ambiente que buscas",
        _ => "?",
    }
}

fn join_names(names: &[&str], language: Language) -> String {
    let and = match language {
        Language::Es | Language::Gl => "y",
        Language::En => "and",
        Language::Ca => "i",
    };
    match names.len() {
        0 => String::new(),
        1 => names[0].to_string(),
        _ => format!("{} {} {}", names[..names.len() - 1].join(", "), and, names[names.len() - 1]),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(query: &str) -> PlanState {
        PlanContextExtractor::extract_from_query(query, &DEFAULT_CITIES)
    }

    #[test]
    fn test_extract_num_people_patterns() {
        assert_eq!(extract("2 personas, 2 horas").num_people, Some(2));
        assert_eq!(extract("somos 4").num_people, Some(4));
        assert_eq!(extract("para 6 amigos").num_people, Some(6));
        assert_eq!(extract("party of 3 people").num_people, Some(3));
        // A bare number with no group marker is not a head count
        assert_eq!(extract("el 2 de mayo").num_people, None);
    }

    #[test]
    fn test_extract_duration_quantities() {
        assert_eq!(extract("2 personas, 2 horas").duration.as_deref(), Some("2 hours"));
        assert_eq!(extract("30 min por el centro").duration.as_deref(), Some("30 min"));
        assert_eq!(extract("plan de 2h").duration.as_deref(), Some("2 hours"));
        assert_eq!(extract("something for 3 hours").duration.as_deref(), Some("3 hours"));
    }

    #[test]
    fn test_extract_duration_phrases() {
        assert_eq!(extract("un plan para la noche").duration.as_deref(), Some("evening"));
        assert_eq!(extract("todo el día en familia").duration.as_deref(), Some("full day"));
        assert_eq!(extract("algo rápido").duration.as_deref(), Some("quick"));
        assert_eq!(extract("fin de semana").duration.as_deref(), Some("weekend"));
    }

    #[test]
    fn test_extract_cities_from_known_list() {
        assert_eq!(extract("bares en Zaragoza").cities, vec!["Zaragoza"]);
        assert_eq!(extract("de madrid a BARCELONA").cities, vec!["Madrid", "Barcelona"]);
        assert!(extract("bares por aquí").cities.is_empty());
    }

    #[test]
    fn test_extract_place_types_dedup() {
        let state = extract("bares y tapas, algún bar con terraza");
        assert_eq!(state.place_types, vec!["bars", "restaurants"]);
    }

    #[test]
    fn test_extract_vibe_budget_transport() {
        let state = extract("algo romántico y barato, andando");
        assert_eq!(state.vibe.as_deref(), Some("romantic"));
        assert_eq!(state.budget, Some(BudgetLevel::Low));
        assert_eq!(state.transport, Some(TransportMode::Walking));
    }

    #[test]
    fn test_empty_extraction_leaves_slots_unset() {
        let state = extract("quiero un plan");
        assert_eq!(state, PlanState::default());
    }

    #[test]
    fn test_incremental_merge_fills_plan() {
        // The five-turn flow: each message fills more slots
        let mut state = extract("quiero un plan");
        for query in ["2 personas, 2 horas", "Zaragoza", "Bares", "Romántico"] {
            state = PlanState::merge(&state, &extract(query));
        }
        assert!(state.is_ready());
        assert_eq!(state.num_people, Some(2));
        assert_eq!(state.duration.as_deref(), Some("2 hours"));
        assert_eq!(state.cities, vec!["Zaragoza"]);
        assert_eq!(state.place_types, vec!["bars"]);
        assert_eq!(state.vibe.as_deref(), Some("romantic"));
    }

    #[test]
    fn test_missing_fields_prompt_localized() {
        let prompt = PlanContextExtractor::missing_fields_prompt(&["vibe"], Language::Es);
        assert!(prompt.contains("el ambiente que buscas"));

        let prompt =
            PlanContextExtractor::missing_fields_prompt(&["cities", "vibe"], Language::En);
        assert!(prompt.contains("the city and the vibe you want"));

        assert!(PlanContextExtractor::missing_fields_prompt(&[], Language::Es).is_empty());
    }
}
