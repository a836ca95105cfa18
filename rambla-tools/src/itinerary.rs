//! Itinerary generation: search, select, route, and time-slice places.

use crate::places::{PlaceSearch, PlaceSource, normalize_place_query};
use crate::{Tool, ToolContext};
use async_trait::async_trait;
use rambla_core::{
    AgentResult, BudgetLevel, Coordinates, Place, ToolError, TransportMode,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Minimum minutes spent at a stop, whatever the requested duration.
const MIN_STOP_MINUTES: i32 = 15;

/// Minimum inter-stop travel estimate.
const MIN_TRAVEL_MINUTES: i32 = 5;

// ============================================================================
// DURATION PARSING
// ============================================================================

/// Convert a duration phrase to minutes. Accepts explicit quantities
/// ("2 hours", "90 min", "2h") and the phrase vocabulary; unparseable
/// input defaults to two hours.
pub fn parse_duration_minutes(duration: &str) -> i32 {
    let lower = duration.trim().to_lowercase();

    let tokens: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).collect();
    for (i, token) in tokens.iter().enumerate() {
        if let Ok(n) = token.parse::<i32>() {
            if let Some(next) = tokens.get(i + 1) {
                if matches!(*next, "hour" | "hours" | "hora" | "horas" | "h" | "hores") {
                    return n * 60;
                }
                if matches!(*next, "min" | "mins" | "minute" | "minutes" | "minuto" | "minutos") {
                    return n;
                }
            }
        }
        if let Some(rest) = token.strip_suffix('h') {
            if let Ok(n) = rest.parse::<i32>() {
                return n * 60;
            }
        }
        if let Some(rest) = token.strip_suffix("min") {
            if let Ok(n) = rest.parse::<i32>() {
                return n;
            }
        }
    }

    let phrases: [(&str, i32); 14] = [
        ("quick", 30),
        ("rápido", 30),
        ("rapido", 30),
        ("morning", 180),
        ("mañana", 180),
        ("afternoon", 180),
        ("tarde", 180),
        ("evening", 180),
        ("noche", 180),
        ("half day", 240),
        ("medio día", 240),
        ("full day", 480),
        ("todo el día", 480),
        ("weekend", 480),
    ];
    for (phrase, minutes) in phrases {
        if lower.contains(phrase) {
            return minutes;
        }
    }

    120
}

// ============================================================================
// ITINERARY TYPES
// ============================================================================

/// Clock-time slot for a step, present when the caller gave a start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_time: String,
    pub end_time: String,
}

/// One stop in an itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryStep {
    pub step_number: i32,
    pub place: Place,
    pub activity: String,
    pub duration_minutes: i32,
    /// Travel from the previous stop; None for the first stop
    pub travel_time_minutes: Option<i32>,
    pub time_slot: Option<TimeSlot>,
    pub personalization: Option<String>,
    pub group_note: Option<String>,
    pub budget_note: Option<String>,
}

/// A routed, time-sliced sequence of places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub title: String,
    pub description: String,
    pub steps: Vec<ItineraryStep>,
    pub total_locations: i32,
    pub total_duration_minutes: i32,
    pub total_distance_km: f64,
    pub estimated_cost: String,
    pub recommendations: Vec<String>,
    /// True when fewer places were found than requested
    pub partial: bool,
    pub metadata: serde_json::Value,
}

// ============================================================================
// TOOL
// ============================================================================

#[derive(Debug, Deserialize)]
struct ItineraryArgs {
    query: String,
    city: String,
    #[serde(default)]
    num_locations: Option<usize>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    num_people: Option<i32>,
    #[serde(default)]
    vibe: Option<String>,
    #[serde(default)]
    budget: Option<String>,
    #[serde(default)]
    transport: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    preferences: Option<Vec<String>>,
}

/// Tool that composes place searches into a routed itinerary.
pub struct CreateItineraryTool {
    source: Arc<dyn PlaceSource>,
}

impl CreateItineraryTool {
    pub fn new(source: Arc<dyn PlaceSource>) -> Self {
        Self { source }
    }

    /// Top-rated places matching the preference keywords, best first.
    fn select_places(
        mut places: Vec<Place>,
        num_needed: usize,
        preferences: Option<&[String]>,
    ) -> Vec<Place> {
        if let Some(preferences) = preferences {
            let filtered: Vec<Place> = places
                .iter()
                .filter(|p| {
                    preferences.iter().any(|pref| {
                        let pref = pref.to_lowercase();
                        p.name.to_lowercase().contains(&pref)
                            || p.categories.iter().any(|c| c.to_lowercase().contains(&pref))
                    })
                })
                .cloned()
                .collect();
            if !filtered.is_empty() {
                places = filtered;
            }
        }

        places.sort_by(|a, b| {
            b.rating
                .unwrap_or(0.0)
                .partial_cmp(&a.rating.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        places.truncate(num_needed);
        places
    }

    /// Nearest-neighbor tour starting from the user's location when known,
    /// otherwise from the first selected place.
    fn order_route(places: Vec<Place>, start: Option<Coordinates>) -> Vec<Place> {
        if places.len() <= 2 {
            return places;
        }

        let mut remaining = places;
        let mut route = Vec::with_capacity(remaining.len());
        let mut current = match start {
            Some(coordinates) => Some(coordinates),
            None => {
                let first = remaining.remove(0);
                let coordinates = first.coordinates;
                route.push(first);
                coordinates
            }
        };

        while !remaining.is_empty() {
            let nearest_idx = match current {
                Some(from) => remaining
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| {
                        distance_or_max(from, a)
                            .partial_cmp(&distance_or_max(from, b))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .map(|(i, _)| i)
                    .unwrap_or(0),
                None => 0,
            };
            let next = remaining.remove(nearest_idx);
            current = next.coordinates.or(current);
            route.push(next);
        }

        route
    }

    fn activity_for(place: &Place, vibe: Option<&str>) -> String {
        if let Some(vibe) = vibe {
            let suggestion = match vibe {
                "romantic" => Some("Enjoy a quiet moment together"),
                "party" => Some("Soak up the atmosphere"),
                "adventurous" => Some("Explore something new"),
                "chill" => Some("Relax and unwind"),
                "celebratory" => Some("Raise a toast"),
                "tired" => Some("Take it easy here"),
                _ => None,
            };
            if let Some(suggestion) = suggestion {
                return suggestion.to_string();
            }
        }

        match place.primary_category() {
            Some(category) if category.contains("bar") => "Enjoy drinks and ambiance".to_string(),
            Some(category) if category.contains("restaurant") => "Have a meal and relax".to_string(),
            Some(category) if category.contains("cafe") => "Grab a coffee and a snack".to_string(),
            Some(category) if category.contains("museum") => "Explore the exhibits".to_string(),
            Some(category) if category.contains("park") => "Take a leisurely walk".to_string(),
            _ => "Spend some time exploring".to_string(),
        }
    }

    fn recommendations(
        places: &[Place],
        num_people: Option<i32>,
        vibe: Option<&str>,
        duration_minutes: i32,
    ) -> Vec<String> {
        let mut recommendations = vec!["Check opening hours before visiting".to_string()];

        if duration_minutes >= 480 {
            recommendations.push("Pack water and wear comfortable shoes".to_string());
        } else if duration_minutes <= 60 {
            recommendations.push("A short route, ideal when time is tight".to_string());
        }

        let rated: Vec<f32> = places.iter().filter_map(|p| p.rating).collect();
        if !rated.is_empty() {
            let avg = rated.iter().sum::<f32>() / rated.len() as f32;
            if avg >= 4.5 {
                recommendations.push("All stops are highly rated".to_string());
            }
        }

        if num_people.is_some_and(|n| n > 4) {
            recommendations.push("Consider booking ahead for a large group".to_string());
        }

        match vibe {
            Some("romantic") => {
                recommendations.push("Reserve in advance for the best tables".to_string());
            }
            Some("party") => {
                recommendations.push("Check dress codes and peak hours".to_string());
            }
            _ => {}
        }

        recommendations
    }
}

fn distance_or_max(from: Coordinates, place: &Place) -> f64 {
    place
        .coordinates
        .map(|to| from.distance_km(&to))
        .unwrap_or(f64::MAX)
}

fn travel_minutes(from: &Place, to: &Place, transport: TransportMode) -> (i32, f64) {
    let distance = match (from.coordinates, to.coordinates) {
        (Some(a), Some(b)) => a.distance_km(&b),
        _ => 0.0,
    };
    let minutes = ((distance / transport.mean_speed_kmh()) * 60.0).round() as i32;
    (minutes.max(MIN_TRAVEL_MINUTES), distance)
}

fn parse_clock(time: &str) -> Option<i32> {
    let (hours, minutes) = time.trim().split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    Some(hours * 60 + minutes)
}

fn format_clock(minutes_of_day: i32) -> String {
    let wrapped = minutes_of_day.rem_euclid(24 * 60);
    format!("{:02}:{:02}", wrapped / 60, wrapped % 60)
}

#[async_trait]
impl Tool for CreateItineraryTool {
    fn name(&self) -> &str {
        "create_itinerary"
    }

    fn description(&self) -> &str {
        "Build a multi-stop outing plan in a city: searches places, picks the best rated, \
orders them into a walkable route, and assigns time to each stop."
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What kind of plan, e.g. 'bares'"},
                "city": {"type": "string"},
                "num_locations": {"type": "integer", "description": "Stops to include (2-10, default 3)"},
                "duration": {"type": "string", "description": "Total time, e.g. '2 hours', 'evening'"},
                "num_people": {"type": "integer"},
                "vibe": {"type": "string", "description": "romantic, party, chill, adventurous, celebratory or tired"},
                "budget": {"type": "string", "description": "low, medium or high"},
                "transport": {"type": "string", "description": "walking, driving or transit"},
                "start_time": {"type": "string", "description": "HH:MM start, optional"},
                "preferences": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["query", "city"]
        })
    }

    async fn invoke(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> AgentResult<serde_json::Value> {
        let args: ItineraryArgs = serde_json::from_value(arguments).map_err(|e| {
            ToolError::InvalidArguments {
                tool: "create_itinerary".to_string(),
                reason: e.to_string(),
            }
        })?;

        let plan = &context.plan_params;
        let num_locations = args.num_locations.unwrap_or(3).clamp(2, 10);
        let duration = args
            .duration
            .or_else(|| plan.duration.clone())
            .unwrap_or_else(|| "2 hours".to_string());
        let duration_minutes = parse_duration_minutes(&duration);
        let num_people = args.num_people.or(plan.num_people);
        let vibe = args.vibe.or_else(|| plan.vibe.clone());
        let budget = args
            .budget
            .and_then(|b| b.parse::<BudgetLevel>().ok())
            .or(plan.budget);
        let transport = args
            .transport
            .and_then(|t| t.parse::<TransportMode>().ok())
            .or(plan.transport)
            .unwrap_or(TransportMode::Walking);

        let (query, place_type) = normalize_place_query(&args.query);
        let search = PlaceSearch::new(&query, &args.city)
            .with_place_type(place_type)
            .with_location(context.location)
            .with_radius_km(10.0)
            .with_limit(num_locations * 2);
        let candidates = self.source.search(&search).await?;

        if candidates.is_empty() {
            return Err(ToolError::InvocationFailed {
                tool: "create_itinerary".to_string(),
                reason: format!("no places found for '{}' in {}", args.query, args.city),
            }
            .into());
        }

        let selected =
            Self::select_places(candidates, num_locations, args.preferences.as_deref());
        let partial = selected.len() < num_locations;
        let route = Self::order_route(selected, context.location);

        // Travel legs between consecutive stops
        let mut travel: Vec<(i32, f64)> = Vec::with_capacity(route.len());
        for i in 0..route.len() {
            if i == 0 {
                travel.push((0, 0.0));
            } else {
                travel.push(travel_minutes(&route[i - 1], &route[i], transport));
            }
        }
        let total_travel: i32 = travel.iter().map(|(m, _)| m).sum();
        let total_distance: f64 = travel.iter().map(|(_, d)| d).sum();

        // Distribute the remaining time evenly, never below the floor
        let per_stop =
            ((duration_minutes - total_travel) / route.len() as i32).max(MIN_STOP_MINUTES);

        let mut clock = args.start_time.as_deref().and_then(parse_clock);
        let mut steps = Vec::with_capacity(route.len());
        for (i, place) in route.iter().enumerate() {
            let travel_time = if i == 0 { None } else { Some(travel[i].0) };

            let time_slot = match clock {
                Some(previous_end) => {
                    let start = previous_end + travel_time.unwrap_or(0);
                    let end = start + per_stop;
                    clock = Some(end);
                    Some(TimeSlot { start_time: format_clock(start), end_time: format_clock(end) })
                }
                None => None,
            };

            let personalization = vibe.as_deref().map(|v| {
                match v {
                    "romantic" => "A good pick for couples; book ahead",
                    "party" => "One of the liveliest spots around",
                    "adventurous" => "Something a bit different",
                    "chill" => "Perfect for switching off",
                    "celebratory" => "Great spot to celebrate",
                    "tired" => "Low-key and easygoing",
                    _ => "Enjoy this stop",
                }
                .to_string()
            });
            let group_note = num_people
                .filter(|n| *n > 4)
                .map(|_| "Works well for larger groups".to_string());
            let budget_note = budget.map(|b| match b {
                BudgetLevel::Low => "Wallet-friendly option".to_string(),
                BudgetLevel::Medium => "Mid-range prices".to_string(),
                BudgetLevel::High => "Premium option".to_string(),
            });

            steps.push(ItineraryStep {
                step_number: (i + 1) as i32,
                place: place.clone(),
                activity: Self::activity_for(place, vibe.as_deref()),
                duration_minutes: per_stop,
                travel_time_minutes: travel_time,
                time_slot,
                personalization,
                group_note,
                budget_note,
            });
        }

        let total_duration: i32 = per_stop * route.len() as i32 + total_travel;
        let recommendations =
            Self::recommendations(&route, num_people, vibe.as_deref(), duration_minutes);

        let itinerary = Itinerary {
            title: format!("{} in {} - {} stops", args.query, args.city, route.len()),
            description: format!(
                "A {} route with {} stops in {}",
                transport.as_str(),
                route.len(),
                args.city
            ),
            total_locations: route.len() as i32,
            total_duration_minutes: total_duration,
            total_distance_km: (total_distance * 100.0).round() / 100.0,
            estimated_cost: budget.unwrap_or(BudgetLevel::Medium).cost_symbol().to_string(),
            recommendations,
            partial,
            metadata: json!({
                "vibe": vibe,
                "group_size": num_people,
                "transport": transport.as_str(),
                "budget": budget.map(|b| b.as_str()),
                "requested_locations": num_locations,
            }),
            steps,
        };

        serde_json::to_value(&itinerary).map_err(|e| {
            ToolError::InvocationFailed {
                tool: "create_itinerary".to_string(),
                reason: format!("serialization failed: {}", e),
            }
            .into()
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
