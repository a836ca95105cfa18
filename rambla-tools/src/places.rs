//! Places service client and the search_places tool.

use crate::{Tool, ToolContext};
use async_trait::async_trait;
use rambla_core::{AgentResult, Coordinates, Place, ToolError, short_hash};
use rambla_storage::{CacheBackend, places_key};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Supported-language place vocabulary -> canonical search term. Applied
/// before calling the Places service so "bares" and "cervecería" both land
/// on "bar". Checked longest-phrase-first by construction.
const TERM_MAPPING: [(&str, &str); 38] = [
    ("centro comercial", "shopping_mall"),
    ("centros comerciales", "shopping_mall"),
    ("bares", "bar"),
    ("bar", "bar"),
    ("bars", "bar"),
    ("pub", "bar"),
    ("pubs", "bar"),
    ("taberna", "bar"),
    ("tabernas", "bar"),
    ("cervecería", "bar"),
    ("cervecerías", "bar"),
    ("restaurantes", "restaurant"),
    ("restaurante", "restaurant"),
    ("restaurants", "restaurant"),
    ("restaurant", "restaurant"),
    ("tapas", "restaurant"),
    ("cenar", "restaurant"),
    ("comer", "restaurant"),
    ("cafeterías", "cafe"),
    ("cafetería", "cafe"),
    ("cafés", "cafe"),
    ("café", "cafe"),
    ("cafes", "cafe"),
    ("cafe", "cafe"),
    ("desayunar", "cafe"),
    ("museos", "museum"),
    ("museo", "museum"),
    ("museums", "museum"),
    ("museum", "museum"),
    ("galería", "museum"),
    ("parques", "park"),
    ("parque", "park"),
    ("parks", "park"),
    ("park", "park"),
    ("jardín", "park"),
    ("discoteca", "nightclub"),
    ("discotecas", "nightclub"),
    ("hoteles", "lodging"),
];

/// Normalize a user-language place query to a canonical API term without
/// losing modifiers.
///
/// Returns `(search_query, place_type)`: an exact vocabulary hit replaces
/// the query with the canonical term; a query that merely contains one keeps
/// its modifiers ("tapas asiáticas") and only gains a type filter.
pub fn normalize_place_query(query: &str) -> (String, Option<String>) {
    let trimmed = query.trim();
    let lower = trimmed.to_lowercase();

    for (term, canonical) in TERM_MAPPING {
        if lower == term {
            return (canonical.to_string(), Some(canonical.to_string()));
        }
    }

    for (term, canonical) in TERM_MAPPING {
        if lower.contains(term) {
            return (trimmed.to_string(), Some(canonical.to_string()));
        }
    }

    (trimmed.to_string(), None)
}

// ============================================================================
// PLACE SOURCE PORT
// ============================================================================

/// One place lookup against the Places service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSearch {
    pub query: String,
    pub city: String,
    pub location: Option<Coordinates>,
    pub radius_km: f64,
    pub limit: usize,
    pub place_type: Option<String>,
}

impl PlaceSearch {
    pub fn new(query: &str, city: &str) -> Self {
        Self {
            query: query.to_string(),
            city: city.to_string(),
            location: None,
            radius_km: 5.0,
            limit: 5,
            place_type: None,
        }
    }

    pub fn with_location(mut self, location: Option<Coordinates>) -> Self {
        self.location = location;
        self
    }

    pub fn with_radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_place_type(mut self, place_type: Option<String>) -> Self {
        self.place_type = place_type;
        self
    }
}

/// Port to the Places service. The HTTP client implements it for
/// production; tests script it.
#[async_trait]
pub trait PlaceSource: Send + Sync {
    async fn search(&self, search: &PlaceSearch) -> AgentResult<Vec<Place>>;
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

#[derive(Debug, Deserialize)]
struct PlacesEnvelope {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// HTTP client for the Places microservice.
pub struct PlacesClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl PlacesClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), timeout }
    }
}

#[async_trait]
impl PlaceSource for PlacesClient {
    async fn search(&self, search: &PlaceSearch) -> AgentResult<Vec<Place>> {
        let url = format!("{}/places/search", self.base_url);
        let mut params: Vec<(&str, String)> = vec![
            ("q", search.query.clone()),
            ("city", search.city.clone()),
            ("limit", search.limit.to_string()),
        ];
        if let Some(place_type) = &search.place_type {
            params.push(("type", place_type.clone()));
        }
        if let Some(location) = &search.location {
            params.push(("lat", location.lat.to_string()));
            params.push(("lon", location.lon.to_string()));
            params.push(("radius_km", search.radius_km.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool: "places_service".to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    ToolError::InvocationFailed {
                        tool: "places_service".to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(ToolError::InvocationFailed {
                tool: "places_service".to_string(),
                reason: format!("status {}", response.status().as_u16()),
            }
            .into());
        }

        let envelope: PlacesEnvelope = response.json().await.map_err(|e| {
            ToolError::InvocationFailed {
                tool: "places_service".to_string(),
                reason: format!("unreadable response: {}", e),
            }
        })?;

        // Skip records that fail to parse rather than failing the search
        let mut places = Vec::with_capacity(envelope.data.len());
        for value in envelope.data {
            match serde_json::from_value::<Place>(value) {
                Ok(place) => places.push(place),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unparseable place record");
                }
            }
        }
        Ok(places)
    }
}

// ============================================================================
// MOCK SOURCE
// ============================================================================

/// Scripted place source for tests. Scripted outcomes are consumed first;
/// once exhausted the default result is returned, and every search is
/// recorded for inspection.
#[derive(Default)]
pub struct MockPlaceSource {
    default_places: Vec<Place>,
    script: Mutex<VecDeque<AgentResult<Vec<Place>>>>,
    searches: Mutex<Vec<PlaceSearch>>,
}

impl MockPlaceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_places(places: Vec<Place>) -> Self {
        Self { default_places: places, ..Default::default() }
    }

    pub fn push_result(&self, result: AgentResult<Vec<Place>>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn push_error(&self, reason: &str) {
        self.push_result(Err(ToolError::InvocationFailed {
            tool: "places_service".to_string(),
            reason: reason.to_string(),
        }
        .into()));
    }

    pub fn searches(&self) -> Vec<PlaceSearch> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaceSource for MockPlaceSource {
    async fn search(&self, search: &PlaceSearch) -> AgentResult<Vec<Place>> {
        self.searches.lock().unwrap().push(search.clone());
        if let Some(result) = self.script.lock().unwrap().pop_front() {
            return result;
        }
        let mut places = self.default_places.clone();
        places.truncate(search.limit);
        Ok(places)
    }
}

// ============================================================================
// SEARCH TOOL
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    city: String,
    #[serde(default)]
    radius_km: Option<f64>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    filters: Option<Vec<String>>,
}

/// Tool that searches the Places service for venues, with an optional
/// short-TTL result cache.
pub struct SearchPlacesTool {
    source: std::sync::Arc<dyn PlaceSource>,
    cache: Option<(std::sync::Arc<dyn CacheBackend>, Duration)>,
}

impl SearchPlacesTool {
    pub fn new(source: std::sync::Arc<dyn PlaceSource>) -> Self {
        Self { source, cache: None }
    }

    /// Cache identical lookups under `agent:places:{hash}`.
    pub fn with_cache(mut self, cache: std::sync::Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        self.cache = Some((cache, ttl));
        self
    }

    /// Cached results for a search, if any. Cache failures degrade to the
    /// live source.
    async fn cached(&self, key: &str) -> Option<Vec<Place>> {
        let (cache, _) = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "places cache read failed");
                None
            }
        }
    }

    async fn store(&self, key: &str, places: &[Place]) {
        let Some((cache, ttl)) = self.cache.as_ref() else { return };
        let Ok(raw) = serde_json::to_string(places) else { return };
        if let Err(e) = cache.set(key, &raw, *ttl).await {
            tracing::warn!(error = %e, "places cache write failed");
        }
    }
}

fn search_cache_key(search: &PlaceSearch) -> String {
    let fingerprint = serde_json::to_string(search).unwrap_or_default();
    places_key(&short_hash(&[&fingerprint]))
}

#[async_trait]
impl Tool for SearchPlacesTool {
    fn name(&self) -> &str {
        "search_places"
    }

    fn description(&self) -> &str {
        "Search for real places (bars, restaurants, cafes, museums, parks) in a city. \
Use canonical terms like 'bar' or 'restaurant' for the query."
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What kind of place to find"},
                "city": {"type": "string", "description": "City to search in"},
                "radius_km": {"type": "number", "description": "Search radius around the user, in km"},
                "limit": {"type": "integer", "description": "Maximum results (default 5)"},
                "filters": {"type": "array", "items": {"type": "string"}, "description": "Keywords the results should match"}
            },
            "required": ["query", "city"]
        })
    }

    async fn invoke(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> AgentResult<serde_json::Value> {
        let args: SearchArgs = serde_json::from_value(arguments).map_err(|e| {
            ToolError::InvalidArguments { tool: "search_places".to_string(), reason: e.to_string() }
        })?;

        let (query, place_type) = normalize_place_query(&args.query);
        let search = PlaceSearch::new(&query, &args.city)
            .with_place_type(place_type)
            .with_location(context.location)
            .with_radius_km(args.radius_km.unwrap_or(5.0))
            .with_limit(args.limit.unwrap_or(5).clamp(1, 20));

        let key = search_cache_key(&search);
        let mut places = match self.cached(&key).await {
            Some(places) => places,
            None => {
                let places = self.source.search(&search).await?;
                self.store(&key, &places).await;
                places
            }
        };

        if let Some(filters) = &args.filters {
            let filtered: Vec<Place> = places
                .iter()
                .filter(|p| {
                    filters.iter().any(|f| {
                        let f = f.to_lowercase();
                        p.name.to_lowercase().contains(&f)
                            || p.categories.iter().any(|c| c.to_lowercase().contains(&f))
                    })
                })
                .cloned()
                .collect();
            if !filtered.is_empty() {
                places = filtered;
            }
        }

        Ok(json!({
            "count": places.len(),
            "city": args.city,
            "places": places,
        }))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rambla_core::Language;
    use std::sync::Arc;

    fn place(id: &str, name: &str, rating: f32, lat: f64, lon: f64) -> Place {
        Place {
            id: id.to_string(),
            name: name.to_string(),
            address: None,
            coordinates: Some(Coordinates::new(lat, lon)),
            rating: Some(rating),
            rating_count: Some(120),
            categories: vec!["bar".to_string()],
            opening_hours: None,
            price_level: Some(2),
        }
    }

    #[test]
    fn test_normalize_exact_term() {
        assert_eq!(
            normalize_place_query("bares"),
            ("bar".to_string(), Some("bar".to_string()))
        );
        assert_eq!(
            normalize_place_query("Restaurantes"),
            ("restaurant".to_string(), Some("restaurant".to_string()))
        );
    }

    #[test]
    fn test_normalize_keeps_modifiers() {
        let (query, place_type) = normalize_place_query("restaurantes asiáticos");
        assert_eq!(query, "restaurantes asiáticos");
        assert_eq!(place_type.as_deref(), Some("restaurant"));
    }

    #[test]
    fn test_normalize_unknown_passthrough() {
        let (query, place_type) = normalize_place_query("sitios con encanto");
        assert_eq!(query, "sitios con encanto");
        assert!(place_type.is_none());
    }

    #[tokio::test]
    async fn test_search_tool_normalizes_and_limits() {
        let source = Arc::new(MockPlaceSource::with_places(vec![
            place("p1", "Bar Uno", 4.5, 41.65, -0.88),
            place("p2", "Bar Dos", 4.2, 41.66, -0.87),
        ]));
        let tool = SearchPlacesTool::new(source.clone());
        let context = ToolContext::new(Language::Es);

        let observation = tool
            .invoke(json!({"query": "bares", "city": "Zaragoza", "limit": 1}), &context)
            .await
            .unwrap();
        assert_eq!(observation["count"], 1);
        assert_eq!(observation["places"][0]["name"], "Bar Uno");

        let searches = source.searches();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].query, "bar");
        assert_eq!(searches[0].place_type.as_deref(), Some("bar"));
        assert_eq!(searches[0].city, "Zaragoza");
    }

    #[tokio::test]
    async fn test_search_tool_filters_keep_matches() {
        let mut terrace = place("p3", "Terraza Sur", 4.0, 41.64, -0.89);
        terrace.categories = vec!["bar".to_string(), "terraza".to_string()];
        let source = Arc::new(MockPlaceSource::with_places(vec![
            place("p1", "Bar Uno", 4.5, 41.65, -0.88),
            terrace,
        ]));
        let tool = SearchPlacesTool::new(source);
        let context = ToolContext::new(Language::Es);

        let observation = tool
            .invoke(
                json!({"query": "bares", "city": "Zaragoza", "filters": ["terraza"]}),
                &context,
            )
            .await
            .unwrap();
        assert_eq!(observation["count"], 1);
        assert_eq!(observation["places"][0]["name"], "Terraza Sur");
    }

    #[tokio::test]
    async fn test_search_tool_caches_identical_lookups() {
        use rambla_storage::MemoryCache;

        let source = Arc::new(MockPlaceSource::with_places(vec![place(
            "p1", "Bar Uno", 4.5, 41.65, -0.88,
        )]));
        let cache = Arc::new(MemoryCache::new());
        let tool = SearchPlacesTool::new(source.clone())
            .with_cache(cache, std::time::Duration::from_secs(60));
        let context = ToolContext::new(Language::Es);
        let args = json!({"query": "bares", "city": "Zaragoza"});

        let first = tool.invoke(args.clone(), &context).await.unwrap();
        let second = tool.invoke(args, &context).await.unwrap();
        assert_eq!(first, second);
        // The second lookup never reached the Places service
        assert_eq!(source.searches().len(), 1);
    }

    #[tokio::test]
    async fn test_search_tool_bad_arguments() {
        let tool = SearchPlacesTool::new(Arc::new(MockPlaceSource::new()));
        let context = ToolContext::new(Language::Es);
        let err = tool.invoke(json!({"query": "bares"}), &context).await.unwrap_err();
        assert_eq!(err.kind(), rambla_core::ErrorKind::ToolError);
    }

    #[tokio::test]
    async fn test_search_tool_propagates_source_error() {
        let source = Arc::new(MockPlaceSource::new());
        source.push_error("connection refused");
        let tool = SearchPlacesTool::new(source);
        let context = ToolContext::new(Language::Es);
        let err = tool
            .invoke(json!({"query": "bares", "city": "Zaragoza"}), &context)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), rambla_core::ErrorKind::ToolError);
    }
}
