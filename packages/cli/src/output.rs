//! Human-readable and JSON renderings of search results.

use revgeo_index::{SearchResponse, SearchResult};

/// One-line description of a result, e.g.
/// `Point is within München, search took 2ms`.
#[must_use]
pub fn describe(result: &SearchResult) -> String {
    result.city().map_or_else(
        || "No results found".to_string(),
        |city| {
            format!(
                "Point is {} {city}, search took {}ms",
                result.match_kind().relation(),
                result.elapsed_ms()
            )
        },
    )
}

/// The result as pretty-printed [`SearchResponse`] JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(result: &SearchResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&SearchResponse::from(result))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use revgeo_index::SearchHit;

    use super::*;

    fn result(hit: SearchHit) -> SearchResult {
        SearchResult {
            hit,
            elapsed: Duration::from_millis(3),
        }
    }

    #[test]
    fn describes_each_tier() {
        assert_eq!(
            describe(&result(SearchHit::Shape("München".to_string()))),
            "Point is within München, search took 3ms"
        );
        assert_eq!(
            describe(&result(SearchHit::Point("Planegg".to_string()))),
            "Point is nearby Planegg, search took 3ms"
        );
        assert_eq!(describe(&result(SearchHit::Empty)), "No results found");
    }

    #[test]
    fn json_has_null_city_when_empty() {
        let json = to_json(&result(SearchHit::Empty)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["city"].is_null());
        assert_eq!(value["match_kind"], "point");
    }
}
