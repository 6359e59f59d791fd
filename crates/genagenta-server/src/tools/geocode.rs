//! Address geocoding via a Nominatim-compatible service

use std::time::Duration;

use async_trait::async_trait;
use genagenta_agent::{Caller, Tool, ToolResult};
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const MAX_RESULTS: usize = 5;
const TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct NominatimResult {
    display_name: String,
    lat: String,
    lon: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

pub struct GeocodeAddressTool {
    client: reqwest::Client,
    base_url: String,
}

impl GeocodeAddressTool {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for GeocodeAddressTool {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl Tool for GeocodeAddressTool {
    fn name(&self) -> &str {
        "geocode_address"
    }

    fn description(&self) -> &str {
        "Look up coordinates for a street address or place name. Returns up to 5 candidates with formatted name, lat, lng, and type."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "address": {
                    "type": "string",
                    "description": "Free-form address or place name"
                }
            },
            "required": ["address"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        let address = match arguments.get("address").and_then(|v| v.as_str()) {
            Some(a) if !a.trim().is_empty() => a,
            _ => return ToolResult::error("Missing 'address' argument"),
        };

        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", address),
                ("format", "json"),
                ("limit", &MAX_RESULTS.to_string()),
            ])
            .header("User-Agent", "genagenta-server")
            .timeout(TIMEOUT)
            .send()
            .await;

        // Transport trouble is a hard failure; an empty match list is not.
        let response = match response {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Geocoding request failed: {}", e)),
        };
        if !response.status().is_success() {
            return ToolResult::error(format!(
                "Geocoding service returned HTTP {}",
                response.status().as_u16()
            ));
        }

        let raw: Vec<NominatimResult> = match response.json().await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Geocoding response unreadable: {}", e)),
        };

        let results: Vec<_> = raw
            .into_iter()
            .filter_map(|r| {
                let lat: f64 = r.lat.parse().ok()?;
                let lng: f64 = r.lon.parse().ok()?;
                Some(json!({
                    "formatted": r.display_name,
                    "lat": lat,
                    "lng": lng,
                    "type": r.kind,
                }))
            })
            .take(MAX_RESULTS)
            .collect();

        ToolResult::ok(json!({"success": true, "results": results}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn caller() -> Caller {
        Caller::new("u1", "t1", "Mario")
    }

    #[tokio::test]
    async fn test_geocode_normalizes_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Rome"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"display_name": "Roma, Italia", "lat": "41.8933", "lon": "12.4829", "type": "city"}
            ])))
            .mount(&server)
            .await;

        let tool = GeocodeAddressTool::new(server.uri());
        let result = tool.execute(json!({"address": "Rome"}), &caller()).await;
        assert!(!result.is_error);
        let first = &result.payload["results"][0];
        assert_eq!(first["formatted"], "Roma, Italia");
        assert_eq!(first["lat"], 41.8933);
        assert_eq!(first["type"], "city");
    }

    #[tokio::test]
    async fn test_geocode_no_match_fails_soft() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let tool = GeocodeAddressTool::new(server.uri());
        let result = tool
            .execute(json!({"address": "xyzzy nowhere"}), &caller())
            .await;
        assert!(!result.is_error);
        assert_eq!(result.payload["success"], true);
        assert!(result.payload["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_geocode_server_error_fails_hard() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tool = GeocodeAddressTool::new(server.uri());
        let result = tool.execute(json!({"address": "Rome"}), &caller()).await;
        assert!(result.is_error);
    }
}
