//! Geoapify reverse geocoding.

use crate::ports::Geocoder;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(default)]
    formatted: Option<String>,
}

/// Resolves coordinates to an address through Geoapify.
#[derive(Debug, Clone)]
pub struct GeoapifyClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeoapifyClient {
    /// Creates a client. `base_url` is the API host, e.g. `https://api.geoapify.com`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn lookup(&self, lat: &str, lng: &str) -> Result<Option<String>, String> {
        let url = format!("{}/v1/geocode/reverse", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("lat", lat), ("lon", lng), ("apiKey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("status {}", status.as_u16()));
        }

        let collection: FeatureCollection = response.json().await.map_err(|e| e.to_string())?;
        Ok(collection
            .features
            .into_iter()
            .next()
            .and_then(|f| f.properties.formatted)
            .filter(|a| !a.trim().is_empty()))
    }
}

#[async_trait]
impl Geocoder for GeoapifyClient {
    async fn address(&self, lat: &str, lng: &str) -> Option<String> {
        match self.lookup(lat, lng).await {
            Ok(address) => address,
            Err(error) => {
                tracing::warn!(lat, lng, %error, "Reverse geocoding failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_feature_wins() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"properties":{"formatted":"Av. 9 de Octubre, Guayaquil, Ecuador"}},
            {"properties":{"formatted":"Other"}}
        ]}"#;
        let collection: FeatureCollection = serde_json::from_str(json).unwrap();
        assert_eq!(
            collection.features[0].properties.formatted.as_deref(),
            Some("Av. 9 de Octubre, Guayaquil, Ecuador")
        );
    }

    #[test]
    fn test_empty_collection() {
        let collection: FeatureCollection = serde_json::from_str(r#"{"features":[]}"#).unwrap();
        assert!(collection.features.is_empty());
    }
}
