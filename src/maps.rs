use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::{expand_home, GoogleConfig};
use crate::slack::{Attachment, AttachmentField, SlackMessage};

const MODE: &str = "driving";
const LANGUAGE: &str = "en";
const UNITS: &str = "imperial";
const TRAFFIC_MODEL: &str = "best_guess";
const DEPARTURE_TIME: &str = "now";

/// Travel summary for one route plus the stored map image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSummary {
    pub duration: String,
    pub distance: String,
    pub image_name: String,
}

#[async_trait]
pub trait RouteMapper: Send + Sync {
    async fn map_route(&self, origin: &str, destination: &str) -> Result<RouteSummary>;
}

/// Short names for frequently used addresses (`home`, `work`, ...).
#[derive(Debug, Clone, Default)]
pub struct LocationAliases(HashMap<String, String>);

impl LocationAliases {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self(aliases)
    }

    pub fn resolve(&self, location: &str) -> String {
        self.0
            .get(location)
            .cloned()
            .unwrap_or_else(|| location.to_string())
    }
}

/// Fill `{}` placeholders in order. Surplus placeholders are left untouched.
pub fn fill_placeholders(format: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut rest = format;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match args.next() {
            Some(arg) => out.push_str(arg),
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

/// The chat message announcing a route's traffic conditions.
pub fn traffic_message(
    origin: &str,
    destination: &str,
    summary: &RouteSummary,
    image_url_format: &str,
) -> SlackMessage {
    SlackMessage::new(format!(
        "Here are the traffic conditions between {} and {}",
        origin, destination
    ))
    .attachment(Attachment {
        fields: vec![
            AttachmentField {
                title: "Duration".to_string(),
                value: summary.duration.clone(),
                short: true,
            },
            AttachmentField {
                title: "Distance".to_string(),
                value: summary.distance.clone(),
                short: true,
            },
        ],
        image_url: Some(fill_placeholders(image_url_format, &[&summary.image_name])),
        ..Attachment::default()
    })
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct Route {
    overview_polyline: Polyline,
    legs: Vec<Leg>,
}

#[derive(Debug, Deserialize)]
struct Polyline {
    points: String,
}

#[derive(Debug, Deserialize)]
struct Leg {
    duration: TextValue,
    #[serde(default)]
    duration_in_traffic: Option<TextValue>,
    distance: TextValue,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    text: String,
}

#[derive(Debug)]
struct Directions {
    polyline: String,
    duration: String,
    distance: String,
}

impl DirectionsResponse {
    fn into_directions(self) -> Result<Directions> {
        if self.status != "OK" {
            anyhow::bail!(
                "Directions API returned {}: {}",
                self.status,
                self.error_message.unwrap_or_default()
            );
        }
        let route = self
            .routes
            .into_iter()
            .next()
            .context("Directions response has no routes")?;
        let leg = route
            .legs
            .into_iter()
            .next()
            .context("Directions route has no legs")?;
        Ok(Directions {
            polyline: route.overview_polyline.points,
            duration: leg.duration_in_traffic.unwrap_or(leg.duration).text,
            distance: leg.distance.text,
        })
    }
}

/// Google Directions + Static Maps client. Map images are written to the
/// configured image directory, named by content hash.
pub struct TrafficMapper {
    client: reqwest::Client,
    config: GoogleConfig,
    image_directory: PathBuf,
}

impl TrafficMapper {
    pub fn new(config: GoogleConfig) -> Self {
        let image_directory = expand_home(&config.static_map.image_directory);
        Self {
            client: reqwest::Client::new(),
            config,
            image_directory,
        }
    }

    async fn directions(&self, origin: &str, destination: &str) -> Result<Directions> {
        let directions = &self.config.directions;
        debug!("Requesting directions from {} to {}", origin, destination);

        let response = self
            .client
            .get(&directions.url)
            .query(&[
                ("origin", origin),
                ("destination", destination),
                ("mode", MODE),
                ("language", LANGUAGE),
                ("units", UNITS),
                ("traffic_model", TRAFFIC_MODEL),
                ("departure_time", DEPARTURE_TIME),
                ("key", directions.key.as_str()),
            ])
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to send request to Directions API")?
            .error_for_status()
            .map_err(reqwest::Error::without_url)
            .context("Directions API request failed")?;

        let body: DirectionsResponse = response
            .json()
            .await
            .context("Failed to parse Directions API response")?;
        body.into_directions()
    }

    async fn static_map(&self, polyline: &str, origin: &str, destination: &str) -> Result<Vec<u8>> {
        let static_map = &self.config.static_map;
        let size = format!("{}x{}", static_map.size.width, static_map.size.height);
        let path = fill_placeholders(&static_map.path_format, &[polyline]);
        let marker_a = fill_placeholders(&static_map.marker_format, &["A", origin]);
        let marker_b = fill_placeholders(&static_map.marker_format, &["B", destination]);

        let response = self
            .client
            .get(&static_map.url_base)
            .query(&[
                ("size", size.as_str()),
                ("key", static_map.key.as_str()),
                ("path", path.as_str()),
                ("markers", marker_a.as_str()),
                ("markers", marker_b.as_str()),
            ])
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to send request to Static Maps API")?
            .error_for_status()
            .map_err(reqwest::Error::without_url)
            .context("Static Maps API request failed")?;

        let bytes = response
            .bytes()
            .await
            .context("Failed to read static map image")?;
        Ok(bytes.to_vec())
    }

    async fn store_image(&self, image: &[u8]) -> Result<String> {
        let name = image_file_name(image);
        tokio::fs::create_dir_all(&self.image_directory)
            .await
            .with_context(|| {
                format!(
                    "Failed to create image directory: {}",
                    self.image_directory.display()
                )
            })?;
        let path = self.image_directory.join(&name);
        tokio::fs::write(&path, image)
            .await
            .with_context(|| format!("Failed to write map image: {}", path.display()))?;
        Ok(name)
    }
}

#[async_trait]
impl RouteMapper for TrafficMapper {
    async fn map_route(&self, origin: &str, destination: &str) -> Result<RouteSummary> {
        let directions = self.directions(origin, destination).await?;
        let image = self
            .static_map(&directions.polyline, origin, destination)
            .await?;
        let image_name = self.store_image(&image).await?;

        info!(
            origin,
            destination,
            duration = %directions.duration,
            image = %image_name,
            "Mapped route"
        );
        Ok(RouteSummary {
            duration: directions.duration,
            distance: directions.distance,
            image_name,
        })
    }
}

fn image_file_name(image: &[u8]) -> String {
    format!("{}.png", hex::encode(Sha256::digest(image)))
}
