use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;

use super::{validate_command, CommandData, Reply, Webhook};
use crate::config::Config;
use crate::maps::{traffic_message, LocationAliases, RouteMapper};
use crate::slack::ResponseType;
use crate::validation::{parse_locations, FormParams, Locations, ValidationErrors};

/// `/traffic from: <origin> to: <destination>`: replies in channel with a
/// route map and travel time.
pub struct TrafficPoster {
    token: String,
    aliases: LocationAliases,
    mapper: Arc<dyn RouteMapper>,
    image_url_format: String,
}

impl TrafficPoster {
    pub fn new(config: &Config, mapper: Arc<dyn RouteMapper>) -> Self {
        Self {
            token: config.slack.traffic_command.token.clone(),
            aliases: LocationAliases::new(config.google.location_aliases.clone()),
            mapper,
            image_url_format: config.google.static_map.url_format.clone(),
        }
    }
}

#[async_trait]
impl Webhook for TrafficPoster {
    type Data = CommandData<Locations>;

    fn name(&self) -> &'static str {
        "traffic"
    }

    fn validate(&self, params: &FormParams) -> Result<Self::Data, ValidationErrors> {
        validate_command(params, &self.token, |text| {
            let locations = parse_locations(text)?;
            Ok(Locations {
                origin: self.aliases.resolve(&locations.origin),
                destination: self.aliases.resolve(&locations.destination),
            })
        })
    }

    async fn dispatch(&self, data: Self::Data) -> anyhow::Result<Reply> {
        let Locations {
            origin,
            destination,
        } = data.text;
        let summary = self.mapper.map_route(&origin, &destination).await?;
        let message = traffic_message(&origin, &destination, &summary, &self.image_url_format)
            .response_type(ResponseType::InChannel);
        Ok(Reply::json(StatusCode::OK, &message))
    }
}
