//! Command-line interface for spotseek
//!
//! Parses arguments with clap, turns them into a [`ClientConfig`], and
//! renders fetched spots as text or JSON.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::cache::{CachePolicy, TimedConfig};
use crate::config::{ClientConfig, TransportConfig};
use crate::dao::OAuthConsumer;
use crate::data::Spot;
use crate::error::DataFailureError;

/// Error types for the command line
#[derive(Debug, Error)]
pub enum CliError {
    /// The `--cache` value is not a known policy
    #[error("Invalid cache policy: '{0}'. Valid policies: none, etag, simple, four-hour, timed:<seconds>")]
    InvalidCache(String),

    /// A search argument is not of the form KEY=VALUE
    #[error("Invalid search parameter: '{0}'. Expected KEY=VALUE")]
    InvalidQuery(String),

    /// Both a live host and fixture directories were given
    #[error("--host and --resources can't be used together")]
    ConflictingTransport,

    /// Only one half of the OAuth consumer credentials was given
    #[error("--oauth-key and --oauth-secret must be given together")]
    IncompleteOAuth,

    /// Fetching or mapping data failed
    #[error(transparent)]
    Fetch(#[from] DataFailureError),

    /// Rendering JSON output failed
    #[error("Failed to render JSON: {0}")]
    Render(#[from] serde_json::Error),
}

/// Spotseek - look up study spots on a Spotseeker server
#[derive(Parser, Debug)]
#[command(name = "spotseek")]
#[command(about = "Query a Spotseeker server for study spots")]
#[command(version)]
pub struct Cli {
    /// Spotseeker server to query (e.g. https://spotseeker.example.edu)
    #[arg(long, global = true, env = "SPOTSEEK_HOST")]
    pub host: Option<String>,

    /// OAuth consumer key for signing requests to --host
    #[arg(long, global = true, env = "SPOTSEEK_OAUTH_KEY")]
    pub oauth_key: Option<String>,

    /// OAuth consumer secret for signing requests to --host
    #[arg(long, global = true, env = "SPOTSEEK_OAUTH_SECRET", hide_env_values = true)]
    pub oauth_secret: Option<String>,

    /// Directory of mock resources, searched in the order given
    ///
    /// Defaults to the fixtures bundled with spotseek when no --host is set.
    #[arg(long = "resources", value_name = "DIR", global = true, env = "SPOTSEEK_RESOURCES", value_delimiter = ',')]
    pub resources: Vec<PathBuf>,

    /// Cache policy: none, etag, simple, four-hour or timed:<seconds>
    #[arg(long, global = true, env = "SPOTSEEK_CACHE", default_value = "none")]
    pub cache: String,

    /// Directory for cached responses
    #[arg(long, value_name = "DIR", global = true, env = "SPOTSEEK_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show one spot by id
    Spot {
        /// Spot id
        id: String,
    },
    /// Search spots by query parameters
    ///
    /// Example: spotseek search limit=5 open_now=true
    Search {
        #[arg(value_name = "KEY=VALUE", required = true)]
        params: Vec<String>,
    },
}

/// Parses a `--cache` value into a policy.
///
/// # Returns
/// * `Ok(CachePolicy)` if the value names a policy
/// * `Err(CliError::InvalidCache)` otherwise
pub fn parse_cache_arg(s: &str) -> Result<CachePolicy, CliError> {
    let value = s.trim().to_lowercase();
    match value.as_str() {
        "none" => Ok(CachePolicy::None),
        "etag" => Ok(CachePolicy::ETag),
        "simple" => Ok(CachePolicy::Timed(TimedConfig::simple())),
        "four-hour" | "four_hour" => Ok(CachePolicy::Timed(TimedConfig::four_hour())),
        _ => value
            .strip_prefix("timed:")
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(|secs| CachePolicy::Timed(TimedConfig::with_max_age(secs)))
            .ok_or_else(|| CliError::InvalidCache(s.to_string())),
    }
}

/// Splits a `KEY=VALUE` search argument
pub fn parse_query_arg(s: &str) -> Result<(String, String), CliError> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(CliError::InvalidQuery(s.to_string())),
    }
}

impl Cli {
    /// Builds the client configuration the flags describe
    pub fn client_config(&self) -> Result<ClientConfig, CliError> {
        let oauth = match (&self.oauth_key, &self.oauth_secret) {
            (Some(key), Some(secret)) => Some(OAuthConsumer::new(key, secret)),
            (None, None) => None,
            _ => return Err(CliError::IncompleteOAuth),
        };

        let transport = match (&self.host, self.resources.is_empty()) {
            (Some(_), false) => return Err(CliError::ConflictingTransport),
            (Some(host), true) => TransportConfig::Live {
                host: host.clone(),
                oauth,
            },
            (None, false) => TransportConfig::File {
                resource_dirs: self.resources.clone(),
            },
            (None, true) => TransportConfig::default(),
        };

        let mut config = ClientConfig::new()
            .with_transport(transport)
            .with_cache(parse_cache_arg(&self.cache)?);
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir);
        }
        Ok(config)
    }

    /// Runs the selected command and returns what should be printed
    pub async fn run(&self) -> Result<String, CliError> {
        let client = self.client_config()?.client();

        match &self.command {
            Command::Spot { id } => {
                let spot = client.get_spot_by_id(id).await?;
                if self.json {
                    Ok(serde_json::to_string_pretty(&spot)?)
                } else {
                    Ok(format_spot(&spot))
                }
            }
            Command::Search { params } => {
                let query = params
                    .iter()
                    .map(|p| parse_query_arg(p))
                    .collect::<Result<Vec<_>, _>>()?;
                let pairs: Vec<(&str, &str)> =
                    query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

                let spots = client.search_spots(&pairs).await?;
                if self.json {
                    Ok(serde_json::to_string_pretty(&spots)?)
                } else {
                    Ok(spots.iter().map(format_spot_line).collect::<Vec<_>>().join("\n"))
                }
            }
        }
    }
}

/// One-line summary of a spot for search results
pub fn format_spot_line(spot: &Spot) -> String {
    format!("{}\t{}\t{}", spot.spot_id, spot.name, spot.building_name)
}

/// Multi-line description of a spot
pub fn format_spot(spot: &Spot) -> String {
    let mut lines = vec![
        format!("{} ({})", spot.name, spot.spot_id),
        format!(
            "  Building: {}, floor {}, room {}",
            spot.building_name, spot.floor, spot.room_number
        ),
    ];

    if let (Some(lat), Some(lon)) = (spot.latitude, spot.longitude) {
        lines.push(format!("  Location: {:.4}, {:.4}", lat, lon));
    }
    if let Some(capacity) = spot.capacity {
        lines.push(format!("  Capacity: {}", capacity));
    }
    if !spot.spot_types.is_empty() {
        let types: Vec<&str> = spot.spot_types.iter().map(|t| t.name.as_str()).collect();
        lines.push(format!("  Types: {}", types.join(", ")));
    }
    if !spot.spot_availability.is_empty() {
        lines.push("  Hours:".to_string());
        for hours in &spot.spot_availability {
            lines.push(format!(
                "    {:<9} {}-{}",
                hours.day,
                hours.start_time.format("%H:%M"),
                hours.end_time.format("%H:%M")
            ));
        }
    }

    lines.join("\n")
}
