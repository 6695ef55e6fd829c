//! Spotseeker API client and Spot mapping
//!
//! Fetches spot resources through a [`Dao`] and maps the JSON bodies into
//! [`Spot`] records.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{ItemImage, Spot, SpotAvailableHours, SpotExtendedInfo, SpotImage, SpotItem, SpotType};
use crate::dao::Dao;
use crate::error::DataFailureError;
use crate::http::{Headers, Response, STATUS_OK};

/// Base path of the spot resource
const SPOT_PATH: &str = "/api/v1/spot";

/// Day order used for availability; unknown day names sort after these
const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Errors that can occur when mapping a response body
#[derive(Debug, Error)]
pub enum MapError {
    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Invalid date format in response
    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    /// Invalid time format in response
    #[error("Invalid time format: {0}")]
    InvalidTime(String),
}

/// Accepts either a JSON string or number and yields its text
fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Accepts a JSON number or a numeric string
fn optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!("expected a number, got {}", other))),
    }
}

/// Location block of a spot in the API response
#[derive(Debug, Deserialize)]
struct LocationRecord {
    #[serde(default, deserialize_with = "optional_number")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "optional_number")]
    longitude: Option<f64>,
    #[serde(default, deserialize_with = "optional_number")]
    height_from_sea_level: Option<f64>,
    #[serde(default, deserialize_with = "text")]
    building_name: String,
    #[serde(default, deserialize_with = "optional_text")]
    description: Option<String>,
    #[serde(default, deserialize_with = "text")]
    floor: String,
    #[serde(default, deserialize_with = "text")]
    room_number: String,
}

/// A single spot in the API response
#[derive(Debug, Deserialize)]
struct SpotRecord {
    #[serde(deserialize_with = "text")]
    id: String,
    #[serde(default, deserialize_with = "text")]
    name: String,
    #[serde(default)]
    uri: String,
    location: LocationRecord,
    #[serde(default)]
    capacity: Option<i64>,
    #[serde(default, deserialize_with = "text")]
    display_access_restrictions: String,
    #[serde(default, deserialize_with = "text")]
    organization: String,
    #[serde(default, deserialize_with = "text")]
    manager: String,
    #[serde(default, deserialize_with = "text")]
    etag: String,
    #[serde(default, deserialize_with = "optional_text")]
    external_id: Option<String>,
    last_modified: String,
    #[serde(rename = "type", default)]
    spot_types: Vec<String>,
    #[serde(default)]
    available_hours: HashMap<String, Vec<(String, String)>>,
    #[serde(default)]
    images: Vec<ImageRecord>,
    #[serde(default)]
    extended_info: HashMap<String, Value>,
    #[serde(default)]
    items: Vec<ItemRecord>,
}

#[derive(Debug, Deserialize)]
struct ImageRecord {
    #[serde(deserialize_with = "text")]
    id: String,
    #[serde(default)]
    url: String,
    #[serde(default, deserialize_with = "text")]
    description: String,
    #[serde(default)]
    display_index: Option<u32>,
    #[serde(rename = "content-type", default)]
    content_type: String,
    #[serde(default)]
    width: i64,
    #[serde(default)]
    height: i64,
    creation_date: String,
    modification_date: String,
    #[serde(default, deserialize_with = "text")]
    upload_user: String,
    #[serde(default, deserialize_with = "text")]
    upload_application: String,
    #[serde(default)]
    thumbnail_root: String,
}

#[derive(Debug, Deserialize)]
struct ItemRecord {
    #[serde(deserialize_with = "text")]
    id: String,
    #[serde(default, deserialize_with = "text")]
    name: String,
    #[serde(default, deserialize_with = "text")]
    category: String,
    #[serde(default, deserialize_with = "text")]
    subcategory: String,
    #[serde(default)]
    extended_info: HashMap<String, Value>,
    #[serde(default)]
    images: Vec<ItemImageRecord>,
}

#[derive(Debug, Deserialize)]
struct ItemImageRecord {
    #[serde(deserialize_with = "text")]
    id: String,
    #[serde(default, deserialize_with = "text")]
    description: String,
    #[serde(default)]
    display_index: Option<u32>,
    #[serde(default)]
    width: i64,
    #[serde(default)]
    height: i64,
    #[serde(rename = "content-type", default)]
    content_type: String,
    creation_date: String,
    #[serde(default, deserialize_with = "text")]
    upload_user: String,
    #[serde(default, deserialize_with = "text")]
    upload_application: String,
}

/// Parses an RFC 3339 or RFC 2822 timestamp
///
/// ISO 8601 timestamps without an offset are taken to be UTC.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, MapError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s).or_else(|_| DateTime::parse_from_rfc2822(s)) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| MapError::InvalidDate(s.to_string()))
}

/// Parses an `HH:MM` or `HH:MM:SS` time
fn parse_time(s: &str) -> Result<NaiveTime, MapError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| MapError::InvalidTime(s.to_string()))
}

fn extended_info_from(info: HashMap<String, Value>) -> Vec<SpotExtendedInfo> {
    let mut extended: Vec<SpotExtendedInfo> = info
        .into_iter()
        .map(|(key, value)| SpotExtendedInfo {
            key,
            value: match value {
                Value::String(s) => s,
                other => other.to_string(),
            },
        })
        .collect();
    extended.sort_by(|a, b| a.key.cmp(&b.key));
    extended
}

fn day_rank(day: &str) -> usize {
    WEEKDAYS
        .iter()
        .position(|d| d.eq_ignore_ascii_case(day))
        .unwrap_or(WEEKDAYS.len())
}

fn availability_from(hours: HashMap<String, Vec<(String, String)>>) -> Result<Vec<SpotAvailableHours>, MapError> {
    let mut days: Vec<_> = hours.into_iter().collect();
    days.sort_by(|(a, _), (b, _)| day_rank(a).cmp(&day_rank(b)).then_with(|| a.cmp(b)));

    let mut availability = Vec::new();
    for (day, intervals) in days {
        for (start, end) in intervals {
            availability.push(SpotAvailableHours {
                day: day.clone(),
                start_time: parse_time(&start)?,
                end_time: parse_time(&end)?,
            });
        }
    }
    Ok(availability)
}

fn image_from(image: ImageRecord) -> Result<SpotImage, MapError> {
    Ok(SpotImage {
        image_id: image.id,
        url: image.url,
        description: image.description,
        display_index: image.display_index,
        content_type: image.content_type,
        width: image.width,
        height: image.height,
        creation_date: parse_datetime(&image.creation_date)?,
        modification_date: parse_datetime(&image.modification_date)?,
        upload_user: image.upload_user,
        upload_application: image.upload_application,
        thumbnail_root: image.thumbnail_root,
    })
}

fn item_from(item: ItemRecord) -> Result<SpotItem, MapError> {
    let images = item
        .images
        .into_iter()
        .map(|image| {
            Ok(ItemImage {
                image_id: image.id,
                description: image.description,
                display_index: image.display_index,
                width: image.width,
                height: image.height,
                content_type: image.content_type,
                creation_date: parse_datetime(&image.creation_date)?,
                upload_user: image.upload_user,
                upload_application: image.upload_application,
            })
        })
        .collect::<Result<Vec<_>, MapError>>()?;

    Ok(SpotItem {
        item_id: item.id,
        name: item.name,
        category: item.category,
        subcategory: item.subcategory,
        extended_info: extended_info_from(item.extended_info),
        images,
    })
}

fn spot_from(record: SpotRecord) -> Result<Spot, MapError> {
    let location = record.location;
    Ok(Spot {
        spot_id: record.id,
        name: record.name,
        uri: record.uri,
        latitude: location.latitude,
        longitude: location.longitude,
        height_from_sea_level: location.height_from_sea_level,
        building_name: location.building_name,
        building_description: location.description,
        floor: location.floor,
        room_number: location.room_number,
        capacity: record.capacity,
        display_access_restrictions: record.display_access_restrictions,
        organization: record.organization,
        manager: record.manager,
        etag: record.etag,
        external_id: record.external_id,
        last_modified: parse_datetime(&record.last_modified)?,
        spot_types: record
            .spot_types
            .into_iter()
            .map(|name| SpotType { name })
            .collect(),
        spot_availability: availability_from(record.available_hours)?,
        images: record
            .images
            .into_iter()
            .map(image_from)
            .collect::<Result<_, _>>()?,
        extended_info: extended_info_from(record.extended_info),
        items: record
            .items
            .into_iter()
            .map(item_from)
            .collect::<Result<_, _>>()?,
    })
}

/// Maps a single spot JSON document
pub fn parse_spot(body: impl AsRef<[u8]>) -> Result<Spot, MapError> {
    spot_from(serde_json::from_slice(body.as_ref())?)
}

/// Maps a JSON array of spots
pub fn parse_spots(body: impl AsRef<[u8]>) -> Result<Vec<Spot>, MapError> {
    let records: Vec<SpotRecord> = serde_json::from_slice(body.as_ref())?;
    records.into_iter().map(spot_from).collect()
}

/// Client for the Spotseeker spot resource
#[derive(Clone)]
pub struct SpotseekerClient {
    dao: Arc<Dao>,
}

impl SpotseekerClient {
    pub fn new(dao: Arc<Dao>) -> Self {
        Self { dao }
    }

    pub fn dao(&self) -> &Dao {
        &self.dao
    }

    /// Fetches a URL and fails with the body as message on anything but 200
    async fn get_ok(&self, url: &str) -> Result<Response, DataFailureError> {
        let response = self.dao.get_url(url, Headers::new()).await?;
        if response.status != STATUS_OK {
            return Err(DataFailureError::new(url, Some(response.status), response.text().into_owned()));
        }
        Ok(response)
    }

    /// Fetches one spot by id
    ///
    /// # Returns
    /// * `Ok(Spot)` - The mapped spot
    /// * `Err(DataFailureError)` - On a non-200 response, a transport or cache
    ///   failure, or a body that can't be mapped
    pub async fn get_spot_by_id(&self, spot_id: impl Display) -> Result<Spot, DataFailureError> {
        let url = format!("{}/{}", SPOT_PATH, spot_id);
        let response = self.get_ok(&url).await?;
        parse_spot(&response.body)
            .map_err(|e| DataFailureError::new(&url, Some(response.status), e.to_string()))
    }

    /// Searches spots with the given query parameters
    pub async fn search_spots(&self, query: &[(&str, &str)]) -> Result<Vec<Spot>, DataFailureError> {
        let query_string = serde_urlencoded::to_string(query)
            .map_err(|e| DataFailureError::new(SPOT_PATH, None, e.to_string()))?;
        let url = format!("{}?{}", SPOT_PATH, query_string);

        let response = self.get_ok(&url).await?;
        let spots = parse_spots(&response.body)
            .map_err(|e| DataFailureError::new(&url, Some(response.status), e.to_string()))?;
        debug!(url = %url, count = spots.len(), "Search returned spots");
        Ok(spots)
    }

    /// Fetches several spots concurrently
    ///
    /// Cache writes made during the fan-out are queued and flushed once all
    /// lookups finish. Results are returned in the order of `spot_ids`.
    pub async fn get_spots_by_ids<I: Display>(&self, spot_ids: &[I]) -> Vec<Result<Spot, DataFailureError>> {
        let batch = self.dao.coordinator().batch();
        let results = join_all(spot_ids.iter().map(|id| self.get_spot_by_id(id))).await;
        let report = batch.finish();
        debug!(
            requested = spot_ids.len(),
            written = report.written,
            dropped = report.dropped,
            failed = report.failed,
            "Fetched spots in batch"
        );
        results
    }
}
