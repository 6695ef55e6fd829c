//! Core data models for Spotseeker resources
//!
//! This module contains the typed records a Spot response is mapped into,
//! and the client that fetches and maps them.

pub mod spot;

pub use spot::{parse_spot, parse_spots, MapError, SpotseekerClient};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A physical place to study or meet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spot {
    /// Server-assigned identifier
    pub spot_id: String,
    /// Human-readable name of the spot
    pub name: String,
    /// API path of this spot
    pub uri: String,
    /// Latitude coordinate
    pub latitude: Option<f64>,
    /// Longitude coordinate
    pub longitude: Option<f64>,
    /// Height above sea level in meters
    pub height_from_sea_level: Option<f64>,
    pub building_name: String,
    pub building_description: Option<String>,
    pub floor: String,
    pub room_number: String,
    /// Number of people the spot holds
    pub capacity: Option<i64>,
    pub display_access_restrictions: String,
    pub organization: String,
    pub manager: String,
    /// Version tag of the spot resource
    pub etag: String,
    /// Institution-side identifier, unique when present
    pub external_id: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub spot_types: Vec<SpotType>,
    /// Open hours, one record per interval
    pub spot_availability: Vec<SpotAvailableHours>,
    pub images: Vec<SpotImage>,
    pub extended_info: Vec<SpotExtendedInfo>,
    /// Equipment or resources available at the spot
    pub items: Vec<SpotItem>,
}

/// The kind of a spot (e.g. `study_room`, `cafe`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotType {
    pub name: String,
}

/// One interval during which the spot's building is open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotAvailableHours {
    /// Lowercase day name, e.g. `monday`
    pub day: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Institution-provided key/value metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotExtendedInfo {
    pub key: String,
    pub value: String,
}

/// An image of a spot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotImage {
    pub image_id: String,
    pub url: String,
    pub description: String,
    pub display_index: Option<u32>,
    pub content_type: String,
    pub width: i64,
    pub height: i64,
    pub creation_date: DateTime<Utc>,
    pub modification_date: DateTime<Utc>,
    pub upload_user: String,
    pub upload_application: String,
    pub thumbnail_root: String,
}

/// A bookable or borrowable item at a spot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotItem {
    pub item_id: String,
    pub name: String,
    pub category: String,
    pub subcategory: String,
    pub extended_info: Vec<SpotExtendedInfo>,
    pub images: Vec<ItemImage>,
}

/// An image of a spot item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemImage {
    pub image_id: String,
    pub description: String,
    pub display_index: Option<u32>,
    pub width: i64,
    pub height: i64,
    pub content_type: String,
    pub creation_date: DateTime<Utc>,
    pub upload_user: String,
    pub upload_application: String,
}

impl Spot {
    /// Looks up an extended info value by key
    pub fn extended_info_value(&self, key: &str) -> Option<&str> {
        self.extended_info
            .iter()
            .find(|info| info.key == key)
            .map(|info| info.value.as_str())
    }

    /// Open intervals for a given day name (case-insensitive)
    pub fn hours_on(&self, day: &str) -> Vec<&SpotAvailableHours> {
        self.spot_availability
            .iter()
            .filter(|hours| hours.day.eq_ignore_ascii_case(day))
            .collect()
    }
}
