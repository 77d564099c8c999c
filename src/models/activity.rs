// SPDX-License-Identifier: MIT

//! Transient Strava records, decoded at the provider-client boundary.
//!
//! These flow from the Strava client through the command router to the
//! messaging adapter without ever being persisted.

use serde::Deserialize;
use std::collections::HashMap;

/// Preferred photo size forwarded to chat.
const PREFERRED_PHOTO_SIZE: u32 = 600;

/// Upper bound on forwarded photo sizes (exclusive).
const MAX_PHOTO_SIZE: u32 = 1800;

/// Summary activity from `GET /athlete/activities`.
#[derive(Debug, Clone, Deserialize)]
pub struct Activity {
    pub id: u64,
    /// Sport type, e.g. "Run", "Ride"
    #[serde(rename = "type")]
    pub activity_type: String,
    /// Local start time as reported by Strava (ISO 8601)
    pub start_date_local: String,
    pub name: String,
    /// Distance in meters
    pub distance: f64,
}

impl Activity {
    /// One-line chat summary: sport, local date, name, distance in km.
    pub fn summary(&self) -> String {
        format!(
            "{} | {}\n{} — {:.2} км",
            self.activity_type,
            self.start_date_local,
            self.name,
            self.distance / 1000.0
        )
    }
}

/// One photo attached to an activity, from `GET /activities/{id}/photos`.
///
/// Strava keys the URL map by pixel size as a string ("100", "600", ...).
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityPhoto {
    #[serde(default)]
    pub urls: HashMap<String, String>,
}

impl ActivityPhoto {
    /// Pick the URL to forward: size 600 when present, otherwise the largest
    /// available size below 1800. Returns None when no size qualifies.
    pub fn preferred_url(&self) -> Option<&str> {
        if let Some(url) = self.urls.get(&PREFERRED_PHOTO_SIZE.to_string()) {
            return Some(url.as_str());
        }

        self.urls
            .iter()
            .filter_map(|(size, url)| {
                let size: u32 = size.parse().ok()?;
                (size < MAX_PHOTO_SIZE).then_some((size, url))
            })
            .max_by_key(|(size, _)| *size)
            .map(|(_, url)| url.as_str())
    }
}

/// Athlete profile from `GET /athlete`.
#[derive(Debug, Clone, Deserialize)]
pub struct Athlete {
    pub id: u64,
    pub firstname: String,
    pub lastname: String,
}

impl Athlete {
    /// Public Strava profile URL.
    pub fn profile_url(&self) -> String {
        format!("https://www.strava.com/athletes/{}", self.id)
    }
}
