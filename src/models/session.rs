use serde::{Deserialize, Serialize};
use crate::models::position::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Supervisor,
    Tutor,
    #[serde(alias = "guest-tutor", alias = "guestTutor")]
    GuestTutor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Center {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Center {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate { latitude: self.latitude, longitude: self.longitude }
    }

    /// Human-readable query for the fallback geocoder.
    pub fn place_query(&self) -> String {
        match (self.name.trim(), self.city.trim()) {
            ("", city) => city.to_string(),
            (name, "") => name.to_string(),
            (name, city) => format!("{}, {}", name, city),
        }
    }
}

/// Everything the check-in flow needs to know about the signed-in user.
/// Built once at connect time and handed to the flow; never re-read.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub name: String,
    pub role: Role,
    pub center: Center,
    pub token: String,
}

impl Session {
    pub fn reference_location(&self) -> Coordinate {
        self.center.coordinate()
    }
}
