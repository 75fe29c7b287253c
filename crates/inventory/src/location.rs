use serde::{Deserialize, Serialize};

use classwms_core::{text, DomainResult, LocationId};

/// A storage position in the warehouse (e.g. `A-01-01` in zone `A`).
///
/// Locations are reference data only; stock is not tracked per location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    /// Unique within a store.
    pub location_code: String,
    pub zone: Option<String>,
    pub description: Option<String>,
}

/// Input for creating a location.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewLocation {
    pub location_code: String,
    pub zone: Option<String>,
    pub description: Option<String>,
}

impl NewLocation {
    pub fn coded(location_code: impl Into<String>) -> Self {
        Self {
            location_code: location_code.into(),
            ..Self::default()
        }
    }

    pub fn in_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn validated(self) -> DomainResult<Self> {
        Ok(Self {
            location_code: text::required("location code", &self.location_code)?,
            zone: text::optional(self.zone.as_deref()),
            description: text::optional(self.description.as_deref()),
        })
    }
}
