use crate::error::{LocusError, Result};
use crate::spatial::Coordinate;
use serde::{Deserialize, Serialize};

/// Identifier assigned to an address by the store.
pub type AddressId = u64;

/// Synchronization policy for persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Never sync to disk (fastest, least safe)
    Never,
    /// Sync at most once per second on the write path
    #[default]
    EverySecond,
    /// Sync after every write (slowest, safest)
    Always,
}

/// How out-of-range latitudes and longitudes are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatePolicy {
    /// Accept any value and compute the formula on it as-is
    #[default]
    Lenient,
    /// Reject latitudes outside [-90, 90], longitudes outside [-180, 180]
    /// and non-finite values
    Strict,
}

impl CoordinatePolicy {
    /// Check a coordinate against this policy.
    pub fn check(&self, coordinate: Coordinate) -> Result<()> {
        match self {
            CoordinatePolicy::Lenient => Ok(()),
            CoordinatePolicy::Strict => coordinate.validate(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How often data is synced to disk
    pub sync_policy: SyncPolicy,

    /// Treatment of out-of-range coordinates
    pub coordinate_policy: CoordinatePolicy,

    /// Maintain an R-tree to prefilter proximity queries
    pub spatial_index: bool,

    /// Radius used when a proximity query does not name one
    pub default_radius_km: f64,

    /// Percentage of growth since the last compaction that triggers another
    pub auto_compact_percentage: u32,

    /// Minimum log size before auto-compaction kicks in
    pub auto_compact_min_size: u64,

    /// Disable automatic compaction
    pub auto_compact_disabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_policy: SyncPolicy::default(),
            coordinate_policy: CoordinatePolicy::default(),
            spatial_index: true,
            default_radius_km: 1.0,
            auto_compact_percentage: 100,
            auto_compact_min_size: 32 * 1024 * 1024, // 32MB
            auto_compact_disabled: false,
        }
    }
}

impl Config {
    pub fn with_sync_policy(mut self, sync_policy: SyncPolicy) -> Self {
        self.sync_policy = sync_policy;
        self
    }

    pub fn with_coordinate_policy(mut self, coordinate_policy: CoordinatePolicy) -> Self {
        self.coordinate_policy = coordinate_policy;
        self
    }

    pub fn with_spatial_index(mut self, enabled: bool) -> Self {
        self.spatial_index = enabled;
        self
    }

    pub fn with_default_radius_km(mut self, radius_km: f64) -> Self {
        self.default_radius_km = radius_km;
        self
    }

    pub fn with_auto_compact(mut self, min_size: u64, percentage: u32) -> Self {
        self.auto_compact_min_size = min_size;
        self.auto_compact_percentage = percentage;
        self.auto_compact_disabled = false;
        self
    }

    pub fn without_auto_compact(mut self) -> Self {
        self.auto_compact_disabled = true;
        self
    }

    /// Reject values the store cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if !self.default_radius_km.is_finite() {
            return Err(LocusError::Config(format!(
                "default_radius_km must be finite, got {}",
                self.default_radius_km
            )));
        }
        Ok(())
    }

    /// Parse a configuration from TOML. Missing keys take their defaults.
    #[cfg(feature = "toml")]
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(source).map_err(|e| LocusError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    #[cfg(feature = "toml")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

/// A stored location record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Address {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Fields of an address about to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAddress {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl NewAddress {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub(crate) fn into_address(self, id: AddressId) -> Address {
        Address {
            id,
            name: self.name,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Partial update. Fields left as `None` keep their stored values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressPatch {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl AddressPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn latitude(mut self, latitude: f64) -> Self {
        self.latitude = Some(latitude);
        self
    }

    pub fn longitude(mut self, longitude: f64) -> Self {
        self.longitude = Some(longitude);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.latitude.is_none() && self.longitude.is_none()
    }

    /// The record that results from applying this patch to `current`.
    pub fn applied_to(&self, current: &Address) -> Address {
        Address {
            id: current.id,
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            latitude: self.latitude.unwrap_or(current.latitude),
            longitude: self.longitude.unwrap_or(current.longitude),
        }
    }
}

/// Statistics about the database
#[derive(Debug, Clone, Default)]
pub struct DbStats {
    /// Number of live addresses
    pub address_count: u64,
    /// Id the next insert will receive
    pub next_id: AddressId,
    /// Addresses held in the spatial index
    pub indexed_count: u64,
    /// Addresses scanned on every query because they cannot be indexed
    pub unindexed_count: u64,
    /// Size of the AOF file in bytes
    pub aof_size: u64,
    /// Number of disk syncs performed
    pub sync_count: u64,
    /// Number of compactions performed
    pub compaction_count: u64,
    /// Number of proximity queries answered
    pub queries_served: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> Address {
        Address {
            id: 7,
            name: "Depot".to_string(),
            latitude: 10.0,
            longitude: 20.0,
        }
    }

    #[test]
    fn test_patch_changes_only_supplied_fields() {
        let patched = AddressPatch::default().latitude(11.5).applied_to(&stored());
        assert_eq!(patched.id, 7);
        assert_eq!(patched.name, "Depot");
        assert_eq!(patched.latitude, 11.5);
        assert_eq!(patched.longitude, 20.0);
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let patch = AddressPatch::default();
        assert!(patch.is_empty());
        assert_eq!(patch.applied_to(&stored()), stored());
    }

    #[test]
    fn test_patch_deserializes_missing_fields_as_none() {
        let patch: AddressPatch = serde_json::from_str(r#"{"name": "Yard"}"#).unwrap();
        assert_eq!(patch.name.as_deref(), Some("Yard"));
        assert!(patch.latitude.is_none());
        assert!(patch.longitude.is_none());
    }

    #[test]
    fn test_strict_policy_rejects_out_of_range() {
        let policy = CoordinatePolicy::Strict;
        assert!(policy.check(Coordinate::new(45.0, 90.0)).is_ok());
        assert!(policy.check(Coordinate::new(91.0, 0.0)).is_err());
        assert!(policy.check(Coordinate::new(0.0, -180.5)).is_err());
        assert!(CoordinatePolicy::Lenient.check(Coordinate::new(91.0, 0.0)).is_ok());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.default_radius_km, 1.0);
        assert_eq!(config.coordinate_policy, CoordinatePolicy::Lenient);
        assert!(config.spatial_index);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_non_finite_radius() {
        let config = Config::default().with_default_radius_km(f64::NAN);
        assert!(matches!(config.validate(), Err(LocusError::Config(_))));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_from_toml() {
        let config = Config::from_toml_str(
            r#"
            sync_policy = "always"
            coordinate_policy = "strict"
            default_radius_km = 2.5
            "#,
        )
        .unwrap();

        assert_eq!(config.sync_policy, SyncPolicy::Always);
        assert_eq!(config.coordinate_policy, CoordinatePolicy::Strict);
        assert_eq!(config.default_radius_km, 2.5);
        // Unspecified keys keep their defaults
        assert!(config.spatial_index);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_from_toml_rejects_unknown_policy() {
        assert!(Config::from_toml_str(r#"sync_policy = "sometimes""#).is_err());
    }
}
