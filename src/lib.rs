//! # Locus - an embedded location registry
//!
//! Locus stores named points (latitude/longitude) and answers which of them lie
//! within a great-circle radius of a reference point.
//!
//! ## Features
//!
//! - **Haversine Proximity**: Inclusive radius filtering on a 6371 km sphere
//! - **Spatial Indexing**: Optional R-tree prefilter that never changes results
//! - **Persistent Storage**: Append-only file (AOF) format with replay and compaction
//! - **Thread-Safe**: Cloneable handle with concurrent reads
//! - **HTTP Surface**: axum router over any [`PointStore`]
//!
//! ## Quick Start
//!
//! ```rust
//! use locus::{AddressPatch, NewAddress, ProximityQuery, DB};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory database
//! let db = DB::memory()?;
//!
//! let origin = db.insert(NewAddress::new("Origin", 0.0, 0.0))?;
//! db.insert(NewAddress::new("Quarter", 0.0, 90.0))?;
//!
//! // Default radius is 1 km
//! let nearby = db.find_within_radius(&ProximityQuery::around(0.0, 0.0))?;
//! assert_eq!(nearby, vec![origin.clone()]);
//!
//! // Quarter of the equator is about 10007.5 km away
//! let wide = ProximityQuery::around(0.0, 0.0).with_radius(10_008.0);
//! assert_eq!(db.find_within_radius(&wide)?.len(), 2);
//!
//! // Partial updates leave the other fields alone
//! let renamed = db.update(origin.id, AddressPatch::default().name("Null Island"))?;
//! assert_eq!(renamed.latitude, 0.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Distances
//!
//! ```rust
//! use locus::{haversine_km, Coordinate};
//!
//! let a = Coordinate::new(0.0, 0.0);
//! let b = Coordinate::new(0.0, 90.0);
//! assert!((haversine_km(a, b) - 10_007.543).abs() < 0.01);
//! assert_eq!(haversine_km(a, b), haversine_km(b, a));
//! ```

pub mod builder;
pub mod commands;
pub mod db;
pub mod error;
pub mod index;
pub mod persistence;
pub mod proximity;
pub mod server;
pub mod spatial;
pub mod storage;

pub mod types;

// Re-export core database types
pub use builder::DBBuilder;
pub use db::DB;
pub use error::{LocusError, Result};

// Re-export spatial types and utilities
pub use spatial::{checked_haversine_km, haversine_km, Coordinate, EARTH_RADIUS_KM};

// Re-export proximity types
pub use proximity::{find_within_radius, Located, ProximityEngine, ProximityQuery, DEFAULT_RADIUS_KM};

// Re-export the store abstraction and index
pub use index::SpatialIndex;
pub use storage::PointStore;

// Re-export configuration and record types
pub use types::{
    Address, AddressId, AddressPatch, Config, CoordinatePolicy, DbStats, NewAddress, SyncPolicy,
};

// Re-export persistence types for advanced usage
pub use persistence::{AOFCommand, AOFFile};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        Address, AddressPatch, Config, Coordinate, LocusError, NewAddress, PointStore,
        ProximityQuery, Result, DB,
    };
}
