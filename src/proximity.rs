//! Proximity queries
//!
//! [`ProximityEngine::find_within_radius`] keeps the candidates whose
//! great-circle distance to a reference coordinate is at most the query
//! radius. It is a plain scan: every candidate is measured, and the result
//! preserves the order in which candidates were supplied.

use crate::error::Result;
use crate::spatial::{checked_haversine_km, Coordinate};
use crate::types::{Address, CoordinatePolicy};
use tracing::{debug, warn};

/// Radius used when a query does not specify one, in kilometres.
pub const DEFAULT_RADIUS_KM: f64 = 1.0;

/// Anything with a position on the globe.
pub trait Located {
    fn coordinate(&self) -> Coordinate;
}

impl Located for Coordinate {
    fn coordinate(&self) -> Coordinate {
        *self
    }
}

impl Located for Address {
    fn coordinate(&self) -> Coordinate {
        Address::coordinate(self)
    }
}

impl<T: Located + ?Sized> Located for &T {
    fn coordinate(&self) -> Coordinate {
        (**self).coordinate()
    }
}

/// Reference point and radius of a proximity query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityQuery {
    pub reference: Coordinate,
    /// Inclusive radius in kilometres. Negative radii match nothing.
    pub radius_km: f64,
}

impl ProximityQuery {
    pub fn new(reference: Coordinate, radius_km: f64) -> Self {
        Self {
            reference,
            radius_km,
        }
    }

    /// Query around `latitude`/`longitude` with [`DEFAULT_RADIUS_KM`].
    pub fn around(latitude: f64, longitude: f64) -> Self {
        Self::new(Coordinate::new(latitude, longitude), DEFAULT_RADIUS_KM)
    }

    pub fn with_radius(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    /// Whether `candidate` lies within the radius. Unmeasurable candidates do not.
    pub fn matches(&self, candidate: Coordinate) -> bool {
        matches!(checked_haversine_km(self.reference, candidate), Ok(d) if d <= self.radius_km)
    }
}

/// Filters candidate sequences down to those inside a query radius.
///
/// # Examples
///
/// ```rust
/// use locus::{Coordinate, ProximityEngine, ProximityQuery};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = ProximityEngine::default();
/// let candidates = vec![
///     Coordinate::new(0.0, 0.0),
///     Coordinate::new(0.0, 90.0),
///     Coordinate::new(0.0, 0.005),
/// ];
///
/// let query = ProximityQuery::around(0.0, 0.0);
/// let nearby = engine.find_within_radius(&query, candidates)?;
/// assert_eq!(nearby, vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.005)]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProximityEngine {
    policy: CoordinatePolicy,
}

impl ProximityEngine {
    pub fn new(policy: CoordinatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> CoordinatePolicy {
        self.policy
    }

    /// Candidates within `query.radius_km` of `query.reference`, in input order.
    ///
    /// Under [`CoordinatePolicy::Strict`] an invalid reference fails the query
    /// with `InvalidCoordinate`, while an invalid candidate is skipped and the
    /// rest of the scan carries on. Candidates whose distance cannot be computed
    /// are skipped under either policy.
    pub fn find_within_radius<T, I>(&self, query: &ProximityQuery, candidates: I) -> Result<Vec<T>>
    where
        T: Located,
        I: IntoIterator<Item = T>,
    {
        self.policy.check(query.reference)?;
        Ok(scan(query, candidates, self.policy))
    }
}

/// [`ProximityEngine::find_within_radius`] with the lenient policy, which
/// cannot fail.
pub fn find_within_radius<T, I>(reference: Coordinate, radius_km: f64, candidates: I) -> Vec<T>
where
    T: Located,
    I: IntoIterator<Item = T>,
{
    scan(
        &ProximityQuery::new(reference, radius_km),
        candidates,
        CoordinatePolicy::Lenient,
    )
}

fn scan<T, I>(query: &ProximityQuery, candidates: I, policy: CoordinatePolicy) -> Vec<T>
where
    T: Located,
    I: IntoIterator<Item = T>,
{
    let mut matches = Vec::new();
    let mut scanned = 0usize;
    let mut skipped = 0usize;

    for candidate in candidates {
        scanned += 1;
        let position = candidate.coordinate();

        if policy == CoordinatePolicy::Strict && !position.is_valid() {
            warn!(%position, "skipping candidate with out-of-range coordinate");
            skipped += 1;
            continue;
        }

        match checked_haversine_km(query.reference, position) {
            Ok(distance) if distance <= query.radius_km => matches.push(candidate),
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "skipping unmeasurable candidate");
                skipped += 1;
            }
        }
    }

    debug!(
        reference = %query.reference,
        radius_km = query.radius_km,
        scanned,
        skipped,
        matched = matches.len(),
        "proximity scan"
    );
    matches
}
