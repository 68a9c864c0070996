//! Point store abstraction
//!
//! The transport layer talks to storage only through [`PointStore`], so any
//! record store with id-keyed CRUD can sit behind the HTTP surface.

use crate::db::DB;
use crate::error::Result;
use crate::proximity::{ProximityEngine, ProximityQuery};
use crate::types::{Address, AddressId, AddressPatch, NewAddress};

/// Id-keyed store of named coordinates.
pub trait PointStore: Send + Sync {
    /// Store a new record under a fresh, never reused id
    fn insert(&self, new: NewAddress) -> Result<Address>;

    /// Every record, in the store's native order
    fn list_all(&self) -> Result<Vec<Address>>;

    /// Fails with `NotFound` for unknown ids
    fn get(&self, id: AddressId) -> Result<Address>;

    /// Change only the fields present in `patch`; `NotFound` for unknown ids
    fn update(&self, id: AddressId, patch: AddressPatch) -> Result<Address>;

    /// Fails with `NotFound` for unknown ids
    fn delete(&self, id: AddressId) -> Result<()>;

    /// Records within the query radius, in `list_all` order.
    ///
    /// Implementations may narrow the scan with an index, as long as the
    /// result equals this full scan.
    fn find_within_radius(&self, query: &ProximityQuery) -> Result<Vec<Address>> {
        ProximityEngine::default().find_within_radius(query, self.list_all()?)
    }
}

impl PointStore for DB {
    fn insert(&self, new: NewAddress) -> Result<Address> {
        DB::insert(self, new)
    }

    fn list_all(&self) -> Result<Vec<Address>> {
        DB::list_all(self)
    }

    fn get(&self, id: AddressId) -> Result<Address> {
        DB::get(self, id)
    }

    fn update(&self, id: AddressId, patch: AddressPatch) -> Result<Address> {
        DB::update(self, id, patch)
    }

    fn delete(&self, id: AddressId) -> Result<()> {
        DB::delete(self, id)
    }

    fn find_within_radius(&self, query: &ProximityQuery) -> Result<Vec<Address>> {
        DB::find_within_radius(self, query)
    }
}
