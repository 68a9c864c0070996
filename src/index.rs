use crate::proximity::ProximityQuery;
use crate::spatial::search_windows;
use crate::types::{Address, AddressId};
use rstar::{RTree, RTreeObject, AABB};
use std::collections::BTreeSet;

/// A wrapper for addresses in the R-tree
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedAddress {
    pub id: AddressId,
    /// `[longitude, latitude]`
    pub position: [f64; 2],
}

impl IndexedAddress {
    fn of(address: &Address) -> Self {
        Self {
            id: address.id,
            position: [address.longitude, address.latitude],
        }
    }
}

impl RTreeObject for IndexedAddress {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// R-tree prefilter for proximity queries.
///
/// Addresses with finite, in-range coordinates live in the tree. Everything
/// else is kept aside and handed to every query, so the candidate set is
/// always a superset of the exact answer.
#[derive(Default)]
pub struct SpatialIndex {
    rtree: RTree<IndexedAddress>,
    unindexed: BTreeSet<AddressId>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index over `addresses` in one pass.
    pub fn from_addresses<'a, I>(addresses: I) -> Self
    where
        I: IntoIterator<Item = &'a Address>,
    {
        let mut items = Vec::new();
        let mut unindexed = BTreeSet::new();

        for address in addresses {
            if address.coordinate().is_valid() {
                items.push(IndexedAddress::of(address));
            } else {
                unindexed.insert(address.id);
            }
        }

        Self {
            rtree: RTree::bulk_load(items),
            unindexed,
        }
    }

    pub fn insert(&mut self, address: &Address) {
        if address.coordinate().is_valid() {
            self.rtree.insert(IndexedAddress::of(address));
        } else {
            self.unindexed.insert(address.id);
        }
    }

    /// Remove `address`, which must carry the coordinates it was inserted with.
    pub fn remove(&mut self, address: &Address) {
        if address.coordinate().is_valid() {
            self.rtree.remove(&IndexedAddress::of(address));
        } else {
            self.unindexed.remove(&address.id);
        }
    }

    /// Ids that may satisfy `query`, ascending. `None` means the query cannot be
    /// narrowed and every address has to be scanned.
    pub fn candidates(&self, query: &ProximityQuery) -> Option<Vec<AddressId>> {
        let windows = search_windows(query.reference, query.radius_km)?;

        let mut ids: Vec<AddressId> = self.unindexed.iter().copied().collect();
        for window in windows {
            let envelope = AABB::from_corners(
                [window.min().x, window.min().y],
                [window.max().x, window.max().y],
            );
            ids.extend(
                self.rtree
                    .locate_in_envelope(&envelope)
                    .map(|item| item.id),
            );
        }

        ids.sort_unstable();
        ids.dedup();
        Some(ids)
    }

    pub fn indexed_count(&self) -> usize {
        self.rtree.size()
    }

    pub fn unindexed_count(&self) -> usize {
        self.unindexed.len()
    }

    pub fn len(&self) -> usize {
        self.indexed_count() + self.unindexed_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
