use crate::builder::DBBuilder;
use crate::error::{LocusError, Result};
use crate::index::SpatialIndex;
use crate::persistence::{AOFCommand, AOFFile};
use crate::proximity::{ProximityEngine, ProximityQuery};
use crate::types::{Address, AddressId, AddressPatch, Config, DbStats, NewAddress};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Main database structure
///
/// A cheap-to-clone handle; clones share the same records.
///
/// # Examples
///
/// ```rust
/// use locus::{NewAddress, ProximityQuery, DB};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let db = DB::memory()?;
/// let office = db.insert(NewAddress::new("Office", 40.7128, -74.0060))?;
/// db.insert(NewAddress::new("Warehouse", 40.7306, -73.9352))?;
///
/// let nearby = db.find_within_radius(&ProximityQuery::around(40.7130, -74.0062))?;
/// assert_eq!(nearby, vec![office]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DB {
    pub(crate) inner: Arc<RwLock<DBInner>>,
}

pub(crate) struct DBInner {
    /// Records keyed by id (B-tree for ordered access)
    pub addresses: BTreeMap<AddressId, Address>,

    /// Id handed to the next insert
    pub next_id: AddressId,

    /// R-tree prefilter, if enabled
    pub index: Option<SpatialIndex>,

    /// Append-only file for persistence
    pub aof_file: Option<AOFFile>,

    /// Database configuration
    pub config: Config,

    /// Whether the database is closed
    pub closed: bool,

    /// Number of compactions performed
    pub compaction_count: u64,

    /// Size of the AOF file right after the last compaction
    pub last_compact_size: u64,

    /// Proximity queries answered; bumped under the read lock
    pub queries_served: AtomicU64,
}

impl DB {
    /// Open a database persisted at the given path, replaying its log.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        DBBuilder::new().aof_path(path.as_ref()).build()
    }

    /// Create an in-memory database
    pub fn memory() -> Result<Self> {
        DBBuilder::new().in_memory().build()
    }

    /// Get the current configuration
    pub fn config(&self) -> Result<Config> {
        let inner = self.read()?;
        Ok(inner.config.clone())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let inner = self.read()?;
        let (indexed_count, unindexed_count) = match &inner.index {
            Some(index) => (index.indexed_count() as u64, index.unindexed_count() as u64),
            None => (0, 0),
        };
        let (aof_size, sync_count) = match &inner.aof_file {
            Some(aof_file) => (aof_file.size(), aof_file.sync_count()),
            None => (0, 0),
        };

        Ok(DbStats {
            address_count: inner.addresses.len() as u64,
            next_id: inner.next_id,
            indexed_count,
            unindexed_count,
            aof_size,
            sync_count,
            compaction_count: inner.compaction_count,
            queries_served: inner.queries_served.load(Ordering::Relaxed),
        })
    }

    /// Store a new address under a fresh id.
    pub fn insert(&self, new: NewAddress) -> Result<Address> {
        let mut inner = self.write()?;
        inner.ensure_open()?;
        inner.config.coordinate_policy.check(new.coordinate())?;

        let id = inner.next_id;
        let following = id.checked_add(1).ok_or(LocusError::IdsExhausted)?;
        let address = new.into_address(id);
        inner.log(&AOFCommand::Insert(address.clone()))?;
        inner.next_id = following;
        inner.apply_insert(address.clone());

        debug!(id = address.id, name = %address.name, "inserted address");
        inner.maybe_auto_compact();
        Ok(address)
    }

    /// All addresses in ascending id order.
    pub fn list_all(&self) -> Result<Vec<Address>> {
        let inner = self.read()?;
        inner.ensure_open()?;
        Ok(inner.addresses.values().cloned().collect())
    }

    pub fn get(&self, id: AddressId) -> Result<Address> {
        let inner = self.read()?;
        inner.ensure_open()?;
        inner
            .addresses
            .get(&id)
            .cloned()
            .ok_or(LocusError::NotFound(id))
    }

    /// Apply the supplied fields of `patch` to address `id`.
    pub fn update(&self, id: AddressId, patch: AddressPatch) -> Result<Address> {
        let mut inner = self.write()?;
        inner.ensure_open()?;

        let current = inner
            .addresses
            .get(&id)
            .ok_or(LocusError::NotFound(id))?;
        let updated = patch.applied_to(current);

        if patch.latitude.is_some() || patch.longitude.is_some() {
            inner
                .config
                .coordinate_policy
                .check(updated.coordinate())?;
        }

        inner.log(&AOFCommand::Update(updated.clone()))?;
        inner.apply_update(updated.clone());

        debug!(id, "updated address");
        inner.maybe_auto_compact();
        Ok(updated)
    }

    pub fn delete(&self, id: AddressId) -> Result<()> {
        let mut inner = self.write()?;
        inner.ensure_open()?;

        if !inner.addresses.contains_key(&id) {
            return Err(LocusError::NotFound(id));
        }

        inner.log(&AOFCommand::Delete { id })?;
        inner.apply_delete(id);

        debug!(id, "deleted address");
        inner.maybe_auto_compact();
        Ok(())
    }

    /// Addresses within `query.radius_km` of `query.reference`, in id order.
    ///
    /// With the spatial index enabled only the addresses inside the query's
    /// search windows are measured; the result is the same as a full scan.
    pub fn find_within_radius(&self, query: &ProximityQuery) -> Result<Vec<Address>> {
        let inner = self.read()?;
        inner.ensure_open()?;

        let engine = ProximityEngine::new(inner.config.coordinate_policy);
        let narrowed = inner
            .index
            .as_ref()
            .and_then(|index| index.candidates(query));

        let found = match narrowed {
            Some(ids) => engine.find_within_radius(
                query,
                ids.iter().filter_map(|id| inner.addresses.get(id)),
            )?,
            None => engine.find_within_radius(query, inner.addresses.values())?,
        };

        inner.queries_served.fetch_add(1, Ordering::Relaxed);
        Ok(found.into_iter().cloned().collect())
    }

    /// Number of stored addresses
    pub fn len(&self) -> Result<usize> {
        let inner = self.read()?;
        inner.ensure_open()?;
        Ok(inner.addresses.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Rewrite the log so it holds only the live records.
    pub fn compact(&self) -> Result<()> {
        let mut inner = self.write()?;
        inner.ensure_open()?;
        inner.compact()
    }

    /// Force a sync to disk
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.write()?;
        if let Some(ref mut aof_file) = inner.aof_file {
            aof_file.sync()?;
        }
        Ok(())
    }

    /// Flush pending writes and refuse further operations.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.write()?;
        if inner.closed {
            return Ok(());
        }

        if let Some(ref mut aof_file) = inner.aof_file {
            aof_file.sync()?;
        }

        inner.closed = true;
        info!("database closed");
        Ok(())
    }

    /// Get a read lock on the inner data
    fn read(&self) -> Result<RwLockReadGuard<'_, DBInner>> {
        self.inner
            .read()
            .map_err(|_| LocusError::Lock("Failed to acquire read lock".to_string()))
    }

    /// Get a write lock on the inner data
    fn write(&self) -> Result<RwLockWriteGuard<'_, DBInner>> {
        self.inner
            .write()
            .map_err(|_| LocusError::Lock("Failed to acquire write lock".to_string()))
    }
}

impl DBInner {
    pub(crate) fn new(config: Config) -> Self {
        let index = config.spatial_index.then(SpatialIndex::new);
        Self {
            addresses: BTreeMap::new(),
            next_id: 1,
            index,
            aof_file: None,
            config,
            closed: false,
            compaction_count: 0,
            last_compact_size: 0,
            queries_served: AtomicU64::new(0),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(LocusError::DatabaseClosed)
        } else {
            Ok(())
        }
    }

    /// Load state from the AOF file and rebuild the index.
    pub(crate) fn load_from_aof(&mut self, aof_file: &mut AOFFile) -> Result<()> {
        let commands = aof_file.replay()?;
        let replayed = commands.len();

        for command in commands {
            match command {
                AOFCommand::Insert(address) | AOFCommand::Update(address) => {
                    let following = address.id.checked_add(1).ok_or_else(|| {
                        warn!(id = address.id, "AOF record id out of range");
                        LocusError::InvalidFormat
                    })?;
                    self.next_id = self.next_id.max(following);
                    self.addresses.insert(address.id, address);
                }
                AOFCommand::Delete { id } => {
                    self.addresses.remove(&id);
                }
                AOFCommand::Sequence { next_id } => {
                    self.next_id = self.next_id.max(next_id);
                }
            }
        }

        if self.index.is_some() {
            self.index = Some(SpatialIndex::from_addresses(self.addresses.values()));
        }

        self.last_compact_size = aof_file.size();
        info!(
            path = %aof_file.path().display(),
            commands = replayed,
            addresses = self.addresses.len(),
            next_id = self.next_id,
            "restored addresses from AOF"
        );
        Ok(())
    }

    /// Write a command to the AOF if persisting
    fn log(&mut self, command: &AOFCommand) -> Result<()> {
        if let Some(ref mut aof_file) = self.aof_file {
            aof_file.append(command)?;
        }
        Ok(())
    }

    fn apply_insert(&mut self, address: Address) {
        if let Some(index) = self.index.as_mut() {
            index.insert(&address);
        }
        self.addresses.insert(address.id, address);
    }

    fn apply_update(&mut self, address: Address) {
        let previous = self.addresses.insert(address.id, address.clone());
        if let Some(index) = self.index.as_mut() {
            if let Some(previous) = previous {
                index.remove(&previous);
            }
            index.insert(&address);
        }
    }

    fn apply_delete(&mut self, id: AddressId) {
        if let Some(removed) = self.addresses.remove(&id) {
            if let Some(index) = self.index.as_mut() {
                index.remove(&removed);
            }
        }
    }

    fn compact(&mut self) -> Result<()> {
        let next_id = self.next_id;
        let commands: Vec<AOFCommand> = std::iter::once(AOFCommand::Sequence { next_id })
            .chain(self.addresses.values().cloned().map(AOFCommand::Insert))
            .collect();

        let Some(ref mut aof_file) = self.aof_file else {
            return Ok(());
        };
        aof_file.rewrite(commands)?;

        self.last_compact_size = aof_file.size();
        self.compaction_count += 1;
        Ok(())
    }

    /// Compact if the log has grown enough since the last compaction
    fn maybe_auto_compact(&mut self) {
        if self.config.auto_compact_disabled {
            return;
        }
        let Some(ref aof_file) = self.aof_file else {
            return;
        };

        let current_size = aof_file.size();
        if current_size < self.config.auto_compact_min_size {
            return;
        }

        let threshold = self.last_compact_size
            + self.last_compact_size * self.config.auto_compact_percentage as u64 / 100;
        if current_size >= threshold {
            if let Err(e) = self.compact() {
                warn!(error = %e, "automatic compaction failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CoordinatePolicy;
    use tempfile::TempDir;

    #[test]
    fn test_memory_db_creation() {
        let db = DB::memory().unwrap();
        assert!(db.is_empty().unwrap());
        assert_eq!(db.stats().unwrap().next_id, 1);
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let db = DB::memory().unwrap();
        let a = db.insert(NewAddress::new("A", 1.0, 1.0)).unwrap();
        let b = db.insert(NewAddress::new("B", 2.0, 2.0)).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let db = DB::memory().unwrap();
        let a = db.insert(NewAddress::new("A", 1.0, 1.0)).unwrap();
        db.delete(a.id).unwrap();
        let b = db.insert(NewAddress::new("B", 1.0, 1.0)).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_update_moves_address_in_index() {
        let db = DB::memory().unwrap();
        let a = db.insert(NewAddress::new("A", 0.0, 0.0)).unwrap();

        let query = ProximityQuery::around(0.0, 0.0);
        assert_eq!(db.find_within_radius(&query).unwrap().len(), 1);

        db.update(a.id, AddressPatch::default().latitude(45.0))
            .unwrap();
        assert!(db.find_within_radius(&query).unwrap().is_empty());
        assert_eq!(
            db.find_within_radius(&ProximityQuery::around(45.0, 0.0))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_strict_policy_rejects_writes() {
        let db = DBBuilder::new()
            .config(Config::default().with_coordinate_policy(CoordinatePolicy::Strict))
            .build()
            .unwrap();

        assert!(matches!(
            db.insert(NewAddress::new("bad", 91.0, 0.0)),
            Err(LocusError::InvalidCoordinate { .. })
        ));

        let a = db.insert(NewAddress::new("ok", 10.0, 10.0)).unwrap();
        assert!(matches!(
            db.update(a.id, AddressPatch::default().longitude(200.0)),
            Err(LocusError::InvalidCoordinate { .. })
        ));
        // Renaming never touches the coordinate check
        db.update(a.id, AddressPatch::default().name("renamed"))
            .unwrap();
        assert_eq!(db.get(a.id).unwrap().longitude, 10.0);
    }

    #[test]
    fn test_closed_db_rejects_operations() {
        let db = DB::memory().unwrap();
        db.close().unwrap();
        assert!(matches!(db.list_all(), Err(LocusError::DatabaseClosed)));
        assert!(matches!(
            db.insert(NewAddress::new("A", 0.0, 0.0)),
            Err(LocusError::DatabaseClosed)
        ));
        // Closing twice is fine
        db.close().unwrap();
    }

    #[test]
    fn test_queries_are_counted() {
        let db = DB::memory().unwrap();
        db.find_within_radius(&ProximityQuery::around(0.0, 0.0))
            .unwrap();
        db.find_within_radius(&ProximityQuery::around(1.0, 1.0))
            .unwrap();
        assert_eq!(db.stats().unwrap().queries_served, 2);
    }

    #[test]
    fn test_closed_db_rejects_len() {
        let db = DB::memory().unwrap();
        db.insert(NewAddress::new("A", 0.0, 0.0)).unwrap();
        db.close().unwrap();
        assert!(matches!(db.len(), Err(LocusError::DatabaseClosed)));
        assert!(matches!(db.is_empty(), Err(LocusError::DatabaseClosed)));
    }

    #[test]
    fn test_replayed_max_id_is_invalid_format() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("addresses.aof");
        {
            let mut aof = AOFFile::open(&db_path).unwrap();
            let address = NewAddress::new("edge", 0.0, 0.0).into_address(u64::MAX);
            aof.append(&AOFCommand::Insert(address)).unwrap();
        }

        assert!(matches!(DB::open(&db_path), Err(LocusError::InvalidFormat)));
    }

    #[test]
    fn test_exhausted_id_sequence_refuses_insert() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("addresses.aof");
        {
            let mut aof = AOFFile::open(&db_path).unwrap();
            let last = NewAddress::new("last", 0.0, 0.0).into_address(u64::MAX - 1);
            aof.append(&AOFCommand::Insert(last)).unwrap();
        }

        let db = DB::open(&db_path).unwrap();
        assert_eq!(db.stats().unwrap().next_id, u64::MAX);
        let size_before = db.stats().unwrap().aof_size;
        assert!(matches!(
            db.insert(NewAddress::new("overflow", 0.0, 0.0)),
            Err(LocusError::IdsExhausted)
        ));
        assert_eq!(db.len().unwrap(), 1);
        assert_eq!(db.stats().unwrap().aof_size, size_before);
    }

    #[test]
    fn test_aof_persistence_and_replay() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("addresses.aof");

        {
            let db = DB::open(&db_path).unwrap();
            db.insert(NewAddress::new("A", 10.0, 20.0)).unwrap();
            let b = db.insert(NewAddress::new("B", 11.0, 21.0)).unwrap();
            db.insert(NewAddress::new("C", 12.0, 22.0)).unwrap();
            db.update(1, AddressPatch::default().name("A2")).unwrap();
            db.delete(b.id).unwrap();
            db.sync().unwrap();
        }

        let db = DB::open(&db_path).unwrap();
        let all = db.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "A2");
        assert_eq!(all[1].name, "C");
        assert!(matches!(db.get(2), Err(LocusError::NotFound(2))));

        let stats = db.stats().unwrap();
        assert_eq!(stats.next_id, 4);
        assert_eq!(stats.indexed_count, 2);
    }

    #[test]
    fn test_compaction_preserves_id_sequence() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("addresses.aof");

        {
            let db = DB::open(&db_path).unwrap();
            for i in 0..10 {
                db.insert(NewAddress::new(format!("n{}", i), 0.0, i as f64))
                    .unwrap();
            }
            // Delete the highest ids so replaying inserts alone would reuse them
            for id in 6..=10 {
                db.delete(id).unwrap();
            }
            let before = db.stats().unwrap().aof_size;
            db.compact().unwrap();
            let stats = db.stats().unwrap();
            assert!(stats.aof_size < before);
            assert_eq!(stats.compaction_count, 1);
        }

        let db = DB::open(&db_path).unwrap();
        assert_eq!(db.len().unwrap(), 5);
        let fresh = db.insert(NewAddress::new("fresh", 0.0, 0.0)).unwrap();
        assert_eq!(fresh.id, 11);
    }

    #[test]
    fn test_auto_compaction_triggers() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("addresses.aof");

        let db = DBBuilder::new()
            .aof_path(&db_path)
            .config(Config::default().with_auto_compact(512, 100))
            .build()
            .unwrap();

        for _ in 0..100 {
            let a = db.insert(NewAddress::new("churn", 1.0, 1.0)).unwrap();
            db.delete(a.id).unwrap();
        }

        let stats = db.stats().unwrap();
        assert!(stats.compaction_count > 0);
        assert!(stats.aof_size < 4096);
        assert!(db.is_empty().unwrap());
    }
}
