//! Stored profile lookup.

use alloc::collections::BTreeMap;
use alloc::string::String;
use spin::RwLock;

use crate::profile::HackProfile;
use crate::snapshot::ScsiDeviceSnapshot;

/// Identity a stored profile is filed under
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceKey {
    /// Inquiry vendor
    pub vendor: String,
    /// Inquiry product
    pub product: String,
    /// Inquiry revision
    pub revision: String,
}

impl DeviceKey {
    /// Key for a probed device
    pub fn from_snapshot(snapshot: &ScsiDeviceSnapshot) -> Self {
        Self {
            vendor: snapshot.vendor.clone(),
            product: snapshot.product.clone(),
            revision: snapshot.revision.clone(),
        }
    }
}

/// Source of previously recorded profiles
pub trait ProfileStore {
    /// Profile recorded for this device, if any
    fn lookup(&self, key: &DeviceKey) -> Option<HackProfile>;
}

/// In-memory profile store
#[derive(Debug)]
pub struct MemoryProfileStore {
    profiles: RwLock<BTreeMap<DeviceKey, HackProfile>>,
}

impl MemoryProfileStore {
    /// Create an empty store
    pub const fn new() -> Self {
        Self {
            profiles: RwLock::new(BTreeMap::new()),
        }
    }

    /// Record a profile; stored profiles are always frozen
    pub fn insert(&self, key: DeviceKey, profile: &HackProfile) {
        let mut profile = profile.clone();
        profile.freeze();
        log::info!("Stored profile for {} {} {}", key.vendor, key.product, key.revision);
        self.profiles.write().insert(key, profile);
    }

    /// Forget a profile
    pub fn remove(&self, key: &DeviceKey) -> Option<HackProfile> {
        self.profiles.write().remove(key)
    }

    /// Number of stored profiles
    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

impl Default for MemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn lookup(&self, key: &DeviceKey) -> Option<HackProfile> {
        self.profiles.read().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::TransportClass;

    fn key() -> DeviceKey {
        DeviceKey {
            vendor: String::from("JMicron"),
            product: String::from("Tech"),
            revision: String::from("0204"),
        }
    }

    #[test]
    fn test_insert_freezes() {
        let store = MemoryProfileStore::new();
        let mut profile = HackProfile::new();
        profile.set_transport_class(TransportClass::Sat).unwrap();
        store.insert(key(), &profile);
        assert!(!profile.is_frozen());

        let stored = store.lookup(&key()).unwrap();
        assert!(stored.is_frozen());
        assert_eq!(stored.transport_class(), TransportClass::Sat);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_lookup_misses_other_revision() {
        let store = MemoryProfileStore::new();
        store.insert(key(), &HackProfile::new());
        let other = DeviceKey {
            revision: String::from("0205"),
            ..key()
        };
        assert!(store.lookup(&other).is_none());
        assert!(store.remove(&key()).is_some());
        assert!(store.is_empty());
    }
}
