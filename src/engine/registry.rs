//! Wrap registry
//!
//! Per-realm table of active wraps, keyed by owner identity plus
//! property name. Owner identity is the object pointer, so keys cannot
//! collide across realms. The registry is the only writer of wrapped
//! descriptors: it guarantees at most one active wrap per target and
//! keeps the original descriptor recoverable for as long as the wrap is
//! held.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::realm::{JsObject, ObjectId, PropertyDescriptor};

#[derive(Clone, PartialEq, Eq, Hash)]
struct RecordKey {
    owner: ObjectId,
    property: String,
}

impl RecordKey {
    fn of(owner: &JsObject, property: &str) -> Self {
        Self {
            owner: owner.id(),
            property: property.to_string(),
        }
    }
}

struct WrapRecord {
    /// Keeps the owner alive while the wrap is held
    owner: JsObject,
    property: String,
    original: PropertyDescriptor,
    ref_count: u32,
}

/// Result of an acquire attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// First acquisition: the wrapped descriptor was installed
    Installed,
    /// The target was already wrapped; only the refcount moved
    AlreadyWrapped,
    /// The target cannot be wrapped (missing, non-configurable, or the
    /// wrap factory declined); nothing was changed
    Declined,
}

/// Realm-scoped wrap table with refcounting
#[derive(Default)]
pub struct WrapRegistry {
    records: RefCell<HashMap<RecordKey, WrapRecord>>,
}

impl WrapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a wrap on `(owner, property)`.
    ///
    /// On first acquisition the factory is given the original descriptor
    /// and returns the wrapped one to install (or `None` to decline).
    /// Subsequent acquisitions only increment the refcount; the page
    /// sees exactly one wrapper no matter how many subsystems asked.
    pub fn acquire(
        &self,
        owner: &JsObject,
        property: &str,
        factory: impl FnOnce(&PropertyDescriptor) -> Option<PropertyDescriptor>,
    ) -> AcquireOutcome {
        let key = RecordKey::of(owner, property);
        if let Some(record) = self.records.borrow_mut().get_mut(&key) {
            record.ref_count += 1;
            return AcquireOutcome::AlreadyWrapped;
        }

        let original = match owner.own_descriptor(property) {
            Some(descriptor) => descriptor,
            None => return AcquireOutcome::Declined,
        };
        if !original.configurable {
            return AcquireOutcome::Declined;
        }
        let wrapped = match factory(&original) {
            Some(descriptor) => descriptor,
            None => return AcquireOutcome::Declined,
        };
        if !owner.define_property(property, wrapped) {
            return AcquireOutcome::Declined;
        }

        self.records.borrow_mut().insert(
            key,
            WrapRecord {
                owner: owner.clone(),
                property: property.to_string(),
                original,
                ref_count: 1,
            },
        );
        AcquireOutcome::Installed
    }

    /// Release one hold on `(owner, property)`. When the refcount reaches
    /// zero the original descriptor is restored. Releasing an unwrapped
    /// target is a no-op, returning `false`.
    pub fn release(&self, owner: &JsObject, property: &str) -> bool {
        let key = RecordKey::of(owner, property);
        let mut records = self.records.borrow_mut();
        let remaining = match records.get_mut(&key) {
            Some(record) => {
                record.ref_count -= 1;
                record.ref_count
            }
            None => return false,
        };
        if remaining == 0 {
            if let Some(record) = records.remove(&key) {
                record.owner.define_property(&record.property, record.original);
            }
        }
        true
    }

    /// Whether `(owner, property)` currently holds a wrap
    pub fn is_wrapped(&self, owner: &JsObject, property: &str) -> bool {
        self.records
            .borrow()
            .contains_key(&RecordKey::of(owner, property))
    }

    /// Current refcount for `(owner, property)`; 0 when unwrapped
    pub fn ref_count(&self, owner: &JsObject, property: &str) -> u32 {
        self.records
            .borrow()
            .get(&RecordKey::of(owner, property))
            .map(|r| r.ref_count)
            .unwrap_or(0)
    }

    /// The original descriptor, recoverable while the wrap is held
    pub fn original_descriptor(
        &self,
        owner: &JsObject,
        property: &str,
    ) -> Option<PropertyDescriptor> {
        self.records
            .borrow()
            .get(&RecordKey::of(owner, property))
            .map(|r| r.original.clone())
    }

    /// Number of active wraps
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Restore every original descriptor and clear the table. Realm
    /// teardown normally just discards the registry instead; this is the
    /// explicit-unwrap path.
    pub fn restore_all(&self) {
        let records: Vec<WrapRecord> = {
            let mut map = self.records.borrow_mut();
            map.drain().map(|(_, record)| record).collect()
        };
        for record in records {
            record.owner.define_property(&record.property, record.original);
        }
    }
}
