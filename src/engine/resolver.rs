//! Target resolution
//!
//! Locates the realm-specific owner of a property by walking the
//! prototype chain, bounded by a declared depth. The walk is an explicit
//! loop with a counter: depth semantics stay auditable and stack usage
//! stays flat no matter what shape the page gave its objects.

use crate::realm::{JsObject, PropertyDescriptor};

/// A located target: the owning object and its descriptor
#[derive(Clone)]
pub struct Resolution {
    /// Object in the chain that owns the property
    pub owner: JsObject,
    /// The owner's descriptor (cloned; the live one stays in place)
    pub descriptor: PropertyDescriptor,
    /// Prototype links followed from the root (0 = root itself)
    pub distance: u32,
}

/// Find the owner of `property`, starting at `root` and following at
/// most `max_depth` prototype links.
///
/// `None` means the property was not located within the bound, either
/// because the chain ended or because the depth was exhausted. Both are
/// normal, non-error outcomes: the target is simply left uninstrumented
/// rather than weakening prototypes deeper than configured.
///
/// A resolution whose descriptor is non-configurable is still returned;
/// deciding that it cannot be replaced is the caller's concern.
pub fn resolve(root: &JsObject, property: &str, max_depth: u32) -> Option<Resolution> {
    let mut owner = root.clone();
    let mut distance = 0u32;
    loop {
        if let Some(descriptor) = owner.own_descriptor(property) {
            return Some(Resolution {
                owner,
                descriptor,
                distance,
            });
        }
        if distance >= max_depth {
            return None;
        }
        match owner.proto() {
            Some(proto) => {
                owner = proto;
                distance += 1;
            }
            None => return None,
        }
    }
}
