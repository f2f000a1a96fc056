//! Instrumentation settings
//!
//! The declarative settings document maps API root names to target
//! descriptors. Two shapes are accepted per root, for backward
//! compatibility: a flat list of property names (`depth` 1, observe
//! only), or a nested per-property block with a `depth` and optional
//! recursion into `propertiesToInstrument`. Sibling properties may mix
//! both shapes; each is interpreted independently.
//!
//! Declaration order is preserved, but expansion walks nesting levels
//! breadth-first: every property at one level is emitted before any
//! property a level deeper.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

use crate::error::Result;
use crate::realm::{JsObject, JsValue, Realm};

/// Map preserving JSON declaration order
#[derive(Debug, Clone)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        self.0.push((key.into(), value));
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for MapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(MapVisitor(PhantomData))
    }
}

/// Per-root target descriptor, in either accepted shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetDescriptor {
    /// Flat property-name list: depth 1, observe only
    Flat(Vec<String>),
    /// Per-property settings, possibly recursive
    Nested(OrderedMap<PropertySettings>),
}

/// Settings for a single named property
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySettings {
    /// Maximum prototype links to follow when locating the owner
    #[serde(default = "default_depth")]
    pub depth: u32,
    /// Sub-properties of this property's value to instrument in turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties_to_instrument: Option<TargetDescriptor>,
}

fn default_depth() -> u32 {
    1
}

impl PropertySettings {
    /// Observe-only settings at a given depth
    pub fn at_depth(depth: u32) -> Self {
        Self {
            depth,
            properties_to_instrument: None,
        }
    }
}

/// The full settings document: API root name -> descriptor, in
/// declaration order. Immutable after load; shared read-only across
/// realms.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentationSettings {
    pub apis: OrderedMap<TargetDescriptor>,
}

impl InstrumentationSettings {
    /// Parse a settings document from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a settings document from an already-loaded JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// One concrete resolver invocation produced by expansion
#[derive(Debug, Clone)]
pub struct InstrumentTarget {
    /// Declared API root name
    pub api_root: String,
    /// Full dotted path for event attribution
    pub path: String,
    /// Object the owner search starts from
    pub root: JsObject,
    /// Property to locate and wrap
    pub property: String,
    /// Prototype-traversal bound for this target
    pub depth: u32,
}

/// Expand a settings document against a realm into concrete targets.
///
/// Roots absent from the realm are skipped with a warning; environments
/// legitimately lack whole APIs. Traversal is breadth-first over nesting
/// levels.
pub fn expand(realm: &Realm, settings: &InstrumentationSettings) -> Vec<InstrumentTarget> {
    let mut targets = Vec::new();
    let mut queue: VecDeque<(JsObject, String, String, TargetDescriptor)> = VecDeque::new();

    for (name, descriptor) in settings.apis.iter() {
        match resolve_api_root(realm, name) {
            Some(root) => queue.push_back((root, name.clone(), name.clone(), descriptor.clone())),
            None => {
                tracing::warn!(realm = %realm.id(), root = %name, "API root not present, skipping");
            }
        }
    }

    while let Some((object, prefix, api_root, descriptor)) = queue.pop_front() {
        match descriptor {
            TargetDescriptor::Flat(names) => {
                for property in names {
                    targets.push(InstrumentTarget {
                        api_root: api_root.clone(),
                        path: format!("{}.{}", prefix, property),
                        root: object.clone(),
                        property,
                        depth: 1,
                    });
                }
            }
            TargetDescriptor::Nested(map) => {
                for (property, prop_settings) in map.iter() {
                    let path = format!("{}.{}", prefix, property);
                    targets.push(InstrumentTarget {
                        api_root: api_root.clone(),
                        path: path.clone(),
                        root: object.clone(),
                        property: property.clone(),
                        depth: prop_settings.depth,
                    });
                    if let Some(sub) = &prop_settings.properties_to_instrument {
                        match realm.get(&object, property) {
                            Ok(JsValue::Object(child)) => {
                                queue.push_back((child, path, api_root.clone(), sub.clone()));
                            }
                            Ok(_) => {
                                tracing::debug!(
                                    path = %path,
                                    "nested target value is not an object, cannot recurse"
                                );
                            }
                            Err(thrown) => {
                                tracing::warn!(
                                    path = %path,
                                    error = %realm.describe_thrown(&thrown),
                                    "reading nested target threw, skipping recursion"
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    targets
}

/// Locate the object an API root name denotes.
///
/// Dotted paths are walked from the global (a leading `window.` is
/// accepted and ignored). A callable result with a `prototype` object
/// resolves to that prototype (the interface convention: `Navigator` ->
/// `Navigator.prototype`); anything else resolves to the object itself.
fn resolve_api_root(realm: &Realm, name: &str) -> Option<JsObject> {
    let segments: SmallVec<[&str; 4]> = name.split('.').filter(|s| !s.is_empty()).collect();
    let segments = if segments.first() == Some(&"window") {
        &segments[1..]
    } else {
        &segments[..]
    };
    if segments.is_empty() {
        return None;
    }

    let mut current = JsValue::Object(realm.global());
    for segment in segments {
        let object = current.as_object()?;
        current = realm.get(object, segment).ok()?;
    }

    match current {
        JsValue::Object(o) if o.is_callable() => match realm.get(&o, "prototype") {
            Ok(JsValue::Object(proto)) => Some(proto),
            _ => Some(o),
        },
        JsValue::Object(o) => Some(o),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::PropertyDescriptor;

    fn paths(targets: &[InstrumentTarget]) -> Vec<&str> {
        targets.iter().map(|t| t.path.as_str()).collect()
    }

    #[test]
    fn test_flat_form_implies_depth_one() {
        let realm = Realm::new("test");
        let (_, proto) = realm.create_constructor("Navigator");
        proto.define_property("userAgent", PropertyDescriptor::data(JsValue::string("UA")));

        let settings =
            InstrumentationSettings::from_json(r#"{ "Navigator": ["userAgent", "platform"] }"#)
                .unwrap();
        let targets = expand(&realm, &settings);

        assert_eq!(
            paths(&targets),
            vec!["Navigator.userAgent", "Navigator.platform"]
        );
        assert!(targets.iter().all(|t| t.depth == 1));
        assert!(JsObject::ptr_eq(&targets[0].root, &proto));
    }

    #[test]
    fn test_nested_form_carries_depth() {
        let realm = Realm::new("test");
        realm.create_constructor("CanvasRenderingContext2D");

        let settings = InstrumentationSettings::from_json(
            r#"{ "CanvasRenderingContext2D": { "getImageData": { "depth": 2 } } }"#,
        )
        .unwrap();
        let targets = expand(&realm, &settings);

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].path, "CanvasRenderingContext2D.getImageData");
        assert_eq!(targets[0].depth, 2);
    }

    #[test]
    fn test_unknown_root_is_skipped_not_fatal() {
        let realm = Realm::new("test");
        let (_, proto) = realm.create_constructor("Navigator");
        proto.define_property("userAgent", PropertyDescriptor::data(JsValue::string("UA")));

        let settings = InstrumentationSettings::from_json(
            r#"{ "WebGLRenderingContext": ["getParameter"], "Navigator": ["userAgent"] }"#,
        )
        .unwrap();
        let targets = expand(&realm, &settings);

        assert_eq!(paths(&targets), vec!["Navigator.userAgent"]);
    }

    #[test]
    fn test_dotted_root_with_window_prefix() {
        let realm = Realm::new("test");
        let navigator = realm.create_object_with_class("Navigator");
        realm
            .global()
            .define_property("navigator", PropertyDescriptor::data(JsValue::Object(navigator.clone())));

        let settings =
            InstrumentationSettings::from_json(r#"{ "window.navigator": ["userAgent"] }"#).unwrap();
        let targets = expand(&realm, &settings);

        assert_eq!(paths(&targets), vec!["window.navigator.userAgent"]);
        assert!(JsObject::ptr_eq(&targets[0].root, &navigator));
    }

    #[test]
    fn test_bfs_order_across_nesting_levels() {
        let realm = Realm::new("test");
        let storage = realm.create_object_with_class("Storage");
        let inner = realm.create_object_with_class("Object");
        storage.define_property("cache", PropertyDescriptor::data(JsValue::Object(inner)));
        realm
            .global()
            .define_property("storage", PropertyDescriptor::data(JsValue::Object(storage)));
        let (_, nav_proto) = realm.create_constructor("Navigator");
        nav_proto.define_property("userAgent", PropertyDescriptor::data(JsValue::string("UA")));

        let settings = InstrumentationSettings::from_json(
            r#"{
                "storage": {
                    "cache": {
                        "depth": 1,
                        "propertiesToInstrument": ["read", "write"]
                    }
                },
                "Navigator": ["userAgent"]
            }"#,
        )
        .unwrap();
        let targets = expand(&realm, &settings);

        // Both level-0 targets come before the level-1 nested ones
        assert_eq!(
            paths(&targets),
            vec![
                "storage.cache",
                "Navigator.userAgent",
                "storage.cache.read",
                "storage.cache.write",
            ]
        );
    }

    #[test]
    fn test_mixed_sibling_forms_parse_independently() {
        let settings = InstrumentationSettings::from_json(
            r#"{
                "Navigator": ["userAgent"],
                "CanvasRenderingContext2D": { "getImageData": { "depth": 2 } }
            }"#,
        )
        .unwrap();

        assert!(matches!(
            settings.apis.get("Navigator"),
            Some(TargetDescriptor::Flat(_))
        ));
        assert!(matches!(
            settings.apis.get("CanvasRenderingContext2D"),
            Some(TargetDescriptor::Nested(_))
        ));
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let settings = InstrumentationSettings::from_json(
            r#"{ "Zeta": ["z"], "Alpha": ["a"], "Mid": ["m"] }"#,
        )
        .unwrap();
        let roots: Vec<&String> = settings.apis.iter().map(|(k, _)| k).collect();
        assert_eq!(roots, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        assert!(InstrumentationSettings::from_json(r#"{ "Navigator": 42 }"#).is_err());
        assert!(InstrumentationSettings::from_json("not json").is_err());
    }
}
