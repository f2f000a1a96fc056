//! Objects, property descriptors, and function slots
//!
//! `JsObject` is a cheap-clone handle with interior mutability. Own
//! properties live in an insertion-ordered table; redefining a property
//! keeps its position, so enumeration output is stable across descriptor
//! replacement. That stability is what the wrap path relies on.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::value::JsValue;
use super::Realm;

/// Result of invoking realm code: a value, or a thrown value
pub type CallResult = std::result::Result<JsValue, JsValue>;

/// Rust body of a callable object
pub type NativeFn = Rc<dyn Fn(&Realm, &JsValue, &[JsValue]) -> CallResult>;

/// How a function renders through `Function.prototype.toString`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Renders the `[native code]` form; indistinguishable from a builtin
    Native,
    /// Renders stored source text
    Scripted,
}

/// Callable slot attached to a function object
#[derive(Clone)]
pub struct FunctionSlot {
    pub name: String,
    pub length: u32,
    pub kind: FunctionKind,
    /// Source text, for `Scripted` functions
    pub source: Option<String>,
    /// Stack-frame location (`url:line:col`); `None` frames are omitted
    /// from captured stacks, like native frames in real traces
    pub location: Option<String>,
    pub body: NativeFn,
}

/// Property descriptor: flags plus a data or accessor payload
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub configurable: bool,
    pub enumerable: bool,
    pub kind: DescriptorKind,
}

#[derive(Clone)]
pub enum DescriptorKind {
    Data { value: JsValue, writable: bool },
    Accessor { get: Option<JsValue>, set: Option<JsValue> },
}

impl PropertyDescriptor {
    /// Plain-assignment shape: configurable, enumerable, writable
    pub fn data(value: JsValue) -> Self {
        Self {
            configurable: true,
            enumerable: true,
            kind: DescriptorKind::Data {
                value,
                writable: true,
            },
        }
    }

    /// Builtin-method shape: configurable, non-enumerable, writable
    pub fn method(value: JsValue) -> Self {
        Self {
            configurable: true,
            enumerable: false,
            kind: DescriptorKind::Data {
                value,
                writable: true,
            },
        }
    }

    /// Builtin-accessor shape: configurable, non-enumerable
    pub fn accessor(get: Option<JsValue>, set: Option<JsValue>) -> Self {
        Self {
            configurable: true,
            enumerable: false,
            kind: DescriptorKind::Accessor { get, set },
        }
    }

    /// Same descriptor with `enumerable` overridden
    pub fn with_enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = enumerable;
        self
    }

    /// Same descriptor with `configurable` overridden
    pub fn with_configurable(mut self, configurable: bool) -> Self {
        self.configurable = configurable;
        self
    }

    /// The data value, if this is a data descriptor
    pub fn data_value(&self) -> Option<&JsValue> {
        match &self.kind {
            DescriptorKind::Data { value, .. } => Some(value),
            DescriptorKind::Accessor { .. } => None,
        }
    }
}

/// Realm-local object identity, usable as a map key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

struct ObjectData {
    class: String,
    proto: Option<JsObject>,
    props: Vec<(String, PropertyDescriptor)>,
    function: Option<FunctionSlot>,
    /// Internal slot for Error objects: unsanitized stack text
    raw_stack: Option<String>,
}

/// Handle to a realm object
#[derive(Clone)]
pub struct JsObject(Rc<RefCell<ObjectData>>);

impl JsObject {
    /// Create a bare object. Prefer `Realm::create_object`, which links
    /// the realm's `Object.prototype`.
    pub fn plain(class: &str, proto: Option<JsObject>) -> Self {
        Self(Rc::new(RefCell::new(ObjectData {
            class: class.to_string(),
            proto,
            props: Vec::new(),
            function: None,
            raw_stack: None,
        })))
    }

    /// Identity of this object within its realm
    pub fn id(&self) -> ObjectId {
        ObjectId(Rc::as_ptr(&self.0) as usize)
    }

    /// Whether two handles reference the same object
    pub fn ptr_eq(a: &JsObject, b: &JsObject) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub fn class(&self) -> String {
        self.0.borrow().class.clone()
    }

    pub fn proto(&self) -> Option<JsObject> {
        self.0.borrow().proto.clone()
    }

    pub fn set_proto(&self, proto: Option<JsObject>) {
        self.0.borrow_mut().proto = proto;
    }

    /// Own property descriptor (cloned), like `Object.getOwnPropertyDescriptor`
    pub fn own_descriptor(&self, name: &str) -> Option<PropertyDescriptor> {
        self.0
            .borrow()
            .props
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, d)| d.clone())
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.0.borrow().props.iter().any(|(k, _)| k == name)
    }

    /// Define or redefine an own property, like `Reflect.defineProperty`.
    ///
    /// Redefinition keeps the property's table position. Returns `false`
    /// (and leaves the table untouched) when an existing descriptor is
    /// non-configurable.
    pub fn define_property(&self, name: &str, desc: PropertyDescriptor) -> bool {
        let mut data = self.0.borrow_mut();
        if let Some(entry) = data.props.iter_mut().find(|(k, _)| k == name) {
            if !entry.1.configurable {
                return false;
            }
            entry.1 = desc;
            return true;
        }
        data.props.push((name.to_string(), desc));
        true
    }

    /// Update a data property's value in place, keeping its flags.
    ///
    /// This is the `[[Set]]` path for writable data properties; unlike
    /// `define_property` it succeeds on non-configurable-but-writable
    /// descriptors. Returns `false` for missing or accessor properties.
    pub fn set_data_value(&self, name: &str, value: JsValue) -> bool {
        let mut data = self.0.borrow_mut();
        if let Some(entry) = data.props.iter_mut().find(|(k, _)| k == name) {
            if let DescriptorKind::Data {
                value: slot,
                writable: true,
            } = &mut entry.1.kind
            {
                *slot = value;
                return true;
            }
        }
        false
    }

    /// Own property names in insertion order, like `Object.getOwnPropertyNames`
    pub fn own_property_names(&self) -> Vec<String> {
        self.0
            .borrow()
            .props
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Enumerable own property names in insertion order, like `Object.keys`
    pub fn enumerable_keys(&self) -> Vec<String> {
        self.0
            .borrow()
            .props
            .iter()
            .filter(|(_, d)| d.enumerable)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn is_callable(&self) -> bool {
        self.0.borrow().function.is_some()
    }

    /// The function slot (cloned; the body is an `Rc`)
    pub fn function_slot(&self) -> Option<FunctionSlot> {
        self.0.borrow().function.clone()
    }

    pub fn set_function_slot(&self, slot: FunctionSlot) {
        self.0.borrow_mut().function = Some(slot);
    }

    pub fn function_name(&self) -> Option<String> {
        self.0.borrow().function.as_ref().map(|f| f.name.clone())
    }

    pub fn raw_stack(&self) -> Option<String> {
        self.0.borrow().raw_stack.clone()
    }

    pub fn set_raw_stack(&self, stack: String) {
        self.0.borrow_mut().raw_stack = Some(stack);
    }
}

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        match &data.function {
            Some(slot) => write!(f, "[function {}]", slot.name),
            None => write!(f, "[object {}]", data.class),
        }
    }
}
