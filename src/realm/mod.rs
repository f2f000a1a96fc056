//! Realm model
//!
//! An independent global execution context: global object, intrinsics,
//! and a call-frame stack. Object identities never cross realms; every
//! realm builds its own intrinsic graph.
//!
//! This is the in-process stand-in for a window/frame. The engine's
//! resolution and wrapping semantics are defined against it; binding the
//! engine to a real host environment is an embedding concern.

pub mod object;
pub mod value;

pub use object::{
    CallResult, DescriptorKind, FunctionKind, FunctionSlot, JsObject, NativeFn, ObjectId,
    PropertyDescriptor,
};
pub use value::JsValue;

use std::cell::RefCell;
use std::rc::Rc;

struct Frame {
    name: String,
    location: Option<String>,
}

struct RealmData {
    id: String,
    global: JsObject,
    object_proto: JsObject,
    function_proto: JsObject,
    error_proto: JsObject,
    frames: RefCell<Vec<Frame>>,
}

/// Handle to a realm (cheap to clone)
#[derive(Clone)]
pub struct Realm(Rc<RealmData>);

impl Realm {
    /// Create a realm with its intrinsic graph (`Object.prototype`,
    /// `Function.prototype`, `Error` machinery) and an empty global.
    pub fn new(id: impl Into<String>) -> Self {
        let object_proto = JsObject::plain("Object", None);
        let function_proto = JsObject::plain("Function", Some(object_proto.clone()));
        let error_proto = JsObject::plain("Error", Some(object_proto.clone()));
        let global = JsObject::plain("Window", Some(object_proto.clone()));

        let realm = Self(Rc::new(RealmData {
            id: id.into(),
            global,
            object_proto,
            function_proto,
            error_proto,
            frames: RefCell::new(Vec::new()),
        }));
        realm.install_intrinsics();
        realm
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn global(&self) -> JsObject {
        self.0.global.clone()
    }

    pub fn object_prototype(&self) -> JsObject {
        self.0.object_proto.clone()
    }

    pub fn function_prototype(&self) -> JsObject {
        self.0.function_proto.clone()
    }

    pub fn error_prototype(&self) -> JsObject {
        self.0.error_proto.clone()
    }

    /// Create a plain object with the realm's `Object.prototype`
    pub fn create_object(&self) -> JsObject {
        JsObject::plain("Object", Some(self.0.object_proto.clone()))
    }

    /// Create a plain object with a specific class tag
    pub fn create_object_with_class(&self, class: &str) -> JsObject {
        JsObject::plain(class, Some(self.0.object_proto.clone()))
    }

    /// Create a native (builtin-looking) function with no frame location
    pub fn native_function(
        &self,
        name: &str,
        length: u32,
        body: impl Fn(&Realm, &JsValue, &[JsValue]) -> CallResult + 'static,
    ) -> JsValue {
        self.make_function(FunctionSlot {
            name: name.to_string(),
            length,
            kind: FunctionKind::Native,
            source: None,
            location: None,
            body: Rc::new(body),
        })
    }

    /// Create a native-kind function that still occupies a stack frame at
    /// `location` when called. This is the shape of a privileged wrapper:
    /// `toString` renders `[native code]`, but captured stacks show the
    /// frame until they are sanitized.
    pub fn native_function_at(
        &self,
        name: &str,
        length: u32,
        location: impl Into<String>,
        body: impl Fn(&Realm, &JsValue, &[JsValue]) -> CallResult + 'static,
    ) -> JsValue {
        self.make_function(FunctionSlot {
            name: name.to_string(),
            length,
            kind: FunctionKind::Native,
            source: None,
            location: Some(location.into()),
            body: Rc::new(body),
        })
    }

    /// Create a page-script function: `toString` renders `source`, and
    /// calls occupy a stack frame at `location`.
    pub fn scripted_function(
        &self,
        name: &str,
        length: u32,
        source: impl Into<String>,
        location: impl Into<String>,
        body: impl Fn(&Realm, &JsValue, &[JsValue]) -> CallResult + 'static,
    ) -> JsValue {
        self.make_function(FunctionSlot {
            name: name.to_string(),
            length,
            kind: FunctionKind::Scripted,
            source: Some(source.into()),
            location: Some(location.into()),
            body: Rc::new(body),
        })
    }

    /// Create a function object from a prepared slot
    pub fn function_from_slot(&self, slot: FunctionSlot) -> JsValue {
        self.make_function(slot)
    }

    fn make_function(&self, slot: FunctionSlot) -> JsValue {
        let f = JsObject::plain("Function", Some(self.0.function_proto.clone()));
        // Own length/name, as real functions carry: non-enumerable,
        // non-writable, configurable.
        f.define_property(
            "length",
            PropertyDescriptor {
                configurable: true,
                enumerable: false,
                kind: DescriptorKind::Data {
                    value: JsValue::Number(slot.length as f64),
                    writable: false,
                },
            },
        );
        f.define_property(
            "name",
            PropertyDescriptor {
                configurable: true,
                enumerable: false,
                kind: DescriptorKind::Data {
                    value: JsValue::string(slot.name.clone()),
                    writable: false,
                },
            },
        );
        f.set_function_slot(slot);
        JsValue::Object(f)
    }

    /// Create a constructor + prototype pair and register the constructor
    /// on the global, the way host interfaces appear (`Navigator`,
    /// `HTMLCanvasElement`, ...).
    pub fn create_constructor(&self, name: &str) -> (JsValue, JsObject) {
        let proto = JsObject::plain(name, Some(self.0.object_proto.clone()));
        let ctor = self.native_function(name, 0, move |realm, _this, _args| {
            Err(realm.new_type_error("Illegal constructor"))
        });
        if let JsValue::Object(c) = &ctor {
            c.define_property(
                "prototype",
                PropertyDescriptor {
                    configurable: false,
                    enumerable: false,
                    kind: DescriptorKind::Data {
                        value: JsValue::Object(proto.clone()),
                        writable: false,
                    },
                },
            );
        }
        proto.define_property("constructor", PropertyDescriptor::method(ctor.clone()));
        self.0
            .global
            .define_property(name, PropertyDescriptor::method(ctor.clone()));
        (ctor, proto)
    }

    /// Invoke a callable value with a receiver and arguments.
    ///
    /// Thrown values propagate as `Err`. The callee's frame is pushed for
    /// the duration of the call so stack captures inside it see the full
    /// chain.
    pub fn call(&self, func: &JsValue, this: &JsValue, args: &[JsValue]) -> CallResult {
        let slot = match func {
            JsValue::Object(o) => match o.function_slot() {
                Some(slot) => slot,
                None => {
                    return Err(self.new_type_error(&format!(
                        "{} is not a function",
                        JsValue::Object(o.clone()).to_display_string()
                    )))
                }
            },
            other => {
                return Err(
                    self.new_type_error(&format!("{} is not a function", other.type_of()))
                )
            }
        };

        self.0.frames.borrow_mut().push(Frame {
            name: slot.name.clone(),
            location: slot.location.clone(),
        });
        let result = (slot.body)(self, this, args);
        self.0.frames.borrow_mut().pop();
        result
    }

    /// Property read with full accessor semantics along the prototype chain
    pub fn get(&self, obj: &JsObject, name: &str) -> CallResult {
        let mut current = Some(obj.clone());
        while let Some(o) = current {
            if let Some(desc) = o.own_descriptor(name) {
                return match desc.kind {
                    DescriptorKind::Data { value, .. } => Ok(value),
                    DescriptorKind::Accessor { get, .. } => match get {
                        Some(getter) => self.call(&getter, &JsValue::Object(obj.clone()), &[]),
                        None => Ok(JsValue::Undefined),
                    },
                };
            }
            current = o.proto();
        }
        Ok(JsValue::Undefined)
    }

    /// Property write with accessor semantics along the prototype chain
    /// (non-strict: failed writes are silent, like page code would see)
    pub fn set(&self, obj: &JsObject, name: &str, value: JsValue) -> CallResult {
        let mut current = Some(obj.clone());
        while let Some(o) = current {
            if let Some(desc) = o.own_descriptor(name) {
                match desc.kind {
                    DescriptorKind::Accessor { set, .. } => {
                        return match set {
                            Some(setter) => {
                                self.call(&setter, &JsValue::Object(obj.clone()), &[value])
                            }
                            None => Ok(JsValue::Undefined),
                        };
                    }
                    DescriptorKind::Data { writable, .. } => {
                        if !writable {
                            return Ok(JsValue::Undefined);
                        }
                        if JsObject::ptr_eq(&o, obj) {
                            o.set_data_value(name, value);
                            return Ok(JsValue::Undefined);
                        }
                        // Writable data up the chain: shadow on the receiver
                        break;
                    }
                }
            }
            current = o.proto();
        }
        obj.define_property(name, PropertyDescriptor::data(value));
        Ok(JsValue::Undefined)
    }

    /// `Function.prototype.toString` behavior for a callable value
    pub fn function_source(&self, func: &JsValue) -> Option<String> {
        let slot = func.as_object()?.function_slot()?;
        Some(match slot.kind {
            FunctionKind::Native => {
                format!("function {}() {{\n    [native code]\n}}", slot.name)
            }
            FunctionKind::Scripted => slot
                .source
                .unwrap_or_else(|| format!("function {}() {{}}", slot.name)),
        })
    }

    /// Render the current call stack, newest frame first, one
    /// `name@url:line:col` line per located frame. Frames without a
    /// location (true natives) are omitted, as in real traces.
    pub fn capture_stack(&self) -> String {
        let frames = self.0.frames.borrow();
        let mut lines = Vec::new();
        for frame in frames.iter().rev() {
            if let Some(location) = &frame.location {
                lines.push(format!("{}@{}", frame.name, location));
            }
        }
        lines.join("\n")
    }

    /// Construct an error object carrying the current stack in its
    /// internal slot. The text only becomes visible through the
    /// `Error.prototype.stack` accessor.
    pub fn new_error(&self, name: &str, message: &str) -> JsValue {
        let e = JsObject::plain("Error", Some(self.0.error_proto.clone()));
        e.define_property(
            "name",
            PropertyDescriptor::data(JsValue::string(name)).with_enumerable(false),
        );
        e.define_property(
            "message",
            PropertyDescriptor::data(JsValue::string(message)).with_enumerable(false),
        );
        e.set_raw_stack(self.capture_stack());
        JsValue::Object(e)
    }

    pub fn new_type_error(&self, message: &str) -> JsValue {
        self.new_error("TypeError", message)
    }

    /// Error name + message of a thrown value, for diagnostics and event
    /// payloads ("TypeError: bad args")
    pub fn describe_thrown(&self, thrown: &JsValue) -> String {
        match thrown.as_object() {
            Some(o) if !o.is_callable() => {
                let name = o
                    .own_descriptor("name")
                    .and_then(|d| d.data_value().cloned())
                    .map(|v| v.to_display_string())
                    .unwrap_or_else(|| "Error".to_string());
                let message = o
                    .own_descriptor("message")
                    .and_then(|d| d.data_value().cloned())
                    .map(|v| v.to_display_string())
                    .unwrap_or_default();
                if message.is_empty() {
                    name
                } else {
                    format!("{}: {}", name, message)
                }
            }
            _ => thrown.to_display_string(),
        }
    }

    fn install_intrinsics(&self) {
        // Error.prototype.stack: reads the instance's internal slot.
        // Instrumentation replaces this getter in stealth mode.
        let stack_getter = self.native_function("get stack", 0, |_realm, this, _args| {
            let raw = this
                .as_object()
                .and_then(|o| o.raw_stack())
                .unwrap_or_default();
            Ok(JsValue::string(raw))
        });
        self.0.error_proto.define_property(
            "stack",
            PropertyDescriptor::accessor(Some(stack_getter), None),
        );

        // Error / TypeError constructors on the global
        for ctor_name in ["Error", "TypeError"] {
            let name = ctor_name.to_string();
            let ctor = self.native_function(ctor_name, 1, move |realm, _this, args| {
                let message = args
                    .first()
                    .map(|v| v.to_display_string())
                    .unwrap_or_default();
                Ok(realm.new_error(&name, &message))
            });
            if let JsValue::Object(c) = &ctor {
                c.define_property(
                    "prototype",
                    PropertyDescriptor {
                        configurable: false,
                        enumerable: false,
                        kind: DescriptorKind::Data {
                            value: JsValue::Object(self.0.error_proto.clone()),
                            writable: false,
                        },
                    },
                );
            }
            self.0
                .global
                .define_property(ctor_name, PropertyDescriptor::method(ctor));
        }
        self.0.error_proto.define_property(
            "constructor",
            PropertyDescriptor::method(
                self.get(&self.0.global, "Error").unwrap_or(JsValue::Undefined),
            ),
        );
    }
}
