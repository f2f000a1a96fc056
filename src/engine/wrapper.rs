//! Interception wrappers
//!
//! Builds the transparent replacement descriptor for a resolved target.
//! The replacement forwards receiver, arguments, return value and thrown
//! value to/from the original exactly; the only addition is an
//! `AccessEvent` emitted after the original returns. Event delivery is
//! fire-and-forget: a sink failure is logged and swallowed, never
//! surfaced to the page.
//!
//! One strategy per descriptor shape, selected by inspecting the
//! original: a method (data descriptor holding a function), an accessor
//! pair, or a plain data value.

use std::cell::RefCell;
use std::rc::Rc;

use crate::events::{now_ms, AccessEvent, CallStatus, EventSink, Operation};
use crate::instrument::Mode;
use crate::realm::{
    DescriptorKind, FunctionKind, FunctionSlot, JsValue, PropertyDescriptor, Realm,
};
use crate::sanitizer::StackSanitizer;

/// What legacy-mode wrappers reveal through `toString`. Stealth-mode
/// wrappers are native-kind and never render source.
const LEGACY_WRAPPER_SOURCE: &str =
    "function () {\n    logCall(arguments);\n    return original.apply(this, arguments);\n}";

/// Everything a wrapper closure needs at interception time
#[derive(Clone)]
pub struct WrapContext {
    pub realm: Realm,
    pub sink: Rc<dyn EventSink>,
    pub sanitizer: Rc<StackSanitizer>,
    pub mode: Mode,
    /// Location the wrapper's own stack frames carry (and the sanitizer
    /// scrubs)
    pub script_url: String,
    /// Cap for argument/return snapshots in event payloads
    pub snapshot_limit: usize,
}

/// Wrap strategy, chosen from the original descriptor's shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapStrategy {
    /// Data descriptor holding a callable
    Method,
    /// Getter/setter pair
    Accessor,
    /// Plain data value
    Value,
}

impl WrapStrategy {
    pub fn for_descriptor(descriptor: &PropertyDescriptor) -> Self {
        match &descriptor.kind {
            DescriptorKind::Accessor { .. } => Self::Accessor,
            DescriptorKind::Data { value, .. } if value.is_callable() => Self::Method,
            DescriptorKind::Data { .. } => Self::Value,
        }
    }
}

/// Build the wrapped descriptor for a target, or `None` when the
/// original cannot be wrapped. Flags are copied from the original so the
/// installed descriptor reports the same shape.
pub fn wrap(
    ctx: &WrapContext,
    path: &str,
    api_root: &str,
    original: &PropertyDescriptor,
) -> Option<PropertyDescriptor> {
    if !original.configurable {
        return None;
    }
    match WrapStrategy::for_descriptor(original) {
        WrapStrategy::Method => wrap_method(ctx, path, api_root, original),
        WrapStrategy::Accessor => wrap_accessor(ctx, path, api_root, original),
        WrapStrategy::Value => wrap_value(ctx, path, api_root, original),
    }
}

fn wrap_method(
    ctx: &WrapContext,
    path: &str,
    api_root: &str,
    original: &PropertyDescriptor,
) -> Option<PropertyDescriptor> {
    let (value, writable) = match &original.kind {
        DescriptorKind::Data { value, writable } => (value.clone(), *writable),
        DescriptorKind::Accessor { .. } => return None,
    };
    let slot = value.as_object()?.function_slot()?;

    let ctx_call = ctx.clone();
    let path_call = path.to_string();
    let root_call = api_root.to_string();
    let target = value.clone();
    let wrapped = make_wrapper_function(ctx, &slot.name, slot.length, move |realm, this, args| {
        let arguments: Vec<serde_json::Value> = args
            .iter()
            .map(|a| a.snapshot(ctx_call.snapshot_limit))
            .collect();
        let result = realm.call(&target, this, args);
        let (status, value_snapshot) = match &result {
            Ok(v) => (CallStatus::Ok, Some(v.snapshot(ctx_call.snapshot_limit))),
            Err(thrown) => (
                CallStatus::Threw {
                    message: realm.describe_thrown(thrown),
                },
                None,
            ),
        };
        emit(
            &ctx_call,
            &root_call,
            &path_call,
            Operation::Call,
            arguments,
            value_snapshot,
            status,
        );
        result
    });

    Some(PropertyDescriptor {
        configurable: original.configurable,
        enumerable: original.enumerable,
        kind: DescriptorKind::Data {
            value: wrapped,
            writable,
        },
    })
}

fn wrap_accessor(
    ctx: &WrapContext,
    path: &str,
    api_root: &str,
    original: &PropertyDescriptor,
) -> Option<PropertyDescriptor> {
    let (get, set) = match &original.kind {
        DescriptorKind::Accessor { get, set } => (get.clone(), set.clone()),
        DescriptorKind::Data { .. } => return None,
    };

    let wrapped_get = get.map(|getter| {
        let (name, length) = function_meta(&getter, path, "get");
        let ctx_get = ctx.clone();
        let path_get = path.to_string();
        let root_get = api_root.to_string();
        make_wrapper_function(ctx, &name, length, move |realm, this, args| {
            let result = realm.call(&getter, this, args);
            let (status, value_snapshot) = match &result {
                Ok(v) => (CallStatus::Ok, Some(v.snapshot(ctx_get.snapshot_limit))),
                Err(thrown) => (
                    CallStatus::Threw {
                        message: realm.describe_thrown(thrown),
                    },
                    None,
                ),
            };
            emit(
                &ctx_get,
                &root_get,
                &path_get,
                Operation::Get,
                Vec::new(),
                value_snapshot,
                status,
            );
            result
        })
    });

    let wrapped_set = set.map(|setter| {
        let (name, length) = function_meta(&setter, path, "set");
        let ctx_set = ctx.clone();
        let path_set = path.to_string();
        let root_set = api_root.to_string();
        make_wrapper_function(ctx, &name, length, move |realm, this, args| {
            let arguments: Vec<serde_json::Value> = args
                .iter()
                .map(|a| a.snapshot(ctx_set.snapshot_limit))
                .collect();
            let result = realm.call(&setter, this, args);
            let status = match &result {
                Ok(_) => CallStatus::Ok,
                Err(thrown) => CallStatus::Threw {
                    message: realm.describe_thrown(thrown),
                },
            };
            emit(
                &ctx_set,
                &root_set,
                &path_set,
                Operation::Set,
                arguments,
                None,
                status,
            );
            result
        })
    });

    Some(PropertyDescriptor {
        configurable: original.configurable,
        enumerable: original.enumerable,
        kind: DescriptorKind::Accessor {
            get: wrapped_get,
            set: wrapped_set,
        },
    })
}

/// Plain data values become an accessor over a hidden cell, so reads and
/// writes are observable. The own-name list and flags stay identical;
/// the kind change is the engine's documented residual observable.
fn wrap_value(
    ctx: &WrapContext,
    path: &str,
    api_root: &str,
    original: &PropertyDescriptor,
) -> Option<PropertyDescriptor> {
    let (value, writable) = match &original.kind {
        DescriptorKind::Data { value, writable } => (value.clone(), *writable),
        DescriptorKind::Accessor { .. } => return None,
    };
    let property = last_segment(path).to_string();
    let cell = Rc::new(RefCell::new(value));

    let get_cell = cell.clone();
    let ctx_get = ctx.clone();
    let path_get = path.to_string();
    let root_get = api_root.to_string();
    let getter = make_wrapper_function(
        ctx,
        &format!("get {}", property),
        0,
        move |_realm, _this, _args| {
            let current = get_cell.borrow().clone();
            emit(
                &ctx_get,
                &root_get,
                &path_get,
                Operation::Get,
                Vec::new(),
                Some(current.snapshot(ctx_get.snapshot_limit)),
                CallStatus::Ok,
            );
            Ok(current)
        },
    );

    let setter = if writable {
        let set_cell = cell.clone();
        let ctx_set = ctx.clone();
        let path_set = path.to_string();
        let root_set = api_root.to_string();
        Some(make_wrapper_function(
            ctx,
            &format!("set {}", property),
            1,
            move |_realm, _this, args| {
                let incoming = args.first().cloned().unwrap_or(JsValue::Undefined);
                *set_cell.borrow_mut() = incoming.clone();
                emit(
                    &ctx_set,
                    &root_set,
                    &path_set,
                    Operation::Set,
                    vec![incoming.snapshot(ctx_set.snapshot_limit)],
                    None,
                    CallStatus::Ok,
                );
                Ok(JsValue::Undefined)
            },
        ))
    } else {
        None
    };

    Some(PropertyDescriptor {
        configurable: original.configurable,
        enumerable: original.enumerable,
        kind: DescriptorKind::Accessor {
            get: Some(getter),
            set: setter,
        },
    })
}

/// Build the replacement function. Stealth wrappers are native-kind
/// (toString renders the `[native code]` form under the mirrored name);
/// legacy wrappers carry scripted source and are detectably non-native.
/// Both occupy a frame at the instrumentation script location, which the
/// sanitizer later scrubs.
fn make_wrapper_function(
    ctx: &WrapContext,
    name: &str,
    length: u32,
    body: impl Fn(&Realm, &JsValue, &[JsValue]) -> Result<JsValue, JsValue> + 'static,
) -> JsValue {
    let location = format!("{}:1:1", ctx.script_url);
    let slot = match ctx.mode {
        Mode::Stealth => FunctionSlot {
            name: name.to_string(),
            length,
            kind: FunctionKind::Native,
            source: None,
            location: Some(location),
            body: Rc::new(body),
        },
        Mode::Legacy => FunctionSlot {
            name: name.to_string(),
            length,
            kind: FunctionKind::Scripted,
            source: Some(LEGACY_WRAPPER_SOURCE.to_string()),
            location: Some(location),
            body: Rc::new(body),
        },
    };
    ctx.realm.function_from_slot(slot)
}

/// Name/length to mirror onto an accessor wrapper
fn function_meta(func: &JsValue, path: &str, accessor_kind: &str) -> (String, u32) {
    match func.as_object().and_then(|o| o.function_slot()) {
        Some(slot) => (slot.name, slot.length),
        None => (format!("{} {}", accessor_kind, last_segment(path)), 0),
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

fn emit(
    ctx: &WrapContext,
    api_root: &str,
    path: &str,
    operation: Operation,
    arguments: Vec<serde_json::Value>,
    value: Option<serde_json::Value>,
    status: CallStatus,
) {
    let raw_stack = ctx.realm.capture_stack();
    let script_url = ctx
        .sanitizer
        .first_page_frame(&raw_stack)
        .and_then(StackSanitizer::script_url);
    let sanitized = ctx.sanitizer.sanitize(&raw_stack);
    let stack = if sanitized.is_empty() {
        None
    } else {
        Some(sanitized.into_owned())
    };

    let event = AccessEvent {
        realm: ctx.realm.id().to_string(),
        api_root: api_root.to_string(),
        path: path.to_string(),
        operation,
        arguments,
        value,
        status,
        script_url,
        stack,
        timestamp_ms: now_ms(),
    };
    if let Err(error) = ctx.sink.deliver(event) {
        tracing::warn!(path = %path, error = %error, "access event delivery failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::events::MemorySink;

    const SCRIPT_URL: &str = "moz-extension://probe/content.js";

    fn context(realm: &Realm, sink: Rc<dyn EventSink>, mode: Mode) -> WrapContext {
        WrapContext {
            realm: realm.clone(),
            sink,
            sanitizer: Rc::new(StackSanitizer::new([SCRIPT_URL])),
            mode,
            script_url: SCRIPT_URL.to_string(),
            snapshot_limit: 256,
        }
    }

    fn install(owner: &crate::realm::JsObject, property: &str, wrapped: PropertyDescriptor) {
        assert!(owner.define_property(property, wrapped));
    }

    #[test]
    fn test_strategy_selection() {
        let realm = Realm::new("test");
        let method = PropertyDescriptor::method(
            realm.native_function("f", 0, |_realm, _this, _args| Ok(JsValue::Undefined)),
        );
        let accessor = PropertyDescriptor::accessor(None, None);
        let value = PropertyDescriptor::data(JsValue::Number(1.0));

        assert_eq!(WrapStrategy::for_descriptor(&method), WrapStrategy::Method);
        assert_eq!(
            WrapStrategy::for_descriptor(&accessor),
            WrapStrategy::Accessor
        );
        assert_eq!(WrapStrategy::for_descriptor(&value), WrapStrategy::Value);
    }

    #[test]
    fn test_method_wrapper_forwards_result_and_mirrors_identity() {
        let realm = Realm::new("test");
        let sink = Rc::new(MemorySink::new());
        let ctx = context(&realm, sink.clone(), Mode::Stealth);

        let owner = realm.create_object_with_class("CanvasRenderingContext2D");
        let original = realm.native_function("getImageData", 4, |_realm, _this, args| {
            Ok(JsValue::Number(match args.first() {
                Some(JsValue::Number(n)) => n * 2.0,
                _ => 0.0,
            }))
        });
        let original_source = realm.function_source(&original).unwrap();
        owner.define_property("getImageData", PropertyDescriptor::method(original));

        let descriptor = owner.own_descriptor("getImageData").unwrap();
        let wrapped = wrap(
            &ctx,
            "CanvasRenderingContext2D.getImageData",
            "CanvasRenderingContext2D",
            &descriptor,
        )
        .unwrap();
        install(&owner, "getImageData", wrapped);

        let func = realm.get(&owner, "getImageData").unwrap();
        let out = realm
            .call(&func, &JsValue::Object(owner.clone()), &[JsValue::Number(21.0)])
            .unwrap();
        assert_eq!(out, JsValue::Number(42.0));

        // toString, name and length are indistinguishable
        assert_eq!(realm.function_source(&func).unwrap(), original_source);
        let func_obj = func.as_object().unwrap();
        assert_eq!(
            realm.get(func_obj, "name").unwrap(),
            JsValue::string("getImageData")
        );
        assert_eq!(realm.get(func_obj, "length").unwrap(), JsValue::Number(4.0));

        let events = sink.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, Operation::Call);
        assert_eq!(events[0].status, CallStatus::Ok);
        assert_eq!(events[0].arguments, vec![serde_json::json!(21.0)]);
    }

    #[test]
    fn test_thrown_value_propagates_identically() {
        let realm = Realm::new("test");
        let sink = Rc::new(MemorySink::new());
        let ctx = context(&realm, sink.clone(), Mode::Stealth);

        let owner = realm.create_object();
        let original = realm.native_function("explode", 0, |realm, _this, _args| {
            Err(realm.new_type_error("bad args"))
        });
        owner.define_property("explode", PropertyDescriptor::method(original));

        let descriptor = owner.own_descriptor("explode").unwrap();
        let wrapped = wrap(&ctx, "Widget.explode", "Widget", &descriptor).unwrap();
        install(&owner, "explode", wrapped);

        let func = realm.get(&owner, "explode").unwrap();
        let thrown = realm
            .call(&func, &JsValue::Object(owner.clone()), &[])
            .unwrap_err();
        assert_eq!(realm.describe_thrown(&thrown), "TypeError: bad args");

        let events = sink.take();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].status,
            CallStatus::Threw {
                message: "TypeError: bad args".to_string()
            }
        );
    }

    #[test]
    fn test_legacy_wrapper_is_detectable_by_to_string() {
        let realm = Realm::new("test");
        let sink = Rc::new(MemorySink::new());
        let ctx = context(&realm, sink, Mode::Legacy);

        let owner = realm.create_object();
        let original =
            realm.native_function("probe", 0, |_realm, _this, _args| Ok(JsValue::Undefined));
        owner.define_property("probe", PropertyDescriptor::method(original));

        let descriptor = owner.own_descriptor("probe").unwrap();
        let wrapped = wrap(&ctx, "Widget.probe", "Widget", &descriptor).unwrap();
        install(&owner, "probe", wrapped);

        let func = realm.get(&owner, "probe").unwrap();
        let source = realm.function_source(&func).unwrap();
        assert!(!source.contains("[native code]"));
        assert!(source.contains("logCall"));
    }

    #[test]
    fn test_value_strategy_observes_reads_and_writes() {
        let realm = Realm::new("test");
        let sink = Rc::new(MemorySink::new());
        let ctx = context(&realm, sink.clone(), Mode::Stealth);

        let owner = realm.create_object();
        owner.define_property("flag", PropertyDescriptor::data(JsValue::Bool(false)));

        let descriptor = owner.own_descriptor("flag").unwrap();
        let wrapped = wrap(&ctx, "Widget.flag", "Widget", &descriptor).unwrap();
        install(&owner, "flag", wrapped);

        assert_eq!(realm.get(&owner, "flag").unwrap(), JsValue::Bool(false));
        realm.set(&owner, "flag", JsValue::Bool(true)).unwrap();
        assert_eq!(realm.get(&owner, "flag").unwrap(), JsValue::Bool(true));

        let ops: Vec<Operation> = sink.take().iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec![Operation::Get, Operation::Set, Operation::Get]);
    }

    #[test]
    fn test_read_only_value_gets_no_setter() {
        let realm = Realm::new("test");
        let sink = Rc::new(MemorySink::new());
        let ctx = context(&realm, sink, Mode::Stealth);

        let owner = realm.create_object();
        owner.define_property(
            "constant",
            PropertyDescriptor {
                configurable: true,
                enumerable: true,
                kind: DescriptorKind::Data {
                    value: JsValue::Number(7.0),
                    writable: false,
                },
            },
        );

        let descriptor = owner.own_descriptor("constant").unwrap();
        let wrapped = wrap(&ctx, "Widget.constant", "Widget", &descriptor).unwrap();
        match wrapped.kind {
            DescriptorKind::Accessor { ref set, .. } => assert!(set.is_none()),
            _ => panic!("value strategy must produce an accessor"),
        }
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn deliver(&self, _event: AccessEvent) -> crate::error::Result<()> {
            Err(Error::sink("sink is down"))
        }
    }

    #[test]
    fn test_sink_failure_never_reaches_the_page() {
        let realm = Realm::new("test");
        let ctx = context(&realm, Rc::new(FailingSink), Mode::Stealth);

        let owner = realm.create_object();
        let original = realm.native_function("answer", 0, |_realm, _this, _args| {
            Ok(JsValue::Number(42.0))
        });
        owner.define_property("answer", PropertyDescriptor::method(original));

        let descriptor = owner.own_descriptor("answer").unwrap();
        let wrapped = wrap(&ctx, "Widget.answer", "Widget", &descriptor).unwrap();
        install(&owner, "answer", wrapped);

        let func = realm.get(&owner, "answer").unwrap();
        let out = realm.call(&func, &JsValue::Object(owner.clone()), &[]);
        assert_eq!(out.unwrap(), JsValue::Number(42.0));
    }

    #[test]
    fn test_non_configurable_descriptor_is_declined() {
        let realm = Realm::new("test");
        let sink = Rc::new(MemorySink::new());
        let ctx = context(&realm, sink, Mode::Stealth);

        let frozen = PropertyDescriptor::data(JsValue::Null).with_configurable(false);
        assert!(wrap(&ctx, "Widget.frozen", "Widget", &frozen).is_none());
    }
}
