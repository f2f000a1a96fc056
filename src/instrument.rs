//! Instrumentation entry point
//!
//! Drives settings expansion, resolution and wrapping for a realm, at
//! what the embedder guarantees is the earliest safe injection point
//! (before page scripts run). Per-realm wrap state lives in a side table
//! keyed by realm id, never on page-visible objects, so the
//! non-pollution invariant is enforced mechanically.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::engine::registry::{AcquireOutcome, WrapRegistry};
use crate::engine::resolver;
use crate::engine::wrapper::{self, WrapContext};
use crate::events::EventSink;
use crate::realm::{DescriptorKind, JsValue, PropertyDescriptor, Realm};
use crate::sanitizer::StackSanitizer;
use crate::settings::{expand, InstrumentationSettings};
use crate::InstrumentConfig;

/// Operating mode, selected by the enclosing driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Non-polluting interception: native-looking wrappers plus the
    /// lazy error-stack scrubbing hook
    Stealth,
    /// Direct injection, detectable by introspection; used when stealth
    /// is unnecessary
    Legacy,
}

impl Mode {
    /// The driver's single boolean flag
    pub fn from_stealth_flag(stealth: bool) -> Self {
        if stealth {
            Self::Stealth
        } else {
            Self::Legacy
        }
    }
}

/// Per-realm outcome counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstrumentReport {
    /// Targets newly wrapped
    pub wrapped: usize,
    /// Targets that were already wrapped (refcount bumped)
    pub already_wrapped: usize,
    /// Targets not found within their depth bound
    pub skipped_missing: usize,
    /// Targets found but not replaceable
    pub skipped_unwrappable: usize,
}

/// Top-level driver: one instance serves any number of realms
pub struct Instrumentor {
    settings: Rc<InstrumentationSettings>,
    sink: Rc<dyn EventSink>,
    config: InstrumentConfig,
    sanitizer: Rc<StackSanitizer>,
    realms: RefCell<HashMap<String, WrapRegistry>>,
}

impl Instrumentor {
    pub fn new(
        settings: InstrumentationSettings,
        sink: Rc<dyn EventSink>,
        config: InstrumentConfig,
    ) -> Self {
        let sanitizer = Rc::new(StackSanitizer::new([config.script_url.clone()]));
        Self {
            settings: Rc::new(settings),
            sink,
            config,
            sanitizer,
            realms: RefCell::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> Mode {
        Mode::from_stealth_flag(self.config.stealth)
    }

    /// The sanitizer configured for this instrumentation's script URL
    pub fn sanitizer(&self) -> Rc<StackSanitizer> {
        self.sanitizer.clone()
    }

    /// Number of realms with live wrap state
    pub fn realm_count(&self) -> usize {
        self.realms.borrow().len()
    }

    /// Instrument one realm according to the shared settings.
    ///
    /// Idempotent: a second invocation on the same realm bumps refcounts
    /// without installing a second wrapper anywhere.
    pub fn instrument_realm(&self, realm: &Realm) -> InstrumentReport {
        let mut report = InstrumentReport::default();
        let targets = expand(realm, &self.settings);
        let ctx = WrapContext {
            realm: realm.clone(),
            sink: self.sink.clone(),
            sanitizer: self.sanitizer.clone(),
            mode: self.mode(),
            script_url: self.config.script_url.clone(),
            snapshot_limit: self.config.snapshot_limit,
        };

        let mut realms = self.realms.borrow_mut();
        let registry = realms.entry(realm.id().to_string()).or_default();

        for target in targets {
            let resolution = match resolver::resolve(&target.root, &target.property, target.depth)
            {
                Some(resolution) => resolution,
                None => {
                    report.skipped_missing += 1;
                    tracing::debug!(
                        realm = %realm.id(),
                        path = %target.path,
                        depth = target.depth,
                        "target not found within depth bound"
                    );
                    continue;
                }
            };
            if !resolution.descriptor.configurable {
                report.skipped_unwrappable += 1;
                tracing::debug!(
                    realm = %realm.id(),
                    path = %target.path,
                    "property is non-configurable, leaving untouched"
                );
                continue;
            }

            let outcome = registry.acquire(&resolution.owner, &target.property, |original| {
                wrapper::wrap(&ctx, &target.path, &target.api_root, original)
            });
            match outcome {
                AcquireOutcome::Installed => report.wrapped += 1,
                AcquireOutcome::AlreadyWrapped => report.already_wrapped += 1,
                AcquireOutcome::Declined => {
                    report.skipped_unwrappable += 1;
                    tracing::debug!(
                        realm = %realm.id(),
                        path = %target.path,
                        "wrap declined"
                    );
                }
            }
        }

        if self.config.stealth && self.config.scrub_error_stacks {
            self.install_stack_scrubber(realm, registry);
        }
        drop(realms);

        tracing::debug!(
            realm = %realm.id(),
            wrapped = report.wrapped,
            already = report.already_wrapped,
            missing = report.skipped_missing,
            unwrappable = report.skipped_unwrappable,
            "realm instrumented"
        );
        report
    }

    /// Replace the `Error.prototype.stack` getter with one that scrubs
    /// instrumentation frames lazily, at property-get time. Page code
    /// that provokes an error inside an instrumented call reads a stack
    /// with no trace of the wrapper.
    fn install_stack_scrubber(&self, realm: &Realm, registry: &WrapRegistry) {
        let error_proto = realm.error_prototype();
        let sanitizer = self.sanitizer.clone();
        registry.acquire(&error_proto, "stack", |original| {
            let (original_get, original_set) = match &original.kind {
                DescriptorKind::Accessor { get: Some(g), set } => (g.clone(), set.clone()),
                _ => return None,
            };
            let getter = realm.native_function("get stack", 0, move |realm, this, args| {
                let raw = realm.call(&original_get, this, args)?;
                match raw {
                    JsValue::String(text) => {
                        Ok(JsValue::String(sanitizer.sanitize(&text).into_owned()))
                    }
                    other => Ok(other),
                }
            });
            Some(PropertyDescriptor {
                configurable: original.configurable,
                enumerable: original.enumerable,
                kind: DescriptorKind::Accessor {
                    get: Some(getter),
                    set: original_set,
                },
            })
        });
    }

    /// Explicitly unwrap everything installed in a realm, restoring the
    /// original descriptors.
    pub fn restore_realm(&self, realm: &Realm) {
        if let Some(registry) = self.realms.borrow_mut().remove(realm.id()) {
            registry.restore_all();
            tracing::debug!(realm = %realm.id(), "realm restored");
        }
    }

    /// Discard a destroyed realm's wrap state without touching its
    /// objects. This is the steady-state teardown path, since the whole
    /// realm is being discarded anyway.
    pub fn forget_realm(&self, realm_id: &str) {
        if self.realms.borrow_mut().remove(realm_id).is_some() {
            tracing::debug!(realm = %realm_id, "realm state discarded");
        }
    }
}
