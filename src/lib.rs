//! # Specter
//!
//! Undetectable JavaScript API instrumentation for privacy measurement.
//!
//! Specter is the in-page engine of a browser-measurement platform: it
//! observes calls made by untrusted page scripts into sensitive APIs
//! (canvas, audio, navigator, storage, ...) while staying invisible to
//! the observed code itself. Wrapped properties report the same `name`,
//! `length` and `toString` output as the originals, never add enumerable
//! properties, and stack traces the page can obtain are scrubbed of
//! instrumentation frames.
//!
//! ## Features
//!
//! - **Transparent wrapping** - receiver, arguments, return values and
//!   thrown values forward unchanged; one `AccessEvent` per interception
//! - **Depth-bounded resolution** - owners are located along prototype
//!   chains, never deeper than the settings allow
//! - **Per-realm state** - every window/frame gets its own refcounted
//!   wrap registry; settings are shared read-only
//! - **Stealth or legacy** - one flag switches between non-polluting
//!   wrappers and the direct legacy instrument
//!
//! ## Quick Start
//!
//! ```rust
//! use std::rc::Rc;
//! use specter::{
//!     InstrumentConfig, InstrumentationSettings, Instrumentor, MemorySink,
//!     PropertyDescriptor, JsValue, Realm,
//! };
//!
//! # fn main() -> specter::Result<()> {
//! // A realm with a Navigator-style interface
//! let realm = Realm::new("top-frame");
//! let (_, nav_proto) = realm.create_constructor("Navigator");
//! nav_proto.define_property(
//!     "userAgent",
//!     PropertyDescriptor::data(JsValue::string("Mozilla/5.0")),
//! );
//!
//! // Instrument it
//! let settings = InstrumentationSettings::from_json(r#"{ "Navigator": ["userAgent"] }"#)?;
//! let sink = Rc::new(MemorySink::new());
//! let instrumentor = Instrumentor::new(settings, sink.clone(), InstrumentConfig::default());
//! instrumentor.instrument_realm(&realm);
//!
//! // Page reads still see the original value; the sink sees the access
//! assert_eq!(realm.get(&nav_proto, "userAgent").unwrap(), JsValue::string("Mozilla/5.0"));
//! assert_eq!(sink.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Scope
//!
//! Settings validation, event persistence, and content-script injection
//! are external collaborators: settings arrive as an already-validated
//! document, events leave through an [`EventSink`], and the embedder
//! decides when each realm is instrumented.

pub mod engine;
pub mod error;
pub mod events;
pub mod instrument;
pub mod realm;
pub mod sanitizer;
pub mod settings;

// Re-exports
pub use engine::registry::{AcquireOutcome, WrapRegistry};
pub use engine::resolver::{resolve, Resolution};
pub use engine::wrapper::WrapStrategy;
pub use error::{Error, Result};
pub use events::{AccessEvent, CallStatus, ChannelSink, EventSink, MemorySink, Operation};
pub use instrument::{InstrumentReport, Instrumentor, Mode};
pub use realm::{JsObject, JsValue, PropertyDescriptor, Realm};
pub use sanitizer::StackSanitizer;
pub use settings::{InstrumentTarget, InstrumentationSettings, PropertySettings, TargetDescriptor};

/// Configuration for the instrumentation layer
#[derive(Debug, Clone)]
pub struct InstrumentConfig {
    /// Non-polluting stealth mode (false = legacy direct injection)
    pub stealth: bool,
    /// Location the injected script occupies in stack traces; frames
    /// matching it are scrubbed
    pub script_url: String,
    /// Install the lazy `Error.prototype.stack` scrubbing hook
    /// (stealth mode only)
    pub scrub_error_stacks: bool,
    /// Character cap for argument/return snapshots in events
    pub snapshot_limit: usize,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            stealth: true,
            script_url: "moz-extension://instrument/content.js".to_string(),
            scrub_error_stacks: true,
            snapshot_limit: 1024,
        }
    }
}

impl InstrumentConfig {
    /// Legacy-mode config (detectable, pollution-tolerant)
    pub fn legacy() -> Self {
        Self {
            stealth: false,
            scrub_error_stacks: false,
            ..Default::default()
        }
    }

    /// Default config with a specific injected-script URL
    pub fn with_script_url(script_url: impl Into<String>) -> Self {
        Self {
            script_url: script_url.into(),
            ..Default::default()
        }
    }
}
