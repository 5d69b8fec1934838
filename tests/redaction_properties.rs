//! Property tests for the redaction invariants of the record sanitizer.
//!
//! Whatever the shape of the event, request metadata, settings snapshot or
//! stack frames, nothing outside the allow-lists may reach the output.

use proptest::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing_record_sanitizer::allowlist::{AllowListRegistry, META, RECORD, SETTINGS};
use tracing_record_sanitizer::context::{ExceptionContext, Frame, RequestContext, User};
use tracing_record_sanitizer::encode::LogValue;
use tracing_record_sanitizer::error::BoxError;
use tracing_record_sanitizer::formatter::RecordSanitizer;
use tracing_record_sanitizer::init::FormatterConfig;
use tracing_record_sanitizer::record::{Level, LogEvent};
use tracing_record_sanitizer::reporter::{ExceptionReporter, NoPackages, TracebackData};

/// Reporter handing back a fixed settings snapshot.
struct SettingsReporter(BTreeMap<String, LogValue>);

impl ExceptionReporter for SettingsReporter {
    fn traceback_data(&self, exc: &ExceptionContext, _: Option<&RequestContext>) -> Result<TracebackData, BoxError> {
        let mut data = TracebackData::new();
        data.insert("exception_type".to_string(), LogValue::from(exc.exception_type.clone()));
        data.insert("settings".to_string(), LogValue::Map(self.0.clone()));
        data.insert("local_secrets".to_string(), LogValue::from("should never leak"));
        Ok(data)
    }
}

fn arb_field_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("username".to_string()),
        Just("remote_addr".to_string()),
        Just("event".to_string()),
        Just("password".to_string()),
        Just("session_id".to_string()),
        "[a-z_]{1,12}",
    ]
}

fn arb_meta_key() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("REMOTE_ADDR".to_string()),
        Just("HTTP_USER_AGENT".to_string()),
        Just("HTTP_AUTHORIZATION".to_string()),
        Just("DATABASE_URL".to_string()),
        "[A-Z_]{3,12}",
    ]
}

fn arb_settings_key() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("DEBUG".to_string()),
        Just("EMAIL_PORT".to_string()),
        Just("SECRET_KEY".to_string()),
        Just("DATABASES".to_string()),
        "[A-Z_]{3,12}",
    ]
}

fn sanitizer() -> RecordSanitizer {
    RecordSanitizer::default().with_packages(Arc::new(NoPackages))
}

fn parse(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

proptest! {
    /// Extras outside the `record` list never reach the output, whether the
    /// lists are extended or replaced and whether an exception is attached.
    /// Without an exception every emitted key is `record` allow-listed.
    #[test]
    fn record_keys_never_escape_the_allow_list(
        extras in prop::collection::btree_map(arb_field_name(), "[a-z0-9]{0,8}", 0..10),
        configured in prop::collection::vec(arb_field_name(), 0..4),
        replace in any::<bool>(),
        with_exception in any::<bool>(),
    ) {
        let mut whitelists = BTreeMap::new();
        whitelists.insert(RECORD.to_string(), configured);
        let config = FormatterConfig { whitelists: Some(whitelists), replace, ..FormatterConfig::default() };
        let sanitizer = RecordSanitizer::from_config(&config).unwrap().with_packages(Arc::new(NoPackages));
        let registry = sanitizer.registry().clone();

        let mut event = LogEvent::new(Level::Info, "event");
        for (name, value) in &extras {
            event = event.with_extra(name, value.clone());
        }
        let exc = ExceptionContext::new("ValueError", "Bad Input");
        let exc = with_exception.then_some(&exc);
        let out = parse(&sanitizer.format(&event, None, exc).unwrap());
        let out = out.as_object().unwrap();

        for (name, value) in &extras {
            if !registry.is_allowed(RECORD, name) {
                prop_assert_ne!(out.get(name), Some(&Value::String(value.clone())), "leaked extra {}", name);
            }
        }
        if !with_exception {
            for key in out.keys() {
                prop_assert!(registry.is_allowed(RECORD, key), "leaked record key {}", key);
            }
        }
    }

    /// The raw `tb` payload of a frame never reaches the output.
    #[test]
    fn frame_payloads_are_always_scrubbed(
        payloads in prop::collection::vec(prop::option::of("[a-z]{4,12}"), 0..6)
    ) {
        let mut exc = ExceptionContext::new("ValueError", "bad");
        for (i, payload) in payloads.iter().enumerate() {
            exc = exc.with_frame(Frame {
                filename: format!("src/mod{}.rs", i),
                function: "handler".to_string(),
                lineno: i as u32,
                tb: payload.as_ref().map(|p| format!("TBPAYLOAD-{}", p)),
                ..Frame::default()
            });
        }
        let event = LogEvent::new(Level::Error, "failed");
        let bytes = sanitizer().format(&event, None, Some(&exc)).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        prop_assert!(!text.contains("TBPAYLOAD"));

        let out = parse(&bytes);
        let frames = out["frames"].as_array().unwrap();
        prop_assert_eq!(frames.len(), payloads.len());
        for frame in frames {
            prop_assert!(frame.get("tb").is_none());
        }
    }

    /// `request.META` holds exactly the allow-listed keys present in the
    /// raw metadata, with their original values.
    #[test]
    fn meta_is_filtered_exactly(
        meta in prop::collection::btree_map(arb_meta_key(), "[a-z0-9]{1,8}", 0..10)
    ) {
        let mut request = RequestContext::new("GET", "/").with_user(User::authenticated("alice"));
        for (key, value) in &meta {
            request = request.with_meta(key.clone(), value.clone());
        }
        let event = LogEvent::new(Level::Error, "failed");
        let out = parse(&sanitizer().format(&event, Some(&request), Some(&ExceptionContext::new("E", "v"))).unwrap());

        let registry = AllowListRegistry::defaults();
        let exported = out["request"].get("META").and_then(Value::as_object).cloned().unwrap_or_default();
        for key in exported.keys() {
            prop_assert!(registry.is_allowed(META, key), "leaked meta key {}", key);
        }
        for (key, value) in &meta {
            if registry.is_allowed(META, key) {
                prop_assert_eq!(exported.get(key), Some(&Value::String(value.clone())));
            }
        }
    }

    /// Only `settings` allow-listed keys survive the nested settings pass.
    #[test]
    fn settings_are_filtered_by_their_own_namespace(
        settings in prop::collection::btree_map(arb_settings_key(), "[a-z0-9]{1,8}", 0..10)
    ) {
        let raw = settings.iter().map(|(k, v)| (k.clone(), LogValue::from(v.clone()))).collect();
        let sanitizer = sanitizer().with_reporter(Arc::new(SettingsReporter(raw)));
        let event = LogEvent::new(Level::Error, "failed");
        let out = parse(&sanitizer.format(&event, None, Some(&ExceptionContext::new("E", "v"))).unwrap());

        let registry = AllowListRegistry::defaults();
        let exported = out["settings"].as_object().unwrap();
        for key in exported.keys() {
            prop_assert!(registry.is_allowed(SETTINGS, key), "leaked settings key {}", key);
        }
        prop_assert!(out.get("local_secrets").is_none());
    }

    /// Formatting the same input twice is byte-identical.
    #[test]
    fn formatting_is_idempotent(
        extras in prop::collection::btree_map(arb_field_name(), "[a-z0-9]{0,8}", 0..6),
        with_exception in any::<bool>(),
    ) {
        let mut event = LogEvent::new(Level::Warning, "event");
        for (name, value) in &extras {
            event = event.with_extra(name, value.clone());
        }
        let request = RequestContext::new("PUT", "/items/1")
            .with_meta("REMOTE_ADDR", "10.1.1.1")
            .with_body("qty", 3i64);
        let exc = ExceptionContext::new("E", "v");
        let exc = with_exception.then_some(&exc);

        let sanitizer = sanitizer().with_time(None).unwrap();
        let first = sanitizer.format(&event, Some(&request), exc).unwrap();
        let second = sanitizer.format(&event, Some(&request), exc).unwrap();
        prop_assert_eq!(first, second);
    }
}
