//! The record sanitizer: turns a [`LogEvent`] plus optional request and
//! exception context into a JSON line holding only allow-listed fields.

use crate::allowlist::{self, filter_mapping, AllowListRegistry};
use crate::context::{ExceptionContext, RequestContext};
use crate::encode::{encode_record, LogValue};
use crate::error::{ConfigError, FormatError, SanitizeError};
use crate::init::FormatterConfig;
use crate::record::LogEvent;
use crate::reporter::{DefaultReporter, ExceptionReporter, PackageSource, StaticPackages, TracebackData};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

/// Flat mapping of exported field names to values.
pub type SanitizedRecord = BTreeMap<String, LogValue>;

/// Date pattern used for `asctime` when none is configured.
pub const DEFAULT_DATEFMT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Stateless formatter applying an [`AllowListRegistry`] at every
/// namespace boundary.
///
/// The registry is fixed at construction; reconfiguring means building a
/// new instance (see [`SharedSanitizer`](crate::shared::SharedSanitizer)).
#[derive(Clone)]
pub struct RecordSanitizer {
    registry: AllowListRegistry,
    datefmt: String,
    use_time: bool,
    reporter: Arc<dyn ExceptionReporter>,
    packages: Arc<dyn PackageSource>,
}

impl std::fmt::Debug for RecordSanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSanitizer")
            .field("registry", &self.registry)
            .field("datefmt", &self.datefmt)
            .field("use_time", &self.use_time)
            .finish_non_exhaustive()
    }
}

impl Default for RecordSanitizer {
    fn default() -> Self {
        Self::new(AllowListRegistry::defaults())
    }
}

impl RecordSanitizer {
    pub fn new(registry: AllowListRegistry) -> Self {
        Self {
            registry,
            datefmt: DEFAULT_DATEFMT.to_string(),
            use_time: false,
            reporter: Arc::new(DefaultReporter::new()),
            packages: Arc::new(StaticPackages::default()),
        }
    }

    /// Build a sanitizer from configuration, using the default collaborators.
    pub fn from_config(config: &FormatterConfig) -> Result<Self, ConfigError> {
        Self::default().reconfigure(config)
    }

    /// New sanitizer with `config` applied, sharing this one's collaborators.
    pub fn reconfigure(&self, config: &FormatterConfig) -> Result<Self, ConfigError> {
        let registry = AllowListRegistry::new(config.whitelists.as_ref(), config.replace)
            .with_overrides(&config.field_overrides);
        let datefmt = config.datefmt.clone().unwrap_or_else(|| DEFAULT_DATEFMT.to_string());
        validate_datefmt(&datefmt)?;
        Ok(Self {
            registry,
            datefmt,
            use_time: config.use_time,
            reporter: Arc::clone(&self.reporter),
            packages: Arc::clone(&self.packages),
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ExceptionReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_packages(mut self, packages: Arc<dyn PackageSource>) -> Self {
        self.packages = packages;
        self
    }

    pub fn with_time(mut self, datefmt: Option<&str>) -> Result<Self, ConfigError> {
        let datefmt = datefmt.unwrap_or(DEFAULT_DATEFMT);
        validate_datefmt(datefmt)?;
        self.datefmt = datefmt.to_string();
        self.use_time = true;
        Ok(self)
    }

    pub fn registry(&self) -> &AllowListRegistry {
        &self.registry
    }

    /// Format one event into a JSON byte string.
    ///
    /// **Errors**
    /// - [`SanitizeError::Format`] when the message cannot be rendered.
    /// - [`SanitizeError::Serialization`] when a value has no JSON form.
    ///
    /// Collaborator failures never fail the call; they are recorded as
    /// `{"error": ..}` placeholders.
    pub fn format(
        &self,
        event: &LogEvent,
        request: Option<&RequestContext>,
        exception: Option<&ExceptionContext>,
    ) -> Result<Vec<u8>, SanitizeError> {
        let record = self.sanitize(event, request, exception)?;
        Ok(encode_record(&record)?)
    }

    /// Assemble the filtered record without serializing it.
    pub fn sanitize(
        &self,
        event: &LogEvent,
        request: Option<&RequestContext>,
        exception: Option<&ExceptionContext>,
    ) -> Result<SanitizedRecord, FormatError> {
        let mut record = self.base_record(event)?;
        if let Some(exception) = exception {
            record.extend(self.exception_fields(exception, request));
        }
        Ok(record)
    }

    fn base_record(&self, event: &LogEvent) -> Result<SanitizedRecord, FormatError> {
        let message = event.message()?;
        let asctime = if self.use_time {
            Some(format_time(&event.timestamp, &self.datefmt)?)
        } else {
            None
        };

        let mut record = SanitizedRecord::new();
        for key in self.registry.keys(allowlist::RECORD) {
            let value = match key {
                "message" => Some(LogValue::Str(message.clone())),
                "asctime" => asctime.clone().map(LogValue::Str),
                other => event.attribute(other),
            };
            if let Some(value) = value {
                record.insert(key.to_string(), value);
            }
        }
        Ok(record)
    }

    /// Collaborator failures are reported on stderr: this runs inside
    /// subscriber callbacks, where nested `tracing` events are discarded.
    fn exception_fields(&self, exception: &ExceptionContext, request: Option<&RequestContext>) -> SanitizedRecord {
        let mut fields = SanitizedRecord::new();

        if let Some(request) = request {
            fields.extend(self.request_fields(request));
        }

        match self.reporter.traceback_data(exception, request) {
            Ok(mut raw) => {
                scrub_frames(&mut raw);
                fields.extend(self.traceback_fields(&raw));
            }
            Err(err) => {
                eprintln!("exception reporter failed, traceback omitted: {}", err);
                fields.insert("traceback".to_string(), error_placeholder(&err.to_string()));
            }
        }

        let packages = match self.packages.installed_packages() {
            Ok(packages) => LogValue::List(packages.iter().map(LogValue::from).collect()),
            Err(err) => {
                eprintln!("package manifest lookup failed: {}", err);
                error_placeholder(&err.to_string())
            }
        };
        fields.insert("installed_packages".to_string(), packages);
        fields
    }

    fn request_fields(&self, request: &RequestContext) -> SanitizedRecord {
        let username = LogValue::Str(request.display_username());
        let method = LogValue::from(request.method.clone());
        let path_info = LogValue::from(request.path_info.clone());

        let mut nested = BTreeMap::new();
        nested.insert("method".to_string(), method.clone());
        nested.insert("path_info".to_string(), path_info.clone());
        nested.insert("username".to_string(), username.clone());
        insert_group(&mut nested, "GET", request.query.clone());
        insert_group(&mut nested, "POST", request.body.clone());
        insert_group(
            &mut nested,
            "FILES",
            request.files.iter().map(|(k, f)| (k.clone(), LogValue::from(f))).collect(),
        );
        insert_group(
            &mut nested,
            "COOKIES",
            request.cookies.iter().map(|(k, v)| (k.clone(), LogValue::from(v.clone()))).collect(),
        );
        insert_group(
            &mut nested,
            "META",
            filter_mapping(&request.meta, self.registry.keys(allowlist::META)),
        );

        let mut fields = SanitizedRecord::new();
        fields.insert("method".to_string(), method);
        fields.insert("path_info".to_string(), path_info);
        fields.insert("username".to_string(), username);
        fields.insert("remote_addr".to_string(), request.remote_addr());
        fields.insert("server_protocol".to_string(), request.meta_or_placeholder("SERVER_PROTOCOL"));
        fields.insert("http_user_agent".to_string(), request.meta_or_placeholder("HTTP_USER_AGENT"));
        fields.insert("request".to_string(), LogValue::Map(nested));
        fields
    }

    /// Filter raw traceback data; `settings` is filtered a second time
    /// against its own namespace.
    fn traceback_fields(&self, raw: &TracebackData) -> SanitizedRecord {
        let mut fields = filter_mapping(raw, self.registry.keys(allowlist::TRACEBACK));
        // A non-mapping `settings` value is dropped.
        if let Some(LogValue::Map(settings)) = fields.remove(allowlist::SETTINGS) {
            let filtered = filter_mapping(&settings, self.registry.keys(allowlist::SETTINGS));
            fields.insert(allowlist::SETTINGS.to_string(), LogValue::Map(filtered));
        }
        fields
    }
}

fn insert_group(target: &mut BTreeMap<String, LogValue>, name: &str, group: BTreeMap<String, LogValue>) {
    if !group.is_empty() {
        target.insert(name.to_string(), LogValue::Map(group));
    }
}

fn error_placeholder(message: &str) -> LogValue {
    let mut map = BTreeMap::new();
    map.insert("error".to_string(), LogValue::from(message));
    LogValue::Map(map)
}

/// Drop the raw `tb` payload of every frame in `data["frames"]`.
pub fn scrub_frames(data: &mut TracebackData) {
    if let Some(LogValue::List(frames)) = data.get_mut("frames") {
        for frame in frames.iter_mut() {
            if let LogValue::Map(frame) = frame {
                frame.remove("tb");
            }
        }
    }
}

fn validate_datefmt(pattern: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidDateFormat(pattern.to_string()));
    }
    Ok(())
}

/// Render `timestamp` with a strftime-style pattern.
pub fn format_time(timestamp: &DateTime<Utc>, pattern: &str) -> Result<String, FormatError> {
    let items = StrftimeItems::new(pattern);
    if items.clone().any(|item| matches!(item, Item::Error)) {
        return Err(FormatError::new(format!("invalid date format pattern `{}`", pattern)));
    }
    let mut out = String::new();
    write!(out, "{}", timestamp.format_with_items(items))
        .map_err(|_| FormatError::new(format!("could not render timestamp with `{}`", pattern)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Frame, User};
    use crate::error::BoxError;
    use crate::record::Level;
    use crate::reporter::{InstalledPackage, NoPackages};
    use chrono::TimeZone;
    use serde_json::Value;

    struct FailingReporter;

    impl ExceptionReporter for FailingReporter {
        fn traceback_data(&self, _: &ExceptionContext, _: Option<&RequestContext>) -> Result<TracebackData, BoxError> {
            Err("reporter exploded".into())
        }
    }

    struct FailingPackages;

    impl PackageSource for FailingPackages {
        fn installed_packages(&self) -> Result<Vec<InstalledPackage>, BoxError> {
            Err("metadata unavailable".into())
        }
    }

    fn to_json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    fn event() -> LogEvent {
        LogEvent::new(Level::Error, "checkout failed")
            .at(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap())
            .with_extra("username", "alice")
    }

    #[test]
    fn asctime_only_when_time_is_requested() {
        let plain = to_json(&RecordSanitizer::default().format(&event(), None, None).unwrap());
        assert!(plain.get("asctime").is_none());

        let timed = RecordSanitizer::default().with_time(None).unwrap();
        let out = to_json(&timed.format(&event(), None, None).unwrap());
        assert_eq!(out["asctime"], "2024-05-06 07:08:09,000");
    }

    #[test]
    fn invalid_datefmt_is_rejected() {
        assert!(RecordSanitizer::default().with_time(Some("%Q")).is_err());
        assert!(format_time(&Utc::now(), "%Q").is_err());
    }

    #[test]
    fn scrub_frames_removes_raw_payload_only() {
        let mut frame = BTreeMap::new();
        frame.insert("tb".to_string(), LogValue::from("tokens"));
        frame.insert("lineno".to_string(), LogValue::from(3u32));
        let mut data = TracebackData::new();
        data.insert("frames".to_string(), LogValue::List(vec![LogValue::Map(frame)]));

        scrub_frames(&mut data);
        let frames = match &data["frames"] {
            LogValue::List(frames) => frames,
            _ => unreachable!(),
        };
        let frame = frames[0].as_map().unwrap();
        assert!(!frame.contains_key("tb"));
        assert!(frame.contains_key("lineno"));
    }

    #[test]
    fn reporter_failure_keeps_base_record() {
        let sanitizer = RecordSanitizer::default()
            .with_reporter(Arc::new(FailingReporter))
            .with_packages(Arc::new(NoPackages));
        let out = to_json(
            &sanitizer
                .format(&event(), None, Some(&ExceptionContext::new("E", "boom")))
                .unwrap(),
        );
        assert_eq!(out["message"], "checkout failed");
        assert_eq!(out["traceback"]["error"], "reporter exploded");
        assert_eq!(out["installed_packages"], serde_json::json!([]));
    }

    #[test]
    fn package_failure_is_recorded() {
        let sanitizer = RecordSanitizer::default().with_packages(Arc::new(FailingPackages));
        let out = to_json(
            &sanitizer
                .format(&event(), None, Some(&ExceptionContext::new("E", "boom")))
                .unwrap(),
        );
        assert_eq!(out["installed_packages"]["error"], "metadata unavailable");
        assert_eq!(out["exception_type"], "E");
    }

    #[test]
    fn non_mapping_settings_are_dropped() {
        struct StringSettings;
        impl ExceptionReporter for StringSettings {
            fn traceback_data(&self, _: &ExceptionContext, _: Option<&RequestContext>) -> Result<TracebackData, BoxError> {
                let mut data = TracebackData::new();
                data.insert("settings".to_string(), LogValue::from("SECRET_KEY=abc"));
                Ok(data)
            }
        }
        let sanitizer = RecordSanitizer::default().with_reporter(Arc::new(StringSettings));
        let out = to_json(
            &sanitizer
                .format(&event(), None, Some(&ExceptionContext::new("E", "boom")))
                .unwrap(),
        );
        assert!(out.get("settings").is_none());
    }

    #[test]
    fn request_summary_fields_use_placeholders() {
        let request = RequestContext::new("GET", "/cart").with_user(User::authenticated("bob"));
        let out = to_json(
            &RecordSanitizer::default()
                .format(&event(), Some(&request), Some(&ExceptionContext::new("E", "boom")))
                .unwrap(),
        );
        assert_eq!(out["username"], "bob");
        assert_eq!(out["request"]["username"], "bob");
        assert_eq!(out["remote_addr"], "-");
        assert_eq!(out["http_user_agent"], "-");
        assert!(out["request"].get("META").is_none());
        assert!(out["request"].get("GET").is_none());
    }

    #[test]
    fn frames_survive_without_tb() {
        let exc = ExceptionContext::new("KeyError", "'sku'").with_frame(Frame {
            filename: "cart.rs".to_string(),
            function: "total".to_string(),
            lineno: 10,
            tb: Some("SECRET_LOCAL=1".to_string()),
            ..Frame::default()
        });
        let bytes = RecordSanitizer::default().format(&event(), None, Some(&exc)).unwrap();
        let out = to_json(&bytes);
        assert_eq!(out["frames"][0]["function"], "total");
        assert!(out["frames"][0].get("tb").is_none());
        assert!(!String::from_utf8(bytes).unwrap().contains("SECRET_LOCAL"));
    }
}
