use crate::context::{ExceptionContext, Frame, RequestContext};
use crate::encode::LogValue;
use crate::error::BoxError;
use std::collections::BTreeMap;

/// Raw traceback data, keyed by field name.
pub type TracebackData = BTreeMap<String, LogValue>;

/// Supplies raw debugging data for a captured exception.
///
/// The sanitizer treats the returned mapping as untrusted: it is scrubbed
/// and allow-list filtered before anything is serialized. Frames are
/// expected under `frames` as a list of per-frame mappings.
pub trait ExceptionReporter: Send + Sync {
    fn traceback_data(
        &self,
        exception: &ExceptionContext,
        request: Option<&RequestContext>,
    ) -> Result<TracebackData, BoxError>;
}

/// Substitute for values of sensitive POST parameters.
pub const CLEANSED_SUBSTITUTE: &str = "********************";

const SENSITIVE_PARAM_MARKERS: &[&str] = &["password", "secret", "token", "key", "signature"];

/// Reporter building traceback data from the [`ExceptionContext`] itself
/// plus a host-supplied settings snapshot.
#[derive(Debug, Clone, Default)]
pub struct DefaultReporter {
    settings: BTreeMap<String, LogValue>,
}

impl DefaultReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, settings: BTreeMap<String, LogValue>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<LogValue>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    fn frame_data(frame: &Frame) -> LogValue {
        let mut map = BTreeMap::new();
        map.insert("filename".to_string(), LogValue::from(frame.filename.clone()));
        map.insert("function".to_string(), LogValue::from(frame.function.clone()));
        map.insert("lineno".to_string(), LogValue::from(frame.lineno));
        map.insert("context_line".to_string(), LogValue::from(frame.context_line.clone()));
        map.insert(
            "pre_context".to_string(),
            LogValue::List(frame.pre_context.iter().cloned().map(LogValue::Str).collect()),
        );
        map.insert(
            "post_context".to_string(),
            LogValue::List(frame.post_context.iter().cloned().map(LogValue::Str).collect()),
        );
        map.insert("vars".to_string(), LogValue::Map(frame.vars.clone()));
        if let Some(tb) = &frame.tb {
            map.insert("tb".to_string(), LogValue::from(tb.clone()));
        }
        LogValue::Map(map)
    }
}

impl ExceptionReporter for DefaultReporter {
    fn traceback_data(
        &self,
        exception: &ExceptionContext,
        request: Option<&RequestContext>,
    ) -> Result<TracebackData, BoxError> {
        let mut data = TracebackData::new();
        data.insert("exception_type".to_string(), LogValue::from(exception.exception_type.clone()));
        data.insert("exception_value".to_string(), LogValue::from(exception.exception_value.clone()));
        data.insert(
            "frames".to_string(),
            LogValue::List(exception.frames.iter().map(Self::frame_data).collect()),
        );
        data.insert("settings".to_string(), LogValue::Map(self.settings.clone()));
        if let Ok(exe) = std::env::current_exe() {
            data.insert("sys_executable".to_string(), LogValue::from(exe.display().to_string()));
        }
        if let Some(request) = request {
            data.insert("filtered_POST".to_string(), LogValue::Map(cleanse_params(&request.body)));
        }
        Ok(data)
    }
}

/// Mask values of parameters whose name looks like a credential.
pub fn cleanse_params(params: &BTreeMap<String, LogValue>) -> BTreeMap<String, LogValue> {
    params
        .iter()
        .map(|(key, value)| {
            let lower = key.to_lowercase();
            if SENSITIVE_PARAM_MARKERS.iter().any(|marker| lower.contains(marker)) {
                (key.clone(), LogValue::from(CLEANSED_SUBSTITUTE))
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}

/// One installed runtime package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub location: String,
}

impl InstalledPackage {
    pub fn new(name: impl Into<String>, version: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            location: location.into(),
        }
    }

    /// This crate, as recorded by cargo at build time.
    pub fn this_crate() -> Self {
        Self::new(
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_MANIFEST_DIR"),
        )
    }
}

impl From<&InstalledPackage> for LogValue {
    fn from(package: &InstalledPackage) -> Self {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), LogValue::from(package.name.clone()));
        map.insert("version".to_string(), LogValue::from(package.version.clone()));
        map.insert("location".to_string(), LogValue::from(package.location.clone()));
        LogValue::Map(map)
    }
}

/// Source of the installed-package manifest attached to exception records.
pub trait PackageSource: Send + Sync {
    fn installed_packages(&self) -> Result<Vec<InstalledPackage>, BoxError>;
}

/// Fixed manifest supplied by the host application.
#[derive(Debug, Clone)]
pub struct StaticPackages(pub Vec<InstalledPackage>);

impl Default for StaticPackages {
    fn default() -> Self {
        StaticPackages(vec![InstalledPackage::this_crate()])
    }
}

impl PackageSource for StaticPackages {
    fn installed_packages(&self) -> Result<Vec<InstalledPackage>, BoxError> {
        Ok(self.0.clone())
    }
}

/// Manifest source reporting nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPackages;

impl PackageSource for NoPackages {
    fn installed_packages(&self) -> Result<Vec<InstalledPackage>, BoxError> {
        Ok(Vec::new())
    }
}
