use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, info};
use tracing_record_sanitizer::context::{with_request, ExceptionContext, RequestContext, User};
use tracing_record_sanitizer::encode::LogValue;
use tracing_record_sanitizer::error::BoxError;
use tracing_record_sanitizer::formatter::RecordSanitizer;
use tracing_record_sanitizer::init::{init_tracing_with_config, LayerConfig};
use tracing_record_sanitizer::reporter::{ExceptionReporter, InstalledPackage, StaticPackages, TracebackData};

/// Example of plugging in a custom exception reporter. Imagine it pulls
/// debugging data from the web framework in use; here it hands back a
/// canned snapshot, including values that must not be exported.
struct FrameworkReporter;

impl ExceptionReporter for FrameworkReporter {
    fn traceback_data(
        &self,
        exception: &ExceptionContext,
        _request: Option<&RequestContext>,
    ) -> Result<TracebackData, BoxError> {
        let mut settings = BTreeMap::new();
        settings.insert("DEBUG".to_string(), LogValue::from(false));
        settings.insert("SECRET_KEY".to_string(), LogValue::from("dont-ship-me"));

        let mut data = TracebackData::new();
        data.insert("exception_type".to_string(), LogValue::from(exception.exception_type.clone()));
        data.insert("exception_value".to_string(), LogValue::from(exception.exception_value.clone()));
        data.insert("settings".to_string(), LogValue::Map(settings));
        data.insert("server_time".to_string(), LogValue::from("2024-01-01T00:00:00Z"));
        Ok(data)
    }
}

#[derive(Debug)]
struct DbError;

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("connection pool exhausted")
    }
}

impl std::error::Error for DbError {}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let shared = init_tracing_with_config(std::io::stdout, LayerConfig::default())?;
    let sanitizer = RecordSanitizer::default()
        .with_reporter(Arc::new(FrameworkReporter))
        .with_packages(Arc::new(StaticPackages(vec![InstalledPackage::this_crate()])));
    shared.swap(sanitizer);

    info!(event = "startup", "custom reporter example started");

    let request = Arc::new(
        RequestContext::new("GET", "/reports")
            .with_user(User::authenticated("ops"))
            .with_meta("REMOTE_ADDR", "203.0.113.5")
            .with_meta("HTTP_AUTHORIZATION", "Bearer dont-ship-me"),
    );
    with_request(request, || {
        let err = DbError;
        error!(error = &err as &(dyn std::error::Error + 'static), "report generation failed");
    });
    Ok(())
}
