use std::sync::Arc;
use std::time::Instant;

use tracing_record_sanitizer::context::{ExceptionContext, Frame, RequestContext, User};
use tracing_record_sanitizer::formatter::RecordSanitizer;
use tracing_record_sanitizer::record::{Level, LogArgs, LogEvent};
use tracing_record_sanitizer::reporter::{DefaultReporter, NoPackages};

fn main() {
    let reporter = DefaultReporter::new()
        .with_setting("DEBUG", false)
        .with_setting("SECRET_KEY", "not-for-logs");
    let sanitizer = RecordSanitizer::default()
        .with_reporter(Arc::new(reporter))
        .with_packages(Arc::new(NoPackages));

    let request = RequestContext::new("POST", "/orders")
        .with_user(User::authenticated("loadtest"))
        .with_meta("REMOTE_ADDR", "127.0.0.1")
        .with_body("sku", "A-100");
    let exception = ExceptionContext::new("TimeoutError", "inventory service timed out").with_frame(Frame {
        filename: "src/orders.rs".to_string(),
        function: "reserve".to_string(),
        lineno: 88,
        tb: Some("x".repeat(4096)),
        ..Frame::default()
    });

    let n: u64 = 100_000;
    let start = Instant::now();
    let mut bytes = 0usize;

    for i in 0..n {
        let event = LogEvent::new(Level::Error, "order {} failed").with_args(LogArgs::new().arg(i));
        let with_exception = i % 10 == 0;
        let line = sanitizer
            .format(&event, Some(&request), with_exception.then_some(&exception))
            .unwrap_or_default();
        bytes += line.len();
    }

    let elapsed = start.elapsed();
    println!("formatted {} events ({} bytes) in {:?} (~{:.0} ev/s)",
        n,
        bytes,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
