//! Request and exception snapshots handed to the sanitizer.

use crate::encode::LogValue;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

/// Placeholder emitted when no authenticated identity is available.
pub const ANONYMOUS: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub is_anonymous: bool,
}

impl User {
    pub fn authenticated(username: impl Into<String>) -> Self {
        Self { username: username.into(), is_anonymous: false }
    }

    pub fn anonymous() -> Self {
        Self { username: String::new(), is_anonymous: true }
    }
}

/// Descriptor of an uploaded file; the content itself is never logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: String,
    pub size: u64,
}

impl From<&UploadedFile> for LogValue {
    fn from(file: &UploadedFile) -> Self {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), LogValue::from(file.name.clone()));
        map.insert("content_type".to_string(), LogValue::from(file.content_type.clone()));
        map.insert("size".to_string(), LogValue::UInt(file.size));
        LogValue::Map(map)
    }
}

/// Read-only view of an in-flight request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path_info: String,
    pub user: Option<User>,
    /// Headers and server environment, keyed like `HTTP_USER_AGENT`.
    pub meta: BTreeMap<String, LogValue>,
    pub query: BTreeMap<String, LogValue>,
    pub body: BTreeMap<String, LogValue>,
    pub files: BTreeMap<String, UploadedFile>,
    pub cookies: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path_info: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path_info: path_info.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<LogValue>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<LogValue>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, key: impl Into<String>, value: impl Into<LogValue>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    pub fn with_file(mut self, field: impl Into<String>, file: UploadedFile) -> Self {
        self.files.insert(field.into(), file);
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Name of the authenticated user, or [`ANONYMOUS`].
    pub fn display_username(&self) -> String {
        display_identity(self.user.as_ref())
    }

    /// Metadata value for `key`, or [`ANONYMOUS`] when absent or null.
    pub fn meta_or_placeholder(&self, key: &str) -> LogValue {
        match self.meta.get(key) {
            Some(value) if !value.is_null() => value.clone(),
            _ => LogValue::from(ANONYMOUS),
        }
    }

    pub fn remote_addr(&self) -> LogValue {
        self.meta_or_placeholder("REMOTE_ADDR")
    }
}

pub fn display_identity(user: Option<&User>) -> String {
    match user {
        Some(user) if !user.is_anonymous && !user.username.is_empty() => user.username.clone(),
        _ => ANONYMOUS.to_string(),
    }
}

/// One captured stack level.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub filename: String,
    pub function: String,
    pub lineno: u32,
    pub context_line: Option<String>,
    pub pre_context: Vec<String>,
    pub post_context: Vec<String>,
    pub vars: BTreeMap<String, LogValue>,
    /// Raw source/token payload. Never forwarded.
    pub tb: Option<String>,
}

/// Exception captured at log time.
#[derive(Debug, Clone, Default)]
pub struct ExceptionContext {
    pub exception_type: String,
    pub exception_value: String,
    pub frames: Vec<Frame>,
}

impl ExceptionContext {
    pub fn new(exception_type: impl Into<String>, exception_value: impl Into<String>) -> Self {
        Self {
            exception_type: exception_type.into(),
            exception_value: exception_value.into(),
            frames: Vec::new(),
        }
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Snapshot an error and its `source()` chain.
    ///
    /// The type name is a best guess taken from the head of the error's
    /// `Debug` output. That works for unit and tuple-like errors
    /// (`GatewayError`, `Timeout(..)`) but not for errors whose `Debug`
    /// starts with an inner variant, such as `std::io::Error` (`Os`,
    /// `Custom`, `Kind`) or hand-written impls. Use
    /// [`from_error_named`](Self::from_error_named) when the caller knows
    /// the type.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let debug = format!("{:?}", err);
        let exception_type = debug
            .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
            .next()
            .filter(|head| !head.is_empty())
            .unwrap_or(UNKNOWN_EXCEPTION_TYPE)
            .to_string();
        Self::new(exception_type, source_chain(err))
    }

    /// Like [`from_error`](Self::from_error) with an explicit type name.
    pub fn from_error_named(exception_type: impl Into<String>, err: &(dyn Error + 'static)) -> Self {
        Self::new(exception_type, source_chain(err))
    }

    /// An error only known through its rendered text, e.g. a tracing
    /// field recorded as `error = %e`.
    pub fn from_rendered(exception_value: impl Into<String>) -> Self {
        Self::new(UNKNOWN_EXCEPTION_TYPE, exception_value)
    }
}

/// `exception_type` when the concrete type cannot be recovered.
pub const UNKNOWN_EXCEPTION_TYPE: &str = "Error";

fn source_chain(err: &(dyn Error + 'static)) -> String {
    let mut value = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        value.push_str(": ");
        value.push_str(&cause.to_string());
        source = cause.source();
    }
    value
}

thread_local! {
    static CURRENT_REQUEST: RefCell<Option<Arc<RequestContext>>> = const { RefCell::new(None) };
}

struct RestoreRequest {
    previous: Option<Arc<RequestContext>>,
}

impl Drop for RestoreRequest {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = CURRENT_REQUEST.try_with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Run `f` with `request` installed as the current thread's request.
///
/// The previous request (if any) is restored afterwards, also on unwind.
pub fn with_request<R>(request: Arc<RequestContext>, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_REQUEST.with(|slot| slot.replace(Some(request)));
    let _restore = RestoreRequest { previous };
    f()
}

pub fn current_request() -> Option<Arc<RequestContext>> {
    CURRENT_REQUEST.try_with(|slot| slot.borrow().clone()).ok().flatten()
}
