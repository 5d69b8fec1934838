use crate::encode::LogValue;
use crate::error::FormatError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a [`LogEvent`], rendered as `levelname`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    pub fn levelno(&self) -> i64 {
        match self {
            Level::Trace => 5,
            Level::Debug => 10,
            Level::Info => 20,
            Level::Warning => 30,
            Level::Error => 40,
            Level::Critical => 50,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Substitution arguments of a message template.
#[derive(Debug, Clone, Default)]
pub struct LogArgs {
    pub positional: Vec<LogValue>,
    pub named: BTreeMap<String, LogValue>,
}

impl LogArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<LogValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>, value: impl Into<LogValue>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Extra attributes attached by the caller.
///
/// The attributes of the default `record` allow-list have dedicated slots;
/// anything else lands in `custom` and is only exported once a caller
/// adds its name to the `record` allow-list.
#[derive(Debug, Clone, Default)]
pub struct RecordExtras {
    pub event: Option<LogValue>,
    pub http_user_agent: Option<LogValue>,
    pub path_info: Option<LogValue>,
    pub remote_addr: Option<LogValue>,
    pub request_method: Option<LogValue>,
    pub server_protocol: Option<LogValue>,
    pub username: Option<LogValue>,
    pub custom: BTreeMap<String, LogValue>,
}

impl RecordExtras {
    pub fn set(&mut self, name: &str, value: impl Into<LogValue>) {
        let value = value.into();
        match name {
            "event" => self.event = Some(value),
            "http_user_agent" => self.http_user_agent = Some(value),
            "path_info" => self.path_info = Some(value),
            "remote_addr" => self.remote_addr = Some(value),
            "request_method" => self.request_method = Some(value),
            "server_protocol" => self.server_protocol = Some(value),
            "username" => self.username = Some(value),
            other => {
                self.custom.insert(other.to_string(), value);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&LogValue> {
        match name {
            "event" => self.event.as_ref(),
            "http_user_agent" => self.http_user_agent.as_ref(),
            "path_info" => self.path_info.as_ref(),
            "remote_addr" => self.remote_addr.as_ref(),
            "request_method" => self.request_method.as_ref(),
            "server_protocol" => self.server_protocol.as_ref(),
            "username" => self.username.as_ref(),
            other => self.custom.get(other),
        }
    }
}

/// One log call: severity, message template with arguments, timestamp and
/// caller-supplied extras.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: Level,
    pub template: String,
    pub args: LogArgs,
    pub timestamp: DateTime<Utc>,
    pub target: Option<String>,
    pub extras: RecordExtras,
}

impl LogEvent {
    pub fn new(level: Level, template: impl Into<String>) -> Self {
        Self {
            level,
            template: template.into(),
            args: LogArgs::default(),
            timestamp: Utc::now(),
            target: None,
            extras: RecordExtras::default(),
        }
    }

    pub fn with_args(mut self, args: LogArgs) -> Self {
        self.args = args;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_extra(mut self, name: &str, value: impl Into<LogValue>) -> Self {
        self.extras.set(name, value);
        self
    }

    /// Value of a named record attribute, if the event has one.
    ///
    /// `message` and `asctime` are computed by the formatter and are not
    /// resolved here.
    pub fn attribute(&self, name: &str) -> Option<LogValue> {
        match name {
            "levelname" => Some(LogValue::from(self.level.as_str())),
            "levelno" => Some(LogValue::Int(self.level.levelno())),
            "name" => self.target.clone().map(LogValue::Str),
            "created" => Some(LogValue::DateTime(self.timestamp)),
            other => self.extras.get(other).cloned(),
        }
    }

    /// Render the message template with the event's arguments.
    ///
    /// An event without arguments returns its template untouched.
    pub fn message(&self) -> Result<String, FormatError> {
        if self.args.is_empty() {
            return Ok(self.template.clone());
        }
        substitute(&self.template, &self.args)
    }
}

/// Expand `{}`, `{N}` and `{name}` placeholders; `{{` and `}}` are escapes.
///
/// Every positional argument must be consumed.
fn substitute(template: &str, args: &LogArgs) -> Result<String, FormatError> {
    let mut out = String::with_capacity(template.len());
    let mut used = vec![false; args.positional.len()];
    let mut next_positional = 0usize;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(FormatError::new("unmatched `{` in message template")),
                        Some(ch) => name.push(ch),
                    }
                }
                let value = if name.is_empty() {
                    let index = next_positional;
                    next_positional += 1;
                    positional(args, &mut used, index)?
                } else if let Ok(index) = name.parse::<usize>() {
                    positional(args, &mut used, index)?
                } else {
                    args.named
                        .get(&name)
                        .ok_or_else(|| FormatError::new(format!("missing keyword argument `{}`", name)))?
                };
                let text = value.render(&name).map_err(|e| FormatError::new(e.to_string()))?;
                out.push_str(&text);
            }
            '}' => return Err(FormatError::new("unmatched `}` in message template")),
            other => out.push(other),
        }
    }

    if let Some(index) = used.iter().position(|u| !u) {
        return Err(FormatError::new(format!(
            "not all arguments converted: positional argument {} is unused",
            index
        )));
    }
    Ok(out)
}

fn positional<'a>(args: &'a LogArgs, used: &mut [bool], index: usize) -> Result<&'a LogValue, FormatError> {
    let value = args
        .positional
        .get(index)
        .ok_or_else(|| FormatError::new(format!("missing positional argument {}", index)))?;
    used[index] = true;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(template: &str, args: LogArgs) -> LogEvent {
        LogEvent::new(Level::Info, template).with_args(args)
    }

    #[test]
    fn message_without_args_is_verbatim() {
        let e = event("rate {limit} hit {}", LogArgs::new());
        assert_eq!(e.message().unwrap(), "rate {limit} hit {}");
    }

    #[test]
    fn positional_and_keyword_substitution() {
        let args = LogArgs::new().arg("alice").arg(3i64).named("action", "login");
        let e = event("{} failed {action} {1} times ({0})", args);
        assert_eq!(e.message().unwrap(), "alice failed login 3 times (alice)");
    }

    #[test]
    fn escaped_braces_are_kept() {
        let e = event("{{literal}} {}", LogArgs::new().arg(1i64));
        assert_eq!(e.message().unwrap(), "{literal} 1");
    }

    #[test]
    fn missing_arguments_are_errors() {
        assert!(event("{} {}", LogArgs::new().arg(1i64)).message().is_err());
        assert!(event("{who}", LogArgs::new().named("other", 1i64)).message().is_err());
    }

    #[test]
    fn unused_positional_arguments_are_errors() {
        let err = event("no placeholders", LogArgs::new().arg(1i64)).message().unwrap_err();
        assert!(err.message().contains("not all arguments converted"));

        let err = event("{} only", LogArgs::new().arg(1i64).arg(2i64)).message().unwrap_err();
        assert!(err.message().contains("positional argument 1"));

        let message = event("{} only", LogArgs::new().arg(1i64).named("spare", 2i64)).message().unwrap();
        assert_eq!(message, "1 only");
    }

    #[test]
    fn unbalanced_braces_are_errors() {
        assert!(event("{oops", LogArgs::new().arg(1i64)).message().is_err());
        assert!(event("oops}", LogArgs::new().arg(1i64)).message().is_err());
    }

    #[test]
    fn extras_route_known_and_custom_names() {
        let e = LogEvent::new(Level::Warning, "x")
            .with_extra("username", "alice")
            .with_extra("tenant", "acme");
        assert_eq!(e.extras.username.as_ref().and_then(LogValue::as_str), Some("alice"));
        assert_eq!(e.attribute("tenant").as_ref().and_then(LogValue::as_str), Some("acme"));
        assert_eq!(e.attribute("levelname").as_ref().and_then(LogValue::as_str), Some("WARNING"));
        assert!(e.attribute("remote_addr").is_none());
    }
}
