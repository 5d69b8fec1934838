//! Namespaced allow-lists deciding which fields may leave the process.
//!
//! Every lookup fails closed: a namespace or key that is not listed is
//! never exported.

use crate::encode::LogValue;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Top-level attributes of a log event.
pub const RECORD: &str = "record";
/// Keys of the raw traceback data returned by the exception reporter.
pub const TRACEBACK: &str = "traceback";
/// Request metadata (headers and server environment).
pub const META: &str = "meta";
/// Keys inside the process settings snapshot.
pub const SETTINGS: &str = "settings";

const DEFAULT_RECORD: &[&str] = &[
    "asctime",
    "event",
    "http_user_agent",
    "levelname",
    "message",
    "path_info",
    "remote_addr",
    "request_method",
    "server_protocol",
    "username",
];

const DEFAULT_TRACEBACK: &[&str] = &[
    "server_time",
    "sys_version_info",
    "exception_type",
    "frames",
    "template_info",
    "sys_executable",
    "django_version_info",
    "exception_value",
    "sys_path",
    "filtered_POST",
    "settings",
    "postmortem",
    "template_does_not_exist",
];

const DEFAULT_META: &[&str] = &[
    "CONTENT_LENGTH",
    "CONTENT_TYPE",
    "CSRF_COOKIE",
    "GATEWAY_INTERFACE",
    "HTTP_ACCEPT",
    "HTTP_ACCEPT_ENCODING",
    "HTTP_ACCEPT_LANGUAGE",
    "HTTP_CACHE_CONTROL",
    "HTTP_CONNECTION",
    "HTTP_COOKIE",
    "HTTP_DNT",
    "HTTP_HOST",
    "HTTP_UPGRADE_INSECURE_REQUESTS",
    "HTTP_USER_AGENT",
    "LOGNAME",
    "PWD",
    "QUERY_STRING",
    "REMOTE_ADDR",
    "REMOTE_HOST",
    "REQUEST_METHOD",
    "SECURITYSESSIONID",
    "SERVER_NAME",
    "SERVER_PORT",
    "SERVER_PROTOCOL",
    "SERVER_SOFTWARE",
    "TMPDIR",
    "USER",
    "VIRTUAL_ENV",
    "wsgi.version",
    "wsgi.url_scheme",
];

const DEFAULT_SETTINGS: &[&str] = &[
    "ABSOLUTE_URL_OVERRIDES",
    "ADMINS",
    "ALLOWED_HOSTS",
    "ALLOWED_INCLUDE_ROOTS",
    "APPEND_SLASH",
    "APP_NAME",
    "ASSETS_DEBUG",
    "AUTHENTICATION_BACKENDS",
    "BASE_DIR",
    "CSRF_COOKIE_AGE",
    "CSRF_COOKIE_DOMAIN",
    "CSRF_COOKIE_HTTPONLY",
    "CSRF_COOKIE_NAME",
    "CSRF_COOKIE_PATH",
    "CSRF_COOKIE_SECURE",
    "CSRF_FAILURE_VIEW",
    "CSRF_HEADER_NAME",
    "CSRF_TRUSTED_ORIGINS",
    "DEBUG",
    "DEBUG_PROPAGATE_EXCEPTIONS",
    "DEFAULT_FILE_STORAGE",
    "DEFAULT_FROM_EMAIL",
    "EMAILER_BACKEND",
    "EMAIL_BACKEND",
    "EMAIL_HOST",
    "EMAIL_HOST_PASSWORD",
    "EMAIL_HOST_USER",
    "EMAIL_PORT",
    "EMAIL_SSL_CERTFILE",
    "EMAIL_SSL_KEYFILE",
    "EMAIL_SUBJECT_PREFIX",
    "EMAIL_TIMEOUT",
    "EMAIL_USE_SSL",
    "EMAIL_USE_TLS",
    "FILE_UPLOAD_DIRECTORY_PERMISSIONS",
    "FILE_UPLOAD_HANDLERS",
    "FILE_UPLOAD_MAX_MEMORY_SIZE",
    "FILE_UPLOAD_PERMISSIONS",
    "FILE_UPLOAD_TEMP_DIR",
    "INSTALLED_APPS",
    "MAIL_TOADDRS",
    "MANAGERS",
    "MAX_UPLOAD_SIZE",
    "MIDDLEWARE_CLASSES",
    "PASSWORD_HASHERS",
    "SECURE_BROWSER_XSS_FILTER",
    "SECURE_CONTENT_TYPE_NOSNIFF",
    "SECURE_HSTS_INCLUDE_SUBDOMAINS",
    "SECURE_HSTS_SECONDS",
    "SECURE_PROXY_SSL_HEADER",
    "SECURE_REDIRECT_EXEMPT",
    "SECURE_SSL_HOST",
    "SECURE_SSL_REDIRECT",
    "SERVER_EMAIL",
    "SESSION_CACHE_ALIAS",
    "SESSION_COOKIE_AGE",
    "SESSION_COOKIE_DOMAIN",
    "SESSION_COOKIE_HTTPONLY",
    "SESSION_COOKIE_NAME",
    "SESSION_COOKIE_PATH",
    "SESSION_COOKIE_SECURE",
    "SESSION_ENGINE",
    "SESSION_EXPIRE_AT_BROWSER_CLOSE",
    "SESSION_FILE_PATH",
    "SESSION_SAVE_EVERY_REQUEST",
    "SESSION_SERIALIZER",
    "USE_X_FORWARDED_HOST",
    "USE_X_FORWARDED_PORT",
    "WSGI_APPLICATION",
    "X_FRAME_OPTIONS",
];

/// Explicit per-field decision applied after extend/replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldOverride {
    Allow,
    Deny,
}

/// Immutable set of exportable field names, grouped by namespace.
///
/// Each instance owns its own copy of the effective lists; the built-in
/// defaults are constants and are never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowListRegistry {
    lists: BTreeMap<String, BTreeSet<String>>,
}

impl Default for AllowListRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}

impl AllowListRegistry {
    /// Registry holding the built-in lists for all four namespaces.
    pub fn defaults() -> Self {
        let lists = [
            (RECORD, DEFAULT_RECORD),
            (TRACEBACK, DEFAULT_TRACEBACK),
            (META, DEFAULT_META),
            (SETTINGS, DEFAULT_SETTINGS),
        ]
        .into_iter()
        .map(|(ns, keys)| (ns.to_string(), keys.iter().map(|k| k.to_string()).collect()))
        .collect();
        Self { lists }
    }

    /// Build the effective registry from optional caller-supplied lists.
    ///
    /// **Parameters**
    /// - `whitelists`: per-namespace additions (or replacements).
    /// - `replace`: when `true` and `whitelists` is given, the defaults are
    ///   ignored entirely and `whitelists` is used verbatim.
    ///
    /// Without `replace`, each namespace of `whitelists` is merged into the
    /// defaults; namespaces that only exist in the override are created.
    pub fn new(whitelists: Option<&BTreeMap<String, Vec<String>>>, replace: bool) -> Self {
        let Some(whitelists) = whitelists else {
            return Self::defaults();
        };
        let mut registry = if replace {
            Self { lists: BTreeMap::new() }
        } else {
            Self::defaults()
        };
        for (namespace, keys) in whitelists {
            registry
                .lists
                .entry(namespace.clone())
                .or_default()
                .extend(keys.iter().cloned());
        }
        registry
    }

    /// Apply explicit allow/deny decisions on top of the current lists.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, BTreeMap<String, FieldOverride>>) -> Self {
        for (namespace, fields) in overrides {
            for (field, decision) in fields {
                match decision {
                    FieldOverride::Allow => {
                        self.lists.entry(namespace.clone()).or_default().insert(field.clone());
                    }
                    FieldOverride::Deny => {
                        if let Some(list) = self.lists.get_mut(namespace) {
                            list.remove(field);
                        }
                    }
                }
            }
        }
        self
    }

    /// Whether `key` may be exported under `namespace`. Unknown namespaces
    /// allow nothing.
    pub fn is_allowed(&self, namespace: &str, key: &str) -> bool {
        self.lists.get(namespace).is_some_and(|list| list.contains(key))
    }

    /// Allowed keys of `namespace`, empty when the namespace is unknown.
    pub fn keys<'a>(&'a self, namespace: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.lists.get(namespace).into_iter().flatten().map(String::as_str)
    }

    pub fn namespace(&self, namespace: &str) -> Option<&BTreeSet<String>> {
        self.lists.get(namespace)
    }
}

/// Copy every allowed key that is present and non-null in `raw`.
pub fn filter_mapping<'a>(
    raw: &BTreeMap<String, LogValue>,
    allowed: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<String, LogValue> {
    allowed
        .into_iter()
        .filter_map(|key| match raw.get(key) {
            Some(value) if !value.is_null() => Some((key.to_string(), value.clone())),
            _ => None,
        })
        .collect()
}
