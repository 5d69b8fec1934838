use crate::context::{display_identity, RequestContext, ANONYMOUS};
use crate::encode::LogValue;
use crate::record::LogEvent;

/// Adds `username` and `remote_addr` of the in-flight request to an event.
///
/// Both fall back to `"-"` when there is no request, no authenticated user
/// or no `REMOTE_ADDR` metadata. The filter never drops an event.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestFilter;

impl RequestFilter {
    pub fn filter(&self, event: &mut LogEvent, request: Option<&RequestContext>) -> bool {
        let (username, remote_addr) = match request {
            Some(request) => (request.display_username(), request.remote_addr()),
            None => (display_identity(None), LogValue::from(ANONYMOUS)),
        };
        event.extras.username = Some(LogValue::Str(username));
        event.extras.remote_addr = Some(remote_addr);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::User;
    use crate::record::Level;

    fn extras(event: &LogEvent) -> (Option<&str>, Option<&str>) {
        (
            event.extras.username.as_ref().and_then(LogValue::as_str),
            event.extras.remote_addr.as_ref().and_then(LogValue::as_str),
        )
    }

    #[test]
    fn authenticated_request_fills_identity() {
        let request = RequestContext::new("GET", "/")
            .with_user(User::authenticated("alice"))
            .with_meta("REMOTE_ADDR", "10.0.0.1");
        let mut event = LogEvent::new(Level::Info, "hello");

        assert!(RequestFilter.filter(&mut event, Some(&request)));
        assert_eq!(extras(&event), (Some("alice"), Some("10.0.0.1")));
    }

    #[test]
    fn anonymous_or_missing_request_uses_placeholders() {
        let request = RequestContext::new("GET", "/").with_user(User::anonymous());
        let mut event = LogEvent::new(Level::Info, "hello");
        RequestFilter.filter(&mut event, Some(&request));
        assert_eq!(extras(&event), (Some("-"), Some("-")));

        let mut event = LogEvent::new(Level::Info, "hello");
        RequestFilter.filter(&mut event, None);
        assert_eq!(extras(&event), (Some("-"), Some("-")));
    }
}
