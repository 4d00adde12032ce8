//! Trace context parsing.
//!
//! Decodes the W3C `traceparent` header and the vendor RUM
//! `x-rum-traceparent` header (`version-traceid-spanid-flags`) into a
//! trace/span identifier pair. Malformed input never fails: the affected
//! identifiers degrade to [`UNKNOWN`].

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const RUM_TRACEPARENT_HEADER: &str = "x-rum-traceparent";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
pub const USER_ACTION_HEADER: &str = "x-user-action";

/// Sentinel for a missing or unparseable identifier.
pub const UNKNOWN: &str = "unknown";

const TRACE_ID_LEN: usize = 32;
const SPAN_ID_LEN: usize = 16;

/// The subset of inbound request metadata the correlation layer reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    pub traceparent: Option<String>,
    pub rum_traceparent: Option<String>,
    pub correlation_id: Option<String>,
    pub user_action: Option<String>,
}

impl RequestHeaders {
    /// Build from `(name, value)` pairs. Header names match case-insensitively;
    /// unrelated headers are ignored.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut headers = Self::default();
        for (name, value) in pairs {
            let slot = match name.to_ascii_lowercase().as_str() {
                TRACEPARENT_HEADER => &mut headers.traceparent,
                RUM_TRACEPARENT_HEADER => &mut headers.rum_traceparent,
                CORRELATION_ID_HEADER => &mut headers.correlation_id,
                USER_ACTION_HEADER => &mut headers.user_action,
                _ => continue,
            };
            *slot = Some(value.trim().to_string());
        }
        headers
    }
}

/// Trace and span identifiers, each lowercase hex or [`UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceIds {
    pub trace_id: String,
    pub span_id: String,
}

impl TraceIds {
    pub fn unknown() -> Self {
        Self {
            trace_id: UNKNOWN.to_string(),
            span_id: UNKNOWN.to_string(),
        }
    }

    /// Parse trace ids from the request. The W3C header wins; the vendor
    /// header is consulted only when the W3C header yields nothing.
    pub fn from_headers(headers: &RequestHeaders) -> Self {
        [&headers.traceparent, &headers.rum_traceparent]
            .into_iter()
            .flatten()
            .find_map(|value| parse_traceparent(value))
            .unwrap_or_else(Self::unknown)
    }

    /// True when the trace id is well formed and not all zeroes.
    pub fn has_valid_trace(&self) -> bool {
        self.trace_id != UNKNOWN && self.trace_id.bytes().any(|b| b != b'0')
    }
}

/// Parse one `version-traceid-spanid-flags` value.
///
/// Returns `None` for a wrong segment count, wrong identifier width or
/// non-hex characters. Hex digits are lowercased.
pub fn parse_traceparent(value: &str) -> Option<TraceIds> {
    let parts: Vec<&str> = value.trim().split('-').collect();
    if parts.len() != 4 {
        return None;
    }

    let (version, trace_id, span_id, flags) = (parts[0], parts[1], parts[2], parts[3]);
    if !is_hex(version, 2) || !is_hex(flags, 2) {
        return None;
    }
    if !is_hex(trace_id, TRACE_ID_LEN) || !is_hex(span_id, SPAN_ID_LEN) {
        return None;
    }

    Some(TraceIds {
        trace_id: trace_id.to_ascii_lowercase(),
        span_id: span_id.to_ascii_lowercase(),
    })
}

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}
