//! Trace context derived from delivery headers.

use serde::{Deserialize, Serialize};

use crate::delivery::{Delivery, headers};

/// Per-message observability metadata.
///
/// Every field is optional: a header missing from the delivery leaves the
/// corresponding field `None` rather than failing extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub client_trace_id: Option<String>,
    pub correlation_id: Option<String>,
    pub event_type: Option<String>,
    pub client_version: Option<String>,
}

impl TraceContext {
    /// Derives the trace context of `delivery`.
    ///
    /// Headers win. Without an `x-correlation-id` header the AMQP
    /// `correlation-id` property is used, and without an `x-event-type`
    /// header the exchange name stands in for the event type.
    pub fn from_delivery(delivery: &Delivery) -> Self {
        let header = |name: &str| delivery.header(name).map(str::to_owned);

        Self {
            session_id: header(headers::SESSION_ID),
            user_id: header(headers::USER_ID),
            client_trace_id: header(headers::CLIENT_TRACE_ID),
            correlation_id: header(headers::CORRELATION_ID)
                .or_else(|| delivery.properties.correlation_id.clone()),
            event_type: header(headers::EVENT_TYPE)
                .or_else(|| (!delivery.exchange.is_empty()).then(|| delivery.exchange.clone())),
            client_version: header(headers::CLIENT_VERSION),
        }
    }
}
