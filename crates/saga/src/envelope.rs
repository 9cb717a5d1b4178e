//! Message envelopes exchanged between the order and payment services.

use common::CorrelationId;
use serde::{Deserialize, Serialize};

/// What the receiver of an envelope is asked to do, or what happened.
///
/// Unrecognised tags decode to [`Action::Unknown`] so that newer
/// producers cannot break the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Begin the payment step for an order.
    Start,

    /// The payment step succeeded.
    #[serde(alias = "DoneMsg")]
    Done,

    /// The payment step failed; the order must be compensated.
    #[serde(alias = "ErrorMsg")]
    Error,

    /// Any tag this version does not understand.
    #[serde(other)]
    Unknown,
}

impl Action {
    /// Returns the action tag as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "Start",
            Action::Done => "Done",
            Action::Error => "Error",
            Action::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The service an envelope is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    #[serde(alias = "ServicePayment")]
    Payment,

    #[serde(alias = "ServiceOrder")]
    Order,

    #[serde(other)]
    Unknown,
}

/// The order being acted upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// The order key.
    pub name: String,
    /// The order amount.
    pub amount: u64,
}

/// A single saga message.
///
/// Wire format:
/// ```json
/// {"id": "...", "service": "Payment", "action": "Start", "message": {"name": "alice", "amount": 100}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Identifies the saga attempt this message belongs to.
    #[serde(rename = "id")]
    pub correlation_id: CorrelationId,
    /// Target service.
    pub service: Service,
    /// Action tag.
    pub action: Action,
    /// Order key and amount.
    #[serde(rename = "message")]
    pub payload: Purchase,
}

impl Envelope {
    /// Creates an envelope with the given fields.
    pub fn new(
        correlation_id: CorrelationId,
        service: Service,
        action: Action,
        key: impl Into<String>,
        amount: u64,
    ) -> Self {
        Self {
            correlation_id,
            service,
            action,
            payload: Purchase {
                name: key.into(),
                amount,
            },
        }
    }

    /// Creates a Start envelope addressed to the payment service.
    pub fn start(correlation_id: CorrelationId, key: impl Into<String>, amount: u64) -> Self {
        Self::new(correlation_id, Service::Payment, Action::Start, key, amount)
    }

    /// Creates a Done reply addressed to the order service.
    pub fn done(correlation_id: CorrelationId, key: impl Into<String>, amount: u64) -> Self {
        Self::new(correlation_id, Service::Order, Action::Done, key, amount)
    }

    /// Creates an Error reply addressed to the order service.
    pub fn error(correlation_id: CorrelationId, key: impl Into<String>, amount: u64) -> Self {
        Self::new(correlation_id, Service::Order, Action::Error, key, amount)
    }

    /// Returns the order key this envelope refers to.
    pub fn key(&self) -> &str {
        &self.payload.name
    }

    /// Returns the order amount carried by this envelope.
    pub fn amount(&self) -> u64 {
        self.payload.amount
    }

    /// Decodes an envelope from a JSON message body.
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Encodes the envelope as a JSON message body.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
