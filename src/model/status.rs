//! The order status lifecycle.
//!
//! ```text
//! received ──► paid ──► preparing ──► shipped ──► delivered
//!    │          │ │
//!    │          │ └──► refunding ──► refunded
//!    └──────────┴────► cancelled
//! ```
//!
//! `received` is the only initial state. `delivered`, `cancelled` and
//! `refunded` are terminal.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of statuses an order moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Received,
    Paid,
    Preparing,
    Shipped,
    Delivered,
    Cancelled,
    Refunding,
    Refunded,
}

/// Returned when a stored or transmitted status string is not one of the
/// known variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Received,
        OrderStatus::Paid,
        OrderStatus::Preparing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunding,
        OrderStatus::Refunded,
    ];

    /// Status every new order starts in, regardless of caller input.
    pub const INITIAL: OrderStatus = OrderStatus::Received;

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Received => "received",
            OrderStatus::Paid => "paid",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunding => "refunding",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// The adjacency table: statuses reachable in one step from `self`.
    pub fn successors(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Received => &[Paid, Cancelled],
            Paid => &[Preparing, Cancelled, Refunding],
            Preparing => &[Shipped],
            Shipped => &[Delivered],
            Refunding => &[Refunded],
            Delivered | Cancelled | Refunded => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::OrderStatus::*;

    #[test]
    fn test_happy_path_is_allowed() {
        assert!(Received.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Preparing));
        assert!(Preparing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
    }

    #[test]
    fn test_alternate_branches() {
        assert!(Received.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Refunding));
        assert!(Refunding.can_transition_to(Refunded));

        assert!(!Preparing.can_transition_to(Cancelled));
        assert!(!Received.can_transition_to(Refunding));
    }

    #[test]
    fn test_no_backwards_or_skipping_edges() {
        assert!(!Paid.can_transition_to(Received));
        assert!(!Received.can_transition_to(Shipped));
        assert!(!Delivered.can_transition_to(Refunding));
        assert!(!Paid.can_transition_to(Paid));
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = OrderStatus::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Delivered, Cancelled, Refunded]);
    }

    #[test]
    fn test_nothing_leads_back_to_initial() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(OrderStatus::INITIAL), "{status} -> received");
        }
    }

    #[test]
    fn test_parse_known_and_unknown() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert_eq!(
            "PAID".parse::<OrderStatus>(),
            Err(UnknownStatus("PAID".to_string()))
        );
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Refunding).unwrap(), "\"refunding\"");
    }
}
