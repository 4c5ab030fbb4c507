//! Correlation errors
//!
//! Only protocol violations surface as errors. Missing correlation data,
//! transport failures and unreadable storage degrade to defaults and are logged.

/// Event stream broke the one-current-auction rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// `auction-init` arrived while another auction is still unfinished
    AuctionConflict { current: String, incoming: String },
    /// A request/response/end event named an auction other than the active one
    ForeignAuctionEvent {
        kind: &'static str,
        current: String,
        incoming: String,
    },
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuctionConflict { current, incoming } => write!(
                f,
                "auction-init for '{}' while auction '{}' is still unfinished",
                incoming, current
            ),
            Self::ForeignAuctionEvent {
                kind,
                current,
                incoming,
            } => write!(
                f,
                "{} for auction '{}' while auction '{}' is current",
                kind, incoming, current
            ),
        }
    }
}

impl std::error::Error for TrackerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_both_auctions() {
        let err = TrackerError::AuctionConflict {
            current: "a1".to_string(),
            incoming: "a2".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a1") && msg.contains("a2"));

        let anyhow_err: anyhow::Error = err.clone().into();
        assert_eq!(anyhow_err.downcast_ref::<TrackerError>(), Some(&err));
    }
}
