//! Vote session coordination for zkballot
//!
//! A [`VoteSession`] looks up the election root, asks the proof generator for
//! a proof and submits it to the vote ledger, exposing its progress as a
//! [`SessionState`].

pub mod config;
pub mod coordinator;
pub mod ledger;
pub mod roster;

pub use config::{BallotConfig, ConfigError, LedgerConfig, RosterConfig};
pub use coordinator::{FailureReason, SessionError, SessionEvent, SessionState, VoteSession};
pub use ledger::{
    classify_response, HttpLedgerClient, LedgerClient, LedgerRejection, VoteReceipt,
    VoteSubmission,
};
pub use roster::{HttpRosterService, RosterService};
