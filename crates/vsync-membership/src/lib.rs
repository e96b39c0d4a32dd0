//! # vsync-membership: Virtual-synchrony membership agreement
//!
//! Nodes observe each other through a shared state table (one row per
//! member, see `vsync-sst`) and agree on the next [`View`](vsync_view::View)
//! without a central coordinator:
//!
//! 1. A local failure detector reports a member ([`GroupMembership::suspect`]).
//! 2. Suspicions spread row to row ([`GroupMembership::propagate_suspicions`]).
//! 3. Every node proposes removal of the members it believes failed and
//!    adopts the longest change log it sees ([`GroupMembership::merge_changes`]).
//! 4. If the leader failed, the next rank takes over only once every
//!    lower-ranked failure is corroborated ([`GroupMembership::is_new_leader`]).
//! 5. The leader commits what every live member acknowledged; everyone
//!    fences the old epoch ([`GroupMembership::wedge`]).
//! 6. Each survivor derives the successor from the leader's committed log,
//!    persists it, and installs it ([`ViewManager::poll`]).
//!
//! ```ignore
//! let mut manager = ViewManager::new(view, config, ViewStore::open(path));
//! loop {
//!     match manager.poll(&mut transport, &mut table)? {
//!         PollOutcome::Pending(_) => std::thread::sleep(interval),
//!         PollOutcome::Installed(next) => table = connect(manager.layout()?)?,
//!         PollOutcome::Evicted { .. } => break,
//!     }
//! }
//! ```

mod claims;
mod config;
mod engine;
mod error;
pub mod instrumentation;
mod manager;
pub mod sim;
pub mod transport;

pub use claims::LeaderClaims;
pub use config::{MembershipConfig, WedgePolicy};
pub use engine::{GroupMembership, MergeOutcome};
pub use error::MembershipError;
pub use manager::{PollOutcome, PollStatus, ViewManager};
pub use transport::{NullTransport, Transport, TransportError};
