//! Domain model (IDs, money, tasks, pledges, aggregation, errors).

pub mod aggregate;
pub mod errors;
pub mod ids;
pub mod money;
pub mod pledge;
pub mod profile;
pub mod query;
pub mod task;

pub use aggregate::Contribution;
pub use errors::{ErrorKind, PledgeError, ProfileError, StoreError};
pub use ids::{IdParseError, PledgeId, TaskId, UserId};
pub use money::{Amount, InvalidAmount};
pub use pledge::{CommittedPledge, LedgerSnapshot, Pledge};
pub use profile::Profile;
pub use query::{PledgeQuery, SortBy, SortOrder, UnknownSortKey};
pub use task::{Task, TaskAggregates, TaskStatus};
