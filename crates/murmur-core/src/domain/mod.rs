//! Domain model: commands, results, classification and routing.

pub mod command;
pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod result;
pub mod state;

pub use command::{Command, CommandKey, CommandKind, RelationshipAction, TimelineType};
pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::{BackendError, ErrorKind, Severity};
pub use events::EngineEvent;
pub use ids::{AccountId, CommandId, Id, IdMarker, ItemId, OriginId};
pub use result::{CommandResult, ErrorState, INITIAL_RETRIES, NewItemCounts};
pub use state::SchedulerState;
