pub mod identifiers;
pub mod identity;
pub mod response_value;

pub use identifiers::{ActionId, EventId, RecordId, RelationId, UserId};
pub use identity::Identity;
pub use response_value::{InitialResponse, Provenance, ResponseValue};
