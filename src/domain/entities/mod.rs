pub mod batch;
pub mod mutation_action;
pub mod response_record;

pub use batch::{
    ActionResult, BatchRequest, BatchResponse, FlushError, FlushReport, MigrationData,
    MigrationRequest, MigrationResponse,
};
pub use mutation_action::{MutationAction, MutationKind, RelationPayload, RespondPayload};
pub use response_record::ResponseRecord;
