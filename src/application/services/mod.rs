pub mod catalog_service;
pub mod identity_reconciler;
pub mod mutation_queue;
pub mod provenance;
pub mod relation_service;
pub mod response_service;
pub mod session_service;

pub use catalog_service::CatalogService;
pub use identity_reconciler::{IdentityReconciler, ReconcileOutcome};
pub use mutation_queue::{FlushObserver, MutationQueue, QueuePhase, QueueStatus};
pub use provenance::{ProvenanceMark, ProvenanceTracker};
pub use relation_service::RelationService;
pub use response_service::{OptimisticTracker, ResponseService};
pub use session_service::{SessionService, SharedIdentity, VisitorProfile};
