//! Shared enums, error taxonomy, and external-collaborator traits.
//!
//! Every other crate in the workspace depends on this one and nothing else
//! upward — it is the seam the whole system is wired through, the same role
//! `mqk-schemas` plays for the teacher workspace.

mod collab;
mod enums;
mod error;

pub use collab::{EventBus, Identity, JwtValidator, MetricsSink, NoopEventBus, NoopMetricsSink};
pub use enums::{
    ApprovalActionType, ApprovalStatus, BackfillJobStatus, DbType, EntityType, GapKind,
    LoadStatus, PurgeStrategy, VersionStatus,
};
pub use error::EtlError;

pub type EtlResult<T> = Result<T, EtlError>;
