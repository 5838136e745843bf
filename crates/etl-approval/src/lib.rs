//! C6 ApprovalWorkflow + C7 VersioningArchive: a generic entity approval
//! state machine, the loader materializer that turns an approved CREATE
//! request into a real `ACTIVE` loader, and the immutable archive both the
//! materializer and the workflow's UPDATE/REJECT paths write to.

mod materializer;
mod workflow;

pub use materializer::LoaderMaterializer;
pub use workflow::ApprovalWorkflow;
