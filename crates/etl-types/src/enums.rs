use serde::{Deserialize, Serialize};

/// Coarse per-loader scheduling hint (§3, §4.4). `LoadHistory` remains the
/// authoritative per-run record; this field is never read as a source of
/// truth for whether a specific execution succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    Idle,
    Running,
    Failed,
    Paused,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Idle => "IDLE",
            LoadStatus::Running => "RUNNING",
            LoadStatus::Failed => "FAILED",
            LoadStatus::Paused => "PAUSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IDLE" => Some(LoadStatus::Idle),
            "RUNNING" => Some(LoadStatus::Running),
            "FAILED" => Some(LoadStatus::Failed),
            "PAUSED" => Some(LoadStatus::Paused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    PendingApproval,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::PendingApproval => "PENDING_APPROVAL",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING_APPROVAL" => Some(ApprovalStatus::PendingApproval),
            "APPROVED" => Some(ApprovalStatus::Approved),
            "REJECTED" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Draft,
    Active,
    Archived,
    Rejected,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Draft => "DRAFT",
            VersionStatus::Active => "ACTIVE",
            VersionStatus::Archived => "ARCHIVED",
            VersionStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(VersionStatus::Draft),
            "ACTIVE" => Some(VersionStatus::Active),
            "ARCHIVED" => Some(VersionStatus::Archived),
            "REJECTED" => Some(VersionStatus::Rejected),
            _ => None,
        }
    }
}

/// Duplicate-handling policy applied before a window's signals are ingested
/// (§4.3, §4.6, §8 S4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurgeStrategy {
    PurgeAndReload,
    FailOnDuplicate,
    SkipDuplicates,
}

impl PurgeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurgeStrategy::PurgeAndReload => "PURGE_AND_RELOAD",
            PurgeStrategy::FailOnDuplicate => "FAIL_ON_DUPLICATE",
            PurgeStrategy::SkipDuplicates => "SKIP_DUPLICATES",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PURGE_AND_RELOAD" => Some(PurgeStrategy::PurgeAndReload),
            "FAIL_ON_DUPLICATE" => Some(PurgeStrategy::FailOnDuplicate),
            "SKIP_DUPLICATES" => Some(PurgeStrategy::SkipDuplicates),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackfillJobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl BackfillJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackfillJobStatus::Pending => "PENDING",
            BackfillJobStatus::Running => "RUNNING",
            BackfillJobStatus::Success => "SUCCESS",
            BackfillJobStatus::Failed => "FAILED",
            BackfillJobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BackfillJobStatus::Pending),
            "RUNNING" => Some(BackfillJobStatus::Running),
            "SUCCESS" => Some(BackfillJobStatus::Success),
            "FAILED" => Some(BackfillJobStatus::Failed),
            "CANCELLED" => Some(BackfillJobStatus::Cancelled),
            _ => None,
        }
    }

    /// Active in the sense §4.6 uses it for the `>5` active-jobs-per-loader cap.
    pub fn is_active(&self) -> bool {
        matches!(self, BackfillJobStatus::Pending | BackfillJobStatus::Running)
    }
}

/// Generic-workflow entity tag (§4.5, §9). Only `Loader` has a materializer
/// in this core; the others are reified so the workflow dispatch stays
/// tag-driven rather than hard-coded to one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Loader,
    Dashboard,
    Incident,
    Chart,
    AlertRule,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Loader => "LOADER",
            EntityType::Dashboard => "DASHBOARD",
            EntityType::Incident => "INCIDENT",
            EntityType::Chart => "CHART",
            EntityType::AlertRule => "ALERT_RULE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOADER" => Some(EntityType::Loader),
            "DASHBOARD" => Some(EntityType::Dashboard),
            "INCIDENT" => Some(EntityType::Incident),
            "CHART" => Some(EntityType::Chart),
            "ALERT_RULE" => Some(EntityType::AlertRule),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalActionType {
    Submit,
    Approve,
    Reject,
    Resubmit,
    Revoke,
}

impl ApprovalActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalActionType::Submit => "SUBMIT",
            ApprovalActionType::Approve => "APPROVE",
            ApprovalActionType::Reject => "REJECT",
            ApprovalActionType::Resubmit => "RESUBMIT",
            ApprovalActionType::Revoke => "REVOKE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DbType {
    Mysql,
    Postgresql,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Mysql => "MYSQL",
            DbType::Postgresql => "POSTGRESQL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MYSQL" => Some(DbType::Mysql),
            "POSTGRESQL" => Some(DbType::Postgresql),
            _ => None,
        }
    }
}

/// Kind of gap the scanner found (§4.6), carried into the synthetic
/// `requestedBy` tag (`SYSTEM_GAP_SCANNER_<kind>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GapKind {
    StartGap,
    EndGap,
    TimelineGap,
}

impl GapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapKind::StartGap => "START_GAP",
            GapKind::EndGap => "END_GAP",
            GapKind::TimelineGap => "TIMELINE_GAP",
        }
    }

    pub fn requested_by_tag(&self) -> String {
        format!("SYSTEM_GAP_SCANNER_{}", self.as_str())
    }
}
