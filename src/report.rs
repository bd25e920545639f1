//! Run reports.
//!
//! A [`RunReport`] is the serializable record of one pass through the
//! machine: where it ended, why it failed if it did, and the full phase
//! history. Reports can be written as JSON for people or as bincode for
//! compact storage, and are version-checked on the way back in.

use crate::core::{Phase, PhaseHistory};
use crate::machine::SessionContext;
use crate::transport::{Protocol, Role, SocketApi};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Format version written into every report.
pub const REPORT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    #[error("Unsupported report version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub version: u32,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub role: Role,
    pub protocol: Protocol,
    pub final_phase: Phase,
    pub exit_code: i32,
    /// Phase that produced the failure, if any.
    pub failure_origin: Option<Phase>,
    /// Stable error identifier, e.g. `"PeerClosed"`.
    pub failure_kind: Option<String>,
    /// Human-readable error message.
    pub failure: Option<String>,
    pub exchanges: u64,
    pub history: PhaseHistory,
}

impl RunReport {
    pub fn new<A: SocketApi>(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        role: Role,
        protocol: Protocol,
        final_phase: Phase,
        context: &SessionContext<A>,
        history: PhaseHistory,
    ) -> Self {
        Self {
            version: REPORT_VERSION,
            run_id,
            started_at,
            finished_at: Utc::now(),
            role,
            protocol,
            final_phase,
            exit_code: context.exit_code(),
            failure_origin: context.failure_origin(),
            failure_kind: context.failure().map(|e| e.kind().to_string()),
            failure: context.failure().map(|e| e.to_string()),
            exchanges: context.exchanges(),
            history,
        }
    }

    /// `true` when the run ended in `Terminated` with exit code 0.
    pub fn succeeded(&self) -> bool {
        self.final_phase == Phase::Terminated && self.exit_code == 0
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        serde_json::to_string_pretty(self).map_err(|e| ReportError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        let report: Self =
            serde_json::from_str(json).map_err(|e| ReportError::Deserialization(e.to_string()))?;
        report.check_version()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ReportError> {
        bincode::serialize(self).map_err(|e| ReportError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReportError> {
        let report: Self =
            bincode::deserialize(bytes).map_err(|e| ReportError::Deserialization(e.to_string()))?;
        report.check_version()
    }

    fn check_version(self) -> Result<Self, ReportError> {
        if self.version != REPORT_VERSION {
            return Err(ReportError::UnsupportedVersion {
                found: self.version,
                supported: REPORT_VERSION,
            });
        }
        Ok(self)
    }
}
