//! Per-request execution state.
//!
//! One [`ExecutionSession`] is created per analysis request and shared by
//! every concurrent role invocation of that request. Role statuses live in a
//! sharded map so roles writing their own keys never contend.

use crate::firewall::VerificationResult;
use crate::types::{Depth, RoleStatus, Style};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use uuid::Uuid;

/// One dual-model review, recorded by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossValidationRecord {
    pub role_id: String,
    pub consistent: bool,
    pub confidence: crate::types::Grade,
    pub primary_model: String,
    pub secondary_model: String,
}

/// Corrections applied to one role's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionRecord {
    pub role_id: String,
    pub corrections: Vec<String>,
}

#[derive(Debug)]
pub struct ExecutionSession {
    pub id: Uuid,
    pub raw_input: String,
    pub depth: Depth,
    pub style: Style,
    /// Pre-validation clause built from the search and triangulation firewalls.
    pub constraint_clause: Option<String>,
    pub started_at: DateTime<Utc>,
    role_statuses: DashMap<String, RoleStatus>,
    verification: Mutex<Vec<VerificationResult>>,
    cross_validations: Mutex<Vec<CrossValidationRecord>>,
    corrections: Mutex<Vec<CorrectionRecord>>,
}

impl ExecutionSession {
    pub fn new(raw_input: impl Into<String>, depth: Depth, style: Style) -> Self {
        Self {
            id: Uuid::new_v4(),
            raw_input: raw_input.into(),
            depth,
            style,
            constraint_clause: None,
            started_at: Utc::now(),
            role_statuses: DashMap::new(),
            verification: Mutex::new(Vec::new()),
            cross_validations: Mutex::new(Vec::new()),
            corrections: Mutex::new(Vec::new()),
        }
    }

    pub fn with_constraint_clause(mut self, clause: Option<String>) -> Self {
        self.constraint_clause = clause;
        self
    }

    pub fn set_status(&self, role_id: &str, status: RoleStatus) {
        self.role_statuses.insert(role_id.to_string(), status);
    }

    pub fn status(&self, role_id: &str) -> Option<RoleStatus> {
        self.role_statuses.get(role_id).map(|s| s.clone())
    }

    /// Point-in-time copy of every role status, ordered by role id.
    pub fn status_snapshot(&self) -> BTreeMap<String, RoleStatus> {
        self.role_statuses
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn push_verification(&self, result: VerificationResult) {
        self.verification
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(result);
    }

    pub fn verification(&self) -> Vec<VerificationResult> {
        self.verification
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn record_cross_validation(&self, record: CrossValidationRecord) {
        self.cross_validations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(record);
    }

    pub fn cross_validations(&self) -> Vec<CrossValidationRecord> {
        self.cross_validations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn record_correction(&self, record: CorrectionRecord) {
        self.corrections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(record);
    }

    pub fn corrections(&self) -> Vec<CorrectionRecord> {
        self.corrections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Forget cross-validation and correction records. Role statuses stay.
    pub fn clear_reviews(&self) {
        self.cross_validations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        self.corrections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}
