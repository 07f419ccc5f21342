use serde::{Deserialize, Serialize};

use wms_reservations::ReservationId;

/// Why a line could not be reserved or committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFailure {
    pub line_no: u32,
    /// Stable error code (`insufficient_available`, `reservation_expired`, ...).
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LineResult {
    /// The reservation was committed and shipped as ledger entry `entry_sequence`.
    Committed { entry_sequence: u64 },
    /// The commit was attempted and failed.
    Failed { code: String, message: String },
    /// Not attempted; the reservation was cancelled after an earlier failure.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineOutcome {
    pub line_no: u32,
    pub reservation_id: ReservationId,
    pub result: LineResult,
}

impl LineOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self.result, LineResult::Committed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentKind {
    /// Every line committed.
    Complete,
    /// Some lines committed before a later line failed.
    Partial,
    /// No line committed.
    Failed,
}

/// Per-line account of one fulfilment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentReport {
    pub kind: FulfillmentKind,
    pub lines: Vec<LineOutcome>,
}

impl FulfillmentReport {
    pub fn from_outcomes(lines: Vec<LineOutcome>) -> Self {
        let committed = lines.iter().filter(|l| l.is_committed()).count();
        let kind = if !lines.is_empty() && committed == lines.len() {
            FulfillmentKind::Complete
        } else if committed > 0 {
            FulfillmentKind::Partial
        } else {
            FulfillmentKind::Failed
        };
        Self { kind, lines }
    }

    pub fn committed(&self) -> impl Iterator<Item = &LineOutcome> {
        self.lines.iter().filter(|l| l.is_committed())
    }

    /// The first line that failed, if any.
    pub fn first_failure(&self) -> Option<LineFailure> {
        self.lines.iter().find_map(|l| match &l.result {
            LineResult::Failed { code, message } => Some(LineFailure {
                line_no: l.line_no,
                code: code.clone(),
                message: message.clone(),
            }),
            _ => None,
        })
    }
}
