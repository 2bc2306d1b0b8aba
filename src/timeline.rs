//! Order status model and delivery progress timeline.
//!
//! Order status strings arrive from the platform API in SCREAMING_SNAKE form.
//! They are parsed into the closed `OrderStatus` enum once, at the repository
//! boundary, so every downstream match is exhaustive. The timeline maps a
//! status onto a fixed six-stage sequence for the progress bar.

use serde::{Deserialize, Serialize};

/// Closed set of order statuses reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    NeedsVerification,
    Verified,
    Assigned,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Parse a server status string. Unknown values are an error — a silent
    /// default would mask contract drift between app and backend.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim() {
            "PENDING" => Ok(Self::Pending),
            "NEEDS_VERIFICATION" => Ok(Self::NeedsVerification),
            "VERIFIED" => Ok(Self::Verified),
            "ASSIGNED" => Ok(Self::Assigned),
            "OUT_FOR_DELIVERY" => Ok(Self::OutForDelivery),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("Unknown order status: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::NeedsVerification => "NEEDS_VERIFICATION",
            Self::Verified => "VERIFIED",
            Self::Assigned => "ASSIGNED",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// An order still counts against the executive's day (blocks end-day)
    /// while it is assigned or out for delivery.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Assigned | Self::OutForDelivery)
    }

    /// Statuses upstream of assignment that may still land on this executive.
    pub fn is_pending_assignment(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::NeedsVerification | Self::Verified
        )
    }
}

/// The six stages of the delivery progress bar, in display order.
pub const DELIVERY_STAGES: [OrderStatus; 6] = [
    OrderStatus::NeedsVerification,
    OrderStatus::Pending,
    OrderStatus::Verified,
    OrderStatus::Assigned,
    OrderStatus::OutForDelivery,
    OrderStatus::Delivered,
];

/// Sentinel index for cancelled orders — outside the stage sequence.
pub const CANCELLED_INDEX: i32 = -1;

/// Visual state of a single stage marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Completed,
    Pending,
}

/// Map a status onto its position in the stage sequence (0..5).
/// CANCELLED yields the sentinel −1.
pub fn timeline_index(status: OrderStatus) -> i32 {
    DELIVERY_STAGES
        .iter()
        .position(|s| *s == status)
        .map(|i| i as i32)
        .unwrap_or(CANCELLED_INDEX)
}

/// Progress-line fill width in percent. Cancelled orders show no fill.
pub fn fill_percent(status: OrderStatus) -> f64 {
    let idx = timeline_index(status);
    if idx < 0 {
        return 0.0;
    }
    (idx as f64 / (DELIVERY_STAGES.len() - 1) as f64) * 100.0
}

/// Per-stage marker states for the current status. Stages at or before the
/// current index render completed; later stages render pending. Cancelled
/// orders render every marker pending.
pub fn stage_states(status: OrderStatus) -> [StageState; 6] {
    let current = timeline_index(status);
    let mut states = [StageState::Pending; 6];
    if current >= 0 {
        for (i, state) in states.iter_mut().enumerate() {
            if (i as i32) <= current {
                *state = StageState::Completed;
            }
        }
    }
    states
}

/// JSON shape consumed by the progress bar component.
pub fn timeline_json(status: OrderStatus) -> serde_json::Value {
    let states = stage_states(status);
    let stages: Vec<serde_json::Value> = DELIVERY_STAGES
        .iter()
        .zip(states.iter())
        .map(|(stage, state)| {
            serde_json::json!({
                "stage": stage.as_str(),
                "state": state,
            })
        })
        .collect();
    serde_json::json!({
        "currentIndex": timeline_index(status),
        "fillPercent": fill_percent(status),
        "cancelled": status == OrderStatus::Cancelled,
        "stages": stages,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
