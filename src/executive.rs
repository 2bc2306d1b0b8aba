//! Executive status model and the day-cycle state machine.
//!
//! The executive's status is owned by the platform. The client derives a
//! status message and the set of available actions from the reported status
//! and the current order counts, POSTs the chosen action, and refetches —
//! there is no optimistic local transition anywhere in this module.

use serde_json::Value;

/// Closed set of executive statuses reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutiveStatus {
    NotVerified,
    Inactive,
    Available,
    Unavailable,
    ManuallyUnavailable,
}

impl ExecutiveStatus {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim() {
            "NOT_VERIFIED" => Ok(Self::NotVerified),
            "INACTIVE" => Ok(Self::Inactive),
            "AVAILABLE" => Ok(Self::Available),
            "UNAVAILABLE" => Ok(Self::Unavailable),
            "MANUALLY_UNAVAILABLE" => Ok(Self::ManuallyUnavailable),
            other => Err(format!("Unknown executive status: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotVerified => "NOT_VERIFIED",
            Self::Inactive => "INACTIVE",
            Self::Available => "AVAILABLE",
            Self::Unavailable => "UNAVAILABLE",
            Self::ManuallyUnavailable => "MANUALLY_UNAVAILABLE",
        }
    }

    /// On-duty statuses: the executive has started a day that can be ended.
    pub fn is_on_duty(&self) -> bool {
        matches!(
            self,
            Self::Available | Self::Unavailable | Self::ManuallyUnavailable
        )
    }
}

/// Client-initiated day-cycle actions. Each maps to a POST endpoint under
/// `/api/executives/{id}/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutiveAction {
    StartDay,
    MarkUnavailable,
    EndDay,
}

impl ExecutiveAction {
    pub fn endpoint_segment(&self) -> &'static str {
        match self {
            Self::StartDay => "start-day",
            Self::MarkUnavailable => "mark-unavailable",
            Self::EndDay => "end-day",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::StartDay => "Start My Day",
            Self::MarkUnavailable => "Mark Unavailable",
            Self::EndDay => "End My Day",
        }
    }
}

/// What the dashboard renders for a given status: a message, zero or one
/// primary action button, and the end-day button gate.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub message: String,
    pub primary_action: Option<ExecutiveAction>,
    pub can_end_day: bool,
}

const ORDERS_BLOCK_END_DAY: &str =
    " Complete your active and pending orders before ending your day.";

/// Derive the dashboard view from the server-reported status and order
/// counts. Pure — the caller supplies counts from the order repository.
pub fn status_view(
    status: ExecutiveStatus,
    active_orders: usize,
    pending_orders: usize,
) -> StatusView {
    let has_orders = active_orders + pending_orders > 0;

    let (message, primary_action) = match status {
        ExecutiveStatus::NotVerified => (
            "Your account is pending verification. You can start your day once our team \
             approves your documents."
                .to_string(),
            None,
        ),
        ExecutiveStatus::Inactive => (
            "You are off duty. Start your day to begin receiving delivery assignments."
                .to_string(),
            Some(ExecutiveAction::StartDay),
        ),
        ExecutiveStatus::Available => (
            "You are online and visible for new delivery assignments.".to_string(),
            Some(ExecutiveAction::MarkUnavailable),
        ),
        ExecutiveStatus::Unavailable => (
            "You are at capacity. New assignments are paused until your current order is \
             handed over."
                .to_string(),
            None,
        ),
        ExecutiveStatus::ManuallyUnavailable => (
            "You are marked unavailable. Start your day again to resume receiving \
             assignments."
                .to_string(),
            Some(ExecutiveAction::StartDay),
        ),
    };

    let can_end_day = status.is_on_duty() && !has_orders;
    let message = if status.is_on_duty() && has_orders {
        format!("{message}{ORDERS_BLOCK_END_DAY}")
    } else {
        message
    };

    StatusView {
        message,
        primary_action,
        can_end_day,
    }
}

/// Guard a client-initiated action against the current status and order
/// counts before it is sent to the server. The server re-validates; this
/// keeps rejected requests (and their toasts) off the happy path.
pub fn check_action(
    action: ExecutiveAction,
    status: ExecutiveStatus,
    active_orders: usize,
    pending_orders: usize,
) -> Result<(), String> {
    match action {
        ExecutiveAction::StartDay => match status {
            ExecutiveStatus::Inactive | ExecutiveStatus::ManuallyUnavailable => Ok(()),
            ExecutiveStatus::NotVerified => {
                Err("Account is not verified yet".to_string())
            }
            other => Err(format!(
                "Cannot start day while status is {}",
                other.as_str()
            )),
        },
        ExecutiveAction::MarkUnavailable => match status {
            ExecutiveStatus::Available | ExecutiveStatus::Unavailable => Ok(()),
            other => Err(format!(
                "Cannot mark unavailable while status is {}",
                other.as_str()
            )),
        },
        ExecutiveAction::EndDay => {
            if !status.is_on_duty() {
                return Err(format!(
                    "Cannot end day while status is {}",
                    status.as_str()
                ));
            }
            if active_orders + pending_orders > 0 {
                return Err(
                    "Cannot end day with active or pending orders".to_string()
                );
            }
            Ok(())
        }
    }
}

/// Extract the status field from a raw executive profile JSON.
pub fn status_from_profile(profile: &Value) -> Result<ExecutiveStatus, String> {
    let raw = profile
        .get("status")
        .and_then(Value::as_str)
        .ok_or("Executive profile is missing a status")?;
    ExecutiveStatus::parse(raw)
}

/// JSON shape the dashboard consumes.
pub fn status_view_json(view: &StatusView) -> Value {
    serde_json::json!({
        "message": view.message,
        "primaryAction": view.primary_action.map(|a| serde_json::json!({
            "action": a.endpoint_segment(),
            "label": a.label(),
        })),
        "canEndDay": view.can_end_day,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_status() {
        for raw in [
            "NOT_VERIFIED",
            "INACTIVE",
            "AVAILABLE",
            "UNAVAILABLE",
            "MANUALLY_UNAVAILABLE",
        ] {
            assert_eq!(ExecutiveStatus::parse(raw).unwrap().as_str(), raw);
        }
        assert!(ExecutiveStatus::parse("ON_BREAK").is_err());
    }

    #[test]
    fn inactive_with_no_orders_offers_only_start_day() {
        let view = status_view(ExecutiveStatus::Inactive, 0, 0);
        assert_eq!(view.primary_action, Some(ExecutiveAction::StartDay));
        assert!(!view.can_end_day, "off-duty executives have no day to end");
        assert!(!view.message.contains("active and pending orders"));
    }

    #[test]
    fn available_with_active_order_suppresses_end_day_and_qualifies_message() {
        let view = status_view(ExecutiveStatus::Available, 1, 0);
        assert!(!view.can_end_day);
        assert!(view.message.ends_with(ORDERS_BLOCK_END_DAY.trim_start()));
        // The primary action is unaffected by order counts
        assert_eq!(view.primary_action, Some(ExecutiveAction::MarkUnavailable));
    }

    #[test]
    fn available_with_no_orders_can_end_day() {
        let view = status_view(ExecutiveStatus::Available, 0, 0);
        assert!(view.can_end_day);
    }

    #[test]
    fn pending_orders_also_block_end_day() {
        let view = status_view(ExecutiveStatus::ManuallyUnavailable, 0, 2);
        assert!(!view.can_end_day);
    }

    #[test]
    fn capacity_unavailable_is_read_only() {
        let view = status_view(ExecutiveStatus::Unavailable, 1, 0);
        assert_eq!(view.primary_action, None);
    }

    #[test]
    fn not_verified_has_no_actions() {
        let view = status_view(ExecutiveStatus::NotVerified, 0, 0);
        assert_eq!(view.primary_action, None);
        assert!(!view.can_end_day);
    }

    #[test]
    fn check_action_covers_the_declared_transitions() {
        use ExecutiveAction::*;
        use ExecutiveStatus::*;

        assert!(check_action(StartDay, Inactive, 0, 0).is_ok());
        assert!(check_action(StartDay, ManuallyUnavailable, 0, 0).is_ok());
        assert!(check_action(StartDay, Available, 0, 0).is_err());
        assert!(check_action(StartDay, NotVerified, 0, 0).is_err());

        assert!(check_action(MarkUnavailable, Available, 0, 0).is_ok());
        assert!(check_action(MarkUnavailable, Unavailable, 0, 0).is_ok());
        assert!(check_action(MarkUnavailable, Inactive, 0, 0).is_err());

        assert!(check_action(EndDay, Available, 0, 0).is_ok());
        assert!(check_action(EndDay, Available, 1, 0).is_err());
        assert!(check_action(EndDay, Available, 0, 1).is_err());
        assert!(check_action(EndDay, Inactive, 0, 0).is_err());
    }

    #[test]
    fn status_view_json_shape() {
        let json = status_view_json(&status_view(ExecutiveStatus::Inactive, 0, 0));
        assert_eq!(json["primaryAction"]["action"], "start-day");
        assert_eq!(json["primaryAction"]["label"], "Start My Day");
        assert_eq!(json["canEndDay"], false);

        let json = status_view_json(&status_view(ExecutiveStatus::Unavailable, 0, 0));
        assert!(json["primaryAction"].is_null());
    }
}
