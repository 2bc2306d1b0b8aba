//! OTP-gated delivery handover.
//!
//! Completing a delivery is a two-phase protocol: the executive initiates the
//! handover (the platform sends a one-time code to the recipient out of
//! band), then submits the 6-digit code the recipient reads back. The order
//! only transitions to DELIVERED server-side, on successful verification.
//!
//! At most one handover can be pending at a time. Starting a handover for a
//! different order replaces the prior attempt locally; the platform expects
//! no abort call for abandoned codes.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::{info, warn};

/// Required code length — the platform issues 6-digit numeric codes.
pub const OTP_LENGTH: usize = 6;

/// Keep only digits and cap at [`OTP_LENGTH`]. Applied as the user types, so
/// pasted text like "123-456" or "code: 987654" collapses to the digits.
pub fn sanitize_otp_input(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit())
        .take(OTP_LENGTH)
        .collect()
}

/// The submit button is enabled only for a complete sanitized code.
pub fn is_submittable(code: &str) -> bool {
    code.len() == OTP_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}

/// A pending handover attempt, scoped to exactly one order.
#[derive(Debug, Clone)]
pub struct PendingHandover {
    pub order_id: String,
    pub initiated_at: DateTime<Utc>,
}

/// Tauri managed state tracking the single pending handover.
pub struct OtpState {
    pending: Mutex<Option<PendingHandover>>,
}

impl OtpState {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
        }
    }

    /// Register a new pending handover. A prior attempt for another order is
    /// discarded silently — the stale code simply never gets submitted.
    pub fn begin(&self, order_id: &str) -> PendingHandover {
        let mut pending = self.pending.lock().unwrap();
        if let Some(prior) = pending.as_ref() {
            if prior.order_id != order_id {
                warn!(
                    prior_order_id = %prior.order_id,
                    order_id = %order_id,
                    "discarding pending handover in favour of a new one"
                );
            }
        }
        let attempt = PendingHandover {
            order_id: order_id.to_string(),
            initiated_at: Utc::now(),
        };
        *pending = Some(attempt.clone());
        info!(order_id = %order_id, "handover initiated, awaiting OTP");
        attempt
    }

    /// The currently pending handover, if any.
    pub fn current(&self) -> Option<PendingHandover> {
        self.pending.lock().unwrap().clone()
    }

    /// Verify that `order_id` matches the pending handover. Submissions for
    /// an order with no pending attempt are rejected before any network call.
    pub fn require_pending(&self, order_id: &str) -> Result<PendingHandover, String> {
        match self.current() {
            Some(p) if p.order_id == order_id => Ok(p),
            Some(p) => Err(format!(
                "A handover is pending for a different order ({})",
                p.order_id
            )),
            None => Err("No handover has been initiated for this order".to_string()),
        }
    }

    /// Drop the pending handover (on success or explicit dismissal).
    pub fn clear(&self) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(p) = pending.take() {
            info!(order_id = %p.order_id, "pending handover cleared");
        }
    }
}

impl Default for OtpState {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a code before it is sent to the verify endpoint.
pub fn check_code(code: &str) -> Result<(), String> {
    let sanitized = sanitize_otp_input(code);
    if sanitized != code {
        return Err("OTP must contain digits only".to_string());
    }
    if !is_submittable(code) {
        return Err(format!("OTP must be exactly {OTP_LENGTH} digits"));
    }
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_non_digits() {
        assert_eq!(sanitize_otp_input("12a3-45b"), "12345");
        assert_eq!(sanitize_otp_input("code: 987654"), "987654");
        assert_eq!(sanitize_otp_input(""), "");
    }

    #[test]
    fn sanitize_truncates_past_six_digits() {
        assert_eq!(sanitize_otp_input("1234567890"), "123456");
    }

    #[test]
    fn submittable_requires_exactly_six_digits() {
        assert!(is_submittable("123456"));
        assert!(!is_submittable("12345"));
        assert!(!is_submittable("1234567"));
        assert!(!is_submittable("12345a"));
        assert!(!is_submittable(""));
    }

    #[test]
    fn check_code_rejects_unsanitized_input() {
        assert!(check_code("123456").is_ok());
        assert!(check_code("123-456").is_err());
        assert!(check_code("1234").is_err());
    }

    #[test]
    fn begin_replaces_prior_pending_attempt() {
        let state = OtpState::new();
        state.begin("ord-1");
        assert_eq!(state.current().unwrap().order_id, "ord-1");

        state.begin("ord-2");
        let current = state.current().unwrap();
        assert_eq!(current.order_id, "ord-2");

        // The stale attempt is gone: submissions against ord-1 are rejected
        assert!(state.require_pending("ord-1").is_err());
        assert!(state.require_pending("ord-2").is_ok());
    }

    #[test]
    fn require_pending_without_initiate_fails() {
        let state = OtpState::new();
        let err = state.require_pending("ord-9").unwrap_err();
        assert!(err.contains("No handover"));
    }

    #[test]
    fn clear_drops_the_session() {
        let state = OtpState::new();
        state.begin("ord-1");
        state.clear();
        assert!(state.current().is_none());
    }
}
