//! Notification dispatch.
//!
//! Turns inbound push payloads into displayable notification descriptors
//! and routes user interactions back to the application. The host runtime
//! owns the actual display and window management; this module only decides
//! what to show and what an interaction means.

use serde::{Deserialize, Serialize};

const DEFAULT_TITLE: &str = "Fairway";
const DEFAULT_BODY: &str = "You have new activity in Fairway.";
const NOTIFICATION_ICON: &str = "/icons/icon-192.png";
const VIBRATION_PATTERN: &[u32] = &[100, 50, 100];

/// Route opened when the user taps "view".
pub const ENTRY_ROUTE: &str = "/";

pub const ACTION_VIEW: &str = "view";
pub const ACTION_CLOSE: &str = "close";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Everything the host needs to display one notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSpec {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub vibration: Vec<u32>,
    pub actions: Vec<NotificationAction>,
}

/// Structured push payloads; anything else is treated as plain text.
#[derive(Debug, Deserialize)]
struct PushMessage {
    title: Option<String>,
    body: Option<String>,
}

/// Build a notification descriptor from an inbound push payload.
///
/// The payload is tried as JSON `{title, body}` first; bare text becomes
/// the body; an absent or empty payload falls back to the default message.
pub fn build_notification(payload: Option<&str>) -> NotificationSpec {
    let (title, body) = match payload {
        Some(text) if !text.trim().is_empty() => match serde_json::from_str::<PushMessage>(text) {
            Ok(message) => (
                message.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
                message.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            ),
            Err(_) => (DEFAULT_TITLE.to_string(), text.trim().to_string()),
        },
        _ => (DEFAULT_TITLE.to_string(), DEFAULT_BODY.to_string()),
    };

    NotificationSpec {
        title,
        body,
        icon: NOTIFICATION_ICON.to_string(),
        vibration: VIBRATION_PATTERN.to_vec(),
        actions: vec![
            NotificationAction {
                action: ACTION_VIEW.to_string(),
                title: "View".to_string(),
            },
            NotificationAction {
                action: ACTION_CLOSE.to_string(),
                title: "Close".to_string(),
            },
        ],
    }
}

/// What the host should do after a notification interaction. The
/// notification itself is always closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionOutcome {
    /// Open (or focus) the application at the given route
    OpenApp { url: String },
    /// Close the notification and do nothing else
    Dismiss,
}

/// Route one user interaction. Only "view" opens the application; "close"
/// and unknown actions dismiss.
pub fn handle_interaction(action: &str) -> InteractionOutcome {
    if action == ACTION_VIEW {
        InteractionOutcome::OpenApp {
            url: ENTRY_ROUTE.to_string(),
        }
    } else {
        InteractionOutcome::Dismiss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_payload() {
        let spec = build_notification(Some(r#"{"title":"New buddy","body":"Sam wants to play"}"#));
        assert_eq!(spec.title, "New buddy");
        assert_eq!(spec.body, "Sam wants to play");
    }

    #[test]
    fn test_partial_payload_uses_defaults() {
        let spec = build_notification(Some(r#"{"body":"Tee time at 9"}"#));
        assert_eq!(spec.title, DEFAULT_TITLE);
        assert_eq!(spec.body, "Tee time at 9");
    }

    #[test]
    fn test_plain_text_payload_becomes_body() {
        let spec = build_notification(Some("Round saved"));
        assert_eq!(spec.title, DEFAULT_TITLE);
        assert_eq!(spec.body, "Round saved");
    }

    #[test]
    fn test_missing_or_blank_payload_falls_back() {
        assert_eq!(build_notification(None).body, DEFAULT_BODY);
        assert_eq!(build_notification(Some("   ")).body, DEFAULT_BODY);
    }

    #[test]
    fn test_actions_are_exactly_view_and_close() {
        let spec = build_notification(None);
        let actions: Vec<&str> = spec.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec![ACTION_VIEW, ACTION_CLOSE]);
    }

    #[test]
    fn test_view_opens_the_entry_route() {
        assert_eq!(
            handle_interaction("view"),
            InteractionOutcome::OpenApp { url: "/".to_string() }
        );
    }

    #[test]
    fn test_other_actions_dismiss() {
        assert_eq!(handle_interaction("close"), InteractionOutcome::Dismiss);
        assert_eq!(handle_interaction("snooze"), InteractionOutcome::Dismiss);
        assert_eq!(handle_interaction(""), InteractionOutcome::Dismiss);
    }
}
