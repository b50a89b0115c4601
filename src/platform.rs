//! Platform collaborators — the OS alarm scheduler and notification display.
//!
//! The reminder service talks to both through traits so the host (mobile
//! shell, desktop tray, headless daemon) decides how alarms are delivered.
//! Request identity is derived from the dose-slot id alone, which makes
//! cancel-then-reschedule idempotent: the platform replaces by identity,
//! never by content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::NOTIFICATION_CHANNEL_ID;

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Alarm scheduling failed: {0}")]
    Alarm(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),
}

// ═══════════════════════════════════════════════════════════
// Alarms
// ═══════════════════════════════════════════════════════════

/// Platform request identity of a dose slot: first four bytes of the
/// SHA-256 of its id. Also used as the notification id.
pub fn request_code(dose_id: &str) -> i32 {
    let digest = Sha256::digest(dose_id.as_bytes());
    i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmPrecision {
    Exact,
    /// Used when the host denies exact alarms; may fire late.
    Inexact,
}

/// Data handed back by the platform when an alarm fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmPayload {
    pub medicine_id: String,
    pub dose_id: String,
    pub medicine_name: String,
    pub dosage: String,
}

impl AlarmPayload {
    pub fn to_json(&self) -> Result<String, PlatformError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, PlatformError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRequest {
    pub request_code: i32,
    pub trigger_at: DateTime<Utc>,
    pub precision: AlarmPrecision,
    pub payload: AlarmPayload,
}

/// One-shot wake-up alarms. Scheduling with a request code that is already
/// pending replaces the pending alarm.
pub trait AlarmPlatform: Send + Sync {
    fn can_schedule_exact(&self) -> bool;

    fn schedule(&self, request: AlarmRequest) -> Result<(), PlatformError>;

    fn cancel(&self, request_code: i32) -> Result<(), PlatformError>;
}

// ═══════════════════════════════════════════════════════════
// Notifications
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i32,
    pub channel_id: String,
    pub title: String,
    pub body: String,
}

impl Notification {
    /// The reminder shown when a dose alarm fires.
    pub fn dose_reminder(payload: &AlarmPayload) -> Self {
        let title = if payload.medicine_name.trim().is_empty() {
            "Reminder".to_string()
        } else {
            payload.medicine_name.clone()
        };
        Self {
            id: request_code(&payload.dose_id),
            channel_id: NOTIFICATION_CHANNEL_ID.to_string(),
            title,
            body: format!("Time to take your dose: {}", payload.dosage),
        }
    }
}

/// Fire-and-forget notification display.
pub trait NotificationPlatform: Send + Sync {
    fn display(&self, notification: Notification) -> Result<(), PlatformError>;
}

// ═══════════════════════════════════════════════════════════
// Headless implementation
// ═══════════════════════════════════════════════════════════

/// Platform for hosts without an alarm service: every call is logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPlatform;

impl AlarmPlatform for TracingPlatform {
    fn can_schedule_exact(&self) -> bool {
        true
    }

    fn schedule(&self, request: AlarmRequest) -> Result<(), PlatformError> {
        let payload = request.payload.to_json()?;
        tracing::info!(
            request_code = request.request_code,
            trigger_at = %request.trigger_at,
            precision = ?request.precision,
            payload = %payload,
            "Alarm scheduled"
        );
        Ok(())
    }

    fn cancel(&self, request_code: i32) -> Result<(), PlatformError> {
        tracing::debug!(request_code, "Alarm cancelled");
        Ok(())
    }
}

impl NotificationPlatform for TracingPlatform {
    fn display(&self, notification: Notification) -> Result<(), PlatformError> {
        tracing::info!(
            id = notification.id,
            channel = %notification.channel_id,
            title = %notification.title,
            body = %notification.body,
            "Notification displayed"
        );
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Test double
// ═══════════════════════════════════════════════════════════
