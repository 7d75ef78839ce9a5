//! Capabilities the engine consumes from excluded collaborators:
//! decrypted per-user provider secrets and the entitlement check.

use chrono::{DateTime, Utc};

/// Decrypt-on-read access to a user's provider credentials. All
/// accessors return `None` for "not configured" and never fail.
pub trait CredentialStore: Send + Sync {
    fn course_base_url(&self, user_id: i64) -> Option<String>;
    fn course_secret(&self, user_id: i64) -> Option<String>;
    fn sink_secret(&self, user_id: i64) -> Option<String>;
}

/// Whether a user's subscription or trial window permits automatic
/// syncing at `now`.
pub trait EntitlementCheck: Send + Sync {
    fn is_entitled(&self, user_id: i64, now: DateTime<Utc>) -> bool;
}

/// Environment-backed credential store for single-user CLI deployments.
/// The same variables serve every user id.
#[derive(Debug, Default, Clone)]
pub struct EnvCredentialStore;

impl CredentialStore for EnvCredentialStore {
    fn course_base_url(&self, _user_id: i64) -> Option<String> {
        std::env::var("COURSESYNC_COURSE_BASE_URL").ok()
    }

    fn course_secret(&self, _user_id: i64) -> Option<String> {
        std::env::var("COURSESYNC_COURSE_TOKEN").ok()
    }

    fn sink_secret(&self, _user_id: i64) -> Option<String> {
        std::env::var("COURSESYNC_SINK_TOKEN").ok()
    }
}

/// Entitlement check that admits everyone; CLI deployments have no
/// billing tier.
#[derive(Debug, Default, Clone)]
pub struct AllowAll;

impl EntitlementCheck for AllowAll {
    fn is_entitled(&self, _user_id: i64, _now: DateTime<Utc>) -> bool {
        true
    }
}
