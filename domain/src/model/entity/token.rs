use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// Client credentials issued by UIT+.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// OAuth tokens for one HPC system.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub system_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
    /// Unknown for services that don't report it.
    pub refresh_expiry: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// Whether the access token is expired, or will be within `margin`, at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now.checked_add_signed(margin)
            .map_or(true, |deadline| deadline >= self.expiry)
    }

    pub fn can_refresh_at(&self, now: DateTime<Utc>) -> bool {
        !self.refresh_token.is_empty() && self.refresh_expiry.map_or(true, |at| at > now)
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("system_id", &self.system_id)
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("expiry", &self.expiry)
            .field("refresh_expiry", &self.refresh_expiry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::TokenRecord;

    fn record() -> TokenRecord {
        TokenRecord {
            system_id: "narwhal".to_owned(),
            access_token: "access".to_owned(),
            refresh_token: "refresh".to_owned(),
            expiry: Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap(),
            refresh_expiry: Some(Utc.with_ymd_and_hms(2030, 1, 2, 12, 0, 0).unwrap()),
        }
    }

    #[test]
    fn expiry_honours_margin() {
        let record = record();
        let margin = Duration::seconds(60);
        let early = Utc.with_ymd_and_hms(2030, 1, 1, 11, 58, 0).unwrap();
        let close = Utc.with_ymd_and_hms(2030, 1, 1, 11, 59, 30).unwrap();
        assert!(!record.is_expired_at(early, margin));
        assert!(record.is_expired_at(close, margin));
        assert!(record.is_expired_at(early, Duration::MAX));
    }

    #[test]
    fn refresh_window() {
        let mut record = record();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 13, 0, 0).unwrap();
        assert!(record.can_refresh_at(now));
        record.refresh_expiry = Some(now - Duration::seconds(1));
        assert!(!record.can_refresh_at(now));
        record.refresh_expiry = None;
        assert!(record.can_refresh_at(now));
    }

    #[test]
    fn debug_hides_tokens() {
        let shown = format!("{:?}", record());
        assert!(!shown.contains("access\""));
        assert!(shown.contains("narwhal"));
    }
}
