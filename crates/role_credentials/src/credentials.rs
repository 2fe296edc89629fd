use std::fmt;
use std::time::Duration;

use time::OffsetDateTime;

/// Refresh credentials that expire within this window.
pub const EXPIRY_THRESHOLD: Duration = Duration::from_secs(10 * 60);

/// Temporary role credentials. Replaced wholesale on refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<OffsetDateTime>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// True when credentials are missing, carry no expiration, or expire within `threshold` of `now`.
pub fn is_expiring(
    credentials: Option<&Credentials>,
    threshold: Duration,
    now: OffsetDateTime,
) -> bool {
    let Some(expiration) = credentials.and_then(|credentials| credentials.expiration) else {
        return true;
    };
    expiration - now < threshold
}

/// Whole minutes until expiry, rounded to nearest; `None` without an expiration.
pub fn minutes_until_expiry(credentials: &Credentials, now: OffsetDateTime) -> Option<i64> {
    let remaining = credentials.expiration? - now;
    Some((remaining.whole_seconds() as f64 / 60.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::{is_expiring, minutes_until_expiry, Credentials, EXPIRY_THRESHOLD};
    use time::{Duration, OffsetDateTime};

    fn expiring_in(now: OffsetDateTime, remaining: Option<Duration>) -> Credentials {
        Credentials {
            access_key_id: "AKIA".to_owned(),
            secret_access_key: "secret".to_owned(),
            session_token: "token".to_owned(),
            expiration: remaining.map(|remaining| now + remaining),
        }
    }

    #[test]
    fn credentials_inside_threshold_are_expiring() {
        let now = OffsetDateTime::now_utc();
        let soon = expiring_in(now, Some(Duration::minutes(5)));
        let later = expiring_in(now, Some(Duration::hours(1)));
        let past = expiring_in(now, Some(Duration::minutes(-1)));

        assert!(is_expiring(Some(&soon), EXPIRY_THRESHOLD, now));
        assert!(is_expiring(Some(&past), EXPIRY_THRESHOLD, now));
        assert!(!is_expiring(Some(&later), EXPIRY_THRESHOLD, now));
    }

    #[test]
    fn missing_credentials_or_expiration_are_expiring() {
        let now = OffsetDateTime::now_utc();
        assert!(is_expiring(None, EXPIRY_THRESHOLD, now));
        assert!(is_expiring(
            Some(&expiring_in(now, None)),
            EXPIRY_THRESHOLD,
            now
        ));
    }

    #[test]
    fn minutes_until_expiry_rounds() {
        let now = OffsetDateTime::now_utc();
        let credentials = expiring_in(now, Some(Duration::seconds(59 * 60 + 40)));
        assert_eq!(minutes_until_expiry(&credentials, now), Some(60));
        assert_eq!(minutes_until_expiry(&expiring_in(now, None), now), None);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", expiring_in(OffsetDateTime::now_utc(), None));
        assert!(!rendered.contains("secret\""));
        assert!(!rendered.contains("token\""));
        assert!(rendered.contains("<redacted>"));
    }
}
