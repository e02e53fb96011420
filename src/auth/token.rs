use rand::rngs::OsRng;
use rand::RngCore;
use time::{Duration, OffsetDateTime};

/// Length of the random material behind every opaque token.
const TOKEN_BYTES: usize = 32;

/// Issues an unguessable single-use token: 32 bytes from the OS RNG,
/// hex-encoded. Consumption (and therefore replay protection) is the
/// store's job.
pub fn issue() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Issues a token together with its expiry, for the password-reset flow.
pub fn issue_with_expiry(ttl_minutes: i64) -> (String, OffsetDateTime) {
    let expires_at = OffsetDateTime::now_utc() + Duration::minutes(ttl_minutes);
    (issue(), expires_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_fixed_length_hex() {
        let token = issue();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_do_not_repeat() {
        let a = issue();
        let b = issue();
        assert_ne!(a, b);
    }

    #[test]
    fn expiry_lies_in_the_future() {
        let (_, expires_at) = issue_with_expiry(15);
        let delta = expires_at - OffsetDateTime::now_utc();
        assert!(delta > Duration::minutes(14));
        assert!(delta <= Duration::minutes(15));
    }
}
