use chrono::Utc;

/// Seconds since the unix epoch, the base every smart media timestamp is compared on.
pub type UnixSeconds = i64;

pub fn now_unix() -> UnixSeconds {
    Utc::now().timestamp()
}
