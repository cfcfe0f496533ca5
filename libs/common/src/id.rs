use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = warden_common::id::prefixed_ulid("conn");
/// assert!(id.starts_with("conn_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const CONNECTION: &str = "conn";
    pub const OPERATOR: &str = "opr";
    pub const ACCESS_TOKEN: &str = "atk";
    pub const REFRESH_TOKEN: &str = "rtk";
    pub const COMMAND: &str = "cmd";
}
