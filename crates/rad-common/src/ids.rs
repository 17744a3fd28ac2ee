use uuid::Uuid;

/// 128-bit random identifier rendered as 32 lowercase hex chars.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Inbound request/trace ids are kept only when they look like ids we could
/// have generated ourselves: 8..=128 chars of `[A-Za-z0-9_-]`.
pub fn is_well_formed_id(value: &str) -> bool {
    let len = value.len();
    (8..=128).contains(&len)
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_lowercase_hex() {
        let id = new_id();
        assert_eq!(id.len(), 32);
        assert!(id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn well_formed_accepts_inbound_ids() {
        assert!(is_well_formed_id("req-0123456789abcdef"));
        assert!(is_well_formed_id(&new_id()));
    }

    #[test]
    fn well_formed_rejects_junk() {
        assert!(!is_well_formed_id(""));
        assert!(!is_well_formed_id("short"));
        assert!(!is_well_formed_id("has spaces in it"));
        assert!(!is_well_formed_id(&"x".repeat(129)));
    }
}
