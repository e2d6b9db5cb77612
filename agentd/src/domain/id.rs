//! Record ID generation
//!
//! IDs are time-ordered UUIDv7 strings, so sorting by ID roughly sorts by
//! creation time.

/// Generate a new record ID
pub fn generate_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Check that a string looks like an ID produced by [`generate_id`]
pub fn is_valid_id(id: &str) -> bool {
    uuid::Uuid::parse_str(id).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(is_valid_id(&a));
        assert!(is_valid_id(&b));
    }

    #[test]
    fn test_generate_id_time_ordered() {
        let first = generate_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = generate_id();
        assert!(first < second);
    }

    #[test]
    fn test_is_valid_id_rejects_garbage() {
        assert!(!is_valid_id("not-an-id"));
        assert!(!is_valid_id(""));
    }
}
