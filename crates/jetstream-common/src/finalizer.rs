//! Finalizer token handling
//!
//! Pure helpers over a finalizer list. Writing the list back to the API
//! server is the caller's job.

/// Finalizer placed on every Stream whose remote stream the controller manages
pub const STREAM_FINALIZER: &str = "streamfinalizer.jetstream.nats.io";

/// Append `key` unless it is already present
pub fn add_finalizer(tokens: &[String], key: &str) -> Vec<String> {
    let mut out = tokens.to_vec();
    if !out.iter().any(|t| t == key) {
        out.push(key.to_string());
    }
    out
}

/// Drop every occurrence of `key`, keeping the order of the rest
pub fn remove_finalizer(tokens: &[String], key: &str) -> Vec<String> {
    tokens.iter().filter(|t| *t != key).cloned().collect()
}

/// Whether `key` is present
pub fn has_finalizer(tokens: &[String], key: &str) -> bool {
    tokens.iter().any(|t| t == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_add_is_idempotent() {
        let once = add_finalizer(&[], STREAM_FINALIZER);
        let twice = add_finalizer(&once, STREAM_FINALIZER);
        assert_eq!(once, twice);
        assert_eq!(once, tokens(&[STREAM_FINALIZER]));
    }

    #[test]
    fn test_add_appends_after_existing() {
        let out = add_finalizer(&tokens(&["other.io/cleanup"]), STREAM_FINALIZER);
        assert_eq!(out, tokens(&["other.io/cleanup", STREAM_FINALIZER]));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let existing = tokens(&["a", "b"]);
        assert_eq!(remove_finalizer(&existing, STREAM_FINALIZER), existing);
    }

    #[test]
    fn test_remove_preserves_order() {
        let existing = tokens(&["a", STREAM_FINALIZER, "b"]);
        assert_eq!(remove_finalizer(&existing, STREAM_FINALIZER), tokens(&["a", "b"]));
    }

    #[test]
    fn test_has_finalizer() {
        assert!(has_finalizer(&tokens(&[STREAM_FINALIZER]), STREAM_FINALIZER));
        assert!(!has_finalizer(&[], STREAM_FINALIZER));
    }
}
