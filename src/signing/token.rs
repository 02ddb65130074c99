use rand::{rngs::OsRng, RngCore};

pub const TOKEN_BYTES: usize = 32;

/// Opaque bearer credential for a public signing link.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Cheap shape check so malformed links never reach the database.
pub fn looks_like_token(value: &str) -> bool {
    value.len() == TOKEN_BYTES * 2 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn tokens_are_hex_and_unique() {
        let tokens: HashSet<String> = (0..64).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 64);
        assert!(tokens.iter().all(|token| looks_like_token(token)));
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(!looks_like_token("abc"));
        assert!(!looks_like_token(&"z".repeat(64)));
    }
}
