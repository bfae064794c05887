// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use proptest::prelude::*;

#[test]
fn hash_is_deterministic_per_salt() {
    let h1 = token_hash("salt-a", "tok-1");
    let h2 = token_hash("salt-a", "tok-1");
    assert_eq!(h1, h2);
    assert_ne!(h1, token_hash("salt-b", "tok-1"));
    assert_ne!(h1, token_hash("salt-a", "tok-2"));
}

#[test]
fn verify_accepts_only_exact_token() {
    let stored = token_hash("salt", "the-token");
    assert!(verify_token("salt", "the-token", &stored));
    assert!(!verify_token("salt", "the-tokem", &stored));
    assert!(!verify_token("salt", "", &stored));
    assert!(!verify_token("other-salt", "the-token", &stored));
}

#[test]
fn verify_rejects_tampered_hash() {
    let stored = token_hash("salt", "tok");
    let mut tampered = stored.clone().into_bytes();
    // Flip one nibble anywhere in the hex string.
    tampered[0] = if tampered[0] == b'0' { b'1' } else { b'0' };
    let tampered = String::from_utf8(tampered).unwrap_or_default();
    assert!(!verify_token("salt", "tok", &tampered));
}

#[test]
fn minted_tokens_are_distinct_and_urlsafe() -> anyhow::Result<()> {
    let a = mint_token()?;
    let b = mint_token()?;
    assert_ne!(a, b);
    // 32 bytes base64url without padding.
    assert_eq!(a.len(), 43);
    assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    Ok(())
}

proptest! {
    // Verification must not depend on where the first difference sits:
    // any token other than the original fails, whatever the prefix overlap.
    #[test]
    fn only_the_original_token_verifies(tok in "[ -~]{1,64}", other in "[ -~]{1,64}") {
        let stored = token_hash("salt", &tok);
        prop_assert!(verify_token("salt", &tok, &stored));
        if other != tok {
            prop_assert!(!verify_token("salt", &other, &stored));
        }
    }
}
