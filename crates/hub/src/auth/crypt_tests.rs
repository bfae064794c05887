// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn test_kek() -> anyhow::Result<Kek> {
    Kek::from_base64(&STANDARD.encode([7u8; 32]))
}

#[test]
fn seal_open_round_trips() -> anyhow::Result<()> {
    let kek = test_kek()?;
    let sealed = kek.seal(b"do-access-token")?;
    assert_eq!(kek.open(&sealed)?, b"do-access-token");
    Ok(())
}

#[test]
fn same_plaintext_seals_to_distinct_blobs() -> anyhow::Result<()> {
    let kek = test_kek()?;
    let a = kek.seal(b"token")?;
    let b = kek.seal(b"token")?;
    assert_ne!(a, b);
    assert_eq!(kek.open(&a)?, kek.open(&b)?);
    Ok(())
}

#[test]
fn wrong_key_fails_to_open() -> anyhow::Result<()> {
    let kek = test_kek()?;
    let other = Kek::from_base64(&STANDARD.encode([8u8; 32]))?;
    let sealed = kek.seal(b"secret")?;
    assert!(other.open(&sealed).is_err());
    Ok(())
}

#[test]
fn tampered_blob_fails_to_open() -> anyhow::Result<()> {
    let kek = test_kek()?;
    let mut sealed = kek.seal(b"secret")?;
    let last = sealed.len() - 1;
    sealed[last] ^= 0x01;
    assert!(kek.open(&sealed).is_err());
    Ok(())
}

#[test]
fn rejects_unknown_version_and_truncation() -> anyhow::Result<()> {
    let kek = test_kek()?;
    let mut sealed = kek.seal(b"secret")?;
    sealed[0] = 9;
    assert!(kek.open(&sealed).is_err());
    assert!(kek.open(&[SEAL_VERSION; 4]).is_err());
    assert!(kek.open(&[]).is_err());
    Ok(())
}

#[test]
fn rejects_short_key_material() {
    assert!(Kek::from_base64(&STANDARD.encode([1u8; 16])).is_err());
    assert!(Kek::from_base64("not base64 !!!").is_err());
}
