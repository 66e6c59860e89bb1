// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod bounded_hash;
mod debug;
mod identity;

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use lazy_static::lazy_static;

use crate::datum::Datum;
use crate::error::MaskError;
use crate::types::FieldType;

/// Key material for keyed hashing. Masked values depend only on the
/// original value, its type and this key.
#[derive(Clone, PartialEq, Eq)]
pub struct MaskKey([u8; 32]);

const KEY_CONTEXT: &str = "sql-masker mask key v1";

impl MaskKey {
    pub fn derive(material: &str) -> Self {
        Self(blake3::derive_key(KEY_CONTEXT, material.as_bytes()))
    }

    /// Fill `out` with bytes derived from `data`. `tag` separates the uses
    /// of the key so that, for example, strings and integers never share a
    /// digest.
    pub fn fill(&self, tag: &str, data: &[u8], out: &mut [u8]) {
        let mut hasher = blake3::Hasher::new_keyed(&self.0);
        hasher.update(tag.as_bytes());
        hasher.update(&[0]);
        hasher.update(data);
        hasher.finalize_xof().fill(out);
    }

    pub fn hash_u64(&self, tag: &str, data: &[u8]) -> u64 {
        let mut buf = [0u8; 8];
        self.fill(tag, data, &mut buf);
        u64::from_le_bytes(buf)
    }
}

impl fmt::Debug for MaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MaskKey(..)")
    }
}

impl Default for MaskKey {
    fn default() -> Self {
        Self::derive(crate::config::DEFAULT_KEY)
    }
}

/// A mask function returns the masked value and, when the value no longer
/// has the input type, the type it has now.
pub type MaskFn = fn(&Datum, &FieldType, &MaskKey) -> Result<(Datum, Option<FieldType>)>;

#[derive(Clone, Copy)]
pub struct MaskFuncEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub func: MaskFn,
}

impl fmt::Debug for MaskFuncEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskFuncEntry")
            .field("name", &self.name)
            .finish()
    }
}

pub type MaskFuncMap = BTreeMap<&'static str, MaskFuncEntry>;

#[rustfmt::skip]
lazy_static! {
    static ref MASK_FUNCS: MaskFuncMap = {
	let mut m = MaskFuncMap::new();

	identity::register(&mut m);
	debug::register(&mut m);
	bounded_hash::register(&mut m);

	m
    };
}

/// Resolve a mask function by its configured name.
pub fn lookup(name: &str) -> Result<MaskFuncEntry, MaskError> {
    match MASK_FUNCS.get(name) {
        Some(entry) => Ok(*entry),
        None => Err(MaskError::UnknownMaskFunction(name.to_string())),
    }
}

/// All registered functions, sorted by name.
pub fn list() -> Vec<MaskFuncEntry> {
    MASK_FUNCS.values().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry() {
        let names: Vec<&str> = list().iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["bounded-hash", "debug", "identity"]);
        assert!(matches!(
            lookup("nope"),
            Err(MaskError::UnknownMaskFunction(n)) if n == "nope"
        ));
    }

    #[test]
    fn key_separation() {
        let a = MaskKey::derive("a");
        let b = MaskKey::derive("b");
        assert_ne!(a.hash_u64("int", b"1"), b.hash_u64("int", b"1"));
        assert_ne!(a.hash_u64("int", b"1"), a.hash_u64("string", b"1"));
        assert_eq!(a.hash_u64("int", b"1"), MaskKey::derive("a").hash_u64("int", b"1"));
    }
}
