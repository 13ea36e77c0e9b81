//! Canonical CBOR encoding for deterministic payload hashing.
//!
//! Structured payloads are reduced to RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - Floats with an exact integral value encode as integers
//! - Remaining floats encode as IEEE-754 binary64 (`0xfb`)
//! - Non-finite floats are rejected
//!
//! **This encoding is frozen.** Signatures produced by one instance must
//! verify on every other, so any change here invalidates every stored hash.

use ciborium::value::{Integer, Value as Cbor};
use serde_json::{Number, Value};

use crate::crypto::Sha256Hash;
use crate::error::{CoreError, Result};

/// 2^63 as f64; the smallest float that no longer fits in an i64.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// 2^64 as f64; the smallest float that no longer fits in a u64.
const U64_BOUND: f64 = 18_446_744_073_709_551_616.0;

/// Encode a structured payload to canonical bytes.
pub fn canonicalize(value: &Value) -> Result<Vec<u8>> {
    let cbor = to_cbor_value(value)?;
    canonical_cbor_bytes(&cbor)
}

/// SHA-256 over the canonical bytes of a payload.
pub fn canonical_hash(value: &Value) -> Result<Sha256Hash> {
    Ok(Sha256Hash::hash(&canonicalize(value)?))
}

/// Encode an already-built CBOR value canonically.
pub fn canonical_cbor_bytes(value: &Cbor) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Convert a payload into the CBOR data model.
fn to_cbor_value(value: &Value) -> Result<Cbor> {
    Ok(match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Number(n) => number_to_cbor(n)?,
        Value::String(s) => Cbor::Text(s.clone()),
        Value::Array(items) => Cbor::Array(
            items
                .iter()
                .map(to_cbor_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(map) => {
            let mut entries = Vec::with_capacity(map.len());
            for (k, v) in map {
                entries.push((Cbor::Text(k.clone()), to_cbor_value(v)?));
            }
            Cbor::Map(entries)
        }
    })
}

fn number_to_cbor(n: &Number) -> Result<Cbor> {
    if let Some(i) = n.as_i64() {
        return Ok(Cbor::Integer(i.into()));
    }
    if let Some(u) = n.as_u64() {
        return Ok(Cbor::Integer(u.into()));
    }
    match n.as_f64() {
        Some(f) => float_to_cbor(f),
        None => Err(CoreError::EncodingError(format!("unrepresentable number: {n}"))),
    }
}

/// Integral floats collapse onto the integer encoding so that `1.0` and `1`
/// hash identically, matching JSON producers that do not distinguish them.
fn float_to_cbor(f: f64) -> Result<Cbor> {
    if !f.is_finite() {
        return Err(CoreError::EncodingError(format!("non-finite number: {f}")));
    }
    if f.fract() == 0.0 {
        if f < 0.0 && f >= -I64_BOUND {
            return Ok(Cbor::Integer((f as i64).into()));
        }
        if f >= 0.0 && f < U64_BOUND {
            // -0.0 lands here and encodes as 0
            return Ok(Cbor::Integer((f as u64).into()));
        }
    }
    Ok(Cbor::Float(f))
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Cbor) -> Result<()> {
    match value {
        Cbor::Integer(i) => encode_integer(buf, *i),
        Cbor::Text(s) => encode_text(buf, s),
        Cbor::Bytes(b) => encode_bytes(buf, b),
        Cbor::Array(arr) => encode_array(buf, arr)?,
        Cbor::Map(entries) => encode_map_canonical(buf, entries)?,
        Cbor::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Cbor::Null => buf.push(0xf6),
        Cbor::Float(f) => encode_float(buf, *f)?,
        other => {
            return Err(CoreError::EncodingError(format!(
                "unsupported CBOR value: {other:?}"
            )))
        }
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a binary64 float (major type 7, additional info 27).
fn encode_float(buf: &mut Vec<u8>, f: f64) -> Result<()> {
    if !f.is_finite() {
        return Err(CoreError::EncodingError(format!("non-finite number: {f}")));
    }
    buf.push(0xfb);
    buf.extend_from_slice(&f.to_bits().to_be_bytes());
    Ok(())
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Cbor]) -> Result<()> {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item)?;
    }
    Ok(())
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison, which for text keys
/// means shorter keys first, then bytewise.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Cbor, Cbor)]) -> Result<()> {
    let mut key_value_pairs: Vec<(Vec<u8>, &Cbor)> = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        key_value_pairs.push((key_buf, v));
    }

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}
