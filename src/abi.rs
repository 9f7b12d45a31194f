//! Minimal Solidity ABI support for the detection contract: selectors, event
//! topics, call encoding for `address`/`uint256`/`string` arguments and
//! decoding of `string` and `string[]` return values.

use sha3::{Digest, Keccak256};
use std::{fmt, str::FromStr};
use thiserror::Error;

const WORD: usize = 32;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AbiError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid hex data: {0}")]
    InvalidHex(String),
    #[error("ABI data truncated at byte {0}")]
    Truncated(usize),
    #[error("ABI offset or length does not fit in memory")]
    Overflow,
    #[error("ABI string is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl FromStr for Address {
    type Err = AbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|_| AbiError::InvalidAddress(s.to_string()))?;
        let raw: [u8; 20] = bytes
            .try_into()
            .map_err(|_| AbiError::InvalidAddress(s.to_string()))?;
        Ok(Self(raw))
    }
}

impl Address {
    /// Reads an address from a left-padded 32-byte word, e.g. an indexed topic.
    pub fn try_from_word(word: &[u8]) -> Result<Self, AbiError> {
        if word.len() != WORD || word[..WORD - 20].iter().any(|b| *b != 0) {
            return Err(AbiError::InvalidAddress(hex::encode(word)));
        }
        let mut raw = [0u8; 20];
        raw.copy_from_slice(&word[WORD - 20..]);
        Ok(Self(raw))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u64),
    String(String),
}

fn keccak(input: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(input));
    out
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak(signature.as_bytes())
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 20..].copy_from_slice(&address.0);
    word
}

fn padded(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    let rem = out.len() % WORD;
    if rem != 0 {
        out.resize(out.len() + WORD - rem, 0);
    }
    out
}

/// Encodes a call to `signature` with the given arguments.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut head = Vec::with_capacity(args.len() * WORD);
    let mut tail = Vec::new();
    let head_len = args.len() * WORD;

    for arg in args {
        match arg {
            Token::Address(address) => head.extend_from_slice(&address_word(address)),
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::String(s) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
                tail.extend_from_slice(&uint_word(s.len() as u64));
                tail.extend(padded(s.as_bytes()));
            }
        }
    }

    let mut call = selector(signature).to_vec();
    call.extend(head);
    call.extend(tail);
    call
}

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(s: &str) -> Result<Vec<u8>, AbiError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|_| AbiError::InvalidHex(s.to_string()))
}

fn word_at(data: &[u8], pos: usize) -> Result<&[u8], AbiError> {
    let end = pos.checked_add(WORD).ok_or(AbiError::Overflow)?;
    data.get(pos..end).ok_or(AbiError::Truncated(pos))
}

fn usize_at(data: &[u8], pos: usize) -> Result<usize, AbiError> {
    let word = word_at(data, pos)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow);
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(raw)).map_err(|_| AbiError::Overflow)
}

/// Reads a length-prefixed string starting at `pos`.
fn string_at(data: &[u8], pos: usize) -> Result<String, AbiError> {
    let len = usize_at(data, pos)?;
    let start = pos.checked_add(WORD).ok_or(AbiError::Overflow)?;
    let end = start.checked_add(len).ok_or(AbiError::Overflow)?;
    let bytes = data.get(start..end).ok_or(AbiError::Truncated(start))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
}

/// Decodes a single `string` return value.
pub fn decode_string(data: &[u8]) -> Result<String, AbiError> {
    let offset = usize_at(data, 0)?;
    string_at(data, offset)
}

/// Decodes a single `string[]` return value.
pub fn decode_string_array(data: &[u8]) -> Result<Vec<String>, AbiError> {
    let offset = usize_at(data, 0)?;
    let count = usize_at(data, offset)?;
    let base = offset.checked_add(WORD).ok_or(AbiError::Overflow)?;

    (0..count)
        .map(|i| {
            let head = base.checked_add(i * WORD).ok_or(AbiError::Overflow)?;
            let element = usize_at(data, head)?;
            string_at(data, base.checked_add(element).ok_or(AbiError::Overflow)?)
        })
        .collect()
}
