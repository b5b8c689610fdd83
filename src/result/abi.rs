//! Minimal Ethereum ABI (`abi.encode`) head/tail encoder covering the types
//! a DKG result is made of.

use crate::chain::{Address, Bytes32};

use super::EncodingError;

const WORD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `uintN`, value already checked to fit in `bits`.
    Uint { bits: u16, value: u64 },
    Address(Address),
    FixedBytes(Bytes32),
    Bytes(Vec<u8>),
    /// Dynamic-length array `T[]`.
    Array(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    pub fn uint(field: &'static str, bits: u16, value: u64) -> Result<Token, EncodingError> {
        if bits == 0 || bits > 256 || bits % 8 != 0 {
            return Err(EncodingError::UnsupportedWidth { field, bits });
        }
        if bits < 64 && value >> bits != 0 {
            return Err(EncodingError::ValueOutOfRange { field, value, bits });
        }
        Ok(Token::Uint { bits, value })
    }

    fn is_dynamic(&self) -> bool {
        match self {
            Token::Bytes(_) | Token::Array(_) => true,
            Token::Tuple(tokens) => tokens.iter().any(Token::is_dynamic),
            _ => false,
        }
    }

    /// Size of the token's slot in the head of the enclosing tuple.
    fn head_size(&self) -> usize {
        match self {
            t if t.is_dynamic() => WORD,
            Token::Tuple(tokens) => tokens.iter().map(Token::head_size).sum(),
            _ => WORD,
        }
    }
}

/// `abi.encode(tokens...)`: the arguments are laid out as one tuple.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    encode_sequence(tokens)
}

fn encode_sequence(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens.iter().map(Token::head_size).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
            tail.extend(encode_token(token));
        } else {
            head.extend(encode_token(token));
        }
    }

    head.extend(tail);
    head
}

fn encode_token(token: &Token) -> Vec<u8> {
    match token {
        Token::Uint { value, .. } => uint_word(*value).to_vec(),
        Token::Address(address) => {
            let mut word = [0u8; WORD];
            word[WORD - 20..].copy_from_slice(address.as_bytes());
            word.to_vec()
        }
        Token::FixedBytes(bytes) => bytes.as_bytes().to_vec(),
        Token::Bytes(bytes) => {
            let mut out = uint_word(bytes.len() as u64).to_vec();
            out.extend_from_slice(bytes);
            out.resize(out.len() + padding(bytes.len()), 0);
            out
        }
        Token::Array(items) => {
            let mut out = uint_word(items.len() as u64).to_vec();
            out.extend(encode_sequence(items));
            out
        }
        Token::Tuple(items) => encode_sequence(items),
    }
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn padding(len: usize) -> usize {
    (WORD - len % WORD) % WORD
}
