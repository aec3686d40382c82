//! Minimal contract ABI codec.
//!
//! Only the shapes the lottery contract uses are supported: static words
//! (`uint256`, `bool`, `address`) and the dynamic `address[]` / `string[]`
//! pair returned by the ticket listing.

use primitive_types::U256;
use sha3::{Digest, Keccak256};

use crate::{address::Address, error::DecodeError};

pub const WORD_SIZE: usize = 32;
pub const SELECTOR_SIZE: usize = 4;

pub type Word = [u8; WORD_SIZE];
pub type Selector = [u8; SELECTOR_SIZE];

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// First four bytes of the keccak hash of a canonical function signature
pub fn selector(signature: &str) -> Selector {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; SELECTOR_SIZE];
    out.copy_from_slice(&hash[..SELECTOR_SIZE]);
    out
}

/// Static argument or return value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(U256),
    Bool(bool),
    Address(Address),
}

impl Token {
    pub fn to_word(&self) -> Word {
        match self {
            Token::Uint(value) => uint_word(value),
            Token::Bool(value) => uint_word(&U256::from(*value as u8)),
            Token::Address(address) => {
                let mut word = [0u8; WORD_SIZE];
                word[WORD_SIZE - 20..].copy_from_slice(address.as_bytes());
                word
            }
        }
    }
}

fn uint_word(value: &U256) -> Word {
    let mut word = [0u8; WORD_SIZE];
    for (i, byte) in word.iter_mut().rev().enumerate() {
        *byte = value.byte(i);
    }
    word
}

pub fn encode_tokens(tokens: &[Token]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tokens.len() * WORD_SIZE);
    for token in tokens {
        out.extend_from_slice(&token.to_word());
    }
    out
}

/// Selector followed by static arguments
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SELECTOR_SIZE + tokens.len() * WORD_SIZE);
    out.extend_from_slice(&selector(signature));
    out.extend_from_slice(&encode_tokens(tokens));
    out
}

/// Return data of the ticket listing: `(address[] participants, string[] tickets)`
pub fn encode_address_string_arrays(participants: &[Address], tickets: &[String]) -> Vec<u8> {
    let head_size = 2 * WORD_SIZE;
    let addresses_size = WORD_SIZE * (1 + participants.len());

    let mut out = Vec::new();
    out.extend_from_slice(&uint_word(&U256::from(head_size)));
    out.extend_from_slice(&uint_word(&U256::from(head_size + addresses_size)));

    out.extend_from_slice(&uint_word(&U256::from(participants.len())));
    for participant in participants {
        out.extend_from_slice(&Token::Address(*participant).to_word());
    }

    out.extend_from_slice(&uint_word(&U256::from(tickets.len())));
    let mut tail = Vec::new();
    let offsets_size = WORD_SIZE * tickets.len();
    for ticket in tickets {
        out.extend_from_slice(&uint_word(&U256::from(offsets_size + tail.len())));
        tail.extend_from_slice(&uint_word(&U256::from(ticket.len())));
        tail.extend_from_slice(ticket.as_bytes());
        let padding = (WORD_SIZE - ticket.len() % WORD_SIZE) % WORD_SIZE;
        tail.extend(std::iter::repeat(0u8).take(padding));
    }
    out.extend_from_slice(&tail);
    out
}

/// Bounds-checked reader over ABI encoded data
pub struct AbiReader<'a> {
    data: &'a [u8],
}

impl<'a> AbiReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn slice(&self, offset: usize, size: usize) -> Result<&'a [u8], DecodeError> {
        let out_of_bounds = || DecodeError::OutOfBounds {
            offset,
            needed: size,
            len: self.data.len(),
        };
        let end = offset.checked_add(size).ok_or_else(out_of_bounds)?;
        self.data.get(offset..end).ok_or_else(out_of_bounds)
    }

    pub fn word(&self, offset: usize) -> Result<&'a [u8], DecodeError> {
        self.slice(offset, WORD_SIZE)
    }

    pub fn read_uint(&self, offset: usize) -> Result<U256, DecodeError> {
        Ok(U256::from_big_endian(self.word(offset)?))
    }

    pub fn read_u64(&self, offset: usize) -> Result<u64, DecodeError> {
        let value = self.read_uint(offset)?;
        if value.bits() > 64 {
            return Err(DecodeError::Overflow(64));
        }
        Ok(value.low_u64())
    }

    pub fn read_usize(&self, offset: usize) -> Result<usize, DecodeError> {
        let value = self.read_u64(offset)?;
        usize::try_from(value).map_err(|_| DecodeError::Overflow(usize::BITS))
    }

    pub fn read_bool(&self, offset: usize) -> Result<bool, DecodeError> {
        let value = self.read_uint(offset)?;
        if value.is_zero() {
            Ok(false)
        } else if value == U256::one() {
            Ok(true)
        } else {
            Err(DecodeError::InvalidBool)
        }
    }

    pub fn read_address(&self, offset: usize) -> Result<Address, DecodeError> {
        let word = self.word(offset)?;
        if word[..WORD_SIZE - 20].iter().any(|b| *b != 0) {
            return Err(DecodeError::InvalidAddress(hex::encode(word)));
        }
        Address::from_slice(&word[WORD_SIZE - 20..])
    }

    /// Follow the offset stored at `head` and return the absolute position
    /// of the dynamic value relative to `base`
    fn follow(&self, base: usize, head: usize) -> Result<usize, DecodeError> {
        let relative = self.read_usize(head)?;
        base.checked_add(relative).ok_or(DecodeError::Overflow(usize::BITS))
    }

    /// Length-prefixed array starting at `position`, returns (length, first element offset)
    fn array_header(&self, position: usize) -> Result<(usize, usize), DecodeError> {
        let length = self.read_usize(position)?;
        let elements = position + WORD_SIZE;
        let needed = length.checked_mul(WORD_SIZE).ok_or(DecodeError::Overflow(usize::BITS))?;
        self.slice(elements, needed)?;
        Ok((length, elements))
    }

    pub fn read_string_at(&self, position: usize) -> Result<String, DecodeError> {
        let length = self.read_usize(position)?;
        let bytes = self.slice(position + WORD_SIZE, length)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Dynamic `address[]` whose offset word sits at `head`
    pub fn read_address_array(&self, head: usize) -> Result<Vec<Address>, DecodeError> {
        let position = self.follow(0, head)?;
        let (length, elements) = self.array_header(position)?;
        (0..length)
            .map(|i| self.read_address(elements + i * WORD_SIZE))
            .collect()
    }

    /// Dynamic `string[]` whose offset word sits at `head`
    pub fn read_string_array(&self, head: usize) -> Result<Vec<String>, DecodeError> {
        let position = self.follow(0, head)?;
        let (length, elements) = self.array_header(position)?;
        (0..length)
            .map(|i| {
                let string_position = self.follow(elements, elements + i * WORD_SIZE)?;
                self.read_string_at(string_position)
            })
            .collect()
    }
}

pub fn decode_uint(data: &[u8]) -> Result<U256, DecodeError> {
    AbiReader::new(data).read_uint(0)
}

pub fn decode_u64(data: &[u8]) -> Result<u64, DecodeError> {
    AbiReader::new(data).read_u64(0)
}

pub fn decode_bool(data: &[u8]) -> Result<bool, DecodeError> {
    AbiReader::new(data).read_bool(0)
}

pub fn decode_address_string_arrays(
    data: &[u8],
) -> Result<(Vec<Address>, Vec<String>), DecodeError> {
    let reader = AbiReader::new(data);
    let participants = reader.read_address_array(0)?;
    let tickets = reader.read_string_array(WORD_SIZE)?;
    Ok((participants, tickets))
}
