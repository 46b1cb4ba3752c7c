// Copyright 2023 the taproot developers.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Domain names in canonical form.
//!
//! Two concerns live here. First, the owned [`Name`] type used as the
//! key of the zone's ordered table: an uncompressed wire-format name,
//! folded to ASCII lowercase, ordered by the DNSSEC canonical ordering
//! of [RFC 4034 § 6.1] so that predecessor lookups line up with the
//! zone's NSEC chain. Second, [`parse_question_name`], the
//! allocation-free codec used on the query path to pull the QNAME out
//! of a received message into a caller-owned scratch buffer.
//!
//! [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use arrayvec::ArrayVec;

use crate::buffer::ReadBuffer;

/// The maximum length of the uncompressed on-the-wire representation
/// of a domain name.
pub const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label (not including the length octet).
const MAX_LABEL_LEN: usize = 63;

/// The maximum number of labels in a domain name.
const MAX_N_LABELS: usize = 128;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// An owned domain name in canonical form.
///
/// The underlying representation is the uncompressed on-the-wire form
/// of the name (length-prefixed labels, terminated by the null root
/// label) with every ASCII letter folded to lowercase. Equality and
/// hashing work on that representation directly; ordering follows the
/// DNSSEC canonical ordering, so a sorted sequence of `Name`s matches
/// the order of the zone's NSEC chain.
#[derive(Clone, Debug)]
pub struct Name {
    wire: Box<[u8]>,
}

impl Name {
    /// Returns the root name, `.`.
    pub fn root() -> Self {
        Self {
            wire: Box::new([0]),
        }
    }

    /// Creates a `Name` from an uncompressed wire-format name
    /// occupying the whole of `octets`, folding it to lowercase.
    pub fn from_wire(octets: &[u8]) -> Result<Self, Error> {
        if octets.len() > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
        let mut position = 0;
        loop {
            match octets.get(position) {
                None => return Err(Error::UnexpectedEnd),
                Some(0) => break,
                Some(&len) if len as usize > MAX_LABEL_LEN => {
                    return Err(Error::CompressedName)
                }
                Some(&len) => position += len as usize + 1,
            }
        }
        if position + 1 != octets.len() {
            return Err(Error::TrailingData);
        }
        let mut wire = octets.to_vec();
        wire.make_ascii_lowercase();
        Ok(Self { wire: wire.into() })
    }

    /// Returns the wire-format representation of the `Name`.
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.wire.len() == 1
    }

    /// Returns the number of labels, excluding the root label.
    pub fn label_count(&self) -> u8 {
        (label_offsets(&self.wire).len() - 1) as u8
    }

    /// Returns whether `self` is equal to or underneath `other`.
    pub fn eq_or_below(&self, other: &Name) -> bool {
        self.wire.len() >= other.wire.len()
            && self.wire[self.wire.len() - other.wire.len()..] == *other.wire
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.wire == other.wire
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.wire.hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `Name`s are ordered canonically: as sequences of labels compared
/// from the right, each label compared as an octet string.
impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        canonical_cmp(&self.wire, &other.wire)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        let mut position = 0;
        while self.wire[position] != 0 {
            let len = self.wire[position] as usize;
            for &octet in &self.wire[position + 1..position + 1 + len] {
                match octet {
                    b'.' | b'\\' => write!(f, "\\{}", octet as char)?,
                    0x21..=0x7e => write!(f, "{}", octet as char)?,
                    _ => write!(f, "\\{:03}", octet)?,
                }
            }
            f.write_str(".")?;
            position += len + 1;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// CANONICAL ORDERING                                                 //
////////////////////////////////////////////////////////////////////////

/// Collects the offset of each label in an uncompressed wire-format
/// name, including the root label.
fn label_offsets(wire: &[u8]) -> ArrayVec<u8, MAX_N_LABELS> {
    let mut offsets = ArrayVec::new();
    let mut position = 0;
    loop {
        offsets.push(position as u8);
        let len = wire[position] as usize;
        if len == 0 {
            return offsets;
        }
        position += len + 1;
    }
}

/// Compares two uncompressed wire-format names canonically, per
/// [RFC 4034 § 6.1]: labels are compared from the rightmost inward,
/// each as a plain octet string, and a name that runs out of labels
/// first sorts first. Both names must already be lowercase; this
/// performs no case folding.
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
pub(crate) fn canonical_cmp(a: &[u8], b: &[u8]) -> Ordering {
    let a_offsets = label_offsets(a);
    let b_offsets = label_offsets(b);
    for (&a_offset, &b_offset) in a_offsets.iter().rev().zip(b_offsets.iter().rev()) {
        let a_label = label_at(a, a_offset as usize);
        let b_label = label_at(b, b_offset as usize);
        match a_label.cmp(b_label) {
            Ordering::Equal => (),
            unequal => return unequal,
        }
    }
    a_offsets.len().cmp(&b_offsets.len())
}

/// Returns the content octets of the label starting at `offset`.
fn label_at(wire: &[u8], offset: usize) -> &[u8] {
    let len = wire[offset] as usize;
    &wire[offset + 1..offset + 1 + len]
}

////////////////////////////////////////////////////////////////////////
// THE QUESTION-SECTION NAME CODEC                                    //
////////////////////////////////////////////////////////////////////////

/// Parses the QNAME at the current position of `buffer`, writing its
/// lowercased wire form into `scratch`.
///
/// Compression pointers are not permitted in the question section, so
/// any length octet with the top two bits set is rejected. On success
/// the buffer's position rests on the first octet after the name, and
/// the length of the name within `scratch` is returned along with the
/// label count (excluding the root label).
pub fn parse_question_name(
    buffer: &mut ReadBuffer,
    scratch: &mut [u8; MAX_WIRE_LEN + 1],
) -> Result<(usize, u8), Error> {
    let mut written = 0;
    let mut labels = 0;
    let mut total = 0usize;
    loop {
        let len = buffer.read_u8().map_err(|_| Error::UnexpectedEnd)?;
        if len == 0 {
            scratch[written] = 0;
            return Ok((written + 1, labels));
        }

        // No compression in the question.
        if len & 0xc0 != 0 {
            return Err(Error::CompressedName);
        }

        total += len as usize + 1;
        if total > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }

        let label = buffer
            .read_slice(len as usize)
            .map_err(|_| Error::UnexpectedEnd)?;
        scratch[written] = len;
        written += 1;
        for &octet in label {
            scratch[written] = octet.to_ascii_lowercase();
            written += 1;
        }
        labels += 1;
    }
}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Conversion from the textual (presentation) form. The string must be
/// fully qualified (end with a dot) and strictly ASCII; `\DDD` and
/// `\X` escapes per [RFC 4343 § 2.1] are supported.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if s == "." {
            return Ok(Name::root());
        }

        let mut wire = Vec::new();
        let mut label_start = wire.len();
        wire.push(0);
        let mut remaining = s.as_bytes();
        while let Some(&octet) = remaining.first() {
            let value = if octet == b'\\' {
                let (value, consumed) = parse_escape(&remaining[1..])?;
                remaining = &remaining[consumed + 1..];
                Some(value)
            } else if octet == b'.' {
                remaining = &remaining[1..];
                if wire[label_start] == 0 {
                    return Err(Error::EmptyLabel);
                }
                label_start = wire.len();
                wire.push(0);
                continue;
            } else if !octet.is_ascii() {
                return Err(Error::StrNotAscii);
            } else {
                remaining = &remaining[1..];
                Some(octet)
            };
            if let Some(value) = value {
                if wire[label_start] as usize == MAX_LABEL_LEN {
                    return Err(Error::LabelTooLong);
                }
                wire[label_start] += 1;
                wire.push(value.to_ascii_lowercase());
            }
        }

        // A fully qualified name ends with a dot, which leaves the
        // final (root) label empty.
        if wire[label_start] != 0 {
            return Err(Error::NonFqdn);
        }
        if wire.len() > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
        Ok(Self { wire: wire.into() })
    }
}

/// Parses an escape sequence, starting with the octet immediately
/// after the introducing backslash.
fn parse_escape(remaining: &[u8]) -> Result<(u8, usize), Error> {
    match remaining {
        [] => Err(Error::InvalidEscape),
        [d0, d1, d2, ..] if d0.is_ascii_digit() => {
            if !d1.is_ascii_digit() || !d2.is_ascii_digit() {
                return Err(Error::InvalidEscape);
            }
            let value = 100 * (d0 - b'0') as usize
                + 10 * (d1 - b'0') as usize
                + (d2 - b'0') as usize;
            u8::try_from(value)
                .map(|value| (value, 3))
                .map_err(|_| Error::InvalidEscape)
        }
        [d0, ..] if d0.is_ascii_digit() => Err(Error::InvalidEscape),
        [octet, ..] => Ok((*octet, 1)),
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a domain name could not be parsed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    CompressedName,
    NameTooLong,
    UnexpectedEnd,
    TrailingData,
    StrEmpty,
    StrNotAscii,
    EmptyLabel,
    LabelTooLong,
    NonFqdn,
    InvalidEscape,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::CompressedName => f.write_str("compressed or malformed label"),
            Self::NameTooLong => f.write_str("the name exceeds 255 octets"),
            Self::UnexpectedEnd => f.write_str("unexpected end of input in name"),
            Self::TrailingData => f.write_str("data present after the root label"),
            Self::StrEmpty => f.write_str("the string is empty"),
            Self::StrNotAscii => f.write_str("the string is not ASCII"),
            Self::EmptyLabel => f.write_str("empty non-terminal label"),
            Self::LabelTooLong => f.write_str("a label exceeds 63 octets"),
            Self::NonFqdn => f.write_str("the name is not fully qualified"),
            Self::InvalidEscape => f.write_str("invalid escape sequence"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(octets: &[u8]) -> Result<(Vec<u8>, usize, u8), Error> {
        let mut buffer = ReadBuffer::new(octets);
        let mut scratch = [0; MAX_WIRE_LEN + 1];
        let (len, labels) = parse_question_name(&mut buffer, &mut scratch)?;
        Ok((scratch[..len].to_vec(), buffer.position(), labels))
    }

    #[test]
    fn parse_question_name_works() {
        let (name, consumed, labels) = parse(b"\x07example\x04test\x00\x00\x01").unwrap();
        assert_eq!(name, b"\x07example\x04test\x00");
        assert_eq!(consumed, 14);
        assert_eq!(labels, 2);
    }

    #[test]
    fn parse_question_name_accepts_root() {
        let (name, consumed, labels) = parse(b"\x00").unwrap();
        assert_eq!(name, b"\x00");
        assert_eq!(consumed, 1);
        assert_eq!(labels, 0);
    }

    #[test]
    fn parse_question_name_folds_case() {
        let (name, _, _) = parse(b"\x02DE\x00").unwrap();
        assert_eq!(name, b"\x02de\x00");
    }

    #[test]
    fn parse_question_name_rejects_compression() {
        assert_eq!(parse(b"\xc0\x0c"), Err(Error::CompressedName));
        assert_eq!(parse(b"\x40"), Err(Error::CompressedName));
    }

    #[test]
    fn parse_question_name_rejects_truncation() {
        assert_eq!(parse(b""), Err(Error::UnexpectedEnd));
        assert_eq!(parse(b"\x07exam"), Err(Error::UnexpectedEnd));
        assert_eq!(parse(b"\x07example"), Err(Error::UnexpectedEnd));
    }

    #[test]
    fn parse_question_name_rejects_long_names() {
        let mut long = Vec::new();
        for _ in 0..5 {
            long.push(63);
            long.extend_from_slice(&[b'x'; 63]);
        }
        long.push(0);
        assert_eq!(parse(&long), Err(Error::NameTooLong));
    }

    #[test]
    fn from_wire_works() {
        let name = Name::from_wire(b"\x03COM\x00").unwrap();
        assert_eq!(name.wire(), b"\x03com\x00");
        assert_eq!(name.label_count(), 1);
        assert!(!name.is_root());
    }

    #[test]
    fn from_wire_rejects_malformed_names() {
        assert_eq!(Name::from_wire(b""), Err(Error::UnexpectedEnd));
        assert_eq!(Name::from_wire(b"\x03com"), Err(Error::UnexpectedEnd));
        assert_eq!(Name::from_wire(b"\x00\x00"), Err(Error::TrailingData));
        assert_eq!(Name::from_wire(b"\xc0\x0c"), Err(Error::CompressedName));
    }

    #[test]
    fn eq_or_below_works() {
        let tld: Name = "de.".parse().unwrap();
        let host: Name = "a.nic.de.".parse().unwrap();
        let other: Name = "ie.".parse().unwrap();
        assert!(host.eq_or_below(&tld));
        assert!(tld.eq_or_below(&tld));
        assert!(tld.eq_or_below(&Name::root()));
        assert!(!tld.eq_or_below(&host));
        assert!(!other.eq_or_below(&tld));
    }

    #[test]
    fn ord_matches_rfc_4034() {
        // The ordered list from RFC 4034 § 6.1, which defines the
        // canonical ordering of domain names.
        let names: Vec<Name> = [
            "example.",
            "a.example.",
            "yljkjljk.a.example.",
            "Z.a.example.",
            "zABC.a.EXAMPLE.",
            "z.example.",
            "\\001.z.example.",
            "*.z.example.",
            "\\200.z.example.",
        ]
        .into_iter()
        .map(|n| n.parse().unwrap())
        .collect();

        for (i, ni) in names.iter().enumerate() {
            for (j, nj) in names.iter().enumerate() {
                assert_eq!(i.cmp(&j), ni.cmp(nj), "{} vs {}", ni, nj);
            }
        }
    }

    #[test]
    fn root_sorts_first() {
        let root = Name::root();
        let tld: Name = "aaa.".parse().unwrap();
        assert!(root < tld);
    }

    #[test]
    fn fromstr_works() {
        let name: Name = "example.TEST.".parse().unwrap();
        assert_eq!(name.wire(), b"\x07example\x04test\x00");
        assert_eq!(name.to_string(), "example.test.");
    }

    #[test]
    fn fromstr_escaping_works() {
        let name: Name = "\\000.\\\\\\..".parse().unwrap();
        assert_eq!(name.wire(), b"\x01\x00\x02\\.\x00");
        assert_eq!(name.to_string(), "\\000.\\\\\\..");
    }

    #[test]
    fn fromstr_rejects_invalid_input() {
        assert_eq!("".parse::<Name>(), Err(Error::StrEmpty));
        assert_eq!("✈.aero.".parse::<Name>(), Err(Error::StrNotAscii));
        assert_eq!("non.fqdn".parse::<Name>(), Err(Error::NonFqdn));
        assert_eq!("a..b.".parse::<Name>(), Err(Error::EmptyLabel));
        assert_eq!("\\0.".parse::<Name>(), Err(Error::InvalidEscape));
        assert_eq!("\\256.".parse::<Name>(), Err(Error::InvalidEscape));
        assert_eq!(
            "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx."
                .parse::<Name>(),
            Err(Error::LabelTooLong)
        );
    }
}
