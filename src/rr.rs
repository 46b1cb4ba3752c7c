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

//! Provides the [`Type`] structure for DNS RR types.

use std::fmt;

////////////////////////////////////////////////////////////////////////
// RR TYPES                                                           //
////////////////////////////////////////////////////////////////////////

/// Represents the RR type of a DNS record (or the QTYPE of a
/// question; the two share a number space).
///
/// An RR type is represented on the wire as an unsigned 16-bit
/// integer. Hence this is basically a wrapper around `u16` with nice
/// [`Debug`](fmt::Debug) and [`Display`](fmt::Display)
/// implementations, plus constants for the types the server
/// classifies queries on.
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Type(u16);

impl Type {
    pub const A: Type = Type(1);
    pub const NS: Type = Type(2);
    pub const CNAME: Type = Type(5);
    pub const SOA: Type = Type(6);
    pub const MX: Type = Type(15);
    pub const TXT: Type = Type(16);
    pub const AAAA: Type = Type(28);
    pub const OPT: Type = Type(41);
    pub const DS: Type = Type(43);
    pub const RRSIG: Type = Type(46);
    pub const NSEC: Type = Type(47);
    pub const DNSKEY: Type = Type(48);

    /// The `*` QTYPE, requesting all records ([RFC 1035 § 3.2.3]).
    ///
    /// [RFC 1035 § 3.2.3]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.2.3
    pub const ANY: Type = Type(255);

    /// Returns whether this is a meta or QTYPE-range value other than
    /// `*` (the range 128 through 254). Queries for these are
    /// answered with NOTIMPL.
    pub fn is_meta(self) -> bool {
        (128..255).contains(&self.0)
    }
}

impl From<u16> for Type {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Type> for u16 {
    fn from(rr_type: Type) -> Self {
        rr_type.0
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::A => f.write_str("A"),
            Self::NS => f.write_str("NS"),
            Self::CNAME => f.write_str("CNAME"),
            Self::SOA => f.write_str("SOA"),
            Self::MX => f.write_str("MX"),
            Self::TXT => f.write_str("TXT"),
            Self::AAAA => f.write_str("AAAA"),
            Self::OPT => f.write_str("OPT"),
            Self::DS => f.write_str("DS"),
            Self::RRSIG => f.write_str("RRSIG"),
            Self::NSEC => f.write_str("NSEC"),
            Self::DNSKEY => f.write_str("DNSKEY"),
            Self::ANY => f.write_str("*"),
            Self(value) => write!(f, "TYPE{}", value),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_meta_covers_the_reserved_range() {
        assert!(!Type::TXT.is_meta());
        assert!(!Type::DNSKEY.is_meta());
        assert!(Type::from(128).is_meta());
        assert!(Type::from(250).is_meta());
        assert!(Type::from(254).is_meta());
        assert!(!Type::ANY.is_meta());
        assert!(!Type::from(256).is_meta());
    }

    #[test]
    fn unknown_types_display_numerically() {
        assert_eq!(Type::from(4095).to_string(), "TYPE4095");
        assert_eq!(Type::NSEC.to_string(), "NSEC");
    }
}
