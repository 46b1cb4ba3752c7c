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

//! Implementation of the [`Rcode`] type.

use std::fmt;

////////////////////////////////////////////////////////////////////////
// RCODES                                                             //
////////////////////////////////////////////////////////////////////////

/// An extended response code.
///
/// [RFC 1035 § 4.1.1] defines the RCODE as a four-bit header field.
/// EDNS(0) ([RFC 6891 § 6.1.3]) widens it: the OPT RR carries eight
/// further high-order bits, giving twelve in total. This type holds
/// the extended value; [`Rcode::low_bits`] yields the nibble that goes
/// into the header, and [`Rcode::high_bits`] the octet that goes into
/// the OPT RR. For values below 16 the high octet is zero and a
/// response without an OPT RR loses nothing.
///
/// [RFC 1035 § 4.1.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1
/// [RFC 6891 § 6.1.3]: https://datatracker.ietf.org/doc/html/rfc6891#section-6.1.3
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
pub struct Rcode(u16);

impl Rcode {
    pub const NOERROR: Self = Self(0);
    pub const FORMERR: Self = Self(1);
    pub const SERVFAIL: Self = Self(2);
    pub const NXDOMAIN: Self = Self(3);
    pub const NOTIMPL: Self = Self(4);
    pub const REFUSED: Self = Self(5);
    pub const BADVERS: Self = Self(16);

    /// Returns the low four bits, for the header RCODE field.
    pub fn low_bits(self) -> u16 {
        self.0 & 0x000f
    }

    /// Returns the high eight bits, for the OPT extended-RCODE octet.
    pub fn high_bits(self) -> u8 {
        (self.0 >> 4) as u8
    }
}

impl From<u16> for Rcode {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Rcode> for u16 {
    fn from(rcode: Rcode) -> Self {
        rcode.0
    }
}

impl fmt::Debug for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", *self)
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::NOERROR => f.write_str("NOERROR"),
            Self::FORMERR => f.write_str("FORMERR"),
            Self::SERVFAIL => f.write_str("SERVFAIL"),
            Self::NXDOMAIN => f.write_str("NXDOMAIN"),
            Self::NOTIMPL => f.write_str("NOTIMPL"),
            Self::REFUSED => f.write_str("REFUSED"),
            Self::BADVERS => f.write_str("BADVERS"),
            Self(value) => write!(f, "RCODE{}", value),
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
    fn badvers_splits_across_header_and_opt() {
        assert_eq!(Rcode::BADVERS.low_bits(), 0);
        assert_eq!(Rcode::BADVERS.high_bits(), 1);
    }

    #[test]
    fn small_rcodes_fit_in_the_header() {
        for raw in 0..16 {
            let rcode = Rcode::from(raw);
            assert_eq!(rcode.low_bits(), raw);
            assert_eq!(rcode.high_bits(), 0);
        }
    }
}
