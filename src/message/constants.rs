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

//! Constants related to DNS messages.
//!
//! The flag masks apply to the 16-bit flags word of the message header
//! ([RFC 1035 § 4.1.1]); the EDNS constants follow [RFC 6891].
//!
//! [RFC 1035 § 4.1.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1
//! [RFC 6891]: https://datatracker.ietf.org/doc/html/rfc6891

pub const HEADER_SIZE: usize = 12;

/// The IN class, the only QCLASS this server serves.
pub const CLASS_IN: u16 = 1;

/// The smallest well-formed query: a header, a root QNAME, a QTYPE,
/// and a QCLASS.
pub const MIN_QUERY_SIZE: usize = HEADER_SIZE + 1 + 2 + 2;

pub const FLAGS_QR: u16 = 0x8000;
pub const FLAGS_OPCODE_MASK: u16 = 0x7800;
pub const FLAGS_OPCODE_SHIFT: usize = 11;
pub const FLAGS_AA: u16 = 0x0400;
pub const FLAGS_TC: u16 = 0x0200;
pub const FLAGS_RD: u16 = 0x0100;
pub const FLAGS_CD: u16 = 0x0010;
pub const FLAGS_RCODE_MASK: u16 = 0x000f;

/// The size of an EDNS OPT RR carrying no options: a null owner name,
/// the TYPE, the requestor's payload size (CLASS), the extended RCODE,
/// version, and flags (TTL), and a zero RDLENGTH.
pub const OPT_RR_SIZE: usize = 11;

/// The offset of the extended-RCODE octet within an OPT RR.
pub const OPT_EXT_RCODE_OFFSET: usize = 5;

/// The DO ("DNSSEC OK") bit of the EDNS flags word.
pub const EDNS_DO: u16 = 0x8000;

/// The floor [RFC 6891 § 6.2.3] places on a requestor's advertised
/// UDP payload size.
pub const EDNS_MIN_UDP_PAYLOAD: u16 = 512;

/// The UDP payload size this server advertises in its own OPT RRs.
pub const EDNS_UDP_PAYLOAD: u16 = 1232;
