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

//! The per-query state machine.
//!
//! A [`Context`] turns one received DNS message into one response,
//! without blocking, allocating, or serializing records: it validates
//! and parses the message, classifies the question against the
//! [`Zone`], and assembles the response as a short list of I/O
//! segments — a freshly written header-plus-question head and a
//! borrowed view of a precomputed [`Answer`]'s wire octets.
//!
//! The outer contract is [`Context::execute`]: it returns `None` when
//! no response at all must be sent (short frames, messages with QR
//! set), and otherwise always produces a response, with parse and
//! lookup failures absorbed into the response's RCODE.
//!
//! A `Context` is meant to live on a worker thread and be reused for
//! query after query; [`Context::reset`] runs at the start of each
//! [`Context::execute`] call.

use std::io::IoSlice;

use arrayvec::ArrayVec;

use crate::buffer::{OutOfBounds, Overflow, ReadBuffer, WriteBuffer};
use crate::message::constants::*;
use crate::message::{Opcode, Rcode};
use crate::name::{self, MAX_WIRE_LEN};
use crate::rr::Type;
use crate::zone::{Answer, AnswerClass, Zone};

/// The size of the response head buffer. The head carries at most a
/// TCP length word, the fixed header, an uncompressed question, and a
/// copy of the OPT RR, which together stay well under this.
const HEAD_BUF_SIZE: usize = 512;

////////////////////////////////////////////////////////////////////////
// QUERY CONTEXTS                                                     //
////////////////////////////////////////////////////////////////////////

/// The state machine that answers a single query.
///
/// All fields are scratch space for the query being processed; the
/// only long-lived state is the reference to the shared, read-only
/// [`Zone`].
pub struct Context<'z> {
    zone: &'z Zone,

    /// The buffer the response head (and the patched OPT RR copy) is
    /// written into.
    head_buf: [u8; HEAD_BUF_SIZE],

    /// The lowercased wire form of the QNAME.
    qname_buf: [u8; MAX_WIRE_LEN + 1],
    qname_len: usize,

    qtype: Type,
    qdstart: usize,
    qdsize: usize,
    qlabels: u8,
    bufsize: usize,
    matched: bool,
    has_edns: bool,
    do_bit: bool,
    rcode: Rcode,
}

impl<'z> Context<'z> {
    /// Creates a `Context` answering from `zone`.
    pub fn new(zone: &'z Zone) -> Self {
        Self {
            zone,
            head_buf: [0; HEAD_BUF_SIZE],
            qname_buf: [0; MAX_WIRE_LEN + 1],
            qname_len: 0,
            qtype: Type::from(0),
            qdstart: 0,
            qdsize: 0,
            qlabels: 0,
            bufsize: EDNS_MIN_UDP_PAYLOAD as usize,
            matched: false,
            has_edns: false,
            do_bit: false,
            rcode: Rcode::NOERROR,
        }
    }

    /// Returns the per-query state to its initial values.
    pub fn reset(&mut self) {
        self.qname_len = 0;
        self.qtype = Type::from(0);
        self.qdstart = 0;
        self.qdsize = 0;
        self.qlabels = 0;
        self.bufsize = EDNS_MIN_UDP_PAYLOAD as usize;
        self.matched = false;
        self.has_edns = false;
        self.do_bit = false;
        self.rcode = Rcode::NOERROR;
    }

    /// Returns the extended RCODE of the last response produced.
    pub fn rcode(&self) -> Rcode {
        self.rcode
    }

    /// Returns whether the last lookup matched the QNAME exactly.
    pub fn matched(&self) -> bool {
        self.matched
    }

    /// Answers one DNS message.
    ///
    /// `input` holds the message; over TCP it starts with the two-octet
    /// length word. Returns `None` if the message must be dropped
    /// without any response. Otherwise returns the response as
    /// [`ResponseSegments`] borrowing from this `Context` and its
    /// [`Zone`]; the segments must be sent (and released) before the
    /// `Context` handles the next message.
    pub fn execute(&mut self, input: &[u8], tcp: bool) -> Option<ResponseSegments<'_>> {
        self.reset();
        let mut message = ReadBuffer::new(input);

        // TCP framing: require the length word, and a frame at least
        // as long as it promises.
        if tcp {
            if message.available() < 2 {
                return None;
            }
            let length = message.read_u16().ok()? as usize;
            if message.available() < length {
                return None;
            }
        }

        if message.available() < MIN_QUERY_SIZE {
            return None;
        }

        // The fixed header. None of these reads can fail past the
        // length check above.
        let id = message.read_u16().ok()?;
        let flags = message.read_u16().ok()?;
        let qdcount = message.read_u16().ok()?;
        let ancount = message.read_u16().ok()?;
        let nscount = message.read_u16().ok()?;
        let arcount = message.read_u16().ok()?;

        // Never answer a response.
        if flags & FLAGS_QR != 0 {
            return None;
        }

        // Point of no return: every path below emits a response, and
        // failures turn into response RCODEs.
        let zone = self.zone;
        let mut answer: &Answer = zone.empty_answer();

        if !valid_header(flags, qdcount, ancount, nscount, arcount) {
            self.rcode = Rcode::FORMERR;
        } else if Opcode::from_flags(flags) != Opcode::QUERY {
            self.rcode = Rcode::NOTIMPL;
        } else {
            if self.parse_packet(&mut message).is_err() {
                self.rcode = Rcode::FORMERR;
            }
            if self.rcode == Rcode::NOERROR {
                answer = self.perform_lookup();
            }
        }

        // The total response length drives TCP framing and UDP
        // truncation. Without EDNS in the request, the OPT RR template
        // is stripped from the response.
        let mut total_len = HEADER_SIZE + self.qdsize + answer.len();
        if !self.has_edns {
            total_len -= OPT_RR_SIZE;
        }
        let tc_bit = !tcp && total_len > self.bufsize;
        if tc_bit {
            answer = zone.empty_answer();
            total_len = HEADER_SIZE + self.qdsize + answer.len();
            if !self.has_edns {
                total_len -= OPT_RR_SIZE;
            }
        }

        // Response flags: copy the opcode; for QUERY, also copy RD and
        // CD. QR is always set; the low rcode nibble, TC, and AA as
        // computed.
        let mut out_flags = flags & FLAGS_OPCODE_MASK;
        if out_flags == 0 {
            out_flags |= flags & (FLAGS_RD | FLAGS_CD);
        }
        out_flags |= FLAGS_QR | self.rcode.low_bits();
        if tc_bit {
            out_flags |= FLAGS_TC;
        }
        if answer.authoritative() {
            out_flags |= FLAGS_AA;
        }

        let mut arcount_out = answer.arcount();
        if !self.has_edns {
            arcount_out -= 1;
        }

        let qdstart = self.qdstart;
        let qdsize = self.qdsize;
        let has_edns = self.has_edns;
        let ext_rcode = self.rcode.high_bits();

        let mut head = WriteBuffer::new(&mut self.head_buf);
        let layout = (|| {
            if tcp {
                head.write_u16(total_len as u16)?;
            }
            head.write_u16(id)?;
            head.write_u16(out_flags)?;
            head.write_u16(if qdsize > 0 { 1 } else { 0 })?;
            head.write_u16(answer.ancount())?;
            head.write_u16(answer.nscount())?;
            head.write_u16(arcount_out)?;

            // The question section is echoed from the request,
            // original casing and all.
            head.write_slice(&input[qdstart..qdstart + qdsize])?;
            let head_len = head.used();

            // The extended-rcode patch must not touch the shared
            // answer octets, so the OPT RR is copied into the head
            // buffer, patched there, and emitted as its own segment.
            let mut opt_start = None;
            if has_edns {
                let mut opt = [0; OPT_RR_SIZE];
                opt.copy_from_slice(answer.opt_octets());
                opt[OPT_EXT_RCODE_OFFSET] = ext_rcode;
                opt_start = Some(head.used());
                head.write_slice(&opt)?;
            }
            Ok::<_, Overflow>((head_len, opt_start))
        })();
        // The head buffer is sized for the worst case, so this cannot
        // actually overflow.
        let (head_len, opt_start) = layout.expect("response head buffer exhausted");

        Some(ResponseSegments {
            head: &self.head_buf[..head_len],
            body: answer.wire_sans_opt(),
            opt: opt_start.map(|start| &self.head_buf[start..start + OPT_RR_SIZE]),
        })
    }

    /// Parses the question and the optional EDNS OPT RR, and rejects
    /// trailing garbage. Out-of-bounds reads bubble up as `Err` and
    /// become FORMERR in the caller.
    fn parse_packet(&mut self, message: &mut ReadBuffer) -> Result<(), OutOfBounds> {
        self.parse_question(message)?;
        if self.rcode != Rcode::NOERROR {
            return Ok(());
        }
        self.parse_edns(message)?;
        if self.rcode != Rcode::NOERROR {
            return Ok(());
        }
        if message.available() > 0 {
            self.rcode = Rcode::FORMERR;
        }
        Ok(())
    }

    fn parse_question(&mut self, message: &mut ReadBuffer) -> Result<(), OutOfBounds> {
        self.qdstart = message.position();

        match name::parse_question_name(message, &mut self.qname_buf) {
            Ok((len, labels)) => {
                self.qname_len = len;
                self.qlabels = labels;
            }
            Err(_) => {
                self.rcode = Rcode::FORMERR;
                return Ok(());
            }
        }

        if message.available() < 4 {
            self.rcode = Rcode::FORMERR;
            return Ok(());
        }
        self.qtype = Type::from(message.read_u16()?);
        let qclass = message.read_u16()?;

        // The question section length, for echoing into the response.
        // Failures before this point leave the response's question
        // section empty.
        self.qdsize = message.position() - self.qdstart;

        if self.qtype.is_meta() {
            self.rcode = Rcode::NOTIMPL;
        } else if qclass != CLASS_IN {
            self.rcode = Rcode::NOTIMPL;
        }
        Ok(())
    }

    fn parse_edns(&mut self, message: &mut ReadBuffer) -> Result<(), OutOfBounds> {
        if message.available() == 0 {
            return Ok(());
        }
        if message.available() < OPT_RR_SIZE {
            self.rcode = Rcode::FORMERR;
            return Ok(());
        }

        // The OPT RR must have the root as its owner name.
        if message.read_u8()? != 0 {
            self.rcode = Rcode::FORMERR;
            return Ok(());
        }
        if Type::from(message.read_u16()?) != Type::OPT {
            self.rcode = Rcode::FORMERR;
            return Ok(());
        }

        self.bufsize = message.read_u16()?.max(EDNS_MIN_UDP_PAYLOAD) as usize;
        let _ext_rcode = message.read_u8()?;
        let version = message.read_u8()?;
        let edns_flags = message.read_u16()?;
        let rdlen = message.read_u16()? as usize;

        if message.available() < rdlen {
            self.rcode = Rcode::FORMERR;
            return Ok(());
        }
        message.skip(rdlen)?;

        // A valid OPT RR was received, so the response carries one.
        self.has_edns = true;
        self.do_bit = edns_flags & EDNS_DO != 0;

        if version > 0 {
            self.rcode = Rcode::BADVERS;
        }
        Ok(())
    }

    /// Looks the parsed question up in the zone and selects the
    /// precomputed answer.
    fn perform_lookup(&mut self) -> &'z Answer {
        let zone = self.zone;
        match zone.lookup(&self.qname_buf[..self.qname_len]) {
            Some((entry, matched)) => {
                self.matched = matched;
                self.rcode = if matched {
                    Rcode::NOERROR
                } else {
                    Rcode::NXDOMAIN
                };
                let class = AnswerClass::classify(matched, self.qlabels, self.qtype);
                zone.answer(entry, class, self.do_bit)
            }
            None => {
                self.rcode = Rcode::SERVFAIL;
                zone.empty_answer()
            }
        }
    }
}

/// Checks the received header per the fixed query profile: RCODE
/// zero, exactly one question, no answer or authority records, and at
/// most one additional record (the OPT RR).
fn valid_header(flags: u16, qdcount: u16, ancount: u16, nscount: u16, arcount: u16) -> bool {
    flags & FLAGS_RCODE_MASK == 0
        && qdcount == 1
        && ancount == 0
        && nscount == 0
        && arcount <= 1
}

////////////////////////////////////////////////////////////////////////
// RESPONSE SEGMENTS                                                  //
////////////////////////////////////////////////////////////////////////

/// A response, as the list of I/O segments to transmit in order.
///
/// The head segment (and the optional patched OPT RR segment) borrow
/// the [`Context`]'s buffers; the body segment borrows the selected
/// [`Answer`]'s wire octets inside the [`Zone`] and is never copied or
/// mutated.
#[derive(Debug)]
pub struct ResponseSegments<'a> {
    head: &'a [u8],
    body: &'a [u8],
    opt: Option<&'a [u8]>,
}

impl<'a> ResponseSegments<'a> {
    /// Returns the segments as [`IoSlice`]s for vectored transmission.
    pub fn io_slices(&self) -> ArrayVec<IoSlice<'a>, 3> {
        let mut slices = ArrayVec::new();
        slices.push(IoSlice::new(self.head));
        if !self.body.is_empty() {
            slices.push(IoSlice::new(self.body));
        }
        if let Some(opt) = self.opt {
            slices.push(IoSlice::new(opt));
        }
        slices
    }

    /// Returns the total length of the response in octets.
    pub fn total_len(&self) -> usize {
        self.head.len() + self.body.len() + self.opt.map_or(0, <[u8]>::len)
    }

    /// Concatenates the segments into one owned message.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(self.total_len());
        message.extend_from_slice(self.head);
        message.extend_from_slice(self.body);
        if let Some(opt) = self.opt {
            message.extend_from_slice(opt);
        }
        message
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
