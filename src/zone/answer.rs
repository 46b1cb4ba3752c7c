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

//! Precomputed answers and their per-name tables.
//!
//! An [`Answer`] is an immutable, fully serialized response body:
//! everything that follows the question section of a response, already
//! in wire format. The query path never serializes records; it selects
//! an `Answer` and emits a borrowed view of its octets. A [`NameData`]
//! bundles the `Answer`s applicable to one owner name, indexed by
//! [`AnswerClass`] and the DO bit of the request.

use std::fmt;
use std::sync::Arc;

use crate::message::constants::{EDNS_UDP_PAYLOAD, OPT_RR_SIZE};
use crate::rr::Type;

////////////////////////////////////////////////////////////////////////
// ANSWER CLASSES                                                     //
////////////////////////////////////////////////////////////////////////

/// The classification of a query against the zone.
///
/// Root-zone queries fall into a small, closed set of shapes, which is
/// what makes full precomputation possible: the classification (plus
/// the DO bit) is the complete index into the precomputed answer
/// table.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AnswerClass {
    RootSoa,
    RootNs,
    RootDnskey,
    RootNsec,
    RootNodata,
    RootAny,
    TldDs,
    TldReferral,
    Nxdomain,
}

impl AnswerClass {
    /// The number of classifications.
    pub(crate) const COUNT: usize = 9;

    /// Classifies a query from its lookup outcome, QNAME label count,
    /// and QTYPE.
    pub fn classify(matched: bool, qlabels: u8, qtype: Type) -> Self {
        if !matched {
            Self::Nxdomain
        } else if qlabels > 1 {
            Self::TldReferral
        } else if qlabels == 1 {
            if qtype == Type::DS {
                Self::TldDs
            } else {
                Self::TldReferral
            }
        } else if qtype == Type::SOA {
            Self::RootSoa
        } else if qtype == Type::NS {
            Self::RootNs
        } else if qtype == Type::NSEC {
            Self::RootNsec
        } else if qtype == Type::DNSKEY {
            Self::RootDnskey
        } else if qtype == Type::ANY {
            Self::RootAny
        } else {
            Self::RootNodata
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

////////////////////////////////////////////////////////////////////////
// SERIALIZED RRSETS                                                  //
////////////////////////////////////////////////////////////////////////

/// An RRset serialized to uncompressed wire format: the concatenation
/// of its records, plus the record count. This is the intermediate
/// currency of answer construction at load time.
#[derive(Debug, Default)]
pub(super) struct RrsetWire {
    pub(super) count: u16,
    pub(super) octets: Vec<u8>,
}

////////////////////////////////////////////////////////////////////////
// ANSWERS                                                            //
////////////////////////////////////////////////////////////////////////

/// An immutable precomputed response body.
///
/// The wire octets hold the answer, authority, and additional sections
/// in order, followed by an 11-octet EDNS OPT RR template. The
/// template is always last; response assembly relies on that to strip
/// it (when the request carried no OPT RR) or to patch its
/// extended-RCODE octet (in a private copy) without touching the
/// sections in front of it. The recorded ARCOUNT includes the template
/// OPT RR.
pub struct Answer {
    wire: Vec<u8>,
    ancount: u16,
    nscount: u16,
    arcount: u16,
    authoritative: bool,
}

impl Answer {
    /// Builds an `Answer` from per-section lists of serialized RRsets.
    pub(super) fn build(
        answer: &[&RrsetWire],
        authority: &[&RrsetWire],
        additional: &[&RrsetWire],
        authoritative: bool,
    ) -> Self {
        let mut wire = Vec::new();
        let mut counts = [0u16; 3];
        for (section, sets) in [answer, authority, additional].into_iter().enumerate() {
            for set in sets {
                counts[section] += set.count;
                wire.extend_from_slice(&set.octets);
            }
        }
        wire.extend_from_slice(&opt_template());
        Self {
            wire,
            ancount: counts[0],
            nscount: counts[1],
            arcount: counts[2] + 1,
            authoritative,
        }
    }

    /// Returns the empty `Answer`: no records beyond the OPT RR
    /// template. Used for SERVFAIL and for truncated responses.
    pub(super) fn empty() -> Self {
        Self::build(&[], &[], &[], false)
    }

    /// Returns the full wire octets, ending with the OPT RR template.
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    /// Returns the wire octets with the trailing OPT RR template
    /// stripped.
    pub fn wire_sans_opt(&self) -> &[u8] {
        &self.wire[..self.wire.len() - OPT_RR_SIZE]
    }

    /// Returns the trailing OPT RR template.
    pub fn opt_octets(&self) -> &[u8] {
        &self.wire[self.wire.len() - OPT_RR_SIZE..]
    }

    /// Returns the total length of the wire octets, OPT RR included.
    pub fn len(&self) -> usize {
        self.wire.len()
    }

    pub fn ancount(&self) -> u16 {
        self.ancount
    }

    pub fn nscount(&self) -> u16 {
        self.nscount
    }

    /// Returns the ARCOUNT, counting the template OPT RR. Responses
    /// that strip the OPT RR report one less.
    pub fn arcount(&self) -> u16 {
        self.arcount
    }

    /// Returns whether responses built from this `Answer` set the AA
    /// bit.
    pub fn authoritative(&self) -> bool {
        self.authoritative
    }
}

impl fmt::Debug for Answer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Answer")
            .field("len", &self.wire.len())
            .field("ancount", &self.ancount)
            .field("nscount", &self.nscount)
            .field("arcount", &self.arcount)
            .field("authoritative", &self.authoritative)
            .finish()
    }
}

/// Produces the OPT RR template: a null owner, type OPT, our UDP
/// payload size as the class, a zeroed extended-RCODE/version/flags
/// word, and no RDATA.
fn opt_template() -> [u8; OPT_RR_SIZE] {
    let mut template = [0; OPT_RR_SIZE];
    template[1..3].copy_from_slice(&u16::from(Type::OPT).to_be_bytes());
    template[3..5].copy_from_slice(&EDNS_UDP_PAYLOAD.to_be_bytes());
    template
}

////////////////////////////////////////////////////////////////////////
// PER-NAME ANSWER TABLES                                             //
////////////////////////////////////////////////////////////////////////

/// The bundle of precomputed [`Answer`]s for a single owner name,
/// indexed by classification and DO bit.
///
/// Not every slot is populated at every name; the
/// [`Zone`](super::Zone) resolves empty slots to shared apex
/// fallbacks. Answers shared between names (a delegation's referral
/// reused by the glue names underneath it, for instance) are reference
/// counted.
pub struct NameData {
    slots: [[Option<Arc<Answer>>; 2]; AnswerClass::COUNT],
}

impl NameData {
    pub(super) fn new() -> Self {
        Self {
            slots: Default::default(),
        }
    }

    /// Populates the slot for `class` with a no-DO and a DO variant.
    pub(super) fn set(
        &mut self,
        class: AnswerClass,
        plain: Arc<Answer>,
        dnssec: Arc<Answer>,
    ) {
        self.slots[class.index()] = [Some(plain), Some(dnssec)];
    }

    /// Returns the precomputed answer for `class`, or `None` if the
    /// slot is not populated at this name.
    pub fn answer(&self, class: AnswerClass, do_bit: bool) -> Option<&Answer> {
        self.slots[class.index()][do_bit as usize].as_deref()
    }

    /// Returns a cloned handle to a slot, for sharing an answer with
    /// another name.
    pub(super) fn answer_arc(&self, class: AnswerClass, do_bit: bool) -> Option<Arc<Answer>> {
        self.slots[class.index()][do_bit as usize].clone()
    }
}

impl fmt::Debug for NameData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let populated = self
            .slots
            .iter()
            .filter(|pair| pair[0].is_some() || pair[1].is_some())
            .count();
        f.debug_struct("NameData")
            .field("populated_slots", &populated)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_follows_the_table() {
        use AnswerClass::*;
        let cases = [
            (false, 0, Type::SOA, Nxdomain),
            (false, 3, Type::A, Nxdomain),
            (true, 2, Type::A, TldReferral),
            (true, 1, Type::DS, TldDs),
            (true, 1, Type::A, TldReferral),
            (true, 1, Type::NS, TldReferral),
            (true, 0, Type::SOA, RootSoa),
            (true, 0, Type::NS, RootNs),
            (true, 0, Type::NSEC, RootNsec),
            (true, 0, Type::DNSKEY, RootDnskey),
            (true, 0, Type::ANY, RootAny),
            (true, 0, Type::A, RootNodata),
            (true, 0, Type::DS, RootNodata),
        ];
        for (matched, qlabels, qtype, expected) in cases {
            assert_eq!(
                AnswerClass::classify(matched, qlabels, qtype),
                expected,
                "classify({}, {}, {})",
                matched,
                qlabels,
                qtype
            );
        }
    }

    #[test]
    fn empty_answer_is_just_the_opt_template() {
        let empty = Answer::empty();
        assert_eq!(empty.len(), OPT_RR_SIZE);
        assert!(empty.wire_sans_opt().is_empty());
        assert_eq!(empty.ancount(), 0);
        assert_eq!(empty.nscount(), 0);
        assert_eq!(empty.arcount(), 1);
        assert!(!empty.authoritative());
    }

    #[test]
    fn opt_template_is_last_and_well_formed() {
        let set = RrsetWire {
            count: 2,
            octets: b"\x00\x00\x02\x00\x01\x00\x00\x00\x00\x00\x00".to_vec(),
        };
        let answer = Answer::build(&[&set], &[], &[], true);
        let opt = answer.opt_octets();
        assert_eq!(opt.len(), OPT_RR_SIZE);
        assert_eq!(opt[0], 0);
        assert_eq!(&opt[1..3], &u16::from(Type::OPT).to_be_bytes());
        assert_eq!(&opt[3..5], &EDNS_UDP_PAYLOAD.to_be_bytes());
        assert_eq!(&opt[5..], &[0; 6]);
        assert_eq!(answer.len(), set.octets.len() + OPT_RR_SIZE);
    }

    #[test]
    fn build_counts_sections_and_the_template() {
        let one = RrsetWire {
            count: 1,
            octets: vec![0xaa; 4],
        };
        let two = RrsetWire {
            count: 2,
            octets: vec![0xbb; 8],
        };
        let answer = Answer::build(&[&one, &two], &[&two], &[&one], true);
        assert_eq!(answer.ancount(), 3);
        assert_eq!(answer.nscount(), 2);
        assert_eq!(answer.arcount(), 2);
        assert!(answer.authoritative());
        assert_eq!(answer.wire_sans_opt().len(), 16);
    }

    #[test]
    fn name_data_slots_resolve_by_class_and_do_bit() {
        let mut data = NameData::new();
        let plain = Arc::new(Answer::empty());
        let dnssec = Arc::new(Answer::build(
            &[],
            &[&RrsetWire {
                count: 1,
                octets: vec![0; 4],
            }],
            &[],
            true,
        ));
        data.set(AnswerClass::RootSoa, plain, dnssec);
        let no_do = data.answer(AnswerClass::RootSoa, false).unwrap();
        let with_do = data.answer(AnswerClass::RootSoa, true).unwrap();
        assert_eq!(no_do.nscount(), 0);
        assert_eq!(with_do.nscount(), 1);
        assert!(data.answer(AnswerClass::TldDs, false).is_none());
    }
}
