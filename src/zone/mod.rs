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

//! The in-memory zone: every answer the server will ever give,
//! computed at load time.
//!
//! A [`Zone`] is built once by [`Zone::load`] and is read-only
//! afterwards; queries touch it through [`Zone::lookup`], which finds
//! the [`NameData`] of the query name or, on a miss, of its canonical
//! predecessor (whose NSEC proves the gap). Parsing of the zone file's
//! presentation format is delegated to the
//! [`domain`](domain::zonefile) crate; everything after that — record
//! grouping, wire serialization, and answer assembly — happens in the
//! `build` module.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use domain::base::name::FlattenInto;
use domain::zonefile::inplace::{Entry, Zonefile};

use crate::name::{canonical_cmp, Name};

mod answer;
mod build;
mod error;
pub use answer::{Answer, AnswerClass, NameData};
pub use error::Error;

////////////////////////////////////////////////////////////////////////
// ZONES                                                              //
////////////////////////////////////////////////////////////////////////

/// A zone with fully precomputed answers.
///
/// The primary table is a canonically ordered list of owner names,
/// probed by binary search; its order matches the zone's NSEC chain,
/// which is what makes predecessor-on-miss lookups yield valid
/// denial-of-existence proofs. An auxiliary hash map accelerates the
/// exact-match case to a single probe.
pub struct Zone {
    /// Owner names and their answers, in canonical order. The apex is
    /// always first.
    names: Vec<(Name, NameData)>,

    /// Exact-match accelerator: canonical wire form to table index.
    aux: HashMap<Box<[u8]>, usize>,

    /// The apex NODATA answers, the fallback for unpopulated slots,
    /// indexed by the DO bit.
    nodata: [Arc<Answer>; 2],

    /// The distinguished empty answer, used for SERVFAIL and
    /// truncation.
    empty: Answer,
}

impl Zone {
    /// Loads a zone from the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_reader(File::open(path)?)
    }

    /// Loads a zone from presentation-format data.
    pub fn from_reader(mut reader: impl io::Read) -> Result<Self, Error> {
        let mut zonefile = Zonefile::load(&mut reader)?;
        zonefile.set_origin(build::StoredName::root_bytes());
        let mut records = Vec::new();
        while let Some(entry) = zonefile.next_entry()? {
            match entry {
                Entry::Record(record) => records.push(record.flatten_into()),
                Entry::Include { .. } => return Err(Error::IncludeNotSupported),
            }
        }
        build::build_zone(records)
    }

    /// Looks up `qname` (in canonical wire form).
    ///
    /// On an exact match, returns the name's [`NameData`] and `true`.
    /// Otherwise returns the [`NameData`] of the greatest name
    /// preceding `qname` and `false`; if `qname` precedes every name,
    /// the apex entry is returned. `None` is only possible for a zone
    /// with no names at all, which loading never produces.
    pub fn lookup(&self, qname: &[u8]) -> Option<(&NameData, bool)> {
        if let Some(&index) = self.aux.get(qname) {
            return Some((&self.names[index].1, true));
        }
        match self
            .names
            .binary_search_by(|(name, _)| canonical_cmp(name.wire(), qname))
        {
            Ok(index) => Some((&self.names[index].1, true)),
            Err(0) => self.names.first().map(|(_, data)| (data, false)),
            Err(index) => Some((&self.names[index - 1].1, false)),
        }
    }

    /// Returns the answer for a classified query, falling back to the
    /// shared apex NODATA answer for slots the matched name does not
    /// populate.
    pub fn answer<'a>(&'a self, data: &'a NameData, class: AnswerClass, do_bit: bool) -> &'a Answer {
        match data.answer(class, do_bit) {
            Some(answer) => answer,
            None => &self.nodata[do_bit as usize],
        }
    }

    /// Returns the distinguished empty answer.
    pub fn empty_answer(&self) -> &Answer {
        &self.empty
    }

    /// Returns the number of owner names in the zone.
    pub fn name_count(&self) -> usize {
        self.names.len()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::constants::OPT_RR_SIZE;

    // A miniature signed root zone: two root servers with in-zone
    // glue, a signed delegation (aaa), an unsigned delegation (bbb),
    // and an NSEC chain over the authoritative names. The signatures
    // are structurally valid but not cryptographically meaningful.
    const ZONE: &str = "\
.\t86400\tIN\tSOA\ta.root-servers.test. nstld.example.test. 2023112201 1800 900 604800 86400
.\t86400\tIN\tRRSIG\tSOA 8 0 86400 20231206050000 20231123040000 46780 . MTIzNDU2Nzg5MGFiY2RlZjEyMzQ1Njc4OTBhYmNkZWY=
.\t518400\tIN\tNS\ta.root-servers.test.
.\t518400\tIN\tNS\tb.root-servers.test.
.\t518400\tIN\tRRSIG\tNS 8 0 518400 20231206050000 20231123040000 46780 . MTIzNDU2Nzg5MGFiY2RlZjEyMzQ1Njc4OTBhYmNkZWY=
.\t86400\tIN\tNSEC\taaa. NS SOA RRSIG NSEC DNSKEY
.\t86400\tIN\tRRSIG\tNSEC 8 0 86400 20231206050000 20231123040000 46780 . MTIzNDU2Nzg5MGFiY2RlZjEyMzQ1Njc4OTBhYmNkZWY=
.\t172800\tIN\tDNSKEY\t256 3 8 MTIzNDU2Nzg5MGFiY2RlZjEyMzQ1Njc4OTBhYmNkZWY=
.\t172800\tIN\tDNSKEY\t257 3 8 MTIzNDU2Nzg5MGFiY2RlZjEyMzQ1Njc4OTBhYmNkZWY=
.\t172800\tIN\tRRSIG\tDNSKEY 8 0 172800 20231206050000 20231123040000 20326 . MTIzNDU2Nzg5MGFiY2RlZjEyMzQ1Njc4OTBhYmNkZWY=
a.root-servers.test.\t518400\tIN\tA\t198.51.100.1
a.root-servers.test.\t518400\tIN\tAAAA\t2001:db8::53
b.root-servers.test.\t518400\tIN\tA\t198.51.100.2
aaa.\t172800\tIN\tNS\tns1.aaa.
aaa.\t86400\tIN\tDS\t12345 8 2 1234567890ABCDEF1234567890ABCDEF1234567890ABCDEF1234567890ABCDEF
aaa.\t86400\tIN\tRRSIG\tDS 8 1 86400 20231206050000 20231123040000 46780 . MTIzNDU2Nzg5MGFiY2RlZjEyMzQ1Njc4OTBhYmNkZWY=
aaa.\t86400\tIN\tNSEC\tbbb. NS DS RRSIG NSEC
aaa.\t86400\tIN\tRRSIG\tNSEC 8 1 86400 20231206050000 20231123040000 46780 . MTIzNDU2Nzg5MGFiY2RlZjEyMzQ1Njc4OTBhYmNkZWY=
ns1.aaa.\t172800\tIN\tA\t192.0.2.1
ns1.aaa.\t172800\tIN\tAAAA\t2001:db8::1
bbb.\t172800\tIN\tNS\tns1.bbb.
bbb.\t86400\tIN\tNSEC\t. NS RRSIG NSEC
bbb.\t86400\tIN\tRRSIG\tNSEC 8 1 86400 20231206050000 20231123040000 46780 . MTIzNDU2Nzg5MGFiY2RlZjEyMzQ1Njc4OTBhYmNkZWY=
ns1.bbb.\t172800\tIN\tA\t192.0.2.2
";

    fn zone() -> Zone {
        Zone::from_reader(ZONE.as_bytes()).unwrap()
    }

    #[test]
    fn load_orders_names_canonically() {
        let zone = zone();
        let names: Vec<String> = zone.names.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(
            names,
            [
                ".",
                "aaa.",
                "ns1.aaa.",
                "bbb.",
                "ns1.bbb.",
                "a.root-servers.test.",
                "b.root-servers.test.",
            ]
        );
        assert_eq!(zone.name_count(), 7);
    }

    #[test]
    fn exact_lookups_match() {
        let zone = zone();
        for (name, data) in &zone.names {
            let (found, matched) = zone.lookup(name.wire()).unwrap();
            assert!(matched, "{}", name);
            assert!(std::ptr::eq(found, data));
        }
    }

    #[test]
    fn missed_lookups_return_the_predecessor() {
        let zone = zone();
        let cases: [(&[u8], usize); 4] = [
            (b"\x03aab\x00", 2),         // between ns1.aaa and bbb
            (b"\x03ccc\x00", 4),         // between ns1.bbb and the glue
            (b"\x03zzz\x00", 6),         // after everything
            (b"\x03www\x03aaa\x00", 2),  // below aaa, after ns1.aaa
        ];
        for (qname, expected) in cases {
            let (found, matched) = zone.lookup(qname).unwrap();
            assert!(!matched);
            assert!(
                std::ptr::eq(found, &zone.names[expected].1),
                "lookup {:?}",
                qname
            );
        }
    }

    #[test]
    fn apex_answers_have_the_expected_shapes() {
        let zone = zone();
        let apex = &zone.names[0].1;

        let soa = apex.answer(AnswerClass::RootSoa, false).unwrap();
        assert_eq!((soa.ancount(), soa.nscount(), soa.arcount()), (1, 0, 1));
        assert!(soa.authoritative());
        let soa_do = apex.answer(AnswerClass::RootSoa, true).unwrap();
        assert_eq!(soa_do.ancount(), 2);

        // Two NS records, with glue for both root servers (A + AAAA
        // for one, A for the other).
        let ns = apex.answer(AnswerClass::RootNs, false).unwrap();
        assert_eq!((ns.ancount(), ns.nscount(), ns.arcount()), (2, 0, 4));
        let ns_do = apex.answer(AnswerClass::RootNs, true).unwrap();
        assert_eq!(ns_do.ancount(), 3);

        let dnskey = apex.answer(AnswerClass::RootDnskey, true).unwrap();
        assert_eq!(dnskey.ancount(), 3);

        let nsec = apex.answer(AnswerClass::RootNsec, true).unwrap();
        assert_eq!(nsec.ancount(), 2);

        let any = apex.answer(AnswerClass::RootAny, true).unwrap();
        assert_eq!(any.ancount(), 5);

        let nodata = apex.answer(AnswerClass::RootNodata, true).unwrap();
        assert_eq!((nodata.ancount(), nodata.nscount()), (0, 4));
    }

    #[test]
    fn referrals_carry_ds_or_nsec_and_glue() {
        let zone = zone();
        let aaa = &zone.names[1].1;
        let referral = aaa.answer(AnswerClass::TldReferral, false).unwrap();
        assert!(!referral.authoritative());
        assert_eq!(
            (referral.ancount(), referral.nscount(), referral.arcount()),
            (0, 1, 3)
        );
        // With DO, the signed delegation adds DS + RRSIG.
        let referral_do = aaa.answer(AnswerClass::TldReferral, true).unwrap();
        assert_eq!(referral_do.nscount(), 3);

        // The unsigned delegation proves the absence of the DS with
        // its NSEC instead.
        let bbb = &zone.names[3].1;
        let referral_do = bbb.answer(AnswerClass::TldReferral, true).unwrap();
        assert_eq!(referral_do.nscount(), 3);
        assert_eq!(referral_do.arcount(), 2);
    }

    #[test]
    fn ds_answers_follow_delegation_signedness() {
        let zone = zone();
        let aaa = &zone.names[1].1;
        let ds = aaa.answer(AnswerClass::TldDs, true).unwrap();
        assert_eq!((ds.ancount(), ds.nscount()), (2, 0));
        assert!(ds.authoritative());

        let bbb = &zone.names[3].1;
        let no_ds = bbb.answer(AnswerClass::TldDs, true).unwrap();
        assert_eq!((no_ds.ancount(), no_ds.nscount()), (0, 4));
        assert!(no_ds.authoritative());
    }

    #[test]
    fn nxdomain_answers_carry_the_covering_nsec() {
        let zone = zone();
        // ns1.bbb has no NSEC of its own; its nxdomain proof uses
        // bbb's NSEC plus the apex NSEC: SOA + RRSIG, NSEC + RRSIG,
        // NSEC + RRSIG.
        let glue = &zone.names[4].1;
        let nxdomain = glue.answer(AnswerClass::Nxdomain, true).unwrap();
        assert_eq!((nxdomain.ancount(), nxdomain.nscount()), (0, 6));
        assert!(nxdomain.authoritative());
        let plain = glue.answer(AnswerClass::Nxdomain, false).unwrap();
        assert_eq!(plain.nscount(), 1);

        // At the apex, the covering NSEC is the apex NSEC itself and
        // is not repeated.
        let apex = &zone.names[0].1;
        let nxdomain = apex.answer(AnswerClass::Nxdomain, true).unwrap();
        assert_eq!(nxdomain.nscount(), 4);
    }

    #[test]
    fn glue_names_share_their_delegation_referral() {
        let zone = zone();
        let aaa = zone.names[1].1.answer(AnswerClass::TldReferral, true).unwrap();
        let glue = zone.names[2].1.answer(AnswerClass::TldReferral, true).unwrap();
        assert!(std::ptr::eq(aaa, glue));
    }

    #[test]
    fn unpopulated_slots_fall_back_to_apex_nodata() {
        let zone = zone();
        let glue = &zone.names[2].1;
        assert!(glue.answer(AnswerClass::RootSoa, false).is_none());
        let fallback = zone.answer(glue, AnswerClass::RootSoa, false);
        assert_eq!(fallback.nscount(), 1);
        assert!(fallback.authoritative());
    }

    #[test]
    fn every_answer_ends_with_the_opt_template() {
        let zone = zone();
        use AnswerClass::*;
        for (name, data) in &zone.names {
            for class in [
                RootSoa, RootNs, RootDnskey, RootNsec, RootNodata, RootAny, TldDs,
                TldReferral, Nxdomain,
            ] {
                for do_bit in [false, true] {
                    if let Some(answer) = data.answer(class, do_bit) {
                        let opt = answer.opt_octets();
                        assert_eq!(opt[0], 0, "{} {:?}", name, class);
                        assert_eq!(&opt[1..3], b"\x00\x29");
                        assert!(answer.arcount() >= 1);
                    }
                }
            }
        }
        assert_eq!(zone.empty_answer().len(), OPT_RR_SIZE);
    }

    #[test]
    fn load_rejects_a_zone_without_an_apex_soa() {
        let result = Zone::from_reader("aaa.\t3600\tIN\tNS\tns1.aaa.\n".as_bytes());
        assert!(matches!(result, Err(Error::ApexNotRoot)));

        let result = Zone::from_reader(".\t3600\tIN\tNS\tns1.aaa.\n".as_bytes());
        assert!(matches!(result, Err(Error::NoSoa)));
    }

    #[test]
    fn load_rejects_includes() {
        let zone = "$INCLUDE other.zone\n";
        let result = Zone::from_reader(zone.as_bytes());
        assert!(matches!(result, Err(Error::IncludeNotSupported)));
    }

    #[test]
    fn load_rejects_foreign_classes() {
        let zone = ".\t3600\tCH\tTXT\t\"chaos\"\n";
        let result = Zone::from_reader(zone.as_bytes());
        assert!(matches!(result, Err(Error::ForeignClass)));
    }
}
