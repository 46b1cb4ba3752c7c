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

//! Answer precomputation: the load-time walk that turns the parsed
//! zone into per-name tables of serialized answers.
//!
//! The walk visits owner names in canonical order, which makes two
//! things fall out naturally: the NSEC that covers the gap *after* an
//! owner is the most recent NSEC seen at or before it, and the names
//! underneath a delegation follow the delegation itself, so they can
//! share its referral answers by reference.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use domain::base::iana::Class;
use domain::base::record::Record;
use domain::rdata::ZoneRecordData;

use crate::name::Name;
use crate::rr::Type;

use super::answer::{Answer, AnswerClass, NameData, RrsetWire};
use super::{Error, Zone};

/// The domain-name type produced by the zone-file scanner.
pub(super) type StoredName = domain::base::name::Name<Bytes>;

/// A fully owned record as produced by the zone-file scanner.
pub(super) type StoredRecord = Record<StoredName, ZoneRecordData<Bytes, StoredName>>;

////////////////////////////////////////////////////////////////////////
// RECORD GROUPING                                                    //
////////////////////////////////////////////////////////////////////////

/// The records of a single owner name, serialized and grouped into
/// RRsets. RRSIGs are kept apart, keyed by the type they cover, so
/// that answer construction can include or omit them per the DO bit.
#[derive(Default)]
struct OwnerSets {
    rrsets: Vec<(Type, RrsetWire)>,
    sigs: Vec<(Type, RrsetWire)>,
    ns_targets: Vec<Name>,
}

impl OwnerSets {
    fn rrset(&self, rtype: Type) -> Option<&RrsetWire> {
        self.rrsets
            .iter()
            .find(|(t, _)| *t == rtype)
            .map(|(_, set)| set)
    }

    fn sig(&self, covered: Type) -> Option<&RrsetWire> {
        self.sigs
            .iter()
            .find(|(t, _)| *t == covered)
            .map(|(_, set)| set)
    }

    /// Returns the NSEC RRset and its signature, if this owner has
    /// one.
    fn nsec(&self) -> Option<(&RrsetWire, Option<&RrsetWire>)> {
        self.rrset(Type::NSEC)
            .map(|nsec| (nsec, self.sig(Type::NSEC)))
    }
}

/// Groups the scanned records by owner name in canonical order.
fn group(records: Vec<StoredRecord>) -> Result<BTreeMap<Name, OwnerSets>, Error> {
    let mut owners: BTreeMap<Name, OwnerSets> = BTreeMap::new();
    for record in records {
        if record.class() != Class::IN {
            return Err(Error::ForeignClass);
        }
        let owner =
            Name::from_wire(record.owner().as_slice()).map_err(|_| Error::MalformedOwner)?;
        let sets = owners.entry(owner.clone()).or_default();
        if let ZoneRecordData::Ns(ns) = record.data() {
            let target =
                Name::from_wire(ns.nsdname().as_slice()).map_err(|_| Error::MalformedOwner)?;
            sets.ns_targets.push(target);
        }
        let (key, table) = match record.data() {
            ZoneRecordData::Rrsig(rrsig) => {
                (Type::from(rrsig.type_covered().to_int()), &mut sets.sigs)
            }
            _ => (Type::from(record.rtype().to_int()), &mut sets.rrsets),
        };
        let position = match table.iter().position(|(t, _)| *t == key) {
            Some(position) => position,
            None => {
                table.push((key, RrsetWire::default()));
                table.len() - 1
            }
        };
        let set = &mut table[position].1;
        set.count += 1;
        compose_rr(&mut set.octets, &owner, &record);
    }
    Ok(owners)
}

/// Appends one record in uncompressed wire format. The owner comes
/// from the canonical table key, so owner names in answers are
/// lowercase.
fn compose_rr(octets: &mut Vec<u8>, owner: &Name, record: &StoredRecord) {
    use domain::base::rdata::ComposeRecordData;

    octets.extend_from_slice(owner.wire());
    octets.extend_from_slice(&record.rtype().to_int().to_be_bytes());
    octets.extend_from_slice(&record.class().to_int().to_be_bytes());
    octets.extend_from_slice(&record.ttl().as_secs().to_be_bytes());
    let mut rdata = Vec::new();
    // Appending to a Vec cannot fail.
    record.data().compose_rdata(&mut rdata).unwrap();
    octets.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    octets.extend_from_slice(&rdata);
}

////////////////////////////////////////////////////////////////////////
// THE PRECOMPUTATION WALK                                            //
////////////////////////////////////////////////////////////////////////

/// Builds a [`Zone`] from the scanned records.
pub(super) fn build_zone(records: Vec<StoredRecord>) -> Result<Zone, Error> {
    let owners = group(records)?;

    // Structural checks: the least name must be the root (the apex of
    // the zone this server is built to serve), and it must own a SOA.
    let (apex_name, apex) = owners.iter().next().ok_or(Error::NoSoa)?;
    if !apex_name.is_root() {
        return Err(Error::ApexNotRoot);
    }
    let soa = apex.rrset(Type::SOA).ok_or(Error::NoSoa)?;
    let soa_sig = apex.sig(Type::SOA);
    let apex_nsec = apex.nsec();

    let mut names: Vec<(Name, NameData)> = Vec::with_capacity(owners.len());
    let mut aux: HashMap<Box<[u8]>, usize> = HashMap::with_capacity(owners.len());
    let mut nodata: Option<[Arc<Answer>; 2]> = None;

    // Walk state: the most recent NSEC-bearing owner, and the most
    // recent delegation (whose referral the names underneath share).
    let mut last_nsec: Option<(&RrsetWire, Option<&RrsetWire>)> = None;
    let mut last_delegation: Option<(&Name, [Arc<Answer>; 2])> = None;

    for (name, sets) in &owners {
        let mut data = NameData::new();
        let own_nsec = sets.nsec();
        let covering_nsec = own_nsec.or(last_nsec);

        // Every owner can be the predecessor of a missing name, so
        // every owner gets an nxdomain slot: the SOA, and with DO the
        // covering NSEC plus the apex NSEC (the wildcard-absence
        // proof) when the two differ.
        let mut nxdomain_do: Vec<&RrsetWire> = Vec::new();
        extend(&mut nxdomain_do, Some(soa), soa_sig);
        if let Some((nsec, nsec_sig)) = covering_nsec {
            extend(&mut nxdomain_do, Some(nsec), nsec_sig);
            if let Some((apex_set, apex_sig)) = apex_nsec {
                if !std::ptr::eq(apex_set, nsec) {
                    extend(&mut nxdomain_do, Some(apex_set), apex_sig);
                }
            }
        }
        data.set(
            AnswerClass::Nxdomain,
            Arc::new(Answer::build(&[], &[soa], &[], true)),
            Arc::new(Answer::build(&[], &nxdomain_do, &[], true)),
        );

        if name.is_root() {
            build_apex(&mut data, &owners, sets, soa, soa_sig, apex_nsec, &mut nodata);
        } else if name.label_count() == 1 {
            build_delegation(&mut data, &owners, sets, soa, soa_sig, own_nsec);
            if let Some(referral) = referral_pair(&data) {
                last_delegation = Some((name, referral));
            }
        } else if let Some((delegation, referral)) = &last_delegation {
            // Glue names answer like the delegation above them.
            if name.eq_or_below(delegation) {
                data.set(
                    AnswerClass::TldReferral,
                    referral[0].clone(),
                    referral[1].clone(),
                );
            }
        }

        if own_nsec.is_some() {
            last_nsec = own_nsec;
        }
        aux.insert(name.wire().to_vec().into_boxed_slice(), names.len());
        names.push((name.clone(), data));
    }

    // The apex is always visited first, so the fallback is always
    // populated by now.
    let nodata = nodata.ok_or(Error::NoSoa)?;

    Ok(Zone {
        names,
        aux,
        nodata,
        empty: Answer::empty(),
    })
}

/// Populates the apex-only slots.
fn build_apex(
    data: &mut NameData,
    owners: &BTreeMap<Name, OwnerSets>,
    apex: &OwnerSets,
    soa: &RrsetWire,
    soa_sig: Option<&RrsetWire>,
    apex_nsec: Option<(&RrsetWire, Option<&RrsetWire>)>,
    nodata: &mut Option<[Arc<Answer>; 2]>,
) {
    let ns = apex.rrset(Type::NS);
    let ns_sig = apex.sig(Type::NS);
    let glue = collect_glue(owners, &apex.ns_targets);

    // root_soa
    data.set(
        AnswerClass::RootSoa,
        make(&[(Some(soa), None)], &[], &[], true),
        make(&[(Some(soa), soa_sig)], &[], &[], true),
    );

    // root_ns
    if let Some(ns) = ns {
        data.set(
            AnswerClass::RootNs,
            make_with_glue(&[(Some(ns), None)], &glue, true),
            make_with_glue(&[(Some(ns), ns_sig)], &glue, true),
        );
    }

    // root_dnskey
    if let Some(dnskey) = apex.rrset(Type::DNSKEY) {
        data.set(
            AnswerClass::RootDnskey,
            make(&[(Some(dnskey), None)], &[], &[], true),
            make(&[(Some(dnskey), apex.sig(Type::DNSKEY))], &[], &[], true),
        );
    }

    // root_nsec
    if let Some((nsec, nsec_sig)) = apex_nsec {
        data.set(
            AnswerClass::RootNsec,
            make(&[(Some(nsec), None)], &[], &[], true),
            make(&[(Some(nsec), nsec_sig)], &[], &[], true),
        );
    }

    // root_any
    data.set(
        AnswerClass::RootAny,
        make_with_glue(&[(Some(soa), None), (ns, None)], &glue, true),
        make_with_glue(&[(Some(soa), soa_sig), (ns, ns_sig)], &glue, true),
    );

    // root_nodata, which doubles as the zone-wide fallback for
    // unpopulated slots
    let plain = make(&[], &[(Some(soa), None)], &[], true);
    let dnssec = make(&[], &[(Some(soa), soa_sig), unpack(apex_nsec)], &[], true);
    data.set(AnswerClass::RootNodata, plain.clone(), dnssec.clone());
    *nodata = Some([plain, dnssec]);
}

/// Populates the delegation slots of a TLD-level owner.
fn build_delegation(
    data: &mut NameData,
    owners: &BTreeMap<Name, OwnerSets>,
    sets: &OwnerSets,
    soa: &RrsetWire,
    soa_sig: Option<&RrsetWire>,
    own_nsec: Option<(&RrsetWire, Option<&RrsetWire>)>,
) {
    let ds = sets.rrset(Type::DS);
    let ds_sig = sets.sig(Type::DS);

    // tld_referral: the delegation NS set, and with DO either the DS
    // (signed child) or the owner's NSEC (proof there is no DS).
    if let Some(ns) = sets.rrset(Type::NS) {
        let glue = collect_glue(owners, &sets.ns_targets);
        let mut authority_do: Vec<&RrsetWire> = Vec::new();
        extend(&mut authority_do, Some(ns), None);
        if ds.is_some() {
            extend(&mut authority_do, ds, ds_sig);
        } else if let Some((nsec, nsec_sig)) = own_nsec {
            extend(&mut authority_do, Some(nsec), nsec_sig);
        }
        let plain = Arc::new(Answer::build(&[], &[ns], &glue, false));
        let dnssec = Arc::new(Answer::build(&[], &authority_do, &glue, false));
        data.set(AnswerClass::TldReferral, plain, dnssec);
    }

    // tld_ds: authoritative data from the parent side of the cut. An
    // unsigned delegation gets the NODATA shape instead.
    if ds.is_some() {
        data.set(
            AnswerClass::TldDs,
            make(&[(ds, None)], &[], &[], true),
            make(&[(ds, ds_sig)], &[], &[], true),
        );
    } else {
        data.set(
            AnswerClass::TldDs,
            make(&[], &[(Some(soa), None)], &[], true),
            make(&[], &[(Some(soa), soa_sig), unpack(own_nsec)], &[], true),
        );
    }
}

////////////////////////////////////////////////////////////////////////
// ASSEMBLY HELPERS                                                   //
////////////////////////////////////////////////////////////////////////

/// Flattens `(RRset, RRSIG)` pairs into a section list, skipping
/// absent entries.
fn extend<'a>(
    list: &mut Vec<&'a RrsetWire>,
    set: Option<&'a RrsetWire>,
    sig: Option<&'a RrsetWire>,
) {
    if let Some(set) = set {
        list.push(set);
        if let Some(sig) = sig {
            list.push(sig);
        }
    }
}

/// Splits an optional `(RRset, RRSIG)` pair back into its parts.
fn unpack<'a>(
    pair: Option<(&'a RrsetWire, Option<&'a RrsetWire>)>,
) -> (Option<&'a RrsetWire>, Option<&'a RrsetWire>) {
    match pair {
        Some((set, sig)) => (Some(set), sig),
        None => (None, None),
    }
}

/// Builds an answer from `(RRset, RRSIG)` pairs for the answer and
/// authority sections.
fn make(
    answer: &[(Option<&RrsetWire>, Option<&RrsetWire>)],
    authority: &[(Option<&RrsetWire>, Option<&RrsetWire>)],
    additional: &[&RrsetWire],
    authoritative: bool,
) -> Arc<Answer> {
    let mut answer_sets = Vec::new();
    for &(set, sig) in answer {
        extend(&mut answer_sets, set, sig);
    }
    let mut authority_sets = Vec::new();
    for &(set, sig) in authority {
        extend(&mut authority_sets, set, sig);
    }
    Arc::new(Answer::build(
        &answer_sets,
        &authority_sets,
        additional,
        authoritative,
    ))
}

/// [`make`], with glue in the additional section.
fn make_with_glue(
    answer: &[(Option<&RrsetWire>, Option<&RrsetWire>)],
    glue: &[&RrsetWire],
    authoritative: bool,
) -> Arc<Answer> {
    make(answer, &[], glue, authoritative)
}

/// Collects the in-zone A and AAAA RRsets of the given NS targets.
fn collect_glue<'a>(
    owners: &'a BTreeMap<Name, OwnerSets>,
    targets: &[Name],
) -> Vec<&'a RrsetWire> {
    let mut glue = Vec::new();
    for target in targets {
        if let Some(sets) = owners.get(target) {
            for rtype in [Type::A, Type::AAAA] {
                if let Some(set) = sets.rrset(rtype) {
                    glue.push(set);
                }
            }
        }
    }
    glue
}

/// Extracts the referral pair just installed by [`build_delegation`],
/// for sharing with the names below the delegation.
fn referral_pair(data: &NameData) -> Option<[Arc<Answer>; 2]> {
    let plain = data.answer_arc(AnswerClass::TldReferral, false)?;
    let dnssec = data.answer_arc(AnswerClass::TldReferral, true)?;
    Some([plain, dnssec])
}
