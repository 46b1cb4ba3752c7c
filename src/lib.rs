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

//! An authoritative DNS server for the root zone (and zones like it:
//! small, mostly static, DNSSEC-signed), built around one idea —
//! every answer the server can give is serialized at load time, so
//! answering a query is a parse, a table lookup, and a gathered
//! write.
//!
//! The [`zone`] module loads the signed zone and precomputes, per
//! owner name, a table of wire-format answers indexed by query
//! classification and the DO bit. The [`server`] module provides
//! [`Context`](server::Context), the per-query state machine that
//! validates a received message and assembles the response as I/O
//! segments borrowing those precomputed octets. The [`io`] module
//! runs the receive loops and transmits the segments; the `taprootd`
//! binary wires it all together.

pub mod buffer;
pub mod io;
pub mod message;
pub mod name;
pub mod rr;
pub mod server;
pub mod zone;
