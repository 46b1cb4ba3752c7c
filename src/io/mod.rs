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

//! Network front-ends for the server.
//!
//! The query engine itself ([`Context`](crate::server::Context)) is
//! I/O-agnostic: it consumes a byte slice and produces I/O segments.
//! This module supplies the plumbing around it. The one provider here,
//! [`BlockingIoProvider`], uses plain blocking sockets: per-worker
//! SO_REUSEPORT UDP sockets so the kernel spreads load across
//! workers, and a shared TCP listener with a thread per connection.

mod blocking;
pub use blocking::{BlockingIoConfig, BlockingIoProvider};
