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

//! Implementation of the [`Error`] type for zone loading.

use std::fmt;
use std::io;

use domain::zonefile::inplace;

/// Errors that arise while loading a [`Zone`](super::Zone).
#[derive(Debug)]
pub enum Error {
    /// Reading the zone file failed.
    Io(io::Error),

    /// Scanning the zone file's presentation format failed.
    Parse(inplace::Error),

    /// The zone file uses `$INCLUDE`, which is not supported.
    IncludeNotSupported,

    /// The zone contains a record outside the IN class.
    ForeignClass,

    /// A record's owner name could not be used as a table key.
    MalformedOwner,

    /// The apex of the zone is not the root name.
    ApexNotRoot,

    /// The zone has no SOA record at its apex.
    NoSoa,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<inplace::Error> for Error {
    fn from(err: inplace::Error) -> Self {
        Self::Parse(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read the zone file: {}", err),
            Self::Parse(err) => write!(f, "failed to parse the zone file: {}", err),
            Self::IncludeNotSupported => f.write_str("$INCLUDE directives are not supported"),
            Self::ForeignClass => f.write_str("the zone contains a record outside the IN class"),
            Self::MalformedOwner => f.write_str("a record has a malformed owner name"),
            Self::ApexNotRoot => f.write_str("the apex of the zone is not the root"),
            Self::NoSoa => f.write_str("the zone has no SOA record at its apex"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}
