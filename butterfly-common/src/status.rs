//! Closed set of reply status codes exposed at the query boundary

use std::fmt;

use crate::Error;

/// Status carried by every reply produced by the query layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyStatus {
    Ok,
    NotFound,
    MapNotFound,
    NotOk,
    UnknownPosition,
    InternalErrorInMap,
    NotSupported,
}

impl ReplyStatus {
    /// Numeric code used on the wire by the request/reply protocol
    pub fn code(self) -> u32 {
        match self {
            ReplyStatus::Ok => 0,
            ReplyStatus::NotOk => 1,
            ReplyStatus::NotFound => 2,
            ReplyStatus::MapNotFound => 3,
            ReplyStatus::UnknownPosition => 4,
            ReplyStatus::InternalErrorInMap => 5,
            ReplyStatus::NotSupported => 6,
        }
    }

    pub fn is_ok(self) -> bool {
        self == ReplyStatus::Ok
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplyStatus::Ok => "OK",
            ReplyStatus::NotFound => "NOTFOUND",
            ReplyStatus::MapNotFound => "MAPNOTFOUND",
            ReplyStatus::NotOk => "NOTOK",
            ReplyStatus::UnknownPosition => "UNKNOWN_POSITION",
            ReplyStatus::InternalErrorInMap => "INTERNAL_ERROR_IN_MAP",
            ReplyStatus::NotSupported => "NOTSUPPORTED",
        };
        f.write_str(name)
    }
}

impl From<&Error> for ReplyStatus {
    fn from(err: &Error) -> Self {
        match err {
            Error::MapNotFound(_) => ReplyStatus::MapNotFound,
            Error::ItemNotFound { .. } => ReplyStatus::NotFound,
            Error::CorruptMap { .. } => ReplyStatus::InternalErrorInMap,
            Error::InvalidInput(_) => ReplyStatus::NotOk,
            Error::Io(_) => ReplyStatus::NotOk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let all = [
            ReplyStatus::Ok,
            ReplyStatus::NotFound,
            ReplyStatus::MapNotFound,
            ReplyStatus::NotOk,
            ReplyStatus::UnknownPosition,
            ReplyStatus::InternalErrorInMap,
            ReplyStatus::NotSupported,
        ];
        let mut codes: Vec<u32> = all.iter().map(|s| s.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn display_uses_protocol_names() {
        assert_eq!(ReplyStatus::UnknownPosition.to_string(), "UNKNOWN_POSITION");
        assert_eq!(ReplyStatus::InternalErrorInMap.to_string(), "INTERNAL_ERROR_IN_MAP");
    }
}
