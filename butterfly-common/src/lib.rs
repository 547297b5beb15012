//! Common utilities for the butterfly-map toolkit

pub mod error;
pub mod status;

pub use error::{Error, Result};
pub use status::ReplyStatus;

#[cfg(test)]
mod tests {
    use crate::{Error, ReplyStatus};

    #[test]
    fn map_not_found_translates_to_reply_status() {
        let err = Error::MapNotFound(42);
        assert_eq!(ReplyStatus::from(&err), ReplyStatus::MapNotFound);
        assert_eq!(err.to_string(), "map 000000042 is not loaded");
    }
}
