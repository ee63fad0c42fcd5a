//! Fuzz target for channel event decoding
//!
//! Feeds arbitrary text to `Inbound::decode` and `Outbound::decode`.
//!
//! # Invariants
//!
//! - Decoding never panics; malformed input is an error
//! - Anything that decodes re-encodes, and the re-encoded text decodes to
//!   the same event kind

#![no_main]

use festsync_proto::{Inbound, Outbound};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(event) = Inbound::decode(text) {
        let encoded = event.encode().expect("decoded event must encode");
        let again = Inbound::decode(&encoded).expect("encoded event must decode");
        assert_eq!(event.name(), again.name());
    }

    if let Ok(event) = Outbound::decode(text) {
        let encoded = event.encode().expect("decoded event must encode");
        let again = Outbound::decode(&encoded).expect("encoded event must decode");
        assert_eq!(event, again, "outbound {} changed across a round trip", event.name());
    }
});
