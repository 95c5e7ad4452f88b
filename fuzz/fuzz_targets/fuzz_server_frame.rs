#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Exercise the raw-byte deserialization path (includes serde_json's
    // own UTF-8 validation and error handling for invalid sequences).
    let _ = serde_json::from_slice::<presence_client::protocol::PresenceSnapshot>(data);

    // Frame decoding takes str input; cover it for valid UTF-8.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = presence_client::protocol::ServerFrame::decode(s);
    }
});
