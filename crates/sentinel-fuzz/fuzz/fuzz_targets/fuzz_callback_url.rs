#![no_main]

use libfuzzer_sys::fuzz_target;
use workspace_mcp_oauth::oauth::CallbackParams;

fuzz_target!(|data: &[u8]| {
    // Pasted redirect URLs are arbitrary user input
    if let Ok(raw) = std::str::from_utf8(data) {
        let _ = CallbackParams::from_url(raw);
        let _ = CallbackParams::from_query(raw);
    }
});
