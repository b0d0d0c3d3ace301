#![no_main]

use libfuzzer_sys::fuzz_target;
use workspace_mcp_oauth::oauth::persist::parse_table;

fuzz_target!(|data: &[u8]| {
    // A damaged state file must parse or fail, never panic
    if let Ok(raw) = std::str::from_utf8(data) {
        if let Ok(table) = parse_table(raw) {
            // Whatever parsed must serialize back
            let _ = serde_json::to_string(&table).expect("re-encode parsed table");
        }
    }
});
