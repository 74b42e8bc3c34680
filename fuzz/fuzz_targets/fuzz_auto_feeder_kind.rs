#![no_main]

use feed_the_gopher_client::protocol::AutoFeederKind;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(&tier) = data.first() {
        if let Ok(kind) = AutoFeederKind::try_from(tier) {
            assert_eq!(kind.tier(), tier);
        }
    }
    let _ = serde_json::from_slice::<AutoFeederKind>(data);
});
