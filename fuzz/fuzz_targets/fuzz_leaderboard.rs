#![no_main]

use feed_the_gopher_client::protocol::Leaderboard;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<Leaderboard>(data);

    // The poller goes through from_json, which also sorts by rank.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(board) = Leaderboard::from_json(s) {
            assert!(board.elements.windows(2).all(|w| w[0].rank <= w[1].rank));
        }
    }
});
