use rand::Rng;
use serde::{Deserialize, Serialize};

/// Shareable room identifier in `ABCD-1234` form.
pub type RoomId = String;

/// A room seats exactly the two duelists.
pub const ROOM_CAPACITY: usize = 2;

/// Maximum room password length in bytes.
pub const MAX_PASSWORD_LEN: usize = 64;

// No I or O, they read as 1 and 0 when shared aloud.
const ROOM_ID_LETTERS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Lifecycle phase of a private room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomPhase {
    /// Accepting occupants.
    Lobby,
    /// A battle was started from this room; no further joins.
    Consumed,
}

/// Generate a random room id. Uniqueness is the caller's job.
pub fn generate_room_id() -> RoomId {
    let mut rng = rand::rng();
    let mut id = String::with_capacity(9);
    for _ in 0..4 {
        let idx = rng.random_range(0..ROOM_ID_LETTERS.len());
        id.push(ROOM_ID_LETTERS[idx] as char);
    }
    id.push('-');
    for _ in 0..4 {
        id.push(char::from(b'0' + rng.random_range(0..10u8)));
    }
    id
}

/// Uppercase and trim a client-supplied room id.
pub fn normalize_room_id(raw: &str) -> RoomId {
    raw.trim().to_ascii_uppercase()
}

/// Check the `ABCD-1234` shape.
pub fn is_valid_room_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 9
        && bytes[..4].iter().all(|b| ROOM_ID_LETTERS.contains(b))
        && bytes[4] == b'-'
        && bytes[5..].iter().all(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid() {
        for _ in 0..200 {
            let id = generate_room_id();
            assert!(is_valid_room_id(&id), "invalid room id: {id}");
        }
    }

    #[test]
    fn malformed_ids_rejected() {
        assert!(!is_valid_room_id(""));
        assert!(!is_valid_room_id("ABCD1234"));
        assert!(!is_valid_room_id("ABCD-12345"));
        assert!(!is_valid_room_id("abcd-1234"));
        assert!(!is_valid_room_id("ABCO-1234"));
        assert!(!is_valid_room_id("ABCD-12X4"));
    }

    #[test]
    fn normalize_accepts_lowercase_input() {
        let id = normalize_room_id("  abcd-1234 ");
        assert_eq!(id, "ABCD-1234");
        assert!(is_valid_room_id(&id));
    }
}
