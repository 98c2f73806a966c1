use serde::{Deserialize, Serialize};

/// Opaque handle for one live WebSocket connection. Allocated by the server's
/// connection registry and never reused within a process.
pub type ConnectionId = u64;

/// Maximum display name length in bytes after trimming.
pub const MAX_NAME_LEN: usize = 32;

/// Name given to a connection before it sends `player:updateName`.
pub fn default_player_name(id: ConnectionId) -> String {
    format!("Player {id}")
}

/// Trim and validate a requested display name. Returns `None` when the name is
/// empty, too long, or contains control characters.
pub fn normalize_player_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.chars().any(|c| c.is_control()) {
        return None;
    }
    Some(name.to_string())
}

/// A seated room occupant, as shown to clients in `room:updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub id: ConnectionId,
    pub name: String,
    pub is_host: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed() {
        assert_eq!(normalize_player_name("  Ada  ").as_deref(), Some("Ada"));
    }

    #[test]
    fn empty_and_whitespace_names_rejected() {
        assert!(normalize_player_name("").is_none());
        assert!(normalize_player_name("   ").is_none());
    }

    #[test]
    fn overlong_names_rejected() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(normalize_player_name(&long).is_none());
        let exact = "x".repeat(MAX_NAME_LEN);
        assert!(normalize_player_name(&exact).is_some());
    }

    #[test]
    fn control_characters_rejected() {
        assert!(normalize_player_name("bad\u{7}name").is_none());
        assert!(normalize_player_name("two\nlines").is_none());
    }

    #[test]
    fn summary_uses_camel_case() {
        let summary = PlayerSummary {
            id: 7,
            name: "Ada".into(),
            is_host: true,
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"isHost\":true"));
    }
}
