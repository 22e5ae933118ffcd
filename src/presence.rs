//! Presence Decoration
//!
//! Per-connection color and animal emoji, picked at random. Stateless.

use rand::seq::SliceRandom;

use crate::identity::Identity;
use crate::websocket::Presence;

pub const ANIMAL_EMOJIS: [&str; 20] = [
    "🦁", "🐮", "🐯", "🐰", "🐻", "🐼", "🐨", "🐸", "🐷", "🐵", "🦊", "🐺", "🐴", "🦄", "🐧",
    "🐦", "🦅", "🦆", "🐔", "🐢",
];

pub const USER_COLORS: [&str; 12] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#469990",
    "#9a6324", "#800000", "#808000", "#000075",
];

/// Visual decoration assigned to one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub color: String,
    pub emoji: String,
}

pub fn assign_decoration() -> Decoration {
    let mut rng = rand::thread_rng();
    let color = USER_COLORS.choose(&mut rng).copied().unwrap_or(USER_COLORS[0]);
    let emoji = ANIMAL_EMOJIS
        .choose(&mut rng)
        .copied()
        .unwrap_or(ANIMAL_EMOJIS[0]);

    Decoration {
        color: color.to_string(),
        emoji: emoji.to_string(),
    }
}

/// Build the presence record shown to other participants
pub fn presence_for(identity: &Identity, decoration: &Decoration) -> Presence {
    Presence {
        user_id: identity.subject.clone(),
        user_name: format!("{} {}", identity.display_name, decoration.emoji),
        user_color: decoration.color.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoration_from_fixed_sets() {
        for _ in 0..50 {
            let d = assign_decoration();
            assert!(USER_COLORS.contains(&d.color.as_str()));
            assert!(ANIMAL_EMOJIS.contains(&d.emoji.as_str()));
        }
    }

    #[test]
    fn test_presence_for() {
        let identity = Identity {
            subject: "ada@example.com".to_string(),
            display_name: "Ada".to_string(),
        };
        let decoration = Decoration {
            color: "#4363d8".to_string(),
            emoji: "🦊".to_string(),
        };

        let presence = presence_for(&identity, &decoration);
        assert_eq!(presence.user_id, "ada@example.com");
        assert_eq!(presence.user_name, "Ada 🦊");
        assert_eq!(presence.user_color, "#4363d8");
    }
}
