use serde::{Deserialize, Serialize};

/// What a task generates. Used for logging and metrics only; it never
/// affects scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// Post or free-form text
    Text,

    /// Image from a prompt
    Image,

    /// Multi-day content plan
    ContentPlan,

    /// Rewriting a user prompt before image generation
    EnhancePrompt,
}

impl GenerationKind {
    pub fn all() -> &'static [GenerationKind] {
        &[Self::Text, Self::Image, Self::ContentPlan, Self::EnhancePrompt]
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::ContentPlan => "content_plan",
            Self::EnhancePrompt => "enhance_prompt",
        }
    }
}

impl std::fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for GenerationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.name() == s.to_lowercase())
            .ok_or_else(|| format!("Invalid generation kind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trips_through_from_str() {
        for kind in GenerationKind::all() {
            assert_eq!(kind.name().parse::<GenerationKind>(), Ok(*kind));
        }
        assert!("video".parse::<GenerationKind>().is_err());
    }
}
