// ABOUTME: Classification of stub counts and variable resolutions for audit reports
// ABOUTME: Maps raw usage data onto unused/missing/used/context/optional states

use std::fmt;

use super::audit::Resolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateState {
    Unused,
    Missing,
    Used,
    Context,
    Optional,
}

impl TemplateState {
    /// Classify a signed stub usage count
    pub fn from_count(count: i64) -> Self {
        match count {
            c if c < 0 => Self::Missing,
            0 => Self::Unused,
            _ => Self::Used,
        }
    }

    /// Classify how a variable lookup was resolved
    pub fn from_resolution(resolution: &Resolution) -> Self {
        match resolution {
            Resolution::Bound(_) => Self::Context,
            Resolution::Optional => Self::Optional,
            Resolution::Undefined => Self::Missing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Missing => "missing",
            Self::Used => "used",
            Self::Context => "context",
            Self::Optional => "optional",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Unused => "⚠️",
            Self::Missing => "❌",
            Self::Used => "✅",
            Self::Context => "📚",
            Self::Optional => "➕",
        }
    }
}

impl fmt::Display for TemplateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.emoji(), self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_count() {
        assert_eq!(TemplateState::from_count(-2), TemplateState::Missing);
        assert_eq!(TemplateState::from_count(-1), TemplateState::Missing);
        assert_eq!(TemplateState::from_count(0), TemplateState::Unused);
        assert_eq!(TemplateState::from_count(1), TemplateState::Used);
        assert_eq!(TemplateState::from_count(7), TemplateState::Used);
    }

    #[test]
    fn test_from_resolution() {
        assert_eq!(
            TemplateState::from_resolution(&Resolution::Bound("value".to_string())),
            TemplateState::Context
        );
        assert_eq!(
            TemplateState::from_resolution(&Resolution::Optional),
            TemplateState::Optional
        );
        assert_eq!(
            TemplateState::from_resolution(&Resolution::Undefined),
            TemplateState::Missing
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(TemplateState::Used.to_string(), "✅ (used)");
        assert_eq!(TemplateState::Missing.to_string(), "❌ (missing)");
        assert_eq!(TemplateState::Optional.to_string(), "➕ (optional)");
    }
}
