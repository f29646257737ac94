use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 기능 노트 섹션.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum NoteSection {
    Ui,
    Backend,
    Data,
    Infra,
}

impl NoteSection {
    pub const ALL: [NoteSection; 4] = [Self::Ui, Self::Backend, Self::Data, Self::Infra];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ui => "ui",
            Self::Backend => "backend",
            Self::Data => "data",
            Self::Infra => "infra",
        }
    }
}

impl fmt::Display for NoteSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteSection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|section| section.as_str() == s)
            .ok_or_else(|| {
                CoreError::invalid_input("Invalid section. Must be one of: ui, backend, data, infra")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections() {
        assert_eq!("ui".parse::<NoteSection>().unwrap(), NoteSection::Ui);
        assert_eq!("infra".parse::<NoteSection>().unwrap(), NoteSection::Infra);
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        let err = "UI".parse::<NoteSection>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid section. Must be one of: ui, backend, data, infra"
        );
    }
}
