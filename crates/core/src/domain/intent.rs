use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Fixed intent set the classifier maps free text onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ViewAgenda,
    Schedule,
    Alter,
    Cancel,
    Help,
    Greeting,
    OutOfScope,
    Unclassified,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewAgenda => "view_agenda",
            Self::Schedule => "schedule",
            Self::Alter => "alter",
            Self::Cancel => "cancel",
            Self::Help => "help",
            Self::Greeting => "greeting",
            Self::OutOfScope => "out_of_scope",
            Self::Unclassified => "unclassified",
        }
    }

    /// Help and greetings are answered even before the account has linked
    /// provider credentials.
    pub fn is_credential_independent(&self) -> bool {
        matches!(self, Self::Help | Self::Greeting | Self::OutOfScope | Self::Unclassified)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::{Classification, Intent};

    #[test]
    fn classification_decodes_with_and_without_target_date() {
        let with_date: Classification =
            serde_json::from_str(r#"{"intent":"view_agenda","target_date":"2025-12-30"}"#)
                .expect("decode with date");
        assert_eq!(with_date.intent, Intent::ViewAgenda);
        assert_eq!(with_date.target_date.map(|d| d.to_string()), Some("2025-12-30".to_owned()));

        let without: Classification =
            serde_json::from_str(r#"{"intent":"cancel"}"#).expect("decode without date");
        assert_eq!(without.intent, Intent::Cancel);
        assert!(without.target_date.is_none());
    }

    #[test]
    fn scheduling_intents_require_credentials() {
        assert!(Intent::Help.is_credential_independent());
        assert!(Intent::Greeting.is_credential_independent());
        assert!(!Intent::Schedule.is_credential_independent());
        assert!(!Intent::Cancel.is_credential_independent());
    }
}
