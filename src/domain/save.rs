use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use super::workflow::{FlashType, Role};

/// Content fields accepted by the create and update endpoints. Older form
/// clients still post `worksite`, `short_text` and `event_date`; the aliases
/// map them onto the canonical column names at deserialization time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlashFields {
    pub title: Option<String>,
    #[serde(alias = "short_text")]
    pub title_short: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub root_causes: Option<String>,
    pub actions: Option<String>,
    #[serde(alias = "worksite")]
    pub site: Option<String>,
    #[serde(alias = "event_date")]
    pub occurred_at: Option<NaiveDate>,
    pub lang: Option<String>,
    pub flash_type: Option<String>,
    pub submission_comment: Option<String>,
    pub image_transforms: Option<serde_json::Value>,
    pub annotations_data: Option<serde_json::Value>,
    pub grid_bitmap: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SaveError {
    MissingTitle,
    UnknownType(String),
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveError::MissingTitle => f.write_str("title must not be empty"),
            SaveError::UnknownType(value) => write!(f, "unknown flash type: {value}"),
        }
    }
}

impl FlashFields {
    /// Required-field validation for the create path, where a title must be
    /// present. Updates call [`validate_partial`] instead.
    pub fn validate_create(&self) -> Result<(), SaveError> {
        match self.title.as_deref().map(str::trim) {
            Some("") | None => Err(SaveError::MissingTitle),
            Some(_) => self.validate_partial(),
        }
    }

    /// A partial update may omit the title, but may not blank it or carry an
    /// unknown type.
    pub fn validate_partial(&self) -> Result<(), SaveError> {
        if matches!(self.title.as_deref().map(str::trim), Some("")) {
            return Err(SaveError::MissingTitle);
        }
        if let Some(value) = self.flash_type.as_deref() {
            if FlashType::parse(value).is_none() {
                return Err(SaveError::UnknownType(value.to_string()));
            }
        }
        Ok(())
    }

    pub fn trimmed_title(&self) -> Option<String> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    pub fn occurred_at_datetime(&self) -> Option<NaiveDateTime> {
        self.occurred_at.and_then(|d| d.and_hms_opt(0, 0, 0))
    }
}

/// Creator, admin and safety may edit; everyone else is rejected before any
/// row is touched.
pub fn can_edit(role: Role, is_creator: bool) -> bool {
    is_creator || role.is_admin_or_safety()
}

pub fn can_submit(role: Role, is_creator: bool) -> bool {
    is_creator || role.is_admin_or_safety()
}

pub fn can_decide_supervisor(role: Role, is_selected_approver: bool) -> bool {
    is_selected_approver || role.is_admin_or_safety()
}

pub fn can_review(role: Role) -> bool {
    role.is_admin_or_safety()
}

pub fn can_archive(role: Role) -> bool {
    role.is_admin_or_safety()
}
