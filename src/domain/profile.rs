//! User profiles and the editable subset of their fields.

use serde::{Deserialize, Serialize};

use crate::domain::error::ValidationError;

const MAX_NAME_LEN: usize = 100;
const MAX_PHONE_LEN: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl Profile {
    /// Greeting name; falls back to "Trader" when no first name is set.
    pub fn display_name(&self) -> &str {
        let first = self.first_name.trim();
        if first.is_empty() { "Trader" } else { first }
    }
}

/// Fields a user may change on their own profile. Email is read-only.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
}

impl ProfileUpdate {
    /// Trims every field and checks lengths and phone characters.
    pub fn normalized(&self) -> Result<ProfileUpdate, ValidationError> {
        let update = ProfileUpdate {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
        };
        check_len("first_name", &update.first_name, MAX_NAME_LEN)?;
        check_len("last_name", &update.last_name, MAX_NAME_LEN)?;
        check_len("phone", &update.phone, MAX_PHONE_LEN)?;
        let phone_ok = update
            .phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
        if !phone_ok {
            return Err(ValidationError::new(
                "phone",
                "may only contain digits, spaces and + - ( )",
            ));
        }
        Ok(update)
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(())
}
