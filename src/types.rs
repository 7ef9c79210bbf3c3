use serde::{Deserialize, Serialize};
use tabled::Tabled;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn default_expires_in() -> u64 {
    3600
}

impl TokenResponse {
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[derive(Tabled)]
pub struct CredentialTableRow {
    pub field: String,
    pub value: String,
}

#[derive(Tabled)]
pub struct ProfileTableRow {
    pub id: String,
    pub name: String,
    pub country: String,
    pub product: String,
}

#[derive(Tabled)]
pub struct SearchTableRow {
    pub kind: String,
    pub name: String,
    pub id: String,
}
