use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use rand::{Rng, distr::Alphanumeric};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn generate_code_verifier() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(128)
        .map(char::from)
        .collect()
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Random value for the OAuth2 `state` parameter.
pub fn create_secret() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    STANDARD.encode(bytes)
}

pub fn comma_join<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(",")
}

/// Breadth-first lookup of `key` in nested JSON objects, `depth` levels deep.
///
/// Paging objects sit at different depths depending on the endpoint
/// (`/me/playlists` vs `/search`), so `next`/`previous` are searched for.
pub fn find_key_recursively<'a>(value: &'a Value, key: &str, depth: usize) -> Option<&'a Value> {
    let mut level: Vec<&Value> = vec![value];

    for _ in 0..depth {
        if level.is_empty() {
            break;
        }

        for obj in &level {
            if let Some(found) = obj.get(key).filter(|v| !v.is_null()) {
                return Some(found);
            }
        }

        level = level
            .iter()
            .filter_map(|v| v.as_object())
            .flat_map(|map| map.values())
            .filter(|v| v.is_object())
            .collect();
    }

    None
}

/// Extracts an authorization code from either a bare code or the full
/// redirect URL the user landed on.
pub fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    match reqwest::Url::parse(input) {
        Ok(url) => url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned()),
        Err(_) => Some(input.to_string()),
    }
}
