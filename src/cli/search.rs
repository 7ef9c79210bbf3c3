use serde_json::Value;
use tabled::Table;

use super::{client_from_env, spinner};
use crate::{error, types::SearchTableRow, warning};

/// Flattens a search answer into one row per item, in the order of `types`.
pub fn search_rows(answer: &Value, types: &[&str]) -> Vec<SearchTableRow> {
    let mut rows = Vec::new();
    for kind in types {
        let items = answer
            .get(format!("{kind}s"))
            .and_then(|page| page.get("items"))
            .and_then(Value::as_array);

        for item in items.into_iter().flatten().filter(|i| !i.is_null()) {
            let text = |key: &str| {
                item.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            rows.push(SearchTableRow {
                kind: kind.to_string(),
                name: text("name"),
                id: text("id"),
            });
        }
    }
    rows
}

pub async fn search(query: String, types: Vec<String>, limit: Option<u32>) {
    let spotify = client_from_env().await;
    let types: Vec<&str> = if types.is_empty() {
        vec!["track"]
    } else {
        types.iter().map(String::as_str).collect()
    };

    let pb = spinner(&format!("Searching for \"{query}\"..."));
    let result = spotify.search(&query, &types, None, limit, None).await;
    pb.finish_and_clear();

    let answer = match result {
        Ok(answer) => answer,
        Err(e) => error!("Search failed. Err: {}", e),
    };

    let rows = search_rows(&answer, &types);
    if rows.is_empty() {
        warning!("Nothing found for \"{}\"", query);
        return;
    }
    println!("{}", Table::new(rows));
}
