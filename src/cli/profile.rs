use tabled::Table;

use super::{client_from_env, spinner};
use crate::{Caller, error, types::ProfileTableRow};

pub async fn me() {
    let spotify = client_from_env().await;
    if spotify.caller().await != Some(Caller::User) {
        error!("SPOTIFY_ACCESS_TOKEN is not set. Please run spotkit login");
    }

    let pb = spinner("Fetching profile...");
    let result = spotify.populate_user_creds().await;
    pb.finish_and_clear();

    if let Err(e) = result {
        error!("Cannot fetch profile. Err: {}", e);
    }

    let Some(user) = spotify.user_creds().await else {
        error!("No user credentials after login.");
    };

    let row = ProfileTableRow {
        id: user.user_id.unwrap_or_default(),
        name: user.display_name.unwrap_or_default(),
        country: user.country.unwrap_or_default(),
        product: user.product.unwrap_or_default(),
    };
    println!("{}", Table::new(vec![row]));
}
