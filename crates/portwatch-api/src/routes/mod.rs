pub mod endpoints;
pub mod lookup;
pub mod monitor;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(endpoints::router())
        .merge(lookup::router())
        .merge(monitor::router())
}
