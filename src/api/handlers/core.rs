use axum::{extract::State, routing::get, Router};
use serde_json::json;

use crate::api::helpers::{ok, ApiResult};
use crate::api::types::SharedState;

async fn health(State(state): State<SharedState>) -> ApiResult {
    let db_ok = {
        let conn = state.conn()?;
        conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0)).is_ok()
    };
    ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "database": if db_ok { "ok" } else { "unavailable" },
    }))
}

pub fn routes() -> Router<SharedState> {
    Router::new().route("/api/health", get(health))
}
