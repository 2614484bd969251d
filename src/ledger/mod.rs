use crate::state::AppState;
use axum::Router;

mod dto;
mod error;
pub mod handlers;
pub mod posting;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use error::LedgerError;
pub use services::Ledger;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::me_routes())
        .merge(handlers::admin_routes())
}
