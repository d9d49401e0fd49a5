mod auth;
mod error;
mod middleware;
mod routes;
mod server;
mod state;
mod view;

pub use error::ApiError;
pub use server::GatewayServer;
pub use state::AppState;
pub use view::RunView;
