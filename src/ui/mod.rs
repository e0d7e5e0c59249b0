pub mod app;
pub mod colors;
pub mod projector;
pub mod state;

pub use app::ChatApp;
pub use state::AppState;
