// Presentation layer - HTTP surface over the live pipeline and stored reports
pub mod app_state;
pub mod handlers;
pub mod live_view;
