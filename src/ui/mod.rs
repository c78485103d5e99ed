//! Ratatui front end: one tab per circulation view, with modal forms for every
//! operation that changes the catalog or a loan.
mod app;
mod forms;
mod helpers;
mod screens;
mod terminal;

pub use app::App;
pub use terminal::run_app;
