pub mod focus;
pub mod manager;
pub mod model;
