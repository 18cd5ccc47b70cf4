mod loader;

pub use loader::{Config, Feature};
