pub mod progress;
pub mod theme;

pub use progress::PairProgress;
pub use theme::{theme, Role, Theme};
