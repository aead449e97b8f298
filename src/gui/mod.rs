//! Small full-screen terminal dialogs shared by the binaries.

mod error;
mod fold_until_stop;
mod port_selector;

pub use error::GuiError;
pub use fold_until_stop::fold_until_stop;
pub use port_selector::{port_selector, PortPicker};
