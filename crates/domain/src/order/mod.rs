//! Orders: the placed-order model and its status machine.

mod model;
mod state;

pub use model::{Order, OrderItem};
pub use state::OrderStatus;
