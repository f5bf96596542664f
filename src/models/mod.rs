pub mod order;
pub mod rider;
