pub mod invoice;
pub mod money;
pub mod ports;
