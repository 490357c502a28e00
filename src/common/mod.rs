mod address;
mod class_of_device;
pub mod eir;
mod error;

pub use address::Address;
pub use class_of_device::ClassOfDevice;
pub use error::Error;
