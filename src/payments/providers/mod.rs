pub mod phonepe;

pub use phonepe::PhonePeGateway;
