pub mod publisher;
pub mod subscriber;

