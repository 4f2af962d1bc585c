//! Resource schemas shared by every provider implementation

pub mod ec2;
