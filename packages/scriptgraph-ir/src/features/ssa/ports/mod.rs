//! Boundary contracts of the SSA feature

pub mod host;

pub use host::{
    HostEnv, HostField, HostFunction, HostInterface, HostStruct, HostType, HostValue,
};
