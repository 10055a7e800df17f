pub mod cip;
pub mod cpf;
pub mod encap;
pub mod epath;
pub mod identity;
pub mod pccc;

pub use super::wire::{WireDecode, WireEncode};

pub use cip::RoutePath;
pub use cpf::{CommonPacket, CpfItem};
pub use encap::{EipFrame, EncapHeader};
pub use epath::EPath;
pub use identity::Identity;
