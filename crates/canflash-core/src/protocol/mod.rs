//! Protocol module - bootloader frame definitions.

pub mod constants;
pub mod frame;
pub mod node;

pub use constants::*;
pub use frame::{
    CanFrame, Command, boot_request, command_frame, finalize_frame, transfer_counter,
    transfer_frame,
};
pub use node::{NodeId, UnknownNode};
