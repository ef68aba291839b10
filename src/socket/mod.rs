//! The PF_Q socket, the kernel side of the control plane.

mod fd;
pub use fd::Fd;

mod poll;

#[allow(clippy::module_inception)]
mod socket;
pub use socket::{PfqSocket, SocketCreateError, ANY_DEVICE, ANY_QUEUE};

pub mod sys;
