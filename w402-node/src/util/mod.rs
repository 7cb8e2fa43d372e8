//! Process utilities for the gate server binary.

mod sig_down;

pub use sig_down::SigDown;
