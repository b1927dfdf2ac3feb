pub mod check;
pub mod describe;
pub mod preview;
