pub mod check;
pub mod controls;
