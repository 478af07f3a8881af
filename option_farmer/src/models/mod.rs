pub mod atm;
pub mod clock;
pub mod contract;
pub mod handoff;
pub mod harvest;
pub mod option;
pub mod request_params;
pub mod universe;
