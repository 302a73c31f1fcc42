pub mod exemptions;
pub mod raw;
pub mod resolve;
