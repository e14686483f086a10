pub mod acs;
pub mod stations;
