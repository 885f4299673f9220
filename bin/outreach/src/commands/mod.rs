pub mod config_cmd;
pub mod engagement;
pub mod gateway;
pub mod reset;
pub mod serve;
pub mod status;
