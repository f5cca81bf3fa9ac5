pub mod activity;
pub mod branch;
pub mod cell;
pub mod config;
pub mod effect;
pub mod failure;
pub mod resource;
pub mod results;
pub mod value;
