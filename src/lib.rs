pub mod air_unit;
pub mod commands;
pub mod connection;
pub mod discovery;
pub mod frame;
pub mod mode;
pub mod output;
pub mod registers;
pub mod state;
