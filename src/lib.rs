pub mod collector;
pub mod config;
pub mod fetch;
pub mod output;
pub mod publish;
pub mod transform;
pub mod xmlrpc;
