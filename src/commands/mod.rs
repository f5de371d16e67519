//! Subcommands of the opct-mustgather binary

pub mod parse_etcd_logs;
pub mod process;
