pub mod collect;
pub mod config;
pub mod domain;
pub mod error;
pub mod exec;
pub mod fastq;
pub mod fetch;
pub mod fs_util;
pub mod http;
pub mod logging;
pub mod normalize;
pub mod object_store;
pub mod output;
pub mod pipeline;
pub mod publish;
pub mod sra;
pub mod tool;
pub mod workflow;
pub mod workspace;
