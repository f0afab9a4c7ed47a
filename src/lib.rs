pub mod app;
pub mod config;
pub mod discover;
pub mod domain;
pub mod error;
pub mod executor;
pub mod fs_util;
pub mod jobs;
pub mod layout;
pub mod output;
pub mod pairing;
pub mod reduce;
pub mod seqio;
pub mod split;
