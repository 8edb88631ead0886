mod abilities;
mod activation;
mod bootstrap;
mod config;
mod loop_runner;
mod metrics;
mod region;
mod scenario;
mod world;

pub(crate) use loop_runner::run;
