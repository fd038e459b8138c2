#![doc = "cdp-batch-core: core pipeline library for cdp-batch."]

//! This crate contains the data model and pipeline for turning a guest CSV export into a
//! CDP batch upload. HTTP transport and CLI glue live in the `cdp-batch` crate.
//!
//! # Usage
//! Build a [`config::PipelineConfig`], pick a [`uploader::BatchUploader`] implementation
//! and call [`pipeline::run_pipeline`].

pub mod artifacts;
pub mod config;
pub mod payload;
pub mod pipeline;
pub mod records;
pub mod source;
pub mod uploader;
