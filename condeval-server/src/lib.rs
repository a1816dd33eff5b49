//! # condeval-server — the worker process
//!
//! Thin shell around [`condeval_engine`]: a tonic gRPC service for the
//! six evaluation RPCs, an axum listener for health probes, environment
//! configuration with clamped numeric parsing, and process
//! bootstrap/shutdown. Everything stateful lives in the library crates;
//! this one wires them together.

pub mod config;
pub mod grpc;
pub mod health;

pub mod proto {
    tonic::include_proto!("condeval.v1");
}
