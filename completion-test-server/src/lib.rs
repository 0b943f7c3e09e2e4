//! Scriptable OpenAI-compatible completion server used by ragchat tests and
//! for manual runs of the REPL without a hosted API key.

mod server;

pub use server::{
    run_with_args, spawn, CliArgs, ScriptedReply, TestServerHandle, DEFAULT_HOST, DEFAULT_PORT,
};
